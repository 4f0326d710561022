//! This module contains the handler side of a node: the trait a local method implements and
//! the registry inbound requests are dispatched through.

use crate::error::HandlerError;
use rmpv::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + 'static>>;

/// A locally served method.
///
/// Invoked with the sender's address and the decoded argument list. The returned value is
/// encoded as the response payload. An `Err` is logged and no response is sent.
///
/// Closures `Fn(SocketAddr, Vec<Value>) -> impl Future<Output = Result<Value, HandlerError>>`
/// implement this trait.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, peer: SocketAddr, args: Vec<Value>) -> HandlerFuture;
}

impl<F, FH> Handler for F
where
    F: Fn(SocketAddr, Vec<Value>) -> FH + Send + Sync + 'static,
    FH: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    #[inline]
    fn call(&self, peer: SocketAddr, args: Vec<Value>) -> HandlerFuture {
        Box::pin((self)(peer, args))
    }
}

/// Method name to handler, shared between the application and the dispatch path.
///
/// May be modified while the node runs. Lookups clone the handler out, the lock is never held
/// across a handler invocation.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler previously registered under the same name.
    pub fn register(
        &self, method: impl Into<String>, handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        let method = method.into();
        debug!("register handler {:?}", method);
        self.handlers.write().unwrap_or_else(|e| e.into_inner()).insert(method, handler)
    }

    pub fn unregister(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner()).remove(method)
    }

    #[inline]
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).get(method).cloned()
    }

    #[inline]
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<&String> = handlers.keys().collect();
        names.sort();
        write!(f, "handlers({:?})", names)
    }
}

/// Decode positional argument `idx` of a request, for use inside handlers.
pub fn arg<'a>(args: &'a [Value], idx: usize) -> Result<&'a Value, HandlerError> {
    args.get(idx).ok_or_else(|| HandlerError::new(format!("missing argument {}", idx)))
}
