//! The table of outstanding outbound calls.
//!
//! An entry is owned by the table from registration until either its response is matched or its
//! timer fires. The timer is armed separately, once the request has left. Both paths remove the
//! entry under the table lock before resolving, so whichever gets there first resolves the call
//! and the other finds nothing.

use crate::proto::CorrelationId;
use crate::scheduler::TimerHandle;
use rmpv::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// The eventual outcome of a call.
///
/// `success == false` means no reply arrived in time, `data` is then `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub success: bool,
    pub data: Option<Value>,
}

impl CallResult {
    #[inline]
    pub fn reply(data: Value) -> Self {
        Self { success: true, data: Some(data) }
    }

    #[inline]
    pub fn timed_out() -> Self {
        Self { success: false, data: None }
    }

    pub fn into_result(self) -> Result<Value, crate::RpcError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(crate::RpcError::CallTimeout),
        }
    }
}

/// Handle returned by [RpcNode::call](crate::RpcNode::call), resolves to a [CallResult].
///
/// There is no way to cancel a call, it ends on reply or timeout.
pub struct PendingCall {
    id: CorrelationId,
    rx: oneshot::Receiver<CallResult>,
    done: Option<CallResult>,
}

impl PendingCall {
    #[inline]
    pub(crate) fn new(id: CorrelationId, rx: oneshot::Receiver<CallResult>) -> Self {
        Self { id, rx, done: None }
    }

    #[inline]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Non-blocking check, `None` while still outstanding.
    pub fn try_result(&mut self) -> Option<CallResult> {
        if self.done.is_none() {
            match self.rx.try_recv() {
                Ok(res) => self.done = Some(res),
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.done = Some(CallResult::timed_out())
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.done.clone()
    }
}

impl Future for PendingCall {
    type Output = CallResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(res) = this.done.take() {
            return Poll::Ready(res);
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            // the node went away with the entry still registered
            Poll::Ready(Err(_)) => Poll::Ready(CallResult::timed_out()),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct PendingEntry {
    sink: oneshot::Sender<CallResult>,
    timer: Option<TimerHandle>,
}

impl PendingEntry {
    #[inline]
    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.as_ref() {
            timer.cancel();
        }
    }
}

#[derive(Default)]
pub struct PendingTable {
    calls: Mutex<HashMap<CorrelationId, PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingEntry>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a new entry with no timer yet, see [PendingTable::arm].
    pub fn register(&self, id: CorrelationId, sink: oneshot::Sender<CallResult>) {
        let mut calls = self.lock();
        if let Some(old) = calls.insert(id, PendingEntry { sink, timer: None }) {
            // 160 random bits, should not happen
            old.cancel_timer();
            warn!("correlation id collision on {}", id);
        }
    }

    /// Start the reply deadline of a registered entry, `schedule` runs with the table locked.
    ///
    /// Returns false without scheduling anything when the entry is already gone, a reply may
    /// have arrived while the request was still being sent.
    pub fn arm<F>(&self, id: &CorrelationId, schedule: F) -> bool
    where
        F: FnOnce() -> TimerHandle,
    {
        let mut calls = self.lock();
        match calls.get_mut(id) {
            Some(entry) => {
                if let Some(old) = entry.timer.replace(schedule()) {
                    old.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Match a response. Returns false when the id is not outstanding.
    pub fn resolve(&self, id: &CorrelationId, data: Value) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(entry) => {
                entry.cancel_timer();
                let _ = entry.sink.send(CallResult::reply(data));
                true
            }
            None => false,
        }
    }

    /// Timer path. Returns false when the response already won.
    pub fn expire(&self, id: &CorrelationId, waited: Duration) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(entry) => {
                error!("did not receive reply for msg id {} within {:?}", id, waited);
                let _ = entry.sink.send(CallResult::timed_out());
                true
            }
            None => {
                trace!("timer for msg id {} fired after it was resolved", id);
                false
            }
        }
    }

    /// Drop an entry whose request never left, the caller gets the send error instead.
    pub fn discard(&self, id: &CorrelationId) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(entry) => {
                entry.cancel_timer();
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.lock().contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
