//! Timers, backoff and task spawning for the engine.
//!
//! The engine never touches a global reactor directly, everything time related goes through a
//! [Scheduler]. [TokioScheduler] is what a real node uses, [ManualScheduler] keeps a virtual
//! clock that only moves on [ManualScheduler::advance], so timeout behavior can be tested
//! without waiting on the wall clock.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Cancel a timer registered with [Scheduler::after].
///
/// Cancelling a timer that already fired is a no-op. Dropping the handle does not cancel.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<tokio::task::AbortHandle>,
}

impl TimerHandle {
    #[inline]
    pub fn new(cancelled: Arc<AtomicBool>, abort: Option<tokio::task::AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = self.abort.as_ref() {
            abort.abort();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The timer substrate injected into an [RpcNode](crate::RpcNode).
///
/// # NOTE
///
/// `after()` must never run the callback before returning, the pending-call table registers
/// the timer while holding its lock.
pub trait Scheduler: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Run `callback` once after `delay`, unless cancelled first.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send + 'static;

    fn spawn<F>(&self, f: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Scheduler backed by a tokio runtime handle.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    #[inline]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Panics outside of a tokio runtime context.
    #[inline]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    #[inline]
    fn now(&self) -> Instant {
        // follows the paused clock in tests
        tokio::time::Instant::now().into_std()
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                callback();
            }
        });
        TimerHandle::new(cancelled, Some(task.abort_handle()))
    }

    #[inline]
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send + 'static {
        tokio::time::sleep(delay)
    }

    #[inline]
    fn spawn<F>(&self, f: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.handle.spawn(f);
    }
}

struct ManualTimer {
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

struct ManualClock {
    origin: Instant,
    elapsed: Duration,
    seq: u64,
    // ordered by (deadline, registration order)
    timers: BTreeMap<(Duration, u64), ManualTimer>,
}

/// A virtual clock, timers only fire inside [ManualScheduler::advance].
///
/// `spawn()` still hands tasks to the ambient tokio runtime, and `sleep()` resolves when the
/// clock is advanced past its deadline.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let clock = ManualClock {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            seq: 0,
            timers: BTreeMap::new(),
        };
        Self { clock: Arc::new(Mutex::new(clock)) }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Timers registered and not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.values().filter(|t| !t.cancelled.load(Ordering::Acquire)).count()
    }

    /// Move the clock forward, firing due timers in deadline order.
    ///
    /// Callbacks run on the calling thread without the clock locked, so they may register new
    /// timers, which fire in this same call if they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().elapsed + by;
        loop {
            let due = {
                let mut clock = self.lock();
                let key = match clock.timers.keys().next() {
                    Some(key) if key.0 <= target => *key,
                    _ => break,
                };
                clock.elapsed = key.0;
                clock.timers.remove(&key)
            };
            if let Some(timer) = due {
                if !timer.cancelled.load(Ordering::Acquire) {
                    (timer.callback)();
                }
            }
        }
        self.lock().elapsed = target;
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        let clock = self.lock();
        clock.origin + clock.elapsed
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.lock();
        let key = (clock.elapsed + delay, clock.seq);
        clock.seq += 1;
        clock.timers.insert(key, ManualTimer { cancelled: cancelled.clone(), callback });
        TimerHandle::new(cancelled, None)
    }

    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel::<()>();
        self.after(
            delay,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        async move {
            let _ = rx.await;
        }
    }

    fn spawn<F>(&self, f: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = tokio::spawn(f);
    }
}
