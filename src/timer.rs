//! Timer-backed promises on the thread's [`EventLoop`].
//!
//! There is no built-in timeout; race the work against [`reject_after`]:
//!
//! ```
//! use promise_aplus::Promise;
//! use promise_aplus::scheduler::EventLoop;
//! use promise_aplus::timer::{delay, reject_after};
//! use std::time::Duration;
//!
//! let work = delay(Duration::from_millis(500), "finished");
//! let guarded = Promise::race(vec![work, reject_after(Duration::from_millis(100), "timed out")]);
//! EventLoop::current().run_until_idle().unwrap();
//! assert_eq!(guarded.reason().unwrap().downcast_ref::<&str>(), Some(&"timed out"));
//! ```
use crate::scheduler::EventLoop;
use crate::{Promise, Reason};
use std::time::Duration;

/// Fulfills with `value` once `after` has elapsed.
pub fn delay<T: Clone + 'static>(after: Duration, value: T) -> Promise<T> {
    let event_loop = EventLoop::current();
    Promise::new(move |resolve, _reject| {
        event_loop.set_timeout(after, move || resolve.resolve(value));
        Ok(())
    })
}

/// Rejects with `reason` once `after` has elapsed.
pub fn reject_after<T: Clone + 'static>(after: Duration, reason: impl Into<Reason>) -> Promise<T> {
    let event_loop = EventLoop::current();
    let reason = reason.into();
    Promise::new(move |_resolve, reject| {
        event_loop.set_timeout(after, move || reject.reject(reason));
        Ok(())
    })
}
