//! Promise/A+ promises for rust.
//!
//! A [`Promise`] is a single-assignment result whose callbacks always run
//! later, from a deferred task queue. `then` chains go through the
//! Promise/A+ resolution procedure, so a handler may hand back a plain value,
//! another promise, or a foreign [`Thenable`], and the chain follows it.
//!
//! Everything is single threaded. Callbacks are queued on the thread's
//! [`scheduler`]; by default that is the thread-local
//! [`EventLoop`](scheduler::EventLoop), which has to be driven:
//!
//! ```
//! use promise_aplus::{Promise, Resolution};
//! use promise_aplus::scheduler::EventLoop;
//!
//! let answer = Promise::resolved(1)
//!     .map(|n| n + 1)
//!     .and_then(|n| Ok(Resolution::Promise(Promise::resolved(n * 21))));
//! assert!(answer.is_pending());
//!
//! EventLoop::current().run_until_idle().unwrap();
//! assert_eq!(answer.value(), Some(42));
//! ```
mod combinators;
mod error;
mod promise;
pub mod promise_out;
mod resolution;
pub mod scheduler;
pub mod timer;

pub use combinators::Settled;
pub use error::{Error, Reason};
pub use promise::{Outcome, PendingCallbacks, Promise, PromiseState, Rejecter, Resolver};
pub use promise_out::PromiseOut;
pub use resolution::{RejectHandle, Resolution, ResolveHandle, ThenMember, Thenable};
