//! Rejection reasons and the errors this crate produces itself.
//!
//! A promise may be rejected with literally any value, so [`Reason`] is an
//! open payload. The library only ever rejects with an [`Error`] wrapped in a
//! `Reason`.
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A promise was resolved with itself.
    #[error("chaining cycle detected for promise")]
    ChainingCycle,

    /// Every input of [`Promise::any`](crate::Promise::any) rejected.
    #[error("all promises were rejected ({} reasons)", .reasons.len())]
    Aggregate { reasons: Vec<Reason> },

    /// An executor, handler or thenable panicked. Treated like a throw.
    #[error("callback panicked: {message}")]
    Panicked { message: String },

    /// The event loop drained more microtasks than its configured limit.
    #[error("event loop exceeded {limit} microtasks without going idle")]
    MicrotaskLimit { limit: usize },
}

impl Error {
    /// Reasons bundled in an aggregate error, in input order.
    pub fn reasons(&self) -> &[Reason] {
        match self {
            Error::Aggregate { reasons } => reasons,
            _ => &[],
        }
    }
}

trait Payload: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<P: Any + fmt::Debug> Payload for P {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Why a promise was rejected.
///
/// Cloning is cheap; clones point at the same payload.
///
/// ```
/// use promise_aplus::Reason;
///
/// let reason = Reason::new(404u16);
/// assert_eq!(reason.downcast_ref::<u16>(), Some(&404));
/// assert!(reason.error().is_none());
/// ```
#[derive(Clone)]
pub struct Reason(Rc<dyn Payload>);

impl Reason {
    pub fn new<P: Any + fmt::Debug>(payload: P) -> Self {
        Reason(Rc::new(payload))
    }

    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        (*self.0).as_any().downcast_ref::<P>()
    }

    pub fn is<P: Any>(&self) -> bool {
        (*self.0).as_any().is::<P>()
    }

    /// The library error carried by this reason, if it is one.
    pub fn error(&self) -> Option<&Error> {
        self.downcast_ref::<Error>()
    }

    /// `true` when both reasons share the same payload allocation.
    pub fn ptr_eq(&self, other: &Reason) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error() {
            Some(error) => fmt::Display::fmt(error, f),
            None => fmt::Debug::fmt(&*self.0, f),
        }
    }
}

impl From<Error> for Reason {
    fn from(error: Error) -> Self {
        Reason::new(error)
    }
}

impl From<&'static str> for Reason {
    fn from(message: &'static str) -> Self {
        Reason::new(message)
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Reason::new(message)
    }
}

/// Runs user code, turning a panic into a rejection reason.
pub(crate) fn guarded<R>(f: impl FnOnce() -> Result<R, Reason>) -> Result<R, Reason> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::debug!(target: "promise_aplus", %message, "captured panic in callback");
            Err(Error::Panicked { message }.into())
        }
    }
}
