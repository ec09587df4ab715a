//! The promise resolution procedure.
//!
//! Whatever a handler or resolver produces is folded into its target promise
//! here: plain values fulfill it, promises of the same type are adopted, and
//! foreign [`Thenable`]s are called with a once-only pair of handles.
use crate::error::guarded;
use crate::{Error, Promise, Reason};
use std::cell::Cell;
use std::fmt::{self, Debug};
use std::rc::Rc;
use tracing::debug;

/// A completion value on its way into a promise.
pub enum Resolution<T> {
    Value(T),
    Promise(Promise<T>),
    Thenable(Rc<dyn Thenable<T>>),
}

impl<T> Resolution<T> {
    pub fn thenable(object: impl Thenable<T> + 'static) -> Self {
        Resolution::Thenable(Rc::new(object))
    }
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: Debug> Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// What probing an object's `then` member found.
#[derive(Debug)]
pub enum ThenMember<T> {
    /// `then` can be called.
    Callable,
    /// `then` is missing or not callable; the object is an ordinary value.
    Plain(T),
}

/// A foreign object that may expose a `then(resolve, reject)` capability.
///
/// Implementations are never trusted: `then` may call either handle any
/// number of times, synchronously or later, or fail outright. Only the first
/// call through either handle has any effect.
///
/// ```
/// use promise_aplus::{Promise, RejectHandle, Reason, Resolution, ResolveHandle, Thenable};
/// use promise_aplus::scheduler::EventLoop;
///
/// struct Five;
///
/// impl Thenable<i32> for Five {
///     fn then(&self, resolve: ResolveHandle<i32>, _reject: RejectHandle<i32>) -> Result<(), Reason> {
///         resolve.resolve(5);
///         resolve.resolve(6);
///         Ok(())
///     }
/// }
///
/// let promise = Promise::<i32>::resolve(Resolution::thenable(Five));
/// EventLoop::current().run_until_idle().unwrap();
/// assert_eq!(promise.value(), Some(5));
/// ```
pub trait Thenable<T> {
    /// Reads the `then` member. `Err` means reading it failed.
    fn then_member(&self) -> Result<ThenMember<T>, Reason> {
        Ok(ThenMember::Callable)
    }

    fn then(&self, resolve: ResolveHandle<T>, reject: RejectHandle<T>) -> Result<(), Reason>;
}

/// Shared between the two handles of one adoption; never reused across
/// adoptions.
#[derive(Clone, Default)]
struct OnceGuard(Rc<Cell<bool>>);

impl OnceGuard {
    /// `true` for the first caller only.
    fn claim(&self) -> bool {
        !self.0.replace(true)
    }
}

/// The `resolvePromise` argument handed to a [`Thenable`].
#[derive(Clone)]
pub struct ResolveHandle<T> {
    target: Promise<T>,
    guard: OnceGuard,
}

impl<T: Clone + 'static> ResolveHandle<T> {
    pub fn resolve(&self, value: T) {
        self.adopt(Resolution::Value(value))
    }

    pub fn adopt(&self, resolution: impl Into<Resolution<T>>) {
        if self.guard.claim() {
            resolve_promise(&self.target, resolution.into());
        }
    }
}

/// The `rejectPromise` argument handed to a [`Thenable`].
#[derive(Clone)]
pub struct RejectHandle<T> {
    target: Promise<T>,
    guard: OnceGuard,
}

impl<T: Clone + 'static> RejectHandle<T> {
    pub fn reject(&self, reason: impl Into<Reason>) {
        if self.guard.claim() {
            self.target.settle_rejected(reason.into());
        }
    }
}

/// Folds `x` into `target`. Never settles `target` more than once.
pub(crate) fn resolve_promise<T: Clone + 'static>(target: &Promise<T>, x: Resolution<T>) {
    match x {
        Resolution::Promise(promise) if promise.ptr_eq(target) => {
            debug!(target: "promise_aplus", "promise resolved with itself");
            target.settle_rejected(Error::ChainingCycle.into());
        }
        Resolution::Promise(promise) => match promise.outcome() {
            None => {
                let on_value = target.clone();
                let on_reason = target.clone();
                promise.subscribe(
                    move |value| resolve_promise(&on_value, Resolution::Value(value)),
                    move |reason| on_reason.settle_rejected(reason),
                );
            }
            Some(Ok(value)) => target.settle_fulfilled(value),
            Some(Err(reason)) => target.settle_rejected(reason),
        },
        Resolution::Thenable(object) => adopt_thenable(target, object),
        Resolution::Value(value) => target.settle_fulfilled(value),
    }
}

fn adopt_thenable<T: Clone + 'static>(target: &Promise<T>, object: Rc<dyn Thenable<T>>) {
    let member = match guarded(|| object.then_member()) {
        Ok(member) => member,
        Err(reason) => {
            debug!(target: "promise_aplus", %reason, "reading then failed");
            target.settle_rejected(reason);
            return;
        }
    };
    match member {
        ThenMember::Plain(value) => target.settle_fulfilled(value),
        ThenMember::Callable => {
            let guard = OnceGuard::default();
            let resolve = ResolveHandle {
                target: target.clone(),
                guard: guard.clone(),
            };
            let reject = RejectHandle {
                target: target.clone(),
                guard: guard.clone(),
            };
            if let Err(reason) = guarded(|| object.then(resolve, reject)) {
                if guard.claim() {
                    debug!(target: "promise_aplus", %reason, "calling then failed");
                    target.settle_rejected(reason);
                }
            }
        }
    }
}
