//! The promise state machine.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a value or rejected with a [`Reason`]. Callbacks registered while
//! pending are queued; callbacks registered afterwards are scheduled straight
//! away. Either way they run later, through the promise's scheduler, never
//! inside the call that registered or settled them.
use crate::error::guarded;
use crate::resolution::resolve_promise;
use crate::scheduler::{self, Schedule};
use crate::{Reason, Resolution};
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::mem;
use std::rc::Rc;
use tracing::trace;

/// What a handler hands back: a resolution for the next promise, or the
/// reason it failed.
pub type Outcome<T> = Result<Resolution<T>, Reason>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Callbacks queued on a pending promise.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingCallbacks {
    pub fulfilled: usize,
    pub rejected: usize,
}

enum Settlement<T> {
    Pending,
    Fulfilled(T),
    Rejected(Reason),
}

struct Inner<T> {
    settlement: Settlement<T>,
    fulfill_callbacks: Vec<Box<dyn FnOnce(T)>>,
    reject_callbacks: Vec<Box<dyn FnOnce(Reason)>>,
}

/// A single-assignment result with deferred callbacks.
///
/// Cloning a `Promise` clones the handle, not the state.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Promise, Resolution};
/// use promise_aplus::scheduler::EventLoop;
///
/// let promise = Promise::new(|resolve, _reject| {
///     resolve.resolve(20);
///     Ok(())
/// })
/// .map(|value| value + 1)
/// .and_then(|value| Ok(Resolution::Value(value * 2)));
///
/// EventLoop::current().run_until_idle().unwrap();
/// assert_eq!(promise.value(), Some(42));
/// ```
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
    scheduler: Rc<dyn Schedule>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Debug> Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut out = f.debug_struct("Promise");
        match &inner.settlement {
            Settlement::Pending => out
                .field("state", &PromiseState::Pending)
                .field("fulfill_callbacks", &inner.fulfill_callbacks.len())
                .field("reject_callbacks", &inner.reject_callbacks.len()),
            Settlement::Fulfilled(value) => out
                .field("state", &PromiseState::Fulfilled)
                .field("value", value),
            Settlement::Rejected(reason) => out
                .field("state", &PromiseState::Rejected)
                .field("reason", reason),
        };
        out.finish()
    }
}

/// Fulfillment capability handed to an executor.
///
/// Shares a once-only flag with its [`Rejecter`]: after either one has been
/// used, both ignore further calls.
#[derive(Clone)]
pub struct Resolver<T> {
    promise: Promise<T>,
    used: Rc<Cell<bool>>,
}

impl<T: Clone + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) {
        self.adopt(Resolution::Value(value))
    }

    /// Resolves with a promise or thenable, adopting its eventual state.
    pub fn adopt(&self, resolution: impl Into<Resolution<T>>) {
        if self.used.replace(true) {
            trace!(target: "promise_aplus", "resolver already used");
            return;
        }
        resolve_promise(&self.promise, resolution.into());
    }
}

/// Rejection capability handed to an executor.
#[derive(Clone)]
pub struct Rejecter<T> {
    promise: Promise<T>,
    used: Rc<Cell<bool>>,
}

impl<T: Clone + 'static> Rejecter<T> {
    pub fn reject(&self, reason: impl Into<Reason>) {
        if self.used.replace(true) {
            trace!(target: "promise_aplus", "rejecter already used");
            return;
        }
        self.promise.settle_rejected(reason.into());
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Runs `executor` immediately with the new promise's capabilities.
    ///
    /// An `Err` returned by the executor, or a panic inside it, rejects the
    /// promise unless it was already resolved.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, Rejecter<T>) -> Result<(), Reason>,
    {
        Self::with_scheduler(scheduler::current(), executor)
    }

    /// Like [`Promise::new`], with callbacks deferred through `scheduler`.
    /// Promises derived through `then` inherit it.
    pub fn with_scheduler<F>(scheduler: Rc<dyn Schedule>, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, Rejecter<T>) -> Result<(), Reason>,
    {
        let promise = Self::pending_in(scheduler);
        let (resolver, rejecter) = promise.capabilities();
        let fallback = rejecter.clone();
        if let Err(reason) = guarded(|| executor(resolver, rejecter)) {
            fallback.reject(reason);
        }
        promise
    }

    /// Returns `x` itself when it is already a promise, otherwise a new
    /// promise resolved with it.
    pub fn resolve(x: impl Into<Resolution<T>>) -> Self {
        match x.into() {
            Resolution::Promise(promise) => promise,
            resolution => {
                let promise = Self::pending();
                resolve_promise(&promise, resolution);
                promise
            }
        }
    }

    /// A promise fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        Self::resolve(Resolution::Value(value))
    }

    pub fn reject(reason: impl Into<Reason>) -> Self {
        let promise = Self::pending();
        promise.settle_rejected(reason.into());
        promise
    }

    pub(crate) fn pending() -> Self {
        Self::pending_in(scheduler::current())
    }

    fn pending_in(scheduler: Rc<dyn Schedule>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                settlement: Settlement::Pending,
                fulfill_callbacks: Vec::new(),
                reject_callbacks: Vec::new(),
            })),
            scheduler,
        }
    }

    pub(crate) fn capabilities(&self) -> (Resolver<T>, Rejecter<T>) {
        let used = Rc::new(Cell::new(false));
        (
            Resolver {
                promise: self.clone(),
                used: used.clone(),
            },
            Rejecter {
                promise: self.clone(),
                used,
            },
        )
    }

    /// Registers both handlers and returns the promise they settle.
    ///
    /// A handler returning `Err`, or panicking, rejects the returned promise.
    /// Whatever it returns otherwise goes through the resolution procedure,
    /// so returning a promise or thenable makes the chain wait for it.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U> + 'static,
        R: FnOnce(Reason) -> Outcome<U> + 'static,
    {
        self.react(on_fulfilled, Some(on_rejected))
    }

    /// `then` without a rejection handler: rejections pass through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U> + 'static,
    {
        self.react(on_fulfilled, None::<fn(Reason) -> Outcome<U>>)
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// `then` without a fulfillment handler: values pass through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T>
    where
        R: FnOnce(Reason) -> Outcome<T> + 'static,
    {
        self.react(|value| Ok(Resolution::Value(value)), Some(on_rejected))
    }

    /// `then` with neither handler.
    pub fn chain(&self) -> Promise<T> {
        self.and_then(|value| Ok(Resolution::Value(value)))
    }

    /// Runs `on_finally` whichever way this promise settles, then passes the
    /// original outcome through.
    ///
    /// If `on_finally` resolves to a promise the chain waits for it. Its
    /// value is ignored, but a rejection (or `on_finally` itself failing)
    /// replaces the outcome.
    pub fn finally<F>(&self, on_finally: F) -> Promise<T>
    where
        F: FnOnce() -> Outcome<()> + 'static,
    {
        let on_fulfilled = Rc::new(Cell::new(Some(on_finally)));
        let on_rejected = on_fulfilled.clone();
        let (fulfilled_in, rejected_in) = (self.scheduler.clone(), self.scheduler.clone());
        self.then(
            move |value| {
                let after = run_finally(&on_fulfilled, fulfilled_in)?;
                Ok(Resolution::Promise(after.map(move |()| value)))
            },
            move |reason| {
                let after = run_finally(&on_rejected, rejected_in)?;
                Ok(Resolution::Promise(after.and_then(move |()| Err(reason))))
            },
        )
    }

    fn react<U, F, R>(&self, on_fulfilled: F, on_rejected: Option<R>) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U> + 'static,
        R: FnOnce(Reason) -> Outcome<U> + 'static,
    {
        let next = Promise::<U>::pending_in(self.scheduler.clone());
        let fulfilled_next = next.clone();
        let rejected_next = next.clone();
        self.subscribe(
            move |value| settle_with(&fulfilled_next, move || on_fulfilled(value)),
            move |reason| match on_rejected {
                Some(on_rejected) => settle_with(&rejected_next, move || on_rejected(reason)),
                None => rejected_next.settle_rejected(reason),
            },
        );
        next
    }

    /// Queues a callback pair, or schedules the matching one right away if
    /// the promise has already settled.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(Reason) + 'static,
    {
        let task: Box<dyn FnOnce()> = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &inner.settlement {
                Settlement::Pending => {
                    inner.fulfill_callbacks.push(Box::new(on_fulfilled));
                    inner.reject_callbacks.push(Box::new(on_rejected));
                    return;
                }
                Settlement::Fulfilled(value) => {
                    let value = value.clone();
                    Box::new(move || on_fulfilled(value))
                }
                Settlement::Rejected(reason) => {
                    let reason = reason.clone();
                    Box::new(move || on_rejected(reason))
                }
            }
        };
        self.scheduler.defer(task);
    }

    pub(crate) fn settle_fulfilled(&self, value: T) {
        let (callbacks, discarded) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if !matches!(inner.settlement, Settlement::Pending) {
                trace!(target: "promise_aplus", "fulfill ignored, already settled");
                return;
            }
            inner.settlement = Settlement::Fulfilled(value.clone());
            (
                mem::take(&mut inner.fulfill_callbacks),
                mem::take(&mut inner.reject_callbacks),
            )
        };
        drop(discarded);
        trace!(target: "promise_aplus", callbacks = callbacks.len(), "promise fulfilled");
        for callback in callbacks {
            let value = value.clone();
            self.scheduler.defer(Box::new(move || callback(value)));
        }
    }

    pub(crate) fn settle_rejected(&self, reason: Reason) {
        let (callbacks, discarded) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if !matches!(inner.settlement, Settlement::Pending) {
                trace!(target: "promise_aplus", "reject ignored, already settled");
                return;
            }
            inner.settlement = Settlement::Rejected(reason.clone());
            (
                mem::take(&mut inner.reject_callbacks),
                mem::take(&mut inner.fulfill_callbacks),
            )
        };
        drop(discarded);
        trace!(target: "promise_aplus", callbacks = callbacks.len(), %reason, "promise rejected");
        for callback in callbacks {
            let reason = reason.clone();
            self.scheduler.defer(Box::new(move || callback(reason)));
        }
    }

    /// `None` while pending.
    pub(crate) fn outcome(&self) -> Option<Result<T, Reason>> {
        match &self.inner.borrow().settlement {
            Settlement::Pending => None,
            Settlement::Fulfilled(value) => Some(Ok(value.clone())),
            Settlement::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

impl<T> Promise<T> {
    pub fn state(&self) -> PromiseState {
        match self.inner.borrow().settlement {
            Settlement::Pending => PromiseState::Pending,
            Settlement::Fulfilled(_) => PromiseState::Fulfilled,
            Settlement::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The fulfillment value, once fulfilled.
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        match &self.inner.borrow().settlement {
            Settlement::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection reason, once rejected.
    pub fn reason(&self) -> Option<Reason> {
        match &self.inner.borrow().settlement {
            Settlement::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn pending_callbacks(&self) -> PendingCallbacks {
        let inner = self.inner.borrow();
        PendingCallbacks {
            fulfilled: inner.fulfill_callbacks.len(),
            rejected: inner.reject_callbacks.len(),
        }
    }

    /// `true` when both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn settle_with<U: Clone + 'static>(next: &Promise<U>, handler: impl FnOnce() -> Outcome<U>) {
    match guarded(handler) {
        Ok(x) => resolve_promise(next, x),
        Err(reason) => next.settle_rejected(reason),
    }
}

/// The promise a `finally` chain waits on, bound to `scheduler` so the
/// passthrough stays on the same queue as the rest of the chain.
fn run_finally<F>(
    slot: &Cell<Option<F>>,
    scheduler: Rc<dyn Schedule>,
) -> Result<Promise<()>, Reason>
where
    F: FnOnce() -> Outcome<()>,
{
    let resolution = match slot.take() {
        Some(on_finally) => on_finally()?,
        None => Resolution::Value(()),
    };
    let after = Promise::pending_in(scheduler);
    resolve_promise(&after, resolution);
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{EventLoop, Task};
    use crate::Error;
    use std::collections::VecDeque;

    fn run() {
        EventLoop::current().run_until_idle().unwrap();
    }

    fn deferred<T: Clone + 'static>() -> (Promise<T>, Resolver<T>, Rejecter<T>) {
        let promise = Promise::pending();
        let (resolve, reject) = promise.capabilities();
        (promise, resolve, reject)
    }

    #[test]
    fn test_executor_runs_synchronously() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let promise = Promise::new(move |resolve, _| {
            flag.set(true);
            resolve.resolve(42);
            Ok(())
        });
        assert!(ran.get());
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.value(), Some(42));
        assert!(promise.reason().is_none());
    }

    #[test]
    fn test_settle_once_in_executor() {
        let promise = Promise::new(|resolve, reject| {
            resolve.resolve(1);
            reject.reject("ignored");
            resolve.resolve(2);
            Ok(())
        });
        assert_eq!(promise.value(), Some(1));

        let promise = Promise::<i32>::new(|resolve, reject| {
            reject.reject("first");
            resolve.resolve(3);
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert!(promise.value().is_none());
    }

    #[test]
    fn test_executor_error_rejects() {
        let promise = Promise::<i32>::new(|_, _| Err(Reason::from("executor error")));
        assert_eq!(
            promise.reason().unwrap().downcast_ref::<&str>(),
            Some(&"executor error")
        );
    }

    #[test]
    fn test_executor_error_after_resolve_is_ignored() {
        let promise = Promise::new(|resolve, _| {
            resolve.resolve("done");
            Err(Reason::from("late"))
        });
        assert_eq!(promise.value(), Some("done"));
    }

    #[test]
    fn test_executor_panic_rejects() {
        let promise = Promise::<i32>::new(|_, _| panic!("executor blew up"));
        match promise.reason().unwrap().error() {
            Some(Error::Panicked { message }) => assert_eq!(message, "executor blew up"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolver_adopting_pending_promise_locks_rejecter() {
        let (source, resolve_source, _) = deferred::<i32>();
        let promise = Promise::new(move |resolve, reject| {
            resolve.adopt(source);
            reject.reject("too late");
            Ok(())
        });
        assert!(promise.is_pending());
        resolve_source.resolve(7);
        run();
        assert_eq!(promise.value(), Some(7));
    }

    #[test]
    fn test_then_is_deferred() {
        let log = Rc::new(RefCell::new(Vec::new()));
        log.borrow_mut().push("1");
        let sink = log.clone();
        Promise::resolved(()).map(move |()| sink.borrow_mut().push("2"));
        log.borrow_mut().push("3");
        run();
        assert_eq!(*log.borrow(), vec!["1", "3", "2"]);
    }

    #[test]
    fn test_callbacks_run_fifo() {
        let (promise, resolve, _) = deferred::<i32>();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let sink = log.clone();
            promise.map(move |value| sink.borrow_mut().push(value * 10 + i));
        }
        assert_eq!(
            promise.pending_callbacks(),
            PendingCallbacks {
                fulfilled: 5,
                rejected: 5
            }
        );
        resolve.resolve(1);
        assert_eq!(promise.pending_callbacks(), PendingCallbacks::default());
        assert!(log.borrow().is_empty());
        run();
        assert_eq!(*log.borrow(), vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_register_during_drain_is_not_replayed() {
        let (promise, resolve, _) = deferred::<i32>();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let again = promise.clone();
        promise.map(move |value| {
            sink.borrow_mut().push(value);
            let sink = sink.clone();
            again.map(move |value| sink.borrow_mut().push(value + 100));
        });
        resolve.resolve(1);
        run();
        assert_eq!(*log.borrow(), vec![1, 101]);
    }

    #[test]
    fn test_value_passthrough() {
        let result = Promise::resolved(42).chain().chain().map(|v| v);
        run();
        assert_eq!(result.value(), Some(42));
    }

    #[test]
    fn test_error_passthrough() {
        let caught = Promise::<i32>::reject("test error")
            .chain()
            .map(|v| v + 1)
            .catch(|reason| {
                assert_eq!(reason.downcast_ref::<&str>(), Some(&"test error"));
                Ok(Resolution::Value(-1))
            });
        run();
        assert_eq!(caught.value(), Some(-1));
    }

    #[test]
    fn test_handler_error_rejects_next() {
        let next: Promise<i32> = Promise::resolved(1).and_then(|_| Err(Reason::from("thrown")));
        run();
        assert_eq!(next.reason().unwrap().downcast_ref::<&str>(), Some(&"thrown"));
    }

    #[test]
    fn test_handler_panic_rejects_next() {
        let next: Promise<i32> = Promise::resolved(1).map(|_| panic!("handler panic"));
        run();
        assert!(matches!(
            next.reason().unwrap().error(),
            Some(Error::Panicked { .. })
        ));
    }

    #[test]
    fn test_recovered_chain_returns_to_fulfilled_track() {
        let result = Promise::<i32>::reject("oops")
            .catch(|_| Ok(Resolution::Value(5)))
            .map(|v| v * 2);
        run();
        assert_eq!(result.value(), Some(10));
    }

    #[test]
    fn test_then_picks_matching_handler() {
        let fulfilled = Promise::resolved(2).then(
            |v| Ok(Resolution::Value(format!("value {}", v))),
            |_| Ok(Resolution::Value("reason".to_string())),
        );
        let rejected = Promise::<i32>::reject("x").then(
            |v| Ok(Resolution::Value(format!("value {}", v))),
            |r| Ok(Resolution::Value(format!("reason {}", r))),
        );
        run();
        assert_eq!(fulfilled.value().as_deref(), Some("value 2"));
        assert_eq!(rejected.value().as_deref(), Some("reason \"x\""));
    }

    #[test]
    fn test_handler_returning_promise_is_awaited() {
        let (inner, resolve_inner, _) = deferred::<&str>();
        let outer = Promise::resolved(1).and_then(move |_| Ok(Resolution::Promise(inner)));
        run();
        assert!(outer.is_pending());
        resolve_inner.resolve("inner value");
        run();
        assert_eq!(outer.value(), Some("inner value"));
    }

    #[test]
    fn test_self_reference_rejects() {
        let slot: Rc<RefCell<Option<Promise<i32>>>> = Rc::new(RefCell::new(None));
        let me = slot.clone();
        let promise = Promise::resolved(1).and_then(move |_| {
            let me = me.borrow().clone().expect("slot filled before callbacks run");
            Ok(Resolution::Promise(me))
        });
        *slot.borrow_mut() = Some(promise.clone());
        run();
        assert!(matches!(
            promise.reason().unwrap().error(),
            Some(Error::ChainingCycle)
        ));
    }

    #[test]
    fn test_resolve_returns_same_promise() {
        let promise = Promise::resolved(3);
        assert!(Promise::resolve(promise.clone()).ptr_eq(&promise));
        assert!(!Promise::resolved(3).ptr_eq(&promise));
    }

    #[test]
    fn test_finally_passes_value_through() {
        let calls = Rc::new(Cell::new(0));
        let count = calls.clone();
        let result = Promise::resolved("kept").finally(move || {
            count.set(count.get() + 1);
            Ok(Resolution::Value(()))
        });
        run();
        assert_eq!(calls.get(), 1);
        assert_eq!(result.value(), Some("kept"));
    }

    #[test]
    fn test_finally_passes_reason_through() {
        let result = Promise::<i32>::reject("original").finally(|| Ok(Resolution::Value(())));
        run();
        assert_eq!(
            result.reason().unwrap().downcast_ref::<&str>(),
            Some(&"original")
        );
    }

    #[test]
    fn test_finally_waits_for_returned_promise() {
        let (gate, open, _) = deferred::<()>();
        let result = Promise::resolved(9).finally(move || Ok(Resolution::Promise(gate)));
        run();
        assert!(result.is_pending());
        open.resolve(());
        run();
        assert_eq!(result.value(), Some(9));
    }

    #[test]
    fn test_finally_failure_replaces_outcome() {
        let thrown = Promise::resolved(1).finally(|| Err(Reason::from("cleanup failed")));
        let rejected = Promise::resolved(1)
            .finally(|| Ok(Resolution::Promise(Promise::reject("cleanup rejected"))));
        run();
        assert_eq!(
            thrown.reason().unwrap().downcast_ref::<&str>(),
            Some(&"cleanup failed")
        );
        assert_eq!(
            rejected.reason().unwrap().downcast_ref::<&str>(),
            Some(&"cleanup rejected")
        );
    }

    #[test]
    fn test_with_scheduler_routes_callbacks() {
        #[derive(Default)]
        struct Manual(RefCell<VecDeque<Task>>);
        impl Schedule for Manual {
            fn defer(&self, task: Task) {
                self.0.borrow_mut().push_back(task);
            }
        }
        let manual = Rc::new(Manual::default());
        let promise = Promise::with_scheduler(manual.clone(), |resolve, _| {
            resolve.resolve(5);
            Ok(())
        });
        let doubled = promise.map(|v| v * 2);
        run();
        assert!(doubled.is_pending());
        assert_eq!(manual.0.borrow().len(), 1);
        loop {
            let task = manual.0.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        assert_eq!(doubled.value(), Some(10));
    }

    #[test]
    fn test_finally_stays_on_its_scheduler() {
        #[derive(Default)]
        struct Manual(RefCell<VecDeque<Task>>);
        impl Schedule for Manual {
            fn defer(&self, task: Task) {
                self.0.borrow_mut().push_back(task);
            }
        }
        let manual = Rc::new(Manual::default());
        let promise = Promise::with_scheduler(manual.clone(), |resolve, _| {
            resolve.resolve(5);
            Ok(())
        });
        let kept = promise.finally(|| Ok(Resolution::Value(())));
        let rejected = Promise::<i32>::with_scheduler(manual.clone(), |_, reject| {
            reject.reject("cleanup ran");
            Ok(())
        })
        .finally(|| Ok(Resolution::Value(())));
        let default_queue = EventLoop::current().pending_microtasks();
        loop {
            let task = manual.0.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        assert_eq!(EventLoop::current().pending_microtasks(), default_queue);
        assert_eq!(kept.value(), Some(5));
        assert_eq!(
            rejected.reason().unwrap().downcast_ref::<&str>(),
            Some(&"cleanup ran")
        );
    }

    #[test]
    fn test_debug_shows_state() {
        let promise = Promise::resolved(1);
        assert_eq!(
            format!("{:?}", promise),
            "Promise { state: Fulfilled, value: 1 }"
        );
        let pending = Promise::<i32>::pending();
        pending.map(|v| v + 1);
        pending.catch(|_| Ok(Resolution::Value(0)));
        assert_eq!(
            format!("{:?}", pending),
            "Promise { state: Pending, fulfill_callbacks: 2, reject_callbacks: 2 }"
        );
    }
}
