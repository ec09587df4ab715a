use crate::{Promise, Reason, Rejecter, Resolution, Resolver};

/// A pending promise together with the capabilities that settle it, for
/// code that needs to settle a promise from outside an executor.
///
/// # Examples
///
/// ```
/// use promise_aplus::PromiseOut;
/// use promise_aplus::scheduler::EventLoop;
///
/// let op = PromiseOut::<String>::new();
/// let greeting = op.promise().map(|value| format!("我等到了{}", value));
/// op.resolve(String::from("🍓"));
/// EventLoop::current().run_until_idle().unwrap();
/// assert_eq!(greeting.value().as_deref(), Some("我等到了🍓"));
/// ```
#[derive(Clone)]
pub struct PromiseOut<T> {
    promise: Promise<T>,
    resolver: Resolver<T>,
    rejecter: Rejecter<T>,
}

impl<T: Clone + 'static> Default for PromiseOut<T> {
    fn default() -> Self {
        let promise = Promise::pending();
        let (resolver, rejecter) = promise.capabilities();
        Self {
            promise,
            resolver,
            rejecter,
        }
    }
}

impl<T: Clone + 'static> PromiseOut<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Only the first of `resolve`, `adopt` and `reject` has any effect.
    pub fn resolve(&self, value: T) {
        self.resolver.resolve(value)
    }

    pub fn adopt(&self, resolution: impl Into<Resolution<T>>) {
        self.resolver.adopt(resolution)
    }

    pub fn reject(&self, reason: impl Into<Reason>) {
        self.rejecter.reject(reason)
    }

    pub fn is_settled(&self) -> bool {
        !self.promise.is_pending()
    }
}
