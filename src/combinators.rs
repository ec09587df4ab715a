//! Aggregate combinators.
//!
//! These only use the public promise contract: each input is wrapped with
//! [`Promise::resolve`] and observed through `then`, and the combined promise
//! is settled through the capabilities its executor received.
use crate::{Error, Promise, Reason, Resolution};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// How one input of [`Promise::all_settled`] ended.
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(Reason),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(reason) => Some(reason),
        }
    }
}

fn done<U>() -> Result<Resolution<()>, U> {
    Ok(Resolution::Value(()))
}

impl<T: Clone + 'static> Promise<T> {
    /// Fulfills with every input's value, in input order, once all of them
    /// have fulfilled. Rejects with the first rejection.
    ///
    /// ```
    /// use promise_aplus::{Promise, Resolution};
    /// use promise_aplus::scheduler::EventLoop;
    ///
    /// let all = Promise::all(vec![
    ///     Resolution::Value(1),
    ///     Resolution::Promise(Promise::resolved(2)),
    /// ]);
    /// EventLoop::current().run_until_idle().unwrap();
    /// assert_eq!(all.value(), Some(vec![1, 2]));
    /// ```
    pub fn all<I>(inputs: I) -> Promise<Vec<T>>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs: Vec<Promise<T>> = inputs.into_iter().map(Promise::resolve).collect();
        Promise::new(move |resolve, reject| {
            if inputs.is_empty() {
                resolve.resolve(Vec::new());
                return Ok(());
            }
            let slots: Rc<RefCell<Vec<Option<T>>>> =
                Rc::new(RefCell::new(vec![None; inputs.len()]));
            let remaining = Rc::new(Cell::new(inputs.len()));
            for (index, input) in inputs.into_iter().enumerate() {
                let slots = slots.clone();
                let remaining = remaining.clone();
                let resolve = resolve.clone();
                let reject = reject.clone();
                input.then(
                    move |value| {
                        slots.borrow_mut()[index] = Some(value);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            let values = slots.borrow_mut().drain(..).flatten().collect();
                            resolve.resolve(values);
                        }
                        done()
                    },
                    move |reason| {
                        reject.reject(reason);
                        done()
                    },
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first.
    ///
    /// With no inputs the returned promise stays pending forever.
    pub fn race<I>(inputs: I) -> Promise<T>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs: Vec<Promise<T>> = inputs.into_iter().map(Promise::resolve).collect();
        Promise::new(move |resolve, reject| {
            for input in inputs {
                let resolve = resolve.clone();
                let reject = reject.clone();
                input.then(
                    move |value| {
                        resolve.resolve(value);
                        done()
                    },
                    move |reason| {
                        reject.reject(reason);
                        done()
                    },
                );
            }
            Ok(())
        })
    }

    /// Waits for every input to settle and reports each outcome, in input
    /// order. Never rejects.
    pub fn all_settled<I>(inputs: I) -> Promise<Vec<Settled<T>>>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs: Vec<Promise<T>> = inputs.into_iter().map(Promise::resolve).collect();
        Promise::new(move |resolve, _reject| {
            if inputs.is_empty() {
                resolve.resolve(Vec::new());
                return Ok(());
            }
            let slots: Rc<RefCell<Vec<Option<Settled<T>>>>> =
                Rc::new(RefCell::new(vec![None; inputs.len()]));
            let remaining = Rc::new(Cell::new(inputs.len()));
            let record = Rc::new(move |index: usize, outcome: Settled<T>| {
                slots.borrow_mut()[index] = Some(outcome);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let outcomes = slots.borrow_mut().drain(..).flatten().collect();
                    resolve.resolve(outcomes);
                }
            });
            for (index, input) in inputs.into_iter().enumerate() {
                let on_value = record.clone();
                let on_reason = record.clone();
                input.then(
                    move |value| {
                        on_value(index, Settled::Fulfilled(value));
                        done()
                    },
                    move |reason| {
                        on_reason(index, Settled::Rejected(reason));
                        done()
                    },
                );
            }
            Ok(())
        })
    }

    /// Fulfills with the first input to fulfill. Rejects with
    /// [`Error::Aggregate`] only once every input has rejected, carrying the
    /// reasons in input order. With no inputs it rejects straight away.
    pub fn any<I>(inputs: I) -> Promise<T>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs: Vec<Promise<T>> = inputs.into_iter().map(Promise::resolve).collect();
        Promise::new(move |resolve, reject| {
            if inputs.is_empty() {
                reject.reject(Error::Aggregate {
                    reasons: Vec::new(),
                });
                return Ok(());
            }
            let reasons: Rc<RefCell<Vec<Option<Reason>>>> =
                Rc::new(RefCell::new(vec![None; inputs.len()]));
            let remaining = Rc::new(Cell::new(inputs.len()));
            for (index, input) in inputs.into_iter().enumerate() {
                let resolve = resolve.clone();
                let reject = reject.clone();
                let reasons = reasons.clone();
                let remaining = remaining.clone();
                input.then(
                    move |value| {
                        resolve.resolve(value);
                        done()
                    },
                    move |reason| {
                        reasons.borrow_mut()[index] = Some(reason);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            let reasons = reasons.borrow_mut().drain(..).flatten().collect();
                            reject.reject(Error::Aggregate { reasons });
                        }
                        done()
                    },
                );
            }
            Ok(())
        })
    }
}
