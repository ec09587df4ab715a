//! Deferred task scheduling.
//!
//! Promises never run callbacks synchronously. Every reaction is handed to a
//! [`Schedule`] implementation as a [`Task`] and runs once the current
//! synchronous stack has unwound. The default implementation is the
//! thread-local [`EventLoop`], which keeps a FIFO microtask queue and a
//! virtual-time timer queue. Microtasks always drain before the next timer
//! fires.
use crate::Error;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Debug;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

pub type Task = Box<dyn FnOnce()>;

/// Something that can run a task later, after the caller returns.
pub trait Schedule {
    fn defer(&self, task: Task);
}

thread_local! {
    static EVENT_LOOP: Rc<EventLoop> = Rc::new(EventLoop::default());
    static OVERRIDE: RefCell<Option<Rc<dyn Schedule>>> = const { RefCell::new(None) };
}

/// The scheduler new promises on this thread will use.
pub fn current() -> Rc<dyn Schedule> {
    let installed = OVERRIDE.with(|slot| slot.borrow().clone());
    match installed {
        Some(scheduler) => scheduler,
        None => EventLoop::current() as Rc<dyn Schedule>,
    }
}

/// Installs `scheduler` for this thread, or restores the default event loop
/// with `None`. Returns whatever was installed before.
pub fn set_current(scheduler: Option<Rc<dyn Schedule>>) -> Option<Rc<dyn Schedule>> {
    OVERRIDE.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), scheduler))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Upper bound on microtasks run by a single drain. `None` disables it.
    pub microtask_limit: Option<usize>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            microtask_limit: Some(1_000_000),
        }
    }
}

impl LoopConfig {
    pub fn microtask_limit(mut self, limit: Option<usize>) -> Self {
        self.microtask_limit = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub microtasks: usize,
    pub timers: usize,
}

impl RunStats {
    fn absorb(&mut self, other: RunStats) {
        self.microtasks += other.microtasks;
        self.timers += other.timers;
    }
}

/// A single-threaded event loop with a microtask queue and virtual-time
/// timers.
///
/// # Examples
///
/// ```
/// use promise_aplus::scheduler::EventLoop;
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let (a, b) = (log.clone(), log.clone());
/// event_loop.set_timeout(Duration::from_millis(5), move || a.borrow_mut().push("timer"));
/// event_loop.queue_microtask(move || b.borrow_mut().push("microtask"));
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(*log.borrow(), vec!["microtask", "timer"]);
/// assert_eq!(event_loop.now(), Duration::from_millis(5));
/// ```
pub struct EventLoop {
    config: LoopConfig,
    microtasks: RefCell<VecDeque<Task>>,
    timers: RefCell<BTreeMap<(Duration, TimerId), Task>>,
    deadlines: RefCell<HashMap<TimerId, Duration>>,
    now: Cell<Duration>,
    next_timer: Cell<u64>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::with_config(LoopConfig::default())
    }
}

impl Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.config)
            .field("now", &self.now.get())
            .field("microtasks", &self.pending_microtasks())
            .field("timers", &self.pending_timers())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            config,
            microtasks: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BTreeMap::new()),
            deadlines: RefCell::new(HashMap::new()),
            now: Cell::new(Duration::ZERO),
            next_timer: Cell::new(0),
        }
    }

    /// This thread's default loop.
    pub fn current() -> Rc<EventLoop> {
        EVENT_LOOP.with(Rc::clone)
    }

    pub fn config(&self) -> LoopConfig {
        self.config
    }

    /// Virtual time elapsed since the loop was created.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.microtasks.borrow_mut().push_back(Box::new(task));
    }

    /// Runs `task` once `after` has elapsed on the virtual clock. Timers with
    /// equal deadlines fire in the order they were set. Deadlines saturate at
    /// `Duration::MAX`.
    pub fn set_timeout(&self, after: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);
        let deadline = self.now.get().saturating_add(after);
        trace!(target: "promise_aplus", timer = id.0, ?deadline, "timer set");
        self.timers.borrow_mut().insert((deadline, id), Box::new(task));
        self.deadlines.borrow_mut().insert(id, deadline);
        id
    }

    /// Returns `false` if the timer already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        match self.deadlines.borrow_mut().remove(&id) {
            Some(deadline) => self.timers.borrow_mut().remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    /// Drains the microtask queue, including tasks queued while draining.
    pub fn run_microtasks(&self) -> Result<RunStats, Error> {
        let mut ran = 0;
        loop {
            if let Some(limit) = self.config.microtask_limit {
                if ran >= limit && self.pending_microtasks() > 0 {
                    debug!(target: "promise_aplus", limit, "microtask limit exceeded");
                    return Err(Error::MicrotaskLimit { limit });
                }
            }
            let task = self.microtasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        Ok(RunStats {
            microtasks: ran,
            timers: 0,
        })
    }

    /// Runs microtasks and timers until there is nothing left to do. The
    /// clock jumps forward to each timer's deadline as it fires.
    pub fn run_until_idle(&self) -> Result<RunStats, Error> {
        let stats = self.run_timers_until(None)?;
        debug!(
            target: "promise_aplus",
            microtasks = stats.microtasks,
            timers = stats.timers,
            now = ?self.now.get(),
            "event loop idle"
        );
        Ok(stats)
    }

    /// Moves the clock forward by `by`, firing the timers that fall due.
    pub fn advance(&self, by: Duration) -> Result<RunStats, Error> {
        let until = self.now.get().saturating_add(by);
        let stats = self.run_timers_until(Some(until))?;
        self.now.set(until);
        Ok(stats)
    }

    fn run_timers_until(&self, until: Option<Duration>) -> Result<RunStats, Error> {
        let mut stats = self.run_microtasks()?;
        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let due = timers
                    .first_key_value()
                    .map(|(&(deadline, _), _)| deadline)
                    .filter(|deadline| until.map_or(true, |until| *deadline <= until));
                match due {
                    Some(_) => timers.pop_first(),
                    None => None,
                }
            };
            let Some(((deadline, id), task)) = next else {
                break;
            };
            self.deadlines.borrow_mut().remove(&id);
            if deadline > self.now.get() {
                self.now.set(deadline);
            }
            trace!(target: "promise_aplus", timer = id.0, ?deadline, "timer fired");
            task();
            stats.timers += 1;
            stats.absorb(self.run_microtasks()?);
        }
        Ok(stats)
    }
}

impl Schedule for EventLoop {
    fn defer(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }
}
