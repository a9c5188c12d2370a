/// Playback timing - repeating callbacks polled from the host frame loop
///
/// The host calls [`Scheduler::tick`] once per frame. An entry fires when more
/// than its interval has passed since it last fired, so timing resolution is
/// bounded by the frame rate and late fires are never compensated.
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Millisecond time source
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall clock measured from construction
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// handle and give the other to a scheduler.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

type Callback<C> = Box<dyn FnMut(&mut C)>;

struct Entry<C> {
    id: TimerId,
    interval_ms: f64,
    last_fire_ms: f64,
    callback: Callback<C>,
}

impl<C> Entry<C> {
    fn is_due(&self, now: f64) -> bool {
        // zero or negative intervals encode "never fires"
        self.interval_ms > 0.0 && now - self.last_fire_ms > self.interval_ms
    }
}

/// Registry of repeating callbacks over a context `C`.
///
/// Due entries fire in registration order.
pub struct Scheduler<C> {
    clock: Box<dyn Clock>,
    entries: Vec<Entry<C>>,
    next_id: u64,
}

impl<C> Scheduler<C> {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Register `callback` to run every `interval_ms`. The first fire comes
    /// one full interval after registration.
    pub fn schedule<F>(&mut self, interval_ms: f64, callback: F) -> TimerId
    where
        F: FnMut(&mut C) + 'static,
    {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            interval_ms,
            last_fire_ms: self.clock.now_ms(),
            callback: Box::new(callback),
        });
        id
    }

    /// Remove an entry. Unknown ids are ignored.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn interval_ms(&self, id: TimerId) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.interval_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One pass of the frame loop. Returns how many callbacks fired.
    pub fn tick(&mut self, context: &mut C) -> usize {
        let mut fired = 0;

        for entry in &mut self.entries {
            let now = self.clock.now_ms();
            if entry.is_due(now) {
                (entry.callback)(context);
                // re-anchor on the actual fire time
                entry.last_fire_ms = self.clock.now_ms();
                fired += 1;
            }
        }

        fired
    }
}
