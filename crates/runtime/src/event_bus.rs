/// A recorded event, stamped with the pass that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<E> {
    pub pass: u64,
    pub event: E,
}

/// Ordered in-memory event log holding the most recent pass.
///
/// Producers stamp events with the current pass (one reconciliation run, one
/// overlay render, ...). Starting a pass discards everything recorded before
/// it, so the log never holds more than one pass worth of events. Consumers
/// read or drain them in emission order.
#[derive(Debug)]
pub struct EventBus<E> {
    pass: u64,
    events: Vec<Event<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            pass: 0,
            events: Vec::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&self) -> u64 {
        self.pass
    }

    /// Starts a new pass and returns its index. Events of earlier passes
    /// that were not drained are dropped.
    pub fn begin_pass(&mut self) -> u64 {
        self.events.clear();
        self.pass += 1;
        self.pass
    }

    pub fn emit(&mut self, event: E) {
        self.events.push(Event {
            pass: self.pass,
            event,
        });
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }
}
