use tokio::sync::watch;

/// One-shot "map loaded" latch.
///
/// Subsystems that need a loaded map take a [`ReadySignal`] and await it once,
/// instead of re-checking a flag every time their inputs change.
#[derive(Debug)]
pub struct Readiness {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadinessClosed;

impl std::fmt::Display for ReadinessClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "map was dropped before it became ready")
    }
}

impl std::error::Error for ReadinessClosed {}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Latches the ready state. Later calls are no-ops.
    pub fn mark_ready(&self) {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> ReadySignal {
        ReadySignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the map is ready. Resolves immediately if it already is.
    pub async fn wait(&mut self) -> Result<(), ReadinessClosed> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| ReadinessClosed)
    }
}
