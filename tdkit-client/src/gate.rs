//! Boolean lifecycle flags that tasks can wait on.

use tokio::sync::watch;

/// A single boolean with any number of waiters.
pub(crate) struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new(initial: bool) -> Self {
        Self { tx: watch::Sender::new(initial) }
    }

    pub(crate) fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Set the value, returning the previous one.
    pub(crate) fn set(&self, value: bool) -> bool {
        self.tx.send_replace(value)
    }

    /// Resolve once the gate holds `value`.
    pub(crate) async fn wait_for(&self, value: bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while borrowed.
        let _ = rx.wait_for(|v| *v == value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_wake_on_change() {
        let gate = Arc::new(Gate::new(false));
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_for(true).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        assert!(!gate.set(true));
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        // Already satisfied: returns immediately.
        gate.wait_for(true).await;
        assert!(gate.get());
    }
}
