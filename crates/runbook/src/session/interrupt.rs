//! Operator interrupts.
//!
//! An [`InterruptTrigger`] is held by whoever observes the operator's Ctrl-C.
//! Sessions hold an [`Interrupt`] and check it while they wait, so a blocked
//! wait returns [`DriverError::Interrupted`](crate::DriverError::Interrupted)
//! and the caller's cleanup runs through ordinary error propagation.

use std::sync::Arc;

use tokio::sync::watch;

/// The raising side of an interrupt.
#[derive(Debug, Clone)]
pub struct InterruptTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// The observing side of an interrupt. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger and interrupt.
#[must_use]
pub fn interrupt_pair() -> (InterruptTrigger, Interrupt) {
    let (tx, rx) = watch::channel(false);
    (InterruptTrigger { tx: Arc::new(tx) }, Interrupt { rx })
}

impl InterruptTrigger {
    /// Raise the interrupt. Every connected [`Interrupt`] observes it.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
        tracing::debug!("interrupt raised");
    }

    /// Whether the interrupt has been raised.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another observer of this trigger.
    #[must_use]
    pub fn subscribe(&self) -> Interrupt {
        Interrupt {
            rx: self.tx.subscribe(),
        }
    }
}

impl Interrupt {
    /// An interrupt that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether the interrupt has been raised.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the interrupt is raised.
    ///
    /// Pends forever when the trigger was dropped without firing.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let (trigger, interrupt) = interrupt_pair();
        let other = trigger.subscribe();
        assert!(!interrupt.is_triggered());

        let waiter = tokio::spawn(async move { interrupt.triggered().await });
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(other.is_triggered());
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let interrupt = Interrupt::never();
        let result = tokio::time::timeout(Duration::from_millis(50), interrupt.triggered()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn late_observer_sees_earlier_trigger() {
        let (trigger, interrupt) = interrupt_pair();
        trigger.trigger();
        drop(trigger);

        tokio::time::timeout(Duration::from_millis(50), interrupt.triggered())
            .await
            .unwrap();
    }
}
