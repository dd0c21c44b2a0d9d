//! Hand-off of deferred work onto the control context
//!
//! Driver events can arrive on whatever thread the driver uses for them.
//! Anything that runs caller code (scan callbacks, status notifications) is
//! posted here instead and executed later by whoever owns the `ControlLoop`,
//! in the order it was posted.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// A unit of deferred work.
pub type Deferred = Box<dyn FnOnce() + Send + 'static>;

/// Sending half. Cheap to clone, never blocks, safe to use from any thread.
#[derive(Clone)]
pub struct EventMarshal {
    tx: UnboundedSender<Deferred>,
}

/// Receiving half, owned by the control context.
pub struct ControlLoop {
    rx: UnboundedReceiver<Deferred>,
}

impl EventMarshal {
    pub fn channel() -> (EventMarshal, ControlLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventMarshal { tx }, ControlLoop { rx })
    }

    /// Queue `f` for the control context. Returns `false` if the control
    /// loop is gone and `f` was dropped unrun.
    pub fn invoke<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(f)).is_err() {
            error!("wifi::marshal: Control loop closed, dropping deferred callback");
            return false;
        }
        true
    }
}

impl ControlLoop {
    /// Run everything queued so far, including work queued by the work being
    /// run. Returns the number of callbacks executed.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(f) => {
                    f();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Process deferred work until every `EventMarshal` has been dropped.
    pub async fn run(mut self) {
        while let Some(f) = self.rx.recv().await {
            f();
        }
        debug!("wifi::marshal: All senders dropped, control loop exiting");
    }
}
