use tokio::sync::watch;

/// Stop signal shared by the background loops.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Resolves once shutdown has been requested or the trigger is gone.
    pub async fn wait(&mut self) {
        // An error means the trigger was dropped, which also ends the loops.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
