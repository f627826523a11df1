use std::sync::Arc;
use tokio::sync::watch;

/// Busy flag shown to users while a lifecycle action is in flight.
#[derive(Debug, Clone)]
pub struct LoadingIndicator {
    flag: Arc<watch::Sender<bool>>,
}

impl LoadingIndicator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { flag: Arc::new(tx) }
    }

    pub fn set(&self, loading: bool) {
        self.flag.send_if_modified(|current| {
            let changed = *current != loading;
            *current = loading;
            changed
        });
    }

    pub fn is_loading(&self) -> bool {
        *self.flag.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

impl Default for LoadingIndicator {
    fn default() -> Self {
        Self::new()
    }
}
