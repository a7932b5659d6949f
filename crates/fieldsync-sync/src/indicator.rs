//! The "processing" indicator a host UI can watch.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared on/off flag with change notification. Clones share the flag.
#[derive(Debug, Clone)]
pub struct ProcessingIndicator {
    tx: Arc<watch::Sender<bool>>,
}

impl ProcessingIndicator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, processing: bool) {
        let previous = self.tx.send_replace(processing);
        if previous != processing {
            tracing::debug!(processing, "processing indicator changed");
        }
    }

    pub fn is_processing(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ProcessingIndicator {
    fn default() -> Self {
        Self::new()
    }
}
