//! The local runtime seam.
//!
//! The runtime executes named scripts. Invocation is one-way: the runtime
//! reports the outcome later by calling [`crate::Bridge::callback`] with the
//! correlation id it was handed.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;

/// Script the runtime exposes for correlated calls.
pub const WEBHOOK_SCRIPT: &str = "_fmBridgit.webhook";

/// Script used to hand results back to the runtime.
pub const RETURN_RESULT_SCRIPT: &str = "_fmBridgit.returnResult";

/// Script the runtime calls once a container upload finishes.
pub const UPLOAD_COMPLETE_SCRIPT: &str = "API - Upload Complete Callback";

/// A host runtime able to run scripts.
///
/// Implementations must be thread-safe (Send + Sync). `invoke` must not
/// block on the script's completion.
pub trait Runtime: Send + Sync {
    /// Queue `script` with a JSON text parameter.
    fn invoke(&self, script: &str, parameter: &str) -> Result<()>;
}

/// Holds the runtime once the host has injected it.
///
/// The host may inject late (or never); callers probe the slot.
#[derive(Default)]
pub struct RuntimeSlot {
    runtime: RwLock<Option<Arc<dyn Runtime>>>,
}

impl RuntimeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, runtime: Arc<dyn Runtime>) {
        *self.runtime.write().unwrap_or_else(PoisonError::into_inner) = Some(runtime);
    }

    pub fn eject(&self) -> Option<Arc<dyn Runtime>> {
        self.runtime
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn get(&self) -> Option<Arc<dyn Runtime>> {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for RuntimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSlot")
            .field("present", &self.is_present())
            .finish()
    }
}
