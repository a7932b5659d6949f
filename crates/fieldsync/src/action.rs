//! Named actions: the string-keyed entry points the local runtime calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Every action the engine answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedAction {
    SubscribeUpdates,
    InboundUpdates,
    EditsUpdateStatus,
    UpdatesContainerDownloads,
    WebSyncReceivePayload,
    IsProcessing,
    EndProcessing,
}

impl NamedAction {
    pub const ALL: [NamedAction; 7] = [
        Self::SubscribeUpdates,
        Self::InboundUpdates,
        Self::EditsUpdateStatus,
        Self::UpdatesContainerDownloads,
        Self::WebSyncReceivePayload,
        Self::IsProcessing,
        Self::EndProcessing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubscribeUpdates => "subscribeUpdates",
            Self::InboundUpdates => "inboundUpdates",
            Self::EditsUpdateStatus => "editsUpdateStatus",
            Self::UpdatesContainerDownloads => "updatesContainerDownloads",
            Self::WebSyncReceivePayload => "webSyncReceivePayload",
            Self::IsProcessing => "isProcessing",
            Self::EndProcessing => "endProcessing",
        }
    }
}

impl fmt::Display for NamedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamedAction {
    type Err = EngineError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| EngineError::UnknownAction(name.to_string()))
    }
}

/// A `{name, options}` request as sent by the runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

/// What every action answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<EngineError> for ActionResult {
    fn from(e: EngineError) -> Self {
        Self::failure(e.to_string())
    }
}
