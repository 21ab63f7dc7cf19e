//! Host protocol messages: what the page sends in and what the engine sends back.

use serde::{Deserialize, Serialize};

use engagement_engine::{AnalyticsEvent, ChannelRequest, PopupView, SessionStatus, SignalUpdate};

/// Commands a host page issues besides raw signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// The visitor dismissed the popup.
    Close,
    /// The visitor submitted the capture form.
    Submit { contact: String },
    /// Ask for a status snapshot.
    Status,
}

/// One inbound line of the host protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostMessage {
    Signal(SignalUpdate),
    Command(HostCommand),
}

impl From<SignalUpdate> for HostMessage {
    fn from(update: SignalUpdate) -> Self {
        HostMessage::Signal(update)
    }
}

impl From<HostCommand> for HostMessage {
    fn from(command: HostCommand) -> Self {
        HostMessage::Command(command)
    }
}

/// One outbound line of the host protocol.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostOutput {
    /// Render this popup now.
    ShowPopup(PopupView),
    /// Forward this event to the analytics provider.
    Analytics(AnalyticsEvent),
    /// Open the external chat with this message.
    OpenChannel(ChannelRequest),
    Status(SessionStatus),
    Error { message: String },
}

impl HostOutput {
    pub fn error(message: impl Into<String>) -> Self {
        HostOutput::Error {
            message: message.into(),
        }
    }
}
