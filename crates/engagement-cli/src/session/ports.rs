//! Engine ports that forward into the host output stream.

use tokio::sync::mpsc;

use engagement_engine::{
    AnalyticsEvent, AnalyticsSink, ChannelRequest, EngineError, EngineResult, MessagingChannel,
};

use crate::types::HostOutput;

/// Sends every analytics event to the host as an `analytics` line.
pub struct OutputSink {
    tx: mpsc::UnboundedSender<HostOutput>,
}

impl OutputSink {
    pub fn new(tx: mpsc::UnboundedSender<HostOutput>) -> Self {
        Self { tx }
    }
}

impl AnalyticsSink for OutputSink {
    fn emit(&self, event: &AnalyticsEvent) {
        if self.tx.send(HostOutput::Analytics(event.clone())).is_err() {
            tracing::debug!("Host gone, dropping analytics event {}", event.name);
        }
    }
}

/// Asks the host to open the chat channel with an `open_channel` line.
pub struct OutputChannel {
    tx: mpsc::UnboundedSender<HostOutput>,
}

impl OutputChannel {
    pub fn new(tx: mpsc::UnboundedSender<HostOutput>) -> Self {
        Self { tx }
    }
}

impl MessagingChannel for OutputChannel {
    fn open(&self, request: &ChannelRequest) -> EngineResult<()> {
        self.tx
            .send(HostOutput::OpenChannel(request.clone()))
            .map_err(|_| EngineError::Channel("host disconnected".to_string()))
    }
}
