//! Session runtime: owns one engine inside a tokio task and feeds it host messages and ticks.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

use engagement_engine::{
    Clock, EngagementEngine, EngineConfig, EnginePorts, FanoutSink, KeyValueStore, MemoryStore,
    SignalUpdate, SystemClock, TracingSink,
};

use crate::types::{HostCommand, HostError, HostMessage, HostOutput, HostResult};

use super::ports::{OutputChannel, OutputSink};

const DEFAULT_TICK_SECS: u64 = 1;
const INBOX_CAPACITY: usize = 256;

/// Builder for a hosted engagement session.
pub struct SessionRuntime {
    config: EngineConfig,
    session_store: Box<dyn KeyValueStore>,
    persistent_store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    tick_interval: Option<Duration>,
}

impl SessionRuntime {
    /// A session with in-memory session storage, the system clock and a
    /// one-second time-on-site tick.
    pub fn new(config: EngineConfig, persistent_store: Box<dyn KeyValueStore>) -> Self {
        Self {
            config,
            session_store: Box::new(MemoryStore::new()),
            persistent_store,
            clock: Box::new(SystemClock),
            tick_interval: Some(Duration::from_secs(DEFAULT_TICK_SECS)),
        }
    }

    pub fn with_session_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.session_store = store;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `None` disables the internal clock; the host must send `tick` messages.
    pub fn with_tick_interval(mut self, interval: Option<Duration>) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Start the session task. The variant is assigned before this returns,
    /// so its `variant_assigned` event is the first output.
    pub fn spawn<R: Rng + Send + 'static>(
        self,
        rng: R,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<HostOutput>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOX_CAPACITY);

        let ports = EnginePorts {
            session_store: self.session_store,
            persistent_store: self.persistent_store,
            analytics: Box::new(
                FanoutSink::new()
                    .with_sink(TracingSink)
                    .with_sink(OutputSink::new(out_tx.clone())),
            ),
            channel: Box::new(OutputChannel::new(out_tx.clone())),
            clock: self.clock,
        };
        let engine = EngagementEngine::new(self.config, ports, rng);
        let session_id = engine.session_id();

        let task = tokio::spawn(run_session(engine, in_rx, out_tx.clone(), self.tick_interval));

        let handle = SessionHandle {
            session_id,
            inbox: Some(in_tx),
            outputs: out_tx,
            task: Some(task),
        };
        (handle, out_rx)
    }
}

/// Control side of a running session. Dropping it tears the session down.
pub struct SessionHandle {
    session_id: Uuid,
    inbox: Option<mpsc::Sender<HostMessage>>,
    outputs: mpsc::UnboundedSender<HostOutput>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue a message for the session.
    pub async fn send(&self, msg: impl Into<HostMessage>) -> HostResult<()> {
        let inbox = self.inbox.as_ref().ok_or(HostError::SessionClosed)?;
        inbox
            .send(msg.into())
            .await
            .map_err(|_| HostError::SessionClosed)
    }

    /// Push an output line directly, bypassing the engine.
    pub fn report(&self, output: HostOutput) {
        let _ = self.outputs.send(output);
    }

    /// Stop accepting messages, let the session drain its inbox, and wait
    /// for it to finish.
    pub async fn close(mut self) -> HostResult<()> {
        self.inbox.take();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| HostError::Protocol(format!("Session task failed: {e}")))?;
        }
        Ok(())
    }

    /// Stop the session immediately, dropping anything still queued.
    pub fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_session<R: Rng>(
    mut engine: EngagementEngine<R>,
    mut inbox: mpsc::Receiver<HostMessage>,
    outputs: mpsc::UnboundedSender<HostOutput>,
    tick_interval: Option<Duration>,
) {
    let mut ticker = tick_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    tracing::info!("Session {} running", engine.session_id());

    loop {
        tokio::select! {
            msg = inbox.recv() => match msg {
                Some(msg) => handle_message(&mut engine, msg, &outputs),
                None => break,
            },
            _ = next_tick(&mut ticker) => {
                handle_message(&mut engine, HostMessage::Signal(SignalUpdate::Tick), &outputs);
            }
        }
    }

    tracing::info!(
        "Session {} ended after {}s",
        engine.session_id(),
        engine.metrics().time_on_site_seconds
    );
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Apply one message to the engine. Everything here runs in a single turn.
fn handle_message<R: Rng>(
    engine: &mut EngagementEngine<R>,
    msg: HostMessage,
    outputs: &mpsc::UnboundedSender<HostOutput>,
) {
    let output = match msg {
        HostMessage::Signal(update) => engine.apply(update).map(HostOutput::ShowPopup),
        HostMessage::Command(HostCommand::Close) => {
            if !engine.close() {
                tracing::debug!("Close ignored, no popup showing");
            }
            None
        }
        HostMessage::Command(HostCommand::Submit { contact }) => match engine.submit(&contact) {
            Ok(Some(_)) => None,
            Ok(None) => Some(HostOutput::error("No popup is showing")),
            Err(e) => Some(HostOutput::error(e.to_string())),
        },
        HostMessage::Command(HostCommand::Status) => Some(HostOutput::Status(engine.status())),
    };

    if let Some(output) = output {
        let _ = outputs.send(output);
    }
}
