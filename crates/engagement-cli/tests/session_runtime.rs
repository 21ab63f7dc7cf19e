//! Integration tests for hosted engagement sessions.
//!
//! Drives a `SessionRuntime` the way a host page would: signals and commands
//! go in through the handle, protocol lines come out of the output channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tokio::sync::mpsc;

use engagement_cli::session::SessionRuntime;
use engagement_cli::types::{HostCommand, HostOutput};
use engagement_engine::{
    EngineConfig, FileStore, KeyValueStore, ManualClock, MemoryStore, SignalUpdate, Variant,
};

// ─────────────────────── helpers ───────────────────────

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Session store pre-seeded so the variant is known up front.
fn pinned(variant: Variant) -> Box<dyn KeyValueStore> {
    let mut store = MemoryStore::new();
    store.set("assignedVariant", variant.as_str()).unwrap();
    Box::new(store)
}

/// Runtime without an internal clock, on a manual wall clock.
fn runtime(
    variant: Variant,
    persistent: Box<dyn KeyValueStore>,
    clock: &ManualClock,
) -> SessionRuntime {
    SessionRuntime::new(EngineConfig::default(), persistent)
        .with_session_store(pinned(variant))
        .with_clock(Box::new(clock.clone()))
        .with_tick_interval(None)
}

fn as_json(output: &HostOutput) -> Value {
    serde_json::to_value(output).unwrap()
}

/// Receive outputs until one satisfies `pred` or five seconds elapse.
async fn wait_for(
    outputs: &mut mpsc::UnboundedReceiver<HostOutput>,
    pred: impl Fn(&Value) -> bool,
) -> Option<Value> {
    wait_for_within(outputs, Duration::from_secs(5), pred).await
}

async fn wait_for_within(
    outputs: &mut mpsc::UnboundedReceiver<HostOutput>,
    limit: Duration,
    pred: impl Fn(&Value) -> bool,
) -> Option<Value> {
    let deadline = tokio::time::timeout(limit, async {
        while let Some(out) = outputs.recv().await {
            let json = as_json(&out);
            if pred(&json) {
                return Some(json);
            }
        }
        None
    });
    deadline.await.ok().flatten()
}

/// Drain everything already queued without waiting.
fn drain(outputs: &mut mpsc::UnboundedReceiver<HostOutput>) -> Vec<Value> {
    let mut all = Vec::new();
    while let Ok(out) = outputs.try_recv() {
        all.push(as_json(&out));
    }
    all
}

fn is_type(json: &Value, ty: &str) -> bool {
    json["type"] == ty
}

fn is_event(json: &Value, name: &str) -> bool {
    is_type(json, "analytics") && json["name"] == name
}

async fn send_ticks(handle: &engagement_cli::SessionHandle, n: usize) {
    for _ in 0..n {
        handle.send(SignalUpdate::Tick).await.unwrap();
    }
}

// ═══════════════════════════════════════════════════════
// TRIGGER SCENARIOS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_first_output_is_variant_assignment() {
    let (handle, mut outputs) = SessionRuntime::new(EngineConfig::default(), Box::new(MemoryStore::new()))
        .with_tick_interval(None)
        .spawn(ChaCha8Rng::seed_from_u64(99));

    let first = outputs.recv().await.map(|o| as_json(&o)).unwrap();
    assert!(is_event(&first, "variant_assigned"));
    assert_eq!(first["params"]["session_id"], handle.session_id().to_string());

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_guide_session_triggers_at_sixty_seconds() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) =
        runtime(Variant::Guide, Box::new(MemoryStore::new()), &clock).spawn(ChaCha8Rng::seed_from_u64(1));

    handle
        .send(SignalUpdate::Scroll {
            scroll_top: 2400.0,
            viewport_height: 800.0,
            document_height: 4000.0,
        })
        .await
        .unwrap();
    send_ticks(&handle, 59).await;
    handle.send(HostCommand::Status).await.unwrap();

    let status = wait_for(&mut outputs, |j| is_type(j, "status")).await.unwrap();
    assert_eq!(status["metrics"]["time_on_site_seconds"], 59);
    assert_eq!(status["phase"], "evaluating");

    send_ticks(&handle, 1).await;
    let popup = wait_for(&mut outputs, |j| is_type(j, "show_popup")).await.unwrap();
    assert_eq!(popup["variant"], "guide");
    assert!(popup["content"]["headline"].as_str().unwrap().contains("Guide"));

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_consultation_exit_intent() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) = runtime(Variant::Consultation, Box::new(MemoryStore::new()), &clock)
        .spawn(ChaCha8Rng::seed_from_u64(2));

    send_ticks(&handle, 5).await;
    handle.send(SignalUpdate::PointerLeave { y: -3.0 }).await.unwrap();

    let triggered = wait_for(&mut outputs, |j| is_event(j, "popup_triggered")).await.unwrap();
    assert_eq!(triggered["params"]["exit_intent_fired"], true);
    assert_eq!(triggered["params"]["time_on_site_seconds"], 5);
    assert_eq!(triggered["params"]["max_scroll_depth_percent"], 0.0);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_popup_triggered_at_most_once() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) = runtime(Variant::Recommendation, Box::new(MemoryStore::new()), &clock)
        .spawn(ChaCha8Rng::seed_from_u64(3));

    for _ in 0..5 {
        handle.send(SignalUpdate::Navigation).await.unwrap();
    }
    send_ticks(&handle, 120).await;
    handle.close().await.unwrap();

    let all = drain(&mut outputs);
    assert_eq!(all.iter().filter(|j| is_event(j, "popup_triggered")).count(), 1);
    assert_eq!(all.iter().filter(|j| is_type(j, "show_popup")).count(), 1);
}

#[tokio::test]
async fn test_control_session_stays_silent() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) =
        runtime(Variant::Control, Box::new(MemoryStore::new()), &clock).spawn(ChaCha8Rng::seed_from_u64(4));

    handle.send(SignalUpdate::Navigation).await.unwrap();
    handle.send(SignalUpdate::PointerLeave { y: 0.0 }).await.unwrap();
    send_ticks(&handle, 300).await;
    handle.close().await.unwrap();

    let all = drain(&mut outputs);
    assert!(all.iter().all(|j| !is_type(j, "show_popup")));
}

// ═══════════════════════════════════════════════════════
// FREQUENCY CAP
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_frequency_cap_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let clock = ManualClock::new(t0());

    // Session 1: shown and closed at T0.
    let (handle, mut outputs) = runtime(
        Variant::Recommendation,
        Box::new(FileStore::open(&state_path).unwrap()),
        &clock,
    )
    .spawn(ChaCha8Rng::seed_from_u64(5));
    handle.send(SignalUpdate::Navigation).await.unwrap();
    wait_for(&mut outputs, |j| is_type(j, "show_popup")).await.unwrap();
    handle.send(HostCommand::Close).await.unwrap();
    wait_for(&mut outputs, |j| is_event(j, "popup_closed")).await.unwrap();
    handle.close().await.unwrap();

    // Session 2 at T0 + 23h59m: same rule met, nothing shown.
    clock.set(t0() + chrono::Duration::hours(23) + chrono::Duration::minutes(59));
    let (handle, mut outputs) = runtime(
        Variant::Recommendation,
        Box::new(FileStore::open(&state_path).unwrap()),
        &clock,
    )
    .spawn(ChaCha8Rng::seed_from_u64(6));
    handle.send(SignalUpdate::Navigation).await.unwrap();
    send_ticks(&handle, 200).await;
    handle.close().await.unwrap();
    assert!(drain(&mut outputs).iter().all(|j| !is_type(j, "show_popup")));

    // Session 3 at T0 + 24h01m: shown again.
    clock.set(t0() + chrono::Duration::hours(24) + chrono::Duration::minutes(1));
    let (handle, mut outputs) = runtime(
        Variant::Recommendation,
        Box::new(FileStore::open(&state_path).unwrap()),
        &clock,
    )
    .spawn(ChaCha8Rng::seed_from_u64(7));
    handle.send(SignalUpdate::Navigation).await.unwrap();
    assert!(wait_for(&mut outputs, |j| is_type(j, "show_popup")).await.is_some());
    handle.close().await.unwrap();
}

// ═══════════════════════════════════════════════════════
// CONVERSION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_submit_opens_channel_after_conversion_event() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) = runtime(Variant::Recommendation, Box::new(MemoryStore::new()), &clock)
        .spawn(ChaCha8Rng::seed_from_u64(8));

    handle.send(SignalUpdate::Navigation).await.unwrap();
    wait_for(&mut outputs, |j| is_type(j, "show_popup")).await.unwrap();

    handle
        .send(HostCommand::Submit {
            contact: "  ".to_string(),
        })
        .await
        .unwrap();
    let err = wait_for(&mut outputs, |j| is_type(j, "error")).await.unwrap();
    assert!(err["message"].as_str().unwrap().contains("contact"));

    handle
        .send(HostCommand::Submit {
            contact: "minji@example.com".to_string(),
        })
        .await
        .unwrap();
    handle.close().await.unwrap();

    let rest = drain(&mut outputs);
    let conversion = rest.iter().position(|j| is_event(j, "popup_conversion")).unwrap();
    let channel = rest.iter().position(|j| is_type(j, "open_channel")).unwrap();
    assert!(conversion < channel);
    assert_eq!(rest[channel]["contact"], "minji@example.com");
    assert!(rest[channel]["message"]
        .as_str()
        .unwrap()
        .contains("recommendations"));
}

#[tokio::test]
async fn test_submit_without_popup_reports_error() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) =
        runtime(Variant::Guide, Box::new(MemoryStore::new()), &clock).spawn(ChaCha8Rng::seed_from_u64(9));

    handle
        .send(HostCommand::Submit {
            contact: "010-2222-3333".to_string(),
        })
        .await
        .unwrap();
    let err = wait_for(&mut outputs, |j| is_type(j, "error")).await.unwrap();
    assert_eq!(err["message"], "No popup is showing");

    handle.close().await.unwrap();
}

// ═══════════════════════════════════════════════════════
// LIFECYCLE
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_internal_clock_drives_time_on_site() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) = SessionRuntime::new(EngineConfig::default(), Box::new(MemoryStore::new()))
        .with_session_store(pinned(Variant::Recommendation))
        .with_clock(Box::new(clock))
        .spawn(ChaCha8Rng::seed_from_u64(10));

    // Recommendation fires at 90s without any host input.
    let popup =
        wait_for_within(&mut outputs, Duration::from_secs(600), |j| is_type(j, "show_popup")).await;
    assert!(popup.is_some());

    handle.send(HostCommand::Status).await.unwrap();
    let status = wait_for(&mut outputs, |j| is_type(j, "status")).await.unwrap();
    assert!(status["metrics"]["time_on_site_seconds"].as_u64().unwrap() >= 90);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_output_stream() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) =
        runtime(Variant::Guide, Box::new(MemoryStore::new()), &clock).spawn(ChaCha8Rng::seed_from_u64(11));

    handle.shutdown();
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while outputs.recv().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_the_tick() {
    let clock = ManualClock::new(t0());
    let (handle, mut outputs) = SessionRuntime::new(EngineConfig::default(), Box::new(MemoryStore::new()))
        .with_session_store(pinned(Variant::Control))
        .with_clock(Box::new(clock))
        .spawn(ChaCha8Rng::seed_from_u64(12));
    assert!(!handle.session_id().is_nil());

    drop(handle);
    let ended = tokio::time::timeout(Duration::from_secs(60), async {
        while outputs.recv().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());
}
