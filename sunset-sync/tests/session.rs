//! Session lifecycle against the in-memory transport

use std::time::Duration;

use sunset_ble_controller::{LinkError, MemoryTransport};
use sunset_proto::{Brightness, CipherBox, Color, CommandFrame, EncryptedFrame, Speed};
use sunset_sync::{
    Event, LoopState, Mode, NoScreen, SampleError, Screen, SessionConfig, Snapshot, SyncError,
    start,
};
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn default_config_uses_lamp_timing() {
    let config = SessionConfig::default();
    assert_eq!(config.tick_interval, Duration::from_millis(50));
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.speed, Speed::MAX);
}

fn config() -> SessionConfig {
    SessionConfig {
        tick_interval: Duration::from_millis(5),
        ..SessionConfig::default()
    }
}

struct Solid(Color);

impl Screen for Solid {
    fn grab(&mut self) -> Result<Snapshot, SampleError> {
        let Color { r, g, b } = self.0;
        Snapshot::new(vec![r, g, b, r, g, b], 3)
    }
}

/// A screen whose capture takes a while, like a real full-screen grab
struct SlowSolid(Color, Duration);

impl Screen for SlowSolid {
    fn grab(&mut self) -> Result<Snapshot, SampleError> {
        std::thread::sleep(self.1);
        Solid(self.0).grab()
    }
}

async fn wait_for(events: &mut UnboundedReceiver<Event>, wanted: &Event) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}, saw {seen:?}"))
            .unwrap_or_else(|| panic!("event stream closed before {wanted:?}, saw {seen:?}"));
        let found = &event == wanted;
        seen.push(event);
        if found {
            return seen;
        }
    }
}

fn decrypt(payload: &[u8]) -> CommandFrame {
    let block: [u8; 16] = payload.try_into().unwrap();
    CipherBox::new().decrypt(&EncryptedFrame::from_bytes(block)).unwrap()
}

#[tokio::test]
async fn manual_session_runs_until_stopped() {
    let transport = MemoryTransport::new();
    let color = Color::new(255, 0, 128);
    let (session, mut events) = start(transport.clone(), NoScreen, config(), color, Brightness::new(50));

    let seen = wait_for(&mut events, &Event::ColorApplied(color)).await;
    assert_eq!(
        &seen[..2],
        &[Event::State(LoopState::Connecting), Event::Status("Connecting to device...".into())]
    );
    assert!(seen.contains(&Event::State(LoopState::Running(Mode::Manual))));

    session.stop();
    wait_for(&mut events, &Event::State(LoopState::Stopped)).await;
    session.join().await.unwrap();

    let writes = transport.writes();
    assert!(!writes.is_empty());
    let frame = decrypt(&writes[0].payload);
    assert_eq!(
        frame.to_bytes(),
        [0x54, 0x52, 0x00, 0x57, 0x02, 0x01, 0x00, 255, 0, 128, 50, 100, 0, 0, 0, 0]
    );
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn manual_changes_reach_the_lamp() {
    let transport = MemoryTransport::new();
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;

    session.set_manual_brightness(Brightness::new(0));
    session.set_manual_color(Color::new(0, 255, 0));
    wait_for(&mut events, &Event::ColorApplied(Color::new(0, 255, 0))).await;

    session.stop();
    session.join().await.unwrap();

    let last = decrypt(&transport.writes().last().unwrap().payload);
    assert_eq!(last.color(), Color::new(0, 255, 0));
    // manual mode has no brightness floor
    assert_eq!(last.brightness(), Brightness::new(0));
    assert_eq!(last.speed(), Speed::MAX);
}

#[tokio::test]
async fn write_failure_errors_and_releases_once() {
    let transport = MemoryTransport::new();
    transport.fail_write_at(3);
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);

    let seen = loop {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if let Event::State(LoopState::Errored(reason)) = event {
            break reason;
        }
    };
    assert!(seen.contains("write 3 rejected"), "{seen}");

    let result = session.join().await;
    assert!(matches!(result, Err(SyncError::TransportWrite(_))));
    assert_eq!(transport.writes().len(), 3);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn connect_failure_never_runs() {
    let transport = MemoryTransport::new();
    transport.fail_connect();
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);

    let result = session.join().await;
    assert!(matches!(result, Err(SyncError::Connection(LinkError::Connect { .. }))));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(!seen.iter().any(|e| matches!(e, Event::State(LoopState::Running(_)))));
    assert!(seen.iter().any(|e| matches!(e, Event::State(LoopState::Errored(_)))));
    assert_eq!(transport.closes(), 0);
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn connect_timeout_is_reported() {
    let transport = MemoryTransport::new();
    transport.delay_connect(Duration::from_secs(60));
    let config = SessionConfig {
        connect_timeout: Duration::from_millis(20),
        ..config()
    };
    let (session, _events) = start(transport, NoScreen, config, Color::WHITE, Brightness::MAX);

    let result = session.join().await;
    assert!(matches!(result, Err(SyncError::Connection(LinkError::Timeout { .. }))));
}

#[tokio::test]
async fn stalled_discovery_times_out_and_releases() {
    let transport = MemoryTransport::new();
    transport.delay_discovery(Duration::from_secs(60));
    let config = SessionConfig {
        connect_timeout: Duration::from_millis(20),
        ..config()
    };
    let (session, _events) = start(transport.clone(), NoScreen, config, Color::WHITE, Brightness::MAX);

    let result = session.join().await;
    assert!(matches!(result, Err(SyncError::Connection(LinkError::Timeout { .. }))));
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
    assert!(transport.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_capture_on_multi_thread_runtime() {
    let transport = MemoryTransport::new();
    let screen = Color::new(0, 200, 100);
    let (session, mut events) = start(
        transport.clone(),
        SlowSolid(screen, Duration::from_millis(20)),
        config(),
        Color::WHITE,
        Brightness::MAX,
    );
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;

    session.enable_screen_sync(true);
    wait_for(&mut events, &Event::ColorApplied(screen)).await;
    session.stop();
    wait_for(&mut events, &Event::State(LoopState::Stopped)).await;
    session.join().await.unwrap();
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn screen_sync_off_restores_manual_color() {
    let transport = MemoryTransport::new();
    let manual = Color::new(12, 34, 56);
    let screen = Color::new(200, 100, 50);
    let (session, mut events) =
        start(transport.clone(), Solid(screen), config(), manual, Brightness::new(80));
    wait_for(&mut events, &Event::ColorApplied(manual)).await;

    session.enable_screen_sync(true);
    wait_for(&mut events, &Event::State(LoopState::Running(Mode::ScreenSync))).await;
    wait_for(&mut events, &Event::ColorApplied(screen)).await;

    session.set_brightness_override(Brightness::new(20));
    session.set_manual_color(Color::new(1, 1, 1));
    session.enable_screen_sync(false);
    wait_for(&mut events, &Event::State(LoopState::Running(Mode::Manual))).await;
    wait_for(&mut events, &Event::ColorApplied(manual)).await;

    session.stop();
    session.join().await.unwrap();

    let frames: Vec<CommandFrame> = transport.writes().iter().map(|w| decrypt(&w.payload)).collect();
    let synced = frames.iter().find(|f| f.color() == screen).unwrap();
    // luminance of (200,100,50) is 124.2 -> 49%
    assert_eq!(synced.brightness(), Brightness::new(49));
    assert!(!frames.iter().any(|f| f.color() == Color::new(1, 1, 1)));

    let last = frames.last().unwrap();
    assert_eq!(last.color(), manual);
    assert_eq!(last.brightness(), Brightness::new(80));
}

#[tokio::test]
async fn black_screen_uses_brightness_floor() {
    let transport = MemoryTransport::new();
    let (session, mut events) =
        start(transport.clone(), Solid(Color::BLACK), config(), Color::WHITE, Brightness::MAX);
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;

    session.enable_screen_sync(true);
    wait_for(&mut events, &Event::ColorApplied(Color::BLACK)).await;
    session.stop();
    session.join().await.unwrap();

    let last = decrypt(&transport.writes().last().unwrap().payload);
    assert_eq!(last.color(), Color::BLACK);
    assert_eq!(last.brightness(), Brightness::new(5));
}

#[tokio::test]
async fn capture_failure_aborts_session() {
    let transport = MemoryTransport::new();
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;
    let before = transport.writes().len();

    session.enable_screen_sync(true);
    let result = session.join().await;

    assert!(matches!(result, Err(SyncError::Sample(SampleError::Capture(_)))));
    // nothing half-built was sent after the failed capture
    assert!(transport.writes().len() <= before + 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn aborted_session_still_releases() {
    let transport = MemoryTransport::new();
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;

    session.abort();
    assert!(matches!(session.join().await, Err(SyncError::Task(_))));

    for _ in 0..50 {
        if transport.closes() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn dropping_the_handle_stops_the_session() {
    let transport = MemoryTransport::new();
    let (session, mut events) = start(transport.clone(), NoScreen, config(), Color::WHITE, Brightness::MAX);
    wait_for(&mut events, &Event::ColorApplied(Color::WHITE)).await;

    drop(session);
    wait_for(&mut events, &Event::State(LoopState::Stopped)).await;
    assert_eq!(transport.closes(), 1);
}
