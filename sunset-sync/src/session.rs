//! Session task: connect, then tick until stopped or failed

use std::time::Duration;

use sunset_ble_controller::{CONNECT_TIMEOUT, DeviceLink, LinkError, Transport, TransportError};
use sunset_proto::ble::DEFAULT_ADDRESS;
use sunset_proto::{Brightness, Color, Speed};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::sampler::{SampleError, Screen, ScreenSampler};
use crate::state::{Control, LoopState, Mode, RuntimeState};

/// Pause between ticks. Bounds both the write rate and the capture rate.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Connection(#[from] LinkError),
    #[error("write failed: {0}")]
    TransportWrite(#[source] TransportError),
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error("session task ended abnormally: {0}")]
    Task(String),
}

/// Notifications for the control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    State(LoopState),
    Status(String),
    /// One per successful write, carrying the color the lamp now shows
    ColorApplied(Color),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub address: String,
    pub connect_timeout: Duration,
    pub tick_interval: Duration,
    pub speed: Speed,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            tick_interval: TICK_INTERVAL,
            speed: Speed::default(),
        }
    }
}

struct Events(UnboundedSender<Event>);

impl Events {
    // The control surface may have gone away; the session carries on regardless.
    fn send(&self, event: Event) {
        let _ = self.0.send(event);
    }

    fn state(&self, state: LoopState) {
        self.send(Event::State(state));
    }

    fn status(&self, text: impl Into<String>) {
        self.send(Event::Status(text.into()));
    }
}

/// Control-surface side of a running session
pub struct SessionHandle {
    controls: UnboundedSender<Control>,
    task: JoinHandle<Result<(), SyncError>>,
}

impl SessionHandle {
    fn send(&self, control: Control) {
        if self.controls.send(control).is_err() {
            warn!(?control, "session already finished");
        }
    }

    pub fn set_manual_color(&self, color: Color) {
        self.send(Control::SetManualColor(color));
    }

    pub fn set_manual_brightness(&self, brightness: Brightness) {
        self.send(Control::SetManualBrightness(brightness));
    }

    pub fn set_brightness_override(&self, brightness: Brightness) {
        self.send(Control::SetBrightnessOverride(brightness));
    }

    pub fn enable_screen_sync(&self, enabled: bool) {
        self.send(Control::EnableScreenSync(enabled));
    }

    /// Ask the session to stop. It finishes the current write, releases
    /// the connection and ends in [`LoopState::Stopped`].
    pub fn stop(&self) {
        self.send(Control::Stop);
    }

    /// Cancel the session task outright. The connection is still released.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the session to end
    pub async fn join(self) -> Result<(), SyncError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Task(e.to_string())),
        }
    }
}

/// Start a session on the current tokio runtime. Every session starts from
/// scratch in [`LoopState::Connecting`] with `manual_color` and
/// `manual_brightness` as the manual values.
pub fn start<T, S>(
    transport: T,
    screen: S,
    config: SessionConfig,
    manual_color: Color,
    manual_brightness: Brightness,
) -> (SessionHandle, UnboundedReceiver<Event>)
where
    T: Transport,
    S: Screen,
{
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let state = RuntimeState::new(manual_color, manual_brightness);
    let task = tokio::spawn(run(transport, screen, config, state, control_rx, Events(event_tx)));

    (SessionHandle { controls: control_tx, task }, event_rx)
}

async fn run<T: Transport, S: Screen>(
    transport: T,
    screen: S,
    config: SessionConfig,
    mut state: RuntimeState,
    mut controls: UnboundedReceiver<Control>,
    events: Events,
) -> Result<(), SyncError> {
    events.state(LoopState::Connecting);
    events.status("Connecting to device...");

    let link = match DeviceLink::connect(transport, &config.address, config.connect_timeout).await {
        Ok(link) => link,
        Err(e) => return Err(fail(&events, e.into())),
    };

    events.status("Connected");
    events.state(LoopState::Running(state.mode()));

    let mut sampler = ScreenSampler::new(screen);
    let result = drive(&link, &mut sampler, &mut state, &mut controls, &events, &config).await;

    if let Err(e) = link.close().await {
        warn!("failed to release connection: {e}");
    }

    match result {
        Ok(()) => {
            info!("session stopped");
            events.state(LoopState::Stopped);
            events.status("Disconnected");
            Ok(())
        }
        Err(e) => Err(fail(&events, e)),
    }
}

fn fail(events: &Events, e: SyncError) -> SyncError {
    error!("session failed: {e}");
    events.state(LoopState::Errored(e.to_string()));
    events.status(format!("Error: {e}"));
    e
}

async fn drive<T: Transport, S: Screen>(
    link: &DeviceLink<T>,
    sampler: &mut ScreenSampler<S>,
    state: &mut RuntimeState,
    controls: &mut UnboundedReceiver<Control>,
    events: &Events,
    config: &SessionConfig,
) -> Result<(), SyncError> {
    loop {
        loop {
            match controls.try_recv() {
                Ok(control) => apply(state, control, events),
                Err(TryRecvError::Empty) => break,
                // Nobody left to stop us
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        if !state.running() {
            return Ok(());
        }

        let (color, brightness) = state.target(|| capture(sampler))?;
        link.send_color(color, brightness, config.speed)
            .await
            .map_err(SyncError::TransportWrite)?;
        events.send(Event::ColorApplied(color));

        let sleep = tokio::time::sleep(config.tick_interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                control = controls.recv() => match control {
                    Some(control) => {
                        apply(state, control, events);
                        if !state.running() {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Screen capture blocks for a whole frame grab. On a multi-threaded
/// runtime the worker hands its other tasks off first; a current-thread
/// runtime has nowhere to hand them, so the grab runs inline there.
fn capture<S: Screen>(sampler: &mut ScreenSampler<S>) -> Result<Color, SampleError> {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| sampler.sample_color()),
        _ => sampler.sample_color(),
    }
}

fn apply(state: &mut RuntimeState, control: Control, events: &Events) {
    let before = state.mode();
    state.apply(control);
    let after = state.mode();
    if before != after {
        events.state(LoopState::Running(after));
        events.status(match after {
            Mode::ScreenSync => "Screen sync active",
            Mode::Manual => "Connected",
        });
    }
}
