//! Sunset Sync - keeps the lamp in step with the operator or the screen
//!
//! A session is one background task. It connects to the lamp, then every
//! tick picks a color (the manual one, or the average screen color in
//! screen-sync mode), writes it, and sleeps [`TICK_INTERVAL`]. The control
//! surface talks to it only through a [`SessionHandle`] and the [`Event`]
//! stream returned by [`start`].
//!
//! ```ignore
//! let transport = BtleplugTransport::new().await?;
//! let (session, mut events) = sunset_sync::start(
//!     transport,
//!     NoScreen,
//!     SessionConfig::default(),
//!     Color::WHITE,
//!     Brightness::MAX,
//! );
//! session.set_manual_color(Color::new(255, 80, 0));
//! while let Some(event) = events.recv().await { /* ... */ }
//! ```

pub mod sampler;
mod session;
mod state;

pub use sampler::{NoScreen, SampleError, Screen, ScreenSampler, Snapshot, average_color, boost_dark};
#[cfg(feature = "capture")]
pub use sampler::XcapScreen;
pub use session::{Event, SessionConfig, SessionHandle, SyncError, TICK_INTERVAL, start};
pub use state::{Control, LoopState, MIN_SCREEN_BRIGHTNESS, Mode, RuntimeState, screen_brightness};
