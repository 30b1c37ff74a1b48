//! Runtime state of a sync session and the controls that change it

use sunset_proto::{Brightness, Color};
use tracing::{info, warn};

use crate::sampler::SampleError;

/// Floor for brightness derived from the screen, so a black scene never
/// switches the lamp off
pub const MIN_SCREEN_BRIGHTNESS: u8 = 5;

/// Where the lamp color comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    ScreenSync,
}

/// Lifecycle of one session. `Stopped` and `Errored` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Connecting,
    Running(Mode),
    Errored(String),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Errored(_))
    }
}

/// Events raised by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    SetManualColor(Color),
    SetManualBrightness(Brightness),
    SetBrightnessOverride(Brightness),
    EnableScreenSync(bool),
    Stop,
}

/// Brightness for a screen-sync color: its luminance as a percentage,
/// rounded, never below [`MIN_SCREEN_BRIGHTNESS`]
pub fn screen_brightness(color: Color) -> Brightness {
    let percent = (color.luminance() / 255.0 * 100.0).round() as u8;
    Brightness::new(percent.max(MIN_SCREEN_BRIGHTNESS))
}

/// Mutable state of a running session, owned by the session task
#[derive(Debug, Clone)]
pub struct RuntimeState {
    running: bool,
    screen_sync: bool,
    manual_color: Color,
    manual_brightness: Brightness,
    brightness_override: Option<Brightness>,
}

impl RuntimeState {
    pub fn new(manual_color: Color, manual_brightness: Brightness) -> Self {
        Self {
            running: true,
            screen_sync: false,
            manual_color,
            manual_brightness,
            brightness_override: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> Mode {
        if self.screen_sync { Mode::ScreenSync } else { Mode::Manual }
    }

    pub fn manual_color(&self) -> Color {
        self.manual_color
    }

    pub fn manual_brightness(&self) -> Brightness {
        self.manual_brightness
    }

    pub fn brightness_override(&self) -> Option<Brightness> {
        self.brightness_override
    }

    pub fn apply(&mut self, control: Control) {
        match control {
            Control::SetManualColor(color) => self.set_manual_color(color),
            Control::SetManualBrightness(brightness) => self.manual_brightness = brightness,
            Control::SetBrightnessOverride(brightness) => self.set_brightness_override(brightness),
            Control::EnableScreenSync(enabled) => self.set_screen_sync(enabled),
            Control::Stop => self.running = false,
        }
    }

    /// The manual color is frozen while screen sync runs, so turning sync
    /// off restores the color that was set before it was turned on.
    fn set_manual_color(&mut self, color: Color) {
        if self.screen_sync {
            warn!(%color, "manual color ignored during screen sync");
            return;
        }
        self.manual_color = color;
    }

    fn set_brightness_override(&mut self, brightness: Brightness) {
        if !self.screen_sync {
            warn!(%brightness, "brightness override ignored outside screen sync");
            return;
        }
        self.brightness_override = Some(brightness);
    }

    fn set_screen_sync(&mut self, enabled: bool) {
        if self.screen_sync == enabled {
            return;
        }
        self.screen_sync = enabled;
        if !enabled {
            self.brightness_override = None;
        }
        info!(mode = ?self.mode(), "mode changed");
    }

    /// Color and brightness for the next tick. `sample` is only called in
    /// screen-sync mode.
    pub fn target<F>(&self, sample: F) -> Result<(Color, Brightness), SampleError>
    where
        F: FnOnce() -> Result<Color, SampleError>,
    {
        if !self.screen_sync {
            return Ok((self.manual_color, self.manual_brightness));
        }
        let color = sample()?;
        let brightness = self.brightness_override.unwrap_or_else(|| screen_brightness(color));
        Ok((color, brightness))
    }
}
