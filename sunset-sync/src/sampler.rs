//! Screen sampling - one representative color per capture

use sunset_proto::Color;

/// Scenes darker than this get their color stretched
pub const DARK_LUMINANCE: f32 = 40.0;

/// Largest factor a dark color is multiplied by
pub const MAX_BOOST: f32 = 3.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("screen capture returned no pixels")]
    Empty,
    #[error("unsupported pixel layout: {channels} channels, {len} bytes")]
    Layout { channels: usize, len: usize },
    #[error("screen capture failed: {0}")]
    Capture(String),
}

/// Raw interleaved pixels from one capture. Three channels is RGB, four is
/// RGBA (alpha ignored).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pixels: Vec<u8>,
    channels: usize,
}

impl Snapshot {
    pub fn new(pixels: Vec<u8>, channels: usize) -> Result<Self, SampleError> {
        if !(3..=4).contains(&channels) || pixels.len() % channels != 0 {
            return Err(SampleError::Layout { channels, len: pixels.len() });
        }
        Ok(Self { pixels, channels })
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len() / self.channels
    }
}

/// Something that can capture the display
pub trait Screen: Send + 'static {
    fn grab(&mut self) -> Result<Snapshot, SampleError>;
}

/// Per-channel mean over all pixels, truncated
pub fn average_color(snapshot: &Snapshot) -> Result<Color, SampleError> {
    let count = snapshot.pixel_count() as u64;
    if count == 0 {
        return Err(SampleError::Empty);
    }

    let mut sums = [0u64; 3];
    for px in snapshot.pixels.chunks_exact(snapshot.channels) {
        sums[0] += px[0] as u64;
        sums[1] += px[1] as u64;
        sums[2] += px[2] as u64;
    }

    Ok(Color::new(
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ))
}

/// Stretch very dark colors so the lamp shows a recognisable hue instead of
/// a muddy glow. Each channel is scaled by `min(255 / max, 3)` and capped
/// at 255. Pure black stays black.
pub fn boost_dark(color: Color) -> Color {
    if color.luminance() >= DARK_LUMINANCE {
        return color;
    }
    let max = color.max_channel();
    if max == 0 {
        return color;
    }

    let scale = (255.0 / max as f32).min(MAX_BOOST);
    let boost = |c: u8| (c as f32 * scale).min(255.0) as u8;
    Color::new(boost(color.r), boost(color.g), boost(color.b))
}

pub struct ScreenSampler<S> {
    screen: S,
}

impl<S: Screen> ScreenSampler<S> {
    pub fn new(screen: S) -> Self {
        Self { screen }
    }

    /// Capture the display and reduce it to one boosted color
    pub fn sample_color(&mut self) -> Result<Color, SampleError> {
        let snapshot = self.screen.grab()?;
        Ok(boost_dark(average_color(&snapshot)?))
    }
}

/// Placeholder for builds without capture support. Every grab fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScreen;

impl Screen for NoScreen {
    fn grab(&mut self) -> Result<Snapshot, SampleError> {
        Err(SampleError::Capture("built without screen capture support".to_string()))
    }
}

#[cfg(feature = "capture")]
pub use capture::XcapScreen;

#[cfg(feature = "capture")]
mod capture {
    use super::{SampleError, Screen, Snapshot};

    /// Captures the monitor that contains the desktop origin
    #[derive(Debug, Clone, Copy, Default)]
    pub struct XcapScreen;

    impl Screen for XcapScreen {
        fn grab(&mut self) -> Result<Snapshot, SampleError> {
            let monitor = xcap::Monitor::from_point(0, 0)
                .map_err(|e| SampleError::Capture(e.to_string()))?;
            let image = monitor
                .capture_image()
                .map_err(|e| SampleError::Capture(e.to_string()))?;
            Snapshot::new(image.into_raw(), 4)
        }
    }
}
