//! Sunset lamp wire protocol - command frames and payload encryption
//!
//! Every command the lamp understands is a single 16-byte frame:
//!
//! ```text
//! [header:4][commandType:1][groupId:1][reserved:1][red:1][green:1][blue:1][brightness:1][speed:1][reserved:4]
//! ```
//!
//! The frame is AES-128-ECB encrypted under a fixed key (see [`cipher`])
//! before it is written to the control characteristic (see [`ble`]).

pub mod ble;
pub mod cipher;

pub use cipher::{CipherBox, EncryptedFrame};

/// Size of a command frame, which is also the AES block size
pub const FRAME_LEN: usize = 16;

/// Constant header every frame starts with
pub const HEADER: [u8; 4] = [0x54, 0x52, 0x00, 0x57];

/// Group the lamp joins out of the box
pub const DEFAULT_GROUP_ID: u8 = 1;

// Field offsets
const OFFSET_COMMAND: usize = 4;
const OFFSET_GROUP: usize = 5;
const OFFSET_RED: usize = 7;
const OFFSET_GREEN: usize = 8;
const OFFSET_BLUE: usize = 9;
const OFFSET_BRIGHTNESS: usize = 10;
const OFFSET_SPEED: usize = 11;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("unknown command type 0x{0:02x}")]
    UnknownCommand(u8),
    #[error("bad frame header {0:02x?}")]
    BadHeader([u8; 4]),
    #[error("expected {FRAME_LEN} bytes, got {0}")]
    BadLength(usize),
    #[error("invalid hex: {0}")]
    Hex(#[from] data_encoding::DecodeError),
}

/// Command types the lamp firmware knows about. Only [`CommandType::Rgb`]
/// has an encoder here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    JoinGroupRequest = 1,
    Rgb = 2,
    Rhythm = 3,
    Timer = 4,
    RgbLineSequence = 5,
    Speed = 6,
    Light = 7,
}

impl TryFrom<u8> for CommandType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::JoinGroupRequest,
            2 => Self::Rgb,
            3 => Self::Rhythm,
            4 => Self::Timer,
            5 => Self::RgbLineSequence,
            6 => Self::Speed,
            7 => Self::Light,
            other => return Err(ProtoError::UnknownCommand(other)),
        })
    }
}

/// An RGB color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Perceived luminance (ITU-R BT.601 weights), in 0.0..=255.0
    pub fn luminance(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }

    pub fn max_channel(&self) -> u8 {
        self.r.max(self.g).max(self.b)
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RGB({},{},{})", self.r, self.g, self.b)
    }
}

macro_rules! percent {
    ($(#[$meta:meta])* $name:ident, $default:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u8);

        impl $name {
            pub const MAX: $name = $name(100);

            /// Clamps `value` into 0..=100
            pub const fn new(value: u8) -> Self {
                if value > 100 { Self(100) } else { Self(value) }
            }

            pub const fn value(self) -> u8 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self($default)
            }
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                Self::new(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}%", self.0)
            }
        }
    };
}

percent!(
    /// Lamp brightness in percent
    Brightness,
    100
);

percent!(
    /// Effect speed in percent. Ignored by the lamp for plain RGB commands
    /// but always present in the frame.
    Speed,
    100
);

/// Plaintext 16-byte command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; FRAME_LEN]);

impl CommandFrame {
    /// Build the frame that sets the lamp to `color`.
    ///
    /// Channels are stored raw at offsets 7/8/9 in red, green, blue order.
    /// The vendor app calls this layout "GRB" but the lamp has been
    /// validated against these literal positions.
    pub fn rgb(color: Color, brightness: Brightness, speed: Speed, group_id: u8) -> Self {
        let mut buf = [0u8; FRAME_LEN];
        buf[..HEADER.len()].copy_from_slice(&HEADER);
        buf[OFFSET_COMMAND] = CommandType::Rgb as u8;
        buf[OFFSET_GROUP] = group_id;
        buf[OFFSET_RED] = color.r;
        buf[OFFSET_GREEN] = color.g;
        buf[OFFSET_BLUE] = color.b;
        buf[OFFSET_BRIGHTNESS] = brightness.value();
        buf[OFFSET_SPEED] = speed.value();
        Self(buf)
    }

    /// Parse a decrypted frame, checking the header and command type
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Result<Self, ProtoError> {
        let header: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if header != HEADER {
            return Err(ProtoError::BadHeader(header));
        }
        CommandType::try_from(bytes[OFFSET_COMMAND])?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; FRAME_LEN] {
        self.0
    }

    pub fn command_type(&self) -> CommandType {
        // from_bytes and rgb both guarantee a known command byte
        CommandType::try_from(self.0[OFFSET_COMMAND]).unwrap_or(CommandType::Rgb)
    }

    pub fn group_id(&self) -> u8 {
        self.0[OFFSET_GROUP]
    }

    pub fn color(&self) -> Color {
        Color::new(self.0[OFFSET_RED], self.0[OFFSET_GREEN], self.0[OFFSET_BLUE])
    }

    pub fn brightness(&self) -> Brightness {
        Brightness::new(self.0[OFFSET_BRIGHTNESS])
    }

    pub fn speed(&self) -> Speed {
        Speed::new(self.0[OFFSET_SPEED])
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

/// Encode an RGB command with the default group
pub fn encode_rgb_frame(color: Color, brightness: Brightness, speed: Speed) -> CommandFrame {
    CommandFrame::rgb(color, brightness, speed, DEFAULT_GROUP_ID)
}

/// Lowercase hex, no separators
pub fn to_hex(bytes: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(bytes)
}

/// Decode hex (either case) into one 16-byte block
pub fn block_from_hex(hex: &str) -> Result<[u8; FRAME_LEN], ProtoError> {
    let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = data_encoding::HEXLOWER_PERMISSIVE.decode(cleaned.as_bytes())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| ProtoError::BadLength(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_frame_layout() {
        let frame = encode_rgb_frame(Color::new(255, 0, 128), Brightness::new(50), Speed::new(100));
        assert_eq!(
            frame.to_bytes(),
            [0x54, 0x52, 0x00, 0x57, 0x02, 0x01, 0x00, 255, 0, 128, 50, 100, 0, 0, 0, 0]
        );
    }

    #[test]
    fn channels_keep_literal_positions() {
        let frame = encode_rgb_frame(Color::new(1, 2, 3), Brightness::default(), Speed::default());
        let bytes = frame.as_bytes();
        assert_eq!(&bytes[7..10], &[1, 2, 3]);
        assert_eq!(bytes[10], 100);
        assert_eq!(bytes[11], 100);
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        let frame = encode_rgb_frame(Color::WHITE, Brightness::new(250), Speed::new(101));
        assert_eq!(frame.brightness(), Brightness::MAX);
        assert_eq!(frame.as_bytes()[10], 100);
        assert_eq!(frame.as_bytes()[11], 100);

        assert_eq!(Brightness::new(0).value(), 0);
        assert_eq!(Speed::from(42).value(), 42);
    }

    #[test]
    fn custom_group_and_reserved_bytes() {
        let frame = CommandFrame::rgb(Color::BLACK, Brightness::new(5), Speed::new(0), 9);
        let bytes = frame.as_bytes();
        assert_eq!(frame.group_id(), 9);
        assert_eq!(bytes[6], 0);
        assert_eq!(&bytes[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn parse_rejects_foreign_frames() {
        let mut bytes = encode_rgb_frame(Color::WHITE, Brightness::MAX, Speed::MAX).to_bytes();
        assert!(CommandFrame::from_bytes(bytes).is_ok());

        bytes[4] = 0x09;
        assert_eq!(CommandFrame::from_bytes(bytes), Err(ProtoError::UnknownCommand(0x09)));

        bytes[0] = 0x00;
        assert!(matches!(CommandFrame::from_bytes(bytes), Err(ProtoError::BadHeader(_))));
    }

    #[test]
    fn command_type_codes() {
        assert_eq!(CommandType::try_from(1), Ok(CommandType::JoinGroupRequest));
        assert_eq!(CommandType::try_from(7), Ok(CommandType::Light));
        assert!(CommandType::try_from(0).is_err());
        assert_eq!(CommandType::Speed as u8, 6);
    }

    #[test]
    fn hex_helpers() {
        let frame = encode_rgb_frame(Color::new(255, 0, 128), Brightness::new(50), Speed::new(100));
        assert_eq!(frame.to_hex(), "54520057020100ff0080326400000000");
        assert_eq!(block_from_hex(&frame.to_hex().to_uppercase()), Ok(frame.to_bytes()));
        assert_eq!(block_from_hex("abcd"), Err(ProtoError::BadLength(2)));
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(Color::BLACK.luminance(), 0.0);
        assert!((Color::WHITE.luminance() - 255.0).abs() < 0.01);
        assert_eq!(Color::new(10, 40, 3).max_channel(), 40);
    }
}
