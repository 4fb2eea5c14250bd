//! Per-revision protocol descriptors.
//!
//! Everything that differs between panel revisions lives in the static
//! [`RevisionProfile`] table below. Encoders, decoders and the session are
//! plain functions parameterized by a profile, so adding a revision is a data
//! change.
//!
//! Opcode bytes follow the vendor protocols of each panel family. Payload
//! limits, checksum choice and response shapes are hardware constants that
//! still need validation against real devices.

use std::str::FromStr;
use std::time::Duration;

use crate::orientation::Orientation;
use crate::{Error, Result};

/// Hardware revision identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Turing Smart Screen 3.5".
    A,
    /// XuanFang 3.5".
    B,
    /// Turing Smart Screen 5".
    C,
    /// Kipye Qiye Smart Display 3.5".
    D,
}

impl Revision {
    /// All known revisions.
    pub const ALL: [Revision; 4] = [Revision::A, Revision::B, Revision::C, Revision::D];

    /// Returns the static profile for this revision.
    pub fn profile(self) -> &'static RevisionProfile {
        match self {
            Revision::A => &REV_A,
            Revision::B => &REV_B,
            Revision::C => &REV_C,
            Revision::D => &REV_D,
        }
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        let id = lower
            .strip_prefix("revision")
            .or_else(|| lower.strip_prefix("rev"))
            .unwrap_or(&lower)
            .trim_start_matches(['-', '_', ' ']);
        match id {
            "a" => Ok(Revision::A),
            "b" => Ok(Revision::B),
            "c" => Ok(Revision::C),
            "d" => Ok(Revision::D),
            _ => Err(Error::UnknownRevision(s.to_string())),
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::A => write!(f, "rev-a"),
            Revision::B => write!(f, "rev-b"),
            Revision::C => write!(f, "rev-c"),
            Revision::D => write!(f, "rev-d"),
        }
    }
}

/// Logical command kinds, used as opcode table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Reset,
    Clear,
    ScreenOff,
    ScreenOn,
    SetBrightness,
    SetOrientation,
    DisplayChunk,
}

impl CommandKind {
    /// Human readable command name.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Reset => "reset",
            CommandKind::Clear => "clear",
            CommandKind::ScreenOff => "screen-off",
            CommandKind::ScreenOn => "screen-on",
            CommandKind::SetBrightness => "set-brightness",
            CommandKind::SetOrientation => "set-orientation",
            CommandKind::DisplayChunk => "display-chunk",
        }
    }
}

/// Opcode bytes per logical command. `None` when the revision lacks it.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeTable {
    pub reset: Option<&'static [u8]>,
    pub clear: Option<&'static [u8]>,
    pub screen_off: Option<&'static [u8]>,
    pub screen_on: Option<&'static [u8]>,
    pub set_brightness: Option<&'static [u8]>,
    pub set_orientation: Option<&'static [u8]>,
    pub display_chunk: Option<&'static [u8]>,
}

impl OpcodeTable {
    /// Looks up the opcode for a command kind.
    pub fn get(&self, kind: CommandKind) -> Option<&'static [u8]> {
        match kind {
            CommandKind::Reset => self.reset,
            CommandKind::Clear => self.clear,
            CommandKind::ScreenOff => self.screen_off,
            CommandKind::ScreenOn => self.screen_on,
            CommandKind::SetBrightness => self.set_brightness,
            CommandKind::SetOrientation => self.set_orientation,
            CommandKind::DisplayChunk => self.display_chunk,
        }
    }
}

/// Width of the frame length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// One byte.
    U8,
    /// Two bytes, little-endian.
    U16Le,
}

impl LengthField {
    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        match self {
            LengthField::U8 => 1,
            LengthField::U16Le => 2,
        }
    }

    /// Largest payload length the field can carry.
    pub fn max_len(&self) -> usize {
        match self {
            LengthField::U8 => u8::MAX as usize,
            LengthField::U16Le => u16::MAX as usize,
        }
    }
}

/// Frame checksum algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    /// Wrapping 8-bit byte sum.
    Sum8,
    /// CRC-16/CCITT-FALSE, appended little-endian.
    Crc16,
}

impl ChecksumKind {
    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Sum8 => 1,
            ChecksumKind::Crc16 => 2,
        }
    }
}

/// Native pixel encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565Le,
    Rgb565Be,
    Rgb888,
}

impl PixelFormat {
    /// Encoded bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb565Le | PixelFormat::Rgb565Be => 2,
            PixelFormat::Rgb888 => 3,
        }
    }
}

/// Shape of the acknowledgement the panel sends back for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Exactly `len` bytes: status, code, padding.
    Fixed { len: usize },
    /// Opcode bytes echoed back, then status and code.
    OpcodeEcho,
}

/// Mapping from a 0-100 brightness level to the panel's native value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessScale {
    /// 0 is darkest, `max` is brightest.
    Linear { max: u8 },
    /// 0 is brightest, `max` is darkest.
    Inverted { max: u8 },
}

impl BrightnessScale {
    /// Scales a level already validated to 0-100.
    pub fn scale(&self, level: u8) -> u8 {
        let scaled = |max: u8| (u32::from(level.min(100)) * u32::from(max) / 100) as u8;
        match *self {
            BrightnessScale::Linear { max } => scaled(max),
            BrightnessScale::Inverted { max } => max - scaled(max),
        }
    }
}

/// Immutable protocol descriptor for one hardware revision.
#[derive(Debug, Clone)]
pub struct RevisionProfile {
    pub revision: Revision,
    pub name: &'static str,
    pub opcodes: OpcodeTable,
    pub length_field: LengthField,
    /// Maximum pixel bytes carried by one display chunk frame.
    pub max_payload_size: usize,
    pub checksum: ChecksumKind,
    pub pixel_format: PixelFormat,
    pub response: ResponseShape,
    pub brightness: BrightnessScale,
    /// Wire codes indexed by [`Orientation::index`].
    pub orientation_codes: [u8; 4],
    /// Whether the reverse orientations are handled by the panel itself.
    pub native_reverse: bool,
    /// Native portrait width.
    pub width: u16,
    /// Native portrait height.
    pub height: u16,
    /// Default bound for reading one response.
    pub response_timeout: Duration,
}

impl RevisionProfile {
    /// Returns the opcode for `kind`, or `Unsupported`.
    pub fn opcode(&self, kind: CommandKind) -> Result<&'static [u8]> {
        self.opcodes.get(kind).ok_or(Error::Unsupported {
            command: kind.name(),
            revision: self.revision,
        })
    }

    /// Wire code for an orientation.
    pub fn orientation_code(&self, orientation: Orientation) -> u8 {
        self.orientation_codes[orientation.index()]
    }

    /// Whether pixel data must be rotated 180° before sending.
    pub fn needs_software_rotation(&self, orientation: Orientation) -> bool {
        orientation.is_reverse() && !self.native_reverse
    }

    /// Chunk size: largest multiple of the pixel width within the payload limit.
    pub fn chunk_size(&self) -> usize {
        let bpp = self.pixel_format.bytes_per_pixel();
        self.max_payload_size / bpp * bpp
    }
}

static REV_A: RevisionProfile = RevisionProfile {
    revision: Revision::A,
    name: "Turing Smart Screen 3.5\"",
    opcodes: OpcodeTable {
        reset: Some(&[0x65]),
        clear: Some(&[0x66]),
        screen_off: Some(&[0x6C]),
        screen_on: Some(&[0x6D]),
        set_brightness: Some(&[0x6E]),
        set_orientation: Some(&[0x79]),
        display_chunk: Some(&[0xC5]),
    },
    length_field: LengthField::U16Le,
    max_payload_size: 4096,
    checksum: ChecksumKind::None,
    pixel_format: PixelFormat::Rgb565Le,
    response: ResponseShape::OpcodeEcho,
    brightness: BrightnessScale::Inverted { max: 255 },
    orientation_codes: [100, 102, 101, 103],
    native_reverse: true,
    width: 320,
    height: 480,
    response_timeout: Duration::from_millis(1000),
};

static REV_B: RevisionProfile = RevisionProfile {
    revision: Revision::B,
    name: "XuanFang 3.5\"",
    opcodes: OpcodeTable {
        reset: None,
        clear: None,
        screen_off: None,
        screen_on: None,
        set_brightness: Some(&[0xCE]),
        set_orientation: Some(&[0xCB]),
        display_chunk: Some(&[0xCC]),
    },
    length_field: LengthField::U8,
    max_payload_size: 240,
    checksum: ChecksumKind::None,
    pixel_format: PixelFormat::Rgb565Be,
    response: ResponseShape::OpcodeEcho,
    brightness: BrightnessScale::Linear { max: 255 },
    orientation_codes: [0x00, 0x01, 0x00, 0x01],
    native_reverse: false,
    width: 320,
    height: 480,
    response_timeout: Duration::from_millis(1000),
};

static REV_C: RevisionProfile = RevisionProfile {
    revision: Revision::C,
    name: "Turing Smart Screen 5\"",
    opcodes: OpcodeTable {
        reset: Some(&[0x84, 0xEF, 0x69, 0x00, 0x00, 0x00, 0x01]),
        clear: None,
        screen_off: Some(&[0x83, 0xEF, 0x69, 0x00, 0x00, 0x00, 0x01]),
        screen_on: Some(&[0x83, 0xEF, 0x69, 0x00, 0x00, 0x00, 0x00]),
        set_brightness: Some(&[0x7B, 0xEF, 0x69, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]),
        set_orientation: Some(&[
            0x7D, 0xEF, 0x69, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x2D,
        ]),
        display_chunk: Some(&[0xCC, 0xEF, 0x69, 0x00, 0x00]),
    },
    length_field: LengthField::U16Le,
    max_payload_size: 249,
    checksum: ChecksumKind::None,
    pixel_format: PixelFormat::Rgb888,
    response: ResponseShape::Fixed { len: 1024 },
    brightness: BrightnessScale::Linear { max: 255 },
    orientation_codes: [0x00, 0x01, 0x00, 0x01],
    native_reverse: false,
    width: 480,
    height: 800,
    response_timeout: Duration::from_millis(2000),
};

static REV_D: RevisionProfile = RevisionProfile {
    revision: Revision::D,
    name: "Kipye Qiye Smart Display 3.5\"",
    opcodes: OpcodeTable {
        reset: None,
        clear: Some(&[0x43, 0x42]),
        screen_off: None,
        screen_on: None,
        set_brightness: Some(&[0x43, 0x43]),
        set_orientation: Some(&[0x43, 0x48]),
        display_chunk: Some(&[0x43, 0x41]),
    },
    length_field: LengthField::U8,
    max_payload_size: 64,
    checksum: ChecksumKind::None,
    pixel_format: PixelFormat::Rgb565Be,
    response: ResponseShape::OpcodeEcho,
    brightness: BrightnessScale::Linear { max: 255 },
    orientation_codes: [0x00, 0x01, 0x00, 0x01],
    native_reverse: false,
    width: 320,
    height: 480,
    response_timeout: Duration::from_millis(500),
};
