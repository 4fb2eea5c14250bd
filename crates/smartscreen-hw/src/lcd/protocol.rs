//! LCD command definitions and frame encoding.
//!
//! Frame structure:
//! - Opcode: one or more bytes, from the revision's opcode table
//! - Length: payload length, `u8` or little-endian `u16` per revision
//! - Payload: command specific
//! - Checksum: optional, over opcode + length + payload

use crate::orientation::Orientation;
use crate::profile::{ChecksumKind, CommandKind, LengthField, RevisionProfile};
use crate::{Error, Result};

use super::pixels::Rect;

/// Bytes preceding pixel data in a display chunk payload (x, y, w, h, flag).
pub const DISPLAY_HEADER_SIZE: usize = 9;

/// Logical panel commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Restart the panel firmware.
    Reset,
    /// Blank the whole screen.
    Clear,
    /// Turn the backlight and panel off.
    ScreenOff,
    /// Turn the panel back on.
    ScreenOn,
    /// Brightness level in percent, 0-100.
    SetBrightness(i32),
    /// Set display orientation.
    SetOrientation(Orientation),
    /// One chunk of pixel data for `rect`.
    DisplayChunk {
        rect: Rect,
        data: Vec<u8>,
        is_last: bool,
    },
}

impl Command {
    /// Opcode table key for this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Reset => CommandKind::Reset,
            Command::Clear => CommandKind::Clear,
            Command::ScreenOff => CommandKind::ScreenOff,
            Command::ScreenOn => CommandKind::ScreenOn,
            Command::SetBrightness(_) => CommandKind::SetBrightness,
            Command::SetOrientation(_) => CommandKind::SetOrientation,
            Command::DisplayChunk { .. } => CommandKind::DisplayChunk,
        }
    }
}

/// Frame checksum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    Sum8(u8),
    Crc16(u16),
}

/// One complete command unit as written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: &'static [u8],
    length_field: LengthField,
    payload: Vec<u8>,
    checksum: Option<Checksum>,
}

impl Frame {
    /// Opcode bytes.
    pub fn opcode(&self) -> &'static [u8] {
        self.opcode
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Checksum, when the revision uses one.
    pub fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    fn push_header(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.opcode);
        match self.length_field {
            LengthField::U8 => out.push(self.payload.len() as u8),
            LengthField::U16Le => out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes()),
        }
        out.extend_from_slice(&self.payload);
    }

    /// Serializes the frame for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.opcode.len() + self.length_field.width() + self.payload.len() + 2,
        );
        self.push_header(&mut out);
        match self.checksum {
            Some(Checksum::Sum8(sum)) => out.push(sum),
            Some(Checksum::Crc16(crc)) => out.extend_from_slice(&crc.to_le_bytes()),
            None => {}
        }
        out
    }
}

/// Wrapping 8-bit sum.
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

fn brightness_payload(level: i32, profile: &RevisionProfile) -> Result<Vec<u8>> {
    let level = u8::try_from(level)
        .ok()
        .filter(|l| *l <= 100)
        .ok_or_else(|| Error::InvalidArgument(format!("brightness {level} outside 0-100")))?;
    Ok(vec![profile.brightness.scale(level)])
}

fn display_payload(
    rect: Rect,
    data: &[u8],
    is_last: bool,
    profile: &RevisionProfile,
) -> Result<Vec<u8>> {
    if data.len() > profile.max_payload_size {
        return Err(Error::InvalidArgument(format!(
            "chunk of {} bytes exceeds {} limit of {}",
            data.len(),
            profile.revision,
            profile.max_payload_size
        )));
    }
    let bpp = profile.pixel_format.bytes_per_pixel();
    if data.len() % bpp != 0 {
        return Err(Error::InvalidArgument(format!(
            "chunk of {} bytes splits a {bpp}-byte pixel",
            data.len()
        )));
    }

    let mut payload = Vec::with_capacity(DISPLAY_HEADER_SIZE + data.len());
    for field in [rect.x, rect.y, rect.width, rect.height] {
        payload.extend_from_slice(&field.to_le_bytes());
    }
    payload.push(u8::from(is_last));
    payload.extend_from_slice(data);
    Ok(payload)
}

/// Encodes a command into a frame for `profile`.
///
/// All validation happens here, before anything touches the transport.
pub fn encode(command: &Command, profile: &RevisionProfile) -> Result<Frame> {
    let payload = match command {
        Command::Reset | Command::Clear | Command::ScreenOff | Command::ScreenOn => Vec::new(),
        Command::SetBrightness(level) => brightness_payload(*level, profile)?,
        Command::SetOrientation(orientation) => vec![profile.orientation_code(*orientation)],
        Command::DisplayChunk {
            rect,
            data,
            is_last,
        } => display_payload(*rect, data, *is_last, profile)?,
    };
    let opcode = profile.opcode(command.kind())?;

    if payload.len() > profile.length_field.max_len() {
        return Err(Error::InvalidArgument(format!(
            "payload of {} bytes does not fit the length field",
            payload.len()
        )));
    }

    let mut frame = Frame {
        opcode,
        length_field: profile.length_field,
        payload,
        checksum: None,
    };

    if profile.checksum != ChecksumKind::None {
        let mut covered = Vec::new();
        frame.push_header(&mut covered);
        frame.checksum = match profile.checksum {
            ChecksumKind::Sum8 => Some(Checksum::Sum8(sum8(&covered))),
            ChecksumKind::Crc16 => Some(Checksum::Crc16(crc16_ccitt_false(&covered))),
            ChecksumKind::None => None,
        };
    }

    Ok(frame)
}
