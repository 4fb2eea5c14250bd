//! LCD panel module.
//!
//! Frame encoding, pixel conversion, response decoding and the session that
//! drives a panel over a serial transport.

mod session;
mod transport;

pub mod codec;
pub mod pixels;
pub mod protocol;
pub mod response;

pub use codec::EncodedPayload;
pub use pixels::{rgb888_to_rgb565, PixelBuffer, Rect};
pub use protocol::{Command, Frame};
pub use response::DecodedResponse;
pub use session::{connect, CommandOutcome, DeviceSession, FailureReason, SessionState};
pub use transport::{SerialTransport, Transport, DEFAULT_BAUD_RATE};
