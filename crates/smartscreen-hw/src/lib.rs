//! Smart Screen Hardware Library
//!
//! Drives USB serial LCD panels used in PC case displays (Turing Smart
//! Screen, XuanFang, Kipye and other whitelabeled devices): per-revision
//! command framing, pixel conversion with chunked transfer, and a session that
//! serializes commands and recovers from lost frame alignment.

pub mod config;
pub mod error;
pub mod lcd;
pub mod orientation;
pub mod profile;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use lcd::{
    connect, Command, CommandOutcome, DeviceSession, FailureReason, PixelBuffer, Rect,
    SerialTransport, SessionState, Transport,
};
pub use orientation::Orientation;
pub use profile::{Revision, RevisionProfile};
