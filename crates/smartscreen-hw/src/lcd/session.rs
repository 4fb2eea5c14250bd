//! Device session: serializes commands over a half-duplex link.
//!
//! At most one frame is outstanding at any time. A NAK re-sends the same
//! frame up to the attempt budget. A malformed or missing response drains the
//! input, re-sends once, and faults the session if that also fails.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::orientation::Orientation;
use crate::profile::{Revision, RevisionProfile};
use crate::{Error, Result};

use super::codec;
use super::pixels::{PixelBuffer, Rect};
use super::protocol::{self, Command, Frame};
use super::response::{self, DecodedResponse};
use super::transport::Transport;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not opened; commands are refused.
    Disconnected,
    /// Idle, accepts the next command.
    Ready,
    /// A command is in flight.
    Busy,
    /// Frame alignment lost; only `reset` is accepted.
    Faulted,
}

/// Why a command did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The panel NAKed every attempt.
    DeviceRejected { code: u8, attempts: u32 },
    /// Responses stayed malformed after a resync. The session is faulted.
    Desync,
}

/// Result of one command (or one region transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// Succeeded after this many re-sends.
    RetriedSuccess(u32),
    Failed(FailureReason),
}

impl CommandOutcome {
    /// Returns true for `Success` and `RetriedSuccess`.
    pub fn is_success(&self) -> bool {
        !matches!(self, CommandOutcome::Failed(_))
    }

    /// Converts a failed outcome into the matching error.
    pub fn into_result(self) -> Result<()> {
        match self {
            CommandOutcome::Success | CommandOutcome::RetriedSuccess(_) => Ok(()),
            CommandOutcome::Failed(FailureReason::DeviceRejected { code, .. }) => {
                Err(Error::DeviceRejected { code })
            }
            CommandOutcome::Failed(FailureReason::Desync) => Err(Error::Desync),
        }
    }
}

struct Inner<T> {
    transport: T,
    state: SessionState,
}

/// Driver session for one panel.
pub struct DeviceSession<T: Transport> {
    inner: Mutex<Inner<T>>,
    current_orientation: Mutex<Orientation>,
    profile: &'static RevisionProfile,
    config: SessionConfig,
}

/// Opens `transport` and returns a ready session with default tuning.
pub fn connect<T: Transport>(transport: T, revision: Revision) -> Result<DeviceSession<T>> {
    let session = DeviceSession::new(transport, revision, SessionConfig::default());
    session.connect()?;
    Ok(session)
}

impl<T: Transport> DeviceSession<T> {
    /// Creates a disconnected session.
    pub fn new(transport: T, revision: Revision, config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                state: SessionState::Disconnected,
            }),
            current_orientation: Mutex::new(Orientation::default()),
            profile: revision.profile(),
            config,
        }
    }

    /// Returns the revision profile.
    pub fn profile(&self) -> &'static RevisionProfile {
        self.profile
    }

    /// Returns the session tuning.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state. Reports `Busy` while another caller holds the session.
    pub fn state(&self) -> SessionState {
        match self.inner.try_lock() {
            Ok(inner) => inner.state,
            Err(TryLockError::WouldBlock) => SessionState::Busy,
            Err(TryLockError::Poisoned(_)) => SessionState::Faulted,
        }
    }

    /// Last orientation the panel acknowledged.
    pub fn orientation(&self) -> Orientation {
        *self
            .current_orientation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Panel dimensions in the current orientation.
    pub fn dimensions(&self) -> (u16, u16) {
        self.orientation()
            .dimensions(self.profile.width, self.profile.height)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<T>>> {
        match self.inner.try_lock() {
            Ok(inner) => Ok(inner),
            Err(TryLockError::WouldBlock) => Err(Error::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                // A caller panicked mid-command; stream alignment is unknown.
                let mut inner = poisoned.into_inner();
                self.inner.clear_poison();
                error!("Session lock poisoned, marking faulted");
                inner.state = SessionState::Faulted;
                Ok(inner)
            }
        }
    }

    fn open(&self, inner: &mut Inner<T>) -> Result<()> {
        match inner.transport.open() {
            Ok(()) => {
                inner.state = SessionState::Ready;
                info!("Session ready ({}, {})", self.profile.revision, self.profile.name);
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Disconnected;
                debug!("Transport open failed: {}", e);
                Err(match e {
                    Error::Connection(msg) => Error::Connection(msg),
                    other => Error::Connection(other.to_string()),
                })
            }
        }
    }

    /// Opens the transport: `Disconnected -> Ready`.
    ///
    /// A ready session stays ready; a faulted one needs [`reset`](Self::reset).
    pub fn connect(&self) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.state {
            SessionState::Ready => Ok(()),
            SessionState::Faulted => Err(Error::SessionFaulted),
            SessionState::Disconnected | SessionState::Busy => self.open(&mut inner),
        }
    }

    /// Drains stale input and re-runs the connect transition from any idle state.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock()?;
        info!("Resetting session (was {:?})", inner.state);
        let drained = if inner.state == SessionState::Disconnected {
            Ok(())
        } else {
            inner.transport.drain_input(self.config.resync_quiet())
        };
        if let Err(e) = &drained {
            warn!("Drain before reset failed: {}", e);
        }
        self.open(&mut inner).map_err(|e| match drained {
            Err(drain_error) => {
                error!("Reopen after failed drain also failed: {}", e);
                drain_error
            }
            Ok(()) => e,
        })
    }

    fn ensure_ready(inner: &Inner<T>) -> Result<()> {
        match inner.state {
            SessionState::Ready => Ok(()),
            SessionState::Disconnected => Err(Error::NotConnected),
            SessionState::Busy => Err(Error::Busy),
            SessionState::Faulted => Err(Error::SessionFaulted),
        }
    }

    /// Sends one command and waits for its acknowledgement.
    pub fn execute(&self, command: &Command) -> Result<CommandOutcome> {
        let mut inner = self.lock()?;
        Self::ensure_ready(&inner)?;

        let frame = protocol::encode(command, self.profile)?;
        let outcome = self.transact(&mut inner, &frame, command.kind().name())?;

        if let (Command::SetOrientation(orientation), true) = (command, outcome.is_success()) {
            *self
                .current_orientation
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = *orientation;
            debug!("Set orientation to {}", orientation);
        }

        Ok(outcome)
    }

    /// Sends `rect` of `buffer` as a sequence of display chunks.
    ///
    /// `buffer` is in panel coordinates for the current orientation. The
    /// session stays locked for the whole transfer, and the first failed
    /// chunk ends it.
    pub fn display_region(&self, buffer: &PixelBuffer, rect: Rect) -> Result<CommandOutcome> {
        let mut inner = self.lock()?;
        Self::ensure_ready(&inner)?;

        let orientation = self.orientation();
        let (width, height) = orientation.dimensions(self.profile.width, self.profile.height);
        rect.check_bounds(width, height)?;

        let (payload, target) = if self.profile.needs_software_rotation(orientation) {
            let mut region = buffer.crop(rect)?;
            region.rotate_180();
            let payload = codec::encode(&region, region.bounds(), self.profile)?;
            (payload, rect.mirrored(width, height))
        } else {
            (codec::encode(buffer, rect, self.profile)?, rect)
        };

        let total = payload.len();
        let mut retries = 0;
        for (index, data) in payload.into_chunks().into_iter().enumerate() {
            let command = Command::DisplayChunk {
                rect: target,
                data,
                is_last: index + 1 == total,
            };
            let frame = protocol::encode(&command, self.profile)?;
            match self.transact(&mut inner, &frame, "display-chunk")? {
                CommandOutcome::Success => {}
                CommandOutcome::RetriedSuccess(n) => retries += n,
                failed @ CommandOutcome::Failed(_) => {
                    warn!(
                        "Region {} stopped at chunk {}/{}",
                        target,
                        index + 1,
                        total
                    );
                    return Ok(failed);
                }
            }
        }

        debug!("Region {} sent ({} chunks)", target, total);
        Ok(if retries == 0 {
            CommandOutcome::Success
        } else {
            CommandOutcome::RetriedSuccess(retries)
        })
    }

    fn transact(&self, inner: &mut Inner<T>, frame: &Frame, name: &str) -> Result<CommandOutcome> {
        inner.state = SessionState::Busy;
        let result = self.exchange(inner, frame, name);
        inner.state = match result {
            Ok(CommandOutcome::Failed(FailureReason::Desync)) | Err(_) => SessionState::Faulted,
            Ok(_) => SessionState::Ready,
        };
        result
    }

    fn exchange(&self, inner: &mut Inner<T>, frame: &Frame, name: &str) -> Result<CommandOutcome> {
        let bytes = frame.to_bytes();
        let timeout = self.config.response_timeout(self.profile);
        let expected = response::response_len(frame.opcode(), self.profile);
        let max_attempts = self.config.max_attempts.max(1);

        let mut sent = 0u32;
        let mut rejected = 0u32;
        let mut resynced = false;

        loop {
            sent += 1;
            debug!("Sending {} frame ({} bytes)", name, bytes.len());
            if let Err(e) = inner.transport.write(&bytes) {
                error!("Write failed during {}: {}", name, e);
                return Err(e);
            }

            let response = match inner.transport.read_exact(expected, timeout) {
                Ok(raw) => response::decode(&raw, frame.opcode(), self.profile),
                Err(e) => {
                    debug!("No valid response to {}: {}", name, e);
                    DecodedResponse::Malformed
                }
            };

            match response {
                DecodedResponse::Ack if sent == 1 => return Ok(CommandOutcome::Success),
                DecodedResponse::Ack => return Ok(CommandOutcome::RetriedSuccess(sent - 1)),
                DecodedResponse::Nack(code) => {
                    rejected += 1;
                    if rejected >= max_attempts {
                        warn!(
                            "{} rejected {} times (code {:#04x}), giving up",
                            name, rejected, code
                        );
                        return Ok(CommandOutcome::Failed(FailureReason::DeviceRejected {
                            code,
                            attempts: rejected,
                        }));
                    }
                    warn!("{} rejected (code {:#04x}), retrying", name, code);
                }
                DecodedResponse::Malformed if resynced => {
                    error!("{} still malformed after resync, session faulted", name);
                    return Ok(CommandOutcome::Failed(FailureReason::Desync));
                }
                DecodedResponse::Malformed => {
                    warn!("Malformed response to {}, resynchronizing", name);
                    inner.transport.drain_input(self.config.resync_quiet())?;
                    resynced = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CommandKind;
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ack,
        Nack(u8),
        Garbage,
        Silence,
    }

    #[derive(Default)]
    struct Log {
        writes: Vec<Vec<u8>>,
        drains: usize,
        opens: usize,
        fail_writes: bool,
        panic_next_write: bool,
    }

    struct ScriptedTransport {
        profile: &'static RevisionProfile,
        log: Arc<Mutex<Log>>,
        replies: VecDeque<Reply>,
        fallback: Reply,
        open_fails: bool,
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    impl ScriptedTransport {
        fn new(revision: Revision, replies: &[Reply], fallback: Reply) -> Self {
            Self {
                profile: revision.profile(),
                log: Arc::default(),
                replies: replies.iter().copied().collect(),
                fallback,
                open_fails: false,
                gate: None,
            }
        }

        fn log(&self) -> Arc<Mutex<Log>> {
            self.log.clone()
        }

        fn last_opcode(&self) -> &'static [u8] {
            let log = self.log.lock().unwrap();
            let last = log.writes.last().expect("read before write");
            [
                CommandKind::Reset,
                CommandKind::Clear,
                CommandKind::ScreenOff,
                CommandKind::ScreenOn,
                CommandKind::SetBrightness,
                CommandKind::SetOrientation,
                CommandKind::DisplayChunk,
            ]
            .into_iter()
            .filter_map(|kind| self.profile.opcodes.get(kind))
            .filter(|opcode| last.starts_with(opcode))
            .max_by_key(|opcode| opcode.len())
            .expect("unknown opcode")
        }
    }

    impl Transport for ScriptedTransport {
        fn open(&mut self) -> Result<()> {
            if self.open_fails {
                return Err(Error::Connection("no device".into()));
            }
            self.log.lock().unwrap().opens += 1;
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            {
                let mut log = self.log.lock().unwrap();
                if log.fail_writes {
                    return Err(Error::SerialIo(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "gone",
                    )));
                }
                if std::mem::take(&mut log.panic_next_write) {
                    drop(log);
                    panic!("transport panicked mid-write");
                }
                log.writes.push(bytes.to_vec());
            }
            if let Some((written, _)) = &self.gate {
                written.send(()).unwrap();
            }
            Ok(())
        }

        fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
            if let Some((_, release)) = &self.gate {
                release.recv().unwrap();
            }
            let reply = self.replies.pop_front().unwrap_or(self.fallback);
            let opcode = self.last_opcode();
            match reply {
                Reply::Ack => Ok(response::ack_bytes(opcode, self.profile)),
                Reply::Nack(code) => Ok(response::nack_bytes(opcode, code, self.profile)),
                Reply::Garbage => Ok(vec![0xFF; n]),
                Reply::Silence => Err(Error::Timeout(timeout)),
            }
        }

        fn drain_input(&mut self, _quiet_period: Duration) -> Result<()> {
            self.log.lock().unwrap().drains += 1;
            Ok(())
        }
    }

    fn writes(log: &Arc<Mutex<Log>>) -> usize {
        log.lock().unwrap().writes.len()
    }

    #[test]
    fn test_success() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            session.execute(&Command::Clear).unwrap(),
            CommandOutcome::Success
        );
        assert_eq!(log.lock().unwrap().writes, vec![vec![0x66, 0x00, 0x00]]);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_nack_twice_then_ack() {
        let transport = ScriptedTransport::new(
            Revision::B,
            &[Reply::Nack(1), Reply::Nack(1)],
            Reply::Ack,
        );
        let log = transport.log();
        let session = connect(transport, Revision::B).unwrap();

        let outcome = session.execute(&Command::SetBrightness(50)).unwrap();
        assert_eq!(outcome, CommandOutcome::RetriedSuccess(2));
        assert!(outcome.is_success());

        let log = log.lock().unwrap();
        assert_eq!(log.writes.len(), 3);
        assert!(log.writes.iter().all(|w| *w == log.writes[0]));
        assert_eq!(log.drains, 0);
    }

    #[test]
    fn test_always_nack_gives_up_after_three() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Nack(0x42));
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        let outcome = session.execute(&Command::Reset).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Failed(FailureReason::DeviceRejected {
                code: 0x42,
                attempts: 3
            })
        );
        assert!(matches!(
            outcome.into_result(),
            Err(Error::DeviceRejected { code: 0x42 })
        ));
        assert_eq!(writes(&log), 3);
        // the panel itself is presumed healthy
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_garbage_once_resyncs() {
        let transport = ScriptedTransport::new(Revision::D, &[Reply::Garbage], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::D).unwrap();

        let outcome = session.execute(&Command::Clear).unwrap();
        assert_eq!(outcome, CommandOutcome::RetriedSuccess(1));
        assert_eq!(log.lock().unwrap().drains, 1);
        assert_eq!(writes(&log), 2);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_timeout_once_resyncs() {
        let transport = ScriptedTransport::new(Revision::C, &[Reply::Silence], Reply::Ack);
        let session = connect(transport, Revision::C).unwrap();

        let outcome = session.execute(&Command::ScreenOn).unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_persistent_garbage_faults() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Garbage);
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        let outcome = session.execute(&Command::Clear).unwrap();
        assert_eq!(outcome, CommandOutcome::Failed(FailureReason::Desync));
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(writes(&log), 2);

        assert!(matches!(
            session.execute(&Command::Clear),
            Err(Error::SessionFaulted)
        ));
        assert!(matches!(session.connect(), Err(Error::SessionFaulted)));
        assert_eq!(writes(&log), 2);
    }

    #[test]
    fn test_reset_recovers_faulted_session() {
        let transport = ScriptedTransport::new(
            Revision::A,
            &[Reply::Garbage, Reply::Garbage],
            Reply::Ack,
        );
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        session.execute(&Command::Clear).unwrap();
        assert_eq!(session.state(), SessionState::Faulted);

        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(log.lock().unwrap().opens, 2);
        assert_eq!(log.lock().unwrap().drains, 2);
        assert_eq!(
            session.execute(&Command::Clear).unwrap(),
            CommandOutcome::Success
        );
    }

    #[test]
    fn test_write_error_faults_session() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        log.lock().unwrap().fail_writes = true;
        assert!(matches!(
            session.execute(&Command::Clear),
            Err(Error::SerialIo(_))
        ));
        assert_eq!(session.state(), SessionState::Faulted);
        assert!(matches!(
            session.execute(&Command::Clear),
            Err(Error::SessionFaulted)
        ));

        log.lock().unwrap().fail_writes = false;
        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            session.execute(&Command::Clear).unwrap(),
            CommandOutcome::Success
        );
    }

    #[test]
    fn test_panicked_command_can_be_reset() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        log.lock().unwrap().panic_next_write = true;
        let session = Arc::new(connect(transport, Revision::A).unwrap());

        let worker = {
            let session = session.clone();
            thread::spawn(move || session.execute(&Command::Clear))
        };
        assert!(worker.join().is_err());

        assert_eq!(session.state(), SessionState::Faulted);
        assert!(matches!(
            session.execute(&Command::Clear),
            Err(Error::SessionFaulted)
        ));

        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            session.execute(&Command::Clear).unwrap(),
            CommandOutcome::Success
        );
        assert_eq!(log.lock().unwrap().opens, 2);
    }

    #[test]
    fn test_brightness_out_of_range_touches_nothing() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        for level in [101, -1] {
            assert!(matches!(
                session.execute(&Command::SetBrightness(level)),
                Err(Error::InvalidArgument(_))
            ));
        }
        assert_eq!(writes(&log), 0);
        assert_eq!(session.state(), SessionState::Ready);

        assert!(session.execute(&Command::SetBrightness(0)).unwrap().is_success());
        assert!(session.execute(&Command::SetBrightness(100)).unwrap().is_success());
    }

    #[test]
    fn test_disconnected_session_refuses_commands() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        let session = DeviceSession::new(transport, Revision::A, SessionConfig::default());

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.execute(&Command::Clear),
            Err(Error::NotConnected)
        ));
        assert_eq!(writes(&log), 0);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let mut transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        transport.open_fails = true;
        let session = DeviceSession::new(transport, Revision::A, SessionConfig::default());

        assert!(matches!(session.connect(), Err(Error::Connection(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_helper_reports_connection_error() {
        let mut transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        transport.open_fails = true;
        assert!(matches!(
            connect(transport, Revision::A),
            Err(Error::Connection(_))
        ));
    }

    #[test]
    fn test_orientation_tracked_on_ack() {
        let transport = ScriptedTransport::new(Revision::A, &[Reply::Nack(1)], Reply::Ack);
        let session = connect(transport, Revision::A).unwrap();
        assert_eq!(session.dimensions(), (320, 480));

        session
            .execute(&Command::SetOrientation(Orientation::Landscape))
            .unwrap();
        assert_eq!(session.orientation(), Orientation::Landscape);
        assert_eq!(session.dimensions(), (480, 320));
    }

    #[test]
    fn test_orientation_kept_on_failure() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Nack(1));
        let session = connect(transport, Revision::A).unwrap();

        let outcome = session
            .execute(&Command::SetOrientation(Orientation::Landscape))
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(session.orientation(), Orientation::Portrait);
    }

    #[test]
    fn test_unsupported_command() {
        let transport = ScriptedTransport::new(Revision::B, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::B).unwrap();

        assert!(matches!(
            session.execute(&Command::Reset),
            Err(Error::Unsupported { .. })
        ));
        assert_eq!(writes(&log), 0);
    }

    fn gradient(width: u16, height: u16) -> PixelBuffer {
        let mut buf = PixelBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                buf.set_pixel(x, y, [x as u8, y as u8, 0x80]);
            }
        }
        buf
    }

    #[test]
    fn test_display_region_sends_every_chunk() {
        let transport = ScriptedTransport::new(Revision::D, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::D).unwrap();

        // 10x10 RGB565 = 200 bytes, 64 bytes per chunk
        let buf = gradient(10, 10);
        let outcome = session.display_region(&buf, buf.bounds()).unwrap();
        assert_eq!(outcome, CommandOutcome::Success);

        let log = log.lock().unwrap();
        assert_eq!(log.writes.len(), 4);
        // opcode (2) + length (1) + rect (8) -> last flag
        let flags: Vec<u8> = log.writes.iter().map(|w| w[11]).collect();
        assert_eq!(flags, vec![0, 0, 0, 1]);

        let sent: Vec<u8> = log.writes.iter().flat_map(|w| w[12..].to_vec()).collect();
        let expected =
            codec::encode_whole(&buf, buf.bounds(), session.profile().pixel_format).unwrap();
        assert_eq!(sent, expected);
    }

    #[test]
    fn test_display_region_stops_at_failed_chunk() {
        let transport = ScriptedTransport::new(
            Revision::D,
            &[Reply::Ack, Reply::Nack(9), Reply::Nack(9), Reply::Nack(9)],
            Reply::Ack,
        );
        let log = transport.log();
        let session = connect(transport, Revision::D).unwrap();

        let buf = gradient(10, 10);
        let outcome = session.display_region(&buf, buf.bounds()).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Failed(FailureReason::DeviceRejected {
                code: 9,
                attempts: 3
            })
        );
        assert_eq!(writes(&log), 4);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_display_region_desync_faults_mid_transfer() {
        let transport = ScriptedTransport::new(Revision::D, &[Reply::Ack], Reply::Garbage);
        let log = transport.log();
        let session = connect(transport, Revision::D).unwrap();

        let buf = gradient(10, 10);
        let outcome = session.display_region(&buf, buf.bounds()).unwrap();
        assert_eq!(outcome, CommandOutcome::Failed(FailureReason::Desync));
        // chunk 1, then chunk 2 and its one re-send
        assert_eq!(writes(&log), 3);
        assert_eq!(log.lock().unwrap().drains, 1);
        assert_eq!(session.state(), SessionState::Faulted);
        assert!(matches!(
            session.display_region(&buf, buf.bounds()),
            Err(Error::SessionFaulted)
        ));
        assert_eq!(writes(&log), 3);
    }

    #[test]
    fn test_display_region_sums_retries() {
        let transport = ScriptedTransport::new(
            Revision::D,
            &[Reply::Nack(1), Reply::Ack, Reply::Garbage],
            Reply::Ack,
        );
        let session = connect(transport, Revision::D).unwrap();

        let buf = gradient(10, 10);
        assert_eq!(
            session.display_region(&buf, buf.bounds()).unwrap(),
            CommandOutcome::RetriedSuccess(2)
        );
    }

    #[test]
    fn test_display_region_out_of_bounds_issues_no_frame() {
        let transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::A).unwrap();

        let buf = gradient(10, 10);
        assert!(matches!(
            session.display_region(&buf, Rect::new(5, 5, 6, 6)),
            Err(Error::OutOfBounds { .. })
        ));
        // fits the buffer, not the 320x480 panel
        let big = PixelBuffer::new(600, 600);
        assert!(matches!(
            session.display_region(&big, Rect::new(0, 0, 400, 10)),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(writes(&log), 0);
    }

    #[test]
    fn test_display_region_software_rotation() {
        let transport = ScriptedTransport::new(Revision::B, &[], Reply::Ack);
        let log = transport.log();
        let session = connect(transport, Revision::B).unwrap();
        session
            .execute(&Command::SetOrientation(Orientation::ReversePortrait))
            .unwrap();

        let mut buf = PixelBuffer::new(2, 1);
        buf.set_pixel(0, 0, [255, 0, 0]);
        buf.set_pixel(1, 0, [0, 0, 255]);
        session.display_region(&buf, buf.bounds()).unwrap();

        let log = log.lock().unwrap();
        let frame = log.writes.last().unwrap();
        assert_eq!(frame[0], 0xCC);
        // mirrored to the bottom-right corner of 320x480
        assert_eq!(&frame[2..10], &[0x3E, 0x01, 0xDF, 0x01, 2, 0, 1, 0]);
        assert_eq!(frame[10], 1);
        // pixel order reversed: blue then red, RGB565 big-endian
        assert_eq!(&frame[11..15], &[0x00, 0x1F, 0xF8, 0x00]);
    }

    #[test]
    fn test_concurrent_caller_gets_busy() {
        let (written_tx, written_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut transport = ScriptedTransport::new(Revision::A, &[], Reply::Ack);
        transport.gate = Some((written_tx, release_rx));
        let log = transport.log();

        let session = Arc::new(connect(transport, Revision::A).unwrap());
        let worker = {
            let session = session.clone();
            thread::spawn(move || session.execute(&Command::Clear))
        };

        written_rx.recv().unwrap();
        assert_eq!(session.state(), SessionState::Busy);
        assert!(matches!(
            session.execute(&Command::Reset),
            Err(Error::Busy)
        ));
        assert_eq!(writes(&log), 1);

        release_tx.send(()).unwrap();
        assert_eq!(worker.join().unwrap().unwrap(), CommandOutcome::Success);
        assert_eq!(session.state(), SessionState::Ready);
    }
}
