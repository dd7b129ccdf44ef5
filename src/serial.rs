//! Serial link to the GRBL controller
//!
//! Commands from the engine are written as they arrive, the controller is
//! polled with `?` at a fixed interval, and its output is split into lines
//! for the [`GrblStatusParser`]. Status snapshots go back to the engine as
//! [`EngineEvent::Status`].
//!
//! SPDX-License-Identifier: GPL-3.0

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::command::{Command, CommandReceiver};
use crate::devices::EngineEvent;
use crate::grbl::GrblStatusParser;
use crate::state::MachineStatus;

/// Read timeout, also paces the link loop
const READ_TIMEOUT_MS: u64 = 10;

/// Open the controller's serial port
pub fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>, SerialError> {
    let port = serialport::new(path, baud_rate)
        .timeout(Duration::from_millis(READ_TIMEOUT_MS))
        .open()
        .map_err(|e| SerialError::Open {
            port: path.to_string(),
            source: e,
        })?;

    tracing::info!(port = path, baud_rate, "Opened controller serial port");
    Ok(port)
}

/// Splits a byte stream into trimmed, non-empty lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                if !line.is_empty() {
                    lines.push(line);
                }
                self.pending.clear();
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }
}

/// Controller connection over any byte stream
pub struct ControllerLink<T> {
    port: T,
    lines: LineBuffer,
    parser: GrblStatusParser,
}

impl<T: Read + Write> ControllerLink<T> {
    pub fn new(port: T, show_work_coordinates: bool) -> Self {
        Self {
            port,
            lines: LineBuffer::new(),
            parser: GrblStatusParser::new(show_work_coordinates),
        }
    }

    /// Write one command
    pub fn send(&mut self, command: &Command) -> Result<(), SerialError> {
        self.port
            .write_all(&command.to_wire())
            .and_then(|_| self.port.flush())
            .map_err(SerialError::Io)
    }

    /// Ask for a status report
    pub fn poll_status(&mut self) -> Result<(), SerialError> {
        self.send(&Command::Realtime(crate::command::realtime::STATUS_QUERY))
    }

    /// Read what the controller has sent and parse it
    ///
    /// A read timeout is not an error; it just yields nothing.
    pub fn read_statuses(&mut self) -> Result<Vec<MachineStatus>, SerialError> {
        let mut buf = [0u8; 256];
        let len = match self.port.read(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(SerialError::Io(e)),
        };

        let mut statuses = Vec::new();
        for line in self.lines.push(&buf[..len]) {
            tracing::trace!(line = %line, "Controller line");
            if let Some(status) = self.parser.feed_line(&line) {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }
}

/// Pump commands out and statuses in until either side closes
///
/// Blocking; run it on a dedicated thread.
pub fn run_link<T: Read + Write>(
    link: &mut ControllerLink<T>,
    commands: &mut CommandReceiver,
    events: &mpsc::UnboundedSender<EngineEvent>,
    poll_interval: Duration,
) -> Result<(), SerialError> {
    let mut last_poll: Option<Instant> = None;

    loop {
        loop {
            match commands.try_recv() {
                Ok(command) => link.send(&command)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Command channel closed, stopping serial link");
                    return Ok(());
                }
            }
        }

        if last_poll.map_or(true, |t| t.elapsed() >= poll_interval) {
            link.poll_status()?;
            last_poll = Some(Instant::now());
        }

        for status in link.read_statuses()? {
            if events.send(EngineEvent::Status(status)).is_err() {
                tracing::debug!("Engine gone, stopping serial link");
                return Ok(());
            }
        }
    }
}

/// Serial error type
#[derive(Debug)]
pub enum SerialError {
    /// Port could not be opened
    Open {
        port: String,
        source: serialport::Error,
    },
    /// Read or write failed
    Io(std::io::Error),
}

impl std::fmt::Display for SerialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialError::Open { port, source } => {
                write!(f, "Failed to open serial port {}: {}", port, source)
            }
            SerialError::Io(e) => write!(f, "Serial I/O error: {}", e),
        }
    }
}

impl std::error::Error for SerialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerialError::Open { source, .. } => Some(source),
            SerialError::Io(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSink;
    use crate::state::RunState;

    /// In-memory port: serves `input` once, then times out
    struct MockPort {
        input: io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockPort {
        fn new(input: &str) -> Self {
            Self {
                input: io::Cursor::new(input.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
                n => Ok(n),
            }
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_buffer_splits_and_keeps_partial() {
        let mut lines = LineBuffer::new();
        assert_eq!(lines.push(b"ok\r\n<Idle|MPos:0,0"), vec!["ok".to_string()]);
        assert_eq!(
            lines.push(b",0>\r\n\r\n"),
            vec!["<Idle|MPos:0,0,0>".to_string()]
        );
        assert!(lines.push(b"partial").is_empty());
    }

    #[test]
    fn test_send_writes_wire_format() {
        let mut link = ControllerLink::new(MockPort::new(""), true);
        link.send(&Command::line("$H")).unwrap();
        link.send(&Command::feed_hold()).unwrap();
        link.poll_status().unwrap();
        assert_eq!(link.port.output, b"$H\n!?".to_vec());
    }

    #[test]
    fn test_read_statuses() {
        let mut link = ControllerLink::new(
            MockPort::new("ok\r\n<Hold:0|MPos:1.000,2.000,3.000|FS:0,0>\r\n"),
            false,
        );
        let statuses = link.read_statuses().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].run_state, RunState::Hold);
        assert_eq!(statuses[0].position[2], 3.0);

        assert!(link.read_statuses().unwrap().is_empty());
    }

    #[test]
    fn test_run_link_flushes_commands_then_stops() {
        let (sink, mut rx) = CommandSink::channel();
        let (events, _events_rx) = mpsc::unbounded_channel();
        sink.send(Command::line("$x"));
        sink.send(Command::jog_cancel());
        drop(sink);

        let mut link = ControllerLink::new(MockPort::new(""), true);
        run_link(&mut link, &mut rx, &events, Duration::from_millis(200)).unwrap();

        let mut expected = b"$x\n".to_vec();
        expected.push(0x85);
        assert_eq!(link.port.output, expected);
    }
}
