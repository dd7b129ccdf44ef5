//! Outbound controller commands
//!
//! A command is either a G-code/system line or a single realtime byte.
//! Commands are moved into the [`CommandSink`] channel; once sent the engine
//! holds no reference to them.
//!
//! SPDX-License-Identifier: GPL-3.0

use std::fmt;
use tokio::sync::mpsc;

/// GRBL realtime command bytes
pub mod realtime {
    /// Feed hold
    pub const FEED_HOLD: u8 = b'!';
    /// Cycle start / resume
    pub const CYCLE_START: u8 = b'~';
    /// Status report query
    pub const STATUS_QUERY: u8 = b'?';
    /// Soft reset (Ctrl-X)
    pub const SOFT_RESET: u8 = 0x18;
    /// Jog cancel
    pub const JOG_CANCEL: u8 = 0x85;
    /// Feed override +10%
    pub const FEED_OVERRIDE_PLUS: u8 = 0x91;
    /// Feed override -10%
    pub const FEED_OVERRIDE_MINUS: u8 = 0x92;
    /// Spindle override +10%
    pub const SPINDLE_OVERRIDE_PLUS: u8 = 0x9A;
    /// Spindle override -10%
    pub const SPINDLE_OVERRIDE_MINUS: u8 = 0x9B;
}

/// A single command for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text line, newline appended on the wire
    Line(String),
    /// Realtime byte, sent as-is
    Realtime(u8),
}

impl Command {
    pub fn line(text: impl Into<String>) -> Self {
        Command::Line(text.into())
    }

    pub fn feed_hold() -> Self {
        Command::Realtime(realtime::FEED_HOLD)
    }

    pub fn cycle_start() -> Self {
        Command::Realtime(realtime::CYCLE_START)
    }

    pub fn soft_reset() -> Self {
        Command::Realtime(realtime::SOFT_RESET)
    }

    pub fn jog_cancel() -> Self {
        Command::Realtime(realtime::JOG_CANCEL)
    }

    /// Bytes to put on the serial line
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Command::Line(text) => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(b'\n');
                bytes
            }
            Command::Realtime(byte) => vec![*byte],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Line(text) => write!(f, "{}", text),
            Command::Realtime(byte) if byte.is_ascii_graphic() => write!(f, "{}", *byte as char),
            Command::Realtime(byte) => write!(f, "0x{:02X}", byte),
        }
    }
}

/// Receiving half of the command channel
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Fire-and-forget command channel to the serial transport
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSink {
    /// Create a sink and the receiver the transport drains
    pub fn channel() -> (Self, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand a command over to the transport
    pub fn send(&self, command: Command) {
        tracing::info!(command = %command, "Sending command");
        if let Err(e) = self.tx.send(command) {
            tracing::warn!(command = %e.0, "Command transport closed, dropping command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_wire_format() {
        assert_eq!(Command::line("$H").to_wire(), b"$H\n".to_vec());
    }

    #[test]
    fn test_realtime_wire_format() {
        assert_eq!(Command::feed_hold().to_wire(), vec![b'!']);
        assert_eq!(Command::soft_reset().to_wire(), vec![0x18]);
        assert_eq!(Command::Realtime(realtime::FEED_OVERRIDE_PLUS).to_wire(), vec![0x91]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::cycle_start().to_string(), "~");
        assert_eq!(Command::jog_cancel().to_string(), "0x85");
        assert_eq!(Command::line("G10 L20 P0 X0 Y0").to_string(), "G10 L20 P0 X0 Y0");
    }

    #[tokio::test]
    async fn test_sink_moves_commands_in_order() {
        let (sink, mut rx) = CommandSink::channel();
        sink.send(Command::line("$X"));
        sink.send(Command::feed_hold());

        assert_eq!(rx.recv().await, Some(Command::line("$X")));
        assert_eq!(rx.recv().await, Some(Command::feed_hold()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_does_not_panic() {
        let (sink, rx) = CommandSink::channel();
        drop(rx);
        sink.send(Command::line("$H"));
    }
}
