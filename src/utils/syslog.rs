//! Local syslog writer
//!
//! Sends RFC 3164 frames to the local syslog daemon over its datagram
//! socket. Used by the application log layer and the event logger.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

/// Default location of the local syslog socket
pub const SYSLOG_SOCKET: &str = "/dev/log";

/// `user` facility
pub const FACILITY_USER: u8 = 1;

/// Severity used for lines written through `io::Write`
const DEFAULT_SEVERITY: u8 = 6;

/// Build a single syslog frame
pub fn format_frame(facility: u8, severity: u8, tag: &str, message: &str) -> String {
    let priority = u16::from(facility) * 8 + u16::from(severity.min(7));
    format!("<{}>{}[{}]: {}", priority, tag, std::process::id(), message)
}

/// Cloneable handle to the local syslog socket
#[derive(Debug, Clone)]
pub struct SyslogWriter {
    socket: Arc<UnixDatagram>,
    tag: String,
    facility: u8,
}

impl SyslogWriter {
    /// Connect to the default socket
    pub fn connect(tag: &str) -> io::Result<Self> {
        Self::connect_to(SYSLOG_SOCKET, tag)
    }

    pub fn connect_to(path: impl AsRef<Path>, tag: &str) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        // Callers run on async workers; a full daemon queue must not block them
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: Arc::new(socket),
            tag: tag.to_string(),
            facility: FACILITY_USER,
        })
    }

    /// Send one message with an explicit severity
    ///
    /// Fails with `WouldBlock` when the daemon's queue is full; the message
    /// is dropped.
    pub fn send(&self, severity: u8, message: &str) -> io::Result<()> {
        let frame = format_frame(self.facility, severity, &self.tag, message);
        self.socket.send(frame.as_bytes())?;
        Ok(())
    }
}

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let message = text.trim_end();
        if !message.is_empty() {
            match self.send(DEFAULT_SEVERITY, message) {
                Ok(()) => {}
                // Log lines are dropped rather than stalling the caller
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
