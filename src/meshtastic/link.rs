//! Byte links to the radio: USB serial or the firmware's TCP client port.
//!
//! Both are blocking streams with a short read timeout. The reader holds the link lock only
//! for one timed read, so sends can slip in between.
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;

use super::framer::START2;
use crate::error::BridgeError;

/// Port the firmware listens on for TCP clients.
pub const DEFAULT_TCP_PORT: u16 = 4403;

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Repeated START2 bytes wake the radio's API mode before the first frame.
const WAKE_PREAMBLE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Serial { path: String, baud_rate: u32 },
    Tcp { host: String, port: u16 },
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTarget::Serial { path, baud_rate } => {
                write!(f, "serial port {} @ {} baud", path, baud_rate)
            }
            LinkTarget::Tcp { host, port } => write!(f, "host {}:{}", host, port),
        }
    }
}

pub trait RadioLink: Read + Write + Send {
    fn describe(&self) -> String;
}

pub type SharedLink = Arc<Mutex<Box<dyn RadioLink>>>;

pub struct TcpLink {
    stream: TcpStream,
    peer: String,
}

impl TcpLink {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    stream.set_nodelay(true)?;
                    return Ok(TcpLink {
                        stream,
                        peer: addr.to_string(),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host))
        }))
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl RadioLink for TcpLink {
    fn describe(&self) -> String {
        format!("tcp {}", self.peer)
    }
}

#[cfg(feature = "serial")]
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

#[cfg(feature = "serial")]
impl SerialLink {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);
        let mut port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()?;

        // Assert DTR/RTS so USB-serial bridges keep the radio awake
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        std::thread::sleep(Duration::from_millis(150));

        // Drop boot text still sitting in the driver buffer
        let _ = port.clear(serialport::ClearBuffer::Input);

        Ok(SerialLink {
            port,
            name: path.to_string(),
        })
    }
}

#[cfg(feature = "serial")]
impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(feature = "serial")]
impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

#[cfg(feature = "serial")]
impl RadioLink for SerialLink {
    fn describe(&self) -> String {
        format!("serial {}", self.name)
    }
}

/// Open the link for `target` and send the wake preamble. Blocking.
pub fn open_link(target: &LinkTarget) -> Result<Box<dyn RadioLink>, BridgeError> {
    let mut link: Box<dyn RadioLink> = match target {
        LinkTarget::Tcp { host, port } => Box::new(
            TcpLink::connect(host, *port)
                .map_err(|e| BridgeError::Connection(format!("{}: {}", target, e)))?,
        ),
        #[cfg(feature = "serial")]
        LinkTarget::Serial { path, baud_rate } => Box::new(
            SerialLink::open(path, *baud_rate)
                .map_err(|e| BridgeError::Connection(format!("{}: {}", target, e)))?,
        ),
        #[cfg(not(feature = "serial"))]
        LinkTarget::Serial { .. } => {
            return Err(BridgeError::Connection(format!(
                "{}: built without the `serial` feature",
                target
            )))
        }
    };
    link.write_all(&[START2; WAKE_PREAMBLE_LEN])
        .and_then(|_| link.flush())
        .map_err(|e| BridgeError::Connection(format!("{}: {}", target, e)))?;
    std::thread::sleep(Duration::from_millis(100));
    debug!("Link open: {}", link.describe());
    Ok(link)
}

/// Result of one timed read on a shared link.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Idle,
    Closed,
}

pub fn read_available(link: &SharedLink, buf: &mut [u8]) -> Result<ReadOutcome, BridgeError> {
    let mut guard = link
        .lock()
        .map_err(|_| BridgeError::Connection("radio link lock poisoned".into()))?;
    match guard.read(buf) {
        Ok(0) => Ok(ReadOutcome::Closed),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(ReadOutcome::Idle)
        }
        Err(e) => Err(BridgeError::Connection(format!(
            "read from {} failed: {}",
            guard.describe(),
            e
        ))),
    }
}

/// Write one already-framed message.
pub fn write_frame(link: &SharedLink, frame: &[u8]) -> Result<(), BridgeError> {
    let mut guard = link
        .lock()
        .map_err(|_| BridgeError::Connection("radio link lock poisoned".into()))?;
    guard
        .write_all(frame)
        .and_then(|_| guard.flush())
        .map_err(|e| BridgeError::Send(format!("write to {} failed: {}", guard.describe(), e)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory link for transport tests.
    use super::*;
    use std::collections::VecDeque;

    /// Serves scripted inbound chunks, records everything written.
    pub struct ScriptedLink {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Arc<Mutex<Vec<u8>>>,
        pub close_when_drained: bool,
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.inbound.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None if self.close_when_drained => Ok(0),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
            }
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut w) = self.written.lock() {
                w.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RadioLink for ScriptedLink {
        fn describe(&self) -> String {
            "scripted".into()
        }
    }
}
