//! Stream transport to the AgentX master agent (Unix domain socket or TCP).

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    os::unix::net::UnixStream,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use thiserror::Error;

/// Errors produced when parsing a master agent address.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty AgentX address")]
    Empty,
    #[error("AgentX address {0:?} is neither an absolute socket path nor host:port")]
    MissingPort(String),
    #[error("invalid port in AgentX address {0:?}")]
    InvalidPort(String),
}

/// Where the master agent listens.
///
/// Addresses starting with `/` are Unix socket paths, everything else is
/// `host:port` over TCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterAddress {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl FromStr for MasterAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.starts_with('/') {
            return Ok(MasterAddress::Unix(PathBuf::from(s)));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
        // Accept bracketed IPv6 literals, e.g. [::1]:705.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::MissingPort(s.to_string()));
        }

        Ok(MasterAddress::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for MasterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterAddress::Unix(path) => write!(f, "{}", path.display()),
            MasterAddress::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            MasterAddress::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// A connected stream to the master agent.
#[derive(Debug)]
pub enum Transport {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Transport {
    /// Connects to `address`; `connect_timeout` bounds each TCP attempt.
    pub fn connect(address: &MasterAddress, connect_timeout: Duration) -> io::Result<Self> {
        match address {
            MasterAddress::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
            MasterAddress::Tcp { host, port } => {
                let mut last_err = None;
                for addr in (host.as_str(), *port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, connect_timeout) {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Transport::Tcp(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{} did not resolve to any address", host),
                    )
                }))
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Transport::Unix(s) => s.set_read_timeout(timeout),
            Transport::Tcp(s) => s.set_read_timeout(timeout),
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Transport::Unix(s) => s.set_write_timeout(timeout),
            Transport::Tcp(s) => s.set_write_timeout(timeout),
        }
    }

    /// Shuts down both directions; errors are irrelevant at this point.
    pub fn shutdown(&self) {
        let _ = match self {
            Transport::Unix(s) => s.shutdown(Shutdown::Both),
            Transport::Tcp(s) => s.shutdown(Shutdown::Both),
        };
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Unix(s) => s.read(buf),
            Transport::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Unix(s) => s.write(buf),
            Transport::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Unix(s) => s.flush(),
            Transport::Tcp(s) => s.flush(),
        }
    }
}

/// True for the error kinds a socket read timeout surfaces as.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
