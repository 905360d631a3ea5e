//! Outbound sockets for the call path.
//!
//! Every call dials a fresh stream; [`Connection`] hides whether it is TCP or
//! a Unix domain socket.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use mpbridge_config::SocketEndpoint;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use crate::errors::ClientError;

/// Stream operations the call path needs beyond `Read` and `Write`.
trait Duplex: Read + Write + Send {
    fn set_read_deadline(&self, remaining: Option<Duration>) -> io::Result<()>;
    fn set_write_deadline(&self, remaining: Option<Duration>) -> io::Result<()>;
}

impl Duplex for TcpStream {
    fn set_read_deadline(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(remaining)
    }

    fn set_write_deadline(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.set_write_timeout(remaining)
    }
}

#[cfg(unix)]
impl Duplex for UnixStream {
    fn set_read_deadline(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(remaining)
    }

    fn set_write_deadline(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.set_write_timeout(remaining)
    }
}

/// An open stream to the server.
pub(crate) struct Connection {
    stream: Box<dyn Duplex>,
}

impl Connection {
    fn new(stream: impl Duplex + 'static) -> Self {
        Self {
            stream: Box::new(stream),
        }
    }

    /// Bounds the next read; `None` blocks until data arrives.
    pub(crate) fn set_read_timeout(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_deadline(remaining)
    }

    pub(crate) fn set_write_timeout(&self, remaining: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_deadline(remaining)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Dials `endpoint`, giving up after `timeout` when one is set.
///
/// Every resolved TCP address is tried in turn; the last failure is reported.
pub(crate) fn connect(
    endpoint: &SocketEndpoint,
    timeout: Option<Duration>,
) -> Result<Connection, ClientError> {
    let failed = |source| ClientError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let addresses: Vec<_> = (host.as_str(), *port)
                .to_socket_addrs()
                .map_err(|source| ClientError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                })?
                .collect();
            let mut last = io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses");
            for address in addresses {
                let attempt = match timeout {
                    Some(timeout) => TcpStream::connect_timeout(&address, timeout),
                    None => TcpStream::connect(address),
                };
                match attempt {
                    Ok(stream) => return Ok(Connection::new(stream)),
                    Err(error) => last = error,
                }
            }
            Err(failed(last))
        }
        #[cfg(unix)]
        SocketEndpoint::Unix { path } => dial_unix(path.as_str(), timeout).map_err(failed),
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => Err(ClientError::UnsupportedUnixTransport(
            endpoint.to_string(),
        )),
    }
}

#[cfg(unix)]
fn dial_unix(path: &str, timeout: Option<Duration>) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    if let Some(timeout) = timeout {
        socket.connect_timeout(&address, timeout)?;
    } else {
        socket.connect(&address)?;
    }
    Ok(Connection::new(UnixStream::from(std::os::fd::OwnedFd::from(socket))))
}
