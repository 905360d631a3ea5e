//! Listener implementation for bridge sockets.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use mpbridge_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a socket endpoint.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`, replacing a stale Unix socket file if one is left over.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                ListenerKind::Tcp(bind_tcp(endpoint, host, *port)?)
            }
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => {
                ListenerKind::Unix(bind_unix(endpoint, path.as_std_path())?)
            }
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.clone(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Returns the bound TCP address; `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Returns the endpoint actually bound, with the resolved TCP port.
    pub fn bound_endpoint(&self) -> SocketEndpoint {
        match (&self.endpoint, self.local_addr()) {
            (SocketEndpoint::Tcp { host, .. }, Some(addr)) => {
                SocketEndpoint::tcp(host.clone(), addr.port())
            }
            (endpoint, _) => endpoint.clone(),
        }
    }

    /// Starts the accept loop on a background thread.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.listener.set_nonblocking() {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking {
                endpoint: self.endpoint,
                source,
            });
        }
        let endpoint = self.bound_endpoint();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = thread::spawn(move || self.accept_until(&stop, &handler));
        Ok(ListenerHandle {
            endpoint,
            shutdown,
            handle: Some(handle),
        })
    }

    fn accept_until(self, shutdown: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        let endpoint = self.bound_endpoint();
        info!(target: LISTENER_TARGET, %endpoint, "socket listener active");
        let mut last_error = None::<io::ErrorKind>;
        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    debug!(target: LISTENER_TARGET, peer = %stream.peer(), "connection accepted");
                    let handler = Arc::clone(handler);
                    thread::spawn(move || handler.handle(stream));
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    // Repeats of the same failure are logged once.
                    if last_error.replace(error.kind()) != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "socket accept error");
                    }
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        info!(target: LISTENER_TARGET, %endpoint, "socket listener stopped");
        #[cfg(unix)]
        cleanup_unix_socket(&self.endpoint);
    }
}

impl ListenerKind {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Accepts one pending connection; `None` when nothing is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    endpoint: SocketEndpoint,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Endpoint the listener accepts on, with the resolved TCP port.
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Asks the accept loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn bind_tcp(
    endpoint: &SocketEndpoint,
    host: &str,
    port: u16,
) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            endpoint: endpoint.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::NoAddress {
            endpoint: endpoint.clone(),
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })
}

#[cfg(unix)]
fn bind_unix(endpoint: &SocketEndpoint, path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        remove_stale_socket(path)?;
    }
    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })
}

/// Removes a socket file left behind by a server that is no longer running.
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let stale = |step: &'static str| {
        move |source: io::Error| ListenerError::StaleSocket {
            path: display(),
            step,
            source,
        }
    };

    let metadata = fs::symlink_metadata(path).map_err(stale("inspect"))?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotASocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::SocketInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(stale("remove"))
        }
        Err(error) => Err(stale("probe")(error)),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
