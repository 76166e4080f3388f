//! Listener lifecycle for speedtest-server.
//!
//! A [`Server`] binds one listener, runs the accept loop in a background
//! task and hands every connection to the shared [`Handler`]. Stopping
//! closes the listener; connections already accepted run to completion
//! and [`Server::wait`] returns once they have all finished.

use crate::config::Listen;
use crate::handler::Handler;
use crate::socket::{self, LISTEN_BACKLOG};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Lifecycle stage of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Listening,
    Stopped,
}

/// Server instance
pub struct Server {
    listen: Listen,
    state: State,
    cancel: Arc<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// Cloneable handle that stops a running [`Server`].
#[derive(Clone)]
pub struct StopHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }
}

impl Server {
    /// Create a server that will listen on `listen` once started.
    pub fn new(listen: Listen) -> Self {
        let (cancel, _) = watch::channel(false);

        Server {
            listen,
            state: State::Created,
            cancel: Arc::new(cancel),
            accept_task: None,
            local_addr: None,
        }
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Returns as soon as the listener is bound; bind failures are reported
    /// here and nowhere else.
    pub async fn start(&mut self, handler: Arc<Handler>) -> Result<(), ServerError> {
        if self.state != State::Created {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = self.bind().await?;
        let cancel = self.cancel.subscribe();

        info!(address = %self.listen, "Server listening");

        self.accept_task = Some(tokio::spawn(accept_loop(listener, handler, cancel)));
        self.state = State::Listening;
        Ok(())
    }

    async fn bind(&mut self) -> Result<Listener, ServerError> {
        match &self.listen {
            Listen::Tcp { host, port } => {
                let addr = resolve(host, *port).await.map_err(|e| self.bind_error(e))?;
                let std_listener =
                    socket::bind_tcp(addr, LISTEN_BACKLOG).map_err(|e| self.bind_error(e))?;
                let listener =
                    TcpListener::from_std(std_listener).map_err(|e| self.bind_error(e))?;

                self.local_addr = listener.local_addr().ok();
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Listen::Unix(path) => {
                socket::remove_stale_socket(path).map_err(|e| self.bind_error(e))?;
                let listener =
                    tokio::net::UnixListener::bind(path).map_err(|e| self.bind_error(e))?;
                Ok(Listener::Unix(listener))
            }
            #[cfg(not(unix))]
            Listen::Unix(_) => Err(self.bind_error(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            ))),
        }
    }

    fn bind_error(&self, source: io::Error) -> ServerError {
        ServerError::Bind {
            addr: self.listen.to_string(),
            source,
        }
    }

    /// Signal the accept loop to exit. In-flight connections are not
    /// interrupted.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Wait for the accept loop and every connection task to finish.
    pub async fn wait(&mut self) {
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Accept loop failed");
            }
            self.state = State::Stopped;
        }
    }

    /// Current stage; a stop request counts as stopped.
    pub fn state(&self) -> State {
        match self.state {
            State::Listening if *self.cancel.borrow() => State::Stopped,
            state => state,
        }
    }

    /// Bound TCP address, available once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Resolve `host:port` to the first matching socket address.
async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"))
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl Listener {
    /// Accept one connection and spawn its handler into `tasks`.
    async fn accept(&self, handler: &Arc<Handler>, tasks: &mut JoinSet<()>) -> io::Result<()> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                spawn_connection(tasks, handler, stream, peer.to_string());
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                spawn_connection(tasks, handler, stream, "unix".to_string());
            }
        }
        Ok(())
    }
}

fn spawn_connection<S>(tasks: &mut JoinSet<()>, handler: &Arc<Handler>, stream: S, peer: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    debug!(peer = %peer, "New connection");

    let handler = Arc::clone(handler);
    tasks.spawn(async move { handler.handle_connection(stream, peer).await });
}

async fn accept_loop(listener: Listener, handler: Arc<Handler>, mut cancel: watch::Receiver<bool>) {
    let mut tasks = JoinSet::new();

    loop {
        if *cancel.borrow_and_update() {
            break;
        }

        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept(&handler, &mut tasks) => {
                if let Err(e) = accepted {
                    warn!(error = %e, "Accept failed, closing listener");
                    break;
                }
            }
        }

        // Reap finished connections so the set does not grow unbounded.
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "Connection task failed");
            }
        }
    }

    drop(listener);
    debug!(connections = tasks.len(), "Listener closed, draining connections");

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Connection task failed");
        }
    }

    info!("Server stopped");
}

/// Server startup errors
#[derive(Debug)]
pub enum ServerError {
    Bind { addr: String, source: io::Error },
    AlreadyStarted,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            ServerError::AlreadyStarted => write!(f, "Server was already started"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::AlreadyStarted => None,
        }
    }
}
