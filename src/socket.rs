//! Listener socket setup.

use std::io;
use std::net::SocketAddr;

/// Pending-connection queue length passed to `listen`.
pub const LISTEN_BACKLOG: i32 = 1024;

/// Create a non-blocking TCP listener on `addr`.
///
/// An IPv6 wildcard address gets `IPV6_V6ONLY` cleared so the one listener
/// also accepts IPv4 clients. Other addresses keep the platform default.
pub fn bind_tcp(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if is_dual_stack(&addr) {
        socket.set_only_v6(false)?;
    }

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// True for `[::]:port`, the address that serves both families.
pub fn is_dual_stack(addr: &SocketAddr) -> bool {
    match addr {
        SocketAddr::V6(v6) => v6.ip().is_unspecified(),
        SocketAddr::V4(_) => false,
    }
}

/// Remove a socket file left behind by a previous run.
///
/// Only sockets are removed; any other file at `path` is left alone and the
/// subsequent bind reports the conflict.
#[cfg(unix)]
pub fn remove_stale_socket(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
