//! Datagram transport seam.
//!
//! The engine only needs a non-blocking send and an async receive. Sends that fail because the
//! socket buffer is full are retried by the engine, see [is_transient].

use nix::errno::Errno;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{ToSocketAddrs, UdpSocket};

/// Winsock `WSAENOBUFS`
const WSAENOBUFS: i32 = 10055;

/// This trait is for the datagram layer under an [RpcNode](crate::RpcNode).
///
/// Implementations must preserve message boundaries, one `try_send_to` is one datagram.
pub trait DatagramTransport: Send + Sync + 'static {
    /// Hand one datagram to the OS without waiting.
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Wait for the next datagram.
    fn recv_from<'a>(
        &'a self, buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramTransport for UdpSocket {
    #[inline]
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::try_send_to(self, buf, target)
    }

    #[inline]
    fn recv_from<'a>(
        &'a self, buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        UdpSocket::recv_from(self, buf)
    }

    #[inline]
    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

pub async fn bind_udp<A: ToSocketAddrs>(addr: A) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    debug!("udp socket bound on {:?}", socket.local_addr());
    Ok(socket)
}

/// Send buffer full or would block, worth retrying after a short pause.
pub fn is_transient(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    match e.raw_os_error() {
        Some(code) => {
            code == Errno::EAGAIN as i32 || code == Errno::ENOBUFS as i32 || code == WSAENOBUFS
        }
        None => false,
    }
}

/// Errors from `recv_from` that only report an earlier send failure (ICMP unreachable), the
/// socket is still usable.
pub(crate) fn is_recv_recoverable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}
