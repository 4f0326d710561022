use razor_udp::transport::DatagramTransport;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// An in-memory socket.
///
/// Sent datagrams are captured instead of leaving the process, failures can be scripted per
/// attempt, inbound datagrams are fed with
/// [MockTransport::inject] and receive errors with [MockTransport::push_recv_failure].
pub struct MockTransport {
    addr: SocketAddr,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    failures: Mutex<VecDeque<io::Error>>,
    recv_failures: Mutex<VecDeque<io::Error>>,
    blocked: AtomicBool,
    attempts: AtomicUsize,
    inbox_tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
}

impl MockTransport {
    pub fn new(addr: SocketAddr) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            addr,
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            recv_failures: Mutex::new(VecDeque::new()),
            blocked: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
        }
    }

    /// The next send attempt fails with `e`, queued in order.
    pub fn push_failure(&self, e: io::Error) {
        self.failures.lock().unwrap().push_back(e);
    }

    /// The next `recv_from` fails with `e` before reading the inbox, queued in order.
    pub fn push_recv_failure(&self, e: io::Error) {
        self.recv_failures.lock().unwrap().push_back(e);
    }

    /// While blocked every attempt reports `WouldBlock`.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn take_sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn inject(&self, datagram: Vec<u8>, from: SocketAddr) {
        let _ = self.inbox_tx.send((datagram, from));
    }
}

impl DatagramTransport for MockTransport {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if let Some(e) = self.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.sent.lock().unwrap().push((buf.to_vec(), target));
        Ok(buf.len())
    }

    fn recv_from<'a>(
        &'a self, buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        async move {
            let failure = self.recv_failures.lock().unwrap().pop_front();
            if let Some(e) = failure {
                return Err(e);
            }
            let mut inbox = self.inbox_rx.lock().await;
            match inbox.recv().await {
                Some((datagram, from)) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    Ok((n, from))
                }
                None => Err(io::ErrorKind::BrokenPipe.into()),
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
