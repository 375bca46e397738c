//! Bounded per-channel client registry
//!
//! Each listener owns one registry. The registry is the only owner of the
//! write side of every accepted connection; removing a client shuts its
//! socket down, which also unblocks any read pending on a cloned handle.
//!
//! All membership changes go through one mutex. Socket writes never happen
//! while that lock is held: broadcast and unicast work on a snapshot.

use crate::core::types::ChannelKind;
use crate::streaming::wire;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One accepted connection
#[derive(Debug)]
pub struct ClientHandle {
    addr: SocketAddr,
    kind: ChannelKind,
    stream: TcpStream,
    closed: AtomicBool,
}

impl ClientHandle {
    pub fn new(stream: TcpStream, addr: SocketAddr, kind: ChannelKind) -> Self {
        Self {
            addr,
            kind,
            stream,
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write raw bytes (command responses)
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        (&self.stream).write_all(bytes)
    }

    /// Write one length-prefixed video frame
    pub fn send_frame(&self, payload: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        wire::write_frame(&mut &self.stream, payload)
    }

    /// Shut the socket down. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        true
    }

    /// Whether the peer has closed its end, without consuming any data
    pub fn peer_hung_up(&self) -> bool {
        let mut probe = [0u8; 1];
        // SAFETY: `probe` is a valid 1-byte buffer and the fd is owned by `self.stream`
        let n = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                probe.as_mut_ptr().cast(),
                probe.len(),
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        match n {
            0 => true,
            n if n > 0 => false,
            _ => !matches!(
                io::Error::last_os_error().kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_closed() {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} client {} already closed", self.kind, self.addr),
            ))
        } else {
            Ok(())
        }
    }
}

/// Set of connected clients for one channel, capped at `max_clients`
pub struct ClientRegistry {
    kind: ChannelKind,
    max_clients: usize,
    clients: Mutex<HashMap<SocketAddr, Arc<ClientHandle>>>,
}

impl ClientRegistry {
    pub fn new(kind: ChannelKind, max_clients: usize) -> Self {
        Self {
            kind,
            max_clients,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a client unless the registry is full
    ///
    /// On `false` nothing changes and the caller must close the connection.
    pub fn try_add(&self, handle: Arc<ClientHandle>) -> bool {
        let mut clients = self.clients.lock();
        if clients.len() >= self.max_clients || clients.contains_key(&handle.addr()) {
            return false;
        }
        clients.insert(handle.addr(), handle);
        true
    }

    /// Unregister and close a client. Idempotent.
    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<ClientHandle>> {
        let removed = self.clients.lock().remove(addr);
        if let Some(handle) = &removed
            && handle.close()
        {
            log::info!("{} client {} closed", self.kind, addr);
        }
        removed
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<ClientHandle>> {
        self.clients.lock().get(addr).cloned()
    }

    /// Current clients, for iteration without holding the lock
    pub fn snapshot(&self) -> Vec<Arc<ClientHandle>> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_any(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_clients
    }

    /// Send `bytes` to the client registered under `addr`
    ///
    /// Returns `false` if the client is gone or the write failed. A failed
    /// write does not unregister the client: its read loop owns teardown.
    pub fn unicast(&self, addr: &SocketAddr, bytes: &[u8]) -> bool {
        let Some(handle) = self.get(addr) else {
            log::debug!("{} client {} gone, dropping {} bytes", self.kind, addr, bytes.len());
            return false;
        };
        match handle.send(bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Error sending to {} client {}: {}", self.kind, addr, e);
                false
            }
        }
    }

    /// Run `send` for every client, removing the ones it fails for
    ///
    /// Returns the number of clients the send succeeded for. A client removed
    /// concurrently is skipped (its closed handle makes `send` fail).
    pub fn broadcast<F>(&self, mut send: F) -> usize
    where
        F: FnMut(&ClientHandle) -> io::Result<()>,
    {
        let mut delivered = 0;
        for handle in self.snapshot() {
            match send(&handle) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    log::warn!("Error sending to {} client {}: {}", self.kind, handle.addr(), e);
                    self.remove(&handle.addr());
                }
            }
        }
        delivered
    }

    /// Drop clients whose peer has already disconnected
    ///
    /// Video clients are never read from, so a vanished viewer is otherwise
    /// only noticed on the next failed frame write.
    pub fn reap_disconnected(&self) -> usize {
        let mut reaped = 0;
        for handle in self.snapshot() {
            if handle.peer_hung_up() {
                log::info!("{} client {} hung up", self.kind, handle.addr());
                self.remove(&handle.addr());
                reaped += 1;
            }
        }
        reaped
    }

    /// Close and unregister every client
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.clients.lock().drain().collect();
        for (_, handle) in &drained {
            handle.close();
        }
        drained.len()
    }
}
