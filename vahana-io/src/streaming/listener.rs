//! Accept loop shared by the command and video channels
//!
//! The listener is non-blocking and polled so the loop notices shutdown
//! within one poll tick. Admission is decided against the channel's
//! registry before any byte is read: a connection that arrives while the
//! channel is full is shut down immediately (capacity rejection).

use crate::context::ServerContext;
use crate::core::types::ChannelKind;
use crate::error::{Error, Result};
use crate::streaming::registry::ClientHandle;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Bound TCP listener for one channel
pub struct ChannelListener {
    listener: TcpListener,
    kind: ChannelKind,
    local_addr: SocketAddr,
    write_timeout: Duration,
}

impl ChannelListener {
    /// Bind `addr`. Failure is fatal at startup.
    pub fn bind(addr: SocketAddr, kind: ChannelKind, write_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        log::info!("{} channel listening on {}", kind, local_addr);

        Ok(Self {
            listener,
            kind,
            local_addr,
            write_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the server stops running
    ///
    /// `on_admit` receives the connection and the handle already registered
    /// for it. On exit every client of this channel is closed.
    pub fn run<F>(&self, ctx: &ServerContext, poll: Duration, mut on_admit: F)
    where
        F: FnMut(TcpStream, Arc<ClientHandle>),
    {
        log::info!("{} accept loop started", self.kind);

        while ctx.is_running() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Some(handle) = self.admit(ctx, &stream, addr) {
                        on_admit(stream, handle);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(poll);
                }
                Err(e) => {
                    log::error!("Error accepting {} connection: {}", self.kind, e);
                    thread::sleep(poll);
                }
            }
        }

        // A client admitted while shutdown was in progress
        ctx.registry(self.kind).close_all();
        log::info!("{} accept loop stopped", self.kind);
    }

    fn admit(
        &self,
        ctx: &ServerContext,
        stream: &TcpStream,
        addr: SocketAddr,
    ) -> Option<Arc<ClientHandle>> {
        let registry = ctx.registry(self.kind);

        if registry.is_full() {
            registry.reap_disconnected();
        }
        if registry.is_full() {
            log::warn!(
                "Rejected {} connection from {}: {} client(s) already connected",
                self.kind,
                addr,
                registry.len()
            );
            let _ = stream.shutdown(Shutdown::Both);
            return None;
        }

        if let Err(e) = stream.set_nonblocking(false) {
            log::error!("Failed to set {} socket to blocking mode: {}", self.kind, e);
            let _ = stream.shutdown(Shutdown::Both);
            return None;
        }
        if let Err(e) = stream.set_write_timeout(Some(self.write_timeout)) {
            log::warn!("Failed to set write timeout for {}: {}", addr, e);
        }
        let _ = stream.set_nodelay(true);

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("Failed to clone {} socket for {}: {}", self.kind, addr, e);
                let _ = stream.shutdown(Shutdown::Both);
                return None;
            }
        };

        let handle = Arc::new(ClientHandle::new(writer, addr, self.kind));
        if !registry.try_add(Arc::clone(&handle)) {
            log::warn!("Rejected {} connection from {}: registry full", self.kind, addr);
            handle.close();
            return None;
        }

        log::info!("New {} connection from {}", self.kind, addr);
        Some(handle)
    }
}
