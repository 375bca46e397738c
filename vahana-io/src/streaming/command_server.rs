//! Command channel: accept loop and per-client read loop
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Client connects to the command port (default 5000)
//! 2. Accept loop admits it if no other command client is connected
//! 3. A CommandReceiver thread reads from it until EOF, error or inactivity
//! 4. Every read is queued as one command for the dispatcher
//! 5. On exit the client is unregistered (and its socket shut down) once
//! ```
//!
//! There is no framing: one socket read is one command. The read timeout
//! (60s by default) is a liveness guard, not a keepalive: an idle client is
//! disconnected.

use crate::config::NetworkConfig;
use crate::context::ServerContext;
use crate::streaming::listener::ChannelListener;
use crate::streaming::registry::ClientHandle;
use crossbeam_channel::Sender;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A raw command waiting for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Client the response goes back to
    pub peer: SocketAddr,
    pub text: String,
}

/// Accepts command clients and spawns one receiver per client
pub struct CommandServer {
    listener: ChannelListener,
    ctx: Arc<ServerContext>,
    queue: Sender<QueuedCommand>,
    network: NetworkConfig,
}

impl CommandServer {
    pub fn new(
        listener: ChannelListener,
        ctx: Arc<ServerContext>,
        queue: Sender<QueuedCommand>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            listener,
            ctx,
            queue,
            network,
        }
    }

    /// Run the accept loop until shutdown
    pub fn run(&self) {
        self.listener
            .run(&self.ctx, self.network.accept_poll(), |stream, handle| {
                self.spawn_receiver(stream, handle)
            });
    }

    fn spawn_receiver(&self, stream: TcpStream, handle: Arc<ClientHandle>) {
        let addr = handle.addr();
        let mut receiver = CommandReceiver::new(
            addr,
            Arc::clone(&self.ctx),
            self.queue.clone(),
            self.network.read_timeout(),
            self.network.read_buffer_size,
        );

        let spawned = thread::Builder::new()
            .name(format!("cmd-rx-{}", addr.port()))
            .spawn(move || receiver.run(stream));

        if let Err(e) = spawned {
            log::error!("Failed to spawn receiver for {}: {}", addr, e);
            self.ctx.command_clients().remove(&addr);
        }
    }
}

/// Per-client read loop
pub struct CommandReceiver {
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    queue: Sender<QueuedCommand>,
    read_timeout: Duration,
    read_buffer: Vec<u8>,
}

impl CommandReceiver {
    pub fn new(
        peer: SocketAddr,
        ctx: Arc<ServerContext>,
        queue: Sender<QueuedCommand>,
        read_timeout: Duration,
        buffer_size: usize,
    ) -> Self {
        Self {
            peer,
            ctx,
            queue,
            read_timeout,
            read_buffer: vec![0; buffer_size.max(1)],
        }
    }

    /// Read commands until the client goes away, then unregister it
    pub fn run(&mut self, mut stream: TcpStream) {
        log::debug!("Command receiver started for {}", self.peer);

        if let Err(e) = stream.set_read_timeout(Some(self.read_timeout)) {
            log::warn!("Failed to set read timeout for {}: {}", self.peer, e);
        }

        while self.ctx.is_running() {
            match stream.read(&mut self.read_buffer) {
                Ok(0) => {
                    log::info!("Command client {} disconnected", self.peer);
                    break;
                }
                Ok(n) => {
                    let text = String::from_utf8_lossy(&self.read_buffer[..n]).into_owned();
                    log::info!("Received from {}: {:?}", self.peer, text);
                    let queued = QueuedCommand {
                        peer: self.peer,
                        text,
                    };
                    if self.queue.send(queued).is_err() {
                        log::warn!("Command queue closed, dropping {}", self.peer);
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    log::info!(
                        "Timeout on connection from {} ({:?} idle)",
                        self.peer,
                        self.read_timeout
                    );
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Error reading from {}: {}", self.peer, e);
                    break;
                }
            }
        }

        self.ctx.command_clients().remove(&self.peer);
        log::debug!("Command receiver stopped for {}", self.peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChannelKind;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_receiver_queues_reads_and_unregisters() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();

        let ctx = Arc::new(ServerContext::new(1));
        let handle = ClientHandle::new(server.try_clone().unwrap(), peer, ChannelKind::Command);
        assert!(ctx.command_clients().try_add(Arc::new(handle)));

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut receiver =
            CommandReceiver::new(peer, Arc::clone(&ctx), tx, Duration::from_secs(5), 1024);
        let worker = thread::spawn(move || receiver.run(server));

        client.write_all(b"STATUS").unwrap();
        let queued = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(queued.peer, peer);
        assert_eq!(queued.text, "STATUS");

        drop(client);
        worker.join().unwrap();
        assert!(ctx.command_clients().is_empty());
    }

    #[test]
    fn test_idle_client_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();

        let ctx = Arc::new(ServerContext::new(1));
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut receiver = CommandReceiver::new(peer, ctx, tx, Duration::from_millis(100), 1024);

        let started = std::time::Instant::now();
        receiver.run(server);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_shutdown_releases_blocked_receiver() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();

        let ctx = Arc::new(ServerContext::new(1));
        let handle = ClientHandle::new(server.try_clone().unwrap(), peer, ChannelKind::Command);
        assert!(ctx.command_clients().try_add(Arc::new(handle)));

        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut receiver =
            CommandReceiver::new(peer, Arc::clone(&ctx), tx, Duration::from_secs(60), 1024);
        let worker = thread::spawn(move || receiver.run(server));

        // Let the receiver block in read
        thread::sleep(Duration::from_millis(100));
        let started = std::time::Instant::now();
        assert!(ctx.shutdown());
        worker.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(ctx.command_clients().is_empty());
    }
}
