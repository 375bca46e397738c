//! Video channel accept loop
//!
//! Video clients are pure write targets: nothing is ever read from them.
//! Admitted connections sit in the video registry until the broadcast loop
//! fails to write to them, a new viewer finds them hung up, or the server
//! shuts down.

use crate::config::NetworkConfig;
use crate::context::ServerContext;
use crate::streaming::listener::ChannelListener;
use std::sync::Arc;

pub struct VideoServer {
    listener: ChannelListener,
    ctx: Arc<ServerContext>,
    network: NetworkConfig,
}

impl VideoServer {
    pub fn new(listener: ChannelListener, ctx: Arc<ServerContext>, network: NetworkConfig) -> Self {
        Self {
            listener,
            ctx,
            network,
        }
    }

    /// Run the accept loop until shutdown
    pub fn run(&self) {
        self.listener
            .run(&self.ctx, self.network.accept_poll(), |_stream, handle| {
                // The registry keeps its own clone of the socket for writing
                log::debug!("Video client {} registered", handle.addr());
            });
    }
}
