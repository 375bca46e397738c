//! TCP command and video channels for VahanaIO

pub mod broadcast;
pub mod command_server;
pub mod frame_buffer;
pub mod listener;
pub mod pipeline;
pub mod registry;
pub mod video_server;
pub mod wire;

pub use broadcast::VideoBroadcaster;
pub use command_server::{CommandReceiver, CommandServer, QueuedCommand};
pub use frame_buffer::{FrameBuffer, FrameReader};
pub use listener::ChannelListener;
pub use pipeline::{StreamOutcome, VideoPipeline};
pub use registry::{ClientHandle, ClientRegistry};
pub use video_server::VideoServer;
