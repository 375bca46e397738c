//! VahanaIO - command and video streaming daemon for a camera rover
//!
//! Two TCP channels share one bind address:
//!
//! - **Command channel (port 5000)**: text commands (`MOTOR`, `STOP`, `STREAM`,
//!   `STATUS`) answered with `OK#...`, `ERROR#...` or `STATUS#{json}`
//! - **Video channel (port 8000)**: length-prefixed JPEG frames while
//!   streaming is active
//!
//! Each channel admits a single client at a time.

pub mod command;
pub mod config;
pub mod context;
pub mod core;
pub mod devices;
pub mod error;
pub mod motion;
pub mod net;
pub mod server;
pub mod streaming;

// Re-export commonly used types
pub use config::Config;
pub use context::{ServerContext, StatusReport};
pub use error::{Error, Result};
pub use server::Server;
