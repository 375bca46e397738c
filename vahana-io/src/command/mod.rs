//! Command channel protocol and dispatch
//!
//! - [`protocol`]: request parsing and response encoding
//! - [`dispatcher`]: queue consumer that executes requests

pub mod dispatcher;
pub mod protocol;

pub use dispatcher::CommandDispatcher;
pub use protocol::{Command, ProtocolError, Response, Verb};
