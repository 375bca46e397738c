//! Text protocol of the command channel
//!
//! # Requests
//!
//! ```text
//! VERB(#ARG)*
//! ```
//!
//! The verb is case-insensitive. Arguments are `#`-separated tokens.
//!
//! | Request | Response |
//! |---------|----------|
//! | `MOTOR#lu#ll#ru#rl` | `OK#MOTOR` |
//! | `STOP` | `OK#STOP` |
//! | `STREAM#START` | `OK#STREAM#STARTED` / `OK#STREAM#ALREADY_RUNNING` |
//! | `STREAM#STOP` | `OK#STREAM#STOPPED` / `OK#STREAM#NOT_RUNNING` |
//! | `STATUS` | `STATUS#{"running":..,"streaming":..,"video_clients":..,"command_clients":..}` |
//!
//! Any failure is answered with `ERROR#<message>`.

use crate::context::StatusReport;
use crate::core::types::WheelSpeeds;
use crate::streaming::StreamOutcome;
use std::fmt;

/// Field delimiter on the wire
pub const DELIMITER: char = '#';

/// Number of wheel speeds a MOTOR command carries
pub const MOTOR_ARGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Motor,
    Stop,
    Stream,
    Status,
}

impl Verb {
    /// Look up an uppercase verb
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "MOTOR" => Some(Verb::Motor),
            "STOP" => Some(Verb::Stop),
            "STREAM" => Some(Verb::Stream),
            "STATUS" => Some(Verb::Status),
            _ => None,
        }
    }
}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub args: Vec<String>,
}

impl Command {
    /// Split a raw request into verb and arguments
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut parts = text.trim().split(DELIMITER);
        let name = parts.next().unwrap_or_default().trim().to_uppercase();
        let verb = Verb::from_name(&name).ok_or(ProtocolError::UnknownCommand(name))?;
        let args = parts.map(str::to_string).collect();
        Ok(Self { verb, args })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
}

/// Parse the four wheel speeds of a MOTOR command
///
/// Out-of-range values are accepted here and clamped by the motor controller.
pub fn parse_motor_speeds(args: &[String]) -> Result<WheelSpeeds, ProtocolError> {
    if args.len() != MOTOR_ARGS {
        return Err(ProtocolError::MotorArity(args.len()));
    }
    let mut speeds = [0i32; MOTOR_ARGS];
    for (speed, arg) in speeds.iter_mut().zip(args) {
        let token = arg.trim();
        *speed = token
            .parse()
            .map_err(|_| ProtocolError::InvalidSpeed(token.to_string()))?;
    }
    Ok(WheelSpeeds::from(speeds))
}

/// Parse the START/STOP argument of a STREAM command
pub fn parse_stream_action(args: &[String]) -> Result<StreamAction, ProtocolError> {
    let action = args
        .first()
        .ok_or(ProtocolError::MissingStreamAction)?
        .trim()
        .to_uppercase();
    match action.as_str() {
        "START" => Ok(StreamAction::Start),
        "STOP" => Ok(StreamAction::Stop),
        _ => Err(ProtocolError::UnknownStreamAction(action)),
    }
}

/// Errors reported to the client as `ERROR#<message>`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid motor command format. Expected 4 speed values.")]
    MotorArity(usize),

    #[error("Invalid motor speed: {0:?}")]
    InvalidSpeed(String),

    #[error("Missing streaming command (START/STOP)")]
    MissingStreamAction,

    #[error("Unknown streaming command: {0}")]
    UnknownStreamAction(String),

    /// Driver or internal failure while executing a valid command
    #[error("{0}")]
    Failed(String),
}

impl From<crate::Error> for ProtocolError {
    fn from(e: crate::Error) -> Self {
        ProtocolError::Failed(e.to_string())
    }
}

/// Reply written back to the command client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Motor,
    Stop,
    Stream(StreamOutcome),
    Status(StatusReport),
    Error(String),
}

impl From<ProtocolError> for Response {
    fn from(e: ProtocolError) -> Self {
        Response::Error(e.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Motor => f.write_str("OK#MOTOR"),
            Response::Stop => f.write_str("OK#STOP"),
            Response::Stream(outcome) => {
                let tag = match outcome {
                    StreamOutcome::Started => "STARTED",
                    StreamOutcome::AlreadyRunning => "ALREADY_RUNNING",
                    StreamOutcome::Stopped => "STOPPED",
                    StreamOutcome::NotRunning => "NOT_RUNNING",
                };
                write!(f, "OK#STREAM#{}", tag)
            }
            Response::Status(report) => {
                let json = serde_json::to_string(report).map_err(|_| fmt::Error)?;
                write!(f, "STATUS#{}", json)
            }
            Response::Error(message) => write!(f, "ERROR#{}", message),
        }
    }
}
