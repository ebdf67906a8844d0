//! Error taxonomy shared by every transport, the parameter model and the drivers

use std::time::Duration;
use thiserror::Error;

/// The error type returned by everything in this crate
///
/// Only `Timeout` is ever handled locally, and only by the operation-complete poll. Everything
/// else is surfaced to the immediate caller; nothing is retried or reconnected behind your back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error
{
    /// No response arrived within the configured window
    #[error("timed out after {timeout:?} waiting for a response to {command:?}")]
    Timeout
    {
        command: String,
        timeout: Duration,
    },
    /// Underlying channel fault, e.g. socket reset or the device was unplugged
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A shell session echoed something other than the command that was sent
    ///
    /// The session can no longer be trusted to be aligned with our reads.
    #[error("shell echoed {echoed:?} for command {sent:?}")]
    ProtocolDesync
    {
        sent: String,
        echoed: String,
    },
    /// The MODCOD index has no row in the specification table
    #[error("MODCOD mode {0} is not in the specification table")]
    UnknownIndex(u32),
    /// The operation is not possible for the current standard/device combination
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// A parameter was outside what the model accepts
    #[error("{what} {value} is out of range, allowed range is [{min}, {max}]")]
    OutOfRange
    {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The operation-complete poll hit its configured bound without the device reporting done
    #[error("operation did not complete after {attempts} polls")]
    PollExhausted
    {
        attempts: u32,
    },
    /// A response or a table cell could not be interpreted
    #[error("could not parse {what} from {input:?}")]
    Parse
    {
        what: &'static str,
        input: String,
    },
    /// The specification table could not be loaded
    #[error("specification table: {0}")]
    SpecTable(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("no instrument named {0:?} is configured")]
    UnknownInstrument(String),
    /// An external tool used as transport (ssh, snmpget, snmpset) exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed
    {
        program: String,
        status: String,
        stderr: String,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error
{
    /// True for errors the operation-complete poll treats as "not done yet"
    pub fn is_timeout(&self) -> bool
    {
        match self {
            Self::Timeout { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    pub(crate) fn parse(what: &'static str, input: impl Into<String>) -> Self
    {
        Self::Parse {
            what: what,
            input: input.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests
{
    use super::Error;
    use std::time::Duration;

    #[test]
    fn timeout_kinds_are_recognized()
    {
        let timeout = Error::Timeout { command: "*OPC?".into(), timeout: Duration::from_secs(1) };
        assert!(timeout.is_timeout());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_timeout());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_timeout());
        assert!(!Error::UnknownIndex(17).is_timeout());
    }

    #[test]
    fn desync_message_names_both_sides()
    {
        let err = Error::ProtocolDesync { sent: "ls".into(), echoed: "l".into() };
        assert_eq!(err.to_string(), "shell echoed \"l\" for command \"ls\"");
    }
}
