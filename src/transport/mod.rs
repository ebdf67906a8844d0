//! Command channels to instruments
//!
//! Every way of reaching a device (SCPI over a socket, serial line or GPIB gateway, an
//! interactive shell, a remote command over ssh, SNMP) is exposed through the same two
//! operations, so device drivers can be written once against [`Transport`].

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::error::Result;

pub mod line;
pub mod link;
pub mod opc;
pub mod scpi;
pub mod shell;
pub mod snmp;
pub mod ssh;

pub use line::LineChannel;
pub use link::{ Link, GPIB_READ_REQUEST };
pub use opc::{ wait_complete, OpcProbe, PollPolicy, PollState, OPC_QUERY };
pub use scpi::{ CommandSet, ScpiTransport };
pub use shell::ShellTransport;
pub use snmp::SnmpTransport;
pub use ssh::{ OutputStream, SshTransport };

/// A write/query command channel
///
/// Calls on one transport never overlap: each takes `&mut self`, and shared handles serialize
/// through a mutex (see [`crate::registry::Registry`]).
#[async_trait]
pub trait Transport: Send
{
    /// Sends a command that has no response
    ///
    /// What "done" means is up to the transport: an SCPI write returns once the instrument reports
    /// the operation complete, a shell write once the prompt is back.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Sends a command and returns its response without framing characters
    async fn query(&mut self, command: &str) -> Result<String>;
}

#[async_trait]
impl <T> Transport for Arc<Mutex<T>>
    where T: Transport
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        self.lock().await.write(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        self.lock().await.query(command).await
    }
}

#[async_trait]
impl <T> Transport for Box<T>
    where T: Transport + ?Sized
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        (**self).write(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        (**self).query(command).await
    }
}
