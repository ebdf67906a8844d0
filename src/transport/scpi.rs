//! SCPI command/query transport

use async_trait::async_trait;
use log::debug;
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::{
    error::Result,
    transport::{
        line::LineChannel,
        opc::{ self, PollPolicy },
        Transport,
    },
};

/// Whether writes are followed by an operation-complete poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSet
{
    /// SCPI instrument: every write waits for `*OPC?` to report done
    Scpi,
    /// Plain line protocol without a status register
    Raw,
}

/// Talks to an SCPI instrument over a line channel
///
/// The channel may be a raw socket, a telnet session to an SCPI port, a serial line or a GPIB
/// gateway; the transport does not care. What it guarantees is that `write` does not return
/// before the instrument finished executing the command, so the next command is never sent to a
/// busy device.
pub struct ScpiTransport<T>
{
    channel: LineChannel<T>,
    commands: CommandSet,
    policy: PollPolicy,
}

impl <T> ScpiTransport<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    pub fn with(channel: LineChannel<T>, commands: CommandSet, policy: PollPolicy) -> Self
    {
        Self {
            channel: channel,
            commands: commands,
            policy: policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy
    {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: PollPolicy)
    {
        self.policy = policy;
    }

    pub fn channel_mut(&mut self) -> &mut LineChannel<T>
    {
        &mut self.channel
    }

    /// Polls until the instrument reports the last operation complete
    ///
    /// Returns the number of polls it took.
    pub async fn complete_operation(&mut self) -> Result<u32>
    {
        let attempts = opc::wait_complete(&mut self.channel, &self.policy).await?;
        debug!("Write operation complete after {} polls", attempts);
        Ok(attempts)
    }

    /// `*IDN?`
    pub async fn identify(&mut self) -> Result<String>
    {
        self.query("*IDN?").await
    }
}

#[async_trait]
impl <T> Transport for ScpiTransport<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        self.channel.send(command).await?;

        if self.commands == CommandSet::Scpi {
            self.complete_operation().await?;
        }

        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        self.channel.query(command).await
    }
}

#[cfg(test)]
mod tests
{
    use super::{ CommandSet, ScpiTransport };
    use crate::{
        error::Error,
        transport::{ line::LineChannel, opc::PollPolicy, Transport },
    };
    use std::time::Duration;
    use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };

    fn policy() -> PollPolicy
    {
        PollPolicy { interval: Duration::ZERO, ..PollPolicy::default() }
    }

    #[tokio::test]
    async fn write_polls_until_complete()
    {
        let (near, far) = tokio::io::duplex(1024);
        let mut transport = ScpiTransport::with(
            LineChannel::with(near, "\n", Duration::from_secs(1)),
            CommandSet::Scpi,
            policy(),
        );

        let device = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(far);
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();
            let mut opc_answers = vec!["0", "0", "1"].into_iter();

            while let Some(line) = lines.next_line().await.unwrap() {
                if line == "*OPC?" {
                    let answer = opc_answers.next().unwrap();
                    write_half.write_all(format!("{}\n", answer).as_bytes()).await.unwrap();
                    if answer == "1" {
                        received.push(line);
                        break;
                    }
                }
                received.push(line);
            }
            received
        });

        transport.write("SOUR:FREQ:ACT:CENT 974000000").await.unwrap();
        let received = device.await.unwrap();
        assert_eq!(received, vec!["SOUR:FREQ:ACT:CENT 974000000", "*OPC?", "*OPC?", "*OPC?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_opc_reply_is_not_taken_for_the_next_answer()
    {
        let (near, far) = tokio::io::duplex(1024);
        let mut transport = ScpiTransport::with(
            LineChannel::with(near, "\n", Duration::from_millis(30)),
            CommandSet::Scpi,
            PollPolicy { max_attempts: Some(1), ..policy() },
        );

        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(far);
            let mut lines = BufReader::new(read_half).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.as_str() {
                    "*OPC?" => {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        "1"
                    },
                    "SOUR:FREQ:ACT:CENT?" => "974000000",
                    _ => continue,
                };
                write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            }
        });

        match transport.write("SOUR:FREQ:ACT:CENT 974000000").await {
            Err(Error::PollExhausted { attempts }) => assert_eq!(attempts, 1),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(transport.query("SOUR:FREQ:ACT:CENT?").await.unwrap(), "974000000");
        assert_eq!(transport.channel_mut().owed_replies(), 0);
    }

    #[tokio::test]
    async fn raw_writes_do_not_poll()
    {
        let (near, far) = tokio::io::duplex(1024);
        let mut transport = ScpiTransport::with(
            LineChannel::with(near, "\r\n", Duration::from_millis(50)),
            CommandSet::Raw,
            policy(),
        );

        transport.write("RESET").await.unwrap();
        drop(transport);

        let mut lines = BufReader::new(far).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("RESET"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
