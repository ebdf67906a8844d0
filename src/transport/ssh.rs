//! Remote command execution through the system `ssh` client

use std::time::Duration;
use async_trait::async_trait;
use log::{ debug, info, warn };
use tokio::process::Command;
use crate::{
    error::{ Error, Result },
    transport::Transport,
};

/// Which output stream of the remote command a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream
{
    Stdout,
    Stderr,
}

/// Runs every command as its own `ssh` invocation
///
/// Authentication is left to the ssh client (keys, agent, `~/.ssh/config`); batch mode is forced
/// so a password prompt fails fast instead of hanging the transport.
pub struct SshTransport
{
    program: String,
    destination: String,
    port: u16,
    timeout: Duration,
    stream: OutputStream,
    /// How many times a query is repeated while the command prints nothing
    empty_retries: u32,
}

impl SshTransport
{
    pub fn with(host: &str, user: &str, timeout: Duration) -> Self
    {
        Self {
            program: "ssh".into(),
            destination: format!("{}@{}", user, host),
            port: 22,
            timeout: timeout,
            stream: OutputStream::Stdout,
            empty_retries: 3,
        }
    }

    pub fn port(mut self, port: u16) -> Self
    {
        self.port = port;
        self
    }

    /// Use a different ssh client binary
    pub fn program(mut self, program: impl Into<String>) -> Self
    {
        self.program = program.into();
        self
    }

    pub fn stream(mut self, stream: OutputStream) -> Self
    {
        self.stream = stream;
        self
    }

    pub fn empty_retries(mut self, retries: u32) -> Self
    {
        self.empty_retries = retries;
        self
    }

    pub fn destination(&self) -> &str
    {
        &self.destination
    }

    fn command(&self, remote: &str) -> Command
    {
        let mut command = Command::new(&self.program);
        command
            .arg("-o").arg("BatchMode=yes")
            .arg("-o").arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)))
            .arg("-p").arg(self.port.to_string())
            .arg(&self.destination)
            .arg(remote)
            .kill_on_drop(true);
        command
    }

    async fn run(&self, remote: &str) -> Result<std::process::Output>
    {
        let output = tokio::time::timeout(self.timeout, self.command(remote).output())
            .await
            .map_err(|_| Error::Timeout { command: remote.to_string(), timeout: self.timeout })??;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

/// Drops the single trailing newline a remote command usually prints
fn strip_trailing_newline(mut text: String) -> String
{
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

#[async_trait]
impl Transport for SshTransport
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        self.run(command).await?;
        info!("Wrote {:?}", command);
        Ok(())
    }

    /// Runs the command and returns its output
    ///
    /// A command that printed nothing is run again, up to the configured number of retries.
    async fn query(&mut self, command: &str) -> Result<String>
    {
        let mut result = String::new();

        for attempt in 0..=self.empty_retries {
            let output = self.run(command).await?;
            info!("Queried {:?}", command);

            let bytes = match self.stream {
                OutputStream::Stdout => output.stdout,
                OutputStream::Stderr => output.stderr,
            };
            result = strip_trailing_newline(String::from_utf8_lossy(&bytes).into_owned());
            debug!("query result = {:?}", result);

            if !result.is_empty() {
                break;
            }
            warn!("{:?} printed nothing (attempt {})", command, attempt + 1);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests
{
    use super::{ strip_trailing_newline, OutputStream, SshTransport };
    use crate::{ error::Error, transport::Transport };
    use std::time::Duration;

    #[test]
    fn only_one_newline_is_stripped()
    {
        assert_eq!(strip_trailing_newline("42\n".into()), "42");
        assert_eq!(strip_trailing_newline("a\nb\n\n".into()), "a\nb\n");
        assert_eq!(strip_trailing_newline("42\r\n".into()), "42");
        assert_eq!(strip_trailing_newline("42".into()), "42");
    }

    #[test]
    fn arguments_target_the_destination()
    {
        let transport = SshTransport::with("10.1.1.5", "root", Duration::from_secs(5)).port(2222);
        let command = transport.command("uptime");
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(transport.destination(), "root@10.1.1.5");
        assert_eq!(&args[args.len() - 2..], ["root@10.1.1.5", "uptime"]);
        assert!(args.windows(2).any(|pair| pair == ["-p", "2222"]));
        assert!(args.iter().any(|arg| arg == "BatchMode=yes"));
    }

    // `echo` stands in for the ssh client and simply prints its arguments back
    #[cfg(unix)]
    #[tokio::test]
    async fn query_returns_program_output()
    {
        let mut transport = SshTransport::with("host", "user", Duration::from_secs(5))
            .program("echo")
            .stream(OutputStream::Stdout);

        let output = transport.query("hello").await.unwrap();
        assert!(output.ends_with("user@host hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_reported()
    {
        let mut transport = SshTransport::with("host", "user", Duration::from_secs(5)).program("false");
        assert!(matches!(transport.write("true").await, Err(Error::CommandFailed { .. })));
    }
}
