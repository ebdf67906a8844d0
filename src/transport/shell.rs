//! Shell sessions reached over telnet or a serial console

use async_trait::async_trait;
use log::{ debug, error, info };
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::{
    error::{ Error, Result },
    transport::{ line::LineChannel, Transport },
};

/// Runs commands in an interactive shell and returns their output
///
/// Each query checks that the shell echoed exactly the command that was sent before trusting any
/// output, then collects lines until the prompt comes back. The last prompt seen is kept, since
/// it carries the shell's working directory.
pub struct ShellTransport<T>
{
    channel: LineChannel<T>,
    /// Text that identifies a prompt line, e.g. `root@jester`
    marker: String,
    current_prompt: String,
    /// Terminal width used to predict how many lines a long echo wraps onto
    ///
    /// `None` expects every echo on one line.
    terminal_width: Option<usize>,
}

pub const DEFAULT_TERMINAL_WIDTH: usize = 80;

fn strip_framing(text: &str) -> String
{
    text.replace(&['\r', '\n'][..], "")
}

impl <T> ShellTransport<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Wraps a channel whose shell currently sits at `<marker>:<cwd># `
    pub fn with(channel: LineChannel<T>, marker: impl Into<String>, cwd: &str) -> Self
    {
        let marker = marker.into();
        let current_prompt = format!("{}:{}# ", marker, cwd);

        Self {
            channel: channel,
            marker: marker,
            current_prompt: current_prompt,
            terminal_width: Some(DEFAULT_TERMINAL_WIDTH),
        }
    }

    /// A width of 0 turns echo wrapping off
    pub fn with_terminal_width(mut self, width: usize) -> Self
    {
        self.terminal_width = Some(width).filter(|width| *width > 0);
        self
    }

    /// The prompt line last printed by the shell
    pub fn current_prompt(&self) -> &str
    {
        &self.current_prompt
    }

    /// The shell's working directory as shown in the prompt, if the prompt has one
    pub fn cwd(&self) -> Option<&str>
    {
        let (_, rest) = self.current_prompt.split_once(':')?;
        let end = rest.rfind(&['#', '$'][..])?;
        Some(rest[..end].trim())
    }

    fn echo_lines(&self, command: &str) -> usize
    {
        match self.terminal_width {
            Some(width) => {
                let length = self.current_prompt.chars().count() + command.chars().count();
                ((length + width - 1) / width).max(1)
            },
            None => 1,
        }
    }

    /// Reads the echo of `command` and checks it matches
    ///
    /// Blank lines before a non-empty echo are skipped. An empty command echoes as a blank line.
    async fn verify_echo(&mut self, command: &str) -> Result<()>
    {
        let lines = self.echo_lines(command);
        let sent = strip_framing(command);
        let mut echo = String::new();

        loop {
            for _ in 0..lines {
                echo.push_str(&strip_framing(&self.channel.read_line_or_prompt(&self.marker).await?));
            }
            if echo.contains(&self.marker) {
                // the prompt was glued to the echo, keep what follows it
                echo = match echo.split_once("# ").or_else(|| echo.split_once("$ ")) {
                    Some((_, typed)) => typed.to_string(),
                    None => String::new(),
                };
            }
            if !echo.is_empty() || sent.is_empty() {
                break;
            }
        }

        if echo != sent {
            error!("Shell echoed {:?} for {:?}", echo, sent);
            return Err(Error::ProtocolDesync { sent: sent, echoed: echo });
        }

        Ok(())
    }

    /// Collects output lines until the prompt reappears
    async fn read_until_prompt(&mut self, command: &str) -> Result<String>
    {
        let mut output = String::new();

        loop {
            let line = match self.channel.read_line_or_prompt(&self.marker).await {
                Ok(line) => line,
                Err(Error::Timeout { timeout, .. }) => {
                    error!("Parsing for shell command prompt failed! output = {:?}", output);
                    return Err(Error::Timeout { command: command.to_string(), timeout: timeout });
                },
                Err(err) => return Err(err),
            };

            if line.contains(&self.marker) {
                debug!("Shell command complete");
                self.current_prompt = line;
                break;
            }
            output.push_str(&line);
            output.push('\n');
        }

        if output.ends_with('\n') {
            output.pop();
        }

        Ok(output)
    }
}

#[async_trait]
impl <T> Transport for ShellTransport<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Runs the command and discards its output
    ///
    /// The output still has to be drained so the next query starts at a prompt.
    async fn write(&mut self, command: &str) -> Result<()>
    {
        self.query(command).await?;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        self.channel.send(command).await?;
        self.verify_echo(command).await?;
        let output = self.read_until_prompt(command).await?;
        info!("Queried {:?}", command);
        debug!("query result = {:?}", output);

        Ok(output)
    }
}

#[cfg(test)]
mod tests
{
    use super::ShellTransport;
    use crate::{
        error::Error,
        transport::{ line::LineChannel, Transport },
    };
    use std::time::Duration;
    use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };

    /// A fake shell that answers each command line with a canned echo and output
    fn scripted_shell(script: Vec<(&'static str, &'static str)>) -> ShellTransport<tokio::io::DuplexStream>
    {
        let (near, far) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(far);
            let mut lines = BufReader::new(read_half).lines();

            for (echo, reply) in script {
                if lines.next_line().await.unwrap().is_none() {
                    break;
                }
                let response = format!("{}\r\n{}", echo, reply);
                write_half.write_all(response.as_bytes()).await.unwrap();
            }
            // stay connected until the transport hangs up
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        ShellTransport::with(LineChannel::with(near, "\n", Duration::from_millis(200)), "root@jester", "~")
    }

    #[tokio::test]
    async fn output_is_collected_up_to_the_prompt()
    {
        let mut shell = scripted_shell(vec![
            ("cat /proc/version", "Linux version 4.9\r\nbuilt by jenkins\r\nroot@jester:~# "),
        ]);

        let output = shell.query("cat /proc/version").await.unwrap();
        assert_eq!(output, "Linux version 4.9\nbuilt by jenkins");
        assert_eq!(shell.current_prompt(), "root@jester:~# ");
    }

    #[tokio::test]
    async fn prompt_change_tracks_cwd()
    {
        let mut shell = scripted_shell(vec![
            ("cd /tmp", "root@jester:/tmp# "),
            ("pwd", "/tmp\r\nroot@jester:/tmp# "),
        ]);

        shell.write("cd /tmp").await.unwrap();
        assert_eq!(shell.cwd(), Some("/tmp"));
        assert_eq!(shell.query("pwd").await.unwrap(), "/tmp");
    }

    #[tokio::test]
    async fn echo_glued_to_prompt_is_accepted()
    {
        let mut shell = scripted_shell(vec![("root@jester:~# uptime", "up 3 days\r\nroot@jester:~# ")]);
        assert_eq!(shell.query("uptime").await.unwrap(), "up 3 days");
    }

    #[tokio::test]
    async fn empty_command_returns_at_the_next_prompt()
    {
        let mut shell = scripted_shell(vec![
            ("", "root@jester:~# "),
            ("root@jester:~# ", "root@jester:~# "),
            ("uptime", "up 3 days\r\nroot@jester:~# "),
        ]);

        assert_eq!(shell.query("").await.unwrap(), "");
        shell.write("").await.unwrap();
        assert_eq!(shell.query("uptime").await.unwrap(), "up 3 days");
    }

    #[tokio::test]
    async fn mismatched_echo_is_a_desync()
    {
        let mut shell = scripted_shell(vec![("ls -l /va", "root@jester:~# ")]);

        match shell.query("ls -l /var").await {
            Err(Error::ProtocolDesync { sent, echoed }) => {
                assert_eq!(sent, "ls -l /var");
                assert_eq!(echoed, "ls -l /va");
            },
            other => panic!("expected desync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_prompt_times_out()
    {
        let mut shell = scripted_shell(vec![("sleep 100", "")]);
        assert!(shell.query("sleep 100").await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn wrapped_echo_spans_several_lines()
    {
        let command = "echo 0123456789012345678901234567890123456789";
        // 15 prompt columns + 45 command columns fill two lines of a 30 column terminal
        let mut shell = scripted_shell(vec![(
            "echo 0123456789\r\n012345678901234567890123456789",
            "0123456789012345678901234567890123456789\r\nroot@jester:~# ",
        )])
        .with_terminal_width(30);

        assert_eq!(
            shell.query(command).await.unwrap(),
            "0123456789012345678901234567890123456789"
        );
    }
}
