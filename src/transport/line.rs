//! Line-oriented command channel over any async byte stream

use std::time::Duration;
use async_trait::async_trait;
use log::{ debug, info, trace, warn };
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::{
    error::{ Error, Result },
    transport::{ opc::OpcProbe, Transport },
};

/// Writes terminated commands and reads LF-terminated responses
///
/// This is the raw channel: `write` returns as soon as the bytes are out and nothing is polled.
/// [`ScpiTransport`](super::ScpiTransport) and [`ShellTransport`](super::ShellTransport) layer
/// their protocols on top of it.
///
/// Every read is bounded by the channel timeout. A query whose reply times out is still owed a
/// reply by the device, and replies arrive in the order the queries were sent. The channel counts
/// the replies it is owed and skips that many lines before taking the reply to a new query, so a
/// late reply is never returned as the answer to a later one.
pub struct LineChannel<T>
{
    terminator: String,
    timeout: Duration,
    /// Sent after every query before reading, for gateways that only talk when asked to
    read_request: Option<String>,
    io_handle: T,
    read_buf: Vec<u8>,
    /// Replies the device owes us, the awaited one included
    owed: usize,
}

impl <T> LineChannel<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    pub fn with(io_handle: T, terminator: impl Into<String>, timeout: Duration) -> Self
    {
        Self {
            terminator: terminator.into(),
            timeout: timeout,
            read_request: None,
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
            owed: 0,
        }
    }

    pub fn with_read_request(mut self, read_request: impl Into<String>) -> Self
    {
        self.read_request = Some(read_request.into());
        self
    }

    pub fn timeout(&self) -> Duration
    {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration)
    {
        self.timeout = timeout;
    }

    pub fn into_inner(self) -> T
    {
        self.io_handle
    }

    /// Replies the device still owes for queries that timed out
    pub fn owed_replies(&self) -> usize
    {
        self.owed
    }

    /// Forgets every owed reply and anything already buffered
    ///
    /// For a device that dropped its pending replies, e.g. after a reset. Otherwise each later
    /// query would skip its own reply in place of the one that never comes.
    pub fn discard_pending(&mut self)
    {
        if self.owed > 0 || !self.read_buf.is_empty() {
            warn!("Forgetting {} owed replies and {} buffered bytes", self.owed, self.read_buf.len());
        }
        self.owed = 0;
        self.read_buf.clear();
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            self.read_buf.drain(..n);
            // keep memory usage down after long responses
            self.read_buf.shrink_to(128);
        }
    }

    /// Index of the first linefeed in the read buffer at or after `start_hint`
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        self.read_buf
            .get(start_hint..)?
            .iter()
            .position(|byte| *byte == b'\n')
            .map(|index| index + start_hint)
    }

    /// Reads more bytes into the buffer, failing on end of stream
    async fn fill(&mut self) -> Result<usize>
    {
        let mut temp_buf = [0u8; 256];
        let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

        if bytes_read == 0 {
            return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);

        Ok(bytes_read)
    }

    /// Takes `len` bytes off the front of the buffer as a string without CR/LF framing
    fn take_string(&mut self, len: usize) -> String
    {
        let line = String::from_utf8_lossy(&self.read_buf[..len])
            .trim_end_matches(&['\r', '\n'][..])
            .to_string();
        self.drop_first(len);
        line
    }

    /// Reads up to and including the next LF
    ///
    /// # Cancel Safety
    /// Cancel safe: bytes are only ever appended to the read buffer until a full line is present.
    async fn read_line_untimed(&mut self) -> Result<String>
    {
        let mut search_from = 0;

        loop {
            if let Some(index) = self.find_line_ending(search_from) {
                return Ok(self.take_string(index + 1));
            }
            search_from = self.read_buf.len();
            self.fill().await?;
        }
    }

    /// Reads one line, stripping the CR/LF framing
    pub async fn read_line(&mut self) -> Result<String>
    {
        let timeout = self.timeout;
        let line = tokio::time::timeout(timeout, self.read_line_untimed())
            .await
            .map_err(|_| Error::Timeout { command: String::new(), timeout: timeout })??;
        trace!("Read {:?}", line);

        Ok(line)
    }

    /// Reads a line, or an unterminated prompt containing `marker`
    ///
    /// Shells print their prompt without a line ending, so waiting for LF alone would hang.
    /// A partial buffer counts as a prompt once it contains `marker` and ends in `"# "` or `"$ "`.
    pub async fn read_line_or_prompt(&mut self, marker: &str) -> Result<String>
    {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.read_line_or_prompt_untimed(marker))
            .await
            .map_err(|_| Error::Timeout { command: String::new(), timeout: timeout })?
    }

    async fn read_line_or_prompt_untimed(&mut self, marker: &str) -> Result<String>
    {
        loop {
            if let Some(index) = self.find_line_ending(0) {
                return Ok(self.take_string(index + 1));
            }
            if self.buffered_prompt(marker) {
                let len = self.read_buf.len();
                return Ok(self.take_string(len));
            }
            self.fill().await?;
        }
    }

    fn buffered_prompt(&self, marker: &str) -> bool
    {
        let pending = String::from_utf8_lossy(&self.read_buf);
        pending.contains(marker) && (pending.ends_with("# ") || pending.ends_with("$ "))
    }

    /// Writes the command followed by the terminator
    pub async fn send(&mut self, command: &str) -> Result<()>
    {
        let serialized = format!("{}{}", command, self.terminator);
        self.io_handle.write_all(serialized.as_bytes()).await?;
        self.io_handle.flush().await?;
        info!("Wrote {:?}", command);

        Ok(())
    }

    /// Sends a command that the device answers with one line
    async fn send_query(&mut self, command: &str) -> Result<()>
    {
        self.send(command).await?;
        self.owed += 1;

        if let Some(read_request) = self.read_request.clone() {
            self.send(&read_request).await?;
        }

        Ok(())
    }

    /// Reads the reply to the most recent query, skipping replies owed to earlier ones
    ///
    /// A timeout leaves the count untouched: the skipped replies are gone, the rest are still owed.
    async fn read_reply(&mut self) -> Result<String>
    {
        while self.owed > 1 {
            let stale = self.read_line().await?;
            self.owed -= 1;
            warn!("Discarded late reply {:?}", stale);
        }

        let reply = self.read_line().await?;
        self.owed = 0;

        Ok(reply)
    }
}

#[async_trait]
impl <T> Transport for LineChannel<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        self.send(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        self.send_query(command).await?;

        match self.read_reply().await {
            Ok(response) => {
                info!("Queried {:?}", command);
                debug!("query result = {:?}", response);
                Ok(response)
            },
            Err(Error::Timeout { timeout, .. }) => Err(Error::Timeout {
                command: command.to_string(),
                timeout: timeout,
            }),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl <T> OpcProbe for LineChannel<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    async fn request(&mut self) -> Result<()>
    {
        self.send_query(super::opc::OPC_QUERY).await
    }

    async fn reply(&mut self) -> Result<String>
    {
        self.read_reply().await
    }
}

#[cfg(test)]
mod tests
{
    use super::LineChannel;
    use crate::{ error::Error, transport::Transport };
    use std::time::Duration;
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };

    #[tokio::test]
    async fn query_strips_framing()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_secs(1));

        far.write_all(b"R&S,SFU,100000,2.3\r\n").await.unwrap();
        let response = channel.query("*IDN?").await.unwrap();
        assert_eq!(response, "R&S,SFU,100000,2.3");

        let mut sent = [0u8; 6];
        far.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent, b"*IDN?\n");
    }

    #[tokio::test]
    async fn lines_split_across_reads_are_joined()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_secs(1));

        far.write_all(b"first\nsec").await.unwrap();
        assert_eq!(channel.read_line().await.unwrap(), "first");

        far.write_all(b"ond\n").await.unwrap();
        assert_eq!(channel.read_line().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn silence_is_a_timeout_naming_the_query()
    {
        let (near, _far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_millis(20));

        match channel.query("SOUR:FREQ?").await {
            Err(Error::Timeout { command, .. }) => assert_eq!(command, "SOUR:FREQ?"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_stream_is_an_io_error()
    {
        let (near, far) = tokio::io::duplex(256);
        drop(far);
        let mut channel = LineChannel::with(near, "\n", Duration::from_secs(1));

        assert!(matches!(channel.read_line().await, Err(Error::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn query_after_a_timeout_gets_its_own_reply()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_millis(20));

        far.write_all(b"-3").await.unwrap();
        assert!(channel.query("SOUR:POW?").await.unwrap_err().is_timeout());
        assert_eq!(channel.owed_replies(), 1);

        // the first reply finishes arriving together with the second
        far.write_all(b"2.5\n974000000\n").await.unwrap();
        assert_eq!(channel.query("SOUR:FREQ:ACT:CENT?").await.unwrap(), "974000000");
        assert_eq!(channel.owed_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn replies_owed_by_several_timeouts_are_all_skipped()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_millis(20));

        assert!(channel.query("SOUR:POW?").await.is_err());
        assert!(channel.query("SOUR:NOIS:STAT?").await.is_err());
        assert_eq!(channel.owed_replies(), 2);

        far.write_all(b"-32.5\nADD\nS8\n").await.unwrap();
        assert_eq!(channel.query("SOUR:IQC:DVBS2:CONS?").await.unwrap(), "S8");
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_replies_are_not_skipped()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_millis(20));

        assert!(channel.query("*RST;*OPC?").await.is_err());
        channel.discard_pending();

        far.write_all(b"R&S,SFU,100000,2.3\n").await.unwrap();
        assert_eq!(channel.query("*IDN?").await.unwrap(), "R&S,SFU,100000,2.3");
    }

    #[tokio::test]
    async fn unterminated_prompt_is_returned()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_secs(1));

        far.write_all(b"output\r\nroot@jester:/tmp# ").await.unwrap();
        assert_eq!(channel.read_line_or_prompt("root@jester").await.unwrap(), "output");
        assert_eq!(channel.read_line_or_prompt("root@jester").await.unwrap(), "root@jester:/tmp# ");
    }

    #[tokio::test]
    async fn read_request_follows_queries()
    {
        let (near, mut far) = tokio::io::duplex(256);
        let mut channel = LineChannel::with(near, "\n", Duration::from_secs(1))
            .with_read_request("++read eoi");

        far.write_all(b"1\n").await.unwrap();
        channel.query("*OPC?").await.unwrap();

        let mut sent = vec![0u8; "*OPC?\n++read eoi\n".len()];
        far.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, b"*OPC?\n++read eoi\n");
    }
}
