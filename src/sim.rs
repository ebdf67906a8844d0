//! Simulated instruments for dry runs and tests
//!
//! A simulated instrument is just the far end of an in-memory duplex stream, so the transports
//! that talk to it are exactly the ones that talk to real hardware. Simulated instruments answer
//! `*OPC?` with `1`, remember every setting written to them and report it back when queried.
//! Queries for something never written get `1`.

use std::collections::HashMap;
use async_trait::async_trait;
use log::{ debug, info, warn };
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream };
use crate::{
    error::Result,
    transport::Transport,
};

const BUFFER_SIZE: usize = 4096;
const UNKNOWN_ANSWER: &str = "1";

/// Parameter memory of a simulated SCPI instrument
#[derive(Debug, Clone, Default)]
pub struct ScpiSimulator
{
    identity: String,
    settings: HashMap<String, String>,
}

impl ScpiSimulator
{
    pub fn new(identity: impl Into<String>) -> Self
    {
        Self {
            identity: identity.into(),
            settings: HashMap::new(),
        }
    }

    /// The value last written to `header`, if any
    pub fn setting(&self, header: &str) -> Option<&str>
    {
        self.settings.get(&normalize(header)).map(String::as_str)
    }

    /// Handles one command line, returning the response line for queries
    pub fn respond(&mut self, line: &str) -> Option<String>
    {
        let line = line.trim();

        if line.is_empty() || line.starts_with("++") {
            return None;
        }

        match line {
            "*OPC?" => return Some("1".into()),
            "*IDN?" => return Some(self.identity.clone()),
            "*RST" | "*CLS" => {
                if line == "*RST" {
                    self.settings.clear();
                }
                return None;
            },
            _ => (),
        }

        if let Some(header) = line.strip_suffix('?') {
            let answer = self
                .settings
                .get(&normalize(header))
                .cloned()
                .unwrap_or_else(|| UNKNOWN_ANSWER.into());
            return Some(answer);
        }

        match line.split_once(char::is_whitespace) {
            Some((header, value)) => {
                self.settings.insert(normalize(header), value.trim().to_string());
            },
            None => debug!("Simulated instrument ignored {:?}", line),
        }

        None
    }
}

fn normalize(header: &str) -> String
{
    header.trim().trim_start_matches(':').to_ascii_uppercase()
}

/// Starts a simulated SCPI instrument and returns the stream to talk to it
///
/// Must be called from within a tokio runtime. The instrument runs until the stream is dropped.
pub fn spawn_scpi(identity: &str) -> DuplexStream
{
    let (near, far) = tokio::io::duplex(BUFFER_SIZE);
    let mut simulator = ScpiSimulator::new(identity);

    tokio::spawn(async move {
        let (read_half, mut write_half) = tokio::io::split(far);
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(response) = simulator.respond(&line) {
                if write_half.write_all(format!("{}\n", response).as_bytes()).await.is_err() {
                    break;
                }
            }
        }
        debug!("Simulated SCPI instrument closed");
    });

    info!("Simulating SCPI instrument {:?}", identity);
    near
}

/// A tiny shell: `pwd`, `cd` and `echo` work, anything else is "not found"
#[derive(Debug, Clone)]
pub struct ShellSimulator
{
    marker: String,
    cwd: String,
}

impl ShellSimulator
{
    pub fn new(marker: impl Into<String>, cwd: impl Into<String>) -> Self
    {
        Self {
            marker: marker.into(),
            cwd: cwd.into(),
        }
    }

    pub fn prompt(&self) -> String
    {
        format!("{}:{}# ", self.marker, self.cwd)
    }

    /// Everything the shell prints for one command line: echo, output and the next prompt
    pub fn respond(&mut self, line: &str) -> String
    {
        let command = line.trim_end_matches(&['\r', '\n'][..]);
        let mut words = command.split_whitespace();
        let output = match words.next() {
            None => None,
            Some("pwd") => Some(self.cwd.clone()),
            Some("echo") => Some(words.collect::<Vec<_>>().join(" ")),
            Some("cd") => {
                self.change_directory(words.next().unwrap_or("/"));
                None
            },
            Some(program) => Some(format!("sh: {}: not found", program)),
        };

        match output {
            Some(output) => format!("{}\r\n{}\r\n{}", command, output, self.prompt()),
            None => format!("{}\r\n{}", command, self.prompt()),
        }
    }

    fn change_directory(&mut self, target: &str)
    {
        self.cwd = if target.starts_with('/') || target == "~" {
            target.to_string()
        }
        else if target == ".." {
            match self.cwd.rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(index) => self.cwd[..index].to_string(),
            }
        }
        else if self.cwd.ends_with('/') {
            format!("{}{}", self.cwd, target)
        }
        else {
            format!("{}/{}", self.cwd, target)
        };
    }
}

/// Starts a simulated shell sitting at its prompt in `cwd`
///
/// Must be called from within a tokio runtime.
pub fn spawn_shell(marker: &str, cwd: &str) -> DuplexStream
{
    let (near, far) = tokio::io::duplex(BUFFER_SIZE);
    let mut simulator = ShellSimulator::new(marker, cwd);

    tokio::spawn(async move {
        let (read_half, mut write_half) = tokio::io::split(far);
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let response = simulator.respond(&line);
            if write_half.write_all(response.as_bytes()).await.is_err() {
                break;
            }
        }
        debug!("Simulated shell closed");
    });

    info!("Simulating shell {}:{}", marker, cwd);
    near
}

/// Stand-in for transports that run external programs (ssh, SNMP)
///
/// Writes of the form `"<key> <value>"` are remembered; a query for a key returns its value,
/// anything else gets `1`.
pub struct SimulatedTransport
{
    name: String,
    settings: HashMap<String, String>,
}

impl SimulatedTransport
{
    pub fn new(name: impl Into<String>) -> Self
    {
        let name = name.into();
        warn!("{} is simulated, it will return fake values", name);

        Self {
            name: name,
            settings: HashMap::new(),
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        info!("Writing {:?} to simulated {}", command, self.name);
        if let Some((key, value)) = command.trim().split_once(char::is_whitespace) {
            self.settings.insert(key.to_string(), value.trim().to_string());
        }
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        info!("Querying {:?} from simulated {}", command, self.name);
        Ok(self
            .settings
            .get(command.trim())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ANSWER.into()))
    }
}
