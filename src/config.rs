//! Bench configuration loaded from TOML
//!
//! ```toml
//! simulate = false
//! timeout_ms = 5000
//!
//! [poll]
//! interval_ms = 50
//! max_attempts = 600
//!
//! [instruments.sfu]
//! transport = "scpi"
//! link = { kind = "tcp", address = "10.0.0.4:5025" }
//!
//! [instruments.stb]
//! transport = "shell"
//! link = { kind = "tcp", address = "10.0.0.9:23" }
//! prompt = "root@jester"
//! ```

use std::{
    collections::BTreeMap,
    path::{ Path, PathBuf },
    time::Duration,
};
use serde::Deserialize;
use crate::{
    error::{ Error, Result },
    transport::PollPolicy,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config
{
    /// Replace every link with a simulated instrument
    pub simulate: bool,
    /// MODCOD specification table; the built-in table is used when unset
    pub spec_table: Option<PathBuf>,
    /// Response timeout for every instrument that does not set its own
    pub timeout_ms: u64,
    pub poll: PollConfig,
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            simulate: false,
            spec_table: None,
            timeout_ms: 5000,
            poll: PollConfig::default(),
            instruments: BTreeMap::new(),
        }
    }
}

/// Operation-complete poll bounds; 0 turns a bound off
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig
{
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub max_duration_ms: u64,
}

impl Default for PollConfig
{
    fn default() -> Self
    {
        Self {
            interval_ms: 50,
            max_attempts: 600,
            max_duration_ms: 300_000,
        }
    }
}

impl From<PollConfig> for PollPolicy
{
    fn from(config: PollConfig) -> Self
    {
        PollPolicy {
            max_attempts: Some(config.max_attempts).filter(|max| *max > 0),
            max_duration: Some(config.max_duration_ms)
                .filter(|max| *max > 0)
                .map(Duration::from_millis),
            interval: Duration::from_millis(config.interval_ms),
        }
    }
}

/// Where a line-oriented instrument is reached
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkConfig
{
    /// Raw socket or telnet port, `host:port`
    Tcp
    {
        address: String,
    },
    Serial
    {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Instrument behind a GPIB-over-Ethernet gateway
    Gpib
    {
        gateway: String,
        address: u8,
    },
    Simulated,
}

impl LinkConfig
{
    /// The registry key of this link
    pub fn key(&self) -> String
    {
        match self {
            LinkConfig::Tcp { address } => address.clone(),
            LinkConfig::Serial { path, .. } => path.clone(),
            LinkConfig::Gpib { gateway, address } => format!("{}/gpib{}", gateway, address),
            LinkConfig::Simulated => "simulated".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum InstrumentConfig
{
    Scpi
    {
        link: LinkConfig,
        #[serde(default = "default_terminator")]
        terminator: String,
        /// Poll `*OPC?` after every write
        #[serde(default = "default_true")]
        opc: bool,
        timeout_ms: Option<u64>,
    },
    Shell
    {
        link: LinkConfig,
        /// Text every prompt line contains, e.g. `root@jester`
        prompt: String,
        #[serde(default = "default_cwd")]
        cwd: String,
        #[serde(default = "default_terminal_width")]
        terminal_width: usize,
        timeout_ms: Option<u64>,
    },
    Ssh
    {
        host: String,
        user: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        /// Return stderr instead of stdout from queries
        #[serde(default)]
        stderr: bool,
        #[serde(default = "default_empty_retries")]
        empty_retries: u32,
        timeout_ms: Option<u64>,
    },
    Snmp
    {
        host: String,
        #[serde(default = "default_community")]
        community: String,
        #[serde(default = "default_value_type")]
        value_type: char,
        #[serde(default = "default_settle_ms")]
        settle_ms: u64,
        timeout_ms: Option<u64>,
    },
}

impl InstrumentConfig
{
    pub fn timeout_ms(&self) -> Option<u64>
    {
        match self {
            InstrumentConfig::Scpi { timeout_ms, .. }
            | InstrumentConfig::Shell { timeout_ms, .. }
            | InstrumentConfig::Ssh { timeout_ms, .. }
            | InstrumentConfig::Snmp { timeout_ms, .. } => *timeout_ms,
        }
    }

    pub fn transport_name(&self) -> &'static str
    {
        match self {
            InstrumentConfig::Scpi { .. } => "scpi",
            InstrumentConfig::Shell { .. } => "shell",
            InstrumentConfig::Ssh { .. } => "ssh",
            InstrumentConfig::Snmp { .. } => "snmp",
        }
    }
}

fn default_baud_rate() -> u32 { 9600 }
fn default_terminator() -> String { "\n".into() }
fn default_true() -> bool { true }
fn default_cwd() -> String { "~".into() }
fn default_terminal_width() -> usize { crate::transport::shell::DEFAULT_TERMINAL_WIDTH }
fn default_ssh_port() -> u16 { 22 }
fn default_empty_retries() -> u32 { 3 }
fn default_community() -> String { "private".into() }
fn default_value_type() -> char { 'i' }
fn default_settle_ms() -> u64 { 2000 }

impl Config
{
    pub fn from_toml_str(text: &str) -> Result<Self>
    {
        let config: Config = toml::from_str(text).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file; a relative `spec_table` path is taken relative to the file
    pub fn load(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))?;
        let mut config = Self::from_toml_str(&text)?;

        if let Some(table) = config.spec_table.as_mut() {
            if table.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                *table = base.join(&*table);
            }
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()>
    {
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".into()));
        }

        for (name, instrument) in &self.instruments {
            if instrument.timeout_ms() == Some(0) {
                return Err(Error::Config(format!("{}: timeout_ms must be positive", name)));
            }
            if let InstrumentConfig::Shell { prompt, .. } = instrument {
                if prompt.is_empty() {
                    return Err(Error::Config(format!("{}: prompt must not be empty", name)));
                }
            }
        }

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy
    {
        self.poll.into()
    }

    pub fn timeout(&self) -> Duration
    {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn instrument(&self, name: &str) -> Result<&InstrumentConfig>
    {
        self.instruments
            .get(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))
    }

    /// Response timeout for the named instrument
    pub fn timeout_for(&self, name: &str) -> Result<Duration>
    {
        Ok(self
            .instrument(name)?
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.timeout()))
    }
}
