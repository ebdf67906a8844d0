//! Everything a test script needs, opened from one configuration

use std::{ path::Path, sync::Arc, time::Duration };
use log::info;
use tokio::io::DuplexStream;
use crate::{
    config::{ Config, InstrumentConfig, LinkConfig },
    datalog::{ DataLogger, LogFormat },
    devices::Sfu,
    error::{ Error, Result },
    registry::{ Registry, Shared },
    sim::{ self, SimulatedTransport },
    spec_table::SpecTable,
    transport::{
        CommandSet, LineChannel, Link, OutputStream, ScpiTransport, ShellTransport, SnmpTransport,
        SshTransport, Transport, GPIB_READ_REQUEST,
    },
};

pub type SharedScpi = Shared<ScpiTransport<Link>>;
pub type SharedShell = Shared<ShellTransport<Link>>;
/// Transports that run external programs, or their simulated stand-in
pub type SharedRemote = Shared<Box<dyn Transport>>;

/// Owns the configuration, the MODCOD table and every open connection
///
/// Instruments are opened lazily by name. Asking twice for an instrument, or for two instruments
/// configured at the same address, returns the same connection.
pub struct Context
{
    config: Config,
    spec_table: Arc<SpecTable>,
    scpi: Registry<ScpiTransport<Link>>,
    shells: Registry<ShellTransport<Link>>,
    remotes: Registry<Box<dyn Transport>>,
    loggers: Registry<DataLogger>,
}

async fn open_link<F>(link: &LinkConfig, timeout: Duration, simulate: bool, spawn: F) -> Result<Link>
    where F: FnOnce() -> DuplexStream
{
    if simulate {
        return Ok(Link::simulated(spawn()));
    }

    match link {
        LinkConfig::Tcp { address } => Link::tcp(address, timeout).await,
        LinkConfig::Serial { path, baud_rate } => Link::serial(path, *baud_rate),
        LinkConfig::Gpib { gateway, address } => Link::gpib(gateway, *address, timeout).await,
        LinkConfig::Simulated => Ok(Link::simulated(spawn())),
    }
}

fn wrong_transport(name: &str, instrument: &InstrumentConfig, wanted: &str) -> Error
{
    Error::Config(format!(
        "{} is configured as a {} instrument, not {}",
        name,
        instrument.transport_name(),
        wanted
    ))
}

impl Context
{
    pub fn new(config: Config) -> Result<Self>
    {
        let spec_table = match &config.spec_table {
            Some(path) => SpecTable::from_path(path)?,
            None => SpecTable::builtin()?,
        };
        info!("Loaded {} MODCOD modes", spec_table.len());

        if config.simulate {
            info!("In simulation mode, instruments will return fake values");
        }

        Ok(Self {
            config: config,
            spec_table: Arc::new(spec_table),
            scpi: Registry::new(),
            shells: Registry::new(),
            remotes: Registry::new(),
            loggers: Registry::new(),
        })
    }

    pub fn config(&self) -> &Config
    {
        &self.config
    }

    pub fn spec_table(&self) -> Arc<SpecTable>
    {
        self.spec_table.clone()
    }

    fn simulated(&self, link: &LinkConfig) -> bool
    {
        self.config.simulate || *link == LinkConfig::Simulated
    }

    /// Opens the named SCPI instrument
    pub async fn scpi(&self, name: &str) -> Result<SharedScpi>
    {
        let instrument = self.config.instrument(name)?;
        let (link, terminator, opc) = match instrument {
            InstrumentConfig::Scpi { link, terminator, opc, .. } => (link, terminator, *opc),
            other => return Err(wrong_transport(name, other, "scpi")),
        };
        let timeout = self.config.timeout_for(name)?;
        let policy = self.config.poll_policy();
        let simulate = self.simulated(link);
        let key = if simulate { format!("simulated/{}", name) } else { link.key() };

        self.scpi
            .get_or_open(&key, || async move {
                let identity = format!("Simulated,{},0,1.0", name);
                let io = open_link(link, timeout, simulate, || sim::spawn_scpi(&identity)).await?;

                let mut channel = LineChannel::with(io, terminator.as_str(), timeout);
                if !simulate && matches!(link, LinkConfig::Gpib { .. }) {
                    channel = channel.with_read_request(GPIB_READ_REQUEST);
                }
                let commands = if opc { CommandSet::Scpi } else { CommandSet::Raw };

                Ok(ScpiTransport::with(channel, commands, policy))
            })
            .await
    }

    /// Opens the named SCPI instrument as an SFU
    pub async fn sfu(&self, name: &str) -> Result<Sfu<SharedScpi>>
    {
        Ok(Sfu::with(self.scpi(name).await?))
    }

    /// Opens the named shell session
    pub async fn shell(&self, name: &str) -> Result<SharedShell>
    {
        let instrument = self.config.instrument(name)?;
        let (link, prompt, cwd, width) = match instrument {
            InstrumentConfig::Shell { link, prompt, cwd, terminal_width, .. } => (link, prompt, cwd, *terminal_width),
            other => return Err(wrong_transport(name, other, "shell")),
        };
        let timeout = self.config.timeout_for(name)?;
        let simulate = self.simulated(link);
        let key = if simulate { format!("simulated/{}", name) } else { link.key() };

        self.shells
            .get_or_open(&key, || async move {
                let io = open_link(link, timeout, simulate, || sim::spawn_shell(prompt, cwd)).await?;
                let channel = LineChannel::with(io, "\n", timeout);

                Ok(ShellTransport::with(channel, prompt.as_str(), cwd).with_terminal_width(width))
            })
            .await
    }

    /// Opens the named ssh host
    pub async fn ssh(&self, name: &str) -> Result<SharedRemote>
    {
        let instrument = self.config.instrument(name)?;
        let (host, user, port, stderr, retries) = match instrument {
            InstrumentConfig::Ssh { host, user, port, stderr, empty_retries, .. } => {
                (host, user, *port, *stderr, *empty_retries)
            },
            other => return Err(wrong_transport(name, other, "ssh")),
        };
        let timeout = self.config.timeout_for(name)?;
        let simulate = self.config.simulate;
        let key = format!("ssh://{}@{}:{}", user, host, port);

        self.remotes
            .get_or_open(&key, || async move {
                let transport: Box<dyn Transport> = if simulate {
                    Box::new(SimulatedTransport::new(format!("ssh {}@{}", user, host)))
                }
                else {
                    let stream = if stderr { OutputStream::Stderr } else { OutputStream::Stdout };
                    Box::new(
                        SshTransport::with(host, user, timeout)
                            .port(port)
                            .stream(stream)
                            .empty_retries(retries),
                    )
                };
                Ok(transport)
            })
            .await
    }

    /// Opens the named SNMP agent
    pub async fn snmp(&self, name: &str) -> Result<SharedRemote>
    {
        let instrument = self.config.instrument(name)?;
        let (host, community, value_type, settle_ms) = match instrument {
            InstrumentConfig::Snmp { host, community, value_type, settle_ms, .. } => {
                (host, community, *value_type, *settle_ms)
            },
            other => return Err(wrong_transport(name, other, "snmp")),
        };
        let timeout = self.config.timeout_for(name)?;
        let simulate = self.config.simulate;
        let key = format!("snmp://{}@{}", community, host);

        self.remotes
            .get_or_open(&key, || async move {
                let transport: Box<dyn Transport> = if simulate {
                    Box::new(SimulatedTransport::new(format!("snmp agent {}", host)))
                }
                else {
                    Box::new(
                        SnmpTransport::with(host.as_str(), community.as_str(), timeout)
                            .value_type(value_type)
                            .settle(Duration::from_millis(settle_ms)),
                    )
                };
                Ok(transport)
            })
            .await
    }

    /// The data logger writing to `<base>.<format>`, created on first use
    ///
    /// Later calls for the same file return the existing logger and ignore `columns`.
    pub async fn data_logger(&self, base: impl AsRef<Path>, format: LogFormat, columns: &[&str]) -> Result<Shared<DataLogger>>
    {
        let base = base.as_ref();
        let key = format!("{}.{}", base.display(), format.extension());

        self.loggers
            .get_or_open(&key, || async move { DataLogger::create(base, format, columns) })
            .await
    }

    /// Opens the named instrument whatever its transport
    pub async fn transport(&self, name: &str) -> Result<Box<dyn Transport>>
    {
        let transport: Box<dyn Transport> = match self.config.instrument(name)? {
            InstrumentConfig::Scpi { .. } => Box::new(self.scpi(name).await?),
            InstrumentConfig::Shell { .. } => Box::new(self.shell(name).await?),
            InstrumentConfig::Ssh { .. } => Box::new(self.ssh(name).await?),
            InstrumentConfig::Snmp { .. } => Box::new(self.snmp(name).await?),
        };

        Ok(transport)
    }
}

#[cfg(test)]
mod tests
{
    use super::Context;
    use crate::{ config::Config, datalog::LogFormat, error::Error, transport::Transport };
    use std::sync::Arc;

    fn bench() -> Context
    {
        let config = Config::from_toml_str(
            r#"
            simulate = true

            [instruments.sfu]
            transport = "scpi"
            link = { kind = "tcp", address = "10.0.0.4:5025" }

            [instruments.sfu_alias]
            transport = "scpi"
            link = { kind = "tcp", address = "10.0.0.4:5025" }

            [instruments.modem]
            transport = "snmp"
            host = "10.0.0.7"
            "#,
        )
        .unwrap();

        Context::new(config).unwrap()
    }

    #[tokio::test]
    async fn instruments_open_once()
    {
        let context = bench();

        let first = context.scpi("sfu").await.unwrap();
        let second = context.scpi("sfu").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // simulated instruments are never shared between names
        let alias = context.scpi("sfu_alias").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &alias));
    }

    #[tokio::test]
    async fn lookups_check_name_and_kind()
    {
        let context = bench();

        assert!(matches!(context.scpi("bert").await, Err(Error::UnknownInstrument(_))));
        assert!(matches!(context.shell("sfu").await, Err(Error::Config(_))));
        assert!(matches!(context.snmp("sfu").await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn any_instrument_by_name()
    {
        let context = bench();

        let mut modem = context.transport("modem").await.unwrap();
        modem.write("1.3.6.1.4.1.9.1 3").await.unwrap();
        assert_eq!(modem.query("1.3.6.1.4.1.9.1").await.unwrap(), "3");

        let mut sfu = context.transport("sfu").await.unwrap();
        assert_eq!(sfu.query("*IDN?").await.unwrap(), "Simulated,sfu,0,1.0");
    }

    #[tokio::test]
    async fn loggers_are_shared_by_file()
    {
        let context = bench();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ber");

        let first = context.data_logger(&base, LogFormat::Csv, &["ber"]).await.unwrap();
        first.lock().await.push(&1e-6).unwrap();

        let second = context.data_logger(&base, LogFormat::Csv, &["ber"]).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.lock().await.last_sample().is_some());

        let json = context.data_logger(&base, LogFormat::Json, &[]).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &json));
    }

    #[test]
    fn builtin_table_is_loaded()
    {
        let context = bench();
        assert!(context.spec_table().mode(4).is_ok());
    }
}
