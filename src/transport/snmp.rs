//! SNMP get/set through the net-snmp command line tools

use std::time::Duration;
use async_trait::async_trait;
use log::{ debug, info };
use tokio::process::Command;
use crate::{
    error::{ Error, Result },
    transport::Transport,
};

/// Community-based (v2c) SNMP access to one agent
///
/// A write takes `"<oid> <value>"`; a query takes an OID and returns the bare value. Agents often
/// apply a set asynchronously, so every write is followed by a settle delay.
pub struct SnmpTransport
{
    host: String,
    community: String,
    /// `snmpset` type character, `i` for INTEGER, `s` for STRING, ...
    value_type: char,
    settle: Duration,
    timeout: Duration,
    set_program: String,
    get_program: String,
}

impl SnmpTransport
{
    pub fn with(host: impl Into<String>, community: impl Into<String>, timeout: Duration) -> Self
    {
        Self {
            host: host.into(),
            community: community.into(),
            value_type: 'i',
            settle: Duration::from_secs(2),
            timeout: timeout,
            set_program: "snmpset".into(),
            get_program: "snmpget".into(),
        }
    }

    pub fn value_type(mut self, value_type: char) -> Self
    {
        self.value_type = value_type;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self
    {
        self.settle = settle;
        self
    }

    /// Use different binaries for `snmpset` and `snmpget`
    pub fn programs(mut self, set_program: impl Into<String>, get_program: impl Into<String>) -> Self
    {
        self.set_program = set_program.into();
        self.get_program = get_program.into();
        self
    }

    pub fn host(&self) -> &str
    {
        &self.host
    }

    fn set_command(&self, oid: &str, value: &str) -> Command
    {
        let mut command = Command::new(&self.set_program);
        command
            .arg("-v2c")
            .arg("-c").arg(&self.community)
            .arg(&self.host)
            .arg(oid)
            .arg(self.value_type.to_string())
            .arg(value)
            .kill_on_drop(true);
        command
    }

    fn get_command(&self, oid: &str) -> Command
    {
        let mut command = Command::new(&self.get_program);
        command
            .arg("-v2c")
            .arg("-c").arg(&self.community)
            .arg("-Oqv")
            .arg(&self.host)
            .arg(oid)
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: Command, description: &str) -> Result<String>
    {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Timeout { command: description.to_string(), timeout: self.timeout })??;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                program: program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Splits a write argument into OID and value
fn split_set(command: &str) -> Result<(&str, &str)>
{
    match command.trim().split_once(char::is_whitespace) {
        Some((oid, value)) if !value.trim().is_empty() => Ok((oid, value.trim())),
        _ => Err(Error::parse("SNMP set \"<oid> <value>\"", command)),
    }
}

/// Cleans a `-Oqv` value: trailing newline and the quotes around strings
fn parse_value(output: &str) -> String
{
    let value = output.trim();
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

#[async_trait]
impl Transport for SnmpTransport
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        let (oid, value) = split_set(command)?;
        self.run(self.set_command(oid, value), command).await?;
        info!("Set {} = {} on {}", oid, value, self.host);

        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        let oid = command.trim();
        let output = self.run(self.get_command(oid), oid).await?;
        let value = parse_value(&output);
        info!("Queried {} on {}", oid, self.host);
        debug!("query result = {:?}", value);

        Ok(value)
    }
}
