//! Append-only measurement logs in CSV or JSON

use std::{
    fmt,
    fs::{ File, OpenOptions },
    io::{ Seek, SeekFrom, Write },
    path::{ Path, PathBuf },
    str::FromStr,
};
use log::debug;
use serde::Serialize;
use serde_json::{ Map, Value };
use crate::error::{ Error, Result };

pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFormat
{
    /// One row per sample under a header row
    Csv,
    /// A JSON array of objects, kept valid after every sample
    Json,
}

impl LogFormat
{
    pub fn extension(&self) -> &'static str
    {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.extension())
    }
}

impl FromStr for LogFormat
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(Error::parse("log format", s)),
        }
    }
}

/// A sample as it was written, with its timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Sample
{
    pub timestamp: String,
    pub value: Value,
}

/// Writes timestamped samples to `<base>.<csv|json>`
///
/// The file is truncated when the logger is created. Only the last sample is kept in memory.
pub struct DataLogger
{
    path: PathBuf,
    format: LogFormat,
    /// CSV columns after the timestamp
    columns: Vec<String>,
    last: Option<Sample>,
}

fn now() -> String
{
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn cell(value: &Value) -> String
{
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl DataLogger
{
    pub fn create(base: impl AsRef<Path>, format: LogFormat, columns: &[&str]) -> Result<Self>
    {
        let mut path = base.as_ref().as_os_str().to_owned();
        path.push(".");
        path.push(format.extension());

        let logger = Self {
            path: PathBuf::from(path),
            format: format,
            columns: columns.iter().map(|column| column.to_string()).collect(),
            last: None,
        };
        logger.init_file()?;
        debug!("Created {} log {}", format, logger.path.display());

        Ok(logger)
    }

    fn init_file(&self) -> Result<()>
    {
        let mut file = File::create(&self.path)?;

        match self.format {
            LogFormat::Json => file.write_all(b"[]")?,
            LogFormat::Csv => {
                let mut writer = csv::Writer::from_writer(file);
                writer.write_record(std::iter::once(TIMESTAMP_COLUMN).chain(self.columns.iter().map(String::as_str)))?;
                writer.flush()?;
            },
        }

        Ok(())
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn format(&self) -> LogFormat
    {
        self.format
    }

    pub fn last_sample(&self) -> Option<&Sample>
    {
        self.last.as_ref()
    }

    /// Appends one timestamped sample
    ///
    /// For CSV a sequence fills the columns in order, a map fills them by name and a single value
    /// goes to the last column. For JSON a map gets a `timestamp` key; anything else is stored as
    /// `{"timestamp": ..., "sample": ...}`.
    pub fn push<S>(&mut self, sample: &S) -> Result<()>
        where S: Serialize + ?Sized
    {
        let timestamp = now();
        let value = serde_json::to_value(sample)?;

        match self.format {
            LogFormat::Csv => self.write_csv(&timestamp, &value)?,
            LogFormat::Json => self.write_json(&timestamp, &value)?,
        }

        self.last = Some(Sample { timestamp: timestamp, value: value });
        Ok(())
    }

    fn write_csv(&self, timestamp: &str, value: &Value) -> Result<()>
    {
        let mut row = vec![String::new(); self.columns.len()];

        match value {
            Value::Array(items) => {
                if items.len() != self.columns.len() {
                    return Err(Error::parse("CSV row matching the header", value.to_string()));
                }
                for (slot, item) in row.iter_mut().zip(items) {
                    *slot = cell(item);
                }
            },
            Value::Object(fields) => {
                for (slot, column) in row.iter_mut().zip(&self.columns) {
                    if let Some(item) = fields.get(column) {
                        *slot = cell(item);
                    }
                }
            },
            scalar => match row.last_mut() {
                Some(slot) => *slot = cell(scalar),
                None => return Err(Error::parse("CSV row matching the header", value.to_string())),
            },
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(std::iter::once(timestamp.to_string()).chain(row))?;
        writer.flush()?;

        Ok(())
    }

    fn write_json(&self, timestamp: &str, value: &Value) -> Result<()>
    {
        let mut object = match value {
            Value::Object(fields) => fields.clone(),
            other => {
                let mut fields = Map::new();
                fields.insert("sample".into(), other.clone());
                fields
            },
        };
        object.insert(TIMESTAMP_COLUMN.into(), Value::String(timestamp.into()));
        let text = serde_json::to_string_pretty(&Value::Object(object))?;

        // overwrite the closing bracket, then close the array again
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        let end = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(end.saturating_sub(1)))?;

        if self.last.is_none() {
            write!(file, "{}]", text)?;
        }
        else {
            write!(file, ",\n{}]", text)?;
        }

        Ok(())
    }
}
