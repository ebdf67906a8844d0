//! MODCOD specification table
//!
//! The table maps a sparse MODCOD index to the broadcast standard, constellation and inner code
//! rate of that mode, along with the performance figures used to judge a link (symbol rate
//! limits, BER for quasi-error-free operation and the C/N needed to reach it).
//!
//! A table is loaded once, checked, and then shared read-only (typically behind an `Arc` owned by
//! [`Context`](crate::Context)). The reverse map from [`Mode`] to index is built at load time from
//! the same rows, so the two directions can never disagree.

use std::{
    collections::{ BTreeMap, HashMap },
    io,
    path::Path,
};
use log::{ debug, info };
use serde::Deserialize;
use crate::{
    error::{ Error, Result },
    mode::Mode,
};

const BUILTIN_TABLE: &str = include_str!("../data/modcod_spec.csv");

/// Raw row as it appears in the CSV file
///
/// Only the first four columns are required. Empty cells deserialize to `None` and unknown
/// columns are ignored.
#[derive(Debug, Deserialize)]
struct SpecRow
{
    #[serde(rename = "Mode #")]
    index: u32,
    #[serde(rename = "Broadcast Standard")]
    standard: String,
    #[serde(rename = "Modulation")]
    modulation: String,
    #[serde(rename = "Inner Code Rate")]
    code_rate: String,
    #[serde(rename = "Code", default)]
    code: Option<String>,
    #[serde(rename = "Min Symbol Rate", default)]
    min_symbol_rate: Option<f64>,
    #[serde(rename = "Typical Symbol Rate", default)]
    typical_symbol_rate: Option<f64>,
    #[serde(rename = "Max Symbol Rate", default)]
    max_symbol_rate: Option<f64>,
    #[serde(rename = "QEF", default)]
    qef: Option<f64>,
    #[serde(rename = "C/N for QEF Code Only", default)]
    cnr_threshold: Option<f64>,
}

/// Everything the table says about one MODCOD mode
#[derive(Debug, Clone, PartialEq)]
pub struct ModcodSpec
{
    pub index: u32,
    pub mode: Mode,
    /// Outer/inner coding scheme, e.g. "LDPC/BCH"
    pub code: Option<String>,
    /// Baud
    pub min_symbol_rate: Option<f64>,
    /// Baud
    pub typical_symbol_rate: Option<f64>,
    /// Baud
    pub max_symbol_rate: Option<f64>,
    /// Bit error rate regarded as quasi-error-free
    pub qef: Option<f64>,
    /// C/N in dB at which the code alone reaches QEF
    pub cnr_threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SpecTable
{
    rows: BTreeMap<u32, ModcodSpec>,
    reverse: HashMap<Mode, u32>,
}

impl SpecTable
{
    /// The table shipped with this crate
    pub fn builtin() -> Result<Self>
    {
        Self::from_reader(BUILTIN_TABLE.as_bytes())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|err| Error::SpecTable(format!("cannot open {}: {}", path.display(), err)))?;
        let table = Self::from_reader(file)?;
        info!("Loaded {} MODCOD modes from {}", table.len(), path.display());

        Ok(table)
    }

    /// Parse a table from CSV with a header row
    ///
    /// Fails if any row is malformed, if an index appears twice, or if two indices describe the
    /// same mode. The last case would make [`index_of`](Self::index_of) ambiguous.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self>
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rows = BTreeMap::new();
        let mut reverse = HashMap::new();

        for (line, record) in csv_reader.deserialize::<SpecRow>().enumerate() {
            let row = record.map_err(|err| Error::SpecTable(format!("row {}: {}", line + 1, err)))?;
            let mode = Mode::parse(&row.standard, &row.modulation, &row.code_rate)
                .map_err(|err| Error::SpecTable(format!("mode {}: {}", row.index, err)))?;

            if let Some(existing) = reverse.insert(mode, row.index) {
                return Err(Error::SpecTable(format!(
                    "modes {} and {} both describe {}",
                    existing,
                    row.index,
                    mode
                )));
            }

            let spec = ModcodSpec {
                index: row.index,
                mode: mode,
                code: row.code.filter(|code| !code.is_empty()),
                min_symbol_rate: row.min_symbol_rate,
                typical_symbol_rate: row.typical_symbol_rate,
                max_symbol_rate: row.max_symbol_rate,
                qef: row.qef,
                cnr_threshold: row.cnr_threshold,
            };

            if rows.insert(row.index, spec).is_some() {
                return Err(Error::SpecTable(format!("mode {} appears more than once", row.index)));
            }
            debug!("MODCOD mode {}: {}", row.index, mode);
        }

        if rows.is_empty() {
            return Err(Error::SpecTable("table has no rows".into()));
        }

        Ok(Self {
            rows: rows,
            reverse: reverse,
        })
    }

    pub fn spec(&self, index: u32) -> Result<&ModcodSpec>
    {
        self.rows.get(&index).ok_or(Error::UnknownIndex(index))
    }

    pub fn mode(&self, index: u32) -> Result<Mode>
    {
        Ok(self.spec(index)?.mode)
    }

    pub fn index_of(&self, mode: &Mode) -> Option<u32>
    {
        self.reverse.get(mode).copied()
    }

    /// MODCOD indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_
    {
        self.rows.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModcodSpec> + '_
    {
        self.rows.values()
    }

    pub fn len(&self) -> usize
    {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.rows.is_empty()
    }

    pub fn qef_point(&self, index: u32) -> Result<Option<f64>>
    {
        Ok(self.spec(index)?.qef)
    }

    pub fn cnr_threshold(&self, index: u32) -> Result<Option<f64>>
    {
        Ok(self.spec(index)?.cnr_threshold)
    }

    /// `(min, max)` symbol rate in Baud, when the table gives both
    pub fn symbol_rate_bounds(&self, index: u32) -> Result<Option<(f64, f64)>>
    {
        let spec = self.spec(index)?;
        Ok(spec.min_symbol_rate.zip(spec.max_symbol_rate))
    }
}
