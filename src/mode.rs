//! Broadcast standard / constellation / code rate triples

use std::{ fmt, str::FromStr };
use crate::{
    error::{ Error, Result },
    spec_table::SpecTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastStandard
{
    /// "DIRECTV", the legacy DSS transmission format
    DirecTv,
    /// "DVBS"
    Dvbs,
    /// "DVB-S2"
    DvbS2,
}

impl BroadcastStandard
{
    /// Whether a physical layer scrambling code exists for this standard
    ///
    /// Only DVB-S2 carries one. Devices reject scrambling code writes for the other standards.
    pub fn supports_scrambling(&self) -> bool
    {
        *self == Self::DvbS2
    }
}

impl fmt::Display for BroadcastStandard
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            Self::DirecTv => "DIRECTV",
            Self::Dvbs => "DVBS",
            Self::DvbS2 => "DVB-S2",
        })
    }
}

impl FromStr for BroadcastStandard
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim() {
            "DIRECTV" => Ok(Self::DirecTv),
            "DVBS" => Ok(Self::Dvbs),
            "DVB-S2" => Ok(Self::DvbS2),
            other => Err(Error::parse("broadcast standard", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constellation
{
    Qpsk,
    Psk8,
}

impl fmt::Display for Constellation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            Self::Qpsk => "QPSK",
            Self::Psk8 => "8PSK",
        })
    }
}

impl FromStr for Constellation
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim() {
            "QPSK" => Ok(Self::Qpsk),
            "8PSK" => Ok(Self::Psk8),
            other => Err(Error::parse("constellation", other)),
        }
    }
}

/// Inner FEC code rate, kept as the rational the tables and devices talk in
///
/// `3/4` and `6/8` are different code rates as far as any device is concerned, so the fraction is
/// not reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRate
{
    num: u8,
    den: u8,
}

impl CodeRate
{
    pub fn new(num: u8, den: u8) -> Result<Self>
    {
        if num == 0 || den == 0 || num >= den {
            return Err(Error::parse("code rate", format!("{}/{}", num, den)));
        }

        Ok(Self { num: num, den: den })
    }

    pub fn numerator(&self) -> u8
    {
        self.num
    }

    pub fn denominator(&self) -> u8
    {
        self.den
    }

    pub fn as_f64(&self) -> f64
    {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for CodeRate
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for CodeRate
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        let mut tokens = s.trim().split('/');
        let (num, den) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(num), Some(den), None) => (num, den),
            _ => return Err(Error::parse("code rate", s)),
        };
        let num = num.trim().parse::<u8>().map_err(|_| Error::parse("code rate", s))?;
        let den = den.trim().parse::<u8>().map_err(|_| Error::parse("code rate", s))?;

        Self::new(num, den)
    }
}

/// A MODCOD combination
///
/// Equality and hashing are structural: two modes built independently from the same triple are
/// interchangeable everywhere, including as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode
{
    standard: BroadcastStandard,
    constellation: Constellation,
    code_rate: CodeRate,
}

impl Mode
{
    pub fn new(standard: BroadcastStandard, constellation: Constellation, code_rate: CodeRate) -> Self
    {
        Self {
            standard: standard,
            constellation: constellation,
            code_rate: code_rate,
        }
    }

    /// Parse a mode from its canonical strings, e.g. `("DVB-S2", "8PSK", "3/4")`
    pub fn parse(standard: &str, constellation: &str, code_rate: &str) -> Result<Self>
    {
        Ok(Self::new(standard.parse()?, constellation.parse()?, code_rate.parse()?))
    }

    /// The mode stored in `table` under MODCOD index `index`
    pub fn from_index(table: &SpecTable, index: u32) -> Result<Self>
    {
        table.mode(index)
    }

    /// The MODCOD index of this mode in `table`, if any row describes it
    pub fn to_index(&self, table: &SpecTable) -> Option<u32>
    {
        table.index_of(self)
    }

    pub fn broadcast_standard(&self) -> BroadcastStandard
    {
        self.standard
    }

    pub fn constellation(&self) -> Constellation
    {
        self.constellation
    }

    pub fn code_rate(&self) -> CodeRate
    {
        self.code_rate
    }

    pub fn with_broadcast_standard(self, standard: BroadcastStandard) -> Self
    {
        Self { standard: standard, ..self }
    }

    pub fn with_constellation(self, constellation: Constellation) -> Self
    {
        Self { constellation: constellation, ..self }
    }

    pub fn with_code_rate(self, code_rate: CodeRate) -> Self
    {
        Self { code_rate: code_rate, ..self }
    }
}

impl Default for Mode
{
    /// MODCOD mode 1: DIRECTV, QPSK, 6/7
    fn default() -> Self
    {
        Self::new(BroadcastStandard::DirecTv, Constellation::Qpsk, CodeRate { num: 6, den: 7 })
    }
}

impl fmt::Display for Mode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {} {}", self.standard, self.constellation, self.code_rate)
    }
}
