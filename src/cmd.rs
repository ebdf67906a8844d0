//! SFU command definition, parsing, and serialization

use std::{ fmt, str::FromStr };
use crate::{
    error::{ Error, Result },
    mode::{ BroadcastStandard, CodeRate, Constellation },
};

/// What the noise generator adds to the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseState
{
    /// Signal only
    Off,
    /// Signal plus AWGN at the configured C/N
    Add,
    /// Noise without the signal
    Only,
}

impl fmt::Display for NoiseState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            Self::Off => "OFF",
            Self::Add => "ADD",
            Self::Only => "ONLY",
        })
    }
}

impl FromStr for NoiseState
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim() {
            "OFF" | "0" => Ok(Self::Off),
            "ADD" => Ok(Self::Add),
            "ONLY" => Ok(Self::Only),
            other => Err(Error::parse("noise state", other)),
        }
    }
}

fn on_off(state: bool) -> &'static str
{
    if state { "ON" } else { "OFF" }
}

/// Reads `ON`/`OFF` or `1`/`0`, the two ways the SFU reports a boolean
pub(crate) fn parse_on_off(what: &'static str, response: &str) -> Result<bool>
{
    match response.trim() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        other => Err(Error::parse(what, other)),
    }
}

/// Transmission standard token of `SOUR:DM:TRAN:STAN`
///
/// The SFU names DIRECTV `DIR`, the same token it reports back and uses for the coder subsystem.
fn standard_token(standard: BroadcastStandard) -> &'static str
{
    match standard {
        BroadcastStandard::DvbS2 => "DVS2",
        BroadcastStandard::Dvbs => "DVBS",
        BroadcastStandard::DirecTv => "DIR",
    }
}

/// Coder subsystem of `SOUR:IQC:<subsystem>:RATE`
fn coder_subsystem(standard: BroadcastStandard) -> &'static str
{
    match standard {
        BroadcastStandard::DvbS2 => "DVBS2",
        BroadcastStandard::Dvbs => "DVBS",
        BroadcastStandard::DirecTv => "DIR",
    }
}

fn constellation_token(constellation: Constellation) -> &'static str
{
    match constellation {
        Constellation::Qpsk => "S4",
        Constellation::Psk8 => "S8",
    }
}

pub(crate) fn parse_constellation(response: &str) -> Result<Constellation>
{
    match response.trim() {
        "S4" => Ok(Constellation::Qpsk),
        "S8" => Ok(Constellation::Psk8),
        other => other.parse(),
    }
}

/// Settings written to an SFU
#[derive(Debug, Clone, PartialEq)]
pub enum SfuCmd
{
    /// Command: `SYST:DISP:UPD <ON|OFF>`
    DisplayUpdate(bool),
    /// Couple the noise bandwidth to the symbol rate
    ///
    /// Command: `SOUR:NOIS:COUP <ON|OFF>`
    NoiseCoupling(bool),
    /// Command: `SOUR:NOIS:AWGN <ON|OFF>`
    Awgn(bool),
    /// Switch the modulator to digital TV
    ///
    /// Command: `SOUR:DM:SOUR DTV`
    DigitalTvSource,
    /// Command: `SOUR:DM:TRAN:STAN <DVS2|DVBS|DIR>`
    TransmissionStandard(BroadcastStandard),
    /// Adaptive coding and modulation mode, DVB-S2 only
    ///
    /// Command: `SOUR:IQC:DVBS2:AMC DVS2`
    Dvbs2Acm,
    /// Transport stream source for the DVB-S2 coder
    ///
    /// Command: `SOUR:IQC:DVBS2:SOUR TEST`
    TestSignalSource,
    /// Command: `SOUR:IQC:DVBS2:FECF NORM`
    NormalFecFrame,
    /// Command: `SOUR:IQC:DVBS2:TSP S187`
    TestPacket187,
    /// Command: `SOUR:IQC:DVBS2:PRBS:SEQ P23_1`
    Prbs23,
    /// Command: `SOUR:FREQ:ACT:CENT <hz>`
    Frequency(f64),
    /// Command: `SOUR:IQC:DVBS2:SYMB:RATE <baud>`
    SymbolRate(f64),
    /// Roll-off in percent, sent as a fraction
    ///
    /// Command: `SOUR:IQC:DVBS2:ROLL <alpha>`
    RollOff(f64),
    /// Command: `SOUR:IQC:DVBS2:PIL <ON|OFF>`
    Pilots(bool),
    /// Command: `SOUR:IQC:DVBS2:CONS <S4|S8>`
    Constellation(Constellation),
    /// Code rate on the coder of the given standard
    ///
    /// Command: `SOUR:IQC:<DVBS2|DVBS|DIR>:RATE R<n>_<d>`
    CodeRate(BroadcastStandard, CodeRate),
    /// Enable the special settings that hold the scrambling sequence
    ///
    /// Command: `SOUR:IQC:DVBS2:SPEC:SETT:STAT ON`
    SpecialSettings,
    /// Command: `SOUR:IQC:DVBS2:SPEC:SCR:SEQ <code>`
    ScramblingCode(u32),
    /// Command: `SOUR:POW:LEV:IMM:AMPL <dbm>`
    Power(f64),
    /// Command: `SOUR:NOIS:CN <db>`
    CarrierToNoise(f64),
    /// Command: `SOUR:NOIS:STAT <OFF|ADD|ONLY>`
    Noise(NoiseState),
    /// Command: `SOUR:IQC:DVBS2:PHAS:SHAP 1`
    PhaseNoiseShape,
    /// Command: `SOUR:IQC:DVBS2:PHAS:MAGN 13`
    PhaseNoiseMagnitude,
    /// Command: `SOUR:IQC:DVBS2:PHAS:STAT <ON|OFF>`
    PhaseNoise(bool),
    /// Modulation on or off; off leaves an unmodulated carrier
    ///
    /// Command: `SOUR:MOD:STAT <ON|OFF>`
    Modulation(bool),
    /// Command: `OUTP:STAT <ON|OFF>`
    RfOutput(bool),
}

impl SfuCmd
{
    /// Commands that put a freshly connected SFU into DVB-S2 test signal generation
    pub fn init_sequence() -> Vec<SfuCmd>
    {
        vec![
            SfuCmd::DisplayUpdate(true),
            SfuCmd::NoiseCoupling(true),
            SfuCmd::Awgn(true),
            SfuCmd::DigitalTvSource,
            SfuCmd::TransmissionStandard(BroadcastStandard::DvbS2),
            SfuCmd::Dvbs2Acm,
            SfuCmd::TestSignalSource,
            SfuCmd::NormalFecFrame,
            SfuCmd::TestPacket187,
            SfuCmd::Prbs23,
        ]
    }
}

impl fmt::Display for SfuCmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SfuCmd::DisplayUpdate(state) => write!(f, "SYST:DISP:UPD {}", on_off(*state)),
            SfuCmd::NoiseCoupling(state) => write!(f, "SOUR:NOIS:COUP {}", on_off(*state)),
            SfuCmd::Awgn(state) => write!(f, "SOUR:NOIS:AWGN {}", on_off(*state)),
            SfuCmd::DigitalTvSource => write!(f, "SOUR:DM:SOUR DTV"),
            SfuCmd::TransmissionStandard(standard) => write!(f, "SOUR:DM:TRAN:STAN {}", standard_token(*standard)),
            SfuCmd::Dvbs2Acm => write!(f, "SOUR:IQC:DVBS2:AMC DVS2"),
            SfuCmd::TestSignalSource => write!(f, "SOUR:IQC:DVBS2:SOUR TEST"),
            SfuCmd::NormalFecFrame => write!(f, "SOUR:IQC:DVBS2:FECF NORM"),
            SfuCmd::TestPacket187 => write!(f, "SOUR:IQC:DVBS2:TSP S187"),
            SfuCmd::Prbs23 => write!(f, "SOUR:IQC:DVBS2:PRBS:SEQ P23_1"),
            SfuCmd::Frequency(hz) => write!(f, "SOUR:FREQ:ACT:CENT {}", hz),
            SfuCmd::SymbolRate(baud) => write!(f, "SOUR:IQC:DVBS2:SYMB:RATE {}", baud),
            SfuCmd::RollOff(percent) => write!(f, "SOUR:IQC:DVBS2:ROLL {:.6}", percent / 100.0),
            SfuCmd::Pilots(state) => write!(f, "SOUR:IQC:DVBS2:PIL {}", on_off(*state)),
            SfuCmd::Constellation(constellation) => {
                write!(f, "SOUR:IQC:DVBS2:CONS {}", constellation_token(*constellation))
            },
            SfuCmd::CodeRate(standard, rate) => write!(
                f,
                "SOUR:IQC:{}:RATE R{}_{}",
                coder_subsystem(*standard),
                rate.numerator(),
                rate.denominator()
            ),
            SfuCmd::SpecialSettings => write!(f, "SOUR:IQC:DVBS2:SPEC:SETT:STAT ON"),
            SfuCmd::ScramblingCode(code) => write!(f, "SOUR:IQC:DVBS2:SPEC:SCR:SEQ {}", code),
            SfuCmd::Power(dbm) => write!(f, "SOUR:POW:LEV:IMM:AMPL {}", dbm),
            SfuCmd::CarrierToNoise(db) => write!(f, "SOUR:NOIS:CN {:.6}", db),
            SfuCmd::Noise(state) => write!(f, "SOUR:NOIS:STAT {}", state),
            SfuCmd::PhaseNoiseShape => write!(f, "SOUR:IQC:DVBS2:PHAS:SHAP 1"),
            SfuCmd::PhaseNoiseMagnitude => write!(f, "SOUR:IQC:DVBS2:PHAS:MAGN 13"),
            SfuCmd::PhaseNoise(state) => write!(f, "SOUR:IQC:DVBS2:PHAS:STAT {}", on_off(*state)),
            SfuCmd::Modulation(state) => write!(f, "SOUR:MOD:STAT {}", on_off(*state)),
            SfuCmd::RfOutput(state) => write!(f, "OUTP:STAT {}", on_off(*state)),
        }
    }
}

/// Settings read back from an SFU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfuQuery
{
    Identity,
    Frequency,
    SymbolRate,
    RollOff,
    Pilots,
    Constellation,
    ScramblingCode,
    Power,
    CarrierToNoise,
    Noise,
    PhaseNoise,
    Modulation,
    RfOutput,
}

impl fmt::Display for SfuQuery
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            SfuQuery::Identity => "*IDN?",
            SfuQuery::Frequency => "SOUR:FREQ:ACT:CENT?",
            SfuQuery::SymbolRate => "SOUR:IQC:DVBS2:SYMB:RATE?",
            SfuQuery::RollOff => "SOUR:IQC:DVBS2:ROLL?",
            SfuQuery::Pilots => "SOUR:IQC:DVBS2:PIL?",
            SfuQuery::Constellation => "SOUR:IQC:DVBS2:CONS?",
            SfuQuery::ScramblingCode => "SOUR:IQC:DVBS2:SPEC:SCR:SEQ?",
            SfuQuery::Power => "SOUR:POW:LEV:IMM:AMPL?",
            SfuQuery::CarrierToNoise => "SOUR:NOIS:CN?",
            SfuQuery::Noise => "SOUR:NOIS:STAT?",
            SfuQuery::PhaseNoise => "SOUR:IQC:DVBS2:PHAS:STAT?",
            SfuQuery::Modulation => "SOUR:MOD:STAT?",
            SfuQuery::RfOutput => "OUTP:STAT?",
        })
    }
}
