//! Rohde & Schwarz SFU broadcast test system

use async_trait::async_trait;
use log::{ debug, info, warn };
use crate::{
    cmd::{ parse_constellation, parse_on_off, NoiseState, SfuCmd, SfuQuery },
    devices::{ ModeConfigurable, TransponderConfigurable },
    error::{ Error, Result },
    mode::{ BroadcastStandard, CodeRate, Constellation, Mode },
    transponder::Transponder,
    transport::Transport,
};

/// Handle to an SFU
///
/// Every setting is validated against a cached [`Transponder`] before anything is sent, so an
/// out-of-range value never reaches the instrument. The SFU's readback of the broadcast standard
/// and code rate differs between firmware versions, so those two are always answered from the
/// cache; everything else is read from the instrument and refreshes the cache when it is a valid
/// setting. A reading such as a zero frequency after `*RST` is still returned as reported.
pub struct Sfu<T>
{
    transport: T,
    state: Transponder,
}

/// Readbacks are returned as the instrument reports them; only valid ones refresh the cache
fn keep_reading(cached: Result<()>)
{
    if let Err(err) = cached {
        warn!("Reading not cached: {}", err);
    }
}

fn parse_f64(what: &'static str, response: &str) -> Result<f64>
{
    response.trim().parse::<f64>().map_err(|_| Error::parse(what, response))
}

impl <T> Sfu<T>
    where T: Transport
{
    /// Wraps a transport to an SFU; the cache starts at the default transponder
    pub fn with(transport: T) -> Self
    {
        Self {
            transport: transport,
            state: Transponder::default(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T
    {
        &mut self.transport
    }

    pub fn into_inner(self) -> T
    {
        self.transport
    }

    /// The parameters as last set or read
    pub fn cached(&self) -> &Transponder
    {
        &self.state
    }

    async fn send(&mut self, cmd: SfuCmd) -> Result<()>
    {
        self.transport.write(&cmd.to_string()).await
    }

    async fn ask(&mut self, query: SfuQuery) -> Result<String>
    {
        self.transport.query(&query.to_string()).await
    }

    pub async fn identify(&mut self) -> Result<String>
    {
        self.ask(SfuQuery::Identity).await
    }

    /// Puts the SFU into DVB-S2 test signal generation
    pub async fn configure(&mut self) -> Result<()>
    {
        info!("SFU device ID: {}", self.identify().await?);

        for cmd in SfuCmd::init_sequence() {
            self.send(cmd).await?;
        }
        self.state.set_broadcast_standard(BroadcastStandard::DvbS2);

        Ok(())
    }

    pub async fn set_broadcast_standard(&mut self, standard: BroadcastStandard) -> Result<()>
    {
        self.send(SfuCmd::DigitalTvSource).await?;
        self.send(SfuCmd::TransmissionStandard(standard)).await?;
        if standard == BroadcastStandard::DvbS2 {
            self.send(SfuCmd::Dvbs2Acm).await?;
        }
        self.state.set_broadcast_standard(standard);
        info!("Set broadcast standard: {}", standard);

        Ok(())
    }

    pub fn broadcast_standard(&self) -> BroadcastStandard
    {
        self.state.broadcast_standard()
    }

    pub async fn set_constellation(&mut self, constellation: Constellation) -> Result<()>
    {
        self.send(SfuCmd::Constellation(constellation)).await?;
        self.state.set_constellation(constellation);
        info!("Set constellation: {}", constellation);

        Ok(())
    }

    pub async fn constellation(&mut self) -> Result<Constellation>
    {
        let constellation = parse_constellation(&self.ask(SfuQuery::Constellation).await?)?;
        self.state.set_constellation(constellation);
        info!("Got constellation: {}", constellation);

        Ok(constellation)
    }

    /// Sets the code rate on the coder of the current standard and on the DVB-S2 coder
    ///
    /// Depending on the unit, one or the other is the coder actually in use.
    pub async fn set_code_rate(&mut self, code_rate: CodeRate) -> Result<()>
    {
        let standard = self.state.broadcast_standard();
        self.send(SfuCmd::CodeRate(standard, code_rate)).await?;
        if standard != BroadcastStandard::DvbS2 {
            self.send(SfuCmd::CodeRate(BroadcastStandard::DvbS2, code_rate)).await?;
        }
        self.state.set_code_rate(code_rate);
        info!("Set code rate: {}", code_rate);

        Ok(())
    }

    pub fn code_rate(&self) -> CodeRate
    {
        self.state.code_rate()
    }

    /// RF level in dBm
    pub async fn set_power(&mut self, dbm: f64) -> Result<()>
    {
        if !dbm.is_finite() {
            return Err(Error::OutOfRange { what: "power", value: dbm, min: f64::MIN, max: f64::MAX });
        }
        self.send(SfuCmd::Power(dbm)).await?;
        info!("Set power: {} dBm", dbm);

        Ok(())
    }

    pub async fn power(&mut self) -> Result<f64>
    {
        let dbm = parse_f64("power", &self.ask(SfuQuery::Power).await?)?;
        info!("Got power: {} dBm", dbm);
        Ok(dbm)
    }

    /// Carrier to noise ratio in dB
    pub async fn set_carrier_to_noise(&mut self, db: f64) -> Result<()>
    {
        if !db.is_finite() {
            return Err(Error::OutOfRange { what: "C/N", value: db, min: f64::MIN, max: f64::MAX });
        }
        self.send(SfuCmd::CarrierToNoise(db)).await?;
        info!("Set CNR: {} dB", db);

        Ok(())
    }

    pub async fn carrier_to_noise(&mut self) -> Result<f64>
    {
        let db = parse_f64("C/N", &self.ask(SfuQuery::CarrierToNoise).await?)?;
        info!("Got CNR: {} dB", db);
        Ok(db)
    }

    pub async fn set_noise(&mut self, state: NoiseState) -> Result<()>
    {
        self.send(SfuCmd::Noise(state)).await?;
        info!("Set noise: {}", state);
        Ok(())
    }

    pub async fn noise(&mut self) -> Result<NoiseState>
    {
        self.ask(SfuQuery::Noise).await?.parse()
    }

    pub async fn set_phase_noise(&mut self, enabled: bool) -> Result<()>
    {
        self.send(SfuCmd::PhaseNoiseShape).await?;
        self.send(SfuCmd::PhaseNoiseMagnitude).await?;
        self.send(SfuCmd::PhaseNoise(enabled)).await?;
        info!("Set phase noise enabled: {}", enabled);

        Ok(())
    }

    pub async fn phase_noise(&mut self) -> Result<bool>
    {
        parse_on_off("phase noise state", &self.ask(SfuQuery::PhaseNoise).await?)
    }

    /// Unmodulated carrier when `true`
    pub async fn set_carrier_wave(&mut self, cw: bool) -> Result<()>
    {
        self.send(SfuCmd::Modulation(!cw)).await?;
        info!("Set carrier wave enabled: {}", cw);
        Ok(())
    }

    pub async fn carrier_wave(&mut self) -> Result<bool>
    {
        Ok(!parse_on_off("modulation state", &self.ask(SfuQuery::Modulation).await?)?)
    }

    pub async fn set_rf_output(&mut self, enabled: bool) -> Result<()>
    {
        self.send(SfuCmd::RfOutput(enabled)).await?;
        info!("Set RF output enabled: {}", enabled);
        Ok(())
    }

    pub async fn rf_output(&mut self) -> Result<bool>
    {
        parse_on_off("RF output state", &self.ask(SfuQuery::RfOutput).await?)
    }
}

#[async_trait]
impl <T> ModeConfigurable for Sfu<T>
    where T: Transport
{
    async fn set_mode(&mut self, mode: Mode) -> Result<()>
    {
        self.set_broadcast_standard(mode.broadcast_standard()).await?;
        self.set_constellation(mode.constellation()).await?;
        self.set_code_rate(mode.code_rate()).await?;
        debug!("Set mode: {}", mode);

        Ok(())
    }

    async fn mode(&mut self) -> Result<Mode>
    {
        let constellation = self.constellation().await?;
        Ok(Mode::new(self.broadcast_standard(), constellation, self.code_rate()))
    }
}

#[async_trait]
impl <T> TransponderConfigurable for Sfu<T>
    where T: Transport
{
    async fn set_frequency(&mut self, frequency: f64) -> Result<()>
    {
        let mut next = self.state.clone();
        next.set_frequency(frequency)?;
        self.send(SfuCmd::Frequency(frequency)).await?;
        self.state = next;
        info!("Set frequency: {} MHz", frequency / 1e6);

        Ok(())
    }

    async fn frequency(&mut self) -> Result<f64>
    {
        let frequency = parse_f64("frequency", &self.ask(SfuQuery::Frequency).await?)?;
        let cached = self.state.set_frequency(frequency);
        keep_reading(cached);
        info!("Got frequency: {} MHz", frequency / 1e6);

        Ok(frequency)
    }

    async fn set_symbol_rate(&mut self, symbol_rate: f64) -> Result<()>
    {
        let mut next = self.state.clone();
        next.set_symbol_rate(symbol_rate)?;
        self.send(SfuCmd::SymbolRate(symbol_rate)).await?;
        self.state = next;
        info!("Set symbol rate: {} MBaud", symbol_rate / 1e6);

        Ok(())
    }

    async fn symbol_rate(&mut self) -> Result<f64>
    {
        let symbol_rate = parse_f64("symbol rate", &self.ask(SfuQuery::SymbolRate).await?)?;
        let cached = self.state.set_symbol_rate(symbol_rate);
        keep_reading(cached);
        info!("Got symbol rate: {} MBaud", symbol_rate / 1e6);

        Ok(symbol_rate)
    }

    async fn set_roll_off(&mut self, roll_off: f64) -> Result<()>
    {
        let mut next = self.state.clone();
        next.set_roll_off(roll_off)?;
        self.send(SfuCmd::RollOff(roll_off)).await?;
        self.state = next;
        info!("Set roll-off factor: {}%", roll_off);

        Ok(())
    }

    /// The SFU reports alpha as a fraction; the percentage is rounded to undo float noise
    async fn roll_off(&mut self) -> Result<f64>
    {
        let alpha = parse_f64("roll-off", &self.ask(SfuQuery::RollOff).await?)?;
        let roll_off = (alpha * 100.0 * 1e6).round() / 1e6;
        let cached = self.state.set_roll_off(roll_off);
        keep_reading(cached);
        info!("Got roll-off factor: {}%", roll_off);

        Ok(roll_off)
    }

    async fn set_scrambling_code(&mut self, code: u32) -> Result<()>
    {
        let mut next = self.state.clone();
        next.set_scrambling_code(code)?;
        self.send(SfuCmd::SpecialSettings).await?;
        self.send(SfuCmd::ScramblingCode(code)).await?;
        self.state = next;
        info!("Set scrambling code: {}", code);

        Ok(())
    }

    async fn scrambling_code(&mut self) -> Result<u32>
    {
        let response = self.ask(SfuQuery::ScramblingCode).await?;
        let code = response
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::parse("scrambling code", response.as_str()))?;
        let cached = self.state.set_scrambling_code(code);
        keep_reading(cached);
        info!("Got scrambling code: {}", code);

        Ok(code)
    }

    async fn set_pilots(&mut self, pilots: bool) -> Result<()>
    {
        self.send(SfuCmd::Pilots(pilots)).await?;
        self.state.set_pilots(pilots);
        info!("Set pilot symbols enabled: {}", pilots);

        Ok(())
    }

    async fn pilots(&mut self) -> Result<bool>
    {
        let pilots = parse_on_off("pilots", &self.ask(SfuQuery::Pilots).await?)?;
        self.state.set_pilots(pilots);
        info!("Got pilot symbols enabled: {}", pilots);

        Ok(pilots)
    }
}

#[cfg(test)]
mod tests
{
    use super::Sfu;
    use crate::{
        cmd::NoiseState,
        devices::{ ModeConfigurable, TransponderConfigurable },
        error::{ Error, Result },
        mode::{ BroadcastStandard, CodeRate, Constellation, Mode },
        transport::Transport,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Records writes and answers queries from a fixed table
    #[derive(Default)]
    struct Recorder
    {
        written: Vec<String>,
        answers: HashMap<String, String>,
    }

    #[async_trait]
    impl Transport for Recorder
    {
        async fn write(&mut self, command: &str) -> Result<()>
        {
            self.written.push(command.to_string());
            Ok(())
        }

        async fn query(&mut self, command: &str) -> Result<String>
        {
            Ok(self.answers.get(command).cloned().unwrap_or_else(|| "0".into()))
        }
    }

    #[tokio::test]
    async fn scrambling_code_needs_dvbs2()
    {
        let mut sfu = Sfu::with(Recorder::default());

        // the default mode is DIRECTV
        assert!(matches!(sfu.set_scrambling_code(5).await, Err(Error::UnsupportedOperation(_))));
        assert!(sfu.transport_mut().written.is_empty());

        sfu.set_broadcast_standard(BroadcastStandard::DvbS2).await.unwrap();
        sfu.set_scrambling_code(5).await.unwrap();
        assert_eq!(sfu.cached().scrambling_code(), 5);
        assert_eq!(
            sfu.transport_mut().written[3..],
            ["SOUR:IQC:DVBS2:SPEC:SETT:STAT ON", "SOUR:IQC:DVBS2:SPEC:SCR:SEQ 5"]
        );
    }

    #[tokio::test]
    async fn invalid_values_are_never_sent()
    {
        let mut sfu = Sfu::with(Recorder::default());

        assert!(matches!(sfu.set_roll_off(120.0).await, Err(Error::OutOfRange { .. })));
        assert!(matches!(sfu.set_symbol_rate(-1.0).await, Err(Error::OutOfRange { .. })));
        assert!(sfu.set_power(f64::NAN).await.is_err());
        assert!(sfu.transport_mut().written.is_empty());
        assert_eq!(sfu.cached().roll_off(), 20.0);
    }

    #[tokio::test]
    async fn code_rate_goes_to_both_coders_outside_dvbs2()
    {
        let mut sfu = Sfu::with(Recorder::default());
        let mode = Mode::new(BroadcastStandard::Dvbs, Constellation::Qpsk, CodeRate::new(7, 8).unwrap());

        sfu.set_mode(mode).await.unwrap();
        assert_eq!(
            sfu.transport_mut().written,
            [
                "SOUR:DM:SOUR DTV",
                "SOUR:DM:TRAN:STAN DVBS",
                "SOUR:IQC:DVBS2:CONS S4",
                "SOUR:IQC:DVBS:RATE R7_8",
                "SOUR:IQC:DVBS2:RATE R7_8",
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_readings_are_returned_but_not_cached()
    {
        let mut sfu = Sfu::with(Recorder::default());
        sfu.set_frequency(974e6).await.unwrap();

        // the recorder answers "0" to everything, like an SFU straight after *RST
        assert_eq!(sfu.frequency().await.unwrap(), 0.0);
        assert_eq!(sfu.symbol_rate().await.unwrap(), 0.0);
        assert_eq!(sfu.scrambling_code().await.unwrap(), 0);
        assert_eq!(sfu.cached().frequency(), 974e6);

        sfu.transport_mut().answers.insert("SOUR:FREQ:ACT:CENT?".into(), "1074000000".into());
        assert_eq!(sfu.frequency().await.unwrap(), 1074e6);
        assert_eq!(sfu.cached().frequency(), 1074e6);
    }

    #[tokio::test]
    async fn readback_parses_sfu_responses()
    {
        let mut recorder = Recorder::default();
        for (query, answer) in [
            ("SOUR:IQC:DVBS2:ROLL?", "0.35"),
            ("SOUR:IQC:DVBS2:CONS?", "S8"),
            ("SOUR:IQC:DVBS2:PIL?", "1"),
            ("SOUR:NOIS:STAT?", "ADD"),
            ("SOUR:MOD:STAT?", "1"),
            ("SOUR:FREQ:ACT:CENT?", "not a number"),
        ] {
            recorder.answers.insert(query.into(), answer.into());
        }
        let mut sfu = Sfu::with(recorder);

        assert_eq!(sfu.roll_off().await.unwrap(), 35.0);
        assert_eq!(sfu.constellation().await.unwrap(), Constellation::Psk8);
        assert!(sfu.pilots().await.unwrap());
        assert_eq!(sfu.noise().await.unwrap(), NoiseState::Add);
        assert!(!sfu.carrier_wave().await.unwrap());
        assert!(matches!(sfu.frequency().await, Err(Error::Parse { .. })));
    }
}
