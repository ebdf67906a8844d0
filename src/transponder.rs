//! Complete signal configuration handed to modulators and demodulators

use log::debug;
use crate::{
    error::{ Error, Result },
    mode::{ BroadcastStandard, CodeRate, Constellation, Mode },
    spec_table::SpecTable,
};

/// Largest DVB-S2 physical layer scrambling code (n in [0, 2^18 - 1])
pub const MAX_SCRAMBLING_CODE: u32 = (1 << 18) - 1;

/// RF parameters of one carrier
///
/// All setters validate their input here rather than leaving it to each driver. A rejected value
/// leaves the transponder unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Transponder
{
    mode: Mode,
    frequency: f64,
    symbol_rate: f64,
    roll_off: f64,
    scrambling_code: u32,
    pilots: bool,
}

impl Default for Transponder
{
    /// MODCOD mode 1 at 1074 MHz, 20 MBaud, 20 % roll-off, scrambling code 0, pilots on
    fn default() -> Self
    {
        Self {
            mode: Mode::default(),
            frequency: 1074e6,
            symbol_rate: 20e6,
            roll_off: 20.0,
            scrambling_code: 0,
            pilots: true,
        }
    }
}

fn check_positive(what: &'static str, value: f64) -> Result<()>
{
    if value.is_finite() && value > 0.0 {
        Ok(())
    }
    else {
        Err(Error::OutOfRange { what: what, value: value, min: 0.0, max: f64::MAX })
    }
}

impl Transponder
{
    /// Default parameters carrying `mode`
    pub fn new(mode: Mode) -> Self
    {
        Self {
            mode: mode,
            ..Self::default()
        }
    }

    /// Default parameters carrying the mode stored under `index`
    pub fn from_index(table: &SpecTable, index: u32) -> Result<Self>
    {
        Ok(Self::new(table.mode(index)?))
    }

    pub fn mode(&self) -> Mode
    {
        self.mode
    }

    /// Replace the mode
    ///
    /// Moving away from DVB-S2 does not clear the stored scrambling code; it is simply never
    /// applied while the standard has no use for it.
    pub fn set_mode(&mut self, mode: Mode)
    {
        debug!("Set mode: {}", mode);
        self.mode = mode;
    }

    pub fn set_mode_index(&mut self, table: &SpecTable, index: u32) -> Result<()>
    {
        self.set_mode(table.mode(index)?);
        Ok(())
    }

    pub fn mode_index(&self, table: &SpecTable) -> Option<u32>
    {
        table.index_of(&self.mode)
    }

    pub fn broadcast_standard(&self) -> BroadcastStandard
    {
        self.mode.broadcast_standard()
    }

    pub fn set_broadcast_standard(&mut self, standard: BroadcastStandard)
    {
        self.set_mode(self.mode.with_broadcast_standard(standard));
    }

    pub fn constellation(&self) -> Constellation
    {
        self.mode.constellation()
    }

    pub fn set_constellation(&mut self, constellation: Constellation)
    {
        self.set_mode(self.mode.with_constellation(constellation));
    }

    pub fn code_rate(&self) -> CodeRate
    {
        self.mode.code_rate()
    }

    pub fn set_code_rate(&mut self, code_rate: CodeRate)
    {
        self.set_mode(self.mode.with_code_rate(code_rate));
    }

    /// Center frequency in Hz
    pub fn frequency(&self) -> f64
    {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: f64) -> Result<()>
    {
        check_positive("frequency", frequency)?;
        self.frequency = frequency;
        debug!("Set frequency: {} MHz", frequency / 1e6);
        Ok(())
    }

    /// Symbol rate in Baud
    pub fn symbol_rate(&self) -> f64
    {
        self.symbol_rate
    }

    pub fn set_symbol_rate(&mut self, symbol_rate: f64) -> Result<()>
    {
        check_positive("symbol rate", symbol_rate)?;
        self.symbol_rate = symbol_rate;
        debug!("Set symbol rate: {} MBaud", symbol_rate / 1e6);
        Ok(())
    }

    /// Roll-off (alpha) in percent
    pub fn roll_off(&self) -> f64
    {
        self.roll_off
    }

    pub fn set_roll_off(&mut self, roll_off: f64) -> Result<()>
    {
        if !(0.0..=100.0).contains(&roll_off) {
            return Err(Error::OutOfRange { what: "roll-off", value: roll_off, min: 0.0, max: 100.0 });
        }
        self.roll_off = roll_off;
        debug!("Set roll-off factor: {}%", roll_off);
        Ok(())
    }

    pub fn scrambling_code(&self) -> u32
    {
        self.scrambling_code
    }

    /// Set the physical layer scrambling code
    ///
    /// Fails with `UnsupportedOperation` unless the current standard carries a scrambling code.
    pub fn set_scrambling_code(&mut self, code: u32) -> Result<()>
    {
        if !self.broadcast_standard().supports_scrambling() {
            return Err(Error::UnsupportedOperation(format!(
                "{} has no scrambling code",
                self.broadcast_standard()
            )));
        }
        if code > MAX_SCRAMBLING_CODE {
            return Err(Error::OutOfRange {
                what: "scrambling code",
                value: code as f64,
                min: 0.0,
                max: MAX_SCRAMBLING_CODE as f64,
            });
        }
        self.scrambling_code = code;
        debug!("Set scrambling code: {}", code);
        Ok(())
    }

    pub fn pilots(&self) -> bool
    {
        self.pilots
    }

    pub fn set_pilots(&mut self, pilots: bool)
    {
        self.pilots = pilots;
        debug!("Set pilot symbols enabled: {}", pilots);
    }

    /// Take over every parameter of `other`
    ///
    /// The scrambling code is only copied when the broadcast standard (now the same as `other`'s)
    /// carries one, mirroring what a device would accept.
    pub fn copy_from(&mut self, other: &Transponder)
    {
        self.set_mode(other.mode);
        self.frequency = other.frequency;
        self.symbol_rate = other.symbol_rate;
        self.roll_off = other.roll_off;
        self.pilots = other.pilots;

        if self.broadcast_standard().supports_scrambling() {
            self.scrambling_code = other.scrambling_code;
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::{ Transponder, MAX_SCRAMBLING_CODE };
    use crate::{
        error::Error,
        mode::{ BroadcastStandard, Mode },
        spec_table::SpecTable,
    };

    fn dvb_s2() -> Mode
    {
        Mode::parse("DVB-S2", "QPSK", "3/4").unwrap()
    }

    #[test]
    fn mode_four_end_to_end()
    {
        let table = SpecTable::builtin().unwrap();
        let mut txp = Transponder::from_index(&table, 4).unwrap();

        assert_eq!(txp.broadcast_standard().to_string(), "DVB-S2");
        txp.set_frequency(974e6).unwrap();
        assert_eq!(txp.frequency(), 974e6);
        assert_eq!(txp.mode_index(&table), Some(4));
    }

    #[test]
    fn unknown_index_propagates()
    {
        let table = SpecTable::builtin().unwrap();
        assert!(matches!(Transponder::from_index(&table, 99), Err(Error::UnknownIndex(99))));
    }

    #[test]
    fn copy_propagates_scrambling_code_within_dvb_s2()
    {
        let mut source = Transponder::new(dvb_s2());
        source.set_scrambling_code(42).unwrap();
        source.set_frequency(1250e6).unwrap();
        source.set_pilots(false);

        let mut dest = Transponder::new(dvb_s2());
        dest.copy_from(&source);

        assert_eq!(dest.scrambling_code(), 42);
        assert_eq!(dest, source);
    }

    #[test]
    fn copy_skips_scrambling_code_for_legacy_standards()
    {
        let mut dest = Transponder::new(dvb_s2());
        dest.set_scrambling_code(7).unwrap();

        for standard in [BroadcastStandard::Dvbs, BroadcastStandard::DirecTv] {
            let mut source = Transponder::new(dvb_s2());
            source.set_scrambling_code(42).unwrap();
            source.set_broadcast_standard(standard);

            dest.copy_from(&source);
            assert_eq!(dest.broadcast_standard(), standard);
            assert_eq!(dest.scrambling_code(), 7);
        }
    }

    #[test]
    fn scrambling_code_needs_dvb_s2()
    {
        let mut txp = Transponder::default();
        assert!(matches!(txp.set_scrambling_code(5), Err(Error::UnsupportedOperation(_))));
        assert_eq!(txp.scrambling_code(), 0);
    }

    #[test]
    fn out_of_range_values_leave_state_untouched()
    {
        let mut txp = Transponder::new(dvb_s2());

        assert!(txp.set_roll_off(100.5).is_err());
        assert!(txp.set_roll_off(-1.0).is_err());
        assert!(txp.set_scrambling_code(MAX_SCRAMBLING_CODE + 1).is_err());
        assert!(txp.set_symbol_rate(0.0).is_err());
        assert!(txp.set_frequency(f64::NAN).is_err());
        assert_eq!(txp, Transponder::new(dvb_s2()));

        txp.set_roll_off(35.0).unwrap();
        txp.set_scrambling_code(MAX_SCRAMBLING_CODE).unwrap();
        assert_eq!(txp.roll_off(), 35.0);
        assert_eq!(txp.scrambling_code(), MAX_SCRAMBLING_CODE);
    }

    #[test]
    fn field_setters_delegate_to_mode()
    {
        let mut txp = Transponder::default();
        txp.set_broadcast_standard(BroadcastStandard::DvbS2);
        txp.set_constellation("8PSK".parse().unwrap());
        txp.set_code_rate("9/10".parse().unwrap());

        assert_eq!(txp.mode(), Mode::parse("DVB-S2", "8PSK", "9/10").unwrap());
    }
}
