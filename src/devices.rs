//! Device capabilities and drivers
//!
//! # Purpose
//! Drivers turn transponder parameters into device commands. Rather than one base class per kind
//! of box, each driver implements the capabilities it actually has:
//!   - [`ModeConfigurable`]: broadcast standard, constellation and code rate
//!   - [`TransponderConfigurable`]: everything else a carrier is described by
//!
//! Code that only needs to set up a carrier can then be written once against
//! `TransponderConfigurable` and run against any modulator.
//!
//! # Cancel Safety
//! **Driver calls are not cancel safe,** i.e. they should not be used in a `tokio::select!` call.
//! Most of them are several writes in a row, each followed by an operation-complete poll, so
//! cancelling one can leave the device half configured and a poll reply unread on the channel.
//!
//! # Supported Devices
//!   - Rohde & Schwarz SFU broadcast test system, see [`Sfu`]

use async_trait::async_trait;
use log::info;
use crate::{
    error::Result,
    mode::Mode,
    transponder::Transponder,
};

pub mod sfu;

pub use sfu::Sfu;

#[async_trait]
pub trait ModeConfigurable: Send
{
    async fn set_mode(&mut self, mode: Mode) -> Result<()>;

    /// The current mode
    ///
    /// Drivers may answer parts of it from their own state where the device readback is not
    /// reliable.
    async fn mode(&mut self) -> Result<Mode>;
}

#[async_trait]
pub trait TransponderConfigurable: ModeConfigurable
{
    async fn set_frequency(&mut self, frequency: f64) -> Result<()>;
    async fn frequency(&mut self) -> Result<f64>;

    async fn set_symbol_rate(&mut self, symbol_rate: f64) -> Result<()>;
    async fn symbol_rate(&mut self) -> Result<f64>;

    /// Roll-off in percent
    async fn set_roll_off(&mut self, roll_off: f64) -> Result<()>;
    async fn roll_off(&mut self) -> Result<f64>;

    /// Fails with `UnsupportedOperation` unless the current standard is DVB-S2
    async fn set_scrambling_code(&mut self, code: u32) -> Result<()>;
    async fn scrambling_code(&mut self) -> Result<u32>;

    async fn set_pilots(&mut self, pilots: bool) -> Result<()>;
    async fn pilots(&mut self) -> Result<bool>;

    /// Configures every transponder field on the device
    ///
    /// The mode goes first so the scrambling code is only written once the device runs a
    /// standard that has one.
    async fn apply_transponder(&mut self, transponder: &Transponder) -> Result<()>
    {
        self.set_mode(transponder.mode()).await?;
        self.set_frequency(transponder.frequency()).await?;
        self.set_symbol_rate(transponder.symbol_rate()).await?;
        self.set_roll_off(transponder.roll_off()).await?;
        self.set_pilots(transponder.pilots()).await?;

        if transponder.broadcast_standard().supports_scrambling() {
            self.set_scrambling_code(transponder.scrambling_code()).await?;
        }
        info!("Applied transponder {}", transponder.mode());

        Ok(())
    }

    /// Reads every transponder field back from the device
    ///
    /// Fails with `OutOfRange` when a reading is not a valid transponder setting, e.g. a zero
    /// frequency; the individual getters still return such readings.
    async fn transponder(&mut self) -> Result<Transponder>
    {
        let mut transponder = Transponder::new(self.mode().await?);
        transponder.set_frequency(self.frequency().await?)?;
        transponder.set_symbol_rate(self.symbol_rate().await?)?;
        transponder.set_roll_off(self.roll_off().await?)?;
        transponder.set_pilots(self.pilots().await?);

        if transponder.broadcast_standard().supports_scrambling() {
            transponder.set_scrambling_code(self.scrambling_code().await?)?;
        }

        Ok(transponder)
    }
}
