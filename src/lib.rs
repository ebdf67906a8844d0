//! **A**synchronous-Rust **R**emote **C**ontrol for **S**atellite modem test equipment
//!
//! Translates carrier parameters (frequency, symbol rate, MODCOD, roll-off, scrambling code,
//! pilots) into instrument commands and sends them over SCPI, interactive shells, ssh or SNMP.
//!
//! The pieces, bottom-up:
//!   - [`transport`]: the [`Transport`] trait and its implementations, plus the
//!     operation-complete poll that keeps commands from piling up on slow hardware
//!   - [`spec_table`], [`mode`], [`transponder`]: the parameter model and the MODCOD table it is
//!     indexed by
//!   - [`devices`]: capability traits and the SFU driver
//!   - [`context`]: opens instruments by name from a [`Config`] and keeps one connection per device
//!   - [`datalog`]: CSV/JSON measurement logs
//!
//! ```no_run
//! use arcs_satcom::{ Config, Context, Transponder, devices::TransponderConfigurable };
//!
//! # async fn run() -> arcs_satcom::Result<()> {
//! let context = Context::new(Config::load("bench.toml")?)?;
//! let mut sfu = context.sfu("sfu").await?;
//!
//! let mut carrier = Transponder::from_index(&context.spec_table(), 4)?;
//! carrier.set_frequency(974e6)?;
//! sfu.apply_transponder(&carrier).await?;
//! # Ok(())
//! # }
//! ```

pub mod cmd;
pub mod config;
pub mod context;
pub mod datalog;
pub mod devices;
pub mod error;
pub mod mode;
pub mod registry;
pub mod sim;
pub mod spec_table;
pub mod transponder;
pub mod transport;

pub use config::Config;
pub use context::Context;
pub use datalog::{ DataLogger, LogFormat };
pub use error::{ Error, Result };
pub use mode::{ BroadcastStandard, CodeRate, Constellation, Mode };
pub use spec_table::{ ModcodSpec, SpecTable };
pub use transponder::Transponder;
pub use transport::Transport;
