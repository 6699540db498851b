#![cfg_attr(not(test), no_std)]

pub mod config;
mod error;
pub mod io;
pub mod laser;
pub mod output;
pub mod phase;
pub mod phasic;
pub mod protocol;

#[cfg(feature = "stm32h7")]
pub mod hardware;

#[cfg(test)]
mod sim;

pub use config::{Config, Revision, Settings};
pub use error::Error;
pub use laser::Laser;
pub use protocol::{Protocol, Rig};
