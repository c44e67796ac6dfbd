//! AY-3-8910 / YM2149 PSG emulation
//!
//! A register-level emulator of the General Instrument AY-3-8910 programmable
//! sound generator and its Yamaha YM2149 sibling, the part that also lives on
//! as the SSG section of the OPN-family FM chips.
//!
//! # Features
//! - 3 square-wave tone channels with 12-bit periods
//! - Shared 17-bit LFSR noise source
//! - Hardware envelope generator (16 levels on the AY, 32 on the YM2149)
//! - Per-register write masks matching the hardware don't-care bits
//! - Glitch-free mid-period frequency changes
//!
//! # Quick start
//! ```
//! use ssgpsg::{SsgKind, SsgPsg};
//!
//! let mut chip = SsgPsg::new(SsgKind::Ym2149, 2_000_000, 44_100).unwrap();
//! chip.write_register(0, 0x1c); // tone A fine
//! chip.write_register(1, 0x01); // tone A coarse
//! chip.write_register(8, 0x0f); // volume A
//! chip.write_register(7, 0x3e); // mixer: enable tone A
//!
//! let mut buffer = [0i16; 512];
//! chip.update(&mut buffer);
//! ```

#![warn(missing_docs)]

pub mod chip;
pub mod generators;
pub mod tables;

/// Error type for PSG construction and configuration
#[derive(thiserror::Error, Debug)]
pub enum SsgError {
    /// Invalid clock or sample-rate configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for PSG operations
pub type Result<T> = std::result::Result<T, SsgError>;

pub use chip::{SsgKind, SsgPsg};
