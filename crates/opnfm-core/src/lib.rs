//! Yamaha OPN/OPM family FM synthesis emulation
//!
//! Register-level, sample-for-sample emulation of the 1980s-90s Yamaha FM
//! sound chips:
//!
//! - **YM2203** (OPN): 3 FM channels + SSG, mono
//! - **YM2608** (OPNA): 6 FM channels, stereo, LFO, rhythm PCM, Delta-T
//! - **YM2610 / YM2610B** (OPNB): FM + 6 ADPCM-A channels + Delta-T
//! - **YM2612** (OPN2): 6 FM channels, stereo, LFO, DAC
//! - **YM2151** (OPM): 8 FM channels, stereo, 4-waveform LFO, noise slot
//!
//! The SSG section embedded in the OPN-class chips comes from the sibling
//! [`ssgpsg`] crate and renders on its own output stream, as on the original
//! board wiring.
//!
//! # Architecture
//!
//! Every chip is a plain struct owning its channels, timers and decoders;
//! per-sample helpers take explicit references, so any number of chip
//! instances can run side by side. Clock-independent lookup tables are
//! process-wide and built on first use; clock-dependent tables live in the
//! chip and are rebuilt on prescaler changes.
//!
//! Timers never own real time: install a [`state::TimerHandler`] to be told
//! how long each countdown lasts and call `timer_over` on expiry, or leave
//! it out and the timers count down inside `update`. A
//! [`state::SyncHandler`] is invoked before any register write that changes
//! perceptible output, so the host can flush synthesis up to the present —
//! writes are never applied retroactively to already-rendered samples.
//!
//! # Quick start
//! ```
//! use opnfm::Ym2151;
//!
//! let mut chip = Ym2151::new(3_579_545, 44_100).unwrap();
//! chip.write(0, 0x20); // channel 0: RL + algorithm
//! chip.write(1, 0xc7);
//! chip.write(0, 0x68); // slot 1 total level
//! chip.write(1, 0x00);
//! chip.write(0, 0x88); // slot 1 attack rate
//! chip.write(1, 0x1f);
//! chip.write(0, 0x28); // key code
//! chip.write(1, 0x4a);
//! chip.write(0, 0x08); // key on
//! chip.write(1, 0x78);
//!
//! let mut left = [0i16; 512];
//! let mut right = [0i16; 512];
//! chip.update(&mut left, &mut right);
//! ```

#![warn(missing_docs)]

pub mod adpcma;
pub mod channel;
pub mod chips;
pub mod deltat;
pub mod lfo;
pub mod opn;
pub mod slot;
pub mod state;
pub mod tables;

/// Error type for chip construction and configuration
#[derive(thiserror::Error, Debug)]
pub enum FmError {
    /// Invalid clock or sample-rate configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for chip operations
pub type Result<T> = std::result::Result<T, FmError>;

pub use channel::{FmChannel, LfoOut, OutputBus};
pub use chips::{OpnbKind, Ym2151, Ym2203, Ym2608, Ym2610, Ym2612};
pub use state::{IrqHandler, Status, SyncHandler, TimerAction, TimerHandler, TimerId};
