//! Chip variant adapters
//!
//! Each chip composes the shared engine parts it actually carries; register
//! address maps and update loops are variant-specific.

pub mod ym2151;
pub mod ym2203;
pub mod ym2608;
pub mod ym2610;
pub mod ym2612;

pub use ym2151::Ym2151;
pub use ym2203::Ym2203;
pub use ym2608::Ym2608;
pub use ym2610::{OpnbKind, Ym2610};
pub use ym2612::Ym2612;
