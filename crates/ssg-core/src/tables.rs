//! Shared PSG lookup tables
//!
//! All tables are immutable after construction. The volume ladder and the
//! envelope shape data are built once on first use; register masks and mixer
//! masks are compile-time constants.

use std::sync::OnceLock;

/// Number of envelope steps per phase
pub const ENV_STEPS: usize = 32;

/// Number of distinct envelope patterns (16 shape register values fold onto 10)
pub const ENV_PATTERNS: usize = 10;

/// Entries per pattern in [`env_data`]: 32 steps x 4 phases
pub const ENV_PATTERN_LEN: usize = ENV_STEPS * 4;

/// Per-register write masks (don't-care bits read back as zero)
pub const REG_MASK: [u8; 14] = [
    0xff, 0x0f, // A period
    0xff, 0x0f, // B period
    0xff, 0x0f, // C period
    0x1f, // noise period
    0xff, // mixer
    0x1f, 0x1f, 0x1f, // volumes (bit 4 = envelope mode)
    0xff, 0xff, // envelope period
    0x0f, // envelope shape
];

/// Per-channel gate masks: 5 level bits per channel, selected by a 3-bit
/// enable field (bit set = channel masked off, i.e. forced on in the mixer)
pub const MASKS: [u32; 8] = [
    0x0000_0000,
    0x0000_001f,
    0x0000_03e0,
    0x0000_03ff,
    0x0000_7c00,
    0x0000_7c1f,
    0x0000_7fe0,
    0x0000_7fff,
];

/// Shape register value (0-15) to envelope pattern index (0-9)
///
/// Register shapes 0-7 ignore the CONTINUE bit and collapse onto the
/// one-shot patterns; 8-15 are the continuous hardware shapes.
pub const SHAPE_TO_ENV: [u8; 16] = [0, 0, 0, 0, 1, 1, 1, 1, 2, 3, 4, 5, 6, 7, 8, 9];

/// Peak single-channel output level; three channels sum to just under i16::MAX
pub const MAX_LEVEL: u16 = 10922;

struct PsgTables {
    /// Logarithmic volume ladder, 1.5 dB per step, index 0 silent
    volume: [u16; ENV_STEPS],
    /// Envelope level data: 10 patterns x 4 phases x 32 steps (levels 0-31)
    env: [u8; ENV_PATTERNS * ENV_PATTERN_LEN],
}

impl PsgTables {
    fn build() -> Self {
        // 1.5 dB per step: 10^(1.5/20)
        const STEP_RATIO: f64 = 1.188_502_227;
        let mut volume = [0u16; ENV_STEPS];
        let mut out = MAX_LEVEL as f64;
        for i in (1..ENV_STEPS).rev() {
            volume[i] = (out + 0.5) as u16;
            out /= STEP_RATIO;
        }

        // Envelope patterns, (phase start, phase end) level pairs. Phase 0 is
        // the triggered ramp; phases 1-3 repeat forever once position wraps.
        //
        //  0: \___   4: /___   (one-shot, CONTINUE clear)
        //  2: \\\\   3: \___
        //  4: \/\/   5: \~~~
        //  6: ////   7: /~~~
        //  8: /\/\   9: /___
        const RAMPS: [[(u8, u8); 4]; ENV_PATTERNS] = [
            [(31, 0), (0, 0), (0, 0), (0, 0)],     // 0x00-0x03: decay then off
            [(0, 31), (0, 0), (0, 0), (0, 0)],     // 0x04-0x07: attack then off
            [(31, 0), (31, 0), (31, 0), (31, 0)],  // 0x08: sawtooth down
            [(31, 0), (0, 0), (0, 0), (0, 0)],     // 0x09: decay, hold low
            [(31, 0), (0, 31), (31, 0), (0, 31)],  // 0x0a: triangle
            [(31, 0), (31, 31), (31, 31), (31, 31)], // 0x0b: decay, hold high
            [(0, 31), (0, 31), (0, 31), (0, 31)],  // 0x0c: sawtooth up
            [(0, 31), (31, 31), (31, 31), (31, 31)], // 0x0d: attack, hold high
            [(0, 31), (31, 0), (0, 31), (31, 0)],  // 0x0e: inverted triangle
            [(0, 31), (0, 0), (0, 0), (0, 0)],     // 0x0f: attack, hold low
        ];

        let mut env = [0u8; ENV_PATTERNS * ENV_PATTERN_LEN];
        for (p, ramps) in RAMPS.iter().enumerate() {
            for (phase, &(from, to)) in ramps.iter().enumerate() {
                for step in 0..ENV_STEPS {
                    let v = if from <= to {
                        from as usize + (to - from) as usize * step / (ENV_STEPS - 1)
                    } else {
                        from as usize - (from - to) as usize * step / (ENV_STEPS - 1)
                    };
                    env[p * ENV_PATTERN_LEN + phase * ENV_STEPS + step] = v as u8;
                }
            }
        }

        PsgTables { volume, env }
    }
}

static TABLES: OnceLock<PsgTables> = OnceLock::new();

fn tables() -> &'static PsgTables {
    TABLES.get_or_init(PsgTables::build)
}

/// Linear output level for a 5-bit volume/envelope index
#[inline]
pub fn volume_level(index: u32) -> u16 {
    tables().volume[(index as usize) & (ENV_STEPS - 1)]
}

/// Envelope level (0-31) for a pattern at (phase, step)
#[inline]
pub fn env_level(pattern: usize, phase: usize, step: usize) -> u8 {
    debug_assert!(pattern < ENV_PATTERNS && phase < 4 && step < ENV_STEPS);
    tables().env[pattern * ENV_PATTERN_LEN + phase * ENV_STEPS + step]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_ladder_monotonic() {
        assert_eq!(volume_level(0), 0);
        for i in 2..ENV_STEPS as u32 {
            assert!(volume_level(i) > volume_level(i - 1));
        }
        assert_eq!(volume_level(31), MAX_LEVEL);
    }

    #[test]
    fn test_volume_three_channel_headroom() {
        assert!(3 * volume_level(31) as i32 <= i16::MAX as i32);
    }

    #[test]
    fn test_volume_steps_are_1_5_db() {
        use approx::assert_relative_eq;
        for i in 8..ENV_STEPS as u32 {
            let ratio = volume_level(i) as f64 / volume_level(i - 1) as f64;
            assert_relative_eq!(ratio, 1.188_502_227, max_relative = 0.01);
        }
    }

    #[test]
    fn test_env_sawtooth_down_repeats() {
        // Shape 0x08: every phase ramps 31 -> 0
        let p = SHAPE_TO_ENV[0x08] as usize;
        for phase in 0..4 {
            assert_eq!(env_level(p, phase, 0), 31);
            assert_eq!(env_level(p, phase, ENV_STEPS - 1), 0);
        }
    }

    #[test]
    fn test_env_one_shot_holds_low() {
        // Shapes 0x00-0x03: decay once, then stay silent
        let p = SHAPE_TO_ENV[0x00] as usize;
        assert_eq!(env_level(p, 0, 0), 31);
        for phase in 1..4 {
            for step in 0..ENV_STEPS {
                assert_eq!(env_level(p, phase, step), 0);
            }
        }
    }

    #[test]
    fn test_env_triangle_alternates() {
        let p = SHAPE_TO_ENV[0x0a] as usize;
        assert_eq!(env_level(p, 0, 0), 31);
        assert_eq!(env_level(p, 1, 0), 0);
        assert_eq!(env_level(p, 1, ENV_STEPS - 1), 31);
    }
}
