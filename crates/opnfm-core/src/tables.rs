//! Shared FM lookup tables
//!
//! The total-level, sine, noise and envelope-curve tables are identical for
//! every chip instance and are built once on first use. Per-chip tables
//! (detune, rate and frequency tables, which depend on clock and prescaler)
//! live in [`crate::state::FmState`] and the chip structs instead.

use std::sync::OnceLock;

/// Sine table entries
pub const SIN_ENT: usize = 2048;

/// Fraction bits of the envelope counter
pub const ENV_BITS: u32 = 16;

/// Envelope curve entries
pub const EG_ENT: i32 = 4096;

/// Envelope step in dB (96 dB over the whole curve)
pub const EG_STEP: f64 = 96.0 / EG_ENT as f64;

/// Phase-generator output cutoff: 78 dB
pub const PG_CUT_OFF: i32 = 78 * EG_ENT / 96;

/// Envelope output cutoff: 68 dB; operators at or beyond it are skipped
pub const EG_CUT_OFF: i32 = 68 * EG_ENT / 96;

/// Phase counter fraction bits
pub const FREQ_BITS: u32 = 24;

/// Phase counter scale (counter is 21 bits at octave 7)
pub const FREQ_RATE: i32 = 1 << (FREQ_BITS - 21);

/// Total-level resolution bits
pub const TL_BITS: u32 = FREQ_BITS + 2;

/// Operator output shift (14-bit operator into 16-bit samples)
pub const TL_SHIFT: u32 = TL_BITS + 1 + 2;

/// Final output shift down to 16-bit samples
pub const FM_OUTSB: u32 = TL_SHIFT - 16;

/// Accumulator clip limits before the final shift
pub const FM_MAXOUT: i32 = (1 << (TL_SHIFT - 1)) - 1;
/// Lower clip limit
pub const FM_MINOUT: i32 = -(1 << (TL_SHIFT - 1));

/// Envelope counter landmarks: attack runs [EG_AST, EG_AED), decay/sustain/
/// release run [EG_DST, EG_DED); the SSG-EG upside section sits above them
pub const EG_AST: i32 = 0;
/// End of the attack section
pub const EG_AED: i32 = EG_ENT << ENV_BITS;
/// Start of the decay section
pub const EG_DST: i32 = EG_AED;
/// End of the decay section
pub const EG_DED: i32 = EG_DST + (EG_ENT << ENV_BITS) - 1;
/// Parked (silent) counter position
pub const EG_OFF: i32 = EG_DED;
/// Start of the SSG-EG upside section
pub const EG_UST: i32 = (2 * EG_ENT) << ENV_BITS;
/// End of the SSG-EG upside section
pub const EG_UED: i32 = (3 * EG_ENT) << ENV_BITS;

/// TL table half size: sine cutoff plus the worst-case attenuation sum
pub const TL_MAX: usize = (PG_CUT_OFF + EG_CUT_OFF + 1) as usize;

/// LFO table entries
pub const LFO_ENT: usize = 512;
/// LFO phase-counter shift down to a table index
pub const LFO_SHIFT: u32 = 32 - 9;
/// LFO depth full-scale
pub const LFO_RATE: i32 = 0x10000;
/// Pitch-modulation scale divisor
pub const PMS_RATE: i32 = 0x400;

/// Attack rate time constant (OPM-measured; OPN assumed identical)
pub const AR_RATE: f64 = 399128.0;
/// Decay rate time constant
pub const DR_RATE: f64 = 5514396.0;

/// Register slot order to slot array index
pub const SLOT1: usize = 0;
/// Second slot in processing order
pub const SLOT2: usize = 2;
/// Third slot in processing order
pub const SLOT3: usize = 1;
/// Fourth slot in processing order
pub const SLOT4: usize = 3;

const fn sl(db: i32) -> i32 {
    // 3 dB per step: 3/EG_STEP = 128 curve steps
    db * (128 << ENV_BITS) + EG_DST
}

/// Sustain level table: 0-42 dB in 3 dB steps, then effectively-infinite
pub const SL_TABLE: [i32; 16] = [
    sl(0),
    sl(1),
    sl(2),
    sl(3),
    sl(4),
    sl(5),
    sl(6),
    sl(7),
    sl(8),
    sl(9),
    sl(10),
    sl(11),
    sl(12),
    sl(13),
    sl(14),
    sl(31),
];

/// Detune offsets per key code (YM2151/YM2612 measurements); rows 4-7 of the
/// per-chip table are the negated mirror
pub const DT_DATA: [u8; 4 * 32] = [
    // FD=0
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // FD=1
    0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 8,
    8, // FD=2
    1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 9, 10, 11, 12, 13, 14, 16,
    16, 16, 16, // FD=3
    2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 20,
    22, 22, 22, 22,
];

/// Frequency multiple table, x2 fixed point (index 0 is x0.5)
pub const MUL_TABLE: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30];

/// OPN fnum high bits to key-code low bits follow table
pub const OPN_FKTABLE: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 3, 3, 3, 3, 3, 3];

/// OPM note code to semitone offset (64 steps per semitone)
pub const KC_TO_SEMITONE: [i32; 16] = [
    0, 64, 128, 192, 192, 256, 320, 384, 384, 448, 512, 576, 576, 640, 704, 768,
];

/// OPM DT2 offsets into the key-code table (0, 600, 781, 950 cents)
pub const DT2_TABLE: [i32; 4] = [0, 384, 500, 608];

/// Deterministic LCG shared by the noise tables
pub(crate) fn lcg_rand(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(214013).wrapping_add(2531011);
    (*seed >> 16) & 0x7fff
}

/// Process-wide immutable tables
pub struct FmTables {
    /// Linear output per attenuation step; second half is the negated mirror
    pub tl: Box<[i32]>,
    /// Sine phase to TL-table offset
    pub sin: Box<[u16; SIN_ENT]>,
    /// OPM hardware-noise phase to TL-table offset
    pub noise: Box<[u16; SIN_ENT]>,
    /// Envelope counter to attenuation: attack, decay and SSG-upside sections
    pub env_curve: Box<[i32]>,
    /// Decay-curve position to equivalent attack-counter position
    pub drar: Box<[i32]>,
}

impl FmTables {
    fn build() -> Self {
        // Total level: dB -> linear voltage, zero beyond the sine cutoff
        let mut tl = vec![0i32; 2 * TL_MAX];
        for t in 0..TL_MAX {
            let v = if t as i32 >= PG_CUT_OFF {
                0.0
            } else {
                (((1u32 << TL_BITS) - 1) as f64) / 10f64.powf(EG_STEP * t as f64 / 20.0)
            };
            tl[t] = v as i32;
            tl[TL_MAX + t] = -tl[t];
        }

        // Sine table holds offsets into the TL table; the minus half of the
        // wave points at the negated section
        let mut sin = Box::new([0u16; SIN_ENT]);
        for s in 1..=SIN_ENT / 4 {
            let pom = (2.0 * std::f64::consts::PI * s as f64 / SIN_ENT as f64).sin();
            let db = 20.0 * (1.0 / pom).log10();
            let j = ((db / EG_STEP) as i32).min(PG_CUT_OFF) as u16;
            sin[s] = j;
            sin[SIN_ENT / 2 - s] = j;
            sin[SIN_ENT / 2 + s] = TL_MAX as u16 + j;
            sin[SIN_ENT - s] = TL_MAX as u16 + j;
        }
        sin[0] = PG_CUT_OFF as u16;
        sin[SIN_ENT / 2] = PG_CUT_OFF as u16;

        // OPM channel-8 noise: random sign and level per phase entry
        let mut noise = Box::new([0u16; SIN_ENT]);
        let mut seed = 1u32;
        for n in noise.iter_mut() {
            let sign = if lcg_rand(&mut seed) & 1 != 0 {
                TL_MAX as u16
            } else {
                0
            };
            let lev = lcg_rand(&mut seed) & 0x1ff;
            *n = sign + (lev as u32 * EG_ENT as u32 / 0x200) as u16;
        }

        // Envelope curve: accelerating attack, linear decay, mirrored
        // SSG-EG upside
        let mut env_curve = vec![0i32; (3 * EG_ENT + 1) as usize];
        for i in 0..EG_ENT {
            let pom = ((EG_ENT - 1 - i) as f64 / EG_ENT as f64).powi(8) * EG_ENT as f64;
            env_curve[i as usize] = pom as i32;
            env_curve[((EG_DST >> ENV_BITS) + i) as usize] = i;
            env_curve[((EG_UST >> ENV_BITS) + i) as usize] = EG_ENT - 1 - i;
        }
        env_curve[(EG_OFF >> ENV_BITS) as usize] = EG_ENT - 1;

        // Decay position -> attack counter, for continuous key-off from attack
        let mut drar = vec![0i32; EG_ENT as usize];
        let mut j = EG_ENT as usize - 1;
        for (i, d) in drar.iter_mut().enumerate() {
            while j > 0 && env_curve[j] < i as i32 {
                j -= 1;
            }
            *d = (j as i32) << ENV_BITS;
        }

        FmTables {
            tl: tl.into_boxed_slice(),
            sin,
            noise,
            env_curve: env_curve.into_boxed_slice(),
            drar: drar.into_boxed_slice(),
        }
    }

    /// Operator output: sine phase plus attenuation through the TL table
    #[inline]
    pub fn op_out(&self, pg: i32, eg: i32) -> i32 {
        let idx = (pg / (0x0100_0000 / SIN_ENT as i32)) & (SIN_ENT as i32 - 1);
        self.tl[self.sin[idx as usize] as usize + eg as usize]
    }

    /// Operator output through the OPM noise table
    #[inline]
    pub fn op_out_noise(&self, pg: i32, eg: i32) -> i32 {
        let idx = (pg / (0x0100_0000 / SIN_ENT as i32)) & (SIN_ENT as i32 - 1);
        self.tl[self.noise[idx as usize] as usize + eg as usize]
    }
}

static TABLES: OnceLock<FmTables> = OnceLock::new();

/// Shared tables, built on first use
pub fn fm_tables() -> &'static FmTables {
    TABLES.get_or_init(FmTables::build)
}

/// OPN LFO triangle waveform
pub struct LfoWaves {
    /// OPN triangle
    pub opn: [i32; LFO_ENT],
    /// OPM saw/square/triangle/noise, concatenated
    pub opm: [i32; LFO_ENT * 4],
}

static LFO_WAVES: OnceLock<LfoWaves> = OnceLock::new();

/// Shared LFO waveforms, built on first use
pub fn lfo_waves() -> &'static LfoWaves {
    LFO_WAVES.get_or_init(|| {
        let mut opn = [0i32; LFO_ENT];
        for (i, w) in opn.iter_mut().enumerate() {
            *w = if i < LFO_ENT / 2 {
                i as i32 * LFO_RATE / (LFO_ENT / 2) as i32
            } else {
                (LFO_ENT - i) as i32 * LFO_RATE / (LFO_ENT / 2) as i32
            };
        }

        let mut opm = [0i32; LFO_ENT * 4];
        let mut seed = 1u32;
        for i in 0..LFO_ENT {
            opm[i] = LFO_RATE * i as i32 / LFO_ENT as i32 / 127;
            opm[LFO_ENT + i] = (if i < LFO_ENT / 2 { 0 } else { LFO_RATE }) / 127;
            opm[LFO_ENT * 2 + i] = LFO_RATE
                * (if i < LFO_ENT / 2 {
                    i as i32
                } else {
                    (LFO_ENT - i) as i32
                })
                / (LFO_ENT / 2) as i32
                / 127;
            opm[LFO_ENT * 3 + i] = LFO_RATE * (lcg_rand(&mut seed) & 0xff) as i32 / 256 / 127;
        }
        LfoWaves { opn, opm }
    })
}
