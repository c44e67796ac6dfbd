//! FM operator (slot)
//!
//! One of the four sine-generating units of a channel: a 24-bit phase
//! accumulator plus the envelope state machine driving its attenuation.
//! Envelope phases advance when the counter crosses the phase end point;
//! the phase tag names the currently running segment.

use crate::tables::{
    FmTables, EG_AED, EG_AST, EG_DED, EG_DST, EG_ENT, EG_OFF, EG_UED, EG_UST, ENV_BITS, LFO_RATE,
    MUL_TABLE, SL_TABLE,
};

/// Envelope segment currently running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EgSeg {
    /// Accelerating rise from silence
    Attack,
    /// Fall towards the sustain level
    Decay,
    /// Fall from the sustain level (or parked silent after it ran out)
    Sustain,
    /// Fall after key-off (or parked silent); also the keyed-off idle state
    Release,
    /// SSG-EG attack
    SsgAttack,
    /// SSG-EG falling section
    SsgDecayDown,
    /// SSG-EG rising section
    SsgDecayUp,
}

/// Per-operator state
#[derive(Clone, Debug)]
pub struct FmSlot {
    /// Detune table row (0-7; 4-7 are the negative rows)
    pub dt: usize,
    /// OPM DT2 key-code table offset
    pub dt2: i32,
    /// Total level, envelope-curve units
    pub tl: i32,
    /// Latched total level (CSM capture target)
    pub tll: i32,
    /// Key-scale shift: 3 - KS
    pub ksr_shift: u8,
    /// Cached key-scale value (kcode >> ksr_shift)
    pub ksr: u8,
    /// Rate table base offsets; `None` parks the segment (rate 0)
    pub ar: Option<u16>,
    /// Decay rate base
    pub dr: Option<u16>,
    /// Sustain rate base
    pub sr: Option<u16>,
    /// Release rate base (never parked)
    pub rr: u16,
    /// Sustain level, envelope counter units
    pub sl: i32,
    /// SSG-EG mode nibble (bit 3 enables)
    pub seg: u8,
    /// Frequency multiple, x2 fixed point
    pub mul: u32,
    /// Phase accumulator
    pub cnt: u32,
    /// Phase increment per sample
    pub incr: u32,
    /// Envelope segment
    pub phase: EgSeg,
    /// Envelope counter
    pub evc: i32,
    /// Envelope counter end point for the running segment
    pub eve: i32,
    /// Envelope counter step for the running segment
    pub evs: i32,
    /// Cached per-segment steps at the current key scale
    pub evsa: i32,
    /// Decay step
    pub evsd: i32,
    /// Sustain step
    pub evss: i32,
    /// Release step
    pub evsr: i32,
    /// AM enable
    pub amon: bool,
    /// AM depth (channel depth gated by `amon`)
    pub ams: i32,
}

impl Default for FmSlot {
    fn default() -> Self {
        FmSlot {
            dt: 0,
            dt2: 0,
            tl: 0,
            tll: 0,
            ksr_shift: 3,
            ksr: 0,
            ar: None,
            dr: None,
            sr: None,
            rr: 2,
            sl: SL_TABLE[0],
            seg: 0,
            mul: MUL_TABLE[0],
            cnt: 0,
            incr: 0,
            phase: EgSeg::Release,
            evc: EG_OFF,
            eve: EG_OFF + 1,
            evs: 0,
            evsa: 0,
            evsd: 0,
            evss: 0,
            evsr: 0,
            amon: false,
            ams: 0,
        }
    }
}

#[inline]
fn rate_step(table: &[i32; 94], base: Option<u16>, ksr: u8) -> i32 {
    match base {
        Some(b) => table[b as usize + ksr as usize],
        None => 0,
    }
}

impl FmSlot {
    /// Slot is keyed (anything but the release segment)
    #[inline]
    pub fn key_is(&self) -> bool {
        self.phase != EgSeg::Release
    }

    /// Key on: restart the phase accumulator and enter attack
    pub fn key_on(&mut self) {
        if !self.key_is() {
            self.cnt = 0;
            self.phase = if self.seg & 0x08 != 0 {
                EgSeg::SsgAttack
            } else {
                EgSeg::Attack
            };
            self.evs = self.evsa;
            self.evc = EG_AST;
            self.eve = EG_AED;
        }
    }

    /// Key off: map an in-flight attack onto the decay curve so the
    /// attenuation is continuous, then enter release
    pub fn key_off(&mut self, t: &FmTables) {
        if self.key_is() {
            if self.evc < EG_DST {
                self.evc = (t.env_curve[(self.evc >> ENV_BITS) as usize] << ENV_BITS) + EG_DST;
            }
            self.phase = EgSeg::Release;
            self.eve = EG_DED;
            self.evs = self.evsr;
        }
    }

    /// Segment-end transition
    fn eg_next(&mut self) {
        match self.phase {
            EgSeg::Attack => {
                self.phase = EgSeg::Decay;
                self.evc = EG_DST;
                self.eve = self.sl;
                self.evs = self.evsd;
            }
            EgSeg::Decay => {
                self.phase = EgSeg::Sustain;
                self.evc = self.sl;
                self.eve = EG_DED;
                self.evs = self.evss;
            }
            EgSeg::Sustain => {
                self.evs = 0;
                self.evc = EG_OFF;
                self.eve = EG_OFF + 1;
            }
            EgSeg::Release => {
                self.evc = EG_OFF;
                self.eve = EG_OFF + 1;
                self.evs = 0;
            }
            EgSeg::SsgAttack => {
                if self.seg & 0x04 != 0 {
                    // inverted start: rise first
                    self.phase = EgSeg::SsgDecayUp;
                    self.evc = self.sl + (EG_UST - EG_DST);
                    self.eve = EG_UED;
                    self.evs = self.evss;
                } else {
                    self.phase = EgSeg::SsgDecayDown;
                    self.evc = EG_DST;
                    self.eve = EG_DED;
                    self.evs = self.evsd;
                }
            }
            EgSeg::SsgDecayDown => {
                if self.seg & 0x02 != 0 {
                    // alternate
                    self.phase = EgSeg::SsgDecayUp;
                    self.evc = self.sl + (EG_UST - EG_DST);
                    self.eve = EG_UED;
                    self.evs = self.evss;
                } else {
                    // repeat from the top
                    self.evc = EG_DST;
                }
                if self.seg & 0x01 != 0 {
                    self.evs = 0; // hold
                }
            }
            EgSeg::SsgDecayUp => {
                if self.seg & 0x02 != 0 {
                    self.phase = EgSeg::SsgDecayDown;
                    self.evc = EG_DST;
                    self.eve = EG_DED;
                    self.evs = self.evsd;
                } else {
                    self.evc = self.sl + (EG_UST - EG_DST);
                }
                if self.seg & 0x01 != 0 {
                    self.evs = 0; // hold
                }
            }
        }
    }

    /// Advance the envelope one sample; returns the attenuation
    /// (total level + curve + AM) in envelope-curve units
    #[inline]
    pub fn calc_eg(&mut self, t: &FmTables, lfo_amd: i32) -> i32 {
        self.evc += self.evs;
        if self.evc >= self.eve {
            self.eg_next();
        }
        let mut out = self.tll + t.env_curve[(self.evc >> ENV_BITS) as usize];
        if self.ams != 0 {
            out += self.ams * lfo_amd / LFO_RATE;
        }
        out
    }

    /// Refresh the phase increment and the key-scaled rate steps
    pub fn calc_fc(&mut self, fc: i32, kc: u8, dt: &[[i32; 32]; 8], ar: &[i32; 94], dr: &[i32; 94]) {
        self.incr = (fc.wrapping_mul(self.mul as i32) + dt[self.dt][kc as usize]) as u32;
        let ksr = kc >> self.ksr_shift;
        if self.ksr != ksr {
            self.ksr = ksr;
            self.evsa = rate_step(ar, self.ar, ksr);
            self.evsd = rate_step(dr, self.dr, ksr);
            self.evss = rate_step(dr, self.sr, ksr);
            self.evsr = dr[self.rr as usize + ksr as usize];
        }
    }

    /// DT/MUL register
    pub fn set_det_mul(&mut self, v: u8) {
        self.mul = MUL_TABLE[(v & 0x0f) as usize];
        self.dt = ((v >> 4) & 7) as usize;
    }

    /// Total level register; the CSM channel defers the latch to Timer A
    pub fn set_tl(&mut self, v: u8, csm: bool) {
        let v = (v & 0x7f) as i32;
        self.tl = (((v << 7) | v) * EG_ENT) >> 14;
        if !csm {
            self.tll = self.tl;
        }
    }

    /// KS/AR register
    pub fn set_ar_ksr(&mut self, v: u8, ar_table: &[i32; 94]) {
        self.ksr_shift = 3 - (v >> 6);
        let rate = v & 0x1f;
        self.ar = if rate != 0 {
            Some((rate as u16) << 1)
        } else {
            None
        };
        self.evsa = rate_step(ar_table, self.ar, self.ksr);
        if self.phase == EgSeg::Attack {
            self.evs = self.evsa;
        }
    }

    /// DR register
    pub fn set_dr(&mut self, v: u8, dr_table: &[i32; 94]) {
        let rate = v & 0x1f;
        self.dr = if rate != 0 {
            Some((rate as u16) << 1)
        } else {
            None
        };
        self.evsd = rate_step(dr_table, self.dr, self.ksr);
        if self.phase == EgSeg::Decay {
            self.evs = self.evsd;
        }
    }

    /// SR register
    pub fn set_sr(&mut self, v: u8, dr_table: &[i32; 94]) {
        let rate = v & 0x1f;
        self.sr = if rate != 0 {
            Some((rate as u16) << 1)
        } else {
            None
        };
        self.evss = rate_step(dr_table, self.sr, self.ksr);
        if self.phase == EgSeg::Sustain {
            self.evs = self.evss;
        }
    }

    /// SL/RR register
    pub fn set_sl_rr(&mut self, v: u8, dr_table: &[i32; 94]) {
        self.sl = SL_TABLE[(v >> 4) as usize];
        self.rr = (((v & 0x0f) as u16) << 2) | 2;
        self.evsr = dr_table[self.rr as usize + self.ksr as usize];
        if self.phase == EgSeg::Release {
            self.evs = self.evsr;
        }
    }

    /// Silence the slot (chip reset)
    pub fn reset(&mut self) {
        self.seg = 0;
        self.phase = EgSeg::Release;
        self.evc = EG_OFF;
        self.eve = EG_OFF + 1;
        self.evs = 0;
    }
}
