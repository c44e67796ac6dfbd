//! OPN register block shared by YM2203 / YM2608 / YM2610 / YM2612
//!
//! Register decoding is data-driven per address range; channels are passed in
//! explicitly so the engine itself holds no channel storage.

use bitflags::bitflags;

use crate::channel::FmChannel;
use crate::lfo::OpnLfo;
use crate::state::FmState;
use crate::tables::{
    fm_tables, AR_RATE, DR_RATE, FREQ_RATE, OPN_FKTABLE, SLOT1, SLOT2, SLOT3, SLOT4,
};

bitflags! {
    /// Capability flags distinguishing the OPN family members
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ChipCaps: u8 {
        /// Embedded SSG section
        const SSG = 0x01;
        /// LFO and stereo pan registers
        const LFOPAN = 0x04;
        /// Six FM channels (second register bank)
        const SIX_CH = 0x08;
        /// YM2612 DAC
        const DAC = 0x10;
        /// ADPCM units
        const ADPCM = 0x20;
    }
}

/// Channel-3 special mode: independent frequencies for slots 1-3
#[derive(Clone, Debug, Default)]
pub struct ThreeSlot {
    /// Per-slot frequency values
    pub fc: [i32; 3],
    /// Per-slot frequency latches
    pub fn_h: [u8; 3],
    /// Per-slot key codes
    pub kcode: [u8; 3],
}

/// OPN-family register engine
pub struct OpnEngine {
    /// Variant capabilities
    pub caps: ChipCaps,
    /// Common chip state
    pub st: FmState,
    /// 3-slot mode state
    pub sl3: ThreeSlot,
    /// fnum to phase-increment table (octave 7)
    pub fn_table: [u32; 2048],
    /// Shared LFO (LFOPAN variants)
    pub lfo: OpnLfo,
}

/// OPN AM depths: 0 / 1.4 / 5.9 / 11.8 dB in envelope steps
const AMD_TABLE: [i32; 4] = [0, 59, 251, 503];

/// OPN PM depths in cents
const PMD_TABLE: [f64; 8] = [0.0, 3.4, 6.7, 10.0, 14.0, 20.0, 40.0, 80.0];

impl OpnEngine {
    /// New engine for a chip variant
    pub fn new(caps: ChipCaps, clock: u32, rate: u32) -> Self {
        OpnEngine {
            caps,
            st: FmState::new(clock, rate),
            sl3: ThreeSlot::default(),
            fn_table: [0; 2048],
            lfo: OpnLfo::default(),
        }
    }

    /// Prescaler change: rebuild freqbase, timer base and every derived table
    pub fn set_prescaler(&mut self, pres: u32, timer_pres: u32) {
        self.st.freqbase = if self.st.rate != 0 {
            (self.st.clock as f64 / self.st.rate as f64) / pres as f64
        } else {
            0.0
        };
        self.st.timer_base = timer_pres as f64 / self.st.clock as f64;
        self.st.set_timer_scale();
        self.st.init_timetables(AR_RATE, DR_RATE);
        for (i, entry) in self.fn_table.iter_mut().enumerate() {
            // frequency table for octave 7
            *entry =
                (i as f64 * self.st.freqbase * FREQ_RATE as f64 * (1 << 7) as f64 / 2.0) as u32;
        }
        self.lfo.build_freq_table(self.st.freqbase);
    }

    /// Mode registers 0x20-0x2f (timers, key on/off, LFO)
    pub fn write_mode(&mut self, channels: &mut [FmChannel], r: u32, v: u8) {
        match r {
            0x21 => {} // test
            0x22 => {
                if self.caps.contains(ChipCaps::LFOPAN) {
                    self.lfo.set_reg(v);
                }
            }
            0x24 => self.st.ta = (self.st.ta & 0x03) | ((v as i32) << 2),
            0x25 => self.st.ta = (self.st.ta & 0x3fc) | (v as i32 & 3),
            0x26 => self.st.tb = v,
            0x27 => self.st.set_mode(v),
            0x28 => {
                let mut c = (v & 0x03) as usize;
                if c == 3 {
                    return;
                }
                if v & 0x04 != 0 && self.caps.contains(ChipCaps::SIX_CH) {
                    c += 3;
                }
                let Some(ch) = channels.get_mut(c) else {
                    return;
                };
                let t = fm_tables();
                for (bit, s) in [(0x10u8, SLOT1), (0x20, SLOT2), (0x40, SLOT3), (0x80, SLOT4)] {
                    if v & bit != 0 {
                        ch.slots[s].key_on();
                    } else {
                        ch.slots[s].key_off(t);
                    }
                }
            }
            _ => {}
        }
    }

    /// Operator/channel registers 0x30-0xff (plus the 0x100 bank)
    pub fn write_reg(&mut self, channels: &mut [FmChannel], r: u32, v: u8) {
        let mut c = (r & 3) as usize;
        if c == 3 {
            return; // 0xX3 / 0xX7 / 0xXB / 0xXF don't exist
        }
        if r >= 0x100 {
            c += 3;
        }
        if c >= channels.len() {
            return;
        }
        let slot_idx = ((r >> 2) & 3) as usize;
        let csm_ch = c == 2 && (self.st.mode & 0x80) != 0;

        match r & 0xf0 {
            0x30 => {
                channels[c].slots[slot_idx].set_det_mul(v);
                channels[c].freq_dirty = true;
            }
            0x40 => channels[c].slots[slot_idx].set_tl(v, csm_ch),
            0x50 => {
                channels[c].slots[slot_idx].set_ar_ksr(v, &self.st.ar_table);
                channels[c].freq_dirty = true;
            }
            0x60 => {
                channels[c].slots[slot_idx].set_dr(v, &self.st.dr_table);
                if self.caps.contains(ChipCaps::LFOPAN) {
                    let ams = channels[c].ams;
                    let slot = &mut channels[c].slots[slot_idx];
                    slot.amon = v & 0x80 != 0;
                    slot.ams = if slot.amon { ams } else { 0 };
                }
            }
            0x70 => channels[c].slots[slot_idx].set_sr(v, &self.st.dr_table),
            0x80 => channels[c].slots[slot_idx].set_sl_rr(v, &self.st.dr_table),
            0x90 => channels[c].slots[slot_idx].seg = v & 0x0f,
            0xa0 => match (r >> 2) & 3 {
                0 => {
                    // fnum low: latch the full frequency
                    let ch = &mut channels[c];
                    let fnum = (((ch.fn_h & 7) as u32) << 8) + v as u32;
                    let blk = ch.fn_h >> 3;
                    ch.kcode = (blk << 2) | OPN_FKTABLE[(fnum >> 7) as usize];
                    ch.fc = (self.fn_table[fnum as usize] >> (7 - blk)) as i32;
                    ch.freq_dirty = true;
                }
                1 => channels[c].fn_h = v & 0x3f,
                2 => {
                    // channel-3 per-slot fnum low
                    if r < 0x100 {
                        let fnum = (((self.sl3.fn_h[c] & 7) as u32) << 8) + v as u32;
                        let blk = self.sl3.fn_h[c] >> 3;
                        self.sl3.kcode[c] = (blk << 2) | OPN_FKTABLE[(fnum >> 7) as usize];
                        self.sl3.fc[c] = (self.fn_table[fnum as usize] >> (7 - blk)) as i32;
                        channels[2].freq_dirty = true;
                    }
                }
                _ => {
                    if r < 0x100 {
                        self.sl3.fn_h[c] = v & 0x3f;
                    }
                }
            },
            0xb0 => match (r >> 2) & 3 {
                0 => channels[c].set_fb_algo(v),
                1 => {
                    if self.caps.contains(ChipCaps::LFOPAN) {
                        let ch = &mut channels[c];
                        ch.pms = ((1.5 / 1200.0) * PMD_TABLE[(v & 7) as usize]
                            * crate::tables::PMS_RATE as f64) as i32;
                        ch.ams = AMD_TABLE[((v >> 4) & 3) as usize];
                        for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
                            let amon = ch.slots[s].amon;
                            ch.slots[s].ams = if amon { ch.ams } else { 0 };
                        }
                        ch.pan = ((v >> 6) & 0x03) as usize;
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Refresh dirty channel frequencies, honoring 3-slot mode on channel 3
    pub fn refresh_frequencies(&mut self, channels: &mut [FmChannel]) {
        for (i, ch) in channels.iter_mut().enumerate() {
            if i == 2 && (self.st.mode & 0xc0) != 0 {
                if ch.freq_dirty {
                    let (dt, ar, dr) = (&self.st.dt_table, &self.st.ar_table, &self.st.dr_table);
                    ch.slots[SLOT1].calc_fc(self.sl3.fc[1], self.sl3.kcode[1], dt, ar, dr);
                    ch.slots[SLOT2].calc_fc(self.sl3.fc[2], self.sl3.kcode[2], dt, ar, dr);
                    ch.slots[SLOT3].calc_fc(self.sl3.fc[0], self.sl3.kcode[0], dt, ar, dr);
                    let (fc, kc) = (ch.fc, ch.kcode);
                    ch.slots[SLOT4].calc_fc(fc, kc, dt, ar, dr);
                    ch.freq_dirty = false;
                }
            } else {
                ch.calc_fcount(&self.st.dt_table, &self.st.ar_table, &self.st.dr_table);
            }
        }
    }

    /// Shared reset sequence: timers, channels, pans, every operator register
    pub fn reset_registers(&mut self, channels: &mut [FmChannel]) {
        self.st.reset_timers();
        self.write_mode(channels, 0x27, 0x30);
        for ch in channels.iter_mut() {
            ch.reset();
        }
        let second_bank = self.caps.contains(ChipCaps::SIX_CH);
        for r in (0xb4..=0xb6).rev() {
            self.write_reg(channels, r, 0xc0);
            if second_bank {
                self.write_reg(channels, r | 0x100, 0xc0);
            }
        }
        for r in (0x30..=0xb2).rev() {
            self.write_reg(channels, r, 0);
            if second_bank {
                self.write_reg(channels, r | 0x100, 0);
            }
        }
        for r in (0x20..=0x26).rev() {
            self.write_mode(channels, r, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_and_channels() -> (OpnEngine, Vec<FmChannel>) {
        let mut engine = OpnEngine::new(ChipCaps::SSG, 4_000_000, 44_100);
        engine.set_prescaler(72, 72);
        let mut channels = vec![FmChannel::default(); 3];
        engine.reset_registers(&mut channels);
        (engine, channels)
    }

    #[test]
    fn test_fnum_write_sets_frequency() {
        let (mut engine, mut channels) = engine_and_channels();
        engine.write_reg(&mut channels, 0xa4, 0x22); // block 4, fnum high 2
        engine.write_reg(&mut channels, 0xa0, 0x69);
        assert!(channels[0].fc > 0);
        assert!(channels[0].freq_dirty);
        assert_eq!(channels[0].kcode, (4u8 << 2) | OPN_FKTABLE[0x269 >> 7]);
    }

    #[test]
    fn test_key_on_via_mode_register() {
        let (mut engine, mut channels) = engine_and_channels();
        engine.write_reg(&mut channels, 0x50, 0x1f); // ch0 slot1 attack rate
        engine.write_mode(&mut channels, 0x28, 0xf0); // key on all slots, ch 0
        assert!(channels[0].slots[SLOT1].key_is());
        engine.write_mode(&mut channels, 0x28, 0x00);
        assert!(!channels[0].slots[SLOT1].key_is());
    }

    #[test]
    fn test_channel_3_is_skipped() {
        let (mut engine, mut channels) = engine_and_channels();
        // Register c-field 3 decodes to no channel at all
        engine.write_reg(&mut channels, 0xa3, 0xff);
        assert_eq!(channels[0].fc, 0);
    }

    #[test]
    fn test_higher_fnum_gives_higher_increment() {
        let (engine, _) = engine_and_channels();
        assert!(engine.fn_table[2047] > engine.fn_table[100]);
        assert!(engine.fn_table[0] == 0);
    }

    #[test]
    fn test_three_slot_mode_uses_per_slot_frequencies() {
        let (mut engine, mut channels) = engine_and_channels();
        engine.write_mode(&mut channels, 0x27, 0x40); // 3-slot mode
        engine.write_reg(&mut channels, 0xac, 0x1a); // slot fnum high
        engine.write_reg(&mut channels, 0xa8, 0x55); // slot fnum low
        engine.write_reg(&mut channels, 0xa6, 0x1a); // channel 3 fnum high
        engine.write_reg(&mut channels, 0xa2, 0x55); // channel 3 fnum low
        engine.refresh_frequencies(&mut channels);
        // Slot 1 of channel 3 follows the 3-slot table, slot 4 the channel
        assert_eq!(engine.sl3.fc[0], channels[2].fc);
        assert!(channels[2].slots[SLOT1].incr > 0 || channels[2].slots[SLOT4].incr > 0);
    }
}
