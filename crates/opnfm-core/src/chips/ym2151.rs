//! YM2151 (OPM): 8 FM channels, key-code frequency model, DT2, 4-waveform
//! LFO, hardware noise on channel 8 slot 4, CT output port

use crate::channel::{FmChannel, OutputBus};
use crate::lfo::OpmLfo;
use crate::state::{FmState, IrqHandler, Status, SyncHandler, TimerHandler, TimerId};
use crate::tables::{
    fm_tables, AR_RATE, DR_RATE, DT2_TABLE, FREQ_BITS, KC_TO_SEMITONE, SLOT1, SLOT2, SLOT3, SLOT4,
};
use crate::{FmError, Result};

/// Key-code table span: 8 octaves x 12 semitones x 64 fractions, plus DT2
/// headroom (the worst-case `fc + DT2` index)
const KC_TABLE_SIZE: usize = 8 * 12 * 64 + 950 + 64;

/// OPM PM depths in cents
const PMD_TABLE: [i32; 8] = [0, 5, 10, 20, 50, 100, 400, 700];

/// CT0/CT1 output port callback
pub type PortHandler = Box<dyn FnMut(u8) + Send>;

/// YM2151 chip instance
pub struct Ym2151 {
    st: FmState,
    channels: [FmChannel; 8],
    ct: u8,
    noise_cnt: u32,
    noise_incr: u32,
    lfo: OpmLfo,
    kc_table: Box<[u32; KC_TABLE_SIZE]>,
    port_handler: Option<PortHandler>,
}

impl Ym2151 {
    /// Create a chip for a master clock / host sample rate pair
    pub fn new(clock: u32, rate: u32) -> Result<Self> {
        if clock == 0 || rate == 0 {
            return Err(FmError::Config(format!(
                "clock ({clock}) and sample rate ({rate}) must be non-zero"
            )));
        }
        let mut st = FmState::new(clock, rate);
        st.freqbase = (clock as f64 / rate as f64) / 64.0;
        st.timer_base = 64.0 / clock as f64;
        st.set_timer_scale();
        let mut chip = Ym2151 {
            st,
            channels: Default::default(),
            ct: 0,
            noise_cnt: 0,
            noise_incr: 0,
            lfo: OpmLfo::default(),
            kc_table: Box::new([0; KC_TABLE_SIZE]),
            port_handler: None,
        };
        chip.reset();
        Ok(chip)
    }

    /// Install the IRQ line callback
    pub fn set_irq_handler(&mut self, h: IrqHandler) {
        self.st.irq_handler = Some(h);
    }

    /// Install the timer scheduling callback
    pub fn set_timer_handler(&mut self, h: TimerHandler) {
        self.st.timer_handler = Some(h);
    }

    /// Install the pre-write flush callback
    pub fn set_sync_handler(&mut self, h: SyncHandler) {
        self.st.sync_handler = Some(h);
    }

    /// Install the CT0/CT1 port callback
    pub fn set_port_handler(&mut self, h: PortHandler) {
        self.port_handler = Some(h);
    }

    fn build_tables(&mut self) {
        // key code (plus key fraction) -> phase increment;
        // 13.75 Hz is note A 12 semitones below A-0
        let scale = if self.st.rate != 0 {
            (1u64 << FREQ_BITS) as f64 / (3_579_545.0 / self.st.clock as f64 * self.st.rate as f64)
        } else {
            1.0
        };
        for (i, entry) in self.kc_table.iter_mut().enumerate() {
            let hz = 6.875 * 2f64.powf((i as f64 + 4.0 * 64.0) * 1.5625 / 1200.0);
            *entry = (hz * scale) as u32;
        }
        self.st.init_timetables(AR_RATE, DR_RATE);
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.build_tables();
        self.st.reset_timers();
        for ch in &mut self.channels {
            ch.reset();
        }
        self.st.irqmask_set(Status::TIMER_A | Status::TIMER_B);
        self.noise_cnt = 0;
        self.noise_incr = 0;
        self.lfo.reset();
        self.write_reg(0x1b, 0x00);
        for r in (0x20..=0xff).rev() {
            self.write_reg(r, 0);
        }
    }

    /// Bus write: even address latches the register, odd writes data.
    /// Returns the IRQ line level.
    pub fn write(&mut self, a: u8, v: u8) -> bool {
        if a & 1 == 0 {
            self.st.address = v;
        } else {
            self.st.request_sync();
            self.write_reg(self.st.address as u32, v);
        }
        self.st.irq
    }

    /// Status read (odd addresses)
    pub fn read(&self, a: u8) -> u8 {
        if a & 1 == 0 {
            0
        } else {
            self.st.status.bits()
        }
    }

    fn write_reg(&mut self, r: u32, v: u8) {
        let c = (r & 0x07) as usize;
        let slot_idx = ((r >> 3) & 3) as usize;

        match r & 0xe0 {
            0x00 => match r {
                0x01 => self.lfo.write_test(v),
                0x08 => {
                    // key on/off; ignored while CSM drives the keys
                    if self.st.mode & 0x80 != 0 {
                        return;
                    }
                    let ch = &mut self.channels[(v & 0x07) as usize];
                    let t = fm_tables();
                    for (bit, s) in [(0x08u8, SLOT1), (0x10, SLOT2), (0x20, SLOT3), (0x40, SLOT4)] {
                        if v & bit != 0 {
                            ch.slots[s].key_on();
                        } else {
                            ch.slots[s].key_off(t);
                        }
                    }
                }
                0x0f => {
                    // noise enable + frequency (channel 8 slot 4)
                    self.noise_incr = if v & 0x80 != 0 {
                        ((1u64 << FREQ_BITS) as f64 / 65536.0
                            * (v & 0x1f) as f64
                            * self.st.freqbase) as u32
                    } else {
                        0
                    };
                }
                0x10 => self.st.ta = (self.st.ta & 0x03) | ((v as i32) << 2),
                0x11 => self.st.ta = (self.st.ta & 0x3fc) | (v as i32 & 3),
                0x12 => self.st.tb = v,
                0x14 => self.st.set_mode(v),
                0x18 => {
                    let freqbase = self.st.freqbase;
                    self.lfo.set_freq(v, freqbase);
                }
                0x19 => self.lfo.set_depth(v),
                0x1b => {
                    // CT outputs + LFO waveform
                    self.ct = v >> 6;
                    if let Some(h) = &mut self.port_handler {
                        h(self.ct);
                    }
                    self.lfo.set_wave(v);
                }
                _ => {}
            },
            0x20 => match (r >> 3) & 3 {
                0 => {
                    // RL / FB / CON
                    self.channels[c].set_fb_algo(v);
                    self.channels[c].pan = (((v >> 7) & 1) | ((v >> 5) & 2)) as usize;
                }
                1 => {
                    // key code
                    let ch = &mut self.channels[c];
                    let blk = ((v >> 4) & 7) as i32;
                    ch.kcode = (v >> 2) & 0x1f;
                    ch.fc = blk * (12 * 64) + KC_TO_SEMITONE[(v & 0x0f) as usize] + ch.fn_h as i32;
                    ch.freq_dirty = true;
                }
                2 => {
                    // key fraction
                    let ch = &mut self.channels[c];
                    ch.fc -= ch.fn_h as i32;
                    ch.fn_h = v >> 2;
                    ch.fc += ch.fn_h as i32;
                    ch.freq_dirty = true;
                }
                _ => {
                    // PMS / AMS
                    let ch = &mut self.channels[c];
                    ch.ams = 1020 / (1 << (3 - (v & 3)));
                    for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
                        let amon = ch.slots[s].amon;
                        ch.slots[s].ams = if amon { ch.ams } else { 0 };
                    }
                    ch.pms =
                        ((1.5 / 1200.0) * PMD_TABLE[((v >> 4) & 7) as usize] as f64 * 1024.0) as i32;
                }
            },
            0x40 => {
                self.channels[c].slots[slot_idx].set_det_mul(v);
                self.channels[c].freq_dirty = true;
            }
            0x60 => {
                let csm = self.st.mode & 0x80 != 0;
                self.channels[c].slots[slot_idx].set_tl(v, csm);
            }
            0x80 => {
                self.channels[c].slots[slot_idx].set_ar_ksr(v, &self.st.ar_table);
                self.channels[c].freq_dirty = true;
            }
            0xa0 => {
                self.channels[c].slots[slot_idx].set_dr(v, &self.st.dr_table);
                let ams = self.channels[c].ams;
                let slot = &mut self.channels[c].slots[slot_idx];
                slot.amon = v & 0x80 != 0;
                slot.ams = if slot.amon { ams } else { 0 };
            }
            0xc0 => {
                self.channels[c].slots[slot_idx].dt2 = DT2_TABLE[(v >> 6) as usize];
                self.channels[c].freq_dirty = true;
                self.channels[c].slots[slot_idx].set_sr(v, &self.st.dr_table);
            }
            0xe0 => self.channels[c].slots[slot_idx].set_sl_rr(v, &self.st.dr_table),
            _ => {}
        }
    }

    fn refresh_frequencies(&mut self) {
        for ch in &mut self.channels {
            if ch.freq_dirty {
                let kc = ch.kcode;
                for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
                    let fc = self.kc_table[(ch.fc + ch.slots[s].dt2) as usize] as i32;
                    ch.slots[s].calc_fc(fc, kc, &self.st.dt_table, &self.st.ar_table, &self.st.dr_table);
                }
                ch.freq_dirty = false;
            }
        }
    }

    /// Host-scheduled timer expiry; returns the IRQ line level
    pub fn timer_over(&mut self, timer: TimerId) -> bool {
        match timer {
            TimerId::B => self.st.timer_b_over(),
            TimerId::A => {
                self.st.request_sync();
                self.st.timer_a_over();
                if self.st.mode & 0x80 != 0 {
                    for ch in &mut self.channels {
                        ch.csm_key_control();
                    }
                }
            }
        }
        self.st.irq
    }

    /// Render stereo samples
    pub fn update(&mut self, left: &mut [i16], right: &mut [i16]) {
        let t = fm_tables();
        self.refresh_frequencies();

        let mut bus = OutputBus::default();
        for i in 0..left.len().min(right.len()) {
            let lfo = self.lfo.tick();
            bus.clear();
            for ch in &mut self.channels[..7] {
                ch.calc(t, lfo, &mut bus);
            }
            // channel 8 slot 4 switches to the noise table when enabled
            let noise = if self.noise_incr != 0 {
                self.noise_cnt = self.noise_cnt.wrapping_add(self.noise_incr);
                Some(self.noise_cnt as i32)
            } else {
                None
            };
            self.channels[7].calc_noise(t, lfo, &mut bus, noise);
            let (l, r) = bus.stereo();
            left[i] = l;
            right[i] = r;
            if self.st.internal_timer_a() && self.st.mode & 0x80 != 0 {
                for ch in &mut self.channels {
                    ch.csm_key_control();
                }
            }
        }
        self.st.internal_timer_b(left.len());
    }
}

impl std::fmt::Debug for Ym2151 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym2151")
            .field("st", &self.st)
            .field("ct", &self.ct)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_on(chip: &mut Ym2151, ch: u8) {
        chip.write(0, 0x20 + ch);
        chip.write(1, 0xc7); // both speakers, algorithm 7
        for slot in 0..4u8 {
            chip.write(0, 0x60 + slot * 8 + ch);
            chip.write(1, 0x00); // TL 0
            chip.write(0, 0x80 + slot * 8 + ch);
            chip.write(1, 0x1f); // AR max
        }
        chip.write(0, 0x28 + ch);
        chip.write(1, 0x4a); // octave 4, note A
        chip.write(0, 0x08);
        chip.write(1, 0x78 | ch); // key on all slots
    }

    #[test]
    fn test_reset_is_silent() {
        let mut chip = Ym2151::new(3_579_545, 44_100).unwrap();
        let mut l = [0i16; 512];
        let mut r = [0i16; 512];
        chip.update(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0));
        assert!(r.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_voice_produces_sound_on_both_sides() {
        let mut chip = Ym2151::new(3_579_545, 44_100).unwrap();
        voice_on(&mut chip, 0);
        let mut l = [0i16; 1024];
        let mut r = [0i16; 1024];
        chip.update(&mut l, &mut r);
        assert!(l.iter().any(|&s| s != 0));
        assert!(r.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_kc_table_headroom_covers_dt2() {
        let mut chip = Ym2151::new(3_579_545, 44_100).unwrap();
        // worst case: block 7, note 15, max key fraction, DT2=3
        chip.write(0, 0x28);
        chip.write(1, 0x7f);
        chip.write(0, 0x30);
        chip.write(1, 0xff);
        chip.write(0, 0xc0);
        chip.write(1, 0xc0);
        let mut l = [0i16; 16];
        let mut r = [0i16; 16];
        chip.update(&mut l, &mut r); // must not panic on table lookup
    }

    #[test]
    fn test_ct_port_callback() {
        let mut chip = Ym2151::new(3_579_545, 44_100).unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        chip.set_port_handler(Box::new(move |ct| log.lock().unwrap().push(ct)));
        chip.write(0, 0x1b);
        chip.write(1, 0xc0);
        assert_eq!(seen.lock().unwrap().last(), Some(&3));
    }

    #[test]
    fn test_noise_mode_changes_channel_8() {
        let mut chip_a = Ym2151::new(3_579_545, 44_100).unwrap();
        let mut chip_b = Ym2151::new(3_579_545, 44_100).unwrap();
        voice_on(&mut chip_a, 7);
        voice_on(&mut chip_b, 7);
        chip_b.write(0, 0x0f);
        chip_b.write(1, 0x9f); // noise enabled, max frequency
        let mut la = [0i16; 512];
        let mut ra = [0i16; 512];
        let mut lb = [0i16; 512];
        let mut rb = [0i16; 512];
        chip_a.update(&mut la, &mut ra);
        chip_b.update(&mut lb, &mut rb);
        assert_ne!(la, lb, "noise mode must alter channel 8 output");
    }
}
