//! FM channel: four slots wired by one of eight algorithms
//!
//! The per-sample helper takes the output bus explicitly; there is no shared
//! scratch state between channels or chips.

use crate::slot::FmSlot;
use crate::tables::{FmTables, EG_CUT_OFF, FM_MAXOUT, FM_MINOUT, FM_OUTSB, LFO_RATE, PMS_RATE};
use crate::tables::{SLOT1, SLOT2, SLOT3, SLOT4};

/// Output bus indexes (2-bit pan mask values)
pub const OUT_NONE: usize = 0;
/// Right-only bus
pub const OUT_RIGHT: usize = 1;
/// Left-only bus
pub const OUT_LEFT: usize = 2;
/// Center bus, mixed into both sides
pub const OUT_CENTER: usize = 3;

/// Per-sample output accumulators, one per pan target
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputBus {
    /// none / right / left / center accumulators
    pub out: [i32; 4],
}

impl OutputBus {
    /// Zero all accumulators for the next sample
    #[inline]
    pub fn clear(&mut self) {
        self.out = [0; 4];
    }

    /// Fold the center bus into both sides, clip, and shift to 16-bit
    #[inline]
    pub fn stereo(&self) -> (i16, i16) {
        let left = (self.out[OUT_LEFT] + self.out[OUT_CENTER]).clamp(FM_MINOUT, FM_MAXOUT);
        let right = (self.out[OUT_RIGHT] + self.out[OUT_CENTER]).clamp(FM_MINOUT, FM_MAXOUT);
        ((left >> FM_OUTSB) as i16, (right >> FM_OUTSB) as i16)
    }

    /// Center bus only, clipped and shifted (mono chips)
    #[inline]
    pub fn mono(&self) -> i16 {
        (self.out[OUT_CENTER].clamp(FM_MINOUT, FM_MAXOUT) >> FM_OUTSB) as i16
    }
}

/// Where a slot's output goes for the current algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOut {
    /// Modulate slot 2
    In2,
    /// Modulate slot 3
    In3,
    /// Modulate slot 4
    In4,
    /// Carrier: add to the channel's pan bus
    Bus,
    /// Algorithm 5: slot 1 modulates slots 2, 3 and 4 at once
    Fan,
}

/// LFO depths for the current sample
#[derive(Clone, Copy, Debug, Default)]
pub struct LfoOut {
    /// Amplitude depth
    pub amd: i32,
    /// Pitch depth (signed)
    pub pmd: i32,
}

/// One FM channel
#[derive(Clone, Debug)]
pub struct FmChannel {
    /// The four operators, in hardware slot order
    pub slots: [FmSlot; 4],
    /// Pan bus index
    pub pan: usize,
    /// Algorithm 0-7
    pub algo: u8,
    /// Self-feedback shift (0 disables)
    pub fb: u8,
    /// Slot-1 output history for feedback
    pub op1_out: [i32; 2],
    /// Connection targets per logical slot (slot 4 is always a carrier)
    pub conn: [SlotOut; 4],
    /// Pitch-modulation depth
    pub pms: i32,
    /// Amplitude-modulation depth
    pub ams: i32,
    /// Frequency value (model-specific: OPN increment base, OPM table index)
    pub fc: i32,
    /// Frequency latch (OPN: blk/fnum high; OPM: key fraction)
    pub fn_h: u8,
    /// Key code for key scaling
    pub kcode: u8,
    /// Phase increments need recomputation
    pub freq_dirty: bool,
}

impl Default for FmChannel {
    fn default() -> Self {
        FmChannel {
            slots: Default::default(),
            pan: OUT_CENTER,
            algo: 0,
            fb: 0,
            op1_out: [0; 2],
            conn: [SlotOut::In2, SlotOut::In3, SlotOut::In4, SlotOut::Bus],
            pms: 0,
            ams: 0,
            fc: 0,
            fn_h: 0,
            kcode: 0,
            freq_dirty: true,
        }
    }
}

impl FmChannel {
    /// Rebuild the connection targets from the algorithm
    pub fn setup_connection(&mut self) {
        use SlotOut::*;
        self.conn = match self.algo & 7 {
            0 => [In2, In3, In4, Bus], // S1-S2-S3-S4 chain
            1 => [In3, In3, In4, Bus], // (S1+S2)-S3-S4
            2 => [In4, In3, In4, Bus], // S1 + (S2-S3) into S4
            3 => [In2, In4, In4, Bus], // (S1-S2) + S3 into S4
            4 => [In2, Bus, In4, Bus], // two serial pairs
            5 => [Fan, Bus, Bus, Bus], // S1 fans into S2/S3/S4
            6 => [In2, Bus, Bus, Bus], // S1-S2 plus parallel S3, S4
            _ => [Bus, Bus, Bus, Bus], // all parallel
        };
    }

    /// Feedback/algorithm register value
    pub fn set_fb_algo(&mut self, v: u8) {
        let feedback = (v >> 3) & 7;
        self.algo = v & 7;
        self.fb = if feedback != 0 { 8 + 1 - feedback } else { 0 };
        self.setup_connection();
    }

    /// Refresh the four slots' increments from the channel frequency (OPN
    /// model; the OPM chip feeds per-slot table values itself)
    pub fn calc_fcount(&mut self, dt: &[[i32; 32]; 8], ar: &[i32; 94], dr: &[i32; 94]) {
        if self.freq_dirty {
            let fc = self.fc;
            let kc = self.kcode;
            for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
                self.slots[s].calc_fc(fc, kc, dt, ar, dr);
            }
            self.freq_dirty = false;
        }
    }

    /// CSM auto key-on: latch total levels, then key all four slots
    pub fn csm_key_control(&mut self) {
        for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
            self.slots[s].tll = self.slots[s].tl;
        }
        for s in [SLOT1, SLOT2, SLOT3, SLOT4] {
            self.slots[s].key_on();
        }
    }

    /// Advance the phase accumulators, returning the four phase inputs
    #[inline]
    fn advance_phases(&mut self, lfo: LfoOut) -> [i32; 4] {
        let pms = if self.pms != 0 {
            lfo.pmd * self.pms / LFO_RATE
        } else {
            0
        };
        let mut pg = [0i32; 4];
        for (i, s) in [SLOT1, SLOT2, SLOT3, SLOT4].into_iter().enumerate() {
            let slot = &mut self.slots[s];
            let incr = if pms != 0 {
                let adj = (pms as i64 * slot.incr as i64 / PMS_RATE as i64) as i32;
                slot.incr.wrapping_add(adj as u32)
            } else {
                slot.incr
            };
            slot.cnt = slot.cnt.wrapping_add(incr);
            pg[i] = slot.cnt as i32;
        }
        pg
    }

    /// Compute one sample of this channel into the bus
    pub fn calc(&mut self, t: &FmTables, lfo: LfoOut, bus: &mut OutputBus) {
        self.calc_internal(t, lfo, bus, None)
    }

    /// OPM channel 8: slot 4 reads the hardware-noise table when enabled
    pub fn calc_noise(
        &mut self,
        t: &FmTables,
        lfo: LfoOut,
        bus: &mut OutputBus,
        noise_phase: Option<i32>,
    ) {
        self.calc_internal(t, lfo, bus, noise_phase)
    }

    #[inline]
    fn calc_internal(
        &mut self,
        t: &FmTables,
        lfo: LfoOut,
        bus: &mut OutputBus,
        noise_phase: Option<i32>,
    ) {
        let mut pg = self.advance_phases(lfo);

        let eg1 = self.slots[SLOT1].calc_eg(t, lfo.amd);
        let eg2 = self.slots[SLOT2].calc_eg(t, lfo.amd);
        let eg3 = self.slots[SLOT3].calc_eg(t, lfo.amd);
        let eg4 = self.slots[SLOT4].calc_eg(t, lfo.amd);

        // Slot 1, with self-feedback
        if eg1 < EG_CUT_OFF {
            if self.fb != 0 {
                pg[0] = pg[0].wrapping_add((self.op1_out[0] + self.op1_out[1]) >> self.fb);
                self.op1_out[1] = self.op1_out[0];
            }
            self.op1_out[0] = t.op_out(pg[0], eg1);
            let o = self.op1_out[0];
            match self.conn[0] {
                SlotOut::Fan => {
                    pg[1] = pg[1].wrapping_add(o);
                    pg[2] = pg[2].wrapping_add(o);
                    pg[3] = pg[3].wrapping_add(o);
                }
                SlotOut::In2 => pg[1] = pg[1].wrapping_add(o),
                SlotOut::In3 => pg[2] = pg[2].wrapping_add(o),
                SlotOut::In4 => pg[3] = pg[3].wrapping_add(o),
                SlotOut::Bus => bus.out[self.pan] += o,
            }
        }
        // Slot 2
        if eg2 < EG_CUT_OFF {
            let o = t.op_out(pg[1], eg2);
            match self.conn[1] {
                SlotOut::In3 => pg[2] = pg[2].wrapping_add(o),
                SlotOut::In4 => pg[3] = pg[3].wrapping_add(o),
                SlotOut::Bus => bus.out[self.pan] += o,
                _ => unreachable!(),
            }
        }
        // Slot 3
        if eg3 < EG_CUT_OFF {
            let o = t.op_out(pg[2], eg3);
            match self.conn[2] {
                SlotOut::In4 => pg[3] = pg[3].wrapping_add(o),
                SlotOut::Bus => bus.out[self.pan] += o,
                _ => unreachable!(),
            }
        }
        // Slot 4, always a carrier
        if let Some(noise) = noise_phase {
            if eg4 < EG_CUT_OFF {
                bus.out[self.pan] += t.op_out_noise(noise, eg4);
            }
        } else if eg4 < EG_CUT_OFF {
            bus.out[self.pan] += t.op_out(pg[3], eg4);
        }
    }

    /// Reset to a silent key-off state
    pub fn reset(&mut self) {
        self.fc = 0;
        self.pan = OUT_CENTER;
        self.op1_out = [0; 2];
        self.freq_dirty = true;
        for slot in &mut self.slots {
            slot.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::fm_tables;

    #[test]
    fn test_connection_tables() {
        let mut ch = FmChannel::default();
        ch.set_fb_algo(7); // all-parallel
        assert_eq!(ch.conn, [SlotOut::Bus; 4]);
        assert_eq!(ch.fb, 0);

        ch.set_fb_algo(0x38); // algorithm 0, max feedback
        assert_eq!(
            ch.conn,
            [SlotOut::In2, SlotOut::In3, SlotOut::In4, SlotOut::Bus]
        );
        assert_eq!(ch.fb, 2); // 9 - 7
    }

    #[test]
    fn test_silent_channel_contributes_nothing() {
        let t = fm_tables();
        let mut ch = FmChannel::default();
        ch.set_fb_algo(7);
        let mut bus = OutputBus::default();
        for _ in 0..64 {
            bus.clear();
            ch.calc(t, LfoOut::default(), &mut bus);
            assert_eq!(bus.out, [0; 4]);
        }
    }

    #[test]
    fn test_bus_stereo_folds_center() {
        let mut bus = OutputBus::default();
        bus.out[OUT_CENTER] = 1 << FM_OUTSB;
        bus.out[OUT_LEFT] = 1 << FM_OUTSB;
        let (l, r) = bus.stereo();
        assert_eq!(l, 2);
        assert_eq!(r, 1);
    }

    #[test]
    fn test_bus_clips_at_limits() {
        let mut bus = OutputBus::default();
        bus.out[OUT_CENTER] = i32::MAX / 2;
        bus.out[OUT_LEFT] = i32::MAX / 2;
        let (l, _) = bus.stereo();
        assert_eq!(l, (FM_MAXOUT >> FM_OUTSB) as i16);
    }
}
