//! AY-3-8910 / YM2149 PSG core
//!
//! The internal state machine runs at the master clock divided by 8 (nothing
//! inside the chip toggles faster) and is resampled to the host rate by
//! accumulating host-rate steps per internal tick. Register writes apply
//! between host samples; period writes leave the in-flight counters alone.

use crate::generators::{EnvelopeGenerator, NoiseGenerator, ToneGenerator, NUM_CHANNELS};
use crate::tables::{volume_level, MASKS, REG_MASK};
use crate::{Result, SsgError};

const DC_HISTORY_BITS: usize = 11; // 2048 samples (~46ms at 44.1kHz)
const DC_HISTORY_SIZE: usize = 1 << DC_HISTORY_BITS;

/// Simple LCG used for the unpredictable power-on edge state
fn lcg_rand(seed: &mut u32) -> u16 {
    *seed = seed.wrapping_mul(214013).wrapping_add(2531011);
    ((*seed >> 16) & 0x7fff) as u16
}

/// PSG hardware variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SsgKind {
    /// General Instrument AY-3-8910: 16-level envelope (3 dB ladder)
    Ay8910,
    /// Yamaha YM2149 and the SSG section of the OPN chips: 32-level
    /// envelope (1.5 dB ladder)
    Ym2149,
}

/// AY-3-8910-family programmable sound generator
#[derive(Clone)]
pub struct SsgPsg {
    kind: SsgKind,
    regs: [u8; 14],
    selected_reg: usize,

    clock_eighth: u32,
    sample_rate: u32,
    inner_cycle: u32,

    tones: [ToneGenerator; NUM_CHANNELS],
    noise: NoiseGenerator,
    envelope: EnvelopeGenerator,

    tone_mask: u32,
    noise_mask: u32,

    dc_buffer: Box<[u16; DC_HISTORY_SIZE]>,
    dc_pos: usize,
    dc_sum: u32,
}

impl SsgPsg {
    /// Create a PSG for the given master clock and host sample rate
    pub fn new(kind: SsgKind, clock: u32, sample_rate: u32) -> Result<Self> {
        if clock == 0 || sample_rate == 0 {
            return Err(SsgError::Config(format!(
                "clock ({clock}) and sample rate ({sample_rate}) must be non-zero"
            )));
        }
        let mut chip = Self {
            kind,
            regs: [0; 14],
            selected_reg: 0,
            clock_eighth: clock / 8,
            sample_rate,
            inner_cycle: 0,
            tones: Default::default(),
            noise: NoiseGenerator::new(),
            envelope: EnvelopeGenerator::new(),
            tone_mask: 0,
            noise_mask: 0,
            dc_buffer: Box::new([0; DC_HISTORY_SIZE]),
            dc_pos: 0,
            dc_sum: 0,
        };
        chip.reset();
        Ok(chip)
    }

    /// Hardware variant
    pub fn kind(&self) -> SsgKind {
        self.kind
    }

    /// Retune the master clock (prescaler changes on the host chip)
    pub fn set_clock(&mut self, clock: u32) {
        self.clock_eighth = clock / 8;
    }

    /// Reset to power-on state: all registers cleared except the mixer
    /// (everything disabled), edge state randomized as on hardware
    pub fn reset(&mut self) {
        let mut seed = 1u32;
        let edges = lcg_rand(&mut seed) as u32;
        for (v, tone) in self.tones.iter_mut().enumerate() {
            tone.reset();
            tone.set_output(edges & (1u32 << (v * 5)) != 0);
        }
        self.noise.reset();
        self.envelope.reset();

        for r in 0..14 {
            self.write_register(r, if r == 7 { 0x3f } else { 0 });
        }
        self.selected_reg = 0;
        self.inner_cycle = 0;
        self.dc_pos = 0;
        self.dc_sum = 0;
        self.dc_buffer.fill(0);
    }

    /// Write a register (0-13); don't-care bits are stripped per register
    pub fn write_register(&mut self, reg: u8, value: u8) {
        let reg = reg as usize;
        if reg >= 14 {
            return;
        }
        self.regs[reg] = value & REG_MASK[reg];

        match reg {
            0..=5 => {
                let voice = reg >> 1;
                let period =
                    ((self.regs[voice * 2 + 1] as u32) << 8) | self.regs[voice * 2] as u32;
                self.tones[voice].set_period(period);
            }
            6 => self.noise.set_period(self.regs[6] as u32),
            7 => {
                self.tone_mask = MASKS[(value & 0x07) as usize];
                self.noise_mask = MASKS[((value >> 3) & 0x07) as usize];
            }
            11 | 12 => {
                let period = ((self.regs[12] as u32) << 8) | self.regs[11] as u32;
                self.envelope.set_period(period);
            }
            13 => self.envelope.set_shape(self.regs[13]),
            _ => {}
        }
    }

    /// Read back a register (0-13); invalid addresses return 0
    pub fn read_register(&self, reg: u8) -> u8 {
        self.regs.get(reg as usize).copied().unwrap_or(0)
    }

    /// Bus-style port access: even port latches the address, odd port writes
    /// the selected register
    pub fn write_port(&mut self, port: u8, value: u8) {
        if (port & 1) != 0 {
            self.write_register(self.selected_reg as u8, value);
        } else {
            self.selected_reg = (value as usize) & 0x0f;
        }
    }

    /// Bus-style port read of the selected register
    pub fn read_port(&self) -> u8 {
        self.read_register(self.selected_reg as u8)
    }

    /// Restart the hardware envelope without a shape write
    pub fn trigger_envelope(&mut self) {
        self.envelope.trigger();
    }

    /// One internal tick: advance all generators, return the gate mask
    /// (5 level bits per channel, all-ones where the channel line is high)
    #[inline]
    fn tick(&mut self) -> u32 {
        let mut edges = 0u32;
        for (v, tone) in self.tones.iter_mut().enumerate() {
            tone.tick();
            if tone.output() {
                edges |= 0x1f << (v * 5);
            }
        }
        self.noise.tick();
        let noise_bits = if self.noise.output() { 0x7fff } else { 0 };
        self.envelope.tick();

        (edges | self.tone_mask) & (noise_bits | self.noise_mask)
    }

    /// Subtract the running mean so the summed square waves are zero-centred
    fn dc_adjust(&mut self, v: u16) -> i16 {
        self.dc_sum -= self.dc_buffer[self.dc_pos] as u32;
        self.dc_sum += v as u32;
        self.dc_buffer[self.dc_pos] = v;
        self.dc_pos = (self.dc_pos + 1) & (DC_HISTORY_SIZE - 1);
        ((v as i32) - ((self.dc_sum >> DC_HISTORY_BITS) as i32)) as i16
    }

    /// Produce one host-rate sample, running the internal state machine for
    /// as many ticks as fall inside it
    pub fn compute_next_sample(&mut self) -> i16 {
        let mut high_mask: u32 = 0;
        loop {
            high_mask |= self.tick();
            self.inner_cycle += self.sample_rate;
            if self.inner_cycle >= self.clock_eighth {
                break;
            }
        }
        self.inner_cycle -= self.clock_eighth;

        let mut env_level = self.envelope.level();
        if self.kind == SsgKind::Ay8910 {
            // 16-level envelope: even steps of the 32-level ladder
            env_level &= !1;
        }

        // Pack the three channel level indices, 5 bits each
        let mut levels: u32 = 0;
        for v in 0..NUM_CHANNELS {
            let reg = self.regs[8 + v] as u32;
            let level = if (reg & 0x10) != 0 {
                env_level
            } else {
                reg << 1
            };
            levels |= level << (v * 5);
        }
        levels &= high_mask;

        let mut sum: u32 = 0;
        for (v, tone) in self.tones.iter().enumerate() {
            let index = (levels >> (v * 5)) & 31;
            let level = volume_level(index) as u32;
            sum += if tone.is_half_amplitude() {
                level >> 1
            } else {
                level
            };
        }
        self.dc_adjust(sum as u16)
    }

    /// Render `buffer.len()` host-rate samples
    pub fn update(&mut self, buffer: &mut [i16]) {
        for sample in buffer.iter_mut() {
            *sample = self.compute_next_sample();
        }
    }
}

impl std::fmt::Debug for SsgPsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsgPsg")
            .field("kind", &self.kind)
            .field("regs", &self.regs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip() -> SsgPsg {
        SsgPsg::new(SsgKind::Ym2149, 2_000_000, 44_100).unwrap()
    }

    #[test]
    fn test_rejects_zero_clock() {
        assert!(SsgPsg::new(SsgKind::Ay8910, 0, 44_100).is_err());
        assert!(SsgPsg::new(SsgKind::Ay8910, 2_000_000, 0).is_err());
    }

    #[test]
    fn test_reset_state_is_silent() {
        let mut chip = chip();
        let mut buf = [0i16; 512];
        chip.update(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_register_masks_applied() {
        let mut chip = chip();
        chip.write_register(1, 0xff); // coarse period is 4-bit
        assert_eq!(chip.read_register(1), 0x0f);
        chip.write_register(6, 0xff); // noise period is 5-bit
        assert_eq!(chip.read_register(6), 0x1f);
    }

    #[test]
    fn test_tone_produces_output() {
        let mut chip = chip();
        chip.write_register(0, 0x1c);
        chip.write_register(1, 0x01);
        chip.write_register(8, 0x0f);
        chip.write_register(7, 0x3e); // enable tone A only
        let mut buf = [0i16; 2048];
        chip.update(&mut buf);
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_port_access_latches_address() {
        let mut chip = chip();
        chip.write_port(0, 0x08);
        chip.write_port(1, 0x0f);
        assert_eq!(chip.read_register(8), 0x0f);
        assert_eq!(chip.read_port(), 0x0f);
    }

    #[test]
    fn test_ay_envelope_uses_even_steps() {
        let mut ay = SsgPsg::new(SsgKind::Ay8910, 2_000_000, 44_100).unwrap();
        ay.write_register(11, 0x40);
        ay.write_register(13, 0x0b); // decay then hold high
        ay.write_register(8, 0x10); // envelope mode
        ay.write_register(7, 0x3f);
        // Run past the decay; held level 31 folds to 30 on the AY
        let mut buf = [0i16; 4096];
        ay.update(&mut buf);
        assert!(buf.iter().any(|&s| s != 0));
    }
}
