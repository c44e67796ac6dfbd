//! YM2612 (OPN2): 6 FM channels, LFO, stereo, channel-6 DAC

use crate::channel::{FmChannel, OutputBus};
use crate::opn::{ChipCaps, OpnEngine};
use crate::state::{IrqHandler, Status, SyncHandler, TimerHandler, TimerId};
use crate::tables::{fm_tables, TL_BITS};
use crate::{FmError, Result};

/// YM2612 chip instance
pub struct Ym2612 {
    engine: OpnEngine,
    channels: [FmChannel; 6],
    address1: u8,
    dac_enabled: bool,
    dac_out: i32,
}

impl Ym2612 {
    /// Create a chip for a master clock / host sample rate pair
    pub fn new(clock: u32, rate: u32) -> Result<Self> {
        if clock == 0 || rate == 0 {
            return Err(FmError::Config(format!(
                "clock ({clock}) and sample rate ({rate}) must be non-zero"
            )));
        }
        let mut chip = Ym2612 {
            engine: OpnEngine::new(
                ChipCaps::SIX_CH | ChipCaps::LFOPAN | ChipCaps::DAC,
                clock,
                rate,
            ),
            channels: Default::default(),
            address1: 0,
            dac_enabled: false,
            dac_out: 0,
        };
        chip.reset();
        Ok(chip)
    }

    /// Install the IRQ line callback
    pub fn set_irq_handler(&mut self, h: IrqHandler) {
        self.engine.st.irq_handler = Some(h);
    }

    /// Install the timer scheduling callback
    pub fn set_timer_handler(&mut self, h: TimerHandler) {
        self.engine.st.timer_handler = Some(h);
    }

    /// Install the pre-write flush callback
    pub fn set_sync_handler(&mut self, h: SyncHandler) {
        self.engine.st.sync_handler = Some(h);
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.engine.set_prescaler(12 * 12, 12 * 12);
        self.engine.st.irqmask_set(Status::TIMER_A | Status::TIMER_B);
        self.engine.reset_registers(&mut self.channels);
        self.dac_enabled = false;
        self.dac_out = 0;
    }

    /// Bus write over the four-port map; returns the IRQ line level
    pub fn write(&mut self, a: u8, v: u8) -> bool {
        match a & 3 {
            0 => self.engine.st.address = v,
            1 => {
                let addr = self.engine.st.address as u32;
                match addr {
                    0x2a => {
                        // DAC data
                        self.engine.st.request_sync();
                        self.dac_out = ((v as i32) - 0x80) << (TL_BITS - 7);
                    }
                    0x2b => self.dac_enabled = v & 0x80 != 0,
                    0x20..=0x2f => {
                        self.engine.st.request_sync();
                        self.engine.write_mode(&mut self.channels, addr, v);
                    }
                    _ => {
                        self.engine.st.request_sync();
                        self.engine.write_reg(&mut self.channels, addr, v);
                    }
                }
            }
            2 => self.address1 = v,
            _ => {
                let addr = self.address1 as u32;
                self.engine.st.request_sync();
                self.engine.write_reg(&mut self.channels, addr | 0x100, v);
            }
        }
        self.engine.st.irq
    }

    /// Status read (every port mirrors the status byte)
    pub fn read(&self, _a: u8) -> u8 {
        self.engine.st.status.bits()
    }

    /// Host-scheduled timer expiry; returns the IRQ line level
    pub fn timer_over(&mut self, timer: TimerId) -> bool {
        match timer {
            TimerId::B => self.engine.st.timer_b_over(),
            TimerId::A => {
                self.engine.st.request_sync();
                self.engine.st.timer_a_over();
                if self.engine.st.mode & 0x80 != 0 {
                    self.channels[2].csm_key_control();
                }
            }
        }
        self.engine.st.irq
    }

    /// Render stereo samples
    pub fn update(&mut self, left: &mut [i16], right: &mut [i16]) {
        let t = fm_tables();
        self.engine.refresh_frequencies(&mut self.channels);

        // DAC replaces channel 6 entirely
        let fm_channels = if self.dac_enabled { 5 } else { 6 };
        let mut bus = OutputBus::default();
        for i in 0..left.len().min(right.len()) {
            let lfo = self.engine.lfo.tick();
            bus.clear();
            for ch in self.channels[..fm_channels].iter_mut() {
                ch.calc(t, lfo, &mut bus);
            }
            if self.dac_enabled {
                bus.out[self.channels[5].pan] += self.dac_out;
            }
            let (l, r) = bus.stereo();
            left[i] = l;
            right[i] = r;
            if self.engine.st.internal_timer_a() && self.engine.st.mode & 0x80 != 0 {
                self.channels[2].csm_key_control();
            }
        }
        self.engine.st.internal_timer_b(left.len());
    }
}

impl std::fmt::Debug for Ym2612 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym2612")
            .field("st", &self.engine.st)
            .field("dac_enabled", &self.dac_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_silent() {
        let mut chip = Ym2612::new(7_670_448, 44_100).unwrap();
        let mut l = [0i16; 512];
        let mut r = [0i16; 512];
        chip.update(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0));
        assert!(r.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_dac_replaces_channel_six() {
        let mut chip = Ym2612::new(7_670_448, 44_100).unwrap();
        chip.write(2, 0xb6); // channel 6 pan: both
        chip.write(3, 0xc0);
        chip.write(0, 0x2b);
        chip.write(1, 0x80); // DAC on
        chip.write(0, 0x2a);
        chip.write(1, 0xff); // full positive
        let mut l = [0i16; 16];
        let mut r = [0i16; 16];
        chip.update(&mut l, &mut r);
        assert!(l.iter().all(|&s| s > 0));
        assert_eq!(l, r);
    }

    #[test]
    fn test_second_bank_reaches_channels_4_to_6() {
        let mut chip = Ym2612::new(7_670_448, 44_100).unwrap();
        chip.write(2, 0xa5); // channel 5 fnum high via bank 1
        chip.write(3, 0x22);
        chip.write(2, 0xa1);
        chip.write(3, 0x69);
        // keying channel 5 (0x28 code 5 = 0b101)
        chip.write(0, 0x28);
        chip.write(1, 0xf5);
        let mut l = [0i16; 4];
        let mut r = [0i16; 4];
        chip.update(&mut l, &mut r); // must not panic on bank decode
    }
}
