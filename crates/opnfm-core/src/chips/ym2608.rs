//! YM2608 (OPNA): 6 FM channels, LFO, stereo, SSG, 6 rhythm PCM voices and
//! one Delta-T ADPCM voice

use std::sync::Arc;

use ssgpsg::{SsgKind, SsgPsg};

use crate::adpcma::{AdpcmAUnit, AdpcmMode};
use crate::channel::{FmChannel, OutputBus};
use crate::deltat::DeltaT;
use crate::opn::{ChipCaps, OpnEngine};
use crate::state::{IrqHandler, Status, SyncHandler, TimerHandler, TimerId};
use crate::tables::{fm_tables, TL_BITS};
use crate::{FmError, Result};

/// Delta-T mixing level within the chip output range
const DELTAT_MIXING_LEVEL: i32 = 4;

/// YM2608 chip instance
pub struct Ym2608 {
    engine: OpnEngine,
    channels: [FmChannel; 6],
    ssg: SsgPsg,
    rhythm: AdpcmAUnit,
    deltat: DeltaT,
    address1: u8,
}

impl Ym2608 {
    /// Create a chip for a master clock / host sample rate pair
    pub fn new(clock: u32, rate: u32) -> Result<Self> {
        if clock == 0 || rate == 0 {
            return Err(FmError::Config(format!(
                "clock ({clock}) and sample rate ({rate}) must be non-zero"
            )));
        }
        let ssg = SsgPsg::new(SsgKind::Ym2149, clock * 2 / 8, rate)
            .map_err(|e| FmError::Config(e.to_string()))?;
        let mut chip = Ym2608 {
            engine: OpnEngine::new(
                ChipCaps::SSG | ChipCaps::LFOPAN | ChipCaps::SIX_CH | ChipCaps::ADPCM,
                clock,
                rate,
            ),
            channels: Default::default(),
            ssg,
            rhythm: AdpcmAUnit::new(AdpcmMode::Pcm16, None),
            deltat: DeltaT::new(5, DELTAT_MIXING_LEVEL << TL_BITS),
            address1: 0,
        };
        chip.reset();
        Ok(chip)
    }

    /// Attach the rhythm PCM memory with its six start/end voice positions
    /// (16-bit sample offsets)
    pub fn attach_rhythm_rom(&mut self, rom: Arc<[u8]>, positions: [(u32, u32); 6]) {
        self.rhythm.attach_rom(rom);
        self.rhythm.set_fixed_positions(positions);
    }

    /// Attach the Delta-T sample memory
    pub fn attach_deltat_rom(&mut self, rom: Arc<[u8]>) {
        self.deltat.attach_rom(rom);
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

    /// Access the SSG section directly
    pub fn ssg(&mut self) -> &mut SsgPsg {
        &mut self.ssg
    }

    fn set_prescaler(&mut self, pres: u32, timer_pres: u32, ssg_pres: u32) {
        self.engine.set_prescaler(pres, timer_pres);
        self.ssg.set_clock(self.engine.st.clock * 2 / ssg_pres);
        self.deltat.freqbase = self.engine.st.freqbase;
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.set_prescaler(6 * 24, 6 * 24, 8);
        self.ssg.reset();
        self.engine.st.irqmask_set(Status::from_bits_truncate(0x1f));
        self.engine.reset_registers(&mut self.channels);
        self.rhythm.reset();
        self.deltat.reset();
        self.deltat.freqbase = self.engine.st.freqbase;
        self.deltat.flag_mask = 0x01;
    }

    /// Bus write over the four-port map; returns the IRQ line level
    pub fn write(&mut self, a: u8, v: u8) -> bool {
        match a & 3 {
            0 => {
                self.engine.st.address = v;
                if v < 16 {
                    self.ssg.write_port(0, v);
                }
                match v {
                    0x2d => self.set_prescaler(6 * 24, 6 * 24, 8),
                    0x2e => self.set_prescaler(3 * 24, 3 * 24, 4),
                    0x2f => self.set_prescaler(2 * 24, 2 * 24, 2),
                    _ => {}
                }
            }
            1 => {
                let addr = self.engine.st.address as u32;
                match addr & 0xf0 {
                    0x00 => self.ssg.write_register(addr as u8, v),
                    0x10 => {
                        // rhythm section
                        self.engine.st.request_sync();
                        let freqbase = self.engine.st.freqbase;
                        self.rhythm.write(fm_tables(), addr - 0x10, v, freqbase);
                    }
                    0x20 => match addr {
                        0x29 => {
                            // SCH + IRQ enable bits
                            if v & 0x80 != 0 {
                                self.engine.caps |= ChipCaps::SIX_CH;
                            } else {
                                self.engine.caps &= !ChipCaps::SIX_CH;
                            }
                            self.engine
                                .st
                                .irqmask_set(Status::from_bits_truncate(v & 0x1f));
                        }
                        _ => {
                            self.engine.st.request_sync();
                            self.engine.write_mode(&mut self.channels, addr, v);
                        }
                    },
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
                match addr & 0xf0 {
                    0x00 => match addr {
                        // limit/DAC/data ports: playback-only, ignored
                        0x0c..=0x0f => {}
                        _ => self.deltat.write(addr, v),
                    },
                    0x10 => {
                        if addr == 0x10 && v & 0x80 != 0 {
                            // IRQ flag reset
                            self.engine.st.status_reset(Status::all());
                        }
                    }
                    _ => self.engine.write_reg(&mut self.channels, addr | 0x100, v),
                }
            }
        }
        self.engine.st.irq
    }

    /// Bus read over the four-port map
    pub fn read(&self, a: u8) -> u8 {
        let addr = self.engine.st.address;
        match a & 3 {
            0 => {
                // YM2203-compatible status
                if addr == 0xff {
                    0x00 // ID code
                } else {
                    self.engine.st.status.bits() & 0x83
                }
            }
            1 => {
                if addr < 16 {
                    self.ssg.read_register(addr)
                } else {
                    0
                }
            }
            2 => {
                if addr == 0xff {
                    0x00
                } else {
                    let busy = if self.deltat.playing() { 0x20 } else { 0 };
                    self.engine.st.status.bits() | busy
                }
            }
            _ => 0,
        }
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
        self.deltat.arrived = 0;
        self.engine.refresh_frequencies(&mut self.channels);

        let mut bus = OutputBus::default();
        for i in 0..left.len().min(right.len()) {
            let lfo = self.engine.lfo.tick();
            bus.clear();
            if self.deltat.playing() {
                self.deltat.calc(&mut bus);
            }
            for ch in &mut self.channels {
                ch.calc(t, lfo, &mut bus);
            }
            self.rhythm.calc(&mut bus);
            let (l, r) = bus.stereo();
            left[i] = l;
            right[i] = r;
            if self.engine.st.internal_timer_a() && self.engine.st.mode & 0x80 != 0 {
                self.channels[2].csm_key_control();
            }
        }
        self.engine.st.internal_timer_b(left.len());
        if self.deltat.arrived != 0 {
            self.engine.st.status_set(Status::EOS);
        }
    }

    /// Render SSG samples (the SSG section has its own output stream)
    pub fn update_ssg(&mut self, buffer: &mut [i16]) {
        self.ssg.update(buffer);
    }
}

impl std::fmt::Debug for Ym2608 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym2608").field("st", &self.engine.st).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_silent() {
        let mut chip = Ym2608::new(8_000_000, 44_100).unwrap();
        let mut l = [0i16; 512];
        let mut r = [0i16; 512];
        chip.update(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0));
        assert!(r.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_rhythm_voice_plays_pcm() {
        let mut chip = Ym2608::new(8_000_000, 44_100).unwrap();
        // Constant-positive PCM for voice 0
        let pcm: Vec<u8> = (0..256i16).flat_map(|_| 4000i16.to_le_bytes()).collect();
        chip.attach_rhythm_rom(Arc::from(pcm.into_boxed_slice()), [(0, 255); 6]);
        chip.write(0, 0x11);
        chip.write(1, 0x3f); // rhythm total level
        chip.write(0, 0x18);
        chip.write(1, 0xdf); // voice 0 pan + IL
        chip.write(0, 0x10);
        chip.write(1, 0x01); // key on voice 0
        let mut l = [0i16; 256];
        let mut r = [0i16; 256];
        chip.update(&mut l, &mut r);
        assert!(l.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_deltat_end_raises_eos_status() {
        let mut chip = Ym2608::new(8_000_000, 44_100).unwrap();
        chip.attach_deltat_rom(Arc::from(vec![0x11u8; 64].into_boxed_slice()));
        chip.write(2, 0x02);
        chip.write(3, 0x00); // start 0
        chip.write(2, 0x04);
        chip.write(3, 0x01); // end: one 32-byte unit
        chip.write(2, 0x0a);
        chip.write(3, 0x20); // delta-N high
        chip.write(2, 0x0b);
        chip.write(3, 0xff); // level
        chip.write(2, 0x00);
        chip.write(3, 0x80); // start playback
        let mut l = [0i16; 4096];
        let mut r = [0i16; 4096];
        chip.update(&mut l, &mut r);
        assert!(chip.read(2) & 0x04 != 0, "EOS must be flagged");
    }
}
