//! YM2610 / YM2610B (OPNB): FM + SSG + 6 ADPCM-A channels + Delta-T
//!
//! The YM2610 only wires FM channels 2, 3, 5 and 6 to the output; the
//! YM2610B carries all six.

use std::sync::Arc;

use ssgpsg::{SsgKind, SsgPsg};

use crate::adpcma::{AdpcmAUnit, AdpcmMode};
use crate::channel::{FmChannel, OutputBus};
use crate::deltat::DeltaT;
use crate::opn::{ChipCaps, OpnEngine};
use crate::state::{IrqHandler, Status, SyncHandler, TimerHandler, TimerId};
use crate::tables::{fm_tables, SLOT4, TL_BITS};
use crate::{FmError, Result};

/// Delta-T mixing level within the chip output range
const DELTAT_MIXING_LEVEL: i32 = 4;

/// OPNB hardware variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpnbKind {
    /// YM2610: 4 usable FM channels
    Ym2610,
    /// YM2610B: 6 usable FM channels
    Ym2610b,
}

/// YM2610 / YM2610B chip instance
pub struct Ym2610 {
    kind: OpnbKind,
    engine: OpnEngine,
    channels: [FmChannel; 6],
    ssg: SsgPsg,
    adpcm: AdpcmAUnit,
    deltat: DeltaT,
    address1: u8,
}

impl Ym2610 {
    /// Create a chip for a master clock / host sample rate pair
    pub fn new(kind: OpnbKind, clock: u32, rate: u32) -> Result<Self> {
        if clock == 0 || rate == 0 {
            return Err(FmError::Config(format!(
                "clock ({clock}) and sample rate ({rate}) must be non-zero"
            )));
        }
        let ssg = SsgPsg::new(SsgKind::Ym2149, clock * 2 / 8, rate)
            .map_err(|e| FmError::Config(e.to_string()))?;
        let mut chip = Ym2610 {
            kind,
            engine: OpnEngine::new(
                ChipCaps::SSG | ChipCaps::LFOPAN | ChipCaps::SIX_CH | ChipCaps::ADPCM,
                clock,
                rate,
            ),
            channels: Default::default(),
            ssg,
            adpcm: AdpcmAUnit::new(AdpcmMode::Nibble, None),
            deltat: DeltaT::new(8, DELTAT_MIXING_LEVEL << TL_BITS),
            address1: 0,
        };
        chip.reset();
        Ok(chip)
    }

    /// Hardware variant
    pub fn kind(&self) -> OpnbKind {
        self.kind
    }

    /// Attach the ADPCM-A sample memory
    pub fn attach_adpcm_rom(&mut self, rom: Arc<[u8]>) {
        self.adpcm.attach_rom(rom);
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

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.engine.set_prescaler(6 * 24, 6 * 24);
        self.ssg.set_clock(self.engine.st.clock * 2 / 8);
        self.ssg.reset();
        self.engine.st.irqmask_set(Status::TIMER_A | Status::TIMER_B);
        self.engine.reset_registers(&mut self.channels);
        self.adpcm.reset();
        for (i, ch) in self.adpcm.channels.iter_mut().enumerate() {
            ch.flag_mask = 1 << i;
        }
        self.deltat.reset();
        self.deltat.freqbase = self.engine.st.freqbase;
        self.deltat.flag_mask = 0x80;
    }

    /// Bus write over the four-port map; returns the IRQ line level
    pub fn write(&mut self, a: u8, v: u8) -> bool {
        match a & 3 {
            0 => {
                self.engine.st.address = v;
                if v < 16 {
                    self.ssg.write_port(0, v);
                }
            }
            1 => {
                let addr = self.engine.st.address as u32;
                match addr & 0xf0 {
                    0x00 => self.ssg.write_register(addr as u8, v),
                    0x10 => {
                        self.engine.st.request_sync();
                        if addr == 0x1c {
                            self.write_flag_control(v);
                        } else {
                            self.deltat.write(addr - 0x10, v);
                        }
                    }
                    0x20 => {
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
                if addr < 0x30 {
                    let freqbase = self.engine.st.freqbase;
                    self.adpcm.write(fm_tables(), addr, v, freqbase);
                } else {
                    self.engine.write_reg(&mut self.channels, addr | 0x100, v);
                }
            }
        }
        self.engine.st.irq
    }

    /// End-flag clear/mask register 0x1c
    fn write_flag_control(&mut self, v: u8) {
        let statusmask = !v;
        for (ch, adpcm_ch) in self.adpcm.channels.iter_mut().enumerate() {
            adpcm_ch.flag_mask = statusmask & (1u8 << ch);
        }
        self.deltat.flag_mask = statusmask & 0x80;
        self.adpcm.arrived &= statusmask & 0x3f;
        self.deltat.arrived &= self.deltat.flag_mask;
    }

    /// Bus read over the four-port map
    pub fn read(&self, a: u8) -> u8 {
        let addr = self.engine.st.address;
        match a & 3 {
            0 => self.engine.st.status.bits() & 0x83,
            1 => {
                if addr < 16 {
                    self.ssg.read_register(addr)
                } else if addr == 0xff {
                    0x01 // ID code
                } else {
                    0
                }
            }
            2 => self.adpcm.arrived | self.deltat.arrived,
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
        if self.kind == OpnbKind::Ym2610 {
            // channels 1 and 4 only exist on the YM2610B
            for c in [0usize, 3] {
                if self.channels[c].slots[SLOT4].key_is() {
                    log::warn!("YM2610 channel {c} is playing; is this chip a YM2610B?");
                }
            }
        }
        self.engine.refresh_frequencies(&mut self.channels);

        let active: &[usize] = match self.kind {
            OpnbKind::Ym2610 => &[1, 2, 4, 5],
            OpnbKind::Ym2610b => &[0, 1, 2, 3, 4, 5],
        };

        let mut bus = OutputBus::default();
        for i in 0..left.len().min(right.len()) {
            let lfo = self.engine.lfo.tick();
            bus.clear();
            if self.deltat.playing() {
                self.deltat.calc(&mut bus);
            }
            for &c in active {
                self.channels[c].calc(t, lfo, &mut bus);
            }
            self.adpcm.calc(&mut bus);
            let (l, r) = bus.stereo();
            left[i] = l;
            right[i] = r;
            if self.engine.st.internal_timer_a() && self.engine.st.mode & 0x80 != 0 {
                self.channels[2].csm_key_control();
            }
        }
        self.engine.st.internal_timer_b(left.len());
    }

    /// Render SSG samples (the SSG section has its own output stream)
    pub fn update_ssg(&mut self, buffer: &mut [i16]) {
        self.ssg.update(buffer);
    }
}

impl std::fmt::Debug for Ym2610 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym2610")
            .field("kind", &self.kind)
            .field("st", &self.engine.st)
            .finish()
    }
}
