//! YM2203 (OPN): 3 FM channels + SSG, mono output

use ssgpsg::{SsgKind, SsgPsg};

use crate::channel::{FmChannel, LfoOut, OutputBus};
use crate::opn::{ChipCaps, OpnEngine};
use crate::state::{IrqHandler, Status, SyncHandler, TimerHandler, TimerId};
use crate::tables::fm_tables;
use crate::{FmError, Result};

/// YM2203 chip instance
pub struct Ym2203 {
    engine: OpnEngine,
    channels: [FmChannel; 3],
    ssg: SsgPsg,
}

impl Ym2203 {
    /// Create a chip for a master clock / host sample rate pair
    pub fn new(clock: u32, rate: u32) -> Result<Self> {
        if clock == 0 || rate == 0 {
            return Err(FmError::Config(format!(
                "clock ({clock}) and sample rate ({rate}) must be non-zero"
            )));
        }
        // default prescaler: FM 1/6, SSG 1/4
        let ssg = SsgPsg::new(SsgKind::Ym2149, clock * 2 / 4, rate)
            .map_err(|e| FmError::Config(e.to_string()))?;
        let mut chip = Ym2203 {
            engine: OpnEngine::new(ChipCaps::SSG, clock, rate),
            channels: Default::default(),
            ssg,
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

    /// Access the SSG section directly
    pub fn ssg(&mut self) -> &mut SsgPsg {
        &mut self.ssg
    }

    fn set_prescaler(&mut self, pres: u32, timer_pres: u32, ssg_pres: u32) {
        self.engine.set_prescaler(pres, timer_pres);
        self.ssg.set_clock(self.engine.st.clock * 2 / ssg_pres);
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.set_prescaler(6 * 12, 6 * 12, 4);
        self.ssg.reset();
        self.engine.st.irqmask_set(Status::TIMER_A | Status::TIMER_B);
        self.engine.reset_registers(&mut self.channels);
    }

    /// Bus write: even address latches the register, odd writes data.
    /// Returns the IRQ line level.
    pub fn write(&mut self, a: u8, v: u8) -> bool {
        if a & 1 == 0 {
            self.engine.st.address = v;
            if v < 16 {
                self.ssg.write_port(0, v);
            }
            match v {
                0x2d => self.set_prescaler(6 * 12, 6 * 12, 4),
                0x2e => self.set_prescaler(3 * 12, 3 * 12, 2),
                0x2f => self.set_prescaler(2 * 12, 2 * 12, 1),
                _ => {}
            }
        } else {
            let addr = self.engine.st.address as u32;
            match addr & 0xf0 {
                0x00 => self.ssg.write_register(addr as u8, v),
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
        self.engine.st.irq
    }

    /// Bus read: even address returns the status byte, odd the SSG data
    pub fn read(&self, a: u8) -> u8 {
        if a & 1 == 0 {
            self.engine.st.status.bits()
        } else {
            let addr = self.engine.st.address;
            if addr < 16 {
                self.ssg.read_register(addr)
            } else {
                0
            }
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

    /// Render FM samples (mono)
    pub fn update(&mut self, buffer: &mut [i16]) {
        let t = fm_tables();
        self.engine.refresh_frequencies(&mut self.channels);

        let mut bus = OutputBus::default();
        for sample in buffer.iter_mut() {
            bus.clear();
            for ch in &mut self.channels {
                ch.calc(t, LfoOut::default(), &mut bus);
            }
            *sample = bus.mono();
            if self.engine.st.internal_timer_a() && self.engine.st.mode & 0x80 != 0 {
                self.channels[2].csm_key_control();
            }
        }
        self.engine.st.internal_timer_b(buffer.len());
    }

    /// Render SSG samples (the SSG section has its own output stream)
    pub fn update_ssg(&mut self, buffer: &mut [i16]) {
        self.ssg.update(buffer);
    }
}

impl std::fmt::Debug for Ym2203 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym2203").field("st", &self.engine.st).finish()
    }
}
