//! Chip-common state: status register, IRQ line, timers and the per-chip
//! time tables
//!
//! The core never owns real time. With a timer handler installed, the host
//! scheduler is told how long each countdown lasts and calls back into the
//! chip on expiry; without one, the timers count down sample by sample
//! inside `update`.

use bitflags::bitflags;

use crate::tables::{DT_DATA, EG_AED, EG_ENT, ENV_BITS, FREQ_RATE};

bitflags! {
    /// Chip status byte
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Timer A overflowed
        const TIMER_A = 0x01;
        /// Timer B overflowed
        const TIMER_B = 0x02;
        /// Delta-T reached its end address (OPNA)
        const EOS = 0x04;
        /// Delta-T data ready (OPNA, unused for playback)
        const BRDY = 0x08;
        /// Delta-T zero crossing (OPNA, unused for playback)
        const ZERO = 0x10;
        /// Delta-T busy (OPNA port-2 status)
        const PCM_BUSY = 0x20;
    }
}

/// Timer identity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerId {
    /// 10-bit Timer A
    A,
    /// 8-bit Timer B
    B,
}

/// What the external scheduler should do with a timer
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimerAction {
    /// Arm the timer to fire after the given duration
    Start {
        /// Countdown length in seconds
        seconds: f64,
    },
    /// Cancel the countdown
    Stop,
}

/// IRQ line level callback, invoked once per transition
pub type IrqHandler = Box<dyn FnMut(bool) + Send>;
/// Timer scheduling callback
pub type TimerHandler = Box<dyn FnMut(TimerId, TimerAction) + Send>;
/// Update-request callback: flush synthesis up to now before a write lands
pub type SyncHandler = Box<dyn FnMut() + Send>;

/// State shared by every chip variant
pub struct FmState {
    /// Master clock in Hz
    pub clock: u32,
    /// Host sample rate in Hz
    pub rate: u32,
    /// Internal samples per host sample for the current prescaler
    pub freqbase: f64,
    /// Seconds per timer count
    pub timer_base: f64,
    /// Latched register address
    pub address: u8,
    /// IRQ line level
    pub irq: bool,
    /// Status bits that may assert the IRQ line
    pub irqmask: Status,
    /// Status byte
    pub status: Status,
    /// Mode register (CSM / 3-slot / timer control bits)
    pub mode: u32,
    /// Timer A load value (10-bit)
    pub ta: i32,
    /// Timer A counter (scaled by 4096 for the internal countdown)
    pub tac: i32,
    /// Timer B load value (8-bit)
    pub tb: u8,
    /// Timer B counter
    pub tbc: i32,
    /// Internal countdown step per sample
    timer_step: i32,

    /// Per-chip detune table (rows 4-7 negated)
    pub dt_table: [[i32; 32]; 8],
    /// Attack rate steps
    pub ar_table: [i32; 94],
    /// Decay rate steps
    pub dr_table: [i32; 94],

    /// IRQ line callback
    pub irq_handler: Option<IrqHandler>,
    /// Timer scheduling callback; when absent timers run internally
    pub timer_handler: Option<TimerHandler>,
    /// Pre-write flush callback
    pub sync_handler: Option<SyncHandler>,
}

impl FmState {
    /// Fresh state for a clock/sample-rate pair
    pub fn new(clock: u32, rate: u32) -> Self {
        FmState {
            clock,
            rate,
            freqbase: 0.0,
            timer_base: 0.0,
            address: 0,
            irq: false,
            irqmask: Status::empty(),
            status: Status::empty(),
            mode: 0,
            ta: 0,
            tac: 0,
            tb: 0,
            tbc: 0,
            timer_step: 0,
            dt_table: [[0; 32]; 8],
            ar_table: [0; 94],
            dr_table: [0; 94],
            irq_handler: None,
            timer_handler: None,
            sync_handler: None,
        }
    }

    /// Ask the host to flush rendered audio up to the present
    #[inline]
    pub fn request_sync(&mut self) {
        if let Some(h) = &mut self.sync_handler {
            h();
        }
    }

    fn notify_timer(&mut self, id: TimerId, action: TimerAction) {
        if let Some(h) = &mut self.timer_handler {
            h(id, action);
        }
    }

    /// Set status bits, raising the IRQ line on an off-to-on transition
    pub fn status_set(&mut self, flags: Status) {
        self.status |= flags;
        if !self.irq && self.status.intersects(self.irqmask) {
            self.irq = true;
            if let Some(h) = &mut self.irq_handler {
                h(true);
            }
        }
    }

    /// Clear status bits, dropping the IRQ line on an on-to-off transition
    pub fn status_reset(&mut self, flags: Status) {
        self.status &= !flags;
        if self.irq && !self.status.intersects(self.irqmask) {
            self.irq = false;
            if let Some(h) = &mut self.irq_handler {
                h(false);
            }
        }
    }

    /// Replace the IRQ mask and re-evaluate the line
    pub fn irqmask_set(&mut self, mask: Status) {
        self.irqmask = mask;
        self.status_set(Status::empty());
        self.status_reset(Status::empty());
    }

    /// Mode / timer-control register
    ///
    /// b7 CSM, b6 3-slot, b5/b4 reset flags, b3/b2 enable flags,
    /// b1/b0 load timers
    pub fn set_mode(&mut self, v: u8) {
        self.mode = v as u32;

        if v & 0x20 != 0 {
            self.status_reset(Status::TIMER_B);
        }
        if v & 0x10 != 0 {
            self.status_reset(Status::TIMER_A);
        }
        if v & 0x02 != 0 {
            if self.tbc == 0 {
                self.tbc = (256 - self.tb as i32) << 4;
                let seconds = self.tbc as f64 * self.timer_base;
                self.notify_timer(TimerId::B, TimerAction::Start { seconds });
            }
        } else if self.tbc != 0 {
            self.tbc = 0;
            self.notify_timer(TimerId::B, TimerAction::Stop);
        }
        if v & 0x01 != 0 {
            if self.tac == 0 {
                self.tac = 1024 - self.ta;
                let seconds = self.tac as f64 * self.timer_base;
                self.notify_timer(TimerId::A, TimerAction::Start { seconds });
            }
        } else if self.tac != 0 {
            self.tac = 0;
            self.notify_timer(TimerId::A, TimerAction::Stop);
        }
    }

    /// Timer A overflow: flag if armed, then auto-reload
    pub fn timer_a_over(&mut self) {
        if self.mode & 0x04 != 0 {
            self.status_set(Status::TIMER_A);
        }
        self.tac = 1024 - self.ta;
        let seconds = self.tac as f64 * self.timer_base;
        self.notify_timer(TimerId::A, TimerAction::Start { seconds });
    }

    /// Timer B overflow: flag if armed, then auto-reload
    pub fn timer_b_over(&mut self) {
        if self.mode & 0x08 != 0 {
            self.status_set(Status::TIMER_B);
        }
        self.tbc = (256 - self.tb as i32) << 4;
        let seconds = self.tbc as f64 * self.timer_base;
        self.notify_timer(TimerId::B, TimerAction::Start { seconds });
    }

    /// Internal per-sample Timer A countdown; true on overflow (the caller
    /// handles CSM). Runs only when the host has not taken over scheduling.
    #[inline]
    pub fn internal_timer_a(&mut self) -> bool {
        if self.tac != 0 && self.timer_handler.is_none() {
            self.tac -= self.timer_step;
            if self.tac <= 0 {
                self.timer_a_over();
                return true;
            }
        }
        false
    }

    /// Internal Timer B countdown over a whole buffer of samples
    #[inline]
    pub fn internal_timer_b(&mut self, samples: usize) {
        if self.tbc != 0 && self.timer_handler.is_none() {
            self.tbc -= self.timer_step * samples as i32;
            if self.tbc <= 0 {
                self.timer_b_over();
            }
        }
    }

    /// Recompute the countdown scale after a prescaler change
    pub fn set_timer_scale(&mut self) {
        self.timer_step = (self.freqbase * 4096.0) as i32;
    }

    /// Build the detune and rate tables for the current freqbase
    pub fn init_timetables(&mut self, ar_rate: f64, dr_rate: f64) {
        for d in 0..4 {
            for i in 0..32 {
                let rate = DT_DATA[d * 32 + i] as f64 * self.freqbase * FREQ_RATE as f64;
                self.dt_table[d][i] = rate as i32;
                self.dt_table[d + 4][i] = -(rate as i32);
            }
        }
        for i in 0..4 {
            self.ar_table[i] = 0;
            self.dr_table[i] = 0;
        }
        for i in 4..64 {
            let mut rate = self.freqbase;
            if i < 60 {
                rate *= 1.0 + (i & 3) as f64 * 0.25;
            }
            rate *= (1u32 << ((i >> 2) - 1)) as f64;
            rate *= (EG_ENT << ENV_BITS) as f64;
            self.ar_table[i] = (rate / ar_rate) as i32;
            self.dr_table[i] = (rate / dr_rate) as i32;
        }
        self.ar_table[62] = EG_AED;
        self.ar_table[63] = EG_AED;
        for i in 64..94 {
            self.ar_table[i] = self.ar_table[63];
            self.dr_table[i] = self.dr_table[63];
        }
    }

    /// Reset timers, status and IRQ state
    pub fn reset_timers(&mut self) {
        self.mode = 0;
        self.status_reset(Status::all());
        self.ta = 0;
        self.tac = 0;
        self.tb = 0;
        self.tbc = 0;
    }
}

impl std::fmt::Debug for FmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmState")
            .field("clock", &self.clock)
            .field("rate", &self.rate)
            .field("status", &self.status)
            .field("mode", &self.mode)
            .finish()
    }
}
