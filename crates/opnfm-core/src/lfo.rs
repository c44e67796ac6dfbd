//! Low-frequency oscillators
//!
//! One LFO per chip, producing an amplitude depth and a signed pitch depth
//! each sample. A disabled LFO reports zero depths through the same code
//! path, so switching it off is numerically identical to not having one.

use crate::channel::LfoOut;
use crate::tables::{lfo_waves, LFO_ENT, LFO_RATE, LFO_SHIFT};

/// OPN-style LFO: fixed triangle, 8 hardware frequencies (register 0x22)
#[derive(Clone, Debug, Default)]
pub struct OpnLfo {
    cnt: u32,
    incr: u32,
    freq: [u32; 8],
}

impl OpnLfo {
    /// Rebuild the frequency table for a new freqbase
    ///
    /// The eight rates are 3.98 Hz to 72.2 Hz at an 8 MHz clock.
    pub fn build_freq_table(&mut self, freqbase: f64) {
        const HZ: [f64; 8] = [3.98, 5.56, 6.02, 6.37, 6.88, 9.63, 48.1, 72.2];
        for (i, &hz) in HZ.iter().enumerate() {
            let base = LFO_ENT as f64 * (1u64 << LFO_SHIFT) as f64 * hz / (8_000_000.0 / 144.0);
            self.freq[i] = (base * freqbase) as u32;
        }
    }

    /// LFO register: bit 3 enables, bits 0-2 select the rate
    pub fn set_reg(&mut self, v: u8) {
        self.incr = if v & 0x08 != 0 {
            self.freq[(v & 7) as usize]
        } else {
            0
        };
    }

    /// Advance one sample
    #[inline]
    pub fn tick(&mut self) -> LfoOut {
        if self.incr == 0 {
            return LfoOut::default();
        }
        self.cnt = self.cnt.wrapping_add(self.incr);
        let amd = lfo_waves().opn[(self.cnt >> LFO_SHIFT) as usize];
        LfoOut {
            amd,
            pmd: amd - LFO_RATE / 2,
        }
    }

    /// Reset the phase
    pub fn reset(&mut self) {
        self.cnt = 0;
        self.incr = 0;
    }
}

/// OPM-style LFO: 4 waveforms, free-running frequency register, separate
/// PMD/AMD depths, phase reset through the test register
#[derive(Clone, Debug, Default)]
pub struct OpmLfo {
    cnt: u32,
    incr: u32,
    /// Pitch-modulation depth (register 0x19, bit 7 set)
    pub pmd: u8,
    /// Amplitude-modulation depth (register 0x19, bit 7 clear)
    pub amd: u8,
    wave: usize,
    testreg: u8,
}

impl OpmLfo {
    /// Frequency register 0x18: f = clock * 2^(LFRQ/16) / 4.295e9
    pub fn set_freq(&mut self, v: u8, freqbase: f64) {
        const DRATE: [f64; 16] = [
            1.0,
            1.044273782,
            1.090507733,
            1.138788635,
            1.189207115,
            1.241857812,
            1.296839555,
            1.354255547,
            1.414213562,
            1.476826146,
            1.542210825,
            1.610490332,
            1.681792831,
            1.75625216,
            1.834008086,
            1.915206561,
        ];
        let rate = 2f64.powi((v / 16) as i32) * DRATE[(v & 0x0f) as usize] / 4_295_000_000.0;
        self.incr =
            (LFO_ENT as f64 * (1u64 << LFO_SHIFT) as f64 * (freqbase * 64.0) * rate) as u32;
    }

    /// PMD/AMD depth register 0x19
    pub fn set_depth(&mut self, v: u8) {
        if v & 0x80 != 0 {
            self.pmd = v & 0x7f;
        } else {
            self.amd = v & 0x7f;
        }
    }

    /// Waveform select (register 0x1b bits 0-1)
    pub fn set_wave(&mut self, v: u8) {
        self.wave = (v & 3) as usize;
    }

    /// Test register: LFO phase resets on the falling edge of bit 1
    pub fn write_test(&mut self, v: u8) {
        if (self.testreg & (self.testreg ^ v)) & 0x02 != 0 {
            self.cnt = 0;
        }
        self.testreg = v;
    }

    /// Advance one sample
    #[inline]
    pub fn tick(&mut self) -> LfoOut {
        if self.incr == 0 || (self.amd == 0 && self.pmd == 0) {
            return LfoOut::default();
        }
        self.cnt = self.cnt.wrapping_add(self.incr);
        let depth =
            lfo_waves().opm[self.wave * LFO_ENT + (self.cnt >> LFO_SHIFT) as usize];
        LfoOut {
            amd: depth * self.amd as i32,
            pmd: (depth - LFO_RATE / 127 / 2) * self.pmd as i32,
        }
    }

    /// Reset the oscillator
    pub fn reset(&mut self) {
        self.cnt = 0;
        self.incr = 0;
        self.pmd = 0;
        self.amd = 0;
        self.wave = 0;
        self.testreg = 0;
    }
}
