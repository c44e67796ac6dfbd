//! ADPCM-A: six-channel fixed-table differential PCM
//!
//! Each channel reads two nibbles per byte from sample memory, accumulating
//! table deltas into a clamped predictor. The same channel machinery doubles
//! as the YM2608 rhythm section, which reads plain 16-bit PCM instead.

use std::sync::{Arc, OnceLock};

use crate::channel::{OutputBus, OUT_CENTER};
use crate::tables::FmTables;

/// Sample-step fixed point bits
const ADPCM_SHIFT: u32 = 16;
/// Start/end registers address 256-byte units
const ADDRESS_SHIFT: u32 = 8;
/// Predictor range before mixing level
const DECODE_RANGE: i32 = 2048;
/// Output mixing level
const MIX_LEVEL: i32 = 3;
const DECODE_MIN: i32 = -(DECODE_RANGE * MIX_LEVEL);
const DECODE_MAX: i32 = DECODE_RANGE * MIX_LEVEL - 1;
/// IL/TL attenuation granularity: 0.75 dB in envelope steps
const ATT_STEP: usize = 32;

/// Per-nibble step-index adaptation, in 1/16 step units
const STEP_ADJUST: [i32; 16] = [
    -16, -16, -16, -16, 32, 80, 112, 144, -16, -16, -16, -16, 32, 80, 112, 144,
];

/// Nibble-to-delta table over all 49 step sizes
fn jedi_table() -> &'static [i32; 49 * 16] {
    static JEDI: OnceLock<[i32; 49 * 16]> = OnceLock::new();
    JEDI.get_or_init(|| {
        let mut table = [0i32; 49 * 16];
        for step in 0..=48 {
            let stepval = (16.0 * 1.1f64.powi(step) * MIX_LEVEL as f64).floor();
            for nib in 0..16 {
                let value = stepval as i32 * ((nib & 0x07) * 2 + 1) / 8;
                table[(step as usize) * 16 + nib as usize] =
                    if nib & 0x08 != 0 { -value } else { value };
            }
        }
        table
    })
}

/// How a channel reads sample memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdpcmMode {
    /// Nibble-encoded ADPCM (YM2610 family)
    Nibble,
    /// 16-bit signed PCM (YM2608 rhythm voices)
    Pcm16,
}

/// One ADPCM-A channel
#[derive(Clone, Debug)]
pub struct AdpcmChannel {
    playing: bool,
    /// End-flag bit contributed to the arrived mask (0 = never reported)
    pub flag_mask: u8,
    now_data: u8,
    now_addr: u32,
    now_step: u32,
    step: u32,
    start: u32,
    end: u32,
    il: i32,
    volume: i32,
    pan: usize,
    adpcmx: i32,
    adpcmd: i32,
    adpcml: i32,
}

impl Default for AdpcmChannel {
    fn default() -> Self {
        AdpcmChannel {
            playing: false,
            flag_mask: 0,
            now_data: 0,
            now_addr: 0,
            now_step: 0,
            step: 0,
            start: 0,
            end: 0,
            il: 0,
            volume: 0,
            pan: OUT_CENTER,
            adpcmx: 0,
            adpcmd: 127,
            adpcml: 0,
        }
    }
}

/// Six-channel ADPCM-A unit
pub struct AdpcmAUnit {
    mode: AdpcmMode,
    /// The six channels
    pub channels: [AdpcmChannel; 6],
    regs: [u8; 0x30],
    /// Shared total-level base offset into the TL table
    tl_base: usize,
    /// Arrived-at-end flags, one bit per channel
    pub arrived: u8,
    rom: Option<Arc<[u8]>>,
    /// Fixed start/end positions reapplied on reset (YM2608 rhythm)
    fixed_positions: Option<[(u32, u32); 6]>,
}

impl AdpcmAUnit {
    /// New unit; `Pcm16` mode takes fixed per-voice positions
    pub fn new(mode: AdpcmMode, fixed_positions: Option<[(u32, u32); 6]>) -> Self {
        AdpcmAUnit {
            mode,
            channels: Default::default(),
            regs: [0; 0x30],
            tl_base: 0x3f * ATT_STEP,
            arrived: 0,
            rom: None,
            fixed_positions,
        }
    }

    /// Attach sample memory
    pub fn attach_rom(&mut self, rom: Arc<[u8]>) {
        self.rom = Some(rom);
    }

    /// Fix per-voice start/end positions (YM2608 rhythm ROM layout); they
    /// survive resets
    pub fn set_fixed_positions(&mut self, positions: [(u32, u32); 6]) {
        for (ch, &(start, end)) in self.channels.iter_mut().zip(positions.iter()) {
            ch.start = start;
            ch.end = end;
        }
        self.fixed_positions = Some(positions);
    }

    fn rom_len(&self) -> u32 {
        match (&self.rom, self.mode) {
            (Some(rom), AdpcmMode::Nibble) => rom.len() as u32,
            (Some(rom), AdpcmMode::Pcm16) => (rom.len() / 2) as u32,
            (None, _) => 0,
        }
    }

    /// Reset all channels; rhythm voices keep their fixed positions
    pub fn reset(&mut self) {
        for (i, ch) in self.channels.iter_mut().enumerate() {
            *ch = AdpcmChannel::default();
            if let Some(pos) = self.fixed_positions {
                ch.start = pos[i].0;
                ch.end = pos[i].1;
            }
        }
        self.tl_base = 0x3f * ATT_STEP;
        self.arrived = 0;
    }

    /// Register write (unit-relative address 0x00-0x2f)
    pub fn write(&mut self, t: &FmTables, r: u32, v: u8, freqbase: f64) {
        if r as usize >= self.regs.len() {
            return;
        }
        self.regs[r as usize] = v;
        match r {
            0x00 => {
                // DM + channel mask: key on (DM clear) or key off (DM set)
                if v & 0x80 == 0 {
                    for c in 0..6 {
                        if v & (1 << c) != 0 {
                            self.key_on(c, freqbase);
                        }
                    }
                } else {
                    for c in 0..6 {
                        if v & (1 << c) != 0 {
                            self.channels[c].playing = false;
                        }
                    }
                }
            }
            0x01 => {
                // shared total level, 0.75 dB steps, inverted
                self.tl_base = ((v & 0x3f) ^ 0x3f) as usize * ATT_STEP;
                let tl_base = self.tl_base;
                for ch in &mut self.channels {
                    ch.volume = t.tl[tl_base + ch.il as usize * ATT_STEP] / DECODE_RANGE;
                    ch.adpcml = ch.adpcmx * ch.volume;
                }
            }
            _ => {
                let c = (r & 0x07) as usize;
                if c >= 6 {
                    return;
                }
                match r & 0x38 {
                    0x08 => {
                        // pan + instrument level, inverted
                        let tl_base = self.tl_base;
                        let ch = &mut self.channels[c];
                        ch.il = ((v & 0x1f) ^ 0x1f) as i32;
                        ch.pan = ((v >> 6) & 0x03) as usize;
                        ch.volume = t.tl[tl_base + ch.il as usize * ATT_STEP] / DECODE_RANGE;
                        ch.adpcml = ch.adpcmx * ch.volume;
                    }
                    0x10 | 0x18 => {
                        self.channels[c].start = ((self.regs[0x18 + c] as u32) << 8
                            | self.regs[0x10 + c] as u32)
                            << ADDRESS_SHIFT;
                    }
                    0x20 | 0x28 => {
                        self.channels[c].end = (((self.regs[0x28 + c] as u32) << 8
                            | self.regs[0x20 + c] as u32)
                            << ADDRESS_SHIFT)
                            + ((1 << ADDRESS_SHIFT) - 1);
                    }
                    _ => {}
                }
            }
        }
    }

    fn key_on(&mut self, c: usize, freqbase: f64) {
        let rom_len = self.rom_len();
        let ch = &mut self.channels[c];
        ch.step = ((1u32 << ADPCM_SHIFT) as f64 * freqbase / 3.0) as u32;
        ch.now_addr = ch.start << 1;
        ch.now_step = (1 << ADPCM_SHIFT) - ch.step;
        ch.adpcmx = 0;
        ch.adpcmd = 0;
        ch.adpcml = 0;
        ch.playing = true;
        if self.rom.is_none() {
            log::warn!("ADPCM-A channel {c}: no sample memory mapped");
            ch.playing = false;
        } else {
            if ch.end >= rom_len {
                log::warn!("ADPCM-A channel {c}: end address ${:08x} out of range", ch.end);
                ch.end = rom_len.saturating_sub(1);
            }
            if ch.start >= rom_len {
                log::warn!(
                    "ADPCM-A channel {c}: start address ${:08x} out of range",
                    ch.start
                );
                ch.playing = false;
            }
        }
    }

    /// Render one sample of every playing channel into the bus
    pub fn calc(&mut self, bus: &mut OutputBus) {
        let Some(rom) = self.rom.clone() else {
            return;
        };
        for c in 0..6 {
            if self.channels[c].playing {
                let (still_playing, flag) = match self.mode {
                    AdpcmMode::Nibble => Self::calc_nibble(&mut self.channels[c], &rom, bus),
                    AdpcmMode::Pcm16 => Self::calc_pcm16(&mut self.channels[c], &rom, bus),
                };
                if !still_playing {
                    self.channels[c].playing = false;
                    self.arrived |= flag;
                }
            }
        }
    }

    fn calc_nibble(ch: &mut AdpcmChannel, rom: &[u8], bus: &mut OutputBus) -> (bool, u8) {
        ch.now_step += ch.step;
        if ch.now_step >= (1 << ADPCM_SHIFT) {
            let mut steps = ch.now_step >> ADPCM_SHIFT;
            ch.now_step &= (1 << ADPCM_SHIFT) - 1;
            if ch.now_addr + steps > ch.end << 1 {
                return (false, ch.flag_mask);
            }
            let jedi = jedi_table();
            while steps > 0 {
                let data = if ch.now_addr & 1 != 0 {
                    (ch.now_data & 0x0f) as usize
                } else {
                    ch.now_data = rom.get((ch.now_addr >> 1) as usize).copied().unwrap_or(0);
                    ((ch.now_data >> 4) & 0x0f) as usize
                };
                ch.now_addr += 1;

                ch.adpcmx += jedi[ch.adpcmd as usize + data];
                ch.adpcmx = ch.adpcmx.clamp(DECODE_MIN, DECODE_MAX);
                ch.adpcmd += STEP_ADJUST[data];
                ch.adpcmd = ch.adpcmd.clamp(0, 48 * 16);
                ch.adpcml = ch.adpcmx * ch.volume;
                steps -= 1;
            }
        }
        bus.out[ch.pan] += ch.adpcml;
        (true, 0)
    }

    fn calc_pcm16(ch: &mut AdpcmChannel, rom: &[u8], bus: &mut OutputBus) -> (bool, u8) {
        ch.now_step += ch.step;
        if ch.now_step >= (1 << ADPCM_SHIFT) {
            let mut steps = ch.now_step >> ADPCM_SHIFT;
            ch.now_step &= (1 << ADPCM_SHIFT) - 1;
            if ch.now_addr + steps > ch.end << 1 {
                return (false, ch.flag_mask);
            }
            while steps > 0 {
                let byte = (ch.now_addr as usize) * 2;
                let lo = rom.get(byte).copied().unwrap_or(0);
                let hi = rom.get(byte + 1).copied().unwrap_or(0);
                ch.adpcmx = i16::from_le_bytes([lo, hi]) as i32;
                ch.now_addr += 1;
                ch.adpcml = ch.adpcmx * ch.volume;
                steps -= 1;
            }
        }
        bus.out[ch.pan] += ch.adpcml;
        (true, 0)
    }

    /// True while any channel is playing
    pub fn any_playing(&self) -> bool {
        self.channels.iter().any(|c| c.playing)
    }
}

impl std::fmt::Debug for AdpcmAUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdpcmAUnit")
            .field("mode", &self.mode)
            .field("arrived", &self.arrived)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::fm_tables;

    fn unit_with_rom(data: &[u8]) -> AdpcmAUnit {
        let mut unit = AdpcmAUnit::new(AdpcmMode::Nibble, None);
        unit.attach_rom(Arc::from(data.to_vec().into_boxed_slice()));
        unit
    }

    fn setup_channel(unit: &mut AdpcmAUnit, end_units: u8) {
        let t = fm_tables();
        unit.write(t, 0x01, 0x3f, 1.0); // total level: no attenuation
        unit.write(t, 0x08, 0xdf, 1.0); // channel 0: center pan, IL max
        unit.write(t, 0x10, 0x00, 1.0); // start 0
        unit.write(t, 0x18, 0x00, 1.0);
        unit.write(t, 0x20, end_units, 1.0); // end
        unit.write(t, 0x28, 0x00, 1.0);
        unit.channels[0].flag_mask = 0x01;
        unit.write(t, 0x00, 0x01, 1.0); // key on channel 0
    }

    #[test]
    fn test_jedi_table_signs() {
        let jedi = jedi_table();
        for step in 0..=48usize {
            for nib in 0..8usize {
                assert!(jedi[step * 16 + nib] >= 0);
                assert_eq!(jedi[step * 16 + nib], -jedi[step * 16 + nib + 8]);
            }
        }
    }

    #[test]
    fn test_predictor_stays_clamped() {
        let rom = vec![0x77u8; 4096]; // large positive deltas forever
        let mut unit = unit_with_rom(&rom);
        setup_channel(&mut unit, 0x0f);
        let mut bus = OutputBus::default();
        for _ in 0..8192 {
            bus.clear();
            unit.calc(&mut bus);
        }
        let x = unit.channels[0].adpcmx;
        assert!(x <= DECODE_MAX && x >= DECODE_MIN);
        assert_eq!(x, DECODE_MAX);
    }

    #[test]
    fn test_end_of_sample_halts_and_flags() {
        let rom = vec![0x11u8; 256];
        let mut unit = unit_with_rom(&rom);
        setup_channel(&mut unit, 0x00); // end after the first 256-byte page
        let mut bus = OutputBus::default();
        for _ in 0..2048 {
            bus.clear();
            unit.calc(&mut bus);
        }
        assert!(!unit.channels[0].playing);
        assert_eq!(unit.arrived & 0x01, 0x01);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let rom: Vec<u8> = (0..512u32).map(|i| (i * 37 + 11) as u8).collect();
        let mut first = Vec::new();
        let mut second = Vec::new();
        for pass in 0..2 {
            let mut unit = unit_with_rom(&rom);
            setup_channel(&mut unit, 0x01);
            let out = if pass == 0 { &mut first } else { &mut second };
            let mut bus = OutputBus::default();
            for _ in 0..1024 {
                bus.clear();
                unit.calc(&mut bus);
                out.push(bus.out[OUT_CENTER]);
            }
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_on_without_rom_refuses() {
        let mut unit = AdpcmAUnit::new(AdpcmMode::Nibble, None);
        let t = fm_tables();
        unit.write(t, 0x00, 0x01, 1.0);
        assert!(!unit.channels[0].playing);
    }
}
