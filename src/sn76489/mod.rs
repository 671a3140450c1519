//! SN76489 PSG emulation
//!
//! Sample-accurate emulation of the Texas Instruments SN76489 Programmable
//! Sound Generator as clocked in Sega and MSX-family machines. The chip runs
//! internally at `clock / 16`; a fractional accumulator with 24 fraction bits
//! bridges that rate to the fixed 44,100 Hz output rate, so every call to
//! [`Sn76489::clock`] produces exactly one output sample per channel.
//!
//! The generator layout follows the real part: three square-wave tone
//! channels with 10-bit periods and a noise channel fed by a configurable
//! linear feedback shift register.

mod device;

pub use device::PsgDevice;

use crate::constants::SAMPLE_RATE;
use crate::{Result, VgmError};
use bitflags::bitflags;

/// Number of square-wave tone channels.
pub const TONE_CHANNELS: usize = 3;

/// Total channel count (three tones plus noise).
pub const PSG_CHANNELS: usize = 4;

/// Channel index of the noise generator.
pub const NOISE_CHANNEL: usize = 3;

/// Default NTSC master clock (Sega Master System / Game Gear).
pub const DEFAULT_CLOCK: u32 = 3_579_545;

/// Default LFSR tap mask (bits 0 and 3, the Sega configuration).
pub const DEFAULT_FEEDBACK: u16 = 0x0009;

/// Default LFSR width in bits.
pub const DEFAULT_SHIFT_WIDTH: u8 = 16;

bitflags! {
    /// SN76489 behaviour flags from the VGM header flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PsgFlags: u8 {
        /// A tone period of 0 behaves as 0x400 instead of holding the output.
        const FREQ0 = 0x01;
        /// Invert every channel output.
        const OUTPUT_NEG = 0x02;
        /// Ignore Game Gear stereo mask writes.
        const GG_STEREO_OFF = 0x04;
        /// Clock divider bypass (carried for completeness, not applied).
        const CKDIV_OFF = 0x08;
        /// White-noise feedback is the XNOR of the tapped bits (NCR8496).
        const XNOR = 0x10;
    }
}

/// PSG configuration as carried by the VGM header.
///
/// Immutable once constructed. `dual_chip` is derived from bit 30 of the
/// raw clock field; the stored `clock` has the marker bits stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsgSettings {
    /// Input clock in Hz.
    pub clock: u32,
    /// LFSR tap mask for white noise.
    pub feedback: u16,
    /// LFSR width in bits (1-16).
    pub sr_width: u8,
    /// Behaviour flags.
    pub flags: PsgFlags,
    /// Two chip instances are addressed by the stream.
    pub dual_chip: bool,
}

impl PsgSettings {
    /// Build settings from the raw VGM header fields.
    ///
    /// Bit 30 of the clock field marks dual-chip streams and bit 31 marks a
    /// T6W28 pairing; both are stripped from the stored clock. Zero feedback
    /// or shift width fall back to the standard Sega values, matching files
    /// written before those header fields existed.
    pub fn from_header(clock_field: u32, feedback: u16, sr_width: u8, flags: u8) -> Self {
        Self {
            clock: clock_field & 0x3FFF_FFFF,
            feedback: if feedback == 0 { DEFAULT_FEEDBACK } else { feedback },
            sr_width: if sr_width == 0 { DEFAULT_SHIFT_WIDTH } else { sr_width },
            flags: PsgFlags::from_bits_truncate(flags),
            dual_chip: clock_field & 0x4000_0000 != 0,
        }
    }
}

impl Default for PsgSettings {
    fn default() -> Self {
        Self {
            clock: DEFAULT_CLOCK,
            feedback: DEFAULT_FEEDBACK,
            sr_width: DEFAULT_SHIFT_WIDTH,
            flags: PsgFlags::FREQ0,
            dual_chip: false,
        }
    }
}

/// Attenuation table: 2 dB per step, entry 15 fully silent.
///
/// The final store is single precision so rendered output is bit-identical
/// across platforms; the running product is kept in double precision.
fn build_volume_table() -> [f32; 16] {
    let step = 10.0_f64.powf(-0.1);
    let mut table = [0.0_f32; 16];
    let mut level = 1.0_f64;
    for entry in table.iter_mut().take(15) {
        *entry = level as f32;
        level *= step;
    }
    table
}

/// State of one square-wave tone channel.
#[derive(Debug, Clone, Default)]
struct ToneChannel {
    /// 10-bit period, assembled from the latch nibble and the data byte.
    freq: u16,
    /// Attenuation index 0-15 (15 = silent).
    volume: u8,
    /// Period accumulator in chip ticks.
    count: i32,
    /// Current square level.
    edge: bool,
    /// Diagnostic mute.
    muted: bool,
}

/// One SN76489 chip instance.
///
/// Drive it with [`write`](Self::write) for register data and
/// [`clock`](Self::clock) once per output sample; the per-channel floats of
/// the latest sample are available from
/// [`channel_outputs`](Self::channel_outputs). No mixing happens here.
#[derive(Debug, Clone)]
pub struct Sn76489 {
    clock: u32,
    feedback: u16,
    sr_width: u8,
    flags: PsgFlags,
    volume_table: [f32; 16],

    /// Chip ticks per output sample, 24 fraction bits.
    base_incr: i32,
    /// Fractional-cycle accumulator; only the fraction survives a sample.
    base_count: i32,

    tones: [ToneChannel; TONE_CHANNELS],

    /// White noise when set, periodic otherwise.
    noise_white: bool,
    /// Noise period follows tone 2 instead of `noise_freq`.
    noise_ref: bool,
    noise_freq: u16,
    noise_volume: u8,
    noise_count: i32,
    noise_seed: u16,
    noise_muted: bool,

    /// Last latched register index 0-7.
    adr: u8,

    /// Per-channel floats of the most recent sample (3 = noise).
    outputs: [f32; PSG_CHANNELS],
}

impl Sn76489 {
    /// Create a chip instance from header settings.
    ///
    /// # Errors
    ///
    /// Returns [`VgmError::InvalidSetting`] when the shift-register width is
    /// outside 1-16.
    pub fn new(settings: &PsgSettings) -> Result<Self> {
        if settings.sr_width == 0 || settings.sr_width > 16 {
            return Err(VgmError::InvalidSetting(format!(
                "LFSR width {} is outside 1-16",
                settings.sr_width
            )));
        }

        let base_incr = ((settings.clock as u64) << 24) / (16 * SAMPLE_RATE as u64);
        let mut chip = Self {
            clock: settings.clock,
            feedback: settings.feedback,
            sr_width: settings.sr_width,
            flags: settings.flags,
            volume_table: build_volume_table(),
            base_incr: base_incr as i32,
            base_count: 0,
            tones: Default::default(),
            noise_white: false,
            noise_ref: false,
            noise_freq: 32,
            noise_volume: 0x0F,
            noise_count: 0,
            noise_seed: 0,
            noise_muted: false,
            adr: 0,
            outputs: [0.0; PSG_CHANNELS],
        };
        chip.reset();
        Ok(chip)
    }

    /// Reset all generator state, keeping the configuration.
    ///
    /// All volumes come up silent and the LFSR is reseeded with its single
    /// top bit, so the seed is never zero.
    pub fn reset(&mut self) {
        for tone in &mut self.tones {
            tone.freq = 0;
            tone.volume = 0x0F;
            tone.count = 0;
            tone.edge = false;
        }
        self.noise_white = false;
        self.noise_ref = false;
        self.noise_freq = 32;
        self.noise_volume = 0x0F;
        self.noise_count = 0;
        self.noise_seed = 1 << (self.sr_width - 1);
        self.adr = 0;
        self.base_count = 0;
        self.outputs = [0.0; PSG_CHANNELS];
    }

    /// Input clock in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock
    }

    /// Apply one register write from the command stream.
    ///
    /// A byte with bit 7 set latches a register address and carries four
    /// data bits; a byte with bit 7 clear extends the latched channel's tone
    /// period with its high six bits. Writing the noise control register
    /// reseeds the LFSR.
    pub fn write(&mut self, value: u8) {
        if value & 0x80 != 0 {
            self.adr = (value >> 4) & 0x07;
            match self.adr {
                6 => {
                    self.noise_white = value & 0x04 != 0;
                    if value & 0x03 == 0x03 {
                        self.noise_ref = true;
                        self.noise_freq = self.tones[2].freq;
                    } else {
                        self.noise_ref = false;
                        self.noise_freq = 32 << (value & 0x03);
                    }
                    if self.noise_freq == 0 {
                        self.noise_freq = 1;
                    }
                    self.noise_seed = 1 << (self.sr_width - 1);
                }
                7 => self.noise_volume = value & 0x0F,
                1 | 3 | 5 => self.tones[(self.adr >> 1) as usize].volume = value & 0x0F,
                _ => {
                    let tone = &mut self.tones[(self.adr >> 1) as usize];
                    tone.freq = (tone.freq & 0x3F0) | u16::from(value & 0x0F);
                }
            }
        } else {
            // Data byte: tone period high bits of the latched channel. A
            // latched noise or volume register of the noise pair has no tone
            // counterpart, so the byte is consumed without effect.
            let channel = (self.adr >> 1) as usize;
            if channel < TONE_CHANNELS {
                let tone = &mut self.tones[channel];
                tone.freq = (u16::from(value & 0x3F) << 4) | (tone.freq & 0x0F);
            }
        }
    }

    /// Advance the LFSR by one bit.
    fn shift_noise(&mut self) {
        let fed = if self.noise_white {
            let mut parity = ((self.noise_seed & self.feedback).count_ones() & 1) as u16;
            if self.flags.contains(PsgFlags::XNOR) {
                parity ^= 1;
            }
            parity
        } else {
            self.noise_seed & 1
        };
        self.noise_seed = (self.noise_seed >> 1) | (fed << (self.sr_width - 1));
    }

    /// Produce one output sample on every channel.
    pub fn clock(&mut self) {
        self.base_count += self.base_incr;
        let incr = self.base_count >> 24;
        self.base_count &= (1 << 24) - 1;

        let sign = if self.flags.contains(PsgFlags::OUTPUT_NEG) {
            -1.0
        } else {
            1.0
        };

        // Noise: bit 8 of the accumulator gates one LFSR step per period.
        // Accumulators wrap like the 32-bit registers they model.
        self.noise_count = self.noise_count.wrapping_add(incr);
        if self.noise_count & 0x100 != 0 {
            self.shift_noise();
            let period = if self.noise_ref {
                self.tones[2].freq
            } else {
                self.noise_freq
            };
            self.noise_count -= i32::from(period);
        }
        let level = self.volume_table[self.noise_volume as usize];
        self.outputs[NOISE_CHANNEL] = if self.noise_muted {
            0.0
        } else if self.noise_seed & 1 != 0 {
            level * sign
        } else {
            -level * sign
        };

        // Tones: bit 10 of the accumulator marks a period rollover. Periods
        // of 0 and 1 sit above the output rate and pin the level high,
        // unless the FREQ0 flag promotes a zero period to 0x400.
        for (index, tone) in self.tones.iter_mut().enumerate() {
            tone.count = tone.count.wrapping_add(incr);
            if tone.count & 0x400 != 0 {
                let period = if tone.freq == 0 && self.flags.contains(PsgFlags::FREQ0) {
                    0x400
                } else {
                    i32::from(tone.freq)
                };
                if period > 1 {
                    tone.edge = !tone.edge;
                    tone.count -= period;
                } else {
                    tone.edge = true;
                }
            }
            let level = self.volume_table[tone.volume as usize];
            self.outputs[index] = if tone.muted {
                0.0
            } else if tone.edge {
                level * sign
            } else {
                -level * sign
            };
        }
    }

    /// Per-channel floats of the most recent sample (tones 0-2, then noise).
    pub fn channel_outputs(&self) -> [f32; PSG_CHANNELS] {
        self.outputs
    }

    /// Mute or unmute a channel (3 = noise).
    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if channel == NOISE_CHANNEL {
            self.noise_muted = mute;
        } else if channel < TONE_CHANNELS {
            self.tones[channel].muted = mute;
        }
    }

    /// Check whether a channel is muted.
    pub fn is_channel_muted(&self, channel: usize) -> bool {
        if channel == NOISE_CHANNEL {
            self.noise_muted
        } else if channel < TONE_CHANNELS {
            self.tones[channel].muted
        } else {
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_chip() -> Sn76489 {
        Sn76489::new(&PsgSettings::default()).unwrap()
    }

    #[test]
    fn test_volume_table_shape() {
        let table = build_volume_table();
        assert_eq!(table[0], 1.0);
        assert_eq!(table[15], 0.0);
        // Every audible step attenuates by the same 2 dB ratio.
        for i in 1..15 {
            assert_relative_eq!(table[i] / table[i - 1], 0.794_328_2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_settings_from_header_defaults() {
        let settings = PsgSettings::from_header(3_579_545, 0, 0, 0x01);
        assert_eq!(settings.feedback, DEFAULT_FEEDBACK);
        assert_eq!(settings.sr_width, DEFAULT_SHIFT_WIDTH);
        assert!(settings.flags.contains(PsgFlags::FREQ0));
        assert!(!settings.dual_chip);
    }

    #[test]
    fn test_settings_dual_chip_bit() {
        let settings = PsgSettings::from_header(3_579_545 | 0x4000_0000, 9, 16, 0);
        assert!(settings.dual_chip);
        assert_eq!(settings.clock, 3_579_545);
    }

    #[test]
    fn test_invalid_shift_width_rejected() {
        let mut settings = PsgSettings::default();
        settings.sr_width = 17;
        assert!(matches!(
            Sn76489::new(&settings),
            Err(VgmError::InvalidSetting(_))
        ));
        settings.sr_width = 0;
        assert!(Sn76489::new(&settings).is_err());
    }

    #[test]
    fn test_latch_assembles_tone_period() {
        let mut chip = test_chip();
        // Latch tone 0 frequency low nibble, then extend with the data byte.
        chip.write(0x8D);
        chip.write(0x26);
        assert_eq!(chip.tones[0].freq, 0x26D);
    }

    #[test]
    fn test_data_byte_targets_latched_channel() {
        let mut chip = test_chip();
        chip.write(0xC5); // tone 2 low nibble
        chip.write(0x11);
        assert_eq!(chip.tones[2].freq, 0x115);
        assert_eq!(chip.tones[0].freq, 0);
        assert_eq!(chip.tones[1].freq, 0);
    }

    #[test]
    fn test_volume_latch() {
        let mut chip = test_chip();
        chip.write(0x93); // tone 0 attenuation 3
        assert_eq!(chip.tones[0].volume, 3);
        chip.write(0xF7); // noise attenuation 7
        assert_eq!(chip.noise_volume, 7);
    }

    #[test]
    fn test_noise_control_write() {
        let mut chip = test_chip();
        chip.write(0xE6); // white noise, rate index 2
        assert!(chip.noise_white);
        assert!(!chip.noise_ref);
        assert_eq!(chip.noise_freq, 128);
        assert_eq!(chip.noise_seed, 0x8000);

        // Rate index 3 tracks tone 2.
        chip.write(0xC8);
        chip.write(0x01); // tone 2 period 0x18
        chip.write(0xE7);
        assert!(chip.noise_ref);
        assert_eq!(chip.noise_freq, 0x18);
    }

    #[test]
    fn test_noise_data_byte_leaves_noise_alone() {
        let mut chip = test_chip();
        chip.write(0xE5); // periodic noise, rate 64
        chip.write(0x3F); // data byte while register 6 is latched
        assert_eq!(chip.noise_freq, 64);
        assert!(!chip.noise_white);
        for tone in &chip.tones {
            assert_eq!(tone.freq, 0);
        }
    }

    #[test]
    fn test_silent_channel_outputs_zero() {
        // Latch of 0x8F touches the tone 0 period only; every volume is
        // still at the silent reset value.
        let mut chip = test_chip();
        chip.write(0x8F);
        chip.clock();
        assert_eq!(chip.channel_outputs()[0], 0.0);
    }

    #[test]
    fn test_tone_sample_is_deterministic() {
        // Volume 0 on tone 0 with a period long enough not to roll over in
        // one sample: the edge stays at its reset level, output is -1.
        let mut chip = test_chip();
        chip.write(0x90);
        chip.write(0x80);
        chip.write(0x20); // period 0x200
        chip.clock();
        assert_eq!(chip.channel_outputs()[0], -1.0);
    }

    #[test]
    fn test_output_negate_flag() {
        let mut settings = PsgSettings::default();
        settings.flags |= PsgFlags::OUTPUT_NEG;
        let mut chip = Sn76489::new(&settings).unwrap();
        chip.write(0x90);
        chip.write(0x80);
        chip.write(0x20);
        chip.clock();
        assert_eq!(chip.channel_outputs()[0], 1.0);
    }

    #[test]
    fn test_short_period_holds_edge_high() {
        let mut chip = test_chip();
        chip.write(0x90); // tone 0 volume 0
        chip.write(0x81); // period 1
        for _ in 0..2000 {
            chip.clock();
            // Once the accumulator first rolls over the edge pins high and
            // the output never toggles back.
            if chip.tones[0].edge {
                break;
            }
        }
        assert!(chip.tones[0].edge);
        chip.clock();
        assert_eq!(chip.channel_outputs()[0], 1.0);
    }

    #[test]
    fn test_advance_is_additive() {
        // Advancing n then m samples matches advancing n+m in one burst.
        let mut split = test_chip();
        split.write(0x90);
        split.write(0x84);
        split.write(0x01); // tone 0 period 0x14
        split.write(0xE4); // white noise
        split.write(0xF0); // noise volume 0
        let mut joined = split.clone();

        for _ in 0..37 {
            split.clock();
        }
        for _ in 0..63 {
            split.clock();
        }
        for _ in 0..100 {
            joined.clock();
        }
        assert_eq!(split.channel_outputs(), joined.channel_outputs());
        assert_eq!(split.noise_seed, joined.noise_seed);
        assert_eq!(split.base_count, joined.base_count);
    }

    #[test]
    fn test_white_noise_lfsr_is_maximal_length() {
        let mut chip = test_chip();
        chip.write(0xE4); // white noise, reseeds to 0x8000
        let initial = chip.noise_seed;
        for step in 1..(1u32 << 16) {
            chip.shift_noise();
            if chip.noise_seed == initial {
                assert_eq!(step, (1 << 16) - 1, "LFSR period shorter than maximal");
            }
        }
        assert_eq!(chip.noise_seed, initial);
    }

    #[test]
    fn test_periodic_noise_period_equals_width() {
        for width in [4u8, 15, 16] {
            let mut settings = PsgSettings::default();
            settings.sr_width = width;
            let mut chip = Sn76489::new(&settings).unwrap();
            let initial = chip.noise_seed;
            for _ in 0..width {
                chip.shift_noise();
            }
            assert_eq!(chip.noise_seed, initial);
        }
    }

    #[test]
    fn test_lfsr_width_one_stays_seeded() {
        let mut settings = PsgSettings::default();
        settings.sr_width = 1;
        let mut chip = Sn76489::new(&settings).unwrap();
        assert_eq!(chip.noise_seed, 1);
        for _ in 0..8 {
            chip.shift_noise();
            assert_eq!(chip.noise_seed, 1);
        }
    }

    #[test]
    fn test_outputs_stay_bounded() {
        let mut chip = test_chip();
        chip.write(0x90);
        chip.write(0x82);
        chip.write(0x00); // period 2, fastest toggling
        chip.write(0xE4);
        chip.write(0xF0);
        for _ in 0..1000 {
            chip.clock();
            for value in chip.channel_outputs() {
                assert!(value.abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_channel_mute() {
        let mut chip = test_chip();
        chip.write(0x90);
        chip.write(0x80);
        chip.write(0x20);
        chip.set_channel_mute(0, true);
        assert!(chip.is_channel_muted(0));
        chip.clock();
        assert_eq!(chip.channel_outputs()[0], 0.0);
        chip.set_channel_mute(0, false);
        chip.clock();
        assert_ne!(chip.channel_outputs()[0], 0.0);
    }
}
