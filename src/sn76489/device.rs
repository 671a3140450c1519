//! PSG driver: one or two SN76489 chips behind the emulator-device contract.
//!
//! The driver owns the chip instances, claims the four PSG opcodes of the
//! VGM command set, and applies the Game Gear stereo mask when copying chip
//! outputs into the left/right channel views the dispatcher mixes from.

use super::{PsgFlags, PsgSettings, Sn76489, PSG_CHANNELS};
use crate::player::device::{CommandStream, EmulatorDevice};
use crate::{Result, VgmError};

/// Register write to PSG #1.
const OP_PSG_WRITE: u8 = 0x50;
/// Register write to PSG #2 (dual-chip streams only).
const OP_PSG2_WRITE: u8 = 0x30;
/// Game Gear stereo mask for PSG #1.
const OP_GG_STEREO: u8 = 0x4F;
/// Game Gear stereo mask for PSG #2 (dual-chip streams only).
const OP_GG2_STEREO: u8 = 0x3F;

/// SN76489 emulator device.
///
/// Constructed from the header's [`PsgSettings`]; a dual-chip stream gets
/// two independent chip instances addressed by the 0x30/0x3F opcodes. Each
/// chip contributes four entries to the channel views, gated per sample by
/// its stereo mask (low nibble = right, high nibble = left, bit order
/// channel 0 to noise). Masks start fully open at 0xFF.
#[derive(Debug, Clone)]
pub struct PsgDevice {
    chips: Vec<Sn76489>,
    dual_chip: bool,
    /// Stereo writes are consumed but discarded when the header disables
    /// the Game Gear mask.
    stereo_writable: bool,
    gg_stereo: [u8; 2],
    left: Vec<f32>,
    right: Vec<f32>,
}

impl PsgDevice {
    /// Build the driver and its chip instances from header settings.
    pub fn new(settings: &PsgSettings) -> Result<Self> {
        let chip_count = if settings.dual_chip { 2 } else { 1 };
        let chips = (0..chip_count)
            .map(|_| Sn76489::new(settings))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            chips,
            dual_chip: settings.dual_chip,
            stereo_writable: !settings.flags.contains(PsgFlags::GG_STEREO_OFF),
            gg_stereo: [0xFF; 2],
            left: vec![0.0; PSG_CHANNELS * chip_count],
            right: vec![0.0; PSG_CHANNELS * chip_count],
        })
    }

    /// Number of chip instances (1 or 2).
    pub fn chip_count(&self) -> usize {
        self.chips.len()
    }

    /// Access a chip instance.
    pub fn chip(&self, index: usize) -> Option<&Sn76489> {
        self.chips.get(index)
    }

    /// Mutable access to a chip instance (diagnostic muting and resets).
    pub fn chip_mut(&mut self, index: usize) -> Option<&mut Sn76489> {
        self.chips.get_mut(index)
    }

    /// Current stereo mask for a chip.
    pub fn stereo_mask(&self, index: usize) -> u8 {
        self.gg_stereo[index]
    }

    fn read_operand(stream: &mut CommandStream, opcode: u8) -> Result<u8> {
        stream
            .read_u8()
            .ok_or(VgmError::PrematureEof { opcode })
    }

    /// Fail unless the stream was declared dual-chip. Checked before the
    /// operand is read, so a lone 0x30 at end-of-data still reports the
    /// dual-chip error.
    fn require_dual_chip(&self) -> Result<()> {
        if self.dual_chip {
            Ok(())
        } else {
            Err(VgmError::DualChipDisabled)
        }
    }
}

impl EmulatorDevice for PsgDevice {
    fn opcodes(&self) -> &'static [u8] {
        &[OP_PSG_WRITE, OP_PSG2_WRITE, OP_GG_STEREO, OP_GG2_STEREO]
    }

    fn execute(&mut self, opcode: u8, stream: &mut CommandStream) -> Result<u32> {
        match opcode {
            OP_PSG_WRITE => {
                let value = Self::read_operand(stream, opcode)?;
                self.chips[0].write(value);
            }
            OP_PSG2_WRITE => {
                self.require_dual_chip()?;
                let value = Self::read_operand(stream, opcode)?;
                self.chips[1].write(value);
            }
            OP_GG_STEREO => {
                let mask = Self::read_operand(stream, opcode)?;
                if self.stereo_writable {
                    self.gg_stereo[0] = mask;
                }
            }
            OP_GG2_STEREO => {
                self.require_dual_chip()?;
                let mask = Self::read_operand(stream, opcode)?;
                if self.stereo_writable {
                    self.gg_stereo[1] = mask;
                }
            }
            other => return Err(VgmError::UnknownOpcode(other)),
        }
        Ok(0)
    }

    fn advance_sample(&mut self, n: u32) {
        for _ in 0..n {
            for (index, chip) in self.chips.iter_mut().enumerate() {
                chip.clock();
                let outputs = chip.channel_outputs();
                let mask = self.gg_stereo[index];
                let base = index * PSG_CHANNELS;
                for (channel, &value) in outputs.iter().enumerate() {
                    self.right[base + channel] = if mask & (1 << channel) != 0 {
                        value
                    } else {
                        0.0
                    };
                    self.left[base + channel] = if mask & (1 << (channel + 4)) != 0 {
                        value
                    } else {
                        0.0
                    };
                }
            }
        }
    }

    fn left_channels(&self) -> &[f32] {
        &self.left
    }

    fn right_channels(&self) -> &[f32] {
        &self.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> PsgDevice {
        PsgDevice::new(&PsgSettings::default()).unwrap()
    }

    fn dual_device() -> PsgDevice {
        let mut settings = PsgSettings::default();
        settings.dual_chip = true;
        PsgDevice::new(&settings).unwrap()
    }

    /// Program tone 0 of the addressed chip to a long period at volume 0.
    fn program_tone0(device: &mut PsgDevice, write_opcode: u8) {
        let mut stream = CommandStream::new(vec![0x90, 0x80, 0x20]);
        for _ in 0..3 {
            device.execute(write_opcode, &mut stream).unwrap();
        }
    }

    #[test]
    fn test_single_chip_has_four_channels() {
        let device = device();
        assert_eq!(device.left_channels().len(), 4);
        assert_eq!(device.right_channels().len(), 4);
        assert_eq!(device.stereo_mask(0), 0xFF);
    }

    #[test]
    fn test_dual_chip_has_eight_channels() {
        let device = dual_device();
        assert_eq!(device.chip_count(), 2);
        assert_eq!(device.left_channels().len(), 8);
    }

    #[test]
    fn test_second_chip_rejected_without_dual_mode() {
        let mut device = device();
        let mut stream = CommandStream::new(vec![0x90]);
        assert!(matches!(
            device.execute(0x30, &mut stream),
            Err(VgmError::DualChipDisabled)
        ));
        // The operand was not consumed.
        assert_eq!(stream.position(), 0);

        let mut stream = CommandStream::new(vec![0xFF]);
        assert!(matches!(
            device.execute(0x3F, &mut stream),
            Err(VgmError::DualChipDisabled)
        ));
    }

    #[test]
    fn test_missing_operand_is_premature_eof() {
        let mut device = device();
        let mut stream = CommandStream::new(vec![]);
        assert!(matches!(
            device.execute(0x50, &mut stream),
            Err(VgmError::PrematureEof { opcode: 0x50 })
        ));
    }

    #[test]
    fn test_stereo_mask_gates_channels() {
        let mut device = device();
        program_tone0(&mut device, 0x50);

        // Mask 0x11: channel 0 on both sides, everything else silent.
        let mut stream = CommandStream::new(vec![0x11]);
        device.execute(0x4F, &mut stream).unwrap();
        device.advance_sample(1);

        assert_eq!(device.left_channels()[0], -1.0);
        assert_eq!(device.right_channels()[0], -1.0);
        for channel in 1..4 {
            assert_eq!(device.left_channels()[channel], 0.0);
            assert_eq!(device.right_channels()[channel], 0.0);
        }
    }

    #[test]
    fn test_stereo_mask_sides_are_independent() {
        let mut device = device();
        program_tone0(&mut device, 0x50);

        // Channel 0 left-only.
        let mut stream = CommandStream::new(vec![0x10]);
        device.execute(0x4F, &mut stream).unwrap();
        device.advance_sample(1);

        assert_eq!(device.left_channels()[0], -1.0);
        assert_eq!(device.right_channels()[0], 0.0);
    }

    #[test]
    fn test_stereo_off_discards_but_consumes_mask() {
        let mut settings = PsgSettings::default();
        settings.flags |= PsgFlags::GG_STEREO_OFF;
        let mut device = PsgDevice::new(&settings).unwrap();

        let mut stream = CommandStream::new(vec![0x00, 0x66]);
        device.execute(0x4F, &mut stream).unwrap();
        assert_eq!(stream.position(), 1);
        assert_eq!(device.stereo_mask(0), 0xFF);
    }

    #[test]
    fn test_dual_chips_run_independently() {
        let mut device = dual_device();
        program_tone0(&mut device, 0x50);
        device.advance_sample(1);

        // Chip 1 carries the tone, chip 2 stays silent.
        assert_eq!(device.left_channels()[0], -1.0);
        assert_eq!(device.left_channels()[4], 0.0);

        program_tone0(&mut device, 0x30);
        device.advance_sample(1);
        assert_eq!(device.left_channels()[4], -1.0);
    }
}
