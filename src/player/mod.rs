//! VGM command dispatcher and playback engine.
//!
//! The dispatcher consumes the byte-coded command stream one opcode at a
//! time: wait opcodes advance virtual time in 44,100 Hz samples, chip
//! opcodes route to whichever installed [`EmulatorDevice`] claimed them,
//! and the end-of-data marker either wraps into the loop region or ends the
//! stream for good. During every produced sample the per-sample callback
//! fires with the mixed output of that sample.

pub mod device;

pub use device::{CommandStream, EmulatorDevice};

use crate::constants::{NTSC_FRAME_SAMPLES, PAL_FRAME_SAMPLES, SAMPLE_RATE};
use crate::vgm_parser::VgmHeader;
use crate::{Result, VgmError};

/// Wait `nn nn` samples (little-endian u16 operand).
const OP_WAIT: u8 = 0x61;
/// Wait one 60 Hz frame (735 samples).
const OP_WAIT_NTSC_FRAME: u8 = 0x62;
/// Wait one 50 Hz frame (882 samples).
const OP_WAIT_PAL_FRAME: u8 = 0x63;
/// End-of-data marker.
const OP_END_OF_DATA: u8 = 0x66;

/// Opcodes the dispatcher itself implements; devices may not claim these.
const BUILTIN_OPCODES: [u8; 4] = [OP_WAIT, OP_WAIT_NTSC_FRAME, OP_WAIT_PAL_FRAME, OP_END_OF_DATA];

/// Track timing and loop layout, lifted from the VGM header.
///
/// Offsets are absolute file offsets; the dispatcher's stream starts at
/// `data_offset`, so loop seeks land at `loop_offset - data_offset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackLayout {
    /// Total samples in one pass of the track.
    pub total_samples: u32,
    /// Samples in the loop region (0 = no loop).
    pub loop_samples: u32,
    /// Absolute file offset of the loop point (0 = no loop).
    pub loop_offset: u32,
    /// Absolute file offset of the first command byte.
    pub data_offset: u32,
}

impl TrackLayout {
    /// Extract the layout from a parsed header.
    pub fn from_header(header: &VgmHeader) -> Self {
        Self {
            total_samples: header.total_samples,
            loop_samples: header.loop_samples,
            loop_offset: header.loop_offset,
            data_offset: header.data_offset,
        }
    }

    /// Whether the track declares a loop region.
    pub fn has_loop(&self) -> bool {
        self.loop_offset != 0 && self.loop_samples != 0
    }
}

/// Snapshot handed to the per-sample callback.
///
/// Valid for the duration of the call; the mixed values describe the sample
/// that has just been produced.
#[derive(Debug, Clone, Copy)]
pub struct SampleFrame {
    /// Samples since the start of the track, rewound on loop wrap.
    pub position: u32,
    /// Monotonic sample counter, never rewound.
    pub samples_played: u32,
    /// Completed loop wraps.
    pub loops_played: u32,
    /// Playback time in seconds derived from `samples_played`.
    pub timestamp: f64,
    /// Mixed left output.
    pub left: f32,
    /// Mixed right output.
    pub right: f32,
    /// Mixed mono output.
    pub mono: f32,
}

/// Per-sample callback type.
pub type SampleCallback = Box<dyn FnMut(&SampleFrame)>;

/// The VGM playback engine.
///
/// Owns the command stream and every installed device. Each call to
/// [`next`](Self::next) parses exactly one command; the host keeps calling
/// until [`is_ended`](Self::is_ended) (looping tracks never end on their
/// own). Mixed output for the current sample is readable at any time via
/// [`left_output`](Self::left_output) and friends, and per sample through
/// the callback.
pub struct VgmPlayer {
    stream: CommandStream,
    devices: Vec<Box<dyn EmulatorDevice>>,
    handlers: [Option<usize>; 256],
    layout: TrackLayout,
    position: u32,
    samples_played: u32,
    loops_played: u32,
    end_of_stream: bool,
    on_sample: Option<SampleCallback>,
}

impl VgmPlayer {
    /// Create a dispatcher over a music-data region.
    ///
    /// `data` must start at the first command byte (the header's data
    /// offset); the layout carries the matching absolute offsets.
    pub fn new(data: Vec<u8>, layout: TrackLayout) -> Self {
        Self {
            stream: CommandStream::new(data),
            devices: Vec::new(),
            handlers: [None; 256],
            layout,
            position: 0,
            samples_played: 0,
            loops_played: 0,
            end_of_stream: false,
            on_sample: None,
        }
    }

    /// Install an emulator device and claim its opcodes.
    ///
    /// # Errors
    ///
    /// [`VgmError::DuplicateHandler`] if any claimed opcode is already
    /// registered (built-in waits included); nothing from the conflicting
    /// device is registered.
    pub fn install(&mut self, device: Box<dyn EmulatorDevice>) -> Result<()> {
        for &opcode in device.opcodes() {
            if BUILTIN_OPCODES.contains(&opcode) || self.handlers[opcode as usize].is_some() {
                return Err(VgmError::DuplicateHandler(opcode));
            }
        }
        let index = self.devices.len();
        for &opcode in device.opcodes() {
            self.handlers[opcode as usize] = Some(index);
        }
        self.devices.push(device);
        Ok(())
    }

    /// Register the per-sample callback.
    pub fn set_sample_callback(&mut self, callback: SampleCallback) {
        self.on_sample = Some(callback);
    }

    /// Parse and execute exactly one command.
    ///
    /// Hitting the end-of-data marker (or the physical end of the region)
    /// is not an error: a looping track wraps to its loop point, anything
    /// else enters the terminal ended state.
    ///
    /// # Errors
    ///
    /// [`VgmError::AlreadyEnded`] after the stream ended, plus whatever the
    /// command itself surfaces (unknown opcode, truncated operands,
    /// dual-chip violations).
    pub fn next(&mut self) -> Result<()> {
        if self.end_of_stream {
            return Err(VgmError::AlreadyEnded);
        }

        let opcode = match self.stream.read_u8() {
            Some(opcode) => opcode,
            None => {
                self.end_of_data();
                return Ok(());
            }
        };

        match opcode {
            OP_WAIT => {
                let samples = self
                    .stream
                    .read_u16_le()
                    .ok_or(VgmError::MalformedWait)?;
                self.advance_sample(u32::from(samples));
            }
            OP_WAIT_NTSC_FRAME => self.advance_sample(NTSC_FRAME_SAMPLES),
            OP_WAIT_PAL_FRAME => self.advance_sample(PAL_FRAME_SAMPLES),
            OP_END_OF_DATA => self.end_of_data(),
            opcode => {
                let index = self.handlers[opcode as usize].ok_or(VgmError::UnknownOpcode(opcode))?;
                let wait = self.devices[index].execute(opcode, &mut self.stream)?;
                if wait > 0 {
                    self.advance_sample(wait);
                }
            }
        }
        Ok(())
    }

    /// Run until the stream ends.
    ///
    /// Only meaningful for non-looping tracks; a looping track wraps
    /// forever and this never returns.
    pub fn play_to_end(&mut self) -> Result<()> {
        while !self.end_of_stream {
            self.next()?;
        }
        Ok(())
    }

    /// Stream-end routine: wrap into the loop region or end for good.
    fn end_of_data(&mut self) {
        if self.layout.has_loop() {
            self.position = self
                .layout
                .total_samples
                .saturating_sub(self.layout.loop_samples);
            self.stream
                .seek(self.layout.loop_offset.saturating_sub(self.layout.data_offset) as usize);
            self.loops_played += 1;
            log::debug!(
                "loop {} wrapped at sample {}",
                self.loops_played,
                self.samples_played
            );
        } else {
            self.end_of_stream = true;
        }
    }

    /// Produce `count` samples: advance every device in installation order,
    /// then fire the callback once per sample.
    fn advance_sample(&mut self, count: u32) {
        for _ in 0..count {
            self.samples_played += 1;
            self.position += 1;
            for device in &mut self.devices {
                device.advance_sample(1);
            }
            if self.on_sample.is_some() {
                let frame = SampleFrame {
                    position: self.position,
                    samples_played: self.samples_played,
                    loops_played: self.loops_played,
                    timestamp: self.timestamp(),
                    left: self.left_output(),
                    right: self.right_output(),
                    mono: self.mono_output(),
                };
                if let Some(callback) = self.on_sample.as_mut() {
                    callback(&frame);
                }
            }
        }
    }

    fn mean(values: &[f32]) -> f32 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f32>() / values.len() as f32
        }
    }

    /// Mixed left output of the current sample: the average over devices of
    /// each device's mean left channel value.
    pub fn left_output(&self) -> f32 {
        if self.devices.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .devices
            .iter()
            .map(|device| Self::mean(device.left_channels()))
            .sum();
        sum / self.devices.len() as f32
    }

    /// Mixed right output of the current sample.
    pub fn right_output(&self) -> f32 {
        if self.devices.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .devices
            .iter()
            .map(|device| Self::mean(device.right_channels()))
            .sum();
        sum / self.devices.len() as f32
    }

    /// Mixed mono output of the current sample.
    pub fn mono_output(&self) -> f32 {
        (self.left_output() + self.right_output()) / 2.0
    }

    /// Samples since track start, rewound when the loop wraps.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Monotonic sample counter across loop wraps.
    pub fn samples_played(&self) -> u32 {
        self.samples_played
    }

    /// Completed loop wraps.
    pub fn loops_played(&self) -> u32 {
        self.loops_played
    }

    /// Playback time in seconds.
    pub fn timestamp(&self) -> f64 {
        f64::from(self.samples_played) / f64::from(SAMPLE_RATE)
    }

    /// Whether the stream reached its terminal ended state.
    pub fn is_ended(&self) -> bool {
        self.end_of_stream
    }

    /// Whether playback currently sits inside the loop region.
    pub fn playing_loop(&self) -> bool {
        self.layout.has_loop()
            && self.position
                >= self
                    .layout
                    .total_samples
                    .saturating_sub(self.layout.loop_samples)
    }

    /// The track layout this player was built with.
    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }
}

// =============================================================================
// Tests
// =============================================================================
