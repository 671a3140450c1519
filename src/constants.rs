//! Shared playback constants.

/// Output sample rate every VGM wait is defined against.
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples in one 60 Hz frame (opcode 0x62).
pub const NTSC_FRAME_SAMPLES: u32 = 735;

/// Samples in one 50 Hz frame (opcode 0x63).
pub const PAL_FRAME_SAMPLES: u32 = 882;
