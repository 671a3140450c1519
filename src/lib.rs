//! VGM command-stream player for the SN76489 PSG
//!
//! Plays Video Game Music (VGM) files — byte-coded logs of sound-chip
//! register writes clocked in 44,100 Hz samples — through a sample-accurate
//! software SN76489. A generic command dispatcher consumes the stream and
//! knows nothing about any particular chip; the PSG driver plugs into it
//! through the [`EmulatorDevice`] contract, which is also the seam where
//! further chips would attach.
//!
//! # Features
//! - Sample-accurate SN76489 emulation: 3 square-wave tones + LFSR noise
//! - Dual-chip streams (opcodes 0x30/0x3F) and Game Gear stereo masks
//! - Loop-aware playback with a per-sample mixed-output callback
//! - VGM header and GD3 metadata parsing, transparent VGZ (gzip) support
//! - Offline rendering to 32-bit float WAV
//!
//! # Quick start
//! ## Render a file sample by sample
//! ```no_run
//! use vgmplay::load_file;
//!
//! let mut player = load_file("song.vgz")?.into_player()?;
//! player.set_sample_callback(Box::new(|frame| {
//!     let _ = (frame.left, frame.right);
//! }));
//! while !player.is_ended() {
//!     player.next()?;
//! }
//! # Ok::<(), vgmplay::VgmError>(())
//! ```
//!
//! ## Export to WAV
//! ```no_run
//! use vgmplay::{export_to_wav_with_config, load_file, ExportConfig};
//!
//! let file = load_file("song.vgm")?;
//! export_to_wav_with_config(file, "song.wav", ExportConfig::stereo().loops(1))?;
//! # Ok::<(), vgmplay::VgmError>(())
//! ```

#![warn(missing_docs)]

pub mod compression; // VGZ (gzip) handling
pub mod constants; // Shared playback constants
pub mod export; // Offline WAV rendering
pub mod player; // Command dispatcher & playback engine
pub mod sn76489; // SN76489 PSG emulation
pub mod vgm_loader; // VGM file I/O
pub mod vgm_parser; // VGM header & GD3 parsing

/// Error types for VGM playback operations
#[derive(thiserror::Error, Debug)]
pub enum VgmError {
    /// An opcode handler could not read all of its operand bytes.
    #[error("premature end of stream while reading operands for opcode 0x{opcode:02X}")]
    PrematureEof {
        /// The opcode whose operands were truncated.
        opcode: u8,
    },

    /// A wait command (0x61) ran out of stream inside its sample count.
    #[error("malformed wait command: stream ended inside the sample count")]
    MalformedWait,

    /// No handler is registered for the opcode just read.
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Two handlers claimed the same opcode at install time.
    #[error("duplicate handler for opcode 0x{0:02X}")]
    DuplicateHandler(u8),

    /// The stream addressed a second PSG without declaring dual-chip mode.
    #[error("second PSG addressed but the stream does not enable dual-chip mode")]
    DualChipDisabled,

    /// `next()` was called after the stream ended.
    #[error("stream has already ended")]
    AlreadyEnded,

    /// A chip was configured with out-of-range settings.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Error while parsing the file format.
    #[error("parse error: {0}")]
    Parse(String),

    /// Error while inflating a VGZ stream.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Error writing an audio file.
    #[error("audio file write error: {0}")]
    AudioFile(String),

    /// IO error from the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, VgmError>;

// Public API exports
pub use compression::decompress_if_needed;
pub use export::{export_to_wav, export_to_wav_with_config, ExportConfig, ExportSummary};
pub use player::{CommandStream, EmulatorDevice, SampleFrame, TrackLayout, VgmPlayer};
pub use sn76489::{PsgDevice, PsgFlags, PsgSettings, Sn76489};
pub use vgm_loader::{load_data, load_file, VgmFile};
pub use vgm_parser::{Gd3Tag, VgmHeader};
