//! VGM file loading
//!
//! Ties decompression, header parsing and GD3 extraction together and
//! wires a loaded file into a ready-to-run player.

use crate::compression::decompress_if_needed;
use crate::player::{TrackLayout, VgmPlayer};
use crate::sn76489::PsgDevice;
use crate::vgm_parser::{Gd3Tag, VgmHeader};
use crate::{Result, VgmError};
use std::fs;
use std::path::Path;

/// A loaded, decompressed VGM file.
#[derive(Debug, Clone)]
pub struct VgmFile {
    /// Parsed main header.
    pub header: VgmHeader,
    /// GD3 metadata, when the file carries a readable tag.
    pub gd3: Option<Gd3Tag>,
    data: Vec<u8>,
}

impl VgmFile {
    /// The music-data region (everything from the data offset on).
    pub fn command_data(&self) -> &[u8] {
        &self.data[self.header.data_offset as usize..]
    }

    /// Build a player with the file's PSG installed.
    ///
    /// # Errors
    ///
    /// [`VgmError::InvalidSetting`] when the file declares no SN76489
    /// clock; this crate emulates nothing else.
    pub fn into_player(self) -> Result<VgmPlayer> {
        let settings = self.header.psg_settings().ok_or_else(|| {
            VgmError::InvalidSetting("file does not use the SN76489 PSG".into())
        })?;
        let layout = TrackLayout::from_header(&self.header);
        let data = self.data[self.header.data_offset as usize..].to_vec();
        let mut player = VgmPlayer::new(data, layout);
        player.install(Box::new(PsgDevice::new(&settings)?))?;
        Ok(player)
    }
}

/// Load a VGM/VGZ file from disk.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<VgmFile> {
    let raw = fs::read(path.as_ref())?;
    let file = load_data(&raw)?;
    log::info!(
        "loaded {} (VGM {}, {} samples{})",
        path.as_ref().display(),
        file.header.version_string(),
        file.header.total_samples,
        if file.header.has_loop() { ", looped" } else { "" }
    );
    Ok(file)
}

/// Load a VGM/VGZ image from memory.
pub fn load_data(raw: &[u8]) -> Result<VgmFile> {
    let data = decompress_if_needed(raw)?;
    let header = VgmHeader::parse(&data)?;

    // A broken tag costs metadata, not playback.
    let gd3 = if header.gd3_offset != 0 {
        match Gd3Tag::parse(&data[header.gd3_offset as usize..]) {
            Ok(tag) => Some(tag),
            Err(e) => {
                log::warn!("ignoring unreadable GD3 tag: {e}");
                None
            }
        }
    } else {
        None
    };

    Ok(VgmFile { header, gd3, data })
}
