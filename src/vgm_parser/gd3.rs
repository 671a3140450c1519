//! GD3 metadata tag parsing
//!
//! The GD3 tag trails the music data and stores eleven null-terminated
//! UTF-16LE strings: track, game, system and author names in English and
//! Japanese, the release date, the ripper, and free-form notes.

use crate::{Result, VgmError};
use serde::Serialize;

/// Tag magic.
const GD3_IDENT: &[u8; 4] = b"Gd3 ";

/// Fixed part of the tag: magic, version, payload length.
const GD3_HEADER_SIZE: usize = 12;

/// Parsed GD3 metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Gd3Tag {
    /// Track name (English).
    pub track_name: String,
    /// Track name (Japanese).
    pub track_name_jp: String,
    /// Game name (English).
    pub game_name: String,
    /// Game name (Japanese).
    pub game_name_jp: String,
    /// System name (English).
    pub system_name: String,
    /// System name (Japanese).
    pub system_name_jp: String,
    /// Track author (English).
    pub author: String,
    /// Track author (Japanese).
    pub author_jp: String,
    /// Release date, free-form.
    pub release_date: String,
    /// Who converted the recording.
    pub ripper: String,
    /// Free-form notes.
    pub notes: String,
}

/// Read one null-terminated UTF-16LE string, advancing the offset.
///
/// A missing terminator consumes the rest of the payload; a dangling odd
/// byte is an error.
fn read_utf16_string(payload: &[u8], offset: &mut usize) -> Result<String> {
    let mut units = Vec::new();
    while *offset < payload.len() {
        if *offset + 2 > payload.len() {
            return Err(VgmError::Parse(
                "GD3 string ends on a split UTF-16 unit".into(),
            ));
        }
        let unit = u16::from_le_bytes([payload[*offset], payload[*offset + 1]]);
        *offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

impl Gd3Tag {
    /// Parse a GD3 tag from a slice starting at the tag magic.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < GD3_HEADER_SIZE {
            return Err(VgmError::Parse("GD3 tag too small for its header".into()));
        }
        if &data[0..4] != GD3_IDENT {
            return Err(VgmError::Parse("invalid GD3 magic".into()));
        }

        let length = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let end = GD3_HEADER_SIZE
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| VgmError::Parse("GD3 payload extends beyond the file".into()))?;
        let payload = &data[GD3_HEADER_SIZE..end];

        let mut offset = 0;
        let mut next = || read_utf16_string(payload, &mut offset);
        Ok(Self {
            track_name: next()?,
            track_name_jp: next()?,
            game_name: next()?,
            game_name_jp: next()?,
            system_name: next()?,
            system_name_jp: next()?,
            author: next()?,
            author_jp: next()?,
            release_date: next()?,
            ripper: next()?,
            notes: next()?,
        })
    }
}
