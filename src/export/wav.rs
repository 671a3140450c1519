//! WAV file export
//!
//! Drives a loaded file to completion through the playback engine,
//! collecting every sample the engine's callback reports, and writes
//! 32-bit float WAV via `hound`.

use super::{apply_fade_out, normalize_samples, ExportConfig};
use crate::constants::SAMPLE_RATE;
use crate::vgm_loader::VgmFile;
use crate::{Result, VgmError};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// What an export produced.
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    /// Sample frames written to the file.
    pub frames_written: u32,
    /// Rendered duration in seconds.
    pub duration_seconds: f32,
    /// Loop wraps taken while rendering.
    pub loops_played: u32,
}

/// Render a file to WAV with the default configuration.
pub fn export_to_wav<P: AsRef<Path>>(file: VgmFile, output_path: P) -> Result<ExportSummary> {
    export_to_wav_with_config(file, output_path, ExportConfig::default())
}

/// Render a file to WAV.
///
/// Non-looping tracks render until the stream ends. Looping tracks render
/// one full pass plus `loop_passes` extra passes through the loop region,
/// since they would otherwise never stop.
pub fn export_to_wav_with_config<P: AsRef<Path>>(
    file: VgmFile,
    output_path: P,
    config: ExportConfig,
) -> Result<ExportSummary> {
    let header = file.header.clone();
    let mut player = file.into_player()?;

    let target_frames = if header.has_loop() {
        header
            .total_samples
            .saturating_add(config.loop_passes.saturating_mul(header.loop_samples))
    } else {
        header.total_samples
    };

    log::info!(
        "rendering {} frames ({:.1}s) to {}",
        target_frames,
        target_frames as f32 / SAMPLE_RATE as f32,
        output_path.as_ref().display()
    );

    let collected: Rc<RefCell<Vec<[f32; 3]>>> =
        Rc::new(RefCell::new(Vec::with_capacity(target_frames as usize)));
    let sink = Rc::clone(&collected);
    player.set_sample_callback(Box::new(move |frame| {
        sink.borrow_mut().push([frame.left, frame.right, frame.mono]);
    }));

    // One command may overshoot the target mid-wait; the tail is trimmed
    // below. A stream that under-declares its sample total just ends early.
    while !player.is_ended() && (collected.borrow().len() as u32) < target_frames {
        player.next()?;
    }
    let loops_played = player.loops_played();
    drop(player);

    let mut frames = Rc::try_unwrap(collected)
        .map(RefCell::into_inner)
        .unwrap_or_default();
    frames.truncate(target_frames as usize);

    let mut samples: Vec<f32> = Vec::with_capacity(frames.len() * config.channels as usize);
    for frame in &frames {
        if config.channels == 1 {
            samples.push(frame[2]);
        } else {
            samples.push(frame[0]);
            samples.push(frame[1]);
        }
    }

    if config.normalize {
        normalize_samples(&mut samples);
    }
    apply_fade_out(&mut samples, config.channels, config.fade_out);

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output_path, spec)
        .map_err(|e| VgmError::AudioFile(e.to_string()))?;
    for &sample in &samples {
        writer
            .write_sample(sample)
            .map_err(|e| VgmError::AudioFile(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| VgmError::AudioFile(e.to_string()))?;

    Ok(ExportSummary {
        frames_written: frames.len() as u32,
        duration_seconds: frames.len() as f32 / SAMPLE_RATE as f32,
        loops_played,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgm_loader::load_data;

    fn vgm_image(commands: &[u8], total_samples: u32) -> Vec<u8> {
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"Vgm ");
        data[0x08..0x0C].copy_from_slice(&0x0000_0151u32.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&3_579_545u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&total_samples.to_le_bytes());
        data[0x28..0x2A].copy_from_slice(&9u16.to_le_bytes());
        data[0x2A] = 16;
        data[0x34..0x38].copy_from_slice(&0x0Cu32.to_le_bytes());
        data.extend_from_slice(commands);
        data
    }

    #[test]
    fn test_export_writes_expected_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let file = load_data(&vgm_image(&[0x62, 0x66], 735)).unwrap();
        let summary = export_to_wav(file, &path).unwrap();
        assert_eq!(summary.frames_written, 735);
        assert_eq!(summary.loops_played, 0);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.len(), 735 * 2);
    }

    #[test]
    fn test_mono_export_halves_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");

        let file = load_data(&vgm_image(&[0x62, 0x66], 735)).unwrap();
        let summary =
            export_to_wav_with_config(file, &path, ExportConfig::mono()).unwrap();
        assert_eq!(summary.frames_written, 735);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 735);
    }

    #[test]
    fn test_looping_track_renders_requested_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");

        // Loop over the second frame only.
        let mut image = vgm_image(&[0x62, 0x62, 0x66], 1470);
        image[0x1C..0x20].copy_from_slice(&(0x41u32 - 0x1C).to_le_bytes());
        image[0x20..0x24].copy_from_slice(&735u32.to_le_bytes());

        let file = load_data(&image).unwrap();
        let summary =
            export_to_wav_with_config(file, &path, ExportConfig::stereo().loops(2)).unwrap();
        assert_eq!(summary.frames_written, 1470 + 2 * 735);
        assert_eq!(summary.loops_played, 2);
    }
}
