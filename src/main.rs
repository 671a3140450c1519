//! Command-line front-end: inspect VGM files and render them to WAV.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use vgmplay::{export_to_wav_with_config, load_file, ExportConfig, Gd3Tag, VgmFile};

#[derive(Parser)]
#[command(name = "vgmplay", version)]
#[command(about = "Inspect and render VGM/VGZ files for the SN76489 PSG")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print header and GD3 metadata
    Info {
        /// VGM or VGZ file
        file: PathBuf,

        /// Emit a machine-readable JSON report
        #[arg(long)]
        json: bool,
    },

    /// Render to a WAV file
    Export {
        /// VGM or VGZ file
        file: PathBuf,

        /// Output path (defaults to the input with a .wav extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Extra passes through the loop region for looping tracks
        #[arg(long, default_value_t = 2)]
        loops: u32,

        /// Mix down to a single channel
        #[arg(long)]
        mono: bool,

        /// Fade out the tail over this many seconds
        #[arg(long, default_value_t = 0.0)]
        fade: f32,

        /// Scale the output so the loudest peak hits full scale
        #[arg(long)]
        normalize: bool,
    },
}

#[derive(Serialize)]
struct InfoReport<'a> {
    file: String,
    version: String,
    sn76489_clock: u32,
    dual_chip: bool,
    total_samples: u32,
    duration_seconds: f32,
    looped: bool,
    loop_samples: u32,
    sample_rate_hint: u32,
    gd3: Option<&'a Gd3Tag>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Info { file, json } => cmd_info(&file, json),
        Command::Export {
            file,
            output,
            loops,
            mono,
            fade,
            normalize,
        } => cmd_export(&file, output, loops, mono, fade, normalize),
    }
}

fn cmd_info(path: &Path, json: bool) -> anyhow::Result<()> {
    let file = load_file(path).with_context(|| format!("cannot load {}", path.display()))?;

    if json {
        let report = info_report(path, &file);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let header = &file.header;
    println!("File:          {}", path.display());
    println!("VGM version:   {}", header.version_string());
    let settings = header.psg_settings();
    match settings {
        Some(settings) => println!(
            "SN76489:       {} Hz{}",
            settings.clock,
            if settings.dual_chip { " (dual chip)" } else { "" }
        ),
        None => println!("SN76489:       not used"),
    }
    println!(
        "Duration:      {:.2}s ({} samples)",
        header.duration_seconds(),
        header.total_samples
    );
    if header.has_loop() {
        println!(
            "Loop:          {} samples ({:.2}s)",
            header.loop_samples,
            header.loop_samples as f32 / vgmplay::constants::SAMPLE_RATE as f32
        );
    } else {
        println!("Loop:          none");
    }

    if let Some(gd3) = &file.gd3 {
        println!("Track:         {}", gd3.track_name);
        println!("Game:          {}", gd3.game_name);
        println!("System:        {}", gd3.system_name);
        println!("Author:        {}", gd3.author);
        if !gd3.release_date.is_empty() {
            println!("Released:      {}", gd3.release_date);
        }
        if !gd3.notes.is_empty() {
            println!("Notes:         {}", gd3.notes);
        }
    }

    Ok(())
}

fn info_report<'a>(path: &Path, file: &'a VgmFile) -> InfoReport<'a> {
    let header = &file.header;
    InfoReport {
        file: path.display().to_string(),
        version: header.version_string(),
        sn76489_clock: header
            .psg_settings()
            .map(|settings| settings.clock)
            .unwrap_or(0),
        dual_chip: header
            .psg_settings()
            .map(|settings| settings.dual_chip)
            .unwrap_or(false),
        total_samples: header.total_samples,
        duration_seconds: header.duration_seconds(),
        looped: header.has_loop(),
        loop_samples: header.loop_samples,
        sample_rate_hint: header.sample_rate,
        gd3: file.gd3.as_ref(),
    }
}

fn cmd_export(
    path: &Path,
    output: Option<PathBuf>,
    loops: u32,
    mono: bool,
    fade: f32,
    normalize: bool,
) -> anyhow::Result<()> {
    let file = load_file(path).with_context(|| format!("cannot load {}", path.display()))?;
    let output = output.unwrap_or_else(|| path.with_extension("wav"));

    let base = if mono {
        ExportConfig::mono()
    } else {
        ExportConfig::stereo()
    };
    let config = base.loops(loops).fade_out(fade).normalize(normalize);

    let summary = export_to_wav_with_config(file, &output, config)
        .with_context(|| format!("cannot render {}", output.display()))?;

    println!(
        "Wrote {} ({:.2}s, {} frames{})",
        output.display(),
        summary.duration_seconds,
        summary.frames_written,
        if summary.loops_played > 0 {
            format!(", {} loops", summary.loops_played)
        } else {
            String::new()
        }
    );

    Ok(())
}
