use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use dcp_writer_core::package::domain::certificate_chain::CertificateChain;
use dcp_writer_core::package::infrastructure::digest::hex_sha1;
use dcp_writer_core::package::infrastructure::rsa_certificate_chain::RsaCertificateChain;
use dcp_writer_core::package::infrastructure::xml_package_writer::XmlPackageWriter;
use dcp_writer_core::reel::domain::reel_partition::{
    partition, ContentCategory, ContentSpan, ReelType,
};
use dcp_writer_core::reel::infrastructure::file_reel_writer::FileReelWriterFactory;
use dcp_writer_core::shared::config::DcpConfig;
use dcp_writer_core::shared::dcp_time::DcpTime;
use dcp_writer_core::shared::encoded_data::EncodedData;
use dcp_writer_core::shared::eyes::Eyes;
use dcp_writer_core::shared::film::{ContentKind, Film, Standard};
use dcp_writer_core::writer::dcp_writer::Writer;
use dcp_writer_core::writer::job_reporter::LogJobReporter;

const AUDIO_FRAME_RATE: u32 = 48_000;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Packages a directory of pre-encoded JPEG 2000 frames as a DCP.
#[derive(Parser)]
#[command(name = "dcp-writer")]
struct Cli {
    /// Directory holding one encoded frame per file, in file-name order.
    frames: PathBuf,

    /// Directory in which the package and its working files are created.
    output: PathBuf,

    /// Title of the composition.
    #[arg(long, default_value = "Untitled")]
    name: String,

    /// Video frame rate.
    #[arg(long, default_value = "24")]
    fps: u32,

    /// Package as stereoscopic, writing each frame to both eyes.
    #[arg(long)]
    three_d: bool,

    /// Reel policy: single or length.
    #[arg(long, default_value = "single")]
    reel_type: String,

    /// Target reel size in bytes for --reel-type length.
    #[arg(long, default_value = "2000000000")]
    reel_length_bytes: u64,

    /// Picture bandwidth in bits per second.
    #[arg(long, default_value = "250000000")]
    j2k_bandwidth: u64,

    /// Producer threads (defaults to the configured encoder threads).
    #[arg(long)]
    threads: Option<usize>,

    /// Channels of silent sound to include (0 for none).
    #[arg(long, default_value = "6")]
    audio_channels: usize,

    /// Packaging standard: smpte or interop.
    #[arg(long, default_value = "smpte")]
    standard: String,

    /// PKCS#8 PEM private key to sign with (overrides the config file).
    #[arg(long)]
    sign_key: Option<PathBuf>,

    /// JSON config file (defaults to the per-user config).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut config = match &cli.config {
        Some(path) => DcpConfig::load(path)?,
        None => DcpConfig::load_or_default(),
    };
    if let Some(threads) = cli.threads {
        config.encoder_threads = threads;
    }

    let frames = list_frames(&cli.frames)?;
    if frames.is_empty() {
        return Err(format!("No frames found in {}", cli.frames.display()).into());
    }
    log::info!("Found {} frames in {}", frames.len(), cli.frames.display());

    let sign_key = cli.sign_key.clone().or_else(|| config.signer_key.clone());
    let film = build_film(&cli, frames.len() as i64, sign_key.is_some())?;
    let signer: Option<Arc<dyn CertificateChain>> = match &sign_key {
        Some(path) => Some(Arc::new(RsaCertificateChain::from_pem_file(
            path,
            config.signer_subject.clone(),
            config.signer_valid_days,
        )?)),
        None => None,
    };

    let mut writer = Writer::new(
        film.clone(),
        &config,
        &FileReelWriterFactory::new(film.clone()),
        Box::new(XmlPackageWriter::new(film.dcp_dir())),
        signer,
        Box::new(LogJobReporter::default()),
    )?;
    writer.start()?;

    let reusable = reusable_frames(&writer, &frames)?;
    if reusable > 0 {
        log::info!("Reusing {reusable} frames from an earlier run");
    }
    feed_frames(&writer, frames, reusable, config.encoder_threads.max(1))?;
    for _ in 0..film.length_in_frames() {
        writer.write_audio(None)?;
    }

    let summary = writer.finish()?;
    if !summary.dropped.is_empty() {
        log::warn!("{} frames could not be written", summary.dropped.len());
    }
    log::info!("Output written to {}", summary.cpl_path.display());
    Ok(())
}

/// Number of leading frames whose files still hash to what an earlier run
/// recorded. Writing a changed frame moves every later frame of the picture
/// asset, so reuse stops at the first mismatch.
fn reusable_frames(writer: &Writer, frames: &[PathBuf]) -> Result<usize, Box<dyn std::error::Error>> {
    let eyes = if writer.film().three_d {
        Eyes::Left
    } else {
        Eyes::Both
    };
    for (frame, path) in frames.iter().enumerate() {
        let frame_index = frame as i64;
        // Reel starts are always rewritten, so they only need a matching record.
        if writer.can_repeat(frame_index) && !writer.can_fake_write(frame_index) {
            return Ok(frame);
        }
        let Ok(info) = writer.frame_info(frame_index, eyes) else {
            return Ok(frame);
        };
        if hex_sha1(&fs::read(path)?) != info.hash {
            log::info!("{} changed since the last run", path.display());
            return Ok(frame);
        }
    }
    Ok(frames.len())
}

/// Hands frames to producer threads through a work queue. The first
/// `reusable` frames are fake-written where possible instead of being read.
fn feed_frames(
    writer: &Writer,
    frames: Vec<PathBuf>,
    reusable: usize,
    threads: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(i64, PathBuf)>();
    for (frame, path) in frames.into_iter().enumerate() {
        job_tx.send((frame as i64, path))?;
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let job_rx = job_rx.clone();
                scope.spawn(move || -> Result<(), SendError> {
                    for (frame, path) in job_rx {
                        if (frame as usize) < reusable && writer.can_fake_write(frame) {
                            writer.fake_write(frame, Eyes::Both)?;
                        } else {
                            writer.write(EncodedData::from_file(&path)?, frame, Eyes::Both)?;
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .map_err(|_| "producer thread panicked")?
                .map_err(|e| -> Box<dyn std::error::Error> { e.to_string().into() })?;
        }
        Ok(())
    })
}

fn build_film(cli: &Cli, frame_count: i64, signed: bool) -> Result<Film, Box<dyn std::error::Error>> {
    let length = DcpTime::from_frames(frame_count, cli.fps);
    let reel_type = parse_reel_type(&cli.reel_type, cli.reel_length_bytes)?;
    let content = [ContentSpan::new(
        ContentCategory::Video,
        DcpTime::default(),
        length,
    )];
    let reels = partition(length, cli.fps, reel_type, cli.j2k_bandwidth, &content);
    log::info!("Packaging {} frames in {} reels", frame_count, reels.len());

    Ok(Film {
        name: cli.name.clone(),
        directory: cli.output.clone(),
        dcp_name: dcp_name(&cli.name),
        content_kind: ContentKind::Feature,
        video_frame_rate: cli.fps,
        length,
        three_d: cli.three_d,
        audio_channels: cli.audio_channels,
        audio_frame_rate: AUDIO_FRAME_RATE,
        standard: parse_standard(&cli.standard)?,
        signed,
        reels,
    })
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.frames.is_dir() {
        return Err(format!("Frames directory not found: {}", cli.frames.display()).into());
    }
    if cli.fps == 0 {
        return Err("Frame rate must be positive".into());
    }
    if cli.j2k_bandwidth == 0 {
        return Err("J2K bandwidth must be positive".into());
    }
    parse_reel_type(&cli.reel_type, cli.reel_length_bytes)?;
    parse_standard(&cli.standard)?;
    if let Some(key) = &cli.sign_key {
        if !key.exists() {
            return Err(format!("Signing key not found: {}", key.display()).into());
        }
    }
    Ok(())
}

fn parse_reel_type(reel_type: &str, bytes: u64) -> Result<ReelType, String> {
    match reel_type {
        "single" => Ok(ReelType::Single),
        "length" if bytes > 0 => Ok(ReelType::ByLength { bytes }),
        "length" => Err("Reel length must be positive".to_string()),
        other => Err(format!(
            "Reel type must be 'single' or 'length', got '{other}'"
        )),
    }
}

fn parse_standard(standard: &str) -> Result<Standard, String> {
    match standard {
        "smpte" => Ok(Standard::Smpte),
        "interop" => Ok(Standard::Interop),
        other => Err(format!(
            "Standard must be 'smpte' or 'interop', got '{other}'"
        )),
    }
}

/// Package directory name: the title with anything but letters and digits
/// replaced, tagged as a feature.
fn dcp_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{cleaned}_FTR")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcp_writer_core::writer::job_reporter::NullJobReporter;
    use std::ffi::OsString;

    #[test]
    fn test_parse_reel_type() {
        assert_eq!(parse_reel_type("single", 0), Ok(ReelType::Single));
        assert_eq!(
            parse_reel_type("length", 1000),
            Ok(ReelType::ByLength { bytes: 1000 })
        );
        assert!(parse_reel_type("length", 0).is_err());
        assert!(parse_reel_type("content", 1000).is_err());
    }

    #[test]
    fn test_parse_standard() {
        assert_eq!(parse_standard("interop"), Ok(Standard::Interop));
        assert!(parse_standard("dci").is_err());
    }

    fn write_frames(dir: &Path, frames: &[Vec<u8>]) {
        for (i, bytes) in frames.iter().enumerate() {
            fs::write(dir.join(format!("{i:06}.j2c")), bytes).unwrap();
        }
    }

    fn package(cli: &Cli) -> (Writer, Vec<PathBuf>) {
        let frames = list_frames(&cli.frames).unwrap();
        let film = build_film(cli, frames.len() as i64, false).unwrap();
        let mut writer = Writer::new(
            film.clone(),
            &DcpConfig::default(),
            &FileReelWriterFactory::new(film.clone()),
            Box::new(XmlPackageWriter::new(film.dcp_dir())),
            None,
            Box::new(NullJobReporter),
        )
        .unwrap();
        writer.start().unwrap();
        (writer, frames)
    }

    #[test]
    fn test_changed_frame_is_rewritten_on_second_run() {
        let frames_dir = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let args: Vec<OsString> = vec![
            "dcp-writer".into(),
            frames_dir.path().into(),
            output.path().into(),
            "--audio-channels".into(),
            "0".into(),
        ];
        let cli = Cli::parse_from(args);

        write_frames(frames_dir.path(), &[vec![1; 8], vec![2; 8], vec![3; 8], vec![4; 8]]);
        let (mut writer, frames) = package(&cli);
        assert_eq!(reusable_frames(&writer, &frames).unwrap(), 0);
        feed_frames(&writer, frames, 0, 2).unwrap();
        writer.finish().unwrap();

        write_frames(frames_dir.path(), &[vec![1; 8], vec![2; 8], vec![9; 12], vec![4; 8]]);
        let (mut writer, frames) = package(&cli);
        assert_eq!(reusable_frames(&writer, &frames).unwrap(), 2);
        feed_frames(&writer, frames, 2, 2).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!(summary.fake_written, 1);
        assert_eq!(summary.full_written, 3);

        let film = writer.film();
        let asset = fs::read(film.video_asset_path(&film.reels[0])).unwrap();
        let mut expected = vec![1u8; 8];
        expected.extend([2u8; 8]);
        expected.extend([9u8; 12]);
        expected.extend([4u8; 8]);
        assert_eq!(asset, expected);
    }

    #[test]
    fn test_dcp_name() {
        assert_eq!(dcp_name("My Film: Part 2"), "My_Film__Part_2_FTR");
    }
}
