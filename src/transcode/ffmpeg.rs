//! `ffmpeg` subprocess implementation of [`Transcode`]

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{FomaError, Result};
use crate::transcode::{OpusProfile, PcmFormat, Transcode};

/// Environment variable overriding the executable lookup
pub const FFMPEG_ENV: &str = "FOMA_FFMPEG";

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 8;

/// Runs `ffmpeg` for every transcoding request
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    executable: PathBuf,
    compression_level: u8,
    block_size: u32,
}

impl FfmpegTranscoder {
    pub fn new(executable: impl Into<PathBuf>, compression_level: u8, block_size: u32) -> Self {
        Self {
            executable: executable.into(),
            compression_level,
            block_size,
        }
    }

    /// Find the executable: explicit path, then `FOMA_FFMPEG`, then `PATH`
    ///
    /// # Errors
    /// `ToolNotFound` when an explicit path does not exist, or when no
    /// explicit path is given and neither fallback resolves.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(FomaError::ToolNotFound {
                tool: path.display().to_string(),
            });
        }

        if let Ok(path) = std::env::var(FFMPEG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        which::which("ffmpeg").map_err(|_| FomaError::ToolNotFound {
            tool: "ffmpeg".to_string(),
        })
    }

    fn run(&self, args: Vec<OsString>) -> Result<()> {
        debug!("Running {} {:?}", self.executable.display(), args);

        let output = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FomaError::ToolNotFound {
                    tool: self.executable.display().to_string(),
                },
                _ => FomaError::Io(e),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");

        Err(FomaError::ToolFailed {
            tool: "ffmpeg".to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: tail,
        })
    }
}

fn encode_error(artifact: &Path, err: FomaError) -> FomaError {
    FomaError::Encode {
        artifact: artifact.to_path_buf(),
        reason: err.to_string(),
    }
}

fn os(s: impl Into<OsString>) -> OsString {
    s.into()
}

pub(crate) fn flac_args(
    source: &Path,
    dest: &Path,
    format: PcmFormat,
    compression_level: u8,
    block_size: u32,
) -> Vec<OsString> {
    let mut args = vec![
        os("-i"),
        source.as_os_str().to_owned(),
        os("-ar"),
        os(format.sample_rate.to_string()),
        os("-acodec"),
        os("flac"),
        os("-compression_level"),
        os(compression_level.to_string()),
        os("-blocksize"),
        os(block_size.to_string()),
    ];
    match format.bit_depth {
        16 => args.extend([os("-sample_fmt"), os("s16")]),
        24 => args.extend([
            os("-sample_fmt"),
            os("s32"),
            os("-bits_per_raw_sample"),
            os("24"),
        ]),
        // Other depths keep whatever the source carries
        _ => {}
    }
    args.extend([dest.as_os_str().to_owned(), os("-y")]);
    args
}

pub(crate) fn opus_args(source: &Path, dest: &Path, profile: &OpusProfile) -> Vec<OsString> {
    let mut args = vec![
        os("-i"),
        source.as_os_str().to_owned(),
        os("-ar"),
        os(profile.sample_rate.to_string()),
        os("-acodec"),
        os("libopus"),
        os("-b:a"),
        os(profile.bitrate.as_str()),
        os("-vbr"),
        os(if profile.vbr { "on" } else { "off" }),
        os("-frame_duration"),
        os(profile.frame_duration_ms.to_string()),
        os("-application"),
        os(profile.application.as_str()),
        os("-compression_level"),
        os("10"),
        os("-ac"),
        os(profile.channels.to_string()),
    ];
    if let (1, Some(gain)) = (profile.channels, profile.mono_gain_db) {
        args.extend([os("-af"), os(format!("volume={}dB", gain))]);
    }
    args.extend([dest.as_os_str().to_owned(), os("-y")]);
    args
}

/// Sibling path used while rewriting a file: `name.tmp.ext`
fn staging_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut name = stem;
    name.push(".tmp");
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

fn discard(staging: &Path) {
    if staging.exists() {
        let _ = fs::remove_file(staging);
    }
}

/// Move `staging` over `path`, removing `staging` if that fails
fn replace_with(staging: &Path, path: &Path) -> std::io::Result<()> {
    fs::rename(staging, path).inspect_err(|_| discard(staging))
}

impl Transcode for FfmpegTranscoder {
    fn encode_flac(&self, source: &Path, dest: &Path, format: PcmFormat) -> Result<()> {
        self.run(flac_args(
            source,
            dest,
            format,
            self.compression_level,
            self.block_size,
        ))
        .map_err(|e| encode_error(dest, e))?;
        info!("FLAC file created: {}", dest.display());
        Ok(())
    }

    fn encode_opus(&self, source: &Path, dest: &Path, profile: &OpusProfile) -> Result<()> {
        self.run(opus_args(source, dest, profile))
            .map_err(|e| encode_error(dest, e))?;
        info!("Opus file created: {}", dest.display());
        Ok(())
    }

    fn extract_cover(&self, source: &Path, dest: &Path) -> Result<()> {
        let args = vec![
            os("-i"),
            source.as_os_str().to_owned(),
            os("-an"),
            os("-vcodec"),
            os("copy"),
            os("-vframes"),
            os("1"),
            dest.as_os_str().to_owned(),
            os("-y"),
        ];
        self.run(args).map_err(|e| encode_error(dest, e))?;
        info!("Album art extracted to {}", dest.display());
        Ok(())
    }

    fn strip_metadata(&self, path: &Path) -> Result<()> {
        let staging = staging_path(path);
        let args = vec![
            os("-i"),
            path.as_os_str().to_owned(),
            os("-vn"),
            os("-map_metadata"),
            os("-1"),
            os("-c:a"),
            os("copy"),
            staging.as_os_str().to_owned(),
            os("-y"),
        ];

        if let Err(e) = self.run(args) {
            discard(&staging);
            return Err(encode_error(path, e));
        }

        replace_with(&staging, path).map_err(|e| encode_error(path, FomaError::Io(e)))?;
        info!("Metadata removed from {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_flac_args_for_consumer_tier() {
        let args = strings(flac_args(
            Path::new("in.flac"),
            Path::new("out_CR.flac"),
            PcmFormat::new(48000, 16),
            8,
            4096,
        ));
        assert_eq!(
            args,
            vec![
                "-i", "in.flac", "-ar", "48000", "-acodec", "flac", "-compression_level", "8",
                "-blocksize", "4096", "-sample_fmt", "s16", "out_CR.flac", "-y"
            ]
        );
    }

    #[test]
    fn test_flac_args_for_24bit_request_raw_depth() {
        let args = strings(flac_args(
            Path::new("r.wav"),
            Path::new("x_SR_residual.flac"),
            PcmFormat::new(96000, 24),
            8,
            4096,
        ));
        assert!(args.windows(2).any(|w| w == ["-bits_per_raw_sample", "24"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "96000"]));
    }

    #[test]
    fn test_thumbnail_gets_gain_only_when_mono() {
        let tn = strings(opus_args(
            Path::new("in.flac"),
            Path::new("x_TN.opus"),
            &OpusProfile::thumbnail(),
        ));
        assert!(tn.windows(2).any(|w| w == ["-af", "volume=-6dB"]));
        assert!(tn.windows(2).any(|w| w == ["-vbr", "on"]));

        let mut stereo = OpusProfile::thumbnail();
        stereo.channels = 2;
        let args = strings(opus_args(Path::new("in.flac"), Path::new("x.opus"), &stereo));
        assert!(!args.iter().any(|a| a == "-af"));
    }

    #[test]
    fn test_preview_profile_args() {
        let lb = strings(opus_args(
            Path::new("in.flac"),
            Path::new("x_LB.opus"),
            &OpusProfile::preview(),
        ));
        assert!(lb.windows(2).any(|w| w == ["-frame_duration", "2.5"]));
        assert!(lb.windows(2).any(|w| w == ["-application", "lowdelay"]));
        assert!(lb.windows(2).any(|w| w == ["-b:a", "128k"]));
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/out/x_LB.opus")),
            PathBuf::from("/out/x_LB.tmp.opus")
        );
    }

    #[test]
    fn test_locate_rejects_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-ffmpeg");
        let err = FfmpegTranscoder::locate(Some(&missing)).unwrap_err();
        assert!(matches!(err, FomaError::ToolNotFound { ref tool } if tool.contains("no-ffmpeg")));
    }

    #[test]
    fn test_failed_replace_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a rename
        let target = dir.path().join("x_LB.opus");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();
        let staging = staging_path(&target);
        fs::write(&staging, b"stripped").unwrap();

        assert!(replace_with(&staging, &target).is_err());
        assert!(!staging.exists());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn test_replace_moves_staging_over_original() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x_CR.flac");
        fs::write(&target, b"tagged").unwrap();
        let staging = staging_path(&target);
        fs::write(&staging, b"stripped").unwrap();

        replace_with(&staging, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"stripped");
        assert!(!staging.exists());
    }

    #[test]
    fn test_locate_prefers_existing_explicit_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = FfmpegTranscoder::locate(Some(file.path())).unwrap();
        assert_eq!(found, file.path());
    }
}
