use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use async_trait::async_trait;
use directories::ProjectDirs;
use rust_embed::RustEmbed;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::{
    orchestrator::{FetchJob, MediaFetcher},
    progress::{PROGRESS_TEMPLATE, ProgressEvent, parse_progress_line},
};

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const BIN: &str = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };

/// Environment variable pointing at a yt-dlp executable
pub const YTDLP_ENV: &str = "YTDLP_PATH";

/// Errors raised while driving the yt-dlp process
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("no per-user cache directory for the bundled yt-dlp")]
    NoCacheDir,
    #[error("failed to unpack bundled yt-dlp: {0}")]
    Unpack(std::io::Error),
    #[error("lost yt-dlp output: {0}")]
    Io(#[from] std::io::Error),
    #[error("{message}")]
    Exited { message: String },
}

/// Fetcher backed by the yt-dlp command line tool
#[derive(Debug, Clone, Default)]
pub struct YtDlp {
    /// Explicit executable, from settings
    pub program: Option<PathBuf>,
    /// Passed as `--ffmpeg-location` when set
    pub ffmpeg_location: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: Option<PathBuf>, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            program,
            ffmpeg_location,
        }
    }

    /// Settings path, then `YTDLP_PATH`, then the bundled copy, then `PATH`
    pub fn resolve_program(&self) -> Result<PathBuf, FetchError> {
        if let Some(p) = &self.program {
            return Ok(p.clone());
        }
        if let Some(p) = std::env::var_os(YTDLP_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(p));
        }
        if let Some(p) = unpack_bundled()? {
            return Ok(p);
        }
        Ok(PathBuf::from(BIN))
    }
}

/// Extracts the embedded yt-dlp into the per-user cache dir and returns its path
fn unpack_bundled() -> Result<Option<PathBuf>, FetchError> {
    let Some(data) = Asset::get(BIN) else {
        return Ok(None);
    };
    let dirs = ProjectDirs::from("com", "yt-video-downloader", "yt-video-downloader")
        .ok_or(FetchError::NoCacheDir)?;
    let path = unpack_to(dirs.cache_dir(), &data.data).map_err(FetchError::Unpack)?;
    Ok(Some(path))
}

/// Writes `data` as `dir/BIN` unless an identical copy is already there.
///
/// The file is written next to the target and renamed into place, so a
/// failed write never leaves a partial executable behind.
fn unpack_to(dir: &Path, data: &[u8]) -> std::io::Result<PathBuf> {
    let target = dir.join(BIN);
    if is_same_content(&target, data) {
        return Ok(target);
    }

    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }
    tmp.persist(&target).map_err(|e| e.error)?;
    info!(path = %target.display(), "unpacked bundled yt-dlp");
    Ok(target)
}

fn is_same_content(path: &Path, data: &[u8]) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == data.len() as u64 => {
            std::fs::read(path).is_ok_and(|existing| existing == data)
        }
        _ => false,
    }
}

/// Command line for one job, excluding the program itself
pub fn build_args(job: &FetchJob, ffmpeg_location: Option<&Path>) -> Vec<String> {
    let mut args = vec!["-f".to_owned(), job.selection.format_expression.clone()];

    if let Some(pp) = &job.selection.post_processing {
        args.push("-x".to_owned());
        args.push("--audio-format".to_owned());
        args.push(pp.codec.to_owned());
        args.push("--audio-quality".to_owned());
        args.push(format!("{}K", pp.bitrate_kbps));
    }

    if let Some(ffmpeg) = ffmpeg_location {
        args.push("--ffmpeg-location".to_owned());
        args.push(ffmpeg.display().to_string());
    }

    args.push("--progress-template".to_owned());
    args.push(PROGRESS_TEMPLATE.to_owned());
    args.push("--newline".to_owned());
    args.push("--no-colors".to_owned());
    args.push("--encoding".to_owned());
    args.push("utf-8".to_owned());

    args.push("-o".to_owned());
    args.push(job.output_template.display().to_string());
    args.push("--".to_owned());
    args.push(job.url.clone());
    args
}

/// Picks the message shown to the user from yt-dlp's stderr
fn failure_message(status: ExitStatus, stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:"))
        .map(|m| m.trim().to_owned())
        .or_else(|| {
            stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"))
}

#[async_trait]
impl MediaFetcher for YtDlp {
    type Error = FetchError;

    async fn fetch(
        &self,
        job: &FetchJob,
        on_event: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<(), FetchError> {
        let program = self.resolve_program()?;
        let args = build_args(job, self.ffmpeg_location.as_deref());
        debug!(program = %program.display(), ?args, "spawning yt-dlp");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: program.clone(),
                source,
            })?;

        // drain stderr alongside stdout so a chatty child never blocks
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = err.read_to_end(&mut buf).await {
                    warn!(error = %e, "could not read yt-dlp stderr");
                }
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        // raw segments: titles in log lines are not always valid UTF-8
        if let Some(out) = child.stdout.take() {
            let mut segments = BufReader::new(out).split(b'\n');
            while let Some(raw) = segments.next_segment().await? {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches('\r');
                match parse_progress_line(line) {
                    Some(event) => on_event(event),
                    None => debug!("yt-dlp> {}", line),
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else {
            warn!(%status, "yt-dlp exited unsuccessfully");
            Err(FetchError::Exited {
                message: failure_message(status, &stderr),
            })
        }
    }
}
