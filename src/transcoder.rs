//! Image-sequence to video transcoding using an external ffmpeg process.

use crate::error::SimStageError;
use crate::metrics::TRANSCODE_TIME;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use strum_macros::Display;

/// Still image formats accepted as frames, in order of preference.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum FrameFormat {
    Svg,
    Png,
}

impl FrameFormat {
    const PREFERENCE: [FrameFormat; 2] = [FrameFormat::Svg, FrameFormat::Png];

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Svg => "svg",
            FrameFormat::Png => "png",
        }
    }
}

/// An ordered set of frames of one format.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSequence {
    format: FrameFormat,
    frames: Vec<PathBuf>,
}

impl FrameSequence {
    /// Find the frames directly inside a directory.
    ///
    /// SVG frames are used if there are any, otherwise PNG frames. Frames are ordered by a
    /// numeric-aware sort of their file names, so `frame2.svg` precedes `frame10.svg`.
    pub fn discover(dir: &Path) -> Result<Self, SimStageError> {
        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        for format in FrameFormat::PREFERENCE {
            let pattern = format!("{}/*.{}", escaped, format.extension());
            let mut frames: Vec<PathBuf> = glob::glob_with(&pattern, options)?
                .filter_map(Result::ok)
                .filter(|path| path.is_file())
                .collect();
            if !frames.is_empty() {
                frames.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
                return Ok(Self { format, frames });
            }
        }
        Err(SimStageError::NoFramesFound {
            dir: dir.display().to_string(),
        })
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Alternating runs of ASCII digits and non-digits.
struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Runs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let digit = self.rest.chars().next()?.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(run)
    }
}

/// Compare strings, treating runs of digits as numbers.
///
/// Ties between numerically equal names (`1` and `01`) fall back to plain string order so the
/// ordering is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut x = Runs { rest: a };
    let mut y = Runs { rest: b };
    loop {
        match (x.next(), y.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(p), Some(q)) => {
                let digits = |s: &str| s.starts_with(|c: char| c.is_ascii_digit());
                let ordering = if digits(p) && digits(q) {
                    let p = p.trim_start_matches('0');
                    let q = q.trim_start_matches('0');
                    p.len().cmp(&q.len()).then_with(|| p.cmp(q))
                } else {
                    p.cmp(q)
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Runs the external encoder.
#[derive(Clone, Debug)]
pub struct Transcoder {
    /// ffmpeg executable
    ffmpeg: PathBuf,
    /// Maximum run time of one encoder process
    timeout: Option<Duration>,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    /// Encode the frames in a directory to a video file.
    ///
    /// # Arguments
    ///
    /// * `dir`: Directory containing the frames. A staging directory is created inside it.
    /// * `framerate`: Frames per second
    /// * `output`: Path of the video file, overwritten if it exists
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn transcode(
        &self,
        dir: &Path,
        framerate: u32,
        output: &Path,
    ) -> Result<(), SimStageError> {
        let frames = FrameSequence::discover(dir)?;
        tracing::debug!(count = frames.len(), format = %frames.format(), "found frames");
        let staging = tempfile::Builder::new().prefix("frames-").tempdir_in(dir)?;
        let pattern = stage_frames(&frames, staging.path()).await?;
        self.encode(&pattern, framerate, output).await
    }

    /// Run the encoder over a numbered input pattern such as `frame_%06d.svg`.
    async fn encode(
        &self,
        pattern: &Path,
        framerate: u32,
        output: &Path,
    ) -> Result<(), SimStageError> {
        let timer = TRANSCODE_TIME.start_timer();
        let child = tokio::process::Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-framerate")
            .arg(framerate.to_string())
            .args(["-start_number", "0", "-i"])
            .arg(pattern)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SimStageError::EncodingFailed {
                detail: format!("failed to start {}: {}", self.ffmpeg.display(), err),
            })?;

        // Dropping the child on timeout kills the process.
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| SimStageError::EncodingFailed {
                    detail: format!("encoder timed out after {}s", timeout.as_secs()),
                })?,
            None => child.wait_with_output().await,
        }?;
        timer.observe_duration();

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SimStageError::EncodingFailed {
                detail: format!("{}: {}", result.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Link frames into a directory under sequential names, returning the encoder input pattern.
///
/// Hard links are used where possible, falling back to copies.
async fn stage_frames(frames: &FrameSequence, staging: &Path) -> Result<PathBuf, SimStageError> {
    let extension = frames.format().extension();
    for (index, frame) in frames.frames().iter().enumerate() {
        let target = staging.join(format!("frame_{:06}.{}", index, extension));
        if tokio::fs::hard_link(frame, &target).await.is_err() {
            tokio::fs::copy(frame, &target).await?;
        }
    }
    Ok(staging.join(format!("frame_%06d.{}", extension)))
}
