use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::TranscoderConfig;
use crate::error::{PipelineError, Result};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Converts a downloaded video into a podcast audio file
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(
        &self,
        input_video: &Path,
        output_audio: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<()>;
}

/// One meaningful line of ffmpeg's `-progress` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Seconds of output written so far
    OutTime(f64),
    End,
}

/// Parse a `key=value` line from `-progress pipe:1`
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is in microseconds as well
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| ProgressLine::OutTime(us as f64 / 1_000_000.0)),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Share of `total` covered by `out_time_seconds`, clamped to 0..=100
pub fn percent_of(out_time_seconds: f64, total: Option<Duration>) -> Option<f64> {
    let total = total?.as_secs_f64();
    if total <= 0.0 {
        return None;
    }
    Some((out_time_seconds / total * 100.0).clamp(0.0, 100.0))
}

/// Duration from `ffprobe -print_format json -show_format` output
pub fn parse_probe_duration(json: &[u8]) -> Result<Duration> {
    let probe: serde_json::Value = serde_json::from_slice(json)
        .map_err(|e| PipelineError::Transcode(format!("Unreadable ffprobe output: {}", e)))?;

    probe["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| PipelineError::Transcode("ffprobe reported no duration".to_string()))
}

/// ffmpeg-backed transcoder
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Arguments for dropping the video stream and encoding the audio
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-acodec".to_string(),
            self.config.audio_codec.clone(),
            "-b:a".to_string(),
            self.config.audio_bitrate.clone(),
            "-y".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Duration of the input container
    pub async fn probe_duration(&self, input: &Path) -> Result<Duration> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .output()
            .await
            .map_err(|e| PipelineError::Transcode(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Transcode(format!(
                "ffprobe failed for {}",
                input.display()
            )));
        }

        parse_probe_duration(&output.stdout)
    }

    /// Version banner of the configured ffmpeg and ffprobe
    pub async fn check_availability(&self) -> Result<String> {
        let mut banners = Vec::new();
        for binary in [&self.config.ffmpeg_path, &self.config.ffprobe_path] {
            let output = Command::new(binary)
                .arg("-version")
                .output()
                .await
                .map_err(|e| PipelineError::Transcode(format!("{} not available: {}", binary, e)))?;

            if !output.status.success() {
                return Err(PipelineError::Transcode(format!("{} -version failed", binary)));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            banners.push(stdout.lines().next().unwrap_or(binary.as_str()).to_string());
        }
        Ok(banners.join("; "))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(
        &self,
        input_video: &Path,
        output_audio: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        progress.report(ProgressEvent::TranscodeStarted {
            input: input_video.to_path_buf(),
            output: output_audio.to_path_buf(),
        });

        let total = match self.probe_duration(input_video).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!("Progress will not show a percentage: {}", e);
                None
            }
        };

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(self.ffmpeg_args(input_video, output_audio))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Transcode(format!("Failed to start ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Transcode("ffmpeg stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Transcode("ffmpeg stderr not captured".to_string()))?;

        // keep stderr drained so ffmpeg never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected
        });

        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut ended = false;
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| PipelineError::Transcode(format!("Lost ffmpeg progress: {}", e)))?
            {
                match parse_progress_line(&line) {
                    Some(ProgressLine::OutTime(seconds)) => {
                        progress.report(ProgressEvent::TranscodeProgress {
                            percent: percent_of(seconds, total),
                            out_time_seconds: seconds,
                        })
                    }
                    Some(ProgressLine::End) => ended = true,
                    None => {}
                }
            }
            let status = child
                .wait()
                .await
                .map_err(|e| PipelineError::Transcode(format!("ffmpeg did not exit: {}", e)))?;
            Ok::<_, PipelineError>((status, ended))
        };

        let limit = Duration::from_secs(self.config.timeout_seconds);
        let outcome = tokio::time::timeout(limit, run).await;

        let (status, ended) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
                return Err(PipelineError::Transcode(format!(
                    "ffmpeg timed out after {}s",
                    limit.as_secs()
                )));
            }
        };

        let stderr_lines = stderr_task.await.unwrap_or_default();
        for line in &stderr_lines {
            debug!("ffmpeg: {}", line);
        }

        if !status.success() || !ended {
            let detail = stderr_lines
                .iter()
                .rev()
                .take(5)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(PipelineError::Transcode(format!(
                "ffmpeg exited with {} (end marker seen: {}): {}",
                status, ended, detail
            )));
        }

        progress.report(ProgressEvent::TranscodeFinished {
            output: output_audio.to_path_buf(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(
            parse_progress_line("out_time_us=1500000"),
            Some(ProgressLine::OutTime(1.5))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=3000000"),
            Some(ProgressLine::OutTime(3.0))
        );
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("progress=end"), Some(ProgressLine::End));
        assert_eq!(parse_progress_line("bitrate= 128.0kbits/s"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_percent_of_duration() {
        let total = Some(Duration::from_secs(200));
        assert_eq!(percent_of(50.0, total), Some(25.0));
        assert_eq!(percent_of(250.0, total), Some(100.0));
        assert_eq!(percent_of(10.0, None), None);
        assert_eq!(percent_of(10.0, Some(Duration::ZERO)), None);
    }

    #[test]
    fn test_parse_probe_duration() {
        let json = br#"{"format": {"filename": "a.mp4", "duration": "5423.120000"}}"#;
        let duration = parse_probe_duration(json).unwrap();
        assert_eq!(duration.as_secs(), 5423);

        assert!(parse_probe_duration(br#"{"format": {}}"#).is_err());
        assert!(parse_probe_duration(b"not json").is_err());
    }

    #[test]
    fn test_ffmpeg_args() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::default());
        let args = transcoder.ffmpeg_args(Path::new("in.mp4"), Path::new("out.mp3"));

        assert_eq!(args.first().map(String::as_str), Some("-i"));
        assert!(args.windows(2).any(|w| w == ["-acodec", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert!(args.windows(2).any(|w| w == ["-progress", "pipe:1"]));
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }

    /// Transcoder whose ffmpeg is a shell script and whose ffprobe is missing
    #[cfg(unix)]
    fn scripted_transcoder(dir: &tempfile::TempDir, script: &str, timeout_seconds: u64) -> FfmpegTranscoder {
        use std::os::unix::fs::PermissionsExt;

        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        FfmpegTranscoder::new(TranscoderConfig {
            ffmpeg_path: ffmpeg.to_string_lossy().into_owned(),
            ffprobe_path: dir.path().join("missing-ffprobe").to_string_lossy().into_owned(),
            timeout_seconds,
            ..TranscoderConfig::default()
        })
    }

    #[cfg(unix)]
    async fn convert_with(script: &str, timeout_seconds: u64) -> Result<()> {
        let dir = tempfile::TempDir::new().unwrap();
        let transcoder = scripted_transcoder(&dir, script, timeout_seconds);
        transcoder
            .convert(
                &dir.path().join("1_548470.mp4"),
                &dir.path().join("1_548470.mp3"),
                &crate::progress::NoopReporter,
            )
            .await
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_succeeds_on_end_marker_and_clean_exit() {
        let result = convert_with("echo out_time_us=1000000\necho progress=end\nexit 0", 30).await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_fails_without_end_marker() {
        let result = convert_with("echo out_time_us=1000000\nexit 0", 30).await;
        match result {
            Err(PipelineError::Transcode(message)) => assert!(message.contains("end marker seen: false")),
            other => panic!("expected a transcode error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_fails_on_nonzero_exit_after_end_marker() {
        let result = convert_with("echo progress=end\necho 'Conversion failed!' >&2\nexit 1", 30).await;
        match result {
            Err(PipelineError::Transcode(message)) => {
                assert!(message.contains("end marker seen: true"));
                assert!(message.contains("Conversion failed!"));
            }
            other => panic!("expected a transcode error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_times_out() {
        let result = convert_with("exec sleep 10", 1).await;
        match result {
            Err(PipelineError::Transcode(message)) => assert!(message.contains("timed out")),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }
}
