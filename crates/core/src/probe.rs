use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub const CREATION_TIME_TAG: &str = "creation_time";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobeを起動できませんでした: {0}")]
    NotFound(#[source] std::io::Error),
    #[error("ffprobeの実行に失敗しました (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("ffprobeの出力を解析できませんでした: {0}")]
    Parse(String),
}

/// Container-level metadata for one media file.
pub trait MetadataProbe {
    fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeReport {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub format_tags: BTreeMap<String, String>,
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ProbeReport {
    pub fn creation_time(&self) -> Option<&str> {
        self.format_tags
            .get(CREATION_TIME_TAG)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn describe(&self, path: &Path) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "メディア情報: {}", path.display());
        let _ = writeln!(
            out,
            "フォーマット: {}",
            self.format_name.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out, "再生時間: {}", self.duration.as_deref().unwrap_or("-"));
        for (key, value) in &self.format_tags {
            let _ = writeln!(out, "\t{key}: {value}");
        }
        for stream in &self.streams {
            let _ = writeln!(
                out,
                "ストリーム {} ({})",
                stream.codec_name.as_deref().unwrap_or("-"),
                stream.codec_type.as_deref().unwrap_or("-")
            );
            if stream.codec_type.as_deref() == Some("video") {
                if let (Some(width), Some(height)) = (stream.width, stream.height) {
                    let _ = writeln!(out, "\tフレームサイズ: {width}x{height}");
                }
                if let Some(rate) = stream.frame_rate.as_deref().and_then(parse_frame_rate) {
                    let _ = writeln!(out, "\tフレームレート: {rate:.2}");
                }
            }
            for (key, value) in &stream.tags {
                let _ = writeln!(out, "\t{key}: {value}");
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MetadataProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(ProbeError::NotFound)?;

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

pub fn parse_ffprobe_json(raw: &str) -> Result<ProbeReport, ProbeError> {
    let parsed = serde_json::from_str::<FfprobeOutput>(raw)
        .map_err(|err| ProbeError::Parse(err.to_string()))?;
    let format = parsed.format.ok_or_else(|| {
        ProbeError::Parse("formatセクションがありません".to_string())
    })?;

    Ok(ProbeReport {
        format_name: format.format_name,
        duration: format.duration,
        format_tags: format.tags,
        streams: parsed
            .streams
            .into_iter()
            .map(|stream| ProbeStream {
                codec_name: stream.codec_name,
                codec_type: stream.codec_type,
                width: stream.width,
                height: stream.height,
                frame_rate: stream.r_frame_rate,
                tags: stream.tags,
            })
            .collect(),
    })
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.trim().parse::<f64>().ok(),
    }
}
