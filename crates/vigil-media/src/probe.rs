//! Stream metadata via `ffprobe`.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};
use crate::source::MediaInput;

/// What the sampler needs to know about the first video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

// Shape of `ffprobe -select_streams v:0 -show_entries ... -of json`
#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Fallback when the container reports no usable rate.
const DEFAULT_FPS: f64 = 25.0;

/// Read duration, geometry and frame rate of the first video stream.
pub async fn probe_video(input: &MediaInput) -> MediaResult<VideoInfo> {
    if let MediaInput::Path(path) = input {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
    }
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "format=duration:stream=codec_name,width,height,avg_frame_rate,r_frame_rate,duration",
            "-of",
            "json",
        ])
        .arg(input.as_arg())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("cannot probe {}", input),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }

    read_report(&output.stdout)
}

fn read_report(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(stdout)?;
    let stream = report
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    let duration = [report.format.duration.as_deref(), stream.duration.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|d| d.parse::<f64>().ok().filter(|d| d.is_finite()))
        .unwrap_or(0.0);

    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(rate)
        .unwrap_or(DEFAULT_FPS);

    Ok(VideoInfo {
        duration,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps,
        codec: stream.codec_name.unwrap_or_default(),
    })
}

/// `"30000/1001"` or `"29.97"`. Zero and undefined rates yield `None`.
fn rate(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => s.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
