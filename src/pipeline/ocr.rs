//! Optical character recognition via the Tesseract CLI.
//!
//! Tesseract runs as a child process (`tesseract <image> stdout -l <lang>
//! tsv`) rather than through linked bindings, so the crate builds on hosts
//! without leptonica headers and a hung engine can be killed on timeout.
//! TSV output carries per-word confidences, which become the page
//! confidence reported to the rest of the pipeline.

use crate::config::IngestConfig;
use crate::error::ReceiptError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Text and confidence recognised from one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence as a fraction in `[0, 1]`; `None` when the
    /// engine recognised no words.
    pub confidence: Option<f64>,
}

/// Recognise text in an image file.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, ReceiptError>;
}

/// [`OcrEngine`] backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            timeout,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
            Duration::from_secs(config.ocr_timeout_secs),
        )
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, ReceiptError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ReceiptError::UpstreamTimeout {
                service: "Tesseract".into(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                ReceiptError::upstream(
                    "Tesseract",
                    format!("failed to run '{}': {e}", self.binary.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReceiptError::upstream(
                "Tesseract",
                format!("exit {}: {}", output.status, stderr.trim()),
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = parse_tsv(&tsv);
        debug!(
            "OCR {} → {} chars, confidence {:?}",
            image.display(),
            result.text.len(),
            result.confidence
        );
        Ok(result)
    }
}

/// Rebuild text and mean confidence from Tesseract TSV output.
///
/// Word rows (level 5) are joined with spaces; a change of line starts a
/// new line and a change of block inserts a blank line. Rows with a
/// negative confidence are layout rows and carry no text.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut conf_sum = 0.0;
    let mut words = 0usize;
    let mut last_line: Option<(&str, &str, &str, &str)> = None;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let conf: f64 = cols[10].trim().parse().unwrap_or(-1.0);
        if word.is_empty() || conf < 0.0 {
            continue;
        }

        let line_key = (cols[1], cols[2], cols[3], cols[4]);
        match last_line {
            Some(prev) if prev == line_key => text.push(' '),
            Some(prev) if (prev.0, prev.1) != (line_key.0, line_key.1) => text.push_str("\n\n"),
            Some(_) => text.push('\n'),
            None => {}
        }
        last_line = Some(line_key);
        text.push_str(word);

        conf_sum += conf;
        words += 1;
    }

    let confidence = (words > 0).then(|| (conf_sum / words as f64 / 100.0).clamp(0.0, 1.0));
    if !text.is_empty() {
        text.push('\n');
    }
    OcrOutput { text, confidence }
}
