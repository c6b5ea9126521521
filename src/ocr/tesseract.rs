use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::{OcrError, TextRecognizer};

/// Runs the `tesseract` binary, feeding a PNG through stdin.
pub struct TesseractCli {
    program: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(program: &str, lang: &str) -> Self {
        Self {
            program: program.to_string(),
            lang: lang.to_string(),
        }
    }

    fn args(&self) -> Vec<&str> {
        vec!["stdin", "stdout", "-l", &self.lang]
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        debug!(bytes = png.len(), lang = %self.lang, "running tesseract");

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Recognition(format!("spawn {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .map_err(|e| OcrError::Recognition(format!("write to tesseract: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Recognition(format!("wait for tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "tesseract failed");
            return Err(OcrError::Recognition(format!(
                "tesseract exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
