use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, warn};

use super::{OcrError, PageRenderer};

/// Rasterises PDFs with poppler's `pdftoppm`.
pub struct Pdftoppm {
    program: String,
    dpi: u32,
}

impl Pdftoppm {
    pub fn new(program: &str, dpi: u32) -> Self {
        Self {
            program: program.to_string(),
            dpi,
        }
    }
}

impl PageRenderer for Pdftoppm {
    fn render(&self, pdf: &[u8]) -> Result<Vec<DynamicImage>, OcrError> {
        let dir = tempfile::tempdir()
            .map_err(|e| OcrError::Render(format!("create temp dir: {}", e)))?;
        let input = dir.path().join("input.pdf");
        std::fs::write(&input, pdf).map_err(|e| OcrError::Render(format!("write pdf: {}", e)))?;

        let prefix = dir.path().join("page");
        let output = Command::new(&self.program)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| OcrError::Render(format!("spawn {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "pdftoppm failed");
            return Err(OcrError::Render(format!("pdftoppm exited with {}", output.status)));
        }

        let pages = page_files(dir.path())
            .map_err(|e| OcrError::Render(format!("list rendered pages: {}", e)))?;
        debug!(pages = pages.len(), dpi = self.dpi, "pdftoppm rendered pages");

        pages
            .iter()
            .map(|path| image::open(path).map_err(OcrError::from))
            .collect()
    }
}

/// Rendered page files (`page-1.png`, `page-01.png`, ...) sorted by page number.
fn page_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut numbered = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(n) = page_number(&path) {
            numbered.push((n, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("page-")?.parse().ok()
}
