pub mod files;
pub mod overlay;

pub use files::*;
pub use overlay::*;

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF has no pages: {0}")]
    NoPages(String),
}

/// Outcome of a watermarking run. Missing inputs are a status, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkStatus {
    Success,
    Failure,
}

impl WatermarkStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 1,
            Self::Failure => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatermarkOptions {
    /// Text line stamped near the bottom of every page.
    pub footer: Option<String>,
    /// Empty the output directory before writing.
    pub clear_output: bool,
}

/// Watermark every PDF in `input_dir` and write it under the same name to
/// `output_dir`.
pub fn put_watermark(
    input_dir: &Path,
    output_dir: &Path,
    watermark_pdf: &Path,
    options: &WatermarkOptions,
) -> Result<WatermarkStatus, WatermarkError> {
    let entries = match list_entries(input_dir) {
        Ok(entries) if !entries.is_empty() => entries,
        Ok(_) => {
            tracing::warn!(dir = %input_dir.display(), "No input files to watermark");
            return Ok(WatermarkStatus::Failure);
        }
        Err(e) => {
            tracing::warn!(
                dir = %input_dir.display(),
                error = %e,
                "Input directory not readable"
            );
            return Ok(WatermarkStatus::Failure);
        }
    };

    if !watermark_pdf.exists() {
        tracing::warn!(file = %watermark_pdf.display(), "Watermark file not found");
        return Ok(WatermarkStatus::Failure);
    }

    let inputs = pdf_inputs(entries)?;
    if inputs.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "No PDF among the input files");
        return Ok(WatermarkStatus::Failure);
    }

    let stamp = Stamp::load(watermark_pdf)?;
    fs::create_dir_all(output_dir)?;
    if options.clear_output {
        clear_directory(output_dir)?;
    }

    for path in &inputs {
        let Some(file_name) = path.file_name() else {
            continue;
        };

        let mut doc = Document::load(path)?;
        let pages = stamp.apply(&mut doc, options.footer.as_deref())?;
        let target = output_dir.join(file_name);
        doc.save(&target)?;

        tracing::info!(
            file = %path.display(),
            output = %target.display(),
            pages,
            "Watermark applied"
        );
    }

    tracing::info!(written = inputs.len(), "Watermarking complete");
    Ok(WatermarkStatus::Success)
}

fn list_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Keep the regular files that carry the PDF signature.
fn pdf_inputs(entries: Vec<PathBuf>) -> Result<Vec<PathBuf>, WatermarkError> {
    let mut pdfs = Vec::with_capacity(entries.len());
    for path in entries {
        if path.is_file() && is_pdf(&path)? {
            pdfs.push(path);
        } else {
            tracing::warn!(file = %path.display(), "Skipping non-PDF input");
        }
    }
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::overlay::fixtures;

    struct Dirs {
        _root: tempfile::TempDir,
        input: PathBuf,
        output: PathBuf,
        watermark: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("input");
        let output = root.path().join("output");
        fs::create_dir_all(&input).unwrap();

        let watermark = root.path().join("logo.pdf");
        fs::write(&watermark, fixtures::pdf(1, 100, 100, "0 0 m 100 100 l S")).unwrap();

        Dirs {
            input,
            output,
            watermark,
            _root: root,
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(WatermarkStatus::Success.code(), 1);
        assert_eq!(WatermarkStatus::Failure.code(), 0);
    }

    #[test]
    fn watermarks_each_pdf_under_its_own_name() {
        let d = dirs();
        fs::write(d.input.join("sample.pdf"), fixtures::pdf(1, 200, 200, "")).unwrap();
        fs::write(d.input.join("second.pdf"), fixtures::pdf(3, 200, 200, "")).unwrap();

        let status = put_watermark(&d.input, &d.output, &d.watermark, &WatermarkOptions::default())
            .unwrap();

        assert_eq!(status, WatermarkStatus::Success);
        let out = Document::load(d.output.join("second.pdf")).unwrap();
        assert_eq!(out.get_pages().len(), 3);
        assert!(d.output.join("sample.pdf").exists());
    }

    #[test]
    fn non_pdf_inputs_are_skipped() {
        let d = dirs();
        fs::write(d.input.join("sample.pdf"), fixtures::pdf(1, 200, 200, "")).unwrap();
        fs::write(d.input.join("readme.txt"), "hello").unwrap();

        let status = put_watermark(&d.input, &d.output, &d.watermark, &WatermarkOptions::default())
            .unwrap();

        assert_eq!(status, WatermarkStatus::Success);
        assert!(d.output.join("sample.pdf").exists());
        assert!(!d.output.join("readme.txt").exists());
    }

    #[test]
    fn missing_watermark_is_failure() {
        let d = dirs();
        fs::write(d.input.join("sample.pdf"), fixtures::pdf(1, 200, 200, "")).unwrap();

        let status = put_watermark(
            &d.input,
            &d.output,
            &d.input.join("absent_logo.pdf"),
            &WatermarkOptions::default(),
        )
        .unwrap();

        assert_eq!(status, WatermarkStatus::Failure);
        assert!(!d.output.exists());
    }

    #[test]
    fn empty_input_is_failure() {
        let d = dirs();
        let status = put_watermark(&d.input, &d.output, &d.watermark, &WatermarkOptions::default())
            .unwrap();
        assert_eq!(status, WatermarkStatus::Failure);
    }

    #[test]
    fn clear_output_removes_stale_files() {
        let d = dirs();
        fs::write(d.input.join("sample.pdf"), fixtures::pdf(1, 200, 200, "")).unwrap();
        fs::create_dir_all(&d.output).unwrap();
        fs::write(d.output.join("stale.pdf"), "old").unwrap();

        let options = WatermarkOptions {
            footer: Some("Jane Doe".into()),
            clear_output: true,
        };
        put_watermark(&d.input, &d.output, &d.watermark, &options).unwrap();

        assert!(!d.output.join("stale.pdf").exists());
        let out = Document::load(d.output.join("sample.pdf")).unwrap();
        let page_id = *out.get_pages().values().next().unwrap();
        let text = String::from_utf8_lossy(&out.get_page_content(page_id).unwrap()).into_owned();
        assert!(text.contains("(Jane Doe) Tj"), "{text}");
    }

    #[test]
    fn only_non_pdf_inputs_is_failure() {
        let d = dirs();
        fs::write(d.input.join("readme.txt"), "hello").unwrap();
        fs::create_dir_all(&d.output).unwrap();
        fs::write(d.output.join("previous.pdf"), "old").unwrap();

        let options = WatermarkOptions {
            footer: None,
            clear_output: true,
        };
        let status = put_watermark(&d.input, &d.output, &d.watermark, &options).unwrap();

        assert_eq!(status, WatermarkStatus::Failure);
        assert_eq!(status.code(), 0);
        let outputs: Vec<_> = fs::read_dir(&d.output).unwrap().collect();
        assert_eq!(outputs.len(), 1, "output directory left untouched");
        assert!(d.output.join("previous.pdf").exists());
    }
}
