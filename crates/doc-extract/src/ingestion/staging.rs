//! Temporary on-disk staging for provider uploads

use bytes::Bytes;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// An uploaded document held in memory for the lifetime of a run
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub data: Bytes,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Accept only PDFs: by extension, or by magic bytes when the name has none
    pub fn validate_pdf(&self) -> Result<()> {
        let extension = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("pdf") => Ok(()),
            None if self.data.starts_with(b"%PDF") => Ok(()),
            Some(other) => Err(Error::UnsupportedFileType(format!(
                "{} - only PDF documents can be extracted",
                other
            ))),
            None => Err(Error::UnsupportedFileType(format!(
                "{} - not a PDF document",
                self.filename
            ))),
        }
    }
}

/// Document bytes written to a temporary file.
///
/// The file is removed when the value is dropped, on success and failure alike.
pub struct StagedDocument {
    filename: String,
    file: NamedTempFile,
}

impl StagedDocument {
    pub fn stage(document: &SourceDocument) -> Result<Self> {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .prefix("doc-extract-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(&document.data)?;
        file.flush()?;

        tracing::debug!(
            "Staged {} at {}",
            document.filename,
            file.path().display()
        );

        Ok(Self {
            filename: document.filename.clone(),
            file,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
