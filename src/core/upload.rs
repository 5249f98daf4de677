use std::path::{Path, PathBuf};
use thiserror::Error;

/// 10 MiB
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Please upload a CSV file")]
    WrongExtension { filename: String },

    #[error("File size must be less than 10MB")]
    TooLarge { size: u64, limit: u64 },
}

/// A file the user picked, before it is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, size: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            size,
            path: path.into(),
        }
    }

    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(name, metadata.len(), path))
    }
}

pub fn validate_upload(name: &str, size: u64, max_bytes: u64) -> Result<(), UploadError> {
    if !name.to_lowercase().ends_with(".csv") {
        return Err(UploadError::WrongExtension {
            filename: name.to_string(),
        });
    }

    if size > max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    Ok(())
}

/// Holds the single selected file and the last rejection.
#[derive(Debug, Clone)]
pub struct UploadGate {
    max_bytes: u64,
    selected: Option<UploadCandidate>,
    error: Option<UploadError>,
}

impl UploadGate {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            selected: None,
            error: None,
        }
    }

    /// A rejected file leaves the previous selection in place.
    pub fn select(&mut self, candidate: UploadCandidate) -> Result<&UploadCandidate, UploadError> {
        self.error = None;

        if let Err(e) = validate_upload(&candidate.name, candidate.size, self.max_bytes) {
            tracing::warn!("Rejected upload '{}': {}", candidate.name, e);
            self.error = Some(e.clone());
            return Err(e);
        }

        tracing::debug!("Selected '{}' ({})", candidate.name, format_file_size(candidate.size));
        let selected: &UploadCandidate = self.selected.insert(candidate);
        Ok(selected)
    }

    pub fn remove(&mut self) {
        self.selected = None;
        self.error = None;
    }

    pub fn selected(&self) -> Option<&UploadCandidate> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&UploadError> {
        self.error.as_ref()
    }

    /// The file to analyze, if one is selected and no rejection is showing.
    pub fn ready(&self) -> Option<&UploadCandidate> {
        match self.error {
            Some(_) => None,
            None => self.selected.as_ref(),
        }
    }
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
