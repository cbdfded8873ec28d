use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::domain::FileRef;

/// An invoice document as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Blob storage for invoice documents.
pub trait InvoiceFileStore: Send + Sync {
    fn store(&self, file: &UploadedFile) -> Result<FileRef, FileStoreError>;

    /// Remove a stored file. Removing a file that is already gone succeeds.
    fn remove(&self, file: &FileRef) -> Result<(), FileStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("file is empty")]
    Empty,
    #[error("file storage io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Keeps documents on local disk under `<root>/invoice_submissions/YYYY/MM/DD/`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, file: &FileRef) -> PathBuf {
        self.root.join(&file.0)
    }
}

impl InvoiceFileStore for LocalFileStore {
    fn store(&self, file: &UploadedFile) -> Result<FileRef, FileStoreError> {
        if file.bytes.is_empty() {
            return Err(FileStoreError::Empty);
        }
        let key = format!(
            "invoice_submissions/{}/{}-{}",
            Utc::now().format("%Y/%m/%d"),
            Uuid::new_v4().simple(),
            sanitize_name(&file.name)
        );
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| FileStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, &file.bytes).map_err(|source| FileStoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), size = file.bytes.len(), "invoice file stored");
        Ok(FileRef(key))
    }

    fn remove(&self, file: &FileRef) -> Result<(), FileStoreError> {
        let path = self.path_of(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileStoreError::Io { path, source }),
        }
    }
}

/// In-process file store for tests and the demo.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<FileRef, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn contains(&self, file: &FileRef) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvoiceFileStore for MemoryFileStore {
    fn store(&self, file: &UploadedFile) -> Result<FileRef, FileStoreError> {
        if file.bytes.is_empty() {
            return Err(FileStoreError::Empty);
        }
        let key = FileRef(format!(
            "memory/{}-{}",
            Uuid::new_v4().simple(),
            sanitize_name(&file.name)
        ));
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), file.bytes.clone());
        Ok(key)
    }

    fn remove(&self, file: &FileRef) -> Result<(), FileStoreError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file);
        Ok(())
    }
}

fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(|ch| ch == '.' || ch == '_').is_empty() {
        "invoice.pdf".to_string()
    } else {
        cleaned
    }
}
