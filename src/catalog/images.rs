use std::path::{Path, PathBuf};

use rocket::fs::TempFile;
use rocket::tokio::fs;
use tracing::{info, instrument};

use crate::error::AppError;

const MAX_FILE_NAME_LEN: usize = 128;

/// An uploaded image waiting to be written to the image directory.
#[rocket::async_trait]
pub trait ImageSource: Send {
    /// File name as supplied by the client. Untrusted.
    fn client_file_name(&self) -> Option<&str>;

    fn is_empty(&self) -> bool;

    async fn write_to(&mut self, path: &Path) -> std::io::Result<()>;
}

#[rocket::async_trait]
impl<'v> ImageSource for TempFile<'v> {
    fn client_file_name(&self) -> Option<&str> {
        self.raw_name()
            .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn write_to(&mut self, path: &Path) -> std::io::Result<()> {
        self.copy_to(path).await
    }
}

/// Reduces a client-supplied file name to a single safe path component:
/// directories are dropped, whitespace becomes `_`, anything outside
/// `[A-Za-z0-9._-]` is removed and leading dots are stripped.
pub fn sanitize_file_name(raw: &str) -> Result<String, AppError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.len() > MAX_FILE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "'{}' is not a usable image file name",
            raw
        )));
    }

    Ok(cleaned.to_string())
}

/// Directory of product images. Product rows refer to images by file name
/// only; a new upload with an existing name replaces the old file.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Writes the upload and returns the file name it was stored under.
    #[instrument(skip(self, image), fields(root = %self.root.display()))]
    pub async fn store(&self, image: &mut dyn ImageSource) -> Result<String, AppError> {
        let raw = image.client_file_name().ok_or_else(|| {
            AppError::Validation("The uploaded image has no file name".to_string())
        })?;
        let file_name = sanitize_file_name(raw)?;

        fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&file_name);
        image.write_to(&path).await?;

        info!(file_name = %file_name, "Stored product image");
        Ok(file_name)
    }

    /// Copies a local file into the store, under `name` or else the file's
    /// own name.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn import(&self, path: &Path, name: Option<&str>) -> Result<String, AppError> {
        let file_name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    AppError::Validation(format!("{} has no usable file name", path.display()))
                })?,
        };
        let bytes = fs::read(path).await?;

        self.store(&mut ImageBytes::new(file_name, bytes)).await
    }
}

/// An in-memory upload, for callers that already hold the bytes.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageBytes {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

#[rocket::async_trait]
impl ImageSource for ImageBytes {
    fn client_file_name(&self) -> Option<&str> {
        Some(&self.file_name)
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    async fn write_to(&mut self, path: &Path) -> std::io::Result<()> {
        fs::write(path, &self.bytes).await
    }
}
