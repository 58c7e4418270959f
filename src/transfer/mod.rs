pub mod client;

use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempPath;

pub use self::client::{HealthStatus, StegClient};

/// Ошибки обмена с сервисом и сохранения артефактов.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout")]
    Timeout,

    /// Тело ответа передается как есть (JSON или текст).
    #[error("server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to store artifact: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Поле multipart-запроса.
#[derive(Debug, Clone)]
pub enum Part {
    File {
        data: Bytes,
        file_name: String,
        mime: String,
    },
    Text(String),
}

impl Part {
    /// Бинарное поле; MIME определяется по расширению имени файла.
    pub fn file(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let mime = mime_for(&file_name).to_string();
        Part::File {
            data: data.into(),
            file_name,
            mime,
        }
    }

    pub fn text(value: impl ToString) -> Self {
        Part::Text(value.to_string())
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Тип артефакта, который возвращает сервис.
pub trait ArtifactKind {
    /// Сегмент пути `/api/download/{id}/{kind}`.
    const KIND: &'static str;
    const DEFAULT_FILE_NAME: &'static str;
    const EXTENSION: &'static str;
}

/// PNG со встроенным аудио.
#[derive(Debug, Clone, Copy)]
pub struct Image;

/// Извлеченный WAV.
#[derive(Debug, Clone, Copy)]
pub struct Audio;

impl ArtifactKind for Image {
    const KIND: &'static str = "image";
    const DEFAULT_FILE_NAME: &'static str = "embedded.png";
    const EXTENSION: &'static str = ".png";
}

impl ArtifactKind for Audio {
    const KIND: &'static str = "audio";
    const DEFAULT_FILE_NAME: &'static str = "extracted.wav";
    const EXTENSION: &'static str = ".wav";
}

/// Успешный ответ сервиса: непрозрачные байты с типом артефакта.
#[derive(Debug, Clone)]
pub struct Artifact<K: ArtifactKind> {
    bytes: Bytes,
    content_type: Option<String>,
    _kind: PhantomData<K>,
}

/// Результат одного запроса к сервису.
pub type TransferResult<K> = Result<Artifact<K>>;

impl<K: ArtifactKind> Artifact<K> {
    pub fn new(bytes: Bytes, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
            _kind: PhantomData,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Сохраняет артефакт в `dir` под предложенным именем.
    ///
    /// Из имени берется только последний компонент пути; пустое имя
    /// заменяется на имя по умолчанию для типа артефакта. Запись атомарная
    /// (временный файл + переименование).
    pub fn to_downloadable_file(&self, dir: &Path, suggested_name: Option<&str>) -> Result<PathBuf> {
        let name = suggested_name
            .and_then(|n| Path::new(n).file_name())
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(K::DEFAULT_FILE_NAME);

        fs::create_dir_all(dir).map_err(|e| {
            TransferError::Storage(format!("failed to create directory {:?}: {}", dir, e))
        })?;

        let path = dir.join(name);
        let tmp_path = dir.join(format!("{name}.tmp"));
        fs::write(&tmp_path, &self.bytes).map_err(|e| {
            TransferError::Storage(format!("failed to write {:?}: {}", tmp_path, e))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            TransferError::Storage(format!("failed to rename to {:?}: {}", path, e))
        })?;

        tracing::info!(path = %path.display(), bytes = self.bytes.len(), kind = K::KIND, "artifact saved");
        Ok(path)
    }

    /// Временная ссылка `file://` для предпросмотра (img/audio src).
    ///
    /// Живет до `revoke()` или до уничтожения `PreviewUrl`.
    pub fn to_preview_url(&self) -> Result<PreviewUrl> {
        let mut file = tempfile::Builder::new()
            .prefix("audiosteg-preview-")
            .suffix(K::EXTENSION)
            .tempfile()
            .map_err(|e| TransferError::Storage(format!("failed to create preview file: {e}")))?;
        file.write_all(&self.bytes)
            .map_err(|e| TransferError::Storage(format!("failed to write preview file: {e}")))?;

        let path = file.into_temp_path();
        let url = format!("file://{}", path.display());
        tracing::debug!(url = %url, kind = K::KIND, "preview reference created");

        Ok(PreviewUrl {
            url,
            path: Some(path),
        })
    }
}

/// Отзываемая ссылка на копию артефакта во временном файле.
///
/// Повторный `revoke` ничего не делает; неотозванная ссылка
/// освобождается при уничтожении.
#[derive(Debug)]
pub struct PreviewUrl {
    url: String,
    path: Option<TempPath>,
}

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Путь к файлу, пока ссылка не отозвана.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_revoked(&self) -> bool {
        self.path.is_none()
    }

    pub fn revoke(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = path.close() {
                tracing::warn!(error = %e, url = %self.url, "failed to remove preview file");
            }
        }
    }
}
