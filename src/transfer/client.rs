use std::time::Duration;

use bytes::Bytes;
use reqwest::header;
use serde::Deserialize;

use super::{Artifact, ArtifactKind, Audio, Image, Part, Result, TransferError, TransferResult};

const USER_AGENT: &str = "AudioSteg/0.1.0";

const EMBED_PATH: &str = "/api/embed";
const EXTRACT_PATH: &str = "/api/extract";
const HEALTH_PATH: &str = "/api/health";

/// Ответ `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub ffmpeg_installed: bool,
    #[serde(default)]
    pub message: String,
}

/// Клиент сервиса стеганографии.
///
/// Без retry: ошибка отдается вызывающему один раз. Параллельные запросы
/// не координируются и не влияют друг на друга.
#[derive(Debug, Clone)]
pub struct StegClient {
    client: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
}

impl StegClient {
    /// Создает клиент.
    ///
    /// - `base_url` - адрес сервиса (например "http://127.0.0.1:8000"), слеш в конце убирается
    /// - `connect_timeout` - таймаут установки соединения
    /// - `read_timeout` - таймаут ожидания ответа (STFT на сервере может идти долго)
    pub fn new(base_url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransferError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            read_timeout,
        })
    }

    /// Создает клиент из AppConfig.
    pub fn from_config(config: &crate::config::schema::AppConfig) -> Result<Self> {
        Self::new(
            &config.server_base_url,
            Duration::from_secs(config.connect_timeout_sec as u64),
            Duration::from_secs(config.read_timeout_sec as u64),
        )
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Прячет аудио в изображение (`POST /api/embed`).
    pub async fn embed(
        &self,
        audio: Part,
        image: Part,
        n_fft: u32,
        hop_length: u32,
    ) -> TransferResult<Image> {
        ensure_file_part(&audio, "audio_file")?;
        ensure_file_part(&image, "image_file")?;
        validate_stft_params(n_fft, hop_length)?;

        self.submit(
            EMBED_PATH,
            vec![
                ("audio_file".to_string(), audio),
                ("image_file".to_string(), image),
                ("n_fft".to_string(), Part::text(n_fft)),
                ("hop_length".to_string(), Part::text(hop_length)),
            ],
        )
        .await
    }

    /// Достает аудио из изображения (`POST /api/extract`).
    pub async fn extract(&self, image: Part) -> TransferResult<Audio> {
        ensure_file_part(&image, "image_file")?;
        self.submit(EXTRACT_PATH, vec![("image_file".to_string(), image)])
            .await
    }

    /// Один multipart-запрос; успешное тело - непрозрачные байты.
    pub async fn submit<K: ArtifactKind>(
        &self,
        endpoint: &str,
        parts: Vec<(String, Part)>,
    ) -> TransferResult<K> {
        if parts.is_empty() {
            return Err(TransferError::MissingInput("request parts".to_string()));
        }

        let mut form = reqwest::multipart::Form::new();
        for (name, part) in parts {
            form = match part {
                Part::File {
                    data,
                    file_name,
                    mime,
                } => {
                    let file_part = reqwest::multipart::Part::stream(data)
                        .file_name(file_name)
                        .mime_str(&mime)
                        .map_err(|e| TransferError::InvalidParameter(e.to_string()))?;
                    form.part(name, file_part)
                }
                Part::Text(value) => form.text(name, value),
            };
        }

        let url = self.url(endpoint);
        tracing::info!(url = %url, kind = K::KIND, "submitting request");

        let response = self
            .client
            .post(&url)
            .timeout(self.read_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let (bytes, content_type) = read_binary(response).await?;
        tracing::info!(bytes = bytes.len(), kind = K::KIND, "artifact received");
        Ok(Artifact::new(bytes, content_type))
    }

    /// Скачивает ранее созданный артефакт (`GET /api/download/{id}/{kind}`).
    pub async fn download<K: ArtifactKind>(&self, file_id: &str) -> TransferResult<K> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(TransferError::MissingInput("file id".to_string()));
        }

        let url = self.download_url(file_id, K::KIND)?;
        let response = self
            .client
            .get(url)
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        let (bytes, content_type) = read_binary(response).await?;
        Ok(Artifact::new(bytes, content_type))
    }

    /// `{base}/api/download/{id}/{kind}`; id кодируется как один сегмент пути.
    fn download_url(&self, file_id: &str, kind: &str) -> Result<reqwest::Url> {
        if file_id == "." || file_id == ".." || file_id.contains(['/', '\\']) {
            return Err(TransferError::InvalidParameter(format!(
                "file id must be a single path segment, got {file_id:?}"
            )));
        }

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TransferError::InvalidParameter(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                TransferError::InvalidParameter(format!("base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "download", file_id, kind]);
        Ok(url)
    }

    /// Проверяет доступность сервиса (`GET /api/health`).
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| TransferError::InvalidResponse(e.to_string()))
    }
}

fn ensure_file_part(part: &Part, field: &str) -> Result<()> {
    match part {
        Part::File { data, .. } if !data.is_empty() => Ok(()),
        _ => Err(TransferError::MissingInput(field.to_string())),
    }
}

/// Проверка параметров STFT до отправки запроса.
fn validate_stft_params(n_fft: u32, hop_length: u32) -> Result<()> {
    if n_fft == 0 {
        return Err(TransferError::InvalidParameter(
            "n_fft must be positive".to_string(),
        ));
    }
    if hop_length == 0 || hop_length > n_fft {
        return Err(TransferError::InvalidParameter(format!(
            "hop_length must be in 1..={n_fft}, got {hop_length}"
        )));
    }
    if !n_fft.is_power_of_two() {
        tracing::warn!(n_fft, "n_fft is not a power of two");
    }
    Ok(())
}

fn map_send_error(e: reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout
    } else {
        TransferError::Network(e.to_string())
    }
}

/// Тело ошибки читается целиком как текст, без разбора JSON.
async fn api_error(response: reqwest::Response) -> TransferError {
    let status = response.status().as_u16();
    let message = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("failed to read error response: {e}"),
    };
    tracing::warn!(status, message = %message, "service returned an error");
    TransferError::Api { status, message }
}

async fn read_binary(response: reqwest::Response) -> Result<(Bytes, Option<String>)> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(map_send_error)?;
    if bytes.is_empty() {
        return Err(TransferError::InvalidResponse(
            "empty response body".to_string(),
        ));
    }

    Ok((bytes, content_type))
}
