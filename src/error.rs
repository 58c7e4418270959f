/// Общий тип ошибки приложения.
///
/// Каждый вариант соответствует модулю, который может генерировать ошибки.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Capture error: {0}")]
    Capture(#[from] crate::audio::CaptureError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] crate::audio::wav::EncodingError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] crate::transfer::TransferError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Usage error: {0}")]
    Usage(String),
}

/// Общий Result-тип приложения.
pub type Result<T> = std::result::Result<T, AppError>;
