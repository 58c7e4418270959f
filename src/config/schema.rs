use serde::{Deserialize, Serialize};

use crate::audio::wav::NonFinitePolicy;
use crate::audio::DEFAULT_BLOCK_SIZE;

/// Основная структура конфигурации приложения.
///
/// Хранится в JSON-файле в app config dir. Отсутствующие поля
/// заполняются значениями по умолчанию.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Версия схемы конфига (для будущих миграций)
    pub config_version: u32,

    /// Базовый URL сервиса стеганографии
    pub server_base_url: String,

    /// Размер окна STFT для embed
    pub n_fft: u32,

    /// Шаг STFT для embed (не больше n_fft)
    pub hop_length: u32,

    /// Размер блока захвата (сэмплы)
    pub block_size: usize,

    /// Таймаут подключения (секунды)
    pub connect_timeout_sec: u32,

    /// Таймаут чтения ответа (секунды)
    pub read_timeout_sec: u32,

    /// Каталог для сохранения артефактов (None - текущий каталог)
    pub output_dir: Option<String>,

    /// Политика для NaN/±∞ при кодировании WAV
    pub non_finite_policy: NonFinitePolicy,

    /// Уровень логирования: "trace", "debug", "info", "warn", "error"
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: 1,
            server_base_url: "http://127.0.0.1:8000".to_string(),
            n_fft: 1024,
            hop_length: 512,
            block_size: DEFAULT_BLOCK_SIZE,
            connect_timeout_sec: 5,
            read_timeout_sec: 120,
            output_dir: None,
            non_finite_policy: NonFinitePolicy::Reject,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_should_have_expected_values() {
        // Given / When
        let config = AppConfig::default();

        // Then
        assert_eq!(config.config_version, 1);
        assert_eq!(config.server_base_url, "http://127.0.0.1:8000");
        assert_eq!(config.n_fft, 1024);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.connect_timeout_sec, 5);
        assert_eq!(config.read_timeout_sec, 120);
        assert!(config.output_dir.is_none());
        assert_eq!(config.non_finite_policy, NonFinitePolicy::Reject);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn config_should_roundtrip_json_serialization() {
        // Given
        let config = AppConfig {
            output_dir: Some("/tmp/out".to_string()),
            non_finite_policy: NonFinitePolicy::ClampToZero,
            ..Default::default()
        };

        // When
        let json = serde_json::to_string_pretty(&config).expect("serialize");
        let restored: AppConfig = serde_json::from_str(&json).expect("deserialize");

        // Then
        assert_eq!(restored, config);
    }

    #[test]
    fn partial_config_should_fill_defaults() {
        // Given
        let json = r#"{ "n_fft": 2048, "non_finite_policy": "clamp_to_zero" }"#;

        // When
        let config: AppConfig = serde_json::from_str(json).unwrap();

        // Then
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.non_finite_policy, NonFinitePolicy::ClampToZero);
    }
}
