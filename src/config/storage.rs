use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::schema::AppConfig;
use crate::error::{AppError, Result};

/// Имя файла конфигурации.
const CONFIG_FILE_NAME: &str = "config.json";

/// Имя бэкапа поврежденного конфига.
const CONFIG_BACKUP_NAME: &str = "config.json.bak";

/// Идентификатор приложения.
const APP_IDENTIFIER: &str = "com.audiosteg.app";

/// Переменная окружения, переопределяющая адрес сервиса.
pub const SERVER_URL_ENV: &str = "AUDIOSTEG_SERVER_URL";

/// Возвращает путь к каталогу конфигурации приложения.
///
/// Windows: `%APPDATA%/com.audiosteg.app/`
/// macOS: `~/Library/Application Support/com.audiosteg.app/`
/// Linux: `~/.config/com.audiosteg.app/`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| AppError::Config("failed to determine OS config directory".to_string()))?;
    Ok(base.join(APP_IDENTIFIER))
}

/// Загружает конфиг из каталога по умолчанию и применяет переменные окружения.
pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&config_dir()?)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Загружает конфиг из JSON-файла в `dir`.
///
/// - Если файл не существует - возвращает дефолтный конфиг и сохраняет его.
/// - Если файл поврежден - логирует ошибку, создает бэкап, возвращает дефолтный.
pub fn load_config_from(dir: &Path) -> Result<AppConfig> {
    let path = dir.join(CONFIG_FILE_NAME);

    if !path.exists() {
        info!("Config file not found, creating default at {:?}", path);
        let config = AppConfig::default();
        save_config_to(dir, &config)?;
        return Ok(config);
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| AppError::Config(format!("failed to read config file {:?}: {}", path, e)))?;

    match serde_json::from_str::<AppConfig>(&content) {
        Ok(config) => {
            info!("Config loaded from {:?}", path);
            Ok(config)
        }
        Err(e) => {
            warn!(
                "Config file corrupted: {}. Backing up and using defaults.",
                e
            );
            let backup_path = dir.join(CONFIG_BACKUP_NAME);
            if let Err(backup_err) = fs::copy(&path, &backup_path) {
                warn!("Failed to create config backup: {}", backup_err);
            }
            let config = AppConfig::default();
            save_config_to(dir, &config)?;
            Ok(config)
        }
    }
}

/// Сохраняет конфиг в JSON-файл в `dir`.
///
/// Создает каталог если не существует. Использует атомарную запись
/// (запись во временный файл + переименование).
pub fn save_config_to(dir: &Path, config: &AppConfig) -> Result<()> {
    let path = dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(dir).map_err(|e| {
        AppError::Config(format!(
            "failed to create config directory {:?}: {}",
            dir, e
        ))
    })?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("failed to serialize config: {}", e)))?;

    let tmp_path = dir.join("config.json.tmp");
    fs::write(&tmp_path, &json).map_err(|e| {
        AppError::Config(format!(
            "failed to write temp config file {:?}: {}",
            tmp_path, e
        ))
    })?;

    fs::rename(&tmp_path, &path).map_err(|e| {
        AppError::Config(format!("failed to rename temp config to {:?}: {}", path, e))
    })?;

    info!("Config saved to {:?}", path);
    Ok(())
}

/// Переопределения из окружения (в файл не сохраняются).
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var(SERVER_URL_ENV) {
        let url = url.trim();
        if !url.is_empty() {
            info!(url, "server URL overridden from environment");
            config.server_base_url = url.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn load_should_create_default_when_file_missing() {
        // Given
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("audiosteg");

        // When
        let config = load_config_from(&dir).unwrap();

        // Then
        assert_eq!(config, AppConfig::default());
        assert!(dir.join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn save_and_load_should_roundtrip() {
        // Given
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("audiosteg");
        let config = AppConfig {
            server_base_url: "https://steg.example.com".to_string(),
            n_fft: 2048,
            hop_length: 256,
            ..Default::default()
        };

        // When
        save_config_to(&dir, &config).unwrap();
        let loaded = load_config_from(&dir).unwrap();

        // Then
        assert_eq!(loaded.server_base_url, "https://steg.example.com");
        assert_eq!(loaded.n_fft, 2048);
        assert_eq!(loaded.hop_length, 256);
    }

    #[test]
    fn load_should_fallback_to_default_when_corrupted() {
        // Given
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("audiosteg");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), "{ invalid json !!!").unwrap();

        // When
        let config = load_config_from(&dir).unwrap();

        // Then - должен вернуть дефолтный конфиг
        assert_eq!(config, AppConfig::default());
        // Бэкап должен быть создан
        let backup = fs::read_to_string(dir.join(CONFIG_BACKUP_NAME)).unwrap();
        assert_eq!(backup, "{ invalid json !!!");
    }

    #[test]
    fn save_should_create_directory_if_not_exists() {
        // Given
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("deep").join("nested").join("config");

        // When
        save_config_to(&dir, &AppConfig::default()).unwrap();

        // Then
        assert!(dir.join(CONFIG_FILE_NAME).exists());
        assert!(!dir.join("config.json.tmp").exists());
    }

    #[test]
    #[serial]
    fn env_should_override_server_url() {
        // Given
        let mut config = AppConfig::default();
        std::env::set_var(SERVER_URL_ENV, " http://10.0.0.5:9000 ");

        // When
        apply_env_overrides(&mut config);
        std::env::remove_var(SERVER_URL_ENV);

        // Then
        assert_eq!(config.server_base_url, "http://10.0.0.5:9000");
    }

    #[test]
    #[serial]
    fn blank_env_should_keep_configured_url() {
        // Given
        let mut config = AppConfig::default();
        std::env::set_var(SERVER_URL_ENV, "   ");

        // When
        apply_env_overrides(&mut config);
        std::env::remove_var(SERVER_URL_ENV);

        // Then
        assert_eq!(config.server_base_url, "http://127.0.0.1:8000");
    }
}
