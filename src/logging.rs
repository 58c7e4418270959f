use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Уровень по умолчанию, пока конфиг еще не прочитан.
const BOOT_LEVEL: &str = "info";

/// Позволяет сменить уровень логирования после загрузки конфига.
pub struct LogLevelHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogLevelHandle {
    /// Применяет `log_level` из конфига. RUST_LOG имеет приоритет и не перекрывается.
    pub fn set_level(&self, level: &str) {
        if self.from_env {
            return;
        }
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.filter.reload(filter) {
                    tracing::warn!(error = %e, "failed to apply log level");
                }
            }
            Err(e) => tracing::warn!(level = %level, error = %e, "invalid log level in config, keeping current"),
        }
    }
}

/// Инициализирует систему логирования.
///
/// Вызывается до загрузки конфига, чтобы сообщения о его чтении и
/// восстановлении попадали в лог. Файл с ротацией по дням, плюс stderr
/// в debug-сборке (stdout занят путями артефактов).
pub fn init_logging() -> LogLevelHandle {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("audiosteg")
        .join("logs");

    let file_appender = rolling::daily(&log_dir, "audiosteg.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Фоновый writer нужен до конца команды, guard не освобождаем.
    std::mem::forget(guard);

    let (env_filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(BOOT_LEVEL), false),
    };
    let (filter_layer, filter) = reload::Layer::new(env_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry()
        .with(filter_layer)
        .with(file_layer);

    #[cfg(debug_assertions)]
    {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        registry.with(stderr_layer).init();
    }

    #[cfg(not(debug_assertions))]
    {
        registry.init();
    }

    LogLevelHandle { filter, from_env }
}
