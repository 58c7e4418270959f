pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod transfer;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::capture_cpal::CpalInput;
use crate::audio::session::{InputDevice, Recorder};
use crate::audio::wav::{self, WavContainer, WavHeader};
use crate::audio::CaptureError;
use crate::cli::{AudioSource, Command, DownloadKind};
use crate::config::schema::AppConfig;
use crate::error::Result;
use crate::transfer::{Artifact, ArtifactKind, Audio, Image, Part, StegClient, TransferError};

/// Имя загружаемой записи с микрофона.
const RECORDING_FILE_NAME: &str = "recording.wav";

/// Точка входа бинарника: логирование, конфиг, выполнение команды.
pub async fn run(args: Vec<String>) -> Result<()> {
    let command = Command::parse(args)?;

    let log_level = logging::init_logging();
    let app_config = config::storage::load_config().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    log_level.set_level(&app_config.log_level);

    tracing::info!(
        server = %app_config.server_base_url,
        command = ?command,
        "AudioSteg starting"
    );

    let result = execute(command, &app_config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "command failed");
    }
    result
}

async fn execute(command: Command, config: &AppConfig) -> Result<()> {
    let out_dir = output_dir(config);

    match command {
        Command::Record { seconds, out } => {
            let mut recorder = Recorder::new(CpalInput::new(), config.block_size);
            let wav = record_wav(&mut recorder, Duration::from_secs(seconds), config).await?;
            let artifact: Artifact<Audio> = Artifact::new(wav.to_bytes(), Some("audio/wav".to_string()));
            let name = out.as_deref().unwrap_or(RECORDING_FILE_NAME);
            report_saved(&artifact.to_downloadable_file(&out_dir, Some(name))?);
        }
        Command::Embed {
            audio,
            image,
            n_fft,
            hop_length,
            out,
        } => {
            // Оба файла проверяются до записи с микрофона и до запроса.
            let image = read_input(&image, "image_file").await?;
            let audio = match audio {
                AudioSource::File(path) => read_input(&path, "audio_file").await?,
                AudioSource::Microphone { seconds } => {
                    let mut recorder = Recorder::new(CpalInput::new(), config.block_size);
                    let wav = record_wav(&mut recorder, Duration::from_secs(seconds), config).await?;
                    Part::file(wav.to_bytes(), RECORDING_FILE_NAME)
                }
            };

            let client = StegClient::from_config(config)?;
            let artifact = client
                .embed(
                    audio,
                    image,
                    n_fft.unwrap_or(config.n_fft),
                    hop_length.unwrap_or(config.hop_length),
                )
                .await?;
            report_saved(&artifact.to_downloadable_file(&out_dir, out.as_deref())?);
        }
        Command::Extract { image, out } => {
            let image = read_input(&image, "image_file").await?;
            let client = StegClient::from_config(config)?;
            let artifact = client.extract(image).await?;
            describe_audio(&artifact);
            report_saved(&artifact.to_downloadable_file(&out_dir, out.as_deref())?);
        }
        Command::Download { file_id, kind, out } => {
            let client = StegClient::from_config(config)?;
            match kind {
                DownloadKind::Image => {
                    save_download::<Image>(&client, &file_id, &out_dir, out.as_deref()).await?
                }
                DownloadKind::Audio => {
                    save_download::<Audio>(&client, &file_id, &out_dir, out.as_deref()).await?
                }
            }
        }
        Command::Health => {
            let client = StegClient::from_config(config)?;
            let health = client.health().await?;
            println!(
                "status: {} (ffmpeg installed: {}) {}",
                health.status, health.ffmpeg_installed, health.message
            );
        }
    }

    Ok(())
}

/// Записывает `duration` (или до Ctrl+C) и кодирует результат в WAV.
pub async fn record_wav<D: InputDevice>(
    recorder: &mut Recorder<D>,
    duration: Duration,
    config: &AppConfig,
) -> Result<WavContainer> {
    recorder.start()?;
    tracing::info!(seconds = duration.as_secs(), "recording, press Ctrl+C to stop early");

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("recording interrupted by user");
        }
    }

    let recording = recorder.stop().await?.ok_or(CaptureError::NotRecording)?;

    let wav = wav::encode(
        recording.samples.as_slice(),
        recording.sample_rate,
        config.non_finite_policy,
    )?;

    tracing::info!(
        samples = wav.sample_count(),
        sample_rate = wav.sample_rate(),
        duration_ms = wav.duration().as_millis() as u64,
        "recording encoded"
    );
    Ok(wav)
}

/// Читает файл для multipart-поля; отсутствие файла - MissingInput до любого запроса.
async fn read_input(path: &Path, field: &str) -> Result<Part> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        TransferError::MissingInput(format!("{field} ({}): {e}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(Part::file(data, file_name))
}

async fn save_download<K: ArtifactKind>(
    client: &StegClient,
    file_id: &str,
    dir: &Path,
    name: Option<&str>,
) -> Result<()> {
    let artifact = client.download::<K>(file_id).await?;
    report_saved(&artifact.to_downloadable_file(dir, name)?);
    Ok(())
}

fn describe_audio(artifact: &Artifact<Audio>) {
    match WavHeader::parse(artifact.bytes()) {
        Ok(header) => tracing::info!(
            sample_rate = header.sample_rate,
            channels = header.num_channels,
            duration_ms = header.duration().as_millis() as u64,
            "extracted audio"
        ),
        Err(e) => tracing::debug!(error = %e, "extracted audio is not a canonical WAV"),
    }
}

fn output_dir(config: &AppConfig) -> PathBuf {
    config
        .output_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn report_saved(path: &Path) {
    println!("{}", path.display());
}
