use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Размер канонического заголовка RIFF/WAVE.
pub const WAV_HEADER_SIZE: usize = 44;

const FMT_CHUNK_SIZE: u32 = 16;
const PCM_FORMAT: u16 = 1;
const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u32 = 2;
const BLOCK_ALIGN: u16 = 2;

/// Что делать с NaN/±∞ при кодировании.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Ошибка `NonFiniteSample` с индексом первого плохого сэмпла.
    #[default]
    Reject,
    /// NaN и ±∞ кодируются как тишина (0).
    ClampToZero,
}

/// Ошибки WAV-кодека.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("non-finite sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("too many samples for a WAV container: {0}")]
    TooLong(usize),

    #[error("malformed WAV header: {0}")]
    MalformedHeader(String),
}

pub type Result<T> = std::result::Result<T, EncodingError>;

/// Готовый WAV-файл (mono, 16 бит, PCM). После создания не меняется.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavContainer {
    bytes: Bytes,
    sample_rate: u32,
    sample_count: usize,
}

impl WavContainer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Дешевая копия для multipart-запроса.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn data_size(&self) -> u32 {
        (self.bytes.len() - WAV_HEADER_SIZE) as u32
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Длительность воспроизведения: sample_count / sample_rate, с точностью до наносекунды.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.sample_count as u64, self.sample_rate)
    }
}

fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    let rate = u64::from(sample_rate);
    let secs = samples / rate;
    let nanos = (samples % rate) * 1_000_000_000 / rate;
    Duration::new(secs, nanos as u32)
}

/// Кодирует mono float PCM в канонический WAV.
///
/// Чистая функция: одинаковый вход дает побайтно одинаковый выход.
/// Пустой буфер дает 44-байтный заголовок с dataSize = 0.
pub fn encode(samples: &[f32], sample_rate: u32, policy: NonFinitePolicy) -> Result<WavContainer> {
    if sample_rate == 0 || sample_rate.checked_mul(BYTES_PER_SAMPLE).is_none() {
        return Err(EncodingError::InvalidSampleRate(sample_rate));
    }

    let data_size = u32::try_from(samples.len())
        .ok()
        .and_then(|n| n.checked_mul(BYTES_PER_SAMPLE))
        .filter(|size| size.checked_add(36).is_some())
        .ok_or(EncodingError::TooLong(samples.len()))?;

    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + data_size as usize);
    out.extend_from_slice(&build_header(sample_rate, data_size));

    for (index, &sample) in samples.iter().enumerate() {
        let sample = if sample.is_finite() {
            sample
        } else {
            match policy {
                NonFinitePolicy::Reject => return Err(EncodingError::NonFiniteSample { index }),
                NonFinitePolicy::ClampToZero => 0.0,
            }
        };
        out.extend_from_slice(&quantize(sample).to_le_bytes());
    }

    tracing::debug!(
        samples = samples.len(),
        sample_rate,
        output_bytes = out.len(),
        "WAV encoding complete"
    );

    Ok(WavContainer {
        bytes: Bytes::from(out),
        sample_rate,
        sample_count: samples.len(),
    })
}

/// Float -> i16: сначала клиппинг в [-1, 1], затем асимметричное масштабирование
/// (отрицательные на 32768, неотрицательные на 32767) и округление.
fn quantize(sample: f32) -> i16 {
    let s = f64::from(sample.clamp(-1.0, 1.0));
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Формирует 44-байтный заголовок.
///
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  1 (PCM)
/// [22-23]  1 (mono)
/// [24-27]  sample_rate
/// [28-31]  sample_rate * 2
/// [32-33]  2
/// [34-35]  16
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
fn build_header(sample_rate: u32, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
    header[22..24].copy_from_slice(&NUM_CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&(sample_rate * BYTES_PER_SAMPLE).to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Разобранный канонический заголовок WAV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub chunk_size: u32,
    pub audio_format: u16,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Читает 44-байтный заголовок. Поддерживается только каноническая
    /// раскладка, где "data" идет сразу за "fmt ".
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(EncodingError::MalformedHeader(format!(
                "expected at least {WAV_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        for (offset, magic) in [(0, b"RIFF"), (8, b"WAVE"), (12, b"fmt "), (36, b"data")] {
            if &bytes[offset..offset + 4] != magic {
                return Err(EncodingError::MalformedHeader(format!(
                    "missing {:?} at offset {offset}",
                    String::from_utf8_lossy(magic)
                )));
            }
        }

        let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
        let u32_at =
            |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);

        Ok(Self {
            chunk_size: u32_at(4),
            audio_format: u16_at(20),
            num_channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        })
    }

    /// Длительность по заголовку (0, если формат не позволяет посчитать).
    pub fn duration(&self) -> Duration {
        if self.block_align == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = u64::from(self.data_size / u32::from(self.block_align));
        samples_to_duration(frames, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(wav: &WavContainer, i: usize) -> i16 {
        let o = WAV_HEADER_SIZE + i * 2;
        let b = wav.as_bytes();
        i16::from_le_bytes([b[o], b[o + 1]])
    }

    #[test]
    fn encode_should_write_canonical_header() {
        // Given
        let samples = vec![0.0f32; 100];

        // When
        let wav = encode(&samples, 48_000, NonFinitePolicy::Reject).unwrap();

        // Then
        let b = wav.as_bytes();
        assert_eq!(&b[0..4], b"RIFF");
        assert_eq!(&b[8..12], b"WAVE");
        assert_eq!(&b[12..16], b"fmt ");
        assert_eq!(&b[36..40], b"data");

        let header = WavHeader::parse(b).unwrap();
        assert_eq!(header.chunk_size, 36 + 200);
        assert_eq!(header.audio_format, 1);
        assert_eq!(header.num_channels, 1);
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.byte_rate, 96_000);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_size, 200);
        assert_eq!(u32::from_le_bytes([b[16], b[17], b[18], b[19]]), 16);
    }

    #[test]
    fn header_sizes_should_track_sample_count() {
        for len in [1usize, 2, 4095, 4096, 12_345] {
            // Given
            let samples = vec![0.1f32; len];

            // When
            let wav = encode(&samples, 44_100, NonFinitePolicy::Reject).unwrap();
            let header = WavHeader::parse(wav.as_bytes()).unwrap();

            // Then
            assert_eq!(header.chunk_size as usize, 36 + 2 * len);
            assert_eq!(header.data_size as usize, 2 * len);
            assert_eq!(wav.len(), 44 + 2 * len);
            assert_eq!(wav.data_size() as usize, 2 * len);
        }
    }

    #[test]
    fn encode_should_handle_empty_input() {
        // Given
        let empty: Vec<f32> = vec![];

        // When
        let wav = encode(&empty, 48_000, NonFinitePolicy::Reject).expect("empty encoding should not fail");

        // Then
        assert_eq!(wav.len(), 44);
        assert!(wav.is_empty());
        let header = WavHeader::parse(wav.as_bytes()).unwrap();
        assert_eq!(header.data_size, 0);
        assert_eq!(header.chunk_size, 36);
    }

    #[test]
    fn quantization_should_use_asymmetric_scaling() {
        // Given
        let samples = [1.0f32, -1.0, 0.0, 1.5, -1.5, 0.5, -0.5];

        // When
        let wav = encode(&samples, 8_000, NonFinitePolicy::Reject).unwrap();

        // Then
        assert_eq!(sample_at(&wav, 0), 32767);
        assert_eq!(sample_at(&wav, 1), -32768);
        assert_eq!(sample_at(&wav, 2), 0);
        assert_eq!(sample_at(&wav, 3), 32767); // как 1.0
        assert_eq!(sample_at(&wav, 4), -32768); // как -1.0
        assert_eq!(sample_at(&wav, 5), 16384); // 16383.5 -> 16384
        assert_eq!(sample_at(&wav, 6), -16384);
    }

    #[test]
    fn quantization_should_round_to_nearest() {
        // 0.25 * 32767 = 8191.75
        assert_eq!(quantize(0.25), 8192);
        // -0.25 * 32768 = -8192.0
        assert_eq!(quantize(-0.25), -8192);
        // 0.1 * 32767 = 3276.7
        assert_eq!(quantize(0.1), 3277);
    }

    #[test]
    fn encode_should_be_deterministic() {
        // Given
        let samples: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.01).sin()).collect();

        // When
        let a = encode(&samples, 22_050, NonFinitePolicy::Reject).unwrap();
        let b = encode(&samples, 22_050, NonFinitePolicy::Reject).unwrap();

        // Then
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn encode_should_reject_non_finite_by_default() {
        // Given
        let samples = [0.0f32, 0.5, f32::NAN, f32::INFINITY];

        // When
        let result = encode(&samples, 48_000, NonFinitePolicy::default());

        // Then
        assert_eq!(result.unwrap_err(), EncodingError::NonFiniteSample { index: 2 });
    }

    #[test]
    fn encode_should_clamp_non_finite_to_zero_when_configured() {
        // Given
        let samples = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 1.0];

        // When
        let wav = encode(&samples, 48_000, NonFinitePolicy::ClampToZero).unwrap();

        // Then
        assert_eq!(sample_at(&wav, 0), 0);
        assert_eq!(sample_at(&wav, 1), 0);
        assert_eq!(sample_at(&wav, 2), 0);
        assert_eq!(sample_at(&wav, 3), 32767);
    }

    #[test]
    fn encode_should_reject_zero_sample_rate() {
        let result = encode(&[0.0], 0, NonFinitePolicy::Reject);
        assert_eq!(result.unwrap_err(), EncodingError::InvalidSampleRate(0));
    }

    #[test]
    fn duration_should_equal_samples_over_rate() {
        // Given: 10 блоков по 4096 при 8192 Hz = ровно 5 секунд
        let samples = vec![0.0f32; 10 * 4096];

        // When
        let wav = encode(&samples, 8_192, NonFinitePolicy::Reject).unwrap();

        // Then
        assert_eq!(wav.duration(), Duration::from_secs(5));
        let header = WavHeader::parse(wav.as_bytes()).unwrap();
        assert_eq!(header.duration(), Duration::from_secs(5));
    }

    #[test]
    fn duration_should_keep_fractional_part() {
        // Given: 3 блока по 4096 при 48 kHz = 0.256 s
        let samples = vec![0.0f32; 3 * 4096];

        // When
        let wav = encode(&samples, 48_000, NonFinitePolicy::Reject).unwrap();

        // Then
        assert_eq!(wav.duration(), Duration::from_millis(256));
    }

    #[test]
    fn parse_should_reject_short_buffer() {
        let result = WavHeader::parse(b"RIFF");
        assert!(matches!(result, Err(EncodingError::MalformedHeader(_))));
    }

    #[test]
    fn parse_should_reject_wrong_magic() {
        // Given
        let mut bytes = encode(&[0.0], 8_000, NonFinitePolicy::Reject)
            .unwrap()
            .as_bytes()
            .to_vec();
        bytes[8..12].copy_from_slice(b"AVI ");

        // When
        let err = WavHeader::parse(&bytes).unwrap_err().to_string();

        // Then
        assert!(err.contains("WAVE"), "got: {err}");
    }
}
