pub mod capture_cpal;
pub mod session;
pub mod wav;

/// Размер блока сэмплов по умолчанию (как у ScriptProcessor в браузере).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Метаданные захваченного аудио (формат устройства).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Неизменяемый блок mono-сэмплов, полученный от драйвера захвата.
///
/// Значения могут выходить за [-1.0, 1.0]: клиппинг делается только
/// при кодировании в WAV.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Box<[f32]>,
}

impl SampleBlock {
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f32>> for SampleBlock {
    fn from(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }
}

/// Плоский PCM-буфер: все блоки сессии подряд, в порядке поступления.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
}

impl PcmBuffer {
    /// Склеивает блоки без ресемплинга, фильтрации и изменения громкости.
    pub fn from_blocks(blocks: &[SampleBlock]) -> Self {
        let total = blocks.iter().map(SampleBlock::len).sum();
        let mut samples = Vec::with_capacity(total);
        for block in blocks {
            samples.extend_from_slice(block.as_slice());
        }
        Self { samples }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f32>> for PcmBuffer {
    fn from(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

/// Ошибки аудио-модуля (захват с устройства).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("no audio input device found")]
    NoInputDevice,

    #[error("audio input device is not accessible: {0}")]
    DeviceAccess(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("block size must be positive")]
    InvalidBlockSize,

    #[error("already recording")]
    AlreadyRecording,

    #[error("no active capture session")]
    NotRecording,

    #[error("capture needs a tokio runtime: {0}")]
    NoRuntime(String),

    #[error("block accumulator failed: {0}")]
    Accumulator(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
