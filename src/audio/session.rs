use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{CaptureError, CaptureFormat, PcmBuffer, Result, SampleBlock};

/// Источник аудио, который умеет открыть поток захвата.
///
/// Драйвер обязан передавать сэмплы в `sink` из своего callback-а
/// и держать `sink` живым, пока жив `Stream`. Уничтожение `Stream`
/// освобождает устройство.
pub trait InputDevice {
    type Stream;

    fn open(&self, sink: BlockAssembler) -> Result<(Self::Stream, CaptureFormat)>;
}

/// Нарезает поток сэмплов на блоки фиксированного размера и отправляет их в канал.
///
/// Работает в callback-е драйвера: не блокируется и не делает I/O.
/// При уничтожении отправляет неполный хвостовой блок, чтобы
/// ни один сэмпл не потерялся.
pub struct BlockAssembler {
    block_size: usize,
    pending: Vec<f32>,
    tx: mpsc::UnboundedSender<SampleBlock>,
    closed: bool,
}

impl BlockAssembler {
    pub fn new(block_size: usize, tx: mpsc::UnboundedSender<SampleBlock>) -> Self {
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            tx,
            closed: false,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.extend(samples.iter().copied());
    }

    pub fn extend<I: IntoIterator<Item = f32>>(&mut self, samples: I) {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.block_size {
                self.emit();
            }
        }
    }

    fn emit(&mut self) {
        let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
        if self.tx.send(SampleBlock::from(block)).is_err() && !self.closed {
            self.closed = true;
            tracing::debug!("block receiver dropped, discarding further audio");
        }
    }
}

impl Drop for BlockAssembler {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.emit();
        }
    }
}

/// Накопитель блоков активной сессии.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    blocks: Vec<SampleBlock>,
}

impl BlockAccumulator {
    /// O(размер блока), без I/O.
    pub fn append(&mut self, block: SampleBlock) {
        self.blocks.push(block);
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn flatten(&self) -> PcmBuffer {
        PcmBuffer::from_blocks(&self.blocks)
    }
}

/// Вычитывает канал до закрытия всех отправителей.
async fn drain_blocks(mut rx: mpsc::UnboundedReceiver<SampleBlock>) -> BlockAccumulator {
    let mut acc = BlockAccumulator::default();
    while let Some(block) = rx.recv().await {
        acc.append(block);
    }
    acc
}

/// Результат завершенной сессии: PCM-буфер и частота устройства.
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: PcmBuffer,
    pub sample_rate: u32,
    pub block_count: usize,
}

/// Активная сессия захвата.
///
/// Владеет живым потоком устройства. `stop` поглощает сессию,
/// поэтому повторная остановка той же сессии невозможна.
pub struct CaptureSession<S> {
    stream: S,
    format: CaptureFormat,
    drain: JoinHandle<BlockAccumulator>,
}

impl<S> CaptureSession<S> {
    /// Открывает устройство и запускает задачу-накопитель.
    ///
    /// Должна вызываться внутри tokio runtime, иначе `NoRuntime` еще до
    /// открытия устройства. При ошибке устройства никакого состояния не
    /// остается: накопитель завершается вместе с закрытым каналом.
    pub fn start<D>(device: &D, block_size: usize) -> Result<Self>
    where
        D: InputDevice<Stream = S>,
    {
        if block_size == 0 {
            return Err(CaptureError::InvalidBlockSize);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CaptureError::NoRuntime(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let drain = runtime.spawn(drain_blocks(rx));
        let (stream, format) = device.open(BlockAssembler::new(block_size, tx))?;

        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            block_size,
            "capture session started"
        );

        Ok(Self {
            stream,
            format,
            drain,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Останавливает захват и возвращает склеенный PCM-буфер.
    ///
    /// Поток уничтожается первым: это освобождает устройство и закрывает
    /// канал, после чего накопитель отдает все блоки.
    pub async fn stop(self) -> Result<Recording> {
        let Self {
            stream,
            format,
            drain,
        } = self;
        drop(stream);

        let acc = drain
            .await
            .map_err(|e| CaptureError::Accumulator(e.to_string()))?;
        let samples = acc.flatten();

        tracing::info!(
            samples = samples.len(),
            blocks = acc.block_count(),
            sample_rate = format.sample_rate,
            "capture session stopped"
        );

        Ok(Recording {
            samples,
            sample_rate: format.sample_rate,
            block_count: acc.block_count(),
        })
    }
}

/// Слот "текущей записи" для UI: не более одной активной сессии.
///
/// Остановка без активной сессии - не ошибка, а пустой результат.
pub struct Recorder<D: InputDevice> {
    device: D,
    block_size: usize,
    active: Option<CaptureSession<D::Stream>>,
}

impl<D: InputDevice> Recorder<D> {
    pub fn new(device: D, block_size: usize) -> Self {
        Self {
            device,
            block_size,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        let session = CaptureSession::start(&self.device, self.block_size)?;
        self.active = Some(session);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<Option<Recording>> {
        match self.active.take() {
            Some(session) => session.stop().await.map(Some),
            None => {
                tracing::debug!("stop requested without an active capture session");
                Ok(None)
            }
        }
    }
}
