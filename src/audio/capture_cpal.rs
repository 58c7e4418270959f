use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::session::{BlockAssembler, InputDevice};
use super::{CaptureError, CaptureFormat, Result};

/// Захват с микрофона по умолчанию через cpal.
///
/// Частота берется у устройства как есть. Из многоканального потока
/// используется только канал 0, без микширования и изменения громкости.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

impl InputDevice for CpalInput {
    type Stream = Stream;

    fn open(&self, sink: BlockAssembler) -> Result<(Stream, CaptureFormat)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        let device_name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| String::from("unknown"));
        tracing::info!(device = device_name, "audio input device selected");

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceAccess(e.to_string()))?;

        let format = CaptureFormat {
            sample_rate: supported.sample_rate(),
            channels: supported.channels(),
        };
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sink)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &config, sink)?,
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{other:?}")));
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::DeviceAccess(e.to_string()))?;

        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            format = ?sample_format,
            "audio stream playing"
        );

        Ok((stream, format))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: BlockAssembler,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels).max(1);

    let err_callback = |err: cpal::StreamError| {
        tracing::error!(error = %err, "audio stream error");
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                sink.extend(data.iter().step_by(channels).map(|&s| s.to_sample::<f32>()));
            },
            err_callback,
            None,
        )
        .map_err(|e| CaptureError::DeviceAccess(e.to_string()))
}
