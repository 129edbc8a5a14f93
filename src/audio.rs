//! Microphone capture state machine so device, sink, and analyser share one lifecycle.
//!
//! `Idle -> Recording -> Idle`, toggled only from the UI. Every exit path
//! releases the stream, latches the analyser tap shut, and drains the sample
//! sink; the finalized WAV payload is handed onward as opaque bytes.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::spectrum::SpectrumAnalyser;

/// Finalized capture: 16-bit PCM WAV plus the wall-clock length it covers.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub wav: Vec<u8>,
    pub duration_secs: f32,
}

struct CaptureSession {
    stream: cpal::Stream,
    sink: Arc<Mutex<Vec<f32>>>,
    analyser: SpectrumAnalyser,
    sample_rate: u32,
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Latch the tap before the stream field drops, so a meter tick racing
        // the teardown observes a closed tap rather than a released device.
        self.analyser.close();
    }
}

/// Owner of the capture lifecycle. At most one session is live at a time.
pub struct Recorder {
    input_device: Option<String>,
    capture: Option<CaptureSession>,
}

impl Recorder {
    pub fn new(input_device: Option<String>) -> Self {
        Self {
            input_device,
            capture: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    /// Acquire the input device and begin buffering. Returns the analyser tap
    /// for the meter. A missing or refused device is `PermissionDenied`.
    pub fn start(&mut self) -> ClientResult<SpectrumAnalyser> {
        if self.capture.is_some() {
            return Err(ClientError::Capture("capture already active".to_string()));
        }

        let host = cpal::default_host();
        let device = match self.input_device.as_deref() {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or(ClientError::PermissionDenied)?,
            None => host
                .default_input_device()
                .ok_or(ClientError::PermissionDenied)?,
        };
        debug!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "starting capture"
        );

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let channels = usize::from(config.channels.max(1));
        let sample_rate = config.sample_rate.0;

        let sink = Arc::new(Mutex::new(Vec::new()));
        let analyser = SpectrumAnalyser::new();
        let error_callback = |err| warn!("capture stream error: {err}");

        let stream = match sample_format {
            SampleFormat::F32 => {
                let sink = Arc::clone(&sink);
                let tap = analyser.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = downmix_to_mono(data, channels);
                        tap.push_samples(&mono);
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&mono);
                        }
                    },
                    error_callback,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let sink = Arc::clone(&sink);
                let tap = analyser.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats = pcm_i16_to_f32(data);
                        let mono = downmix_to_mono(&floats, channels);
                        tap.push_samples(&mono);
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&mono);
                        }
                    },
                    error_callback,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let sink = Arc::clone(&sink);
                let tap = analyser.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let floats = pcm_u16_to_f32(data);
                        let mono = downmix_to_mono(&floats, channels);
                        tap.push_samples(&mono);
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&mono);
                        }
                    },
                    error_callback,
                    None,
                )?
            }
            other => {
                return Err(ClientError::Capture(format!(
                    "unsupported input sample format: {other:?}"
                )))
            }
        };
        stream.play()?;

        let tap = analyser.clone();
        self.capture = Some(CaptureSession {
            stream,
            sink,
            analyser,
            sample_rate,
        });
        Ok(tap)
    }

    /// Halt the stream, release every resource, and finalize the payload.
    /// Valid only while recording; always succeeds after a successful start.
    pub fn stop(&mut self) -> ClientResult<EncodedAudio> {
        let capture = self
            .capture
            .take()
            .ok_or_else(|| ClientError::Capture("no capture active".to_string()))?;

        let sink = Arc::clone(&capture.sink);
        let sample_rate = capture.sample_rate;
        // Closes the tap, then releases the device stream.
        drop(capture);

        let samples = sink
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default();
        let duration_secs = samples.len() as f32 / sample_rate as f32;
        debug!(samples = samples.len(), duration_secs, "capture finalized");

        Ok(EncodedAudio {
            wav: encode_wav(&samples, sample_rate)?,
            duration_secs,
        })
    }

    /// Abandon an in-flight capture without producing a payload. Resources
    /// are still released.
    pub fn discard(&mut self) {
        self.capture = None;
    }
}

/// Average interleaved frames down to mono.
fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn pcm_i16_to_f32(samples: &[i16]) -> Vec<f32> {
    const SCALE: f32 = i16::MAX as f32;
    samples
        .iter()
        .map(|&sample| f32::from(sample) / SCALE)
        .collect()
}

fn pcm_u16_to_f32(samples: &[u16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| (f32::from(sample) - 32768.0) / 32768.0)
        .collect()
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
fn encode_wav(samples: &[f32], sample_rate: u32) -> ClientResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|err| ClientError::Capture(err.to_string()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(value)
            .map_err(|err| ClientError::Capture(err.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|err| ClientError::Capture(err.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_recorder_is_idle() {
        let recorder = Recorder::new(None);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let mut recorder = Recorder::new(None);
        assert!(matches!(recorder.stop(), Err(ClientError::Capture(_))));
    }

    #[test]
    fn downmix_averages_interleaved_frames() {
        let stereo = [0.2, 0.4, -1.0, 1.0];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mono = [0.1, -0.2, 0.3];
        assert_eq!(downmix_to_mono(&mono, 1), mono.to_vec());
    }

    #[test]
    fn i16_conversion_spans_unit_range() {
        let converted = pcm_i16_to_f32(&[i16::MAX, 0, i16::MIN]);
        assert!((converted[0] - 1.0).abs() < 1e-6);
        assert_eq!(converted[1], 0.0);
        assert!(converted[2] < -1.0 + 1e-3);
    }

    #[test]
    fn u16_conversion_centers_on_zero() {
        let converted = pcm_u16_to_f32(&[32768, 0, u16::MAX]);
        assert_eq!(converted[0], 0.0);
        assert_eq!(converted[1], -1.0);
        assert!((converted[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn encoded_wav_round_trips_through_hound() {
        let samples = [0.0f32, 0.5, -0.5, 1.0];
        let wav = encode_wav(&samples, 16_000).expect("encode");
        let reader = hound::WavReader::new(Cursor::new(wav)).expect("parse");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), samples.len() as u32);
    }

    #[test]
    fn zero_duration_capture_still_encodes_a_valid_container() {
        let wav = encode_wav(&[], 48_000).expect("encode");
        let reader = hound::WavReader::new(Cursor::new(wav)).expect("parse");
        assert_eq!(reader.len(), 0);
        assert_eq!(reader.spec().sample_rate, 48_000);
    }

    #[test]
    fn clipping_samples_clamp_instead_of_wrapping() {
        let wav = encode_wav(&[2.0, -2.0], 16_000).expect("encode");
        let mut reader = hound::WavReader::new(Cursor::new(wav)).expect("parse");
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
        assert_eq!(decoded, vec![i16::MAX, i16::MIN + 1]);
    }
}
