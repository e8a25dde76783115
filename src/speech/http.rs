//! Remote TTS + local playback.
//!
//! Pipeline:
//! 1. Text → capped to `max_chars`
//! 2. POST {text, speaker, sample_rate} → WAV bytes from the TTS server
//! 3. WAV → f32 samples (hound)
//! 4. Samples → rodio Sink playback, stoppable via `skip()`
//!
//! Construction opens the audio output once; keep one instance per voice
//! and share it through an `Arc`.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{cap_text, SpeechSynthesizer};
use crate::config::SpeechConfig;
use crate::error::SpeechError;

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    speaker: &'a str,
    sample_rate: u32,
}

/// Decoded audio ready for playback.
#[derive(Debug)]
pub struct Pcm {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Ask the TTS server to render `text` as WAV.
pub async fn request_wav(client: &Client, config: &SpeechConfig, text: &str) -> Result<Vec<u8>, SpeechError> {
    let body = TtsRequest {
        text,
        speaker: &config.speaker,
        sample_rate: config.sample_rate,
    };
    let resp = client.post(&config.url).json(&body).send().await?;
    if !resp.status().is_success() {
        return Err(SpeechError::Status(resp.status().as_u16()));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Full-scale magnitude of a signed integer sample with `bits` bits.
fn int_scale(bits: u16) -> Result<f32, SpeechError> {
    match bits.checked_sub(1) {
        Some(shift) if bits <= 32 => Ok((1i64 << shift) as f32),
        _ => Err(SpeechError::Output(format!("unsupported WAV bit depth: {bits}"))),
    }
}

/// Decode WAV bytes into interleaved f32 samples in [-1, 1].
pub fn decode_wav(bytes: &[u8]) -> Result<Pcm, SpeechError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample)?;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Pcm {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        samples,
    })
}

pub struct HttpSpeechSynthesizer {
    config: SpeechConfig,
    client: Client,

    // Kept alive for the process lifetime; rodio 0.21 has no separate handle
    output_stream: OutputStream,

    cancel_flag: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
    active_sink: Arc<Mutex<Option<Sink>>>,
}

impl HttpSpeechSynthesizer {
    /// Open the default audio output. Blocking; call once at startup.
    pub fn new(config: SpeechConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let output_stream =
            OutputStreamBuilder::open_default_stream().map_err(|e| SpeechError::Output(e.to_string()))?;

        info!("Speech synthesizer ready (server: {}, speaker: {})", config.url, config.speaker);
        Ok(Self {
            config,
            client,
            output_stream,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            speaking: Arc::new(AtomicBool::new(false)),
            active_sink: Arc::new(Mutex::new(None)),
        })
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let capped = cap_text(text, self.config.max_chars);
        if capped.len() < text.len() {
            warn!(
                "Text too long ({} chars), truncating to {}",
                text.chars().count(),
                self.config.max_chars
            );
        }

        let t_gen = Instant::now();
        let wav = request_wav(&self.client, &self.config, capped).await?;
        let pcm = decode_wav(&wav)?;
        let gen_ms = t_gen.elapsed().as_secs_f64() * 1000.0;

        if pcm.samples.is_empty() {
            return Ok(());
        }

        let t_play = Instant::now();
        let cancelled = self.play(pcm).await;
        debug!(
            "Spoke {} chars: gen={gen_ms:.0}ms play={:.1}s{}",
            capped.chars().count(),
            t_play.elapsed().as_secs_f64(),
            if cancelled { " (skipped)" } else { "" }
        );
        Ok(())
    }

    /// Play samples through rodio. Returns true if skipped during playback.
    async fn play(&self, pcm: Pcm) -> bool {
        let sink = Sink::connect_new(self.output_stream.mixer());
        sink.append(SamplesBuffer::new(pcm.channels, pcm.sample_rate, pcm.samples));
        *lock(&self.active_sink) = Some(sink);

        let cancel_flag = self.cancel_flag.clone();
        let active_sink = self.active_sink.clone();

        let was_cancelled = tokio::task::spawn_blocking(move || loop {
            let is_empty = lock(&active_sink).as_ref().map_or(true, Sink::empty);
            if is_empty {
                return false;
            }

            if cancel_flag.load(Ordering::Relaxed) {
                if let Some(sink) = lock(&active_sink).take() {
                    sink.stop();
                }
                return true;
            }

            std::thread::sleep(Duration::from_millis(50));
        })
        .await
        .unwrap_or(false);

        *lock(&self.active_sink) = None;
        was_cancelled
    }
}

/// The sink slot stays usable even if a playback thread panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize_and_play(&self, text: &str) -> bool {
        self.cancel_flag.store(false, Ordering::Relaxed);
        self.speaking.store(true, Ordering::Relaxed);
        info!("Synthesizing: {text}");

        let result = self.speak(text).await;

        self.speaking.store(false, Ordering::Relaxed);
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Speech synthesis failed: {e}");
                false
            }
        }
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    fn skip(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(sink) = lock(&self.active_sink).take() {
            sink.stop();
        }
        info!("Skipped current utterance");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    fn wav_bytes(spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn int16_mono(rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn decodes_int16_wav_to_unit_range() {
        let bytes = wav_bytes(int16_mono(8000), |w| {
            for s in [0i16, 16384, -32768] {
                w.write_sample(s).unwrap();
            }
        });

        let pcm = decode_wav(&bytes).unwrap();
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.sample_rate, 8000);
        assert_eq!(pcm.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn decodes_float_wav() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, |w| {
            for s in [0.25f32, -0.25] {
                w.write_sample(s).unwrap();
            }
        });

        let pcm = decode_wav(&bytes).unwrap();
        assert_eq!(pcm.channels, 2);
        assert_eq!(pcm.samples, vec![0.25, -0.25]);
    }

    #[test]
    fn int_scale_rejects_bad_bit_depths() {
        assert_eq!(int_scale(16).unwrap(), 32768.0);
        assert_eq!(int_scale(24).unwrap(), 8_388_608.0);
        assert!(matches!(int_scale(0), Err(SpeechError::Output(_))));
        assert!(matches!(int_scale(64), Err(SpeechError::Output(_))));
    }

    #[test]
    fn zero_bit_header_does_not_panic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&38u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&16000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // bits per sample
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);

        assert!(decode_wav(&bytes).is_err());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode_wav(b"not a wav"), Err(SpeechError::Wav(_))));
    }

    #[tokio::test]
    async fn requests_wav_from_server() {
        let audio = wav_bytes(int16_mono(8000), |w| w.write_sample(1i16).unwrap());
        let expected = audio.clone();
        let app = Router::new().route(
            "/tts",
            post(move |Json(body): Json<serde_json::Value>| {
                let audio = audio.clone();
                async move {
                    assert_eq!(body["text"], "привет");
                    assert_eq!(body["speaker"], "baya");
                    assert_eq!(body["sample_rate"], 24000);
                    audio
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = SpeechConfig {
            url: format!("http://{addr}/tts"),
            ..SpeechConfig::default()
        };
        let wav = request_wav(&Client::new(), &config, "привет").await.unwrap();
        assert_eq!(wav, expected);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let app = Router::new().route("/tts", post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = SpeechConfig {
            url: format!("http://{addr}/tts"),
            ..SpeechConfig::default()
        };
        assert!(matches!(
            request_wav(&Client::new(), &config, "x").await,
            Err(SpeechError::Status(503))
        ));
    }
}
