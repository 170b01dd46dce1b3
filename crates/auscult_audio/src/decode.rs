//! Audio decoders and the ordered fallback chain.
//!
//! Decoders are tried in order: Symphonia (any probed container), hound
//! (WAV only) and finally an `ffmpeg` subprocess. The first success wins.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AudioError, DecodeAttempt, Result};

/// Decoded audio, one vector per channel.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Planar samples in `[-1.0, 1.0]`.
    pub channels: Vec<Vec<f32>>,
    /// Native sample rate in Hz.
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Build from interleaved samples.
    pub fn from_interleaved(samples: &[f32], n_channels: usize, sample_rate: u32) -> Self {
        let n_channels = n_channels.max(1);
        let frames = samples.len() / n_channels;
        let mut channels = vec![Vec::with_capacity(frames); n_channels];
        for frame in samples.chunks_exact(n_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of complete frames: the shortest channel's length.
    pub fn n_frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Mix down to mono by averaging channels.
    ///
    /// Ragged channels are cut to the shortest one.
    pub fn into_mono(self) -> Vec<f32> {
        let n = self.channels.len();
        if n == 1 {
            return self.channels.into_iter().next().unwrap_or_default();
        }
        let frames = self.n_frames();
        (0..frames)
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
            .collect()
    }
}

/// A single decoding strategy.
pub trait AudioDecoder: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Decode the whole file.
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;
}

/// Container-probing decoder backed by Symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    fn fail(message: impl ToString) -> AudioError {
        AudioError::Decoder {
            decoder: "symphonia",
            message: message.to_string(),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let file = File::open(path).map_err(Self::fail)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(Self::fail)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Self::fail("no audio track"))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Self::fail("track missing sample rate"))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(Self::fail)?;

        let mut interleaved = Vec::new();
        let mut n_channels = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(err) => return Err(Self::fail(err)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packet: skip it and keep going.
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
                    continue;
                }
                Err(err) => return Err(Self::fail(err)),
            };

            let spec = *decoded.spec();
            n_channels = spec.channels.count();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buffer.samples());
        }

        if interleaved.is_empty() || n_channels == 0 {
            return Err(Self::fail("file produced no samples"));
        }

        Ok(DecodedAudio::from_interleaved(
            &interleaved,
            n_channels,
            sample_rate,
        ))
    }
}

/// WAV reader backed by hound.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoundDecoder;

impl AudioDecoder for HoundDecoder {
    fn name(&self) -> &'static str {
        "hound"
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let fail = |e: hound::Error| AudioError::Decoder {
            decoder: "hound",
            message: e.to_string(),
        };

        let mut reader = WavReader::open(path).map_err(fail)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(fail)?,
            (SampleFormat::Int, 8) => reader
                .samples::<i8>()
                .map(|s| s.map(|s| f32::from(s) / 128.0))
                .collect::<std::result::Result<_, _>>()
                .map_err(fail)?,
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|s| f32::from(s) / 32_768.0))
                .collect::<std::result::Result<_, _>>()
                .map_err(fail)?,
            (SampleFormat::Int, bits) => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(fail)?
            }
        };

        if samples.is_empty() {
            return Err(AudioError::Decoder {
                decoder: "hound",
                message: "file produced no samples".to_string(),
            });
        }

        Ok(DecodedAudio::from_interleaved(
            &samples,
            usize::from(spec.channels),
            spec.sample_rate,
        ))
    }
}

/// Last-resort decoder that shells out to `ffmpeg`.
///
/// Output is requested as mono `f32le` at `sample_rate`, so no further
/// mixing or resampling is needed.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: String,
    sample_rate: u32,
}

impl FfmpegDecoder {
    /// Decoder invoking `ffmpeg` from `PATH`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            sample_rate,
        }
    }

    /// Use a specific ffmpeg executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let fail = |message: String| AudioError::Decoder {
            decoder: "ffmpeg",
            message,
        };

        let output = Command::new(&self.program)
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .args(["-f", "f32le", "-acodec", "pcm_f32le", "-ac", "1", "-ar"])
            .arg(self.sample_rate.to_string())
            .arg("pipe:1")
            .output()
            .map_err(|e| fail(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if samples.is_empty() {
            return Err(fail("file produced no samples".to_string()));
        }

        Ok(DecodedAudio {
            channels: vec![samples],
            sample_rate: self.sample_rate,
        })
    }
}

/// Ordered list of decoders; the first success wins.
pub struct DecoderChain {
    decoders: Vec<Box<dyn AudioDecoder>>,
}

impl DecoderChain {
    /// Create a chain from explicit decoders.
    pub fn new(decoders: Vec<Box<dyn AudioDecoder>>) -> Self {
        Self { decoders }
    }

    /// Symphonia, then hound, then ffmpeg producing `sample_rate` output.
    pub fn standard(sample_rate: u32) -> Self {
        Self::new(vec![
            Box::new(SymphoniaDecoder),
            Box::new(HoundDecoder),
            Box::new(FfmpegDecoder::new(sample_rate)),
        ])
    }

    /// Names of the decoders in try order.
    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Try each decoder in order.
    ///
    /// # Errors
    ///
    /// [`AudioError::DecodeFailed`] carrying every attempt, only when all fail.
    pub fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let mut attempts = Vec::with_capacity(self.decoders.len());

        for decoder in &self.decoders {
            match decoder.decode(path) {
                Ok(audio) => {
                    tracing::debug!(
                        "Decoded {} with {}: {} channel(s), {} frames at {} Hz",
                        path.display(),
                        decoder.name(),
                        audio.n_channels(),
                        audio.n_frames(),
                        audio.sample_rate
                    );
                    return Ok(audio);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} failed on {}, trying next decoder: {}",
                        decoder.name(),
                        path.display(),
                        err
                    );
                    attempts.push(DecodeAttempt {
                        decoder: decoder.name(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Err(AudioError::DecodeFailed {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

impl std::fmt::Debug for DecoderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderChain")
            .field("decoders", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    struct Failing(&'static str);

    impl AudioDecoder for Failing {
        fn name(&self) -> &'static str {
            self.0
        }

        fn decode(&self, _path: &Path) -> Result<DecodedAudio> {
            Err(AudioError::Decoder {
                decoder: self.0,
                message: "unsupported".to_string(),
            })
        }
    }

    struct Fixed;

    impl AudioDecoder for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn decode(&self, _path: &Path) -> Result<DecodedAudio> {
            Ok(DecodedAudio {
                channels: vec![vec![0.5; 10]],
                sample_rate: 8000,
            })
        }
    }

    fn write_stereo_wav(path: &Path) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(-16_384i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_from_interleaved_and_mono() {
        let audio = DecodedAudio::from_interleaved(&[1.0, 3.0, 2.0, 4.0], 2, 44_100);
        assert_eq!(audio.n_channels(), 2);
        assert_eq!(audio.n_frames(), 2);
        assert_eq!(audio.into_mono(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_ragged_channels_mix_to_shortest() {
        let audio = DecodedAudio {
            channels: vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0]],
            sample_rate: 16_000,
        };
        assert_eq!(audio.n_frames(), 2);
        assert_eq!(audio.into_mono(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_chain_falls_through_to_first_success() {
        let chain = DecoderChain::new(vec![
            Box::new(Failing("first")),
            Box::new(Fixed),
            Box::new(Failing("never")),
        ]);
        let audio = chain.decode(Path::new("ignored.wav")).unwrap();
        assert_eq!(audio.sample_rate, 8000);
    }

    #[test]
    fn test_chain_reports_all_attempts() {
        let chain = DecoderChain::new(vec![
            Box::new(Failing("a")),
            Box::new(Failing("b")),
            Box::new(Failing("c")),
        ]);
        match chain.decode(Path::new("x.wav")) {
            Err(AudioError::DecodeFailed { attempts, .. }) => {
                let names: Vec<_> = attempts.iter().map(|a| a.decoder).collect();
                assert_eq!(names, vec!["a", "b", "c"]);
            }
            other => panic!("expected DecodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_hound_decodes_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path);

        let audio = HoundDecoder.decode(&path).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.n_channels(), 2);
        assert_eq!(audio.n_frames(), 100);
        assert!((audio.channels[0][0] - 0.5).abs() < 1e-4);
        assert!((audio.channels[1][0] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_symphonia_decodes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path);

        let audio = SymphoniaDecoder.decode(&path).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.n_channels(), 2);
        assert_eq!(audio.n_frames(), 100);
    }

    #[test]
    fn test_garbage_file_fails_in_native_decoders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(SymphoniaDecoder.decode(&path).is_err());
        assert!(HoundDecoder.decode(&path).is_err());
    }
}
