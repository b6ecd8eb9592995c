//! Sample loading and decoding
//!
//! Decodes WAV files into the immutable i16 buffers the pad bank plays.
//! Decoding happens on a loader thread; the resulting `SampleBuffer` is
//! published to the audio callback through a `LoadPad` command, so the
//! callback never touches the file system.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use thiserror::Error;
use tracing::debug;

use sambox_core::domain::pads::SampleBuffer;

/// Errors that can occur while loading sample files.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file is missing channel information.
    #[error("audio file is missing channel information")]
    MissingChannels,

    /// File sample rate differs from the stream rate; there is no
    /// resampling stage.
    #[error("sample rate mismatch: file is {file_rate} Hz, stream is {stream_rate} Hz")]
    SampleRateMismatch { file_rate: u32, stream_rate: u32 },

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, stream has {stream_channels} channels (only mono↔stereo supported)"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels on the stream.
        stream_channels: usize,
    },
}

/// Decode an audio file into a pad sample buffer.
///
/// The file must already be at the stream's sample rate; mono↔stereo
/// layouts are mapped, anything else is rejected.
pub fn load_sample(
    path: &Path,
    stream_channels: u16,
    stream_rate_hz: u32,
) -> Result<SampleBuffer, SampleLoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SampleLoadError::NoDefaultTrack)?;
    let file_rate_hz = track
        .codec_params
        .sample_rate
        .ok_or(SampleLoadError::MissingSampleRate)?;
    let file_channels = track
        .codec_params
        .channels
        .ok_or(SampleLoadError::MissingChannels)?
        .count();

    if file_rate_hz != stream_rate_hz {
        return Err(SampleLoadError::SampleRateMismatch {
            file_rate: file_rate_hz,
            stream_rate: stream_rate_hz,
        });
    }

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    let mapped = map_channels(decoded, file_channels, stream_channels as usize)?;
    let samples: Vec<i16> = mapped.iter().map(|&s| f32_to_i16(s)).collect();

    debug!(
        path = %path.display(),
        frames = samples.len() / stream_channels as usize,
        "Sample decoded"
    );

    Ok(SampleBuffer {
        channels: stream_channels,
        samples: Arc::from(samples.into_boxed_slice()),
    })
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_767.0).clamp(-32_768.0, 32_767.0) as i16
}

/// Map interleaved samples from one channel layout to another.
///
/// - Mono → stereo duplicates each sample
/// - Stereo → mono averages each frame
/// - Matching layouts pass through
fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    stream_channels: usize,
) -> Result<Vec<f32>, SampleLoadError> {
    if file_channels == stream_channels {
        return Ok(samples);
    }

    match (file_channels, stream_channels) {
        (1, 2) => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                out.push(s);
                out.push(s);
            }
            Ok(out)
        }
        (2, 1) => {
            let mut out = Vec::with_capacity(samples.len() / 2);
            for frame in samples.chunks_exact(2) {
                out.push((frame[0] + frame[1]) * 0.5);
            }
            Ok(out)
        }
        _ => Err(SampleLoadError::UnsupportedChannels {
            file_channels,
            stream_channels,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    /// Write a PCM16 WAV file for testing.
    fn write_pcm16_wav(
        path: &Path,
        channels: u16,
        sample_rate_hz: u32,
        samples: &[i16],
    ) -> std::io::Result<()> {
        let bits_per_sample = 16u16;
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate_hz * u32::from(block_align);
        let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
        let chunk_size = 36 + data_len_bytes;

        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&chunk_size.to_le_bytes())?;
        file.write_all(b"WAVE")?;

        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?;
        file.write_all(&1u16.to_le_bytes())?; // PCM
        file.write_all(&channels.to_le_bytes())?;
        file.write_all(&sample_rate_hz.to_le_bytes())?;
        file.write_all(&byte_rate.to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&bits_per_sample.to_le_bytes())?;

        file.write_all(b"data")?;
        file.write_all(&data_len_bytes.to_le_bytes())?;
        for sample in samples {
            file.write_all(&sample.to_le_bytes())?;
        }

        Ok(())
    }

    #[test]
    fn test_decode_wav_to_pad_buffer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384, -16_384, 32_767];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let decoded = load_sample(&path, 1, 44_100).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), samples.len());
        // Round trip through the decoder's f32 stage stays within 1 LSB
        for (orig, got) in samples.iter().zip(decoded.samples.iter()) {
            assert!((orig - got).abs() <= 1, "{orig} vs {got}");
        }
    }

    #[test]
    fn test_decode_mono_to_stereo() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384, -16_384];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let decoded = load_sample(&path, 2, 44_100).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), samples.len() * 2);

        for frame in decoded.samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_decode_rejects_rate_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        write_pcm16_wav(&path, 1, 22_050, &[0i16; 16]).unwrap();

        let result = load_sample(&path, 1, 44_100);
        assert!(matches!(
            result,
            Err(SampleLoadError::SampleRateMismatch {
                file_rate: 22_050,
                stream_rate: 44_100,
            })
        ));
    }

    #[test]
    fn test_decode_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nonexistent.wav");

        let result = load_sample(&path, 1, 44_100);
        assert!(matches!(result, Err(SampleLoadError::Io(_))));
    }

    #[test]
    fn test_map_channels_stereo_to_mono() {
        let input = vec![0.5, 0.3, -0.2, 0.4];
        let output = map_channels(input, 2, 1).unwrap();
        assert_eq!(output.len(), 2);
        assert!((output[0] - 0.4).abs() < 1e-6);
        assert!((output[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_map_channels_unsupported() {
        let result = map_channels(vec![0.0; 8], 4, 2);
        assert!(matches!(
            result,
            Err(SampleLoadError::UnsupportedChannels { .. })
        ));
    }
}
