//! Decoding sound content into memory.
//!
//! Files and byte buffers go through symphonia and come out as interleaved
//! `f32`, conformed to the engine's channel count and sample rate. Raw PCM
//! is converted sample by sample with `dasp_sample` and keeps its own rate.

use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

use dasp_sample::Sample;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{SoundError, SoundResult};

/// Sample encoding of raw PCM bytes. Multi-byte formats are little endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    #[default]
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }
}

/// Format of the content a sound plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DataFormat {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

/// Fully decoded interleaved audio.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PcmData {
    pub samples: Vec<f32>,
    pub channels: u32,
    pub sample_rate: u32,
}

impl PcmData {
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            0
        } else {
            (self.samples.len() / self.channels as usize) as u64
        }
    }
}

/// Decode a file and conform it to `channels` / `sample_rate`.
pub fn decode_file(path: impl AsRef<Path>, channels: u32, sample_rate: u32) -> SoundResult<PcmData> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let pcm = decode_source(Box::new(file), hint)?;
    Ok(conform(pcm, channels, sample_rate))
}

/// Decode an in-memory encoded stream and conform it to `channels` / `sample_rate`.
pub fn decode_memory(bytes: &[u8], channels: u32, sample_rate: u32) -> SoundResult<PcmData> {
    let pcm = decode_source(Box::new(Cursor::new(bytes.to_vec())), Hint::new())?;
    Ok(conform(pcm, channels, sample_rate))
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> SoundResult<PcmData> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SoundError::UnsupportedFormat("no decodable track".into()))?;
    let track_id = track.id;
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count() as u32);
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u32;
        sample_rate = spec.rate;

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if channels == 0 || sample_rate == 0 {
        return Err(SoundError::UnsupportedFormat(
            "stream has no channel layout or sample rate".into(),
        ));
    }

    Ok(PcmData {
        samples,
        channels,
        sample_rate,
    })
}

/// Convert raw little-endian PCM bytes to `f32`.
pub fn pcm_to_f32(
    bytes: &[u8],
    format: SampleFormat,
    channels: u32,
    sample_rate: u32,
) -> SoundResult<PcmData> {
    if channels == 0 || sample_rate == 0 {
        return Err(SoundError::invalid_argument(
            "channel count and sample rate must be non-zero",
        ));
    }
    let frame_bytes = format.bytes_per_sample() * channels as usize;
    if bytes.is_empty() || bytes.len() % frame_bytes != 0 {
        return Err(SoundError::invalid_argument(format!(
            "{} bytes is not a whole number of {frame_bytes}-byte frames",
            bytes.len()
        )));
    }

    let chunks = bytes.chunks_exact(format.bytes_per_sample());
    let samples: Vec<f32> = match format {
        SampleFormat::U8 => chunks.map(|b| b[0].to_sample::<f32>()).collect(),
        SampleFormat::S16 => chunks
            .map(|b| i16::from_le_bytes([b[0], b[1]]).to_sample::<f32>())
            .collect(),
        // Widen to the top of an i32 so the sign comes along.
        SampleFormat::S24 => chunks
            .map(|b| i32::from_le_bytes([0, b[0], b[1], b[2]]).to_sample::<f32>())
            .collect(),
        SampleFormat::S32 => chunks
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]).to_sample::<f32>())
            .collect(),
        SampleFormat::F32 => chunks
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };

    Ok(PcmData {
        samples,
        channels,
        sample_rate,
    })
}

/// Remix to `channels` and linearly resample to `sample_rate`.
pub fn conform(pcm: PcmData, channels: u32, sample_rate: u32) -> PcmData {
    let pcm = remix(pcm, channels);
    resample(pcm, sample_rate)
}

fn remix(pcm: PcmData, channels: u32) -> PcmData {
    if pcm.channels == channels || channels == 0 {
        return pcm;
    }
    let src = pcm.channels as usize;
    let dst = channels as usize;

    let mut samples = Vec::with_capacity(pcm.frames() as usize * dst);
    for frame in pcm.samples.chunks_exact(src) {
        if dst == 1 {
            samples.push(frame.iter().sum::<f32>() / src as f32);
        } else {
            samples.extend((0..dst).map(|ch| frame[ch.min(src - 1)]));
        }
    }

    PcmData {
        samples,
        channels,
        sample_rate: pcm.sample_rate,
    }
}

fn resample(pcm: PcmData, sample_rate: u32) -> PcmData {
    if pcm.sample_rate == sample_rate || sample_rate == 0 || pcm.frames() == 0 {
        return pcm;
    }
    let channels = pcm.channels as usize;
    let in_frames = pcm.frames() as usize;
    let out_frames = (in_frames as u64 * sample_rate as u64 / pcm.sample_rate as u64) as usize;
    let step = pcm.sample_rate as f64 / sample_rate as f64;

    let mut samples = Vec::with_capacity(out_frames * channels);
    for j in 0..out_frames {
        let pos = j as f64 * step;
        let i0 = (pos as usize).min(in_frames - 1);
        let i1 = (i0 + 1).min(in_frames - 1);
        let frac = (pos - i0 as f64) as f32;
        for ch in 0..channels {
            let a = pcm.samples[i0 * channels + ch];
            let b = pcm.samples[i1 * channels + ch];
            samples.push(a + (b - a) * frac);
        }
    }

    PcmData {
        samples,
        channels: pcm.channels,
        sample_rate,
    }
}
