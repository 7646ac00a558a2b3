use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use spaceloop_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Where a manifest's song file lives: as given, or under `songs_root`.
pub fn resolve_song_path(path: &Path, songs_root: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }

    let with_root = songs_root.join(path);
    if with_root.exists() {
        return Some(with_root);
    }

    None
}

pub fn decode_song(path: &Path, songs_root: &Path) -> anyhow::Result<AudioArc> {
    let resolved = resolve_song_path(path, songs_root).ok_or_else(|| {
        anyhow::anyhow!(
            "song file {} not found (also looked under {})",
            path.display(),
            songs_root.display()
        )
    })?;
    decode_file(&resolved)
}

/// Decode the first audio track of `path` to interleaved `f32`.
///
/// Packets the codec rejects are skipped with a warning; a song with a few
/// corrupt frames still plays.
pub fn decode_file(path: &Path) -> anyhow::Result<AudioArc> {
    let file = File::open(path).with_context(|| format!("opening song {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mut reader = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognised audio format in {}", path.display()))?
        .format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("{} holds no audio track", path.display()))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map_or(2, |c| c.count()).max(1) as u16;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("no decoder for {}", path.display()))?;

    let mut pcm = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;
    let mut skipped = 0usize;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("decoding {}", path.display())),
        };
        let spec = *decoded.spec();
        let frames = decoded.capacity() as u64;
        let needed = decoded.capacity() * spec.channels.count();
        if buffer.as_ref().is_none_or(|b| b.capacity() < needed) {
            buffer = Some(SampleBuffer::new(frames, spec));
        }
        if let Some(buffer) = buffer.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            pcm.extend_from_slice(buffer.samples());
        }
    }

    if skipped > 0 {
        log::warn!("{}: skipped {skipped} undecodable packets", path.display());
    }
    // a truncated last packet can leave a partial frame behind
    pcm.truncate(pcm.len() - pcm.len() % channels as usize);
    log::debug!(
        "decoded {} ({} Hz, {} ch, {} frames)",
        path.display(),
        sample_rate,
        channels,
        pcm.len() / channels as usize
    );
    Ok(AudioArc::new(pcm, sample_rate, channels))
}
