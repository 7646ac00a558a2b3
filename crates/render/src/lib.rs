use std::path::Path;

use spaceloop_project::{LoopExportData, TrackExportData};
use spaceloop_transport::AudioArc;

fn sounds(track: &TrackExportData) -> bool {
    track.is_solo || (!track.another_is_solo && !track.is_muted)
}

/// Mix one iteration of an exported loop to mono at `sample_rate`.
///
/// `clips[i]` is the audio of `data.tracks[i]`; a track without a clip stays
/// silent. Notes are placed from their normalized position, using the
/// document's own tempo, and tails are cut at the loop end.
pub fn bounce_loop(data: &LoopExportData, clips: &[Option<AudioArc>], sample_rate: u32) -> AudioArc {
    let duration = data.duration_secs();
    let total_frames = (duration * sample_rate as f64).round() as usize;
    let mut samples = vec![0.0f32; total_frames];

    for (track, clip) in data.tracks.iter().zip(clips) {
        let Some(clip) = clip else {
            continue;
        };
        if !sounds(track) {
            continue;
        }

        // Resample if needed
        let clip = match clip.resample(sample_rate) {
            Ok(clip) => clip,
            Err(e) => {
                log::warn!("skipping track '{}': {e}", track.track_name);
                continue;
            }
        };

        for note in track.notes.iter().filter(|n| !n.silent) {
            let start = (note.pos_on_track_axis * duration * sample_rate as f64).round() as usize;
            if start >= total_frames {
                continue;
            }
            let len = clip.frames().min(total_frames - start);
            for (i, out) in samples[start..start + len].iter_mut().enumerate() {
                *out += clip.sample_for_output(i, 0) * track.track_volume;
            }
        }
    }

    AudioArc::mono(samples, sample_rate)
}

pub fn write_wav(audio: &AudioArc, path: &Path) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels(),
        sample_rate: audio.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;

    for &sample in audio.samples() {
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}
