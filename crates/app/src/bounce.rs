use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use spaceloop_project::{LoopExportData, load_loop};
use spaceloop_render::{bounce_loop, write_wav};
use spaceloop_transport::{AudioArc, SYNTH_SAMPLE_RATE, SynthesisService};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Ask for every track's clip and wait until all arrived or `timeout` passed.
/// Tracks whose clip never came back stay `None`.
pub fn request_clips(
    data: &LoopExportData,
    synth: &mut dyn SynthesisService,
    timeout: Duration,
) -> Vec<Option<AudioArc>> {
    let requests: Vec<_> = data
        .tracks
        .iter()
        .map(|track| synth.request(track.sample_definition.vector_values()))
        .collect();
    let mut clips = vec![None; requests.len()];
    let mut missing = requests.iter().flatten().count();

    let deadline = Instant::now() + timeout;
    while missing > 0 && Instant::now() < deadline {
        for response in synth.poll() {
            let Some(index) = requests.iter().position(|id| *id == Some(response.id)) else {
                continue;
            };
            if clips[index].is_none() {
                missing -= 1;
            }
            clips[index] = Some(AudioArc::mono(response.samples, SYNTH_SAMPLE_RATE));
        }
        if missing > 0 {
            thread::sleep(POLL_INTERVAL);
        }
    }

    for (track, clip) in data.tracks.iter().zip(&clips) {
        if clip.is_none() {
            log::warn!("no audio for track '{}', bouncing it silent", track.track_name);
        }
    }
    clips
}

pub fn bounce_file(
    input: &Path,
    output: &Path,
    sample_rate: u32,
    synth: &mut dyn SynthesisService,
    timeout: Duration,
) -> anyhow::Result<()> {
    let data = load_loop(input).with_context(|| format!("loading {}", input.display()))?;
    let clips = request_clips(&data, synth, timeout);
    let audio = bounce_loop(&data, &clips, sample_rate);
    write_wav(&audio, output).with_context(|| format!("writing {}", output.display()))?;
    log::info!(
        "bounced '{}' ({:.2}s) to {}",
        data.loop_name,
        audio.duration_secs(),
        output.display()
    );
    Ok(())
}
