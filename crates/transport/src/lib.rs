pub mod clock;
pub mod command;
pub mod ids;
pub mod sample;
pub mod synthesis;

use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

pub use clock::{AudioClock, FrameClock, ManualClock};
pub use command::{Command, PlaybackBackend, SharedAudio, Status};
pub use ids::{Bus, NoteId, TrackId, VoiceKey};
pub use sample::{DEFAULT_VECTOR, DefinitionError, NR_OF_VECTOR_VALUES, SampleDefinition};
pub use synthesis::{RequestId, SYNTH_SAMPLE_RATE, SynthResponse, SynthesisService};

/// Shared, immutable audio sample data.
///
/// `AudioArc` provides cheap cloning through reference counting while keeping
/// the sample data immutable and shareable. The sample data lives in an
/// `Arc<[f32]>`, so the structure itself stays small and every note of a
/// track can hold the same synthesized clip without copying it.
///
/// # Memory Layout
///
/// ```text
/// AudioArc (24 bytes on stack)
/// ├─ samples: Arc<[f32]> (16 bytes) ────> Heap: [f32; N]
/// ├─ sample_rate: u32 (4 bytes)
/// └─ channels: u16 (2 bytes)
/// ```
///
/// # Examples
///
/// ```
/// use spaceloop_transport::AudioArc;
///
/// let samples = vec![0.0, 0.5, 1.0, 0.5];
/// let audio = AudioArc::new(samples, 44100, 2);
///
/// // Clone is cheap - just bumps refcount
/// let audio2 = audio.clone();
/// assert_eq!(audio.frames(), 2);
/// assert_eq!(audio2.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    /// Raw interleaved samples stored in a reference-counted slice.
    samples: Arc<[f32]>,
    /// Sample rate in Hz (e.g., 16000, 48000)
    sample_rate: u32,
    /// Number of interleaved channels (e.g., 1 for mono, 2 for stereo)
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned, interleaved sample data.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// Create a mono `AudioArc`, the format the synthesis service delivers.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// A buffer of `frames` frames of silence.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Get a reference to the inner `Arc<[f32]>`, e.g. to check reference counts.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample of `frame` for output channel `channel`, folding extra output
    /// channels onto the available ones (mono feeds every output channel).
    #[inline]
    pub fn sample_for_output(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        self.samples
            .get(frame * channels + channel % channels)
            .copied()
            .unwrap_or(0.0)
    }

    /// Resample this audio to a target sample rate.
    ///
    /// If the audio is already at the target rate, returns a clone (cheap refcount bump).
    /// Otherwise, performs sinc interpolation resampling.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }

        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Resample an `AudioArc` to a target sample rate.
///
/// Synthesized clips arrive at [`SYNTH_SAMPLE_RATE`] and are brought to the
/// output device's rate once, on the control thread, before any deadline for
/// them is armed.
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.is_empty() {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();

    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let output_frames = (input_frames as f64 * resample_ratio).ceil() as usize;

    // rubato works on per-channel buffers
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame_idx in 0..input_frames {
        for (ch, input) in input_channels.iter_mut().enumerate() {
            input.push(audio.samples()[frame_idx * channels + ch]);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;

    let output_channels = resampler.process(&input_channels, None)?;

    let mut output_samples = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_channels[0].len() {
        for output in &output_channels {
            output_samples.push(output[frame_idx]);
        }
    }

    Ok(AudioArc::new(output_samples, target_sample_rate, audio.channels))
}
