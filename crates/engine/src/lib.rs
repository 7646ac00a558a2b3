mod renderer;

pub use renderer::{DEFAULT_VOICE_CAPACITY, Renderer};

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use spaceloop_transport::{AudioArc, Bus, Command, FrameClock, PlaybackBackend, Status, VoiceKey};

const COMMAND_CAPACITY: usize = 1024;
const STATUS_CAPACITY: usize = 256;
/// Largest output buffer mixed in one pass, in samples.
const MIX_CAPACITY: usize = 8192;

/// Control-thread side of a running output stream.
pub struct AudioEngineHandle {
    commands: rtrb::Producer<Command>,
    status: rtrb::Consumer<Status>,
    collector: Collector,
    handle: Handle,
    clock: FrameClock,
    sample_rate: u32,
    _stream: cpal::Stream,
}

impl AudioEngineHandle {
    /// The clock the renderer advances. Every deadline is expressed on it.
    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    fn send(&mut self, command: Command) {
        if let Err(rtrb::PushError::Full(command)) = self.commands.push(command) {
            log::warn!("command ring full, dropped command for {:?}", command.voice());
        }
    }
}

impl PlaybackBackend for AudioEngineHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, voice: VoiceKey, at: f64, audio: &AudioArc) {
        let audio = Shared::new(&self.handle, audio.clone());
        self.send(Command::Schedule { voice, at, audio });
    }

    fn cancel(&mut self, voice: VoiceKey) {
        self.send(Command::Cancel { voice });
    }

    fn cancel_bus(&mut self, bus: Bus) {
        self.send(Command::CancelBus { bus });
    }

    fn set_bus_gain(&mut self, bus: Bus, gain: f32) {
        self.send(Command::SetBusGain { bus, gain });
    }

    fn set_bus_audible(&mut self, bus: Bus, audible: bool) {
        self.send(Command::SetBusAudible { bus, audible });
    }

    fn drain_status(&mut self) -> Vec<Status> {
        let mut drained = Vec::new();
        while let Ok(status) = self.status.pop() {
            drained.push(status);
        }
        drained
    }

    fn maintain(&mut self) {
        self.collector.collect();
    }
}

/// Open the default output device and start rendering.
pub fn start() -> anyhow::Result<AudioEngineHandle> {
    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(STATUS_CAPACITY);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0;
    let clock = FrameClock::new(sample_rate);
    let renderer = Renderer::new(sample_rate, config.channels(), clock.clone());

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config.into(), renderer, command_rx, status_tx)?
        }
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;
    log::info!("audio output running at {sample_rate} Hz");

    Ok(AudioEngineHandle {
        commands: command_tx,
        status: status_rx,
        collector,
        handle,
        clock,
        sample_rate,
        _stream: stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
    mut command_rx: rtrb::Consumer<Command>,
    mut status_tx: rtrb::Producer<Status>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels.max(1) as usize;
    let chunk = MIX_CAPACITY - MIX_CAPACITY % output_channels;
    let mut mix = vec![0.0f32; chunk];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut report = |status: Status| {
                let _ = status_tx.push(status);
            };

            while let Ok(command) = command_rx.pop() {
                renderer.apply(command, &mut report);
            }

            for out in data.chunks_mut(chunk) {
                let mixed = &mut mix[..out.len()];
                renderer.render(mixed, &mut report);
                for (sample, value) in out.iter_mut().zip(mixed.iter()) {
                    *sample = T::from_sample(*value);
                }
            }
        },
        |err| log::error!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
