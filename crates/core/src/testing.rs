//! Stand-ins for the audio engine and the synthesis service.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use spaceloop_transport::{
    AudioArc, Bus, PlaybackBackend, RequestId, Status, SynthResponse, SynthesisService, VoiceKey,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Schedule { voice: VoiceKey, at: f64, frames: usize },
    Cancel(VoiceKey),
    CancelBus(Bus),
    Gain(Bus, f32),
    Audible(Bus, bool),
}

#[derive(Debug)]
pub struct RecordingBackend {
    pub sample_rate: u32,
    pub log: Vec<Recorded>,
    pub status: Vec<Status>,
    pub maintained: usize,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            log: Vec::new(),
            status: Vec::new(),
            maintained: 0,
        }
    }
}

impl RecordingBackend {
    /// Deadlines armed for `voice`, in order.
    pub fn scheduled(&self, voice: VoiceKey) -> Vec<f64> {
        self.log
            .iter()
            .filter_map(|r| match r {
                Recorded::Schedule { voice: v, at, .. } if *v == voice => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn all_scheduled(&self) -> Vec<(VoiceKey, f64)> {
        self.log
            .iter()
            .filter_map(|r| match r {
                Recorded::Schedule { voice, at, .. } => Some((*voice, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn last_audible(&self, bus: Bus) -> Option<bool> {
        self.log.iter().rev().find_map(|r| match r {
            Recorded::Audible(b, audible) if *b == bus => Some(*audible),
            _ => None,
        })
    }

    pub fn last_gain(&self, bus: Bus) -> Option<f32> {
        self.log.iter().rev().find_map(|r| match r {
            Recorded::Gain(b, gain) if *b == bus => Some(*gain),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

impl PlaybackBackend for RecordingBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, voice: VoiceKey, at: f64, audio: &AudioArc) {
        self.log.push(Recorded::Schedule {
            voice,
            at,
            frames: audio.frames(),
        });
    }

    fn cancel(&mut self, voice: VoiceKey) {
        self.log.push(Recorded::Cancel(voice));
    }

    fn cancel_bus(&mut self, bus: Bus) {
        self.log.push(Recorded::CancelBus(bus));
    }

    fn set_bus_gain(&mut self, bus: Bus, gain: f32) {
        self.log.push(Recorded::Gain(bus, gain));
    }

    fn set_bus_audible(&mut self, bus: Bus, audible: bool) {
        self.log.push(Recorded::Audible(bus, audible));
    }

    fn drain_status(&mut self) -> Vec<Status> {
        std::mem::take(&mut self.status)
    }

    fn maintain(&mut self) {
        self.maintained += 1;
    }
}

/// Records requests and hands out queued responses on poll.
#[derive(Debug)]
pub struct ScriptedSynth {
    pub alive: bool,
    pub requests: Vec<Vec<f32>>,
    pub issued: Vec<RequestId>,
    pub responses: VecDeque<SynthResponse>,
    answered: Vec<RequestId>,
    next_id: u64,
}

impl Default for ScriptedSynth {
    fn default() -> Self {
        Self {
            alive: true,
            requests: Vec::new(),
            issued: Vec::new(),
            responses: VecDeque::new(),
            answered: Vec::new(),
            next_id: 0,
        }
    }
}

impl ScriptedSynth {
    /// Hand out ids from `first` on.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: first,
            ..Self::default()
        }
    }

    /// Queue a response of `frames` samples for every request not yet answered.
    pub fn answer_all(&mut self, frames: usize) {
        for id in self.issued.clone() {
            if !self.answered.contains(&id) {
                self.answered.push(id);
                self.responses.push_back(SynthResponse {
                    id,
                    samples: vec![0.25; frames],
                });
            }
        }
    }
}

impl SynthesisService for ScriptedSynth {
    fn request(&mut self, values: &[f32]) -> Option<RequestId> {
        if !self.alive {
            return None;
        }
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.push(values.to_vec());
        self.issued.push(id);
        Some(id)
    }

    fn poll(&mut self) -> Vec<SynthResponse> {
        self.responses.drain(..).collect()
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Lets a test hand a backend to a session and still read its log.
#[derive(Debug, Clone, Default)]
pub struct SharedBackend(pub Rc<RefCell<RecordingBackend>>);

impl PlaybackBackend for SharedBackend {
    fn sample_rate(&self) -> u32 {
        self.0.borrow().sample_rate
    }

    fn schedule(&mut self, voice: VoiceKey, at: f64, audio: &AudioArc) {
        self.0.borrow_mut().schedule(voice, at, audio);
    }

    fn cancel(&mut self, voice: VoiceKey) {
        self.0.borrow_mut().cancel(voice);
    }

    fn cancel_bus(&mut self, bus: Bus) {
        self.0.borrow_mut().cancel_bus(bus);
    }

    fn set_bus_gain(&mut self, bus: Bus, gain: f32) {
        self.0.borrow_mut().set_bus_gain(bus, gain);
    }

    fn set_bus_audible(&mut self, bus: Bus, audible: bool) {
        self.0.borrow_mut().set_bus_audible(bus, audible);
    }

    fn drain_status(&mut self) -> Vec<Status> {
        self.0.borrow_mut().drain_status()
    }

    fn maintain(&mut self) {
        self.0.borrow_mut().maintain();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedSynth(pub Rc<RefCell<ScriptedSynth>>);

impl SynthesisService for SharedSynth {
    fn request(&mut self, values: &[f32]) -> Option<RequestId> {
        self.0.borrow_mut().request(values)
    }

    fn poll(&mut self) -> Vec<SynthResponse> {
        self.0.borrow_mut().poll()
    }

    fn is_alive(&self) -> bool {
        self.0.borrow().alive
    }
}
