use std::collections::{BTreeSet, VecDeque};

use spaceloop_transport::{AudioArc, DefinitionError, RequestId, SampleDefinition, SynthesisService};

/// Edits remembered per direction; older entries fall off.
pub const HISTORY_CAPACITY: usize = 50;

/// A sample definition paired with the audio synthesized for it, plus a
/// bounded undo/redo history of definition edits.
///
/// Synthesis is asynchronous. Until a response arrives the previous clip stays
/// in place, so notes keep sounding with the old audio.
#[derive(Debug)]
pub struct Sample {
    definition: SampleDefinition,
    clip: Option<AudioArc>,
    undo: VecDeque<SampleDefinition>,
    redo: VecDeque<SampleDefinition>,
    pending: BTreeSet<RequestId>,
    last_applied: Option<RequestId>,
}

impl Sample {
    pub fn new(definition: SampleDefinition) -> Self {
        Self {
            definition,
            clip: None,
            undo: VecDeque::with_capacity(HISTORY_CAPACITY),
            redo: VecDeque::with_capacity(HISTORY_CAPACITY),
            pending: BTreeSet::new(),
            last_applied: None,
        }
    }

    pub fn definition(&self) -> &SampleDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn value(&self, index: usize) -> Option<f32> {
        self.definition.vector_values().get(index).copied()
    }

    pub fn clip(&self) -> Option<&AudioArc> {
        self.clip.as_ref()
    }

    pub fn clip_duration(&self) -> f64 {
        self.clip.as_ref().map_or(0.0, AudioArc::duration_secs)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn update_value(
        &mut self,
        index: usize,
        value: f32,
        synth: &mut dyn SynthesisService,
    ) -> Result<(), DefinitionError> {
        let mut edited = self.definition.clone();
        edited.update_value(index, value).inspect_err(|e| {
            log::warn!("ignoring edit of sample '{}': {e}", self.definition.name);
        })?;
        self.commit_edit(edited, synth);
        Ok(())
    }

    pub fn update_values(
        &mut self,
        values: &[f32],
        synth: &mut dyn SynthesisService,
    ) -> Result<(), DefinitionError> {
        let mut edited = self.definition.clone();
        edited.update_values(values).inspect_err(|e| {
            log::warn!("ignoring edit of sample '{}': {e}", self.definition.name);
        })?;
        self.commit_edit(edited, synth);
        Ok(())
    }

    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self, synth: &mut dyn SynthesisService) -> bool {
        let Some(previous) = self.undo.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.definition, previous);
        push_bounded(&mut self.redo, current);
        self.request_clip(synth);
        true
    }

    /// Returns false when there is nothing to redo.
    pub fn redo(&mut self, synth: &mut dyn SynthesisService) -> bool {
        let Some(undone) = self.redo.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.definition, undone);
        push_bounded(&mut self.undo, current);
        self.request_clip(synth);
        true
    }

    /// Replace the definition outright, without touching history.
    pub fn set_definition(&mut self, definition: SampleDefinition, synth: &mut dyn SynthesisService) {
        self.definition = definition;
        self.request_clip(synth);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.definition.name = name.into();
    }

    pub fn request_clip(&mut self, synth: &mut dyn SynthesisService) {
        if let Some(id) = synth.request(self.definition.vector_values()) {
            self.pending.insert(id);
        }
    }

    pub fn awaits(&self, id: RequestId) -> bool {
        self.pending.contains(&id)
    }

    /// Install audio synthesized for request `id`. Responses this sample never
    /// asked for, or that were overtaken by a newer applied one, are ignored.
    /// Returns whether the clip changed.
    pub fn apply_clip(&mut self, id: RequestId, clip: AudioArc) -> bool {
        if !self.pending.contains(&id) {
            return false;
        }
        // everything issued before `id` is now stale
        self.pending = self.pending.split_off(&id);
        self.pending.remove(&id);

        if self.last_applied.is_some_and(|last| last > id) {
            return false;
        }
        self.last_applied = Some(id);
        self.clip = Some(clip);
        true
    }

    fn commit_edit(&mut self, edited: SampleDefinition, synth: &mut dyn SynthesisService) {
        let previous = std::mem::replace(&mut self.definition, edited);
        push_bounded(&mut self.undo, previous);
        self.redo.clear();
        self.request_clip(synth);
    }
}

fn push_bounded(history: &mut VecDeque<SampleDefinition>, definition: SampleDefinition) {
    if history.len() == HISTORY_CAPACITY {
        history.pop_back();
    }
    history.push_front(definition);
}
