use spaceloop_transport::NoteId;

use crate::note::Note;

#[derive(Debug)]
struct Entry {
    note: Note,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// A track's notes as a doubly linked list sorted by position, stored in an
/// arena of slots.
///
/// Links are slot indices, so inserting or removing a note touches only its
/// two neighbours. Freed slots are reused with a bumped generation.
#[derive(Debug, Default)]
pub struct NoteTimeline {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl NoteTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<NoteId> {
        self.head.map(|index| self.id_at(index))
    }

    pub fn tail(&self) -> Option<NoteId> {
        self.tail.map(|index| self.id_at(index))
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.entry(id).is_some()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.entry(id).map(|e| &e.note)
    }

    pub fn get_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.entry_mut(id).map(|e| &mut e.note)
    }

    pub fn prev(&self, id: NoteId) -> Option<NoteId> {
        self.entry(id)?.prev.map(|index| self.id_at(index))
    }

    pub fn next(&self, id: NoteId) -> Option<NoteId> {
        self.entry(id)?.next.map(|index| self.id_at(index))
    }

    /// Nearest notes before and after `position`: the last note at or before
    /// it and the first note strictly after it.
    pub fn neighbors_at(&self, position: f64) -> (Option<NoteId>, Option<NoteId>) {
        self.neighbors_excluding(position, None)
    }

    /// Insert `note` at its sorted place.
    pub fn insert(&mut self, note: Note) -> NoteId {
        let (prev, next) = self.neighbors_at(note.position());
        self.insert_between(note, prev, next)
    }

    pub fn push_back(&mut self, note: Note) -> NoteId {
        let tail = self.tail();
        self.insert_between(note, tail, None)
    }

    /// Link `note` between two adjacent notes. `None` on either side means
    /// the list end.
    pub fn insert_between(&mut self, note: Note, prev: Option<NoteId>, next: Option<NoteId>) -> NoteId {
        let entry = Entry {
            note,
            prev: None,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        let prev = prev.filter(|id| self.contains(*id)).map(|id| id.index);
        let next = next.filter(|id| self.contains(*id)).map(|id| id.index);
        self.link(index, prev, next);
        self.len += 1;
        self.id_at(index)
    }

    /// Unlink and drop a note. The handle, and any copy of it, stops resolving.
    pub fn remove(&mut self, id: NoteId) -> Option<Note> {
        self.entry(id)?;
        self.unlink(id.index);
        let slot = &mut self.slots[id.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(entry.note)
    }

    /// Move a note to the sorted place for its current position, keeping its id.
    pub fn relink(&mut self, id: NoteId) {
        let Some(position) = self.get(id).map(Note::position) else {
            return;
        };
        let (prev, next) = self.neighbors_excluding(position, Some(id.index));
        self.unlink(id.index);
        self.link(id.index, prev.map(|p| p.index), next.map(|n| n.index));
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            timeline: self,
            cursor: self.head,
        }
    }

    /// Snapshot of all ids in list order.
    pub fn ids(&self) -> Vec<NoteId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn clear(&mut self) {
        for id in self.ids() {
            self.remove(id);
        }
    }

    fn neighbors_excluding(&self, position: f64, skip: Option<u32>) -> (Option<NoteId>, Option<NoteId>) {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let Some(entry) = self.slots[index as usize].entry.as_ref() else {
                break;
            };
            if Some(index) != skip {
                if entry.note.position() > position {
                    return (prev, Some(self.id_at(index)));
                }
                prev = Some(self.id_at(index));
            }
            cursor = entry.next;
        }
        (prev, None)
    }

    fn link(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        if let Some(entry) = self.slots[index as usize].entry.as_mut() {
            entry.prev = prev;
            entry.next = next;
        }
        match prev.and_then(|p| self.slots[p as usize].entry.as_mut()) {
            Some(prev_entry) => prev_entry.next = Some(index),
            None => self.head = Some(index),
        }
        match next.and_then(|n| self.slots[n as usize].entry.as_mut()) {
            Some(next_entry) => next_entry.prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: u32) {
        let Some((prev, next)) = self.slots[index as usize]
            .entry
            .as_ref()
            .map(|e| (e.prev, e.next))
        else {
            return;
        };
        match prev.and_then(|p| self.slots[p as usize].entry.as_mut()) {
            Some(prev_entry) => prev_entry.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.slots[n as usize].entry.as_mut()) {
            Some(next_entry) => next_entry.prev = prev,
            None => self.tail = prev,
        }
        if let Some(entry) = self.slots[index as usize].entry.as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn id_at(&self, index: u32) -> NoteId {
        NoteId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn entry(&self, id: NoteId) -> Option<&Entry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NoteId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }
}

pub struct Iter<'a> {
    timeline: &'a NoteTimeline,
    cursor: Option<u32>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (NoteId, &'a Note);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let entry = self.timeline.slots[index as usize].entry.as_ref()?;
        self.cursor = entry.next;
        Some((self.timeline.id_at(index), &entry.note))
    }
}
