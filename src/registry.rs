//! The set of currently tracked objects.

use crate::motion::ObjectHandle;
use crate::palette::Color;
use crate::TrackedObject;

/// Bounded collection of live [`TrackedObject`]s, kept in insertion order.
///
/// The registry enforces the two structural invariants of the tracker: no
/// two objects share a colour, and the number of objects never exceeds the
/// colour pool capacity. Breaking either is a bug in the caller and panics.
#[derive(Debug, Clone)]
pub struct Registry {
    objects: Vec<TrackedObject>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            objects: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, object: TrackedObject) {
        assert!(
            self.objects.len() < self.capacity,
            "registry is full ({} objects)",
            self.capacity
        );
        assert!(
            !self.holds_color(&object.color),
            "colour {} is already held by another object",
            object.color
        );
        self.objects.push(object);
    }

    /// Remove the object with `id`, if present.
    pub fn remove(&mut self, id: u64) -> Option<TrackedObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(index))
    }

    /// Remove and return every object matching `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<TrackedObject>
    where
        F: FnMut(&TrackedObject) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.objects.drain(..).partition(|o| predicate(o));
        self.objects = kept;
        removed
    }

    /// Remove and return every object.
    pub fn clear(&mut self) -> Vec<TrackedObject> {
        std::mem::take(&mut self.objects)
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn find_by_handle(&self, handle: ObjectHandle) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.handle == Some(handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.iter_mut()
    }

    pub fn holds_color(&self, color: &Color) -> bool {
        self.objects.iter().any(|o| o.color == *color)
    }

    pub fn colors_in_use(&self) -> Vec<Color> {
        self.objects.iter().map(|o| o.color).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
