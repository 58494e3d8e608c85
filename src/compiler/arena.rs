use core::hash::Hash;
use core::marker::PhantomData;

/// Typed index into an `Arena`. Ids are plain `u32` indices and travel
/// into the emitted instruction stream, so they serialize without
/// dragging the pointed-at type along.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct Id<T> {
    index: u32,
    _phantom: PhantomData<T>,
}
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Id<T> {}
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index.eq(&other.index)
    }
}
impl<T> Eq for Id<T> {}
impl<T> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, h: &mut H) {
        self.index.hash(h);
    }
}

/// Append-only storage with a hard capacity ceiling; slots are never
/// reclaimed, so an `Id` stays valid for the arena's whole life.
pub struct Arena<T> {
    store: Vec<T>,
    limit: usize,
}

impl<T> Arena<T> {
    pub fn with_limit(limit: usize) -> Self {
        debug_assert!(limit <= u32::MAX as usize);
        Self { store: Vec::new(), limit }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Allocates a slot and hands the new id to the initializer, or
    /// `None` when the arena is full.
    pub fn try_alloc(&mut self, f: impl FnOnce(Id<T>) -> T) -> Option<Id<T>> {
        if self.store.len() >= self.limit {
            return None;
        }
        let id = Id { index: self.store.len() as u32, _phantom: PhantomData };
        self.store.push(f(id));
        Some(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.store.iter()
    }
}

impl<T> core::ops::Index<Id<T>> for Arena<T> {
    type Output = T;
    fn index(&self, id: Id<T>) -> &Self::Output {
        self.store.index(id.index as usize)
    }
}
impl<T> core::ops::IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        self.store.index_mut(id.index as usize)
    }
}
