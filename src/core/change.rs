//! Typed change batches published by the stores.

/// What a mutation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Replace,
    Remove,
}

/// One affected id with its value before and after the mutation.
///
/// `previous` is `None` for additions; `current` is `None` when a removal shrank the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<T> {
    pub id: u32,
    pub previous: Option<T>,
    pub current: Option<T>,
}

/// All entries touched by one store call.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeBatch<T> {
    pub kind: ChangeKind,
    pub changes: Vec<Change<T>>,
}

impl<T> ChangeBatch<T> {
    pub fn new(kind: ChangeKind) -> Self {
        Self { kind, changes: Vec::new() }
    }

    pub(crate) fn push(&mut self, id: u32, previous: Option<T>, current: Option<T>) {
        self.changes.push(Change { id, previous, current });
    }

    /// Ids in the order they were touched.
    pub fn ids(&self) -> Vec<u32> {
        self.changes.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Receiver of change batches; called synchronously on the mutating thread.
pub trait ChangeSink<T>: Send {
    fn changed(&self, batch: &ChangeBatch<T>);
}

impl<T: Clone + Send> ChangeSink<T> for std::sync::mpsc::Sender<ChangeBatch<T>> {
    fn changed(&self, batch: &ChangeBatch<T>) {
        let _ = self.send(batch.clone());
    }
}
