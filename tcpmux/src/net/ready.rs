use super::ConnectionId;

/// Ready connections from the latest poll, with an iteration cursor.
///
/// The list is rebuilt wholesale by every poll. Removing an entry while
/// iterating shifts the cursor so that the entry after the removed one
/// is still the next one returned.
#[derive(Debug, Default)]
pub(crate) struct ReadyList {
    entries: Vec<ConnectionId>,
    cursor: usize,
}

impl ReadyList {
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub(crate) fn push(&mut self, id: ConnectionId) {
        self.entries.push(id);
    }

    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the entry under the cursor and moves past it.
    pub(crate) fn advance(&mut self) -> Option<ConnectionId> {
        let id = self.entries.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(id)
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) {
        if let Some(position) = self.entries.iter().position(|&entry| entry == id) {
            self.entries.remove(position);
            if position < self.cursor {
                self.cursor -= 1;
            }
        }
    }
}
