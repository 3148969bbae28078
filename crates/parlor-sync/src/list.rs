use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use parlor_types::Message;

type Items = Arc<RwLock<Vec<Arc<Message>>>>;

/// Append-only message list whose contents can be handed out without copying.
///
/// Only the owner appends. A [`ListSnapshot`] remembers the length at the time
/// it was taken and only ever reads that prefix, so later appends never change
/// what it shows. `clear` moves the owner to a fresh backing vector and leaves
/// existing snapshots alone.
#[derive(Default)]
pub struct SharedList {
    items: Items,
}

impl SharedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Arc<Message>) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    pub fn clear(&mut self) {
        self.items = Items::default();
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the whole list. Don't hold the guard across an `.await`.
    pub fn read(&self) -> ListGuard<'_> {
        let items = read(&self.items);
        let len = items.len();
        ListGuard { items, len }
    }

    /// The current contents as a snapshot. O(1).
    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            items: self.items.clone(),
            len: self.len(),
        }
    }
}

impl From<Vec<Arc<Message>>> for SharedList {
    fn from(messages: Vec<Arc<Message>>) -> Self {
        Self {
            items: Arc::new(RwLock::new(messages)),
        }
    }
}

impl fmt::Debug for SharedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.read().iter()).finish()
    }
}

/// Read-only prefix of a [`SharedList`], as published to the presentation layer.
#[derive(Clone, Default)]
pub struct ListSnapshot {
    items: Items,
    len: usize,
}

impl ListSnapshot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the messages. Don't hold the guard across an `.await`.
    pub fn read(&self) -> ListGuard<'_> {
        ListGuard {
            items: read(&self.items),
            len: self.len,
        }
    }

    pub fn to_vec(&self) -> Vec<Arc<Message>> {
        self.read().to_vec()
    }

    /// Whether both snapshots read from the same backing list.
    pub fn shares_list(&self, other: &ListSnapshot) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl From<Vec<Arc<Message>>> for ListSnapshot {
    fn from(messages: Vec<Arc<Message>>) -> Self {
        SharedList::from(messages).snapshot()
    }
}

impl PartialEq for ListSnapshot {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        // same backing list: equal prefixes
        if self.shares_list(other) {
            return true;
        }
        *self.read() == *other.read()
    }
}

impl fmt::Debug for ListSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.read().iter()).finish()
    }
}

/// Read guard over a list, derefs to the visible messages.
pub struct ListGuard<'a> {
    items: RwLockReadGuard<'a, Vec<Arc<Message>>>,
    len: usize,
}

impl Deref for ListGuard<'_> {
    type Target = [Arc<Message>];

    fn deref(&self) -> &Self::Target {
        &self.items[..self.len]
    }
}

fn read(items: &Items) -> RwLockReadGuard<'_, Vec<Arc<Message>>> {
    items.read().unwrap_or_else(PoisonError::into_inner)
}
