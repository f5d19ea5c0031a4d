//! Recency-ordered, duplicate-free record of viewed items.
//!
//! Entries live in a slot vector linked both ways, with an identity index on
//! the side, so appending and removing by identity are both O(1).

use crate::model::{Entity, TaskId};
use std::collections::HashMap;

pub trait Identified {
    fn id(&self) -> TaskId;
}

impl Identified for Entity {
    fn id(&self) -> TaskId {
        Entity::id(self)
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HistoryTracker<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<TaskId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    limit: Option<usize>,
}

impl<T> Default for HistoryTracker<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            limit: None,
        }
    }
}

impl<T: Identified + Clone> HistoryTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` entries, evicting the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Moves `item` to the newest position, dropping any earlier entry with the same identity.
    pub fn record(&mut self, item: T) {
        let id = item.id();
        if let Some(slot) = self.index.get(&id).copied() {
            self.unlink(slot);
        }

        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            while self.index.len() >= limit {
                match self.head {
                    Some(oldest) => {
                        self.unlink(oldest);
                    }
                    None => break,
                }
            }
        }

        self.link_last(id, item);
    }

    /// Replaces the stored value for an already tracked identity, keeping its position.
    pub fn refresh(&mut self, item: T) {
        let Some(slot) = self.index.get(&item.id()).copied() else {
            return;
        };
        if let Some(node) = self.slots.get_mut(slot).and_then(Option::as_mut) {
            node.value = item;
        }
    }

    pub fn forget(&mut self, id: TaskId) {
        if let Some(slot) = self.index.get(&id).copied() {
            self.unlink(slot);
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.slots.get(slot).and_then(Option::as_ref) {
                Some(node) => {
                    items.push(node.value.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        items
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn link_last(&mut self, id: TaskId, value: T) {
        let node = Node {
            value,
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(old_tail) => {
                if let Some(previous) = self.slots[old_tail].as_mut() {
                    previous.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(id, slot);
    }

    fn unlink(&mut self, slot: usize) -> Option<T> {
        let node = self.slots.get_mut(slot)?.take()?;

        match node.prev {
            Some(prev) => {
                if let Some(previous) = self.slots[prev].as_mut() {
                    previous.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(following) = self.slots[next].as_mut() {
                    following.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.index.remove(&node.value.id());
        self.free.push(slot);
        Some(node.value)
    }
}
