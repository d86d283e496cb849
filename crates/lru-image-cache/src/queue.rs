//! Arena-backed doubly-linked recency queue
//!
//! Nodes live in a `Vec` and link to each other by index, so the queue owns
//! every node outright and callers hold only copyable [`NodeId`] handles.
//! Two sentinel slots (head and tail) are always present and never carry a
//! value. Head-to-tail order is most-recently-used to least-recently-used.

use crate::error::{CacheError, Result};
use std::fmt;

const HEAD: usize = 0;
const TAIL: usize = 1;

/// Handle to a node in a [`RecencyQueue`]
///
/// The generation is bumped every time a slot is freed, so a handle kept
/// past `remove` or `dequeue` no longer matches and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<K> {
    value: Option<K>,
    prev: usize,
    next: usize,
    generation: u64,
    linked: bool,
}

impl<K> Node<K> {
    fn sentinel(prev: usize, next: usize) -> Self {
        Self {
            value: None,
            prev,
            next,
            generation: 0,
            linked: true,
        }
    }
}

#[derive(Debug)]
pub struct RecencyQueue<K> {
    nodes: Vec<Node<K>>,
    free: Vec<usize>,
    size: usize,
}

impl<K> RecencyQueue<K> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel(HEAD, TAIL), Node::sentinel(HEAD, TAIL)],
            free: Vec::new(),
            size: 0,
        }
    }

    /// Insert a value at the head (most recently used)
    pub fn enqueue(&mut self, value: K) -> NodeId {
        let index = match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.value = Some(value);
                index
            }
            None => {
                self.nodes.push(Node {
                    value: Some(value),
                    prev: HEAD,
                    next: TAIL,
                    generation: 0,
                    linked: false,
                });
                self.nodes.len() - 1
            }
        };
        self.link_front(index);
        self.size += 1;
        NodeId {
            index,
            generation: self.nodes[index].generation,
        }
    }

    /// Remove and return the tail value (least recently used)
    pub fn dequeue(&mut self) -> Result<K> {
        if self.size == 0 {
            return Err(CacheError::EmptyQueue);
        }
        let index = self.nodes[TAIL].prev;
        self.release(index)
    }

    /// Unlink an arbitrary node and return its value
    pub fn remove(&mut self, id: NodeId) -> Result<K> {
        let index = self.resolve(id)?;
        self.release(index)
    }

    /// Move a linked node to the head, keeping its handle valid
    pub fn promote(&mut self, id: NodeId) -> Result<()> {
        let index = self.resolve(id)?;
        if self.nodes[HEAD].next != index {
            self.unlink(index);
            self.link_front(index);
        }
        Ok(())
    }

    /// Value at the tail without removing it
    pub fn peek(&self) -> Result<&K> {
        self.value_at(self.nodes[TAIL].prev)
    }

    /// Value at the head
    pub fn back(&self) -> Result<&K> {
        self.value_at(self.nodes[HEAD].next)
    }

    pub fn get(&self, id: NodeId) -> Option<&K> {
        self.resolve(id)
            .ok()
            .and_then(|index| self.nodes[index].value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Iterate head to tail (MRU first)
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            queue: self,
            cursor: self.nodes[HEAD].next,
            forward: true,
        }
    }

    /// Iterate tail to head (LRU first)
    pub fn iter_lru(&self) -> Iter<'_, K> {
        Iter {
            queue: self,
            cursor: self.nodes[TAIL].prev,
            forward: false,
        }
    }

    pub fn to_ordered_sequence(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().cloned().collect()
    }

    fn resolve(&self, id: NodeId) -> Result<usize> {
        match self.nodes.get(id.index) {
            Some(node)
                if id.index > TAIL && node.linked && node.generation == id.generation =>
            {
                Ok(id.index)
            }
            _ => Err(CacheError::NodeNotFound),
        }
    }

    fn value_at(&self, index: usize) -> Result<&K> {
        if self.size == 0 {
            return Err(CacheError::EmptyQueue);
        }
        self.nodes[index].value.as_ref().ok_or(CacheError::EmptyQueue)
    }

    fn link_front(&mut self, index: usize) {
        let first = self.nodes[HEAD].next;
        {
            let node = &mut self.nodes[index];
            node.prev = HEAD;
            node.next = first;
            node.linked = true;
        }
        self.nodes[first].prev = index;
        self.nodes[HEAD].next = index;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = &mut self.nodes[index];
            node.linked = false;
            (node.prev, node.next)
        };
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn release(&mut self, index: usize) -> Result<K> {
        self.unlink(index);
        let node = &mut self.nodes[index];
        node.generation += 1;
        let value = node.value.take().ok_or(CacheError::NodeNotFound)?;
        self.free.push(index);
        self.size -= 1;
        Ok(value)
    }
}

impl<K> Default for RecencyQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders `c->b->a->`, head to tail
impl<K: fmt::Display> fmt::Display for RecencyQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.iter() {
            write!(f, "{}->", value)?;
        }
        Ok(())
    }
}

pub struct Iter<'a, K> {
    queue: &'a RecencyQueue<K>,
    cursor: usize,
    forward: bool,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == HEAD || self.cursor == TAIL {
            return None;
        }
        let queue = self.queue;
        let node = &queue.nodes[self.cursor];
        self.cursor = if self.forward { node.next } else { node.prev };
        node.value.as_ref()
    }
}
