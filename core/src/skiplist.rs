//! Probabilistic ordered map keyed by document id.
//!
//! Nodes live in an arena; `forward` links are arena indices. Slot 0 is the head
//! sentinel and deleted slots are recycled through a free list.

use crate::DocId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const MAX_LEVEL: usize = 16;
const P: f64 = 0.5;
const HEAD: usize = 0;

#[derive(Debug)]
struct Node<V> {
    key: DocId,
    value: Option<V>,
    forward: Vec<Option<usize>>,
}

#[derive(Debug)]
pub struct SkipList<V> {
    nodes: Vec<Node<V>>,
    free: Vec<usize>,
    level: usize,
    len: usize,
    rng: SmallRng,
}

impl<V> Default for SkipList<V> {
    fn default() -> Self { Self::new() }
}

impl<V> SkipList<V> {
    pub fn new() -> Self { Self::with_seed(rand::random()) }

    /// Deterministic level generation, for reproducible layouts.
    pub fn with_seed(seed: u64) -> Self {
        // the head grows its tower on demand as taller nodes arrive
        let head = Node { key: 0, value: None, forward: vec![None] };
        Self { nodes: vec![head], free: Vec::new(), level: 0, len: 0, rng: SmallRng::seed_from_u64(seed) }
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn level(&self) -> usize { self.level }

    fn random_level(&mut self) -> usize {
        let mut lvl = 0;
        while lvl < MAX_LEVEL && self.rng.random_bool(P) {
            lvl += 1;
        }
        lvl
    }

    fn next(&self, node: usize, lvl: usize) -> Option<usize> { self.nodes[node].forward[lvl] }

    /// Predecessor of `key` on every level up to the current top.
    fn predecessors(&self, key: DocId) -> [usize; MAX_LEVEL + 1] {
        let mut update = [HEAD; MAX_LEVEL + 1];
        let mut current = HEAD;
        for lvl in (0..=self.level).rev() {
            while let Some(n) = self.next(current, lvl) {
                if self.nodes[n].key >= key { break; }
                current = n;
            }
            update[lvl] = current;
        }
        update
    }

    fn alloc(&mut self, key: DocId, value: V, height: usize) -> usize {
        let node = Node { key, value: Some(value), forward: vec![None; height + 1] };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Insert or replace. Returns the previous value for `key`.
    pub fn insert(&mut self, key: DocId, value: V) -> Option<V> {
        let mut update = self.predecessors(key);
        if let Some(n) = self.next(update[0], 0) {
            if self.nodes[n].key == key {
                return self.nodes[n].value.replace(value);
            }
        }

        let height = self.random_level();
        if height > self.level {
            let head = &mut self.nodes[HEAD].forward;
            if head.len() <= height {
                head.resize(height + 1, None);
            }
            for slot in update.iter_mut().take(height + 1).skip(self.level + 1) {
                *slot = HEAD;
            }
            self.level = height;
        }
        let idx = self.alloc(key, value, height);
        for (lvl, &prev) in update.iter().enumerate().take(height + 1) {
            self.nodes[idx].forward[lvl] = self.nodes[prev].forward[lvl];
            self.nodes[prev].forward[lvl] = Some(idx);
        }
        self.len += 1;
        None
    }

    pub fn search(&self, key: DocId) -> Option<&V> {
        let update = self.predecessors(key);
        let n = self.next(update[0], 0)?;
        if self.nodes[n].key == key { self.nodes[n].value.as_ref() } else { None }
    }

    pub fn contains(&self, key: DocId) -> bool { self.search(key).is_some() }

    /// Unlink `key`. Returns whether it was present.
    pub fn delete(&mut self, key: DocId) -> bool {
        let update = self.predecessors(key);
        let target = match self.next(update[0], 0) {
            Some(n) if self.nodes[n].key == key => n,
            _ => return false,
        };
        for (lvl, &prev) in update.iter().enumerate().take(self.level + 1) {
            if self.nodes[prev].forward[lvl] != Some(target) { break; }
            self.nodes[prev].forward[lvl] = self.nodes[target].forward[lvl];
        }
        while self.level > 0 && self.nodes[HEAD].forward[self.level].is_none() {
            self.level -= 1;
        }
        self.nodes[target].value = None;
        self.nodes[target].forward.clear();
        self.free.push(target);
        self.len -= 1;
        true
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, &V)> + '_ {
        let mut cursor = self.next(HEAD, 0);
        std::iter::from_fn(move || {
            let n = cursor?;
            cursor = self.next(n, 0);
            self.nodes[n].value.as_ref().map(|v| (self.nodes[n].key, v))
        })
    }

    pub fn keys(&self) -> Vec<DocId> { self.iter().map(|(k, _)| k).collect() }
}
