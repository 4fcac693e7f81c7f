//! Deployment attempt registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::models::deployment::{DeployAttempt, DeployProgress};

/// Hands out attempt indices. Indices are strictly increasing and never
/// handed out twice by the same sequence.
#[derive(Debug)]
pub struct AttemptSequence {
    next: AtomicU64,
}

impl AttemptSequence {
    /// Sequence whose first index is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Next index
    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Index the next call will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for AttemptSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress records of every attempt, keyed by index
pub struct DeployAttemptRegistry {
    entries: RwLock<HashMap<u64, DeployAttempt>>,
    updates: broadcast::Sender<DeployAttempt>,
}

impl DeployAttemptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(HashMap::new()),
            updates,
        }
    }

    /// Receive every record after it changes
    pub fn subscribe(&self) -> broadcast::Receiver<DeployAttempt> {
        self.updates.subscribe()
    }

    /// Register a new attempt. An existing record for `index` is kept.
    pub fn create(&self, index: u64) -> DeployAttempt {
        let attempt = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries
                .entry(index)
                .or_insert_with(|| DeployAttempt::new(index))
                .clone()
        };
        let _ = self.updates.send(attempt.clone());
        attempt
    }

    /// Merge a partial update into one attempt's record
    pub fn update(&self, index: u64, progress: DeployProgress) -> DeployAttempt {
        let attempt = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let entry = entries
                .entry(index)
                .or_insert_with(|| DeployAttempt::new(index));
            entry.merge(progress);
            entry.clone()
        };
        let _ = self.updates.send(attempt.clone());
        attempt
    }

    /// Get an attempt's record
    pub fn get(&self, index: u64) -> Option<DeployAttempt> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&index).cloned()
    }

    /// Mark an attempt dismissed. Work still running for it is not stopped.
    pub fn dismiss(&self, index: u64) -> bool {
        if self.get(index).is_none() {
            return false;
        }
        self.update(
            index,
            DeployProgress {
                deleted: Some(true),
                ..Default::default()
            },
        );
        true
    }

    /// All records, ordered by index
    pub fn all(&self) -> Vec<DeployAttempt> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut attempts: Vec<_> = entries.values().cloned().collect();
        attempts.sort_by_key(|a| a.index);
        attempts
    }

    /// Records not dismissed, ordered by index
    pub fn visible(&self) -> Vec<DeployAttempt> {
        self.all().into_iter().filter(|a| !a.deleted).collect()
    }

    /// Get registry size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeployAttemptRegistry {
    fn default() -> Self {
        Self::new()
    }
}
