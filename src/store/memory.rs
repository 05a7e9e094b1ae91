//! In-process store with the same semantics as the Redis store.
//!
//! All state sits behind one async mutex, so every operation, transitions
//! included, is trivially atomic. Blocked `blocking_move` callers are woken
//! through a `Notify` whenever a list receives a member.
//!
//! Used as the broker's test double and for single-process setups.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{Placement, ScoredEntry, Store, Transition, Trim};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, Vec<ScoredEntry>>,
}

impl State {
    fn push(&mut self, list: &str, member: String) {
        self.lists.entry(list.to_string()).or_default().push_front(member);
    }

    fn pop(&mut self, list: &str) -> Option<String> {
        let queue = self.lists.get_mut(list)?;
        let member = queue.pop_back();
        if queue.is_empty() {
            self.lists.remove(list);
        }
        member
    }

    fn remove_one(&mut self, list: &str, member: &str) -> u64 {
        let Some(queue) = self.lists.get_mut(list) else {
            return 0;
        };
        let removed = match queue.iter().position(|m| m == member) {
            Some(index) => {
                queue.remove(index);
                1
            }
            None => 0,
        };
        if queue.is_empty() {
            self.lists.remove(list);
        }
        removed
    }

    fn add_scored(&mut self, set: &str, member: &str, score: f64) {
        let entries = self.sets.entry(set.to_string()).or_default();
        match entries.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = score,
            None => entries.push((member.to_string(), score)),
        }
        // Ties order by member, as in Redis.
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    }

    fn remove_scored(&mut self, set: &str, member: &str) -> bool {
        let Some(entries) = self.sets.get_mut(set) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(m, _)| m != member);
        let removed = entries.len() < before;
        if entries.is_empty() {
            self.sets.remove(set);
        }
        removed
    }

    fn trim(&mut self, set: &str, trim: &Trim) {
        let Some(entries) = self.sets.get_mut(set) else {
            return;
        };
        if let Some(min_score) = trim.min_score {
            entries.retain(|(_, score)| *score >= min_score);
        }
        if let Some(max_len) = trim.max_len {
            let excess = entries.len().saturating_sub(max_len);
            entries.drain(..excess);
        }
        if entries.is_empty() {
            self.sets.remove(set);
        }
    }

    fn due(&self, set: &str, max_score: f64) -> Vec<String> {
        self.sets
            .get(set)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, score)| *score <= max_score)
                    .map(|(member, _)| member.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    notify: Notify,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with `StoreError::Unavailable`
    /// until reset, simulating a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is in failure mode".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn push(&self, list: &str, member: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.state.lock().await.push(list, member.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn add_scored(&self, set: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.check_available()?;
        self.state.lock().await.add_scored(set, member, score);
        Ok(())
    }

    async fn blocking_move(
        &self,
        from: &str,
        to: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.check_available()?;
            // Register interest before looking, so a push between the check
            // and the wait is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(member) = state.pop(from) {
                    state.push(to, member.clone());
                    drop(state);
                    self.notify.notify_waiters();
                    return Ok(Some(member));
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn transition(&self, transition: &Transition<'_>) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let (count, pushed) = match *transition {
            Transition::Member { from, member, to } => {
                let removed = state.remove_one(from, member);
                if let Placement::Scored { set, score, trim } = to {
                    state.add_scored(set, member, score);
                    if let Some(trim) = trim {
                        state.trim(set, &trim);
                    }
                }
                (removed, false)
            }
            Transition::Drain { from, to } => {
                let mut moved = 0;
                while let Some(member) = state.pop(from) {
                    state.push(to, member);
                    moved += 1;
                }
                (moved, moved > 0)
            }
            Transition::Due {
                from,
                max_score,
                to,
            } => {
                let mut promoted = 0;
                for member in state.due(from, max_score) {
                    if state.remove_scored(from, &member) {
                        state.push(to, member);
                        promoted += 1;
                    }
                }
                (promoted, promoted > 0)
            }
        };
        drop(state);
        if pushed {
            self.notify.notify_waiters();
        }
        Ok(count)
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(list)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scored_range(&self, set: &str) -> Result<Vec<ScoredEntry>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sets.get(set).cloned().unwrap_or_default())
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.lists.get(list).map_or(0, |q| q.len()))
    }

    async fn scored_len(&self, set: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sets.get(set).map_or(0, |s| s.len()))
    }
}
