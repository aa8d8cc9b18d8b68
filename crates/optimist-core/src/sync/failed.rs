//! Operations that reached terminal failure, kept for a manual retry

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::{PendingSync, SyncEngine};
use crate::error::SyncResult;

/// Replays kept per kind; the oldest is dropped beyond this
const MAX_KEPT_FAILURES: usize = 100;

/// Re-issues one failed operation against an engine
pub(super) type Replay<T, R> =
    Box<dyn FnOnce(&SyncEngine<T, R>) -> SyncResult<PendingSync> + Send>;

pub(super) struct FailedOperations<T, R> {
    mutations: Mutex<VecDeque<Replay<T, R>>>,
    creations: Mutex<VecDeque<Replay<T, R>>>,
}

impl<T, R> Default for FailedOperations<T, R> {
    fn default() -> Self {
        Self {
            mutations: Mutex::new(VecDeque::new()),
            creations: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T, R> FailedOperations<T, R> {
    pub(super) fn push_mutation(&self, replay: Replay<T, R>) {
        push_bounded(&self.mutations, replay, "mutation");
    }

    pub(super) fn push_creation(&self, replay: Replay<T, R>) {
        push_bounded(&self.creations, replay, "creation");
    }

    pub(super) fn take_mutations(&self) -> Vec<Replay<T, R>> {
        std::mem::take(&mut *lock(&self.mutations)).into()
    }

    pub(super) fn take_creations(&self) -> Vec<Replay<T, R>> {
        std::mem::take(&mut *lock(&self.creations)).into()
    }

    pub(super) fn counts(&self) -> (usize, usize) {
        (lock(&self.mutations).len(), lock(&self.creations).len())
    }
}

fn push_bounded<V>(list: &Mutex<VecDeque<V>>, replay: V, kind: &str) {
    let mut list = lock(list);
    if list.len() >= MAX_KEPT_FAILURES {
        list.pop_front();
        warn!(
            "More than {} failed {}s kept; dropping the oldest",
            MAX_KEPT_FAILURES, kind
        );
    }
    list.push_back(replay);
}

fn lock<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_failures_are_dropped_past_the_limit() {
        let list: Mutex<VecDeque<usize>> = Mutex::new(VecDeque::new());
        for n in 0..MAX_KEPT_FAILURES + 5 {
            push_bounded(&list, n, "mutation");
        }

        let kept = lock(&list);
        assert_eq!(kept.len(), MAX_KEPT_FAILURES);
        assert_eq!(kept.front(), Some(&5));
        assert_eq!(kept.back(), Some(&(MAX_KEPT_FAILURES + 4)));
    }
}
