use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::entry::{CredentialEntry, FailureKind};
use super::error::PoolError;
use crate::sanitize;
use crate::store::{CredentialStore, StoreError};

/// Health thresholds shared by every entry in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Consecutive failures at which an entry enters cooldown.
    pub max_errors: u32,
    /// How long an entry at the threshold stays excluded after its last error.
    pub cooldown: Duration,
}

impl PoolPolicy {
    pub fn new(max_errors: u32, cooldown_secs: u64) -> Self {
        Self {
            max_errors,
            cooldown: Duration::seconds(cooldown_secs.min(i64::MAX as u64) as i64),
        }
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self::new(3, 300)
    }
}

/// Point-in-time health summary of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub cooling_down: usize,
    pub eligible: usize,
}

/// Set of interchangeable credentials.
///
/// All operations are serialized through a single `Mutex`, so two callers can
/// never select the same entry out of cooldown at once or lose an error-count
/// update. Selection stamps `last_used_at` while the lock is held, which
/// spreads concurrent callers across entries.
pub struct CredentialPool {
    entries: Mutex<Vec<CredentialEntry>>,
    policy: PoolPolicy,
}

impl CredentialPool {
    pub fn new(policy: PoolPolicy) -> Self {
        Self::with_entries(policy, Vec::new())
    }

    pub fn with_entries(policy: PoolPolicy, entries: Vec<CredentialEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            policy,
        }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<CredentialEntry>>, PoolError> {
        self.entries.lock().map_err(|_| PoolError::LockPoisoned)
    }

    /// Replaces the pool contents with the entries held by `store`.
    pub async fn load_from(&self, store: &dyn CredentialStore) -> Result<usize, StoreError> {
        let loaded = store.list_credentials().await?;
        let count = loaded.len();
        let mut entries = self
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        *entries = loaded;
        info!(count, "Loaded credentials into pool");
        Ok(count)
    }

    /// Adds an entry, replacing any existing entry with the same id.
    pub fn add(&self, entry: CredentialEntry) -> Result<(), PoolError> {
        let mut entries = self.lock()?;
        entries.retain(|e| e.id != entry.id);
        debug!(
            label = %entry.label,
            credential = %sanitize::credential_tag(&entry.id),
            "Added credential to pool"
        );
        entries.push(entry);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Option<CredentialEntry>, PoolError> {
        let mut entries = self.lock()?;
        let position = entries.iter().position(|e| e.id == id);
        Ok(position.map(|i| entries.remove(i)))
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Result<Vec<CredentialEntry>, PoolError> {
        Ok(self.lock()?.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<CredentialEntry>, PoolError> {
        Ok(self.lock()?.iter().find(|e| e.id == id).cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the most eligible active entry.
    pub fn select(&self) -> Result<CredentialEntry, PoolError> {
        self.select_at(&HashSet::new(), Utc::now())
    }

    /// Like [`select`](Self::select), but prefers entries whose id is not in
    /// `tried`. Falls back to a tried entry only when nothing else is eligible.
    pub fn select_excluding(&self, tried: &HashSet<String>) -> Result<CredentialEntry, PoolError> {
        self.select_at(tried, Utc::now())
    }

    /// Selection with an explicit clock.
    ///
    /// Eligible: `active` and not in cooldown. Among candidates the entry with
    /// the oldest `last_used_at` wins (never-used first), ties go to the lower
    /// `error_count`, then to insertion order.
    pub fn select_at(
        &self,
        tried: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<CredentialEntry, PoolError> {
        let mut entries = self.lock()?;

        let eligible: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_eligible_at(&self.policy, now))
            .map(|(i, _)| i)
            .collect();

        let untried: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&i| !tried.contains(&entries[i].id))
            .collect();

        let candidates = if untried.is_empty() { &eligible } else { &untried };

        let chosen = candidates
            .iter()
            .copied()
            .min_by_key(|&i| (entries[i].last_used_at, entries[i].error_count))
            .ok_or(PoolError::NoCredentialsAvailable)?;

        let entry = &mut entries[chosen];
        entry.last_used_at = Some(now);

        debug!(
            label = %entry.label,
            credential = %sanitize::credential_tag(&entry.id),
            error_count = entry.error_count,
            "Selected credential"
        );

        Ok(entry.clone())
    }

    /// Records a successful call: resets the error count and clears the last error.
    pub fn report_success(&self, id: &str) -> Result<CredentialEntry, PoolError> {
        self.report_success_at(id, Utc::now())
    }

    pub fn report_success_at(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<CredentialEntry, PoolError> {
        let mut entries = self.lock()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PoolError::UnknownCredential(id.to_string()))?;
        entry.record_success(now);
        Ok(entry.clone())
    }

    /// Records a failed call.
    ///
    /// `InvalidCredential` deactivates the entry until an operator reactivates
    /// it. `RateLimited` and `Transient` bump the error count and start the
    /// cooldown clock. `Permanent` leaves health untouched.
    pub fn report_failure(
        &self,
        id: &str,
        kind: FailureKind,
    ) -> Result<CredentialEntry, PoolError> {
        self.report_failure_at(id, kind, Utc::now())
    }

    pub fn report_failure_at(
        &self,
        id: &str,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Result<CredentialEntry, PoolError> {
        let mut entries = self.lock()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PoolError::UnknownCredential(id.to_string()))?;
        entry.record_failure(kind, now);

        match kind {
            FailureKind::InvalidCredential => warn!(
                label = %entry.label,
                credential = %sanitize::credential_tag(&entry.id),
                "Credential deactivated after provider rejected it"
            ),
            FailureKind::RateLimited | FailureKind::Transient
                if entry.error_count >= self.policy.max_errors =>
            {
                warn!(
                    label = %entry.label,
                    credential = %sanitize::credential_tag(&entry.id),
                    error_count = entry.error_count,
                    cooldown_secs = self.policy.cooldown.num_seconds(),
                    "Credential entering cooldown"
                )
            }
            _ => {}
        }

        Ok(entry.clone())
    }

    /// Re-enables a deactivated entry and clears its error history.
    pub fn reactivate(&self, id: &str) -> Result<CredentialEntry, PoolError> {
        let mut entries = self.lock()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PoolError::UnknownCredential(id.to_string()))?;
        entry.active = true;
        entry.error_count = 0;
        entry.last_error_at = None;
        info!(label = %entry.label, "Credential reactivated");
        Ok(entry.clone())
    }

    pub fn stats(&self) -> Result<PoolStats, PoolError> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<PoolStats, PoolError> {
        let entries = self.lock()?;
        let mut stats = PoolStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter() {
            if entry.active {
                stats.active += 1;
                if entry.in_cooldown_at(&self.policy, now) {
                    stats.cooling_down += 1;
                } else {
                    stats.eligible += 1;
                }
            }
        }
        Ok(stats)
    }
}
