//! Poll scheduler: one pass over all tracked users per interval.
//!
//! Entities are processed strictly sequentially within a pass to bound
//! the burst rate against both the polled service and the webhook. The
//! batched presence fetch always precedes the per-user detail fetches.

use crate::config::Config;
use crate::notify::{build_report, Notifier};
use crate::remote::RemoteClient;
use crate::snapshot::{diff, AvatarFields, Diff, PresenceFields, ProfileFields, Snapshot};
use crate::store::PersistedState;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

#[cfg(test)]
mod tests;

/// One tracked user: the configured name and its resolved identifier.
/// Immutable once resolution succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedUser {
    pub name: String,
    pub id: u64,
}

/// Cooldown gate: a notification is permitted iff something changed and
/// the window since the last one has elapsed. Pure; the caller supplies
/// the clock.
pub fn notification_permitted(
    changes: &Diff,
    last_notified_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: chrono::Duration,
) -> bool {
    if changes.is_empty() {
        return false;
    }
    match last_notified_at {
        Some(last) => now.signed_duration_since(last) >= cooldown,
        None => true,
    }
}

/// Pair configured names with resolved ids, in configuration order.
/// Duplicates collapse to the first occurrence; names the service did
/// not recognize are dropped and reported once.
pub fn resolve_tracked(usernames: &[String], mapping: &HashMap<String, u64>) -> Vec<TrackedUser> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for name in usernames {
        if !seen.insert(name.clone()) {
            continue;
        }
        match mapping.get(name) {
            Some(id) => users.push(TrackedUser {
                name: name.clone(),
                id: *id,
            }),
            None => warn!(user = %name, "Could not resolve username, skipping"),
        }
    }
    users
}

/// Delay until the next pass so the cadence holds regardless of how long
/// the pass took.
pub fn next_pass_delay(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

/// Owns the tracked set, the persisted state, and the poll loop.
pub struct Tracker {
    client: RemoteClient,
    notifier: Notifier,
    users: Vec<TrackedUser>,
    state: PersistedState,
    state_file: PathBuf,
    poll_interval: Duration,
    cooldown: chrono::Duration,
    entity_pause: Duration,
}

impl Tracker {
    /// Resolve the configured usernames once and seed state entries for
    /// every tracked user. Fatal if the resolution call fails outright
    /// or nothing resolves.
    pub async fn start(
        config: &Config,
        client: RemoteClient,
        notifier: Notifier,
    ) -> Result<Self> {
        let usernames = config.usernames();
        let state = PersistedState::load(&config.state_file);

        let mapping = client
            .resolve_usernames(&usernames)
            .await
            .context("Could not resolve any usernames")?;
        let users = resolve_tracked(&usernames, &mapping);
        if users.is_empty() {
            bail!("none of the configured usernames could be resolved");
        }

        let mut tracker = Self {
            client,
            notifier,
            users,
            state,
            state_file: config.state_file.clone(),
            poll_interval: config.poll_interval(),
            cooldown: config.notify_cooldown(),
            entity_pause: config.entity_pause(),
        };

        for user in &tracker.users {
            tracker
                .state
                .snapshots
                .entry(user.name.clone())
                .or_default();
            tracker
                .state
                .last_notified_at
                .entry(user.name.clone())
                .or_insert(DateTime::UNIX_EPOCH);
        }
        if let Err(e) = tracker.state.save(&tracker.state_file) {
            warn!(error = %e, "Failed to save initial state");
        }

        info!(
            tracked = tracker.users.len(),
            interval_s = tracker.poll_interval.as_secs(),
            cooldown_s = tracker.cooldown.num_seconds(),
            "Tracker started"
        );
        Ok(tracker)
    }

    /// Run passes forever at the target cadence. Termination is
    /// process-level only.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let started = Instant::now();
            self.run_pass().await;
            sleep(next_pass_delay(self.poll_interval, started.elapsed())).await;
        }
    }

    /// One full pass: batched presence first, then each user in stable
    /// order, then a single state write.
    async fn run_pass(&mut self) {
        let ids: Vec<u64> = self.users.iter().map(|u| u.id).collect();
        let presence_map = match self.client.fetch_presence_batch(&ids).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Presence batch fetch failed, presence defaults this pass");
                HashMap::new()
            }
        };

        let users = self.users.clone();
        for user in &users {
            if let Err(e) = self.process_user(user, &presence_map).await {
                error!(user = %user.name, error = %e, "Entity pass failed");
            }
            // Spread requests out even when nothing changed
            sleep(self.entity_pause).await;
        }

        if let Err(e) = self.state.save(&self.state_file) {
            warn!(error = %e, "Failed to save state, continuing in memory");
        }
    }

    /// Fetch, diff, gate, and notify one user.
    ///
    /// Sub-resource failures degrade to defaults for this pass. The
    /// stored snapshot always advances (latest wins); `last_notified_at`
    /// moves only on a successful send, so a failed delivery can be
    /// retried by a later pass if the user changes again.
    async fn process_user(
        &mut self,
        user: &TrackedUser,
        presence_map: &HashMap<u64, PresenceFields>,
    ) -> Result<()> {
        let profile = match self.client.fetch_profile(user.id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(user = %user.name, id = user.id, error = %e, "Failed to fetch profile, using defaults");
                ProfileFields::default()
            }
        };
        let avatar = match self.client.fetch_avatar(user.id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(user = %user.name, id = user.id, error = %e, "Failed to fetch avatar, using defaults");
                AvatarFields::default()
            }
        };
        let current = Snapshot {
            profile,
            avatar,
            presence: presence_map.get(&user.id).cloned().unwrap_or_default(),
        };

        let previous = self.state.snapshot_for(&user.name);
        let changes = diff(&previous, &current);

        // Latest wins: the fresh snapshot replaces the stored one even
        // when the notification is suppressed or fails below.
        self.state
            .snapshots
            .insert(user.name.clone(), current.clone());

        if changes.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let last = self.state.last_notified_at.get(&user.name).copied();
        if !notification_permitted(&changes, last, now, self.cooldown) {
            info!(
                user = %user.name,
                changed = changes.len(),
                "Changes detected but cooldown active, not notifying"
            );
            return Ok(());
        }

        let payload = build_report(&user.name, user.id, &current, &changes);
        self.notifier
            .send(&payload)
            .await
            .context("Failed to deliver notification")?;

        self.state
            .last_notified_at
            .insert(user.name.clone(), Utc::now());
        info!(user = %user.name, changed = changes.len(), "Notified changes");
        Ok(())
    }
}
