//! Sync recommendations
//!
//! Turns a user's [`SyncStatus`] into one line of advice. Rules are checked
//! in order and the first match wins:
//!
//! 1. a predicted conflict of High severity or worse → urgent review
//! 2. more than 50 local changes → urgent, sync soon
//! 3. local changes and last sync more than 30 min ago → stale
//! 4. more than 20 central changes → sync to stay current
//! 5. nothing local, nothing central → up to date
//! 6. otherwise → safe to sync
//!
//! Only urgent advice that differs from the previous one is announced, so a
//! user is not told the same thing every tick.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::predictor::ConflictSeverity;
use super::status::SyncStatus;

/// Prefix carried by every urgent recommendation
pub const URGENT_MARKER: &str = "⚠";

const MANY_LOCAL_CHANGES: usize = 50;
const MANY_CENTRAL_CHANGES: usize = 20;
const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// One line of advice for a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub text: String,
    pub urgent: bool,
}

impl Recommendation {
    fn urgent(text: String) -> Self {
        Self {
            text: format!("{URGENT_MARKER} {text}"),
            urgent: true,
        }
    }

    fn advisory(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            urgent: false,
        }
    }
}

/// Whether a recommendation text carries the urgent marker
pub fn is_urgent(text: &str) -> bool {
    text.starts_with(URGENT_MARKER)
}

/// Stateless rule evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncAdvisor;

impl SyncAdvisor {
    pub fn recommend(&self, status: &SyncStatus, now: DateTime<Utc>) -> Recommendation {
        let serious = status
            .predicted_conflicts
            .iter()
            .filter(|p| p.severity >= ConflictSeverity::High)
            .count();
        if serious > 0 {
            return Recommendation::urgent(format!(
                "{serious} high-risk conflict(s) predicted. Review them with the other users before syncing"
            ));
        }

        if status.local_changes_count > MANY_LOCAL_CHANGES {
            return Recommendation::urgent(format!(
                "{} local changes pending. Sync soon to reduce conflict risk",
                status.local_changes_count
            ));
        }

        let since_sync = (now - status.last_sync_time).to_std().unwrap_or_default();
        if status.local_changes_count > 0 && since_sync > STALE_AFTER {
            return Recommendation::advisory(format!(
                "Last sync was {} min ago. Consider syncing your {} local change(s)",
                since_sync.as_secs() / 60,
                status.local_changes_count
            ));
        }

        if status.central_changes_count > MANY_CENTRAL_CHANGES {
            return Recommendation::advisory(format!(
                "{} changes by others since your last sync. Sync to stay current",
                status.central_changes_count
            ));
        }

        if status.local_changes_count == 0 && status.central_changes_count == 0 {
            return Recommendation::advisory("Up to date");
        }

        Recommendation::advisory("Safe to sync")
    }

    /// Announce only urgent advice that changed since last time.
    pub fn should_announce(previous: &str, next: &Recommendation) -> bool {
        next.urgent && previous != next.text
    }
}
