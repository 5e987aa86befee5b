//! Conflict prediction
//!
//! Compares a user's pending changes against everyone else's recent activity
//! on the same elements and scores each overlap.
//!
//! ## Scoring
//!
//! Severity, first matching rule wins:
//!
//! | Rule | Severity |
//! |------|----------|
//! | remote deleted the element | Critical |
//! | pending geometry change, or remote moved it | High |
//! | pending parameter change and remote modified it | Medium |
//! | anything else | Low |
//!
//! Probability is a step function of how long ago the remote edit happened:
//! under 5 min 0.9, under 15 min 0.7, under 30 min 0.5, otherwise 0.3.
//! Only predictions above 0.3 are reported.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::ActivityLedger;
use crate::config::DEFAULT_CONFLICT_WINDOW;
use crate::types::{ActivityType, ChangeType, ElementActivity, ElementId, PendingChange, UserId};

/// Predictions at or below this probability are dropped
pub const MIN_REPORTED_PROBABILITY: f64 = 0.3;

/// Probability used on the event path, where the activity is current
pub const IMMEDIATE_PROBABILITY: f64 = 0.9;

/// How bad a conflict would be if it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    /// Score a pending change against a remote activity on the same element.
    pub fn assess(change_type: &ChangeType, remote: ActivityType) -> Self {
        if remote == ActivityType::Deleted {
            ConflictSeverity::Critical
        } else if *change_type == ChangeType::Geometry || remote == ActivityType::Moved {
            ConflictSeverity::High
        } else if *change_type == ChangeType::Parameters && remote == ActivityType::Modified {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }

    /// What the local user should do about it
    pub fn resolution(&self, remote_user: &str) -> String {
        match self {
            ConflictSeverity::Critical => format!(
                "Contact {remote_user} immediately before syncing; the element was deleted on their side"
            ),
            ConflictSeverity::High => {
                format!("Coordinate with {remote_user} before syncing to avoid overwriting their work")
            }
            ConflictSeverity::Medium => {
                "Review the element after syncing to confirm both sets of changes were kept".to_string()
            }
            ConflictSeverity::Low => "Safe to sync; the overlap is unlikely to conflict".to_string(),
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictSeverity::Low => write!(f, "low"),
            ConflictSeverity::Medium => write!(f, "medium"),
            ConflictSeverity::High => write!(f, "high"),
            ConflictSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Likelihood that a remote edit collides with a pending change, by its age.
pub fn recency_probability(age: Duration) -> f64 {
    const MINUTE: u64 = 60;
    match age.as_secs() {
        s if s < 5 * MINUTE => 0.9,
        s if s < 15 * MINUTE => 0.7,
        s if s < 30 * MINUTE => 0.5,
        _ => 0.3,
    }
}

/// A predicted conflict between a local pending change and remote activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictPrediction {
    pub element_id: ElementId,
    pub element_name: String,
    pub local_user_id: UserId,
    pub remote_user_id: UserId,
    pub remote_user_name: String,
    pub severity: ConflictSeverity,
    pub probability: f64,
    pub description: String,
    pub resolution_suggestion: String,
}

impl ConflictPrediction {
    fn build(
        local_user: &UserId,
        change: &PendingChange,
        remote: &ElementActivity,
        severity: ConflictSeverity,
        probability: f64,
        age: Duration,
    ) -> Self {
        let element_name = if change.element_name.is_empty() {
            remote.element_name.clone()
        } else {
            change.element_name.clone()
        };
        let minutes = age.as_secs() / 60;
        let description = format!(
            "{} {} '{}' {} min ago while you have pending {} changes",
            remote.username,
            remote.activity_type,
            element_name,
            minutes,
            change.change_type
        );

        Self {
            element_id: change.element_id.clone(),
            element_name,
            local_user_id: local_user.clone(),
            remote_user_id: remote.user_id.clone(),
            remote_user_name: remote.username.clone(),
            severity,
            probability,
            description,
            resolution_suggestion: severity.resolution(&remote.username),
        }
    }
}

/// Scores pending changes against the activity ledger
#[derive(Debug, Clone)]
pub struct ConflictPredictor {
    window: Duration,
}

impl ConflictPredictor {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Predict conflicts for `user_id`'s pending changes at time `now`.
    ///
    /// Returns an empty list when there are no pending changes.
    pub fn predict(
        &self,
        user_id: &UserId,
        pending: &[PendingChange],
        ledger: &ActivityLedger,
        now: DateTime<Utc>,
    ) -> Vec<ConflictPrediction> {
        pending
            .iter()
            .filter_map(|change| {
                let remote =
                    ledger.latest_by_other(&change.element_id, user_id, self.window, now)?;
                let age = (now - remote.timestamp).to_std().unwrap_or_default();
                let probability = recency_probability(age);
                if probability <= MIN_REPORTED_PROBABILITY {
                    return None;
                }
                let severity = ConflictSeverity::assess(&change.change_type, remote.activity_type);
                Some(ConflictPrediction::build(
                    user_id,
                    change,
                    &remote,
                    severity,
                    probability,
                    age,
                ))
            })
            .collect()
    }

    /// Cross-reference one fresh activity against every other user's pending
    /// changes. Only Medium severity and above are returned.
    pub fn on_activity(
        &self,
        activity: &ElementActivity,
        pending_by_user: &HashMap<UserId, Vec<PendingChange>>,
    ) -> Vec<ConflictPrediction> {
        let mut predictions = Vec::new();
        for (user_id, pending) in pending_by_user {
            if user_id == &activity.user_id {
                continue;
            }
            for change in pending.iter().filter(|c| c.element_id == activity.element_id) {
                let severity = ConflictSeverity::assess(&change.change_type, activity.activity_type);
                if severity < ConflictSeverity::Medium {
                    continue;
                }
                predictions.push(ConflictPrediction::build(
                    user_id,
                    change,
                    activity,
                    severity,
                    IMMEDIATE_PROBABILITY,
                    Duration::ZERO,
                ));
            }
        }
        predictions
    }
}

impl Default for ConflictPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(element: &str, user: &str, kind: ActivityType, minutes_ago: i64, now: DateTime<Utc>) -> ElementActivity {
        ElementActivity::new(element, user, kind)
            .with_element_name("Basic Wall 200mm")
            .at(now - chrono::Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_severity_rules_in_order() {
        use ActivityType::*;
        let geometry = ChangeType::Geometry;
        let parameters = ChangeType::Parameters;
        let other = ChangeType::Other("Annotation".into());

        assert_eq!(ConflictSeverity::assess(&geometry, Deleted), ConflictSeverity::Critical);
        assert_eq!(ConflictSeverity::assess(&geometry, Modified), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::assess(&parameters, Moved), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::assess(&parameters, Modified), ConflictSeverity::Medium);
        assert_eq!(ConflictSeverity::assess(&parameters, Created), ConflictSeverity::Low);
        assert_eq!(ConflictSeverity::assess(&other, Modified), ConflictSeverity::Low);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Low < ConflictSeverity::Medium);
        assert!(ConflictSeverity::Medium < ConflictSeverity::High);
        assert!(ConflictSeverity::High < ConflictSeverity::Critical);
    }

    #[test]
    fn test_recency_steps() {
        assert_eq!(recency_probability(Duration::from_secs(0)), 0.9);
        assert_eq!(recency_probability(Duration::from_secs(4 * 60 + 59)), 0.9);
        assert_eq!(recency_probability(Duration::from_secs(5 * 60)), 0.7);
        assert_eq!(recency_probability(Duration::from_secs(14 * 60)), 0.7);
        assert_eq!(recency_probability(Duration::from_secs(20 * 60)), 0.5);
        assert_eq!(recency_probability(Duration::from_secs(30 * 60)), 0.3);
    }

    #[test]
    fn test_geometry_vs_moved_now_is_high() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        ledger.record(remote("E1", "B", ActivityType::Moved, 0, now));

        let pending = vec![PendingChange::new("E1", "Wall", "Geometry")];
        let predictions = ConflictPredictor::default().predict(&UserId::from("A"), &pending, &ledger, now);

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].severity, ConflictSeverity::High);
        assert!(predictions[0].probability >= 0.9);
        assert_eq!(predictions[0].remote_user_id, UserId::from("B"));
    }

    #[test]
    fn test_twenty_minute_old_activity_is_half_probability() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        ledger.record(remote("E1", "B", ActivityType::Moved, 20, now));

        let pending = vec![PendingChange::new("E1", "Wall", "Geometry")];
        let predictions = ConflictPredictor::default().predict(&UserId::from("A"), &pending, &ledger, now);

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].probability, 0.5);
        assert_eq!(predictions[0].severity, ConflictSeverity::High);
    }

    #[test]
    fn test_no_pending_changes_no_predictions() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for user in ["B", "C", "D"] {
            ledger.record(remote("E1", user, ActivityType::Deleted, 1, now));
        }

        let predictions = ConflictPredictor::default().predict(&UserId::from("A"), &[], &ledger, now);
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_own_and_expired_activity_ignored() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        ledger.record(remote("E1", "A", ActivityType::Deleted, 1, now));
        ledger.record(remote("E2", "B", ActivityType::Deleted, 31, now));

        let pending = vec![
            PendingChange::new("E1", "Wall", "Geometry"),
            PendingChange::new("E2", "Door", "Geometry"),
        ];
        let predictions = ConflictPredictor::default().predict(&UserId::from("A"), &pending, &ledger, now);
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_prediction_text() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        ledger.record(remote("E1", "B", ActivityType::Deleted, 2, now).with_username("Bob"));

        let pending = vec![PendingChange::new("E1", "", "Parameters")];
        let prediction = &ConflictPredictor::default().predict(&UserId::from("A"), &pending, &ledger, now)[0];

        assert_eq!(prediction.severity, ConflictSeverity::Critical);
        assert_eq!(prediction.element_name, "Basic Wall 200mm");
        assert!(prediction.description.starts_with("Bob deleted 'Basic Wall 200mm' 2 min ago"));
        assert!(prediction.resolution_suggestion.contains("Contact Bob immediately"));
    }

    #[test]
    fn test_on_activity_flags_other_users_medium_and_up() {
        let mut pending = HashMap::new();
        pending.insert(UserId::from("A"), vec![PendingChange::new("E1", "Wall", "Parameters")]);
        pending.insert(UserId::from("C"), vec![PendingChange::new("E1", "Wall", "Other")]);
        pending.insert(UserId::from("B"), vec![PendingChange::new("E1", "Wall", "Geometry")]);

        let activity = ElementActivity::new("E1", "B", ActivityType::Modified);
        let predictions = ConflictPredictor::default().on_activity(&activity, &pending);

        // B is the author, C's change is Low
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].local_user_id, UserId::from("A"));
        assert_eq!(predictions[0].severity, ConflictSeverity::Medium);
        assert_eq!(predictions[0].probability, IMMEDIATE_PROBABILITY);
    }

    #[test]
    fn test_on_activity_rates_views_like_any_activity() {
        let mut pending = HashMap::new();
        pending.insert(UserId::from("A"), vec![PendingChange::new("E1", "Wall", "Geometry")]);
        pending.insert(UserId::from("C"), vec![PendingChange::new("E1", "Wall", "Parameters")]);

        let activity = ElementActivity::new("E1", "B", ActivityType::Viewed);
        let predictions = ConflictPredictor::default().on_activity(&activity, &pending);

        // Geometry is High whatever the remote did; Parameters + Viewed is Low
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].local_user_id, UserId::from("A"));
        assert_eq!(predictions[0].severity, ConflictSeverity::High);
    }

    #[test]
    fn test_predict_uses_most_recent_activity_even_a_view() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        ledger.record(
            ElementActivity::new("E1", "B", ActivityType::Modified).at(now - chrono::Duration::minutes(20)),
        );
        ledger.record(ElementActivity::new("E1", "C", ActivityType::Viewed).at(now));

        let predictions = ConflictPredictor::default().predict(
            &UserId::from("A"),
            &[PendingChange::new("E1", "Wall", "Geometry")],
            &ledger,
            now,
        );

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].remote_user_id, UserId::from("C"));
        assert_eq!(predictions[0].severity, ConflictSeverity::High);
        assert_eq!(predictions[0].probability, 0.9);
    }

    proptest::proptest! {
        #[test]
        fn prop_probability_never_increases_with_age(a in 0u64..7200, b in 0u64..7200) {
            let (young, old) = if a <= b { (a, b) } else { (b, a) };
            proptest::prop_assert!(
                recency_probability(Duration::from_secs(young)) >= recency_probability(Duration::from_secs(old))
            );
        }
    }
}
