//! Worksharing conflict monitor
//!
//! Tracks who is editing what, predicts conflicts between collaborators
//! before they sync, and turns that into advice.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  WorkshareMonitor                                               │
//! │  ├── ledger: ActivityLedger          (local + remote activity)  │
//! │  ├── pending: UserId → [PendingChange]  (from the host editor)  │
//! │  ├── status:  UserId → SyncStatus                               │
//! │  ├── worksets: name → WorksetInfo                               │
//! │  └── event_tx: broadcast::Sender<MonitorEvent>                  │
//! │                                                                 │
//! │  record_activity ──► ConflictPredictor::on_activity (immediate) │
//! │  MonitoringScheduler tick ──► hotspots → predict → recommend    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here blocks or locks design elements: every output is advice.

pub mod advisor;
pub mod hotspot;
pub mod ledger;
pub mod predictor;
pub mod scheduler;
pub mod status;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use advisor::{is_urgent, Recommendation, SyncAdvisor, URGENT_MARKER};
pub use hotspot::{ActivityHotspot, ConflictRisk, HotspotAnalyzer};
pub use ledger::ActivityLedger;
pub use predictor::{ConflictPrediction, ConflictPredictor, ConflictSeverity};
pub use scheduler::MonitoringScheduler;
pub use status::{SyncState, SyncStatus};

use crate::config::MonitorConfig;
use crate::events::{MonitorEvent, EVENT_CHANNEL_CAPACITY};
use crate::types::{ElementActivity, PendingChange, UserId, WorksetInfo};

/// What one scheduler pass produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub hotspots: Vec<ActivityHotspot>,
    pub predictions: HashMap<UserId, Vec<ConflictPrediction>>,
    pub recommendations: HashMap<UserId, String>,
    /// Events published during the pass
    pub announced: usize,
}

/// Owner of all monitoring state
pub struct WorkshareMonitor {
    ledger: ActivityLedger,
    predictor: ConflictPredictor,
    advisor: SyncAdvisor,
    hotspots: HotspotAnalyzer,
    pending: RwLock<HashMap<UserId, Vec<PendingChange>>>,
    status: RwLock<HashMap<UserId, SyncStatus>>,
    worksets: RwLock<HashMap<String, WorksetInfo>>,
    /// Levels that were high risk on the previous pass
    notable_levels: RwLock<HashSet<String>>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl WorkshareMonitor {
    pub fn new(config: &MonitorConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            ledger: ActivityLedger::new(config.ledger_capacity),
            predictor: ConflictPredictor::new(config.conflict_window),
            advisor: SyncAdvisor,
            hotspots: HotspotAnalyzer::new(
                config.hotspot_window,
                config.hotspot_min_activity,
                config.hotspot_user_threshold,
            ),
            pending: RwLock::new(HashMap::new()),
            status: RwLock::new(HashMap::new()),
            worksets: RwLock::new(HashMap::new()),
            notable_levels: RwLock::new(HashSet::new()),
            event_tx,
        })
    }

    /// Create a monitor with default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(&MonitorConfig::default())
    }

    /// Subscribe to conflict, advice and hotspot events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    /// Record local or remote activity and check it against everyone's
    /// pending changes straight away.
    ///
    /// Returns the conflicts raised by this activity.
    pub fn record_activity(&self, activity: ElementActivity) -> Vec<ConflictPrediction> {
        debug!(
            element = %activity.element_id,
            user = %activity.user_id,
            kind = %activity.activity_type,
            "Activity recorded"
        );

        if activity.activity_type.is_edit() {
            let now = Utc::now();
            let mut status = self.status.write();
            status
                .entry(activity.user_id.clone())
                .or_insert_with(|| SyncStatus::new(now));
            for (user_id, user_status) in status.iter_mut() {
                if user_id != &activity.user_id {
                    user_status.central_changes_count += 1;
                }
            }
        }

        let predictions = {
            let pending = self.pending.read();
            self.predictor.on_activity(&activity, &pending)
        };
        self.ledger.record(activity);

        for prediction in &predictions {
            warn!(
                element = %prediction.element_id,
                local_user = %prediction.local_user_id,
                remote_user = %prediction.remote_user_id,
                severity = %prediction.severity,
                "Conflict predicted"
            );
            let _ = self
                .event_tx
                .send(MonitorEvent::ConflictPredicted(prediction.clone()));
        }
        predictions
    }

    /// Replace `user_id`'s pending changes as reported by the host editor.
    pub fn set_pending_changes(&self, user_id: &UserId, changes: Vec<PendingChange>) {
        let count = changes.len();
        self.pending.write().insert(user_id.clone(), changes);

        let now = Utc::now();
        self.status
            .write()
            .entry(user_id.clone())
            .or_insert_with(|| SyncStatus::new(now))
            .set_local_changes(count);
    }

    pub fn pending_changes(&self, user_id: &UserId) -> Vec<PendingChange> {
        self.pending.read().get(user_id).cloned().unwrap_or_default()
    }

    /// The user synced: pending changes are gone and counts start over.
    pub fn complete_sync(&self, user_id: &UserId) {
        self.complete_sync_at(user_id, Utc::now());
    }

    pub fn complete_sync_at(&self, user_id: &UserId, now: DateTime<Utc>) {
        self.pending.write().remove(user_id);
        self.status
            .write()
            .entry(user_id.clone())
            .or_insert_with(|| SyncStatus::new(now))
            .mark_synced(now);
        info!(user = %user_id, "Sync completed");
    }

    /// Predict conflicts for one user's pending changes right now.
    pub fn predict(&self, user_id: &UserId) -> Vec<ConflictPrediction> {
        self.predict_at(user_id, Utc::now())
    }

    pub fn predict_at(&self, user_id: &UserId, now: DateTime<Utc>) -> Vec<ConflictPrediction> {
        let pending = self.pending_changes(user_id);
        if pending.is_empty() {
            return Vec::new();
        }
        self.predictor.predict(user_id, &pending, &self.ledger, now)
    }

    pub fn hotspots(&self) -> Vec<ActivityHotspot> {
        self.hotspots.analyze(&self.ledger, Utc::now())
    }

    pub fn sync_status(&self, user_id: &UserId) -> Option<SyncStatus> {
        self.status.read().get(user_id).cloned()
    }

    /// Users with a sync status, sorted
    pub fn tracked_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.status.read().keys().cloned().collect();
        users.sort();
        users
    }

    /// Users with at least one pending change, sorted
    pub fn users_with_pending_changes(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .pending
            .read()
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Replace the workset table with the host editor's current view.
    pub fn update_worksets(&self, worksets: Vec<WorksetInfo>) {
        let table = worksets.into_iter().map(|w| (w.name.clone(), w)).collect();
        *self.worksets.write() = table;
    }

    /// Current borrower of a workset, if anyone holds it
    pub fn workset_owner(&self, name: &str) -> Option<String> {
        self.worksets
            .read()
            .get(name)
            .map(|w| w.owner.clone())
            .filter(|owner| !owner.is_empty())
    }

    pub fn worksets(&self) -> Vec<WorksetInfo> {
        let mut worksets: Vec<WorksetInfo> = self.worksets.read().values().cloned().collect();
        worksets.sort_by(|a, b| a.name.cmp(&b.name));
        worksets
    }

    /// One monitoring pass: hotspots, then predictions for every tracked
    /// user, then advice for every tracked user.
    ///
    /// A hotspot is announced when its level turns high risk, not on every
    /// pass it stays that way.
    pub fn run_pass(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        report.hotspots = self.hotspots.analyze(&self.ledger, now);
        let notable: HashSet<String> = report
            .hotspots
            .iter()
            .filter(|h| h.is_notable())
            .map(|h| h.level.clone())
            .collect();
        let previous = std::mem::replace(&mut *self.notable_levels.write(), notable);
        for hotspot in report
            .hotspots
            .iter()
            .filter(|h| h.is_notable() && !previous.contains(&h.level))
        {
            info!(
                area = %hotspot.area_name,
                activity = hotspot.activity_count,
                users = hotspot.active_users.len(),
                "High-risk activity hotspot"
            );
            let _ = self
                .event_tx
                .send(MonitorEvent::HotspotDetected(hotspot.clone()));
            report.announced += 1;
        }

        // Users whose pending set was emptied get their stale predictions cleared
        let pending_users = self.users_with_pending_changes();
        for user_id in self.tracked_users() {
            let predictions = self.predict_at(&user_id, now);
            if let Some(status) = self.status.write().get_mut(&user_id) {
                status.set_predictions(predictions.clone());
            }
            if pending_users.contains(&user_id) {
                report.predictions.insert(user_id, predictions);
            }
        }

        let mut status = self.status.write();
        for (user_id, user_status) in status.iter_mut() {
            let next = self.advisor.recommend(user_status, now);
            if SyncAdvisor::should_announce(&user_status.recommendation, &next) {
                info!(user = %user_id, text = %next.text, "Sync recommendation");
                let _ = self.event_tx.send(MonitorEvent::SyncRecommended {
                    user_id: user_id.clone(),
                    text: next.text.clone(),
                });
                report.announced += 1;
            }
            user_status.recommendation = next.text.clone();
            report.recommendations.insert(user_id.clone(), next.text);
        }

        report
    }
}
