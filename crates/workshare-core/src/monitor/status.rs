//! Per-user synchronization status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::predictor::ConflictPrediction;

/// Whether a user has unsynced work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    UpToDate,
    LocalChanges,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::UpToDate => write!(f, "Up to date"),
            SyncState::LocalChanges => write!(f, "Local changes"),
        }
    }
}

/// Synchronization state tracked for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub local_changes_count: usize,
    /// Edits by other users since this user's last sync
    pub central_changes_count: usize,
    pub potential_conflicts: usize,
    pub predicted_conflicts: Vec<ConflictPrediction>,
    pub last_sync_time: DateTime<Utc>,
    pub state: SyncState,
    pub recommendation: String,
}

impl SyncStatus {
    /// Fresh status; tracking starts counting from `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            local_changes_count: 0,
            central_changes_count: 0,
            potential_conflicts: 0,
            predicted_conflicts: Vec::new(),
            last_sync_time: now,
            state: SyncState::UpToDate,
            recommendation: String::new(),
        }
    }

    pub fn set_local_changes(&mut self, count: usize) {
        self.local_changes_count = count;
        self.state = if count > 0 {
            SyncState::LocalChanges
        } else {
            SyncState::UpToDate
        };
    }

    pub fn set_predictions(&mut self, predictions: Vec<ConflictPrediction>) {
        self.potential_conflicts = predictions.len();
        self.predicted_conflicts = predictions;
    }

    /// Reset after the user synced with the central model.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.local_changes_count = 0;
        self.central_changes_count = 0;
        self.potential_conflicts = 0;
        self.predicted_conflicts.clear();
        self.last_sync_time = now;
        self.state = SyncState::UpToDate;
    }
}
