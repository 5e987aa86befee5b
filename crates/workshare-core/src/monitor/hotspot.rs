//! Activity hotspots: levels where several people are editing at once

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::ActivityLedger;
use crate::config::{DEFAULT_HOTSPOT_MIN_ACTIVITY, DEFAULT_HOTSPOT_USER_THRESHOLD, DEFAULT_HOTSPOT_WINDOW};
use crate::types::{ElementActivity, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictRisk {
    Normal,
    High,
}

/// A level with concentrated activity in the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityHotspot {
    pub area_name: String,
    pub level: String,
    pub activity_count: usize,
    pub active_users: BTreeSet<UserId>,
    pub conflict_risk: ConflictRisk,
}

impl ActivityHotspot {
    /// Only high-risk hotspots are worth a notification
    pub fn is_notable(&self) -> bool {
        self.conflict_risk == ConflictRisk::High
    }
}

#[derive(Debug, Clone)]
pub struct HotspotAnalyzer {
    window: Duration,
    min_activity: usize,
    user_threshold: usize,
}

impl HotspotAnalyzer {
    pub fn new(window: Duration, min_activity: usize, user_threshold: usize) -> Self {
        Self {
            window,
            min_activity,
            user_threshold,
        }
    }

    pub fn analyze(&self, ledger: &ActivityLedger, now: DateTime<Utc>) -> Vec<ActivityHotspot> {
        let mut by_level: HashMap<String, Vec<ElementActivity>> = HashMap::new();
        for activity in ledger.active_since(self.window, now) {
            by_level
                .entry(activity.level_name.clone())
                .or_default()
                .push(activity);
        }

        let mut hotspots: Vec<ActivityHotspot> = by_level
            .into_iter()
            .filter(|(_, group)| group.len() >= self.min_activity)
            .map(|(level, group)| {
                let active_users: BTreeSet<UserId> =
                    group.iter().map(|a| a.user_id.clone()).collect();
                let conflict_risk = if active_users.len() > self.user_threshold {
                    ConflictRisk::High
                } else {
                    ConflictRisk::Normal
                };
                ActivityHotspot {
                    area_name: area_name(&level, &group),
                    level,
                    activity_count: group.len(),
                    active_users,
                    conflict_risk,
                }
            })
            .collect();

        hotspots.sort_by(|a, b| {
            b.activity_count
                .cmp(&a.activity_count)
                .then_with(|| a.level.cmp(&b.level))
        });
        hotspots
    }
}

impl Default for HotspotAnalyzer {
    fn default() -> Self {
        Self::new(
            DEFAULT_HOTSPOT_WINDOW,
            DEFAULT_HOTSPOT_MIN_ACTIVITY,
            DEFAULT_HOTSPOT_USER_THRESHOLD,
        )
    }
}

/// "Level 2 (Walls)": the level plus its most edited category.
fn area_name(level: &str, group: &[ElementActivity]) -> String {
    let level = if level.is_empty() { "Unplaced" } else { level };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for activity in group.iter().filter(|a| !a.category.is_empty()) {
        *counts.entry(activity.category.as_str()).or_default() += 1;
    }
    let dominant = counts
        .into_iter()
        .max_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| b_name.cmp(a_name)));

    match dominant {
        Some((category, _)) => format!("{level} ({category})"),
        None => level.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityType;

    fn record(ledger: &ActivityLedger, level: &str, user: &str, category: &str, minutes_ago: i64, now: DateTime<Utc>) {
        ledger.record(
            ElementActivity::new(format!("{level}-{user}-{minutes_ago}").as_str(), user, ActivityType::Modified)
                .with_level(level)
                .with_category(category)
                .at(now - chrono::Duration::minutes(minutes_ago)),
        );
    }

    #[test]
    fn test_below_threshold_is_not_a_hotspot() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for i in 0..4 {
            record(&ledger, "Level 1", ["a", "b", "c", "d"][i], "Walls", i as i64, now);
        }
        assert!(HotspotAnalyzer::default().analyze(&ledger, now).is_empty());
    }

    #[test]
    fn test_six_activities_three_users_is_high_risk() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for (i, user) in ["a", "b", "c", "a", "b", "c"].iter().enumerate() {
            record(&ledger, "Level 2", user, "Walls", i as i64, now);
        }

        let hotspots = HotspotAnalyzer::default().analyze(&ledger, now);
        assert_eq!(hotspots.len(), 1);
        let hotspot = &hotspots[0];
        assert_eq!(hotspot.level, "Level 2");
        assert_eq!(hotspot.area_name, "Level 2 (Walls)");
        assert_eq!(hotspot.activity_count, 6);
        assert_eq!(hotspot.active_users.len(), 3);
        assert_eq!(hotspot.conflict_risk, ConflictRisk::High);
        assert!(hotspot.is_notable());
    }

    #[test]
    fn test_two_users_is_normal_risk() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for i in 0..5 {
            record(&ledger, "Roof", ["a", "b"][i % 2], "Roofs", i as i64, now);
        }

        let hotspots = HotspotAnalyzer::default().analyze(&ledger, now);
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].conflict_risk, ConflictRisk::Normal);
        assert!(!hotspots[0].is_notable());
    }

    #[test]
    fn test_activity_outside_window_is_ignored() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for i in 0..6 {
            record(&ledger, "Level 3", ["a", "b", "c"][i % 3], "Floors", 16 + i as i64, now);
        }
        assert!(HotspotAnalyzer::default().analyze(&ledger, now).is_empty());
    }

    #[test]
    fn test_area_name_without_categories() {
        let ledger = ActivityLedger::new(100);
        let now = Utc::now();
        for i in 0..5 {
            record(&ledger, "", "a", "", i as i64, now);
        }
        let hotspots = HotspotAnalyzer::default().analyze(&ledger, now);
        assert_eq!(hotspots[0].area_name, "Unplaced");
    }
}
