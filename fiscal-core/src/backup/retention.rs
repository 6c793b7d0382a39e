//! 备份保留策略
//!
//! 保留最新的 `max_count` 份；若设置了 `max_age`，更旧的备份也会被清理。
//! The newest backup is never expired, whatever its age.

use chrono::{DateTime, Duration, Utc};
use shared::models::ManifestEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 至少为 1
    pub max_count: usize,
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: 14,
            max_age: None,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_count: usize, max_age_days: Option<u32>) -> Self {
        Self {
            max_count: max_count.max(1),
            max_age: max_age_days.map(|d| Duration::days(i64::from(d))),
        }
    }

    /// File names of the entries this policy drops at `now`
    pub fn select_expired(&self, entries: &[ManifestEntry], now: DateTime<Utc>) -> Vec<String> {
        let max_count = self.max_count.max(1);

        // Newest first; unparsable timestamps sort as oldest, ties go to the later manifest entry
        let mut ordered: Vec<(usize, &ManifestEntry, Option<DateTime<Utc>>)> = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (pos, e, parse_created_at(&e.created_at)))
            .collect();
        ordered.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| b.0.cmp(&a.0)));

        ordered
            .into_iter()
            .enumerate()
            .filter(|(index, (_, _, created))| {
                if *index == 0 {
                    return false;
                }
                if *index >= max_count {
                    return true;
                }
                match (self.max_age, created) {
                    (Some(max_age), Some(created)) => now - *created > max_age,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
            .map(|(_, (_, entry, _))| entry.file_name.clone())
            .collect()
    }
}

fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
