//! Plain-text subject and body for each notification type.
//!
//! Payloads are opaque to the scheduler, so every field read here is optional
//! and falls back to neutral wording when absent.

use serde_json::Value;

use pastime_common::types::{NotificationType, QueueEntry};

use crate::aggregator::ACHIEVEMENTS_KEY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub body: String,
}

pub fn compose(entry: &QueueEntry) -> ComposedMessage {
    let payload = &entry.payload;
    let (subject, body) = match entry.notification_type {
        NotificationType::AchievementDigest => {
            let titles: Vec<String> = payload
                .get(ACHIEVEMENTS_KEY)
                .and_then(Value::as_array)
                .map(|items| items.iter().map(achievement_line).collect())
                .unwrap_or_default();

            let subject = match titles.as_slice() {
                [] => "Your achievements today".to_string(),
                [only] => format!("Achievement unlocked: {only}"),
                many => format!("You unlocked {} achievements today", many.len()),
            };
            let mut body = String::from("Here is what you accomplished today:\n\n");
            for title in &titles {
                body.push_str("  - ");
                body.push_str(title);
                body.push('\n');
            }
            (subject, body)
        }
        NotificationType::StreakMilestone => {
            let days = int_field(payload, "streak_days");
            let hobby = str_field(payload, "hobby");
            let subject = match days {
                Some(d) => format!("{d}-day streak!"),
                None => "Streak milestone reached!".to_string(),
            };
            let body = match (days, hobby) {
                (Some(d), Some(h)) => {
                    format!("You've practiced {h} for {d} days in a row. Keep it going!")
                }
                (Some(d), None) => format!("You've kept your streak alive for {d} days. Keep it going!"),
                _ => "You hit a new streak milestone. Keep it going!".to_string(),
            };
            (subject, body)
        }
        NotificationType::WeeklySummary => {
            let minutes = int_field(payload, "total_minutes").unwrap_or(0);
            let sessions = int_field(payload, "sessions").unwrap_or(0);
            let active_days = int_field(payload, "active_days").unwrap_or(0);

            let mut body = if sessions == 0 {
                "You didn't log any sessions last week. A fresh week starts now!".to_string()
            } else {
                format!(
                    "Last week you logged {sessions} sessions over {active_days} days, {} in total.",
                    format_minutes(minutes)
                )
            };
            if let Some(hobby) = str_field(payload, "top_hobby") {
                body.push_str(&format!("\nMost practiced: {hobby}."));
            }
            ("Your week in hobbies".to_string(), body)
        }
        NotificationType::ReEngagement => {
            let body = match int_field(payload, "days_inactive") {
                Some(days) => format!(
                    "It's been {days} days since your last session. Your hobbies miss you!"
                ),
                None => "It's been a while since your last session. Your hobbies miss you!"
                    .to_string(),
            };
            ("We miss you".to_string(), body)
        }
    };

    ComposedMessage { subject, body }
}

fn achievement_line(item: &Value) -> String {
    let title = item
        .get("title")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str)
        .or_else(|| item.as_str())
        .unwrap_or("New achievement");
    match item.get("description").and_then(Value::as_str) {
        Some(description) => format!("{title}: {description}"),
        None => title.to_string(),
    }
}

fn int_field(payload: &Value, key: &str) -> Option<i64> {
    payload.get(key).and_then(Value::as_i64)
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn format_minutes(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    }
}
