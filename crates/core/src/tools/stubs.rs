use crate::domain::{EmotionReading, HistoryMessage};
use chrono::{Duration, Utc};
use serde_json::Value;

pub const MAX_HISTORY: usize = 5;
const FILE_KEYS: [&str; 3] = ["file", "path", "audio"];

pub fn audio_emotion(args: &Value) -> EmotionReading {
    let file = FILE_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    tracing::warn!(file = %file, "audio emotion detection is stubbed; returning neutral");
    EmotionReading {
        file,
        emotion: "neutral".to_string(),
        confidence: 0.5,
    }
}

pub fn message_history(args: &Value) -> Vec<HistoryMessage> {
    let limit = match args.get("limit") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(MAX_HISTORY)
    .min(MAX_HISTORY);

    let now = Utc::now();
    (0..limit)
        .map(|i| HistoryMessage {
            id: i as u32 + 1,
            text: format!("Sample message {}", i + 1),
            date: (now - Duration::minutes(i as i64)).to_rfc3339(),
        })
        .collect()
}
