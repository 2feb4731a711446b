use serde::Serialize;
use std::fmt;

pub const FALLBACK_DURATION: &str = "N/A";
pub const INSUFFICIENT_CONFIDENCE_SUMMARY: &str = "Insufficient confidence to recommend trade.";
pub const MODEL_UNAVAILABLE_SUMMARY: &str = "Model not available. Unable to provide specific trading recommendation. \
This is a fallback response because no reasoning backend could be loaded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn from_text(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        [Action::Buy, Action::Sell, Action::Hold]
            .into_iter()
            .filter_map(|action| upper.find(action.as_str()).map(|pos| (pos, action)))
            .min_by_key(|(pos, _)| *pos)
            .map_or(Action::Hold, |(_, action)| action)
    }

    fn sentiment(self) -> &'static str {
        match self {
            Action::Buy => "bullish",
            Action::Sell => "bearish",
            Action::Hold => "neutral",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trading recommendation. Fields are private so the price and conviction
/// bounds hold for every value that exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    action: Action,
    entry: f64,
    stop: f64,
    target: f64,
    duration: String,
    conviction: u8,
    summary: String,
}

impl Recommendation {
    pub fn new(
        action: Action,
        entry: f64,
        stop: f64,
        target: f64,
        duration: impl Into<String>,
        conviction: u32,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            action,
            entry: sanitize_price(entry),
            stop: sanitize_price(stop),
            target: sanitize_price(target),
            duration: duration.into(),
            conviction: conviction.min(100) as u8,
            summary: summary.into(),
        }
    }

    pub fn fallback(summary: impl Into<String>) -> Self {
        Self::new(Action::Hold, 0.0, 0.0, 0.0, FALLBACK_DURATION, 0, summary)
    }

    pub fn insufficient_confidence() -> Self {
        Self::fallback(INSUFFICIENT_CONFIDENCE_SUMMARY)
    }

    pub fn model_unavailable() -> Self {
        Self::fallback(MODEL_UNAVAILABLE_SUMMARY)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn conviction(&self) -> u8 {
        self.conviction
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn render(&self) -> String {
        format!(
            "🎯 ACTION: {}\n\
             📍 ENTRY:  ${:.2}\n\
             🛑 STOP:   ${:.2}\n\
             🎁 TARGET: ${:.2}\n\
             ⏱️  DURATION: {}\n\
             💡 CONVICTION: {} % ({})\n\
             📊 SUMMARY: {}",
            self.action,
            self.entry,
            self.stop,
            self.target,
            single_line(&self.duration),
            self.conviction,
            self.action.sentiment(),
            single_line(&self.summary),
        )
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn sanitize_price(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
