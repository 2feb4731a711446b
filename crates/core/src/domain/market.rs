use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTransaction {
    pub date: String,
    pub ticker: String,
    pub company: String,
    pub insider: String,
    pub title: String,
    pub transaction_type: String,
    pub price: String,
    pub qty: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Option<String>,
    pub change: Option<String>,
    pub change_percent: Option<String>,
    pub market_cap: Option<String>,
    pub volume: Option<String>,
    pub pe_ratio: Option<String>,
}

impl Quote {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn has_data(&self) -> bool {
        [
            &self.price,
            &self.change,
            &self.change_percent,
            &self.market_cap,
            &self.volume,
            &self.pe_ratio,
        ]
        .iter()
        .any(|f| f.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteResult {
    Failed { symbol: String, error: String },
    Data(Quote),
}

impl QuoteResult {
    pub fn failed(symbol: impl Into<String>, error: impl Into<String>) -> Self {
        QuoteResult::Failed {
            symbol: symbol.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl NewsItem {
    pub fn placeholder(query: &str) -> Self {
        Self {
            title: format!("News article about {query}"),
            url: "https://example.com/news".to_string(),
            snippet: format!("This is a placeholder news article about {query}."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub file: String,
    pub emotion: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: u32,
    pub text: String,
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_quote_serializes_as_symbol_and_error() {
        let v = serde_json::to_value(QuoteResult::failed("AAPL", "Browser not available")).unwrap();
        assert_eq!(v, json!({"symbol": "AAPL", "error": "Browser not available"}));
    }

    #[test]
    fn quote_data_serializes_flat() {
        let quote = Quote {
            price: Some("189.10".to_string()),
            ..Quote::empty("MSFT")
        };
        let v = serde_json::to_value(QuoteResult::Data(quote)).unwrap();
        assert_eq!(v["symbol"], "MSFT");
        assert_eq!(v["price"], "189.10");
        assert!(v["pe_ratio"].is_null());
        assert!(v.get("error").is_none());
    }

    #[test]
    fn empty_quote_has_no_data() {
        assert!(!Quote::empty("TSLA").has_data());
    }
}
