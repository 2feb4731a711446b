pub mod market;
pub mod recommendation;

pub use market::{EmotionReading, HistoryMessage, InsiderTransaction, NewsItem, Quote, QuoteResult};
pub use recommendation::{Action, Recommendation};
