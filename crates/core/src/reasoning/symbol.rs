const NOT_TICKERS: &[&str] = &[
    "A", "AI", "AM", "AN", "AND", "ARE", "AS", "AT", "ATH", "BE", "BUY", "BY", "CAN", "CEO", "CFO",
    "DO", "EOD", "EPS", "ETF", "FOR", "FYI", "HOLD", "HOW", "I", "IF", "IMO", "IN", "IPO", "IS",
    "IT", "LONG", "ME", "MY", "NO", "NOT", "NOW", "OF", "OK", "ON", "OR", "PE", "PLS", "SELL",
    "SHORT", "SO", "THE", "TO", "UP", "USD", "WE", "WHAT", "WHEN", "WHY", "YTD",
];

const MAX_TICKER_LEN: usize = 5;

pub fn detect_symbol(query: &str) -> Option<String> {
    let cashtag = query.split_whitespace().find_map(|token| {
        let rest = token.strip_prefix('$')?;
        let symbol: String = rest.chars().take_while(char::is_ascii_alphabetic).collect();
        (1..=MAX_TICKER_LEN)
            .contains(&symbol.len())
            .then(|| symbol.to_ascii_uppercase())
    });
    if cashtag.is_some() {
        return cashtag;
    }

    query
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .find(|word| {
            (1..=MAX_TICKER_LEN).contains(&word.len())
                && word.chars().all(|c| c.is_ascii_uppercase())
                && !NOT_TICKERS.contains(word)
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_bare_ticker_after_stop_words() {
        assert_eq!(detect_symbol("AAPL?").as_deref(), Some("AAPL"));
        assert_eq!(detect_symbol("Should I BUY TSLA now?").as_deref(), Some("TSLA"));
        assert_eq!(detect_symbol("is (MSFT) a hold").as_deref(), Some("MSFT"));
    }

    #[test]
    fn cashtag_wins() {
        assert_eq!(detect_symbol("IBM or $nvda this week?").as_deref(), Some("NVDA"));
        assert_eq!(detect_symbol("$100 into GOOG").as_deref(), Some("GOOG"));
    }

    #[test]
    fn no_symbol_in_plain_question() {
        assert_eq!(detect_symbol("what do you think about the market today"), None);
        assert_eq!(detect_symbol("WHAT IS THE CEO UP TO"), None);
        assert_eq!(detect_symbol("GOOGLE earnings"), None);
    }
}
