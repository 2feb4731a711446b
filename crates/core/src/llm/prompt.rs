use crate::llm::{BackendKind, LocalTier, Prompt};

const FULL_FORMAT: &str = "Use this format, one field per line:\n\
ACTION: BUY|SELL|HOLD\n\
ENTRY: [price]\n\
STOP: [price]\n\
TARGET: [price]\n\
DURATION: [timeframe]\n\
CONVICTION: [0-100]%\n\
SUMMARY: [brief analysis in 2-3 sentences]";

const SHORT_FORMAT: &str = "Answer with exactly these lines:\n\
ACTION: BUY|SELL|HOLD\n\
CONVICTION: [0-100]\n\
SUMMARY: [one sentence]";

fn context_budget(kind: BackendKind) -> Option<usize> {
    match kind {
        BackendKind::Hosted | BackendKind::Local(LocalTier::Primary) => None,
        BackendKind::Local(LocalTier::Secondary) => Some(1_500),
        BackendKind::Local(LocalTier::Tertiary) => Some(600),
    }
}

pub fn build_prompt(kind: BackendKind, query: &str, context: Option<&str>) -> Prompt {
    let system = match kind {
        BackendKind::Hosted => format!(
            "You are an expert financial analyst. Analyze the query using the market context \
             provided and give a concrete trading recommendation.\n\n{FULL_FORMAT}"
        ),
        BackendKind::Local(LocalTier::Primary | LocalTier::Secondary) => format!(
            "You are an expert financial trading assistant. Provide a concise trading \
             recommendation. Keep the answer short and actionable.\n\n{FULL_FORMAT}"
        ),
        BackendKind::Local(LocalTier::Tertiary) => {
            format!("You are a trading assistant.\n\n{SHORT_FORMAT}")
        }
    };

    let user = match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => {
            let context = match context_budget(kind) {
                Some(limit) => truncate_chars(context, limit),
                None => context,
            };
            format!("Market context:\n{context}\n\nQuery: {query}")
        }
        None => format!("Query: {query}"),
    };

    Prompt { system, user }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
