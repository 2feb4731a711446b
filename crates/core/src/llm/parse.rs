use crate::domain::recommendation::FALLBACK_DURATION;
use crate::domain::{Action, Recommendation};
use crate::llm::BackendKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Action,
    Entry,
    Stop,
    Target,
    Duration,
    Conviction,
    Summary,
}

const LABELS: [(&str, Field); 8] = [
    ("ACTION", Field::Action),
    ("ENTRY", Field::Entry),
    ("STOP", Field::Stop),
    ("TARGET", Field::Target),
    ("DURATION", Field::Duration),
    ("CONVICTION", Field::Conviction),
    ("CONFIDENCE", Field::Conviction),
    ("SUMMARY", Field::Summary),
];

impl Field {
    fn from_label(label: &str) -> Option<Field> {
        LABELS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, field)| *field)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Action => "action",
            Field::Entry => "entry",
            Field::Stop => "stop",
            Field::Target => "target",
            Field::Duration => "duration",
            Field::Conviction => "conviction",
            Field::Summary => "summary",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldParseError {
    #[error("{field}: no number in {raw:?}")]
    NotANumber { field: Field, raw: String },

    #[error("{field}: price must be finite and non-negative, got {value}")]
    OutOfRange { field: Field, value: f64 },

    #[error("{field}: no digits in {raw:?}")]
    NoDigits { field: Field, raw: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseDefaults {
    pub conviction: u8,
    pub summary: String,
}

impl ParseDefaults {
    pub fn for_backend(kind: BackendKind) -> Self {
        Self {
            conviction: kind.default_conviction(),
            summary: format!("Analysis generated by the {}.", kind.display_name()),
        }
    }
}

pub fn parse_recommendation(text: &str, defaults: &ParseDefaults) -> Recommendation {
    let body = strip_fences(text);
    let extracted = if body.lines().any(|line| split_label(line).is_some()) {
        line_fields(body)
    } else {
        inline_fields(body)
    };

    let mut action = if extracted.fields.is_empty() {
        Action::from_text(body)
    } else {
        Action::Hold
    };
    let (mut entry, mut stop, mut target) = (0.0, 0.0, 0.0);
    let mut duration = FALLBACK_DURATION.to_string();
    let mut conviction = u32::from(defaults.conviction);
    let mut summary: Option<String> = None;

    for (field, value) in &extracted.fields {
        let applied = match field {
            Field::Action => {
                action = Action::from_text(value);
                Ok(())
            }
            Field::Entry => parse_price(*field, value).map(|v| entry = v),
            Field::Stop => parse_price(*field, value).map(|v| stop = v),
            Field::Target => parse_price(*field, value).map(|v| target = v),
            Field::Duration => {
                if !value.is_empty() {
                    duration = value.clone();
                }
                Ok(())
            }
            Field::Conviction => parse_conviction(value).map(|v| conviction = v),
            Field::Summary => {
                if !value.is_empty() {
                    summary = Some(value.clone());
                }
                Ok(())
            }
        };
        if let Err(err) = applied {
            tracing::warn!(field = %field, error = %err, "failed to parse response field; keeping default");
        }
    }

    let summary = summary
        .or_else(|| Some(extracted.free.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| defaults.summary.clone());

    Recommendation::new(action, entry, stop, target, duration, conviction, summary)
}

#[derive(Debug, Default)]
struct Extracted {
    fields: Vec<(Field, String)>,
    free: String,
}

fn line_fields(body: &str) -> Extracted {
    let mut out = Extracted::default();
    let mut free = Vec::new();
    for line in body.lines() {
        match split_label(line) {
            Some((field, value)) => {
                // Further labels on the same line start their own fields.
                let rest = inline_fields(value);
                out.fields.push((field, rest.free));
                out.fields.extend(rest.fields);
            }
            None => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Unlabelled lines after SUMMARY continue it.
                match out.fields.last_mut() {
                    Some((Field::Summary, summary)) => {
                        if !summary.is_empty() {
                            summary.push(' ');
                        }
                        summary.push_str(line);
                    }
                    _ => free.push(line),
                }
            }
        }
    }
    out.free = free.join(" ");
    out
}

fn split_label(line: &str) -> Option<(Field, &str)> {
    let line = line.trim().trim_start_matches(['*', '#', '-', '>', ' ']);
    let (label, value) = line.split_once(':')?;
    let field = Field::from_label(label.trim().trim_matches('*'))?;
    Some((field, value.trim().trim_matches('*').trim()))
}

fn inline_fields(body: &str) -> Extracted {
    // ASCII uppercasing keeps byte offsets aligned with `body`.
    let upper = body.to_ascii_uppercase();
    let mut hits: Vec<(usize, usize, Field)> = Vec::new();
    for (label, field) in LABELS {
        let needle = format!("{label}:");
        for (pos, _) in upper.match_indices(&needle) {
            let at_boundary = upper[..pos]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_ascii_alphanumeric());
            if at_boundary {
                hits.push((pos, pos + needle.len(), field));
            }
        }
    }
    hits.sort_by_key(|(pos, _, _)| *pos);

    let first = hits.first().map_or(body.len(), |(pos, _, _)| *pos);
    let fields = hits
        .iter()
        .enumerate()
        .map(|(i, (_, value_start, field))| {
            let end = hits.get(i + 1).map_or(body.len(), |(pos, _, _)| *pos);
            (*field, body[*value_start..end].trim().to_string())
        })
        .collect();
    Extracted {
        fields,
        free: body[..first].trim().to_string(),
    }
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let mut inner = trimmed;
    if let Some((_, after_first)) = inner.split_once('\n') {
        inner = after_first;
    }
    if let Some(end) = inner.rfind("```") {
        inner = &inner[..end];
    }
    inner.trim()
}

fn parse_price(field: Field, raw: &str) -> Result<f64, FieldParseError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
        .collect();
    let numeric = cleaned
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .map_or(cleaned.as_str(), |end| &cleaned[..end])
        .trim_end_matches('.');

    let value: f64 = numeric.parse().map_err(|_| FieldParseError::NotANumber {
        field,
        raw: raw.to_string(),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(FieldParseError::OutOfRange { field, value });
    }
    Ok(value)
}

fn parse_conviction(raw: &str) -> Result<u32, FieldParseError> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Err(FieldParseError::NoDigits {
            field: Field::Conviction,
            raw: raw.to_string(),
        });
    }
    // Overlong digit runs saturate and are clamped with everything else.
    Ok(digits.parse::<u32>().unwrap_or(u32::MAX).min(100))
}
