use crate::llm::BackendKind;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub backend: BackendKind,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn new(backend: BackendKind, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            backend,
            stage,
            detail: detail.into(),
            raw_output: None,
            raw_response_json: None,
        }
    }

    pub fn with_raw(mut self, text: String) -> Self {
        self.raw_response_json = serde_json::from_str::<Value>(&text).ok();
        self.raw_output = Some(text);
        self
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (backend={}, stage={}): {}",
            self.backend, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LocalTier;

    #[test]
    fn keeps_json_body_when_parseable() {
        let err = LlmDiagnosticsError::new(BackendKind::Hosted, "http", "status=429")
            .with_raw(r#"{"error":{"code":429}}"#.to_string());
        assert_eq!(err.raw_response_json.as_ref().unwrap()["error"]["code"], 429);
        assert_eq!(
            err.to_string(),
            "LLM error (backend=hosted, stage=http): status=429"
        );

        let err = LlmDiagnosticsError::new(BackendKind::Local(LocalTier::Tertiary), "load", "oom")
            .with_raw("model runner crashed".to_string());
        assert!(err.raw_response_json.is_none());
        assert!(err.to_string().contains("local-tertiary"));
    }
}
