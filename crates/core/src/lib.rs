pub mod browser;
pub mod context;
pub mod desk;
pub mod domain;
pub mod llm;
pub mod reasoning;
pub mod tools;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_MAX_RETRIES: u32 = 5;
    const DEFAULT_MIN_CONVICTION: u8 = 0;
    const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 300;
    const DEFAULT_ANALYZE_TIMEOUT_SECS: u64 = 180;
    const DEFAULT_BROWSER_MAX_FAILURES: u32 = 3;
    const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_NAV_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub use_hosted: bool,
        pub google_api_key: Option<String>,
        pub ollama_host: String,
        pub max_retries: u32,
        /// Accuracy gate threshold. The default of 0 lets every parsed attempt through.
        pub min_conviction: u8,
        pub load_timeout: Duration,
        pub analyze_timeout: Duration,
        pub browser_max_failures: u32,
        pub browser_health_timeout: Duration,
        pub browser_nav_timeout: Duration,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                use_hosted: false,
                google_api_key: None,
                ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
                max_retries: DEFAULT_MAX_RETRIES,
                min_conviction: DEFAULT_MIN_CONVICTION,
                load_timeout: Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
                analyze_timeout: Duration::from_secs(DEFAULT_ANALYZE_TIMEOUT_SECS),
                browser_max_failures: DEFAULT_BROWSER_MAX_FAILURES,
                browser_health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
                browser_nav_timeout: Duration::from_secs(DEFAULT_NAV_TIMEOUT_SECS),
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                use_hosted: env_flag("USE_GOOGLE_AI"),
                google_api_key: std::env::var("GOOGLE_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                ollama_host: std::env::var("OLLAMA_HOST")
                    .unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
                max_retries: env_parse("REASONER_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
                min_conviction: env_parse::<u8>("REASONER_MIN_CONVICTION")
                    .map(|v| v.min(100))
                    .unwrap_or(DEFAULT_MIN_CONVICTION),
                load_timeout: Duration::from_secs(
                    env_parse("REASONER_LOAD_TIMEOUT_SECS").unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS),
                ),
                analyze_timeout: Duration::from_secs(
                    env_parse("ANALYZE_TIMEOUT_SECS").unwrap_or(DEFAULT_ANALYZE_TIMEOUT_SECS),
                ),
                browser_max_failures: env_parse::<u32>("BROWSER_MAX_FAILURES")
                    .unwrap_or(DEFAULT_BROWSER_MAX_FAILURES)
                    .max(1),
                browser_health_timeout: Duration::from_secs(
                    env_parse("BROWSER_HEALTH_TIMEOUT_SECS").unwrap_or(DEFAULT_HEALTH_TIMEOUT_SECS),
                ),
                browser_nav_timeout: Duration::from_secs(
                    env_parse("BROWSER_NAV_TIMEOUT_SECS").unwrap_or(DEFAULT_NAV_TIMEOUT_SECS),
                ),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_google_api_key(&self) -> anyhow::Result<&str> {
            self.google_api_key
                .as_deref()
                .context("USE_GOOGLE_AI is set but GOOGLE_API_KEY is missing")
        }
    }

    fn env_flag(key: &str) -> bool {
        std::env::var(key)
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                !v.is_empty() && v != "0" && v != "false" && v != "no"
            })
            .unwrap_or(false)
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

}
