use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tradedesk_core::desk::TradeDesk;
use tradedesk_core::domain::Recommendation;
use tradedesk_core::reasoning::ReasoningError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = tradedesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let desk = Arc::new(TradeDesk::from_settings(&settings)?);
    match desk.reasoner.configure().await {
        Ok(state) => tracing::info!(?state, "reasoning backend ready"),
        Err(ReasoningError::Config(msg)) => {
            let err = anyhow::anyhow!("hosted backend misconfigured: {msg}");
            sentry_anyhow::capture_anyhow(&err);
            return Err(err);
        }
        Err(e) => {
            tracing::error!(error = %e, "no reasoning backend; starting API in degraded mode");
        }
    }
    if let Err(e) = desk.browser.start().await {
        tracing::warn!(error = %e, "browser not started; it will be launched on first use");
    }

    let state = AppState {
        desk: Arc::clone(&desk),
        analyze_timeout: settings.analyze_timeout,
    };
    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    tokio::select! {
        res = server => res??,
        _ = desk.browser.fatally_failed() => {
            let err = anyhow::anyhow!("browser session fatally failed");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "exiting");
            desk.shutdown().await;
            std::process::exit(1);
        }
    }

    desk.shutdown().await;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    desk: Arc<TradeDesk>,
    analyze_timeout: Duration,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_tools() -> Json<Value> {
    Json(tradedesk_core::tools::tool_specs())
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let args = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    match state.desk.tools.dispatch(&name, &args).await {
        Ok(output) => Json(output).into_response(),
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "rejected tool call");
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    query: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    request_id: Uuid,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<Recommendation>,
    rendered: String,
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<AnalyzeResponse>) {
    let request_id = Uuid::new_v4();
    let timeout = req
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(state.analyze_timeout);

    let span = tracing::info_span!("analyze", %request_id);
    let outcome = state
        .desk
        .reasoner
        .analyze_within(&req.query, timeout)
        .instrument(span)
        .await;

    let rendered = outcome.render();
    match outcome.into_result() {
        Ok(rec) => (
            StatusCode::OK,
            Json(AnalyzeResponse {
                request_id,
                status: "completed",
                recommendation: Some(rec),
                rendered,
            }),
        ),
        Err(e) => {
            tracing::warn!(%request_id, error = %e, "analysis did not complete");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(AnalyzeResponse {
                    request_id,
                    status: "timed_out",
                    recommendation: None,
                    rendered,
                }),
            )
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &tradedesk_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use tradedesk_core::browser::driver::{BrowserHandle, BrowserLauncher};
    use tradedesk_core::browser::{BrowserSession, BrowserSessionConfig};
    use tradedesk_core::domain::NewsItem;
    use tradedesk_core::llm::{BackendKind, Prompt, ReasoningBackend};
    use tradedesk_core::reasoning::{BackendSelection, PipelineConfig};
    use tradedesk_core::tools::news::NewsSearch;

    struct NoBrowser;

    #[async_trait::async_trait]
    impl BrowserLauncher for NoBrowser {
        async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
            anyhow::bail!("no chromium in tests")
        }
    }

    struct NoNews;

    #[async_trait::async_trait]
    impl NewsSearch for NoNews {
        fn provider_name(&self) -> &'static str {
            "none"
        }

        async fn search(&self, _query: &str, _max_results: usize) -> anyhow::Result<Vec<NewsItem>> {
            Ok(Vec::new())
        }
    }

    struct Confident;

    #[async_trait::async_trait]
    impl ReasoningBackend for Confident {
        fn kind(&self) -> BackendKind {
            BackendKind::Hosted
        }

        async fn generate(&self, _prompt: &Prompt) -> anyhow::Result<String> {
            Ok("ACTION: BUY\nENTRY: 100\nSTOP: 95\nTARGET: 115\nDURATION: 1 month\nCONVICTION: 80\nSUMMARY: Trend intact.".to_string())
        }
    }

    fn test_app() -> Router {
        let browser = Arc::new(BrowserSession::new(
            Arc::new(NoBrowser),
            BrowserSessionConfig::default(),
        ));
        let selection = BackendSelection::Hosted(Arc::new(
            || -> anyhow::Result<Arc<dyn ReasoningBackend>> { Ok(Arc::new(Confident) as Arc<dyn ReasoningBackend>) },
        ));
        let desk = TradeDesk::assemble(browser, Arc::new(NoNews), selection, PipelineConfig::default());
        router(AppState {
            desk: Arc::new(desk),
            analyze_timeout: Duration::from_secs(5),
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let res = test_app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (status, body) = post_json(test_app(), "/tools/unknown_tool", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("unknown_tool"));
    }

    #[tokio::test]
    async fn quote_without_symbol_is_error_tagged() {
        let (status, body) = post_json(test_app(), "/tools/scrape_quote", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"symbol": "", "error": "missing required argument: symbol"}));
    }

    #[tokio::test]
    async fn analyze_returns_rendered_recommendation() {
        let (status, body) =
            post_json(test_app(), "/analyze", json!({"query": "what about the market?"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["recommendation"]["action"], "BUY");
        assert_eq!(body["recommendation"]["conviction"], 80);
        let rendered = body["rendered"].as_str().unwrap();
        assert_eq!(rendered.lines().count(), 7);
        assert!(rendered.contains("💡 CONVICTION: 80 % (bullish)"));
    }
}
