use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradedesk_core::desk::TradeDesk;
use tradedesk_core::reasoning::ReasoningError;

#[derive(Debug, Parser)]
#[command(name = "tradedesk")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask for a trading recommendation.
    Analyze {
        query: String,

        /// Overrides ANALYZE_TIMEOUT_SECS.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Call one tool directly and print its JSON result.
    Tool {
        name: String,

        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Probe the browser against its health target.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = tradedesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let desk = Arc::new(TradeDesk::from_settings(&settings)?);

    let result = tokio::select! {
        res = run(&desk, args.command, &settings) => res,
        _ = desk.browser.fatally_failed() => {
            let err = anyhow::anyhow!("browser session fatally failed");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "exiting");
            desk.shutdown().await;
            return Ok(ExitCode::FAILURE);
        }
    };
    desk.shutdown().await;

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

async fn run(
    desk: &TradeDesk,
    command: Command,
    settings: &tradedesk_core::config::Settings,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Analyze {
            query,
            timeout_secs,
        } => {
            match desk.reasoner.configure().await {
                Ok(state) => tracing::info!(?state, "reasoning backend ready"),
                Err(ReasoningError::Config(msg)) => {
                    anyhow::bail!("hosted backend misconfigured: {msg}")
                }
                Err(e) => tracing::warn!(error = %e, "continuing in degraded mode"),
            }

            let timeout = timeout_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or(settings.analyze_timeout);
            let outcome = desk.reasoner.analyze_within(&query, timeout).await;
            println!("{}", outcome.render());
            tracing::info!(retries = desk.reasoner.retry_count(), "analysis finished");
            Ok(match outcome.into_result() {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            })
        }
        Command::Tool { name, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            let output = desk.tools.dispatch(&name, &args).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let healthy = desk.browser.health_check().await?;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
            tracing::info!(
                healthy,
                failures = desk.browser.failure_count(),
                "browser health check"
            );
            Ok(if healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
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
