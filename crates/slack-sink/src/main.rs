mod app_config;
mod config;
mod delivery;
mod endpoint;
mod host;
mod render;
mod schema;
mod transport;
mod tuple;

#[cfg(test)]
mod testing;

use app_config::FileConfigStore;
use delivery::{InitError, SinkOptions, SlackSink, StageContext};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transport::{HttpSettings, HttpTransport};

/// Log why the sink cannot start, for example a missing web-hook URL or an
/// unsupported input schema, and exit with status 1.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("SLACK_SINK_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid SLACK_SINK_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

/// Cancel `token` on Ctrl-C, or SIGTERM on unix.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        let _ = tokio::signal::ctrl_c().await;

        info!("shutdown requested");
        token.cancel();
    });
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = config::Config::from_env()
        .unwrap_or_else(|e| fatal("invalid configuration", &e));

    let transport = HttpTransport::new(HttpSettings::from(&config))
        .unwrap_or_else(|e| fatal("failed to initialize stage", &InitError::from(e)));
    let store = FileConfigStore::new(&config.app_config_dir);

    let context = StageContext {
        name: config.stage_name.clone(),
        schema: config.schema.clone(),
    };
    let sink = SlackSink::initialize(&context, SinkOptions::from(&config), store, transport)
        .await
        .unwrap_or_else(|e| fatal("failed to initialize stage", &e));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let input = BufReader::new(tokio::io::stdin());
    let undelivered = host::run(sink, &config.schema, input, config.retry_interval, cancel).await;
    if undelivered > 0 {
        warn!(undelivered, "stopped with tuples still queued");
    }
}
