//! host process for the account library. it loads config, prepares the
//! configured user store and runs the background jobs until ctrl-c. the
//! account operations themselves are reached through the `vibe` library
//! crate.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{FmtSubscriber, EnvFilter};
use futures::StreamExt;

use vibe::{config, error, jobs, state};

fn main() {
    use tokio::runtime::Builder;

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .expect("failed to initialize global tracing subscriber");

    let rt = match Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .max_blocking_threads(4)
        .build() {
        Ok(rt) => rt,
        Err(err) => {
            panic!("failed to start tokio runtime. {}", err);
        }
    };

    tracing::event!(
        tracing::Level::INFO,
        "started tokio runtime"
    );

    if let Err(err) = rt.block_on(init()) {
        tracing::error!("{err}");
    }
}

async fn init() -> error::Result<()> {
    let args = config::CliArgs::parse();
    let config = config::Config::from_args(args)?;
    let state = Arc::new(state::Shared::from_config(&config)?);

    state.setup().await?;

    let mut all_futs = jobs::background(&state, &config)?;

    tracing::info!("account service ready");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;

                tracing::info!("shutting down");

                break;
            },
            finished = all_futs.next() => {
                if finished.is_none() {
                    break;
                }
            }
        }
    }

    Ok(())
}
