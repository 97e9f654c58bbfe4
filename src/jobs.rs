use std::str::FromStr;
use std::sync::Arc;
use std::future::Future;

use chrono::{Local, TimeDelta};
use futures::stream::FuturesUnordered;
use tracing::Instrument;
use tokio::task::JoinHandle;

use crate::config;
use crate::state::ArcShared;
use crate::error::{self, Context};

mod tokens;

// sec  min   hour    day of month   month   day of week   year
// 0    30    9,12,15     1,15       May-Aug  Mon,Wed,Fri  2018/2

async fn job_task<F, T>(
    state: ArcShared,
    upcoming: cron::OwnedScheduleIterator<Local>,
    runner: F
) -> error::Result<()>
where
    T: Future<Output = error::Result<()>>,
    F: Fn(ArcShared) -> T,
{
    let zero_delta = TimeDelta::zero();

    for next in upcoming {
        let delta = next - Local::now();

        if delta < zero_delta {
            continue;
        }

        let Ok(wait) = delta.to_std() else {
            continue;
        };

        tracing::debug!("waiting for {delta}");

        tokio::time::sleep(wait).await;

        tracing::debug!("running job");

        if let Err(err) = runner(Arc::clone(&state)).await {
            tracing::error!("failed with error: {err}");
        }
    }

    tracing::info!("job finished");

    Ok(())
}

fn spawn_job<F, T>(
    state: &ArcShared,
    name: &'static str,
    crontab: &str,
    runner: F
) -> error::Result<JoinHandle<()>>
where
    T: Future<Output = error::Result<()>> + Send,
    F: Fn(ArcShared) -> T + Send + 'static,
{
    let local_state = Arc::clone(state);

    let schedule = cron::Schedule::from_str(crontab)
        .context(format!("failed to parse crontab for job {name}"))?;

    let upcoming = schedule.upcoming_owned(Local);

    Ok(tokio::spawn(async move {
        let job_span = tracing::span!(
            tracing::Level::INFO,
            "job",
            name = name
        );

        let result = job_task(local_state, upcoming, runner)
            .instrument(job_span)
            .await;

        if let Err(err) = result {
            tracing::error!("job {name} failed with error {err}");
        }
    }))
}

pub fn background(state: &ArcShared, config: &config::Config) -> error::Result<FuturesUnordered<JoinHandle<()>>> {
    let waiter = FuturesUnordered::new();

    waiter.push(spawn_job(state, "token_sweep", &config.settings.jobs.token_sweep, tokens::sweep)?);

    Ok(waiter)
}
