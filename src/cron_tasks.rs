use crate::Config;
use crate::config::CleanupConfig;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::refresh_token::RefreshTokenRepository;
use crate::db::init_pool;
use crate::service::session::sweep_refresh_tokens;
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct SweepResult {
    pub tokens_deleted: u64,
}

/// One-shot sweep used by the `cron` binary.
pub async fn sweep_sessions(config: &Config) -> Result<SweepResult, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let result = sweep_refresh_tokens(&repo)
        .await
        .map_err(|err| format!("Failed to sweep refresh tokens: {err:?}"));

    pool.close().await;

    Ok(SweepResult { tokens_deleted: result? })
}

/// Runs a single scheduled sweep. Failures are logged and the cycle is skipped.
pub async fn run_sweep_cycle<R: RefreshTokenRepository>(repo: &R) -> Option<u64> {
    match sweep_refresh_tokens(repo).await {
        Ok(deleted) => Some(deleted),
        Err(err) => {
            error!(error = ?err, "refresh token sweep failed; retrying next cycle");
            None
        }
    }
}

/// Spawns the periodic sweep once the server has launched.
pub fn stage_session_sweeper(cleanup: CleanupConfig) -> AdHoc {
    AdHoc::on_liftoff("Session Sweeper", move |rocket| {
        Box::pin(async move {
            if !cleanup.enabled {
                info!("session sweeper disabled");
                return;
            }

            let Some(pool) = rocket.state::<PgPool>() else {
                error!("session sweeper not started: no database pool");
                return;
            };

            let repo = PostgresRepository { pool: pool.clone() };
            let period = Duration::from_secs(cleanup.interval_seconds.max(1));
            let shutdown = rocket.shutdown();

            info!(interval_seconds = period.as_secs(), "session sweeper started");
            tokio::spawn(async move {
                tokio::pin!(shutdown);
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            run_sweep_cycle(&repo).await;
                        }
                        _ = &mut shutdown => break,
                    }
                }
            });
        })
    })
}
