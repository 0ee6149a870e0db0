//! Process-wide connection pool management.
//!
//! The gateway holds exactly one pooled connection handle for the lifetime of
//! the process. It is created lazily on first acquisition from settings
//! installed at startup, and every component re-acquires it per call rather
//! than holding a reference. First-use creation is single-flight: concurrent
//! callers that find no pool queue behind one initialization attempt.

use crate::config::{DatabaseBackend, DatabaseSettings};
use crate::error::{ApiError, ApiResult};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The shared pooled connection handle.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DbPool {
    /// Close the underlying pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
        }
    }

    /// Backend served by this pool.
    pub fn backend(&self) -> DatabaseBackend {
        match self {
            DbPool::Postgres(_) => DatabaseBackend::Postgres,
            DbPool::MySql(_) => DatabaseBackend::MySql,
        }
    }
}

static SETTINGS: OnceLock<DatabaseSettings> = OnceLock::new();
static POOL: Mutex<Option<DbPool>> = Mutex::const_new(None);

/// Install the database settings the pool will be built from.
///
/// Runs once at startup, before any traffic is served. Later calls are
/// ignored; the configuration is static for the process lifetime.
pub fn install(settings: DatabaseSettings) {
    let _ = SETTINGS.set(settings);
}

/// Get the shared pool, creating it on first use.
///
/// Callers during first creation are funneled through a single
/// initialization attempt; exactly one pool is ever built. A failed attempt
/// leaves the slot empty so a later call can retry.
pub async fn acquire() -> ApiResult<DbPool> {
    let settings = SETTINGS
        .get()
        .ok_or_else(|| ApiError::connection("Database settings not installed"))?;
    single_flight(&POOL, || create_pool(settings)).await
}

/// Close the pool if one exists and clear the process-wide reference.
/// Closing an already-absent pool is a no-op.
pub async fn shutdown() {
    let mut slot = POOL.lock().await;
    if let Some(pool) = slot.take() {
        info!(backend = %pool.backend(), "Closing connection pool");
        pool.close().await;
    }
}

/// Return the cached value, or run `init` to produce it while holding the
/// slot lock so concurrent first callers cannot race a second creation.
async fn single_flight<T, F, Fut>(slot: &Mutex<Option<T>>, init: F) -> ApiResult<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut guard = slot.lock().await;
    if let Some(value) = guard.as_ref() {
        return Ok(value.clone());
    }
    let value = init().await?;
    *guard = Some(value.clone());
    Ok(value)
}

/// Build the pool from the installed settings.
async fn create_pool(settings: &DatabaseSettings) -> ApiResult<DbPool> {
    let opts = &settings.pool_options;
    let acquire_timeout = Duration::from_secs(opts.acquire_timeout_or_default());
    let idle_timeout = Some(Duration::from_secs(opts.idle_timeout_or_default()));

    debug!(backend = %settings.backend, "Creating connection pool");

    let pool = match settings.backend {
        DatabaseBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .min_connections(opts.min_connections_or_default())
                .max_connections(opts.max_connections_or_default())
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(opts.test_before_acquire_or_default())
                .connect(&settings.connection_string)
                .await
                .map_err(|e| connect_error(settings.backend, &e))?;
            DbPool::Postgres(pool)
        }
        DatabaseBackend::MySql => {
            let pool = MySqlPoolOptions::new()
                .min_connections(opts.min_connections_or_default())
                .max_connections(opts.max_connections_or_default())
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(opts.test_before_acquire_or_default())
                .connect(&settings.connection_string)
                .await
                .map_err(|e| connect_error(settings.backend, &e))?;
            DbPool::MySql(pool)
        }
    };

    info!(backend = %settings.backend, "Connection pool ready");
    Ok(pool)
}

/// Fold driver connect failures into a ConnectionFailure with a hint.
fn connect_error(backend: DatabaseBackend, error: &sqlx::Error) -> ApiError {
    let error_str = error.to_string();
    let lower = error_str.to_lowercase();

    let hint = if lower.contains("connection refused") {
        format!("check that the {backend} server is running and reachable")
    } else if lower.contains("authentication") || lower.contains("password") {
        "verify the username and password in the connection URL".to_string()
    } else if lower.contains("does not exist") || lower.contains("unknown database") {
        "check that the database name exists".to_string()
    } else {
        format!("verify the {backend} connection URL")
    };

    ApiError::connection(format!("Failed to connect: {error_str} ({hint})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_single_flight_creates_exactly_once() {
        let slot = Arc::new(Mutex::new(None::<u32>));
        let created = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let slot = Arc::clone(&slot);
            let created = Arc::clone(&created);
            handles.push(tokio::spawn(async move {
                single_flight(&slot, || async {
                    created.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(7u32)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_flight_failure_leaves_slot_empty() {
        let slot = Mutex::new(None::<u32>);

        let result = single_flight(&slot, || async {
            Err::<u32, _>(ApiError::connection("unreachable"))
        })
        .await;
        assert!(result.is_err());

        // A later attempt can still succeed.
        let result = single_flight(&slot, || async { Ok(3u32) }).await;
        assert_eq!(result.unwrap(), 3);
    }
}
