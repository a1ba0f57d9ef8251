//! Bounded-retry connection establishment.
//!
//! Each attempt opens a fresh pool handle and probes it. A failed attempt's
//! handle is closed, a warning is logged and the connector sleeps a fixed
//! backoff before the next one. The last failure is logged as an error and
//! returned wrapped in [`SqlDbError::Connection`]. DSNs are redacted before
//! they reach a log line or an error.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::driver::{Driver, Drivers};
use crate::error::{SqlDbError, SqlDbResult};
use crate::log::{Logger, TracingLogger};
use crate::redact::redact_dsn;
use crate::target::Target;

/// Sleep between two connection attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// Opens target handles with retry.
#[derive(Clone)]
pub struct Connector {
    drivers: Arc<Drivers>,
    logger: Arc<dyn Logger>,
    backoff: Duration,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("drivers", &self.drivers)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Connector {
    /// Connector over the sqlx drivers, logging to `logger`.
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            drivers: Arc::new(Drivers::with_defaults()),
            logger,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Replace the driver registry.
    pub fn with_drivers(mut self, drivers: Drivers) -> Self {
        self.drivers = Arc::new(drivers);
        self
    }

    /// Set the sleep between attempts.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn drivers(&self) -> &Drivers {
        &self.drivers
    }

    pub fn retry_backoff(&self) -> Duration {
        self.backoff
    }

    /// Open a handle for `dsn`, probing it up to `retry` times.
    ///
    /// `retry` below 1 means a single attempt. With `skip_liveness` the
    /// handle is returned without touching the network. `ctx` bounds the
    /// whole call, backoff sleeps included.
    pub async fn establish(
        &self,
        ctx: &Context,
        driver: &str,
        dsn: &str,
        retry: i32,
        skip_liveness: bool,
    ) -> SqlDbResult<Arc<dyn Target>> {
        let redacted = redact_dsn(dsn);
        let opener = self.drivers.get(driver).ok_or_else(|| {
            SqlDbError::config(format!(
                "unknown driver '{}' (registered: {})",
                driver,
                self.drivers.names().join(", ")
            ))
        })?;

        if skip_liveness {
            return opener
                .open(driver, dsn)
                .map_err(|e| SqlDbError::config(format!("invalid DSN {}: {}", redacted, e)));
        }

        let attempts = retry.max(1) as u32;
        let mut attempt = 1;
        loop {
            let err = match self.attempt(ctx, &**opener, driver, dsn).await? {
                Ok(target) => return Ok(target),
                Err(err) => err,
            };

            if attempt >= attempts {
                self.logger.error(&format!(
                    "sqldb: retry time exhausted, cannot connect to database {}: {}",
                    redacted, err
                ));
                return Err(SqlDbError::Connection {
                    dsn: redacted,
                    attempts,
                    source: err,
                });
            }

            self.logger.warn(&format!(
                "sqldb: failed to connect to {} with error {}, retrying. Retry: {}",
                redacted, err, attempt
            ));
            ctx.run(tokio::time::sleep(self.backoff)).await?;
            attempt += 1;
        }
    }

    /// One open + probe. The outer error is the context ending.
    async fn attempt(
        &self,
        ctx: &Context,
        opener: &dyn Driver,
        driver: &str,
        dsn: &str,
    ) -> SqlDbResult<Result<Arc<dyn Target>, sqlx::Error>> {
        let target = match opener.open(driver, dsn) {
            Ok(target) => target,
            Err(err) => return Ok(Err(err)),
        };

        match ctx.run(target.ping()).await {
            Ok(Ok(())) => Ok(Ok(target)),
            Ok(Err(err)) => {
                target.close().await;
                Ok(Err(err))
            }
            Err(ctx_err) => {
                target.close().await;
                Err(ctx_err)
            }
        }
    }
}
