//! The per-monitor execution engine.
//!
//! A [`Monitor`] owns one database connection and one statsd sink and
//! runs forever: sleep for the configured interval, execute the
//! configured query, and translate every result row into a metric
//! emission. Failures never stop the loop — a failed query abandons
//! the cycle, a failed row is skipped — and every failure raises the
//! synthetic error gauge so a dashboard can alert per monitor.

mod tags;
mod value;

pub use tags::build_tags;
pub use value::{CoerceError, METRIC_COLUMN, TIMESTAMP_COLUMN, metric_value, resolve_timestamp};

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::{MonitorConfig, StatsdConfig};
use crate::db::{self, Database, DbError, RowRecord};
use crate::statsd::{MetricSink, StatsdClient, StatsdError};

/// Name of the synthetic gauge raised on any monitor failure.
pub const ERROR_METRIC: &str = "sqlpulse.error";

/// Sample rate for every emission: always sampled.
const RATE: f64 = 1.0;

/// Error type for monitor setup failures. These are unrecoverable and
/// reported to the caller; nothing here is retried.
#[derive(Debug)]
pub enum MonitorError {
    /// The database connection could not be opened or verified.
    Database(DbError),
    /// The statsd client could not be constructed.
    Statsd(StatsdError),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Database(e) => write!(f, "database: {}", e),
            MonitorError::Statsd(e) => write!(f, "statsd: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Database(e) => Some(e),
            MonitorError::Statsd(e) => Some(e),
        }
    }
}

/// Error covering one row's processing. Each one skips that row only.
#[derive(Debug)]
enum RowError {
    Coerce(CoerceError),
    UnknownKind(String),
    Emission(StatsdError),
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::Coerce(e) => write!(f, "{}", e),
            RowError::UnknownKind(kind) => write!(f, "unknown metric type: {}", kind),
            RowError::Emission(e) => write!(f, "emission failed: {}", e),
        }
    }
}

impl From<CoerceError> for RowError {
    fn from(e: CoerceError) -> Self {
        RowError::Coerce(e)
    }
}

/// One poll-query-emit unit, built from configuration.
///
/// The connection and the sink are owned exclusively by this monitor;
/// there is no sharing between monitors and no locking.
pub struct Monitor {
    db: Box<dyn Database>,
    sink: Box<dyn MetricSink>,
    name: String,
    interval: Duration,
    metric: String,
    metric_kind: String,
    sql: String,
}

impl Monitor {
    /// Builds a monitor from configuration, opening its database
    /// connection and statsd client. Fails fast on either.
    pub fn new(statsd: &StatsdConfig, config: &MonitorConfig) -> Result<Self, MonitorError> {
        let db = db::connect(&config.database.kind, &config.database.uri)
            .map_err(MonitorError::Database)?;
        let sink =
            StatsdClient::new(&statsd.address, statsd.tags.clone()).map_err(MonitorError::Statsd)?;

        Ok(Self::from_parts(db, Box::new(sink), config))
    }

    /// Assembles a monitor from already-built parts.
    ///
    /// Tests use this to substitute a mock database and a recording
    /// sink.
    pub fn from_parts(
        db: Box<dyn Database>,
        sink: Box<dyn MetricSink>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            db,
            sink,
            name: config.name.clone(),
            interval: Duration::from_secs(config.interval),
            metric: config.metric.clone(),
            metric_kind: config.metric_kind.clone(),
            sql: config.sql.clone(),
        }
    }

    /// Runs the monitor forever. Never returns; process exit is the
    /// only way out.
    pub fn run(mut self) {
        info!(
            "[{}] monitor started, polling every {}s",
            self.name,
            self.interval.as_secs()
        );

        loop {
            debug!("[{}] sleeping for {}s", self.name, self.interval.as_secs());
            thread::sleep(self.interval);
            self.run_cycle();
        }
    }

    /// Executes one cycle: query, then translate and emit every row.
    ///
    /// A query failure abandons the cycle; a row failure skips that
    /// row. Both log and raise the error gauge. Public so tests can
    /// drive cycles without the sleep.
    pub fn run_cycle(&mut self) {
        let rows = match self.db.query(&self.sql) {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] {}", self.name, e);
                self.send_error_metric();
                return;
            }
        };

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    error!("[{}] {}", self.name, e);
                    self.send_error_metric();
                    continue;
                }
            };

            if let Err(e) = self.emit_row(&row) {
                error!("[{}] {}", self.name, e);
                self.send_error_metric();
            }
        }
    }

    /// Coerces one row and dispatches the configured metric kind.
    fn emit_row(&mut self, row: &RowRecord) -> Result<(), RowError> {
        let metric_float = value::metric_value(row)?;
        let timestamp = value::resolve_timestamp(row)?;
        let tags = tags::build_tags(row);

        debug!(
            "[{}] publishing {} metric: name={}, value={}, tags={:?}",
            self.name, self.metric_kind, self.metric, metric_float, tags
        );

        let result = match self.metric_kind.as_str() {
            "count" => self.sink.count_with_timestamp(
                &self.metric,
                metric_float as i64,
                &tags,
                RATE,
                timestamp,
            ),
            "gauge" => self
                .sink
                .gauge_with_timestamp(&self.metric, metric_float, &tags, RATE, timestamp),
            "histogram" => self.sink.histogram(&self.metric, metric_float, &tags, RATE),
            "distribution" => self
                .sink
                .distribution(&self.metric, metric_float, &tags, RATE),
            other => return Err(RowError::UnknownKind(other.to_string())),
        };

        result.map_err(RowError::Emission)
    }

    /// Raises the error-indicator gauge tagged with this monitor's
    /// name. A failure to emit the indicator itself is logged and not
    /// escalated further.
    fn send_error_metric(&mut self) {
        let tags = [format!("name:{}", self.name)];
        if let Err(e) = self.sink.gauge(ERROR_METRIC, 1.0, &tags, RATE) {
            error!("[{}] failed to emit error metric: {}", self.name, e);
        }
    }
}
