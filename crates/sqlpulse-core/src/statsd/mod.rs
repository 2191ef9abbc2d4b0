//! DogStatsD client.
//!
//! Metrics leave the process as UDP datagrams in the DogStatsD wire
//! format: `name:value|type|@rate|#tag1:a,tag2:b|T<epoch>`. Count and
//! gauge emissions may carry the trailing `|T` timestamp extension;
//! histogram and distribution observations do not support one.
//!
//! [`StatsdClient`] is the wire implementation. Monitors talk to the
//! [`MetricSink`] trait so tests can substitute [`RecordingSink`] and
//! assert the exact emission calls.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Error type for statsd setup and emission failures.
#[derive(Debug, Clone)]
pub enum StatsdError {
    /// Socket could not be created or connected.
    Setup(String),
    /// A datagram failed to send.
    Send(String),
}

impl std::fmt::Display for StatsdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsdError::Setup(msg) => write!(f, "statsd setup failed: {}", msg),
            StatsdError::Send(msg) => write!(f, "statsd send failed: {}", msg),
        }
    }
}

impl std::error::Error for StatsdError {}

/// Destination for metric emissions.
///
/// The surface mirrors what monitors need: timestamped counter and
/// gauge, untimestamped gauge (the error indicator), histogram and
/// distribution observations. Every call takes an explicit sample
/// rate; monitors always pass 1.
pub trait MetricSink: Send {
    /// Counter increment by `value` at an explicit time.
    fn count_with_timestamp(
        &mut self,
        name: &str,
        value: i64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError>;

    /// Gauge set at an explicit time.
    fn gauge_with_timestamp(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError>;

    /// Gauge set at the daemon's receive time.
    fn gauge(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError>;

    /// Histogram observation.
    fn histogram(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError>;

    /// Distribution observation.
    fn distribution(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError>;
}

/// UDP DogStatsD client carrying a fixed set of global tags.
pub struct StatsdClient {
    socket: UdpSocket,
    global_tags: Vec<String>,
}

impl StatsdClient {
    /// Binds a local socket and connects it to the daemon address.
    pub fn new(address: &str, global_tags: Vec<String>) -> Result<Self, StatsdError> {
        let socket =
            UdpSocket::bind("0.0.0.0:0").map_err(|e| StatsdError::Setup(e.to_string()))?;
        socket
            .connect(address)
            .map_err(|e| StatsdError::Setup(format!("{}: {}", address, e)))?;

        Ok(Self {
            socket,
            global_tags,
        })
    }

    fn send(&self, datagram: &str) -> Result<(), StatsdError> {
        self.socket
            .send(datagram.as_bytes())
            .map(drop)
            .map_err(|e| StatsdError::Send(e.to_string()))
    }
}

impl MetricSink for StatsdClient {
    fn count_with_timestamp(
        &mut self,
        name: &str,
        value: i64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError> {
        let datagram = encode(
            name,
            &value.to_string(),
            "c",
            tags,
            &self.global_tags,
            rate,
            Some(timestamp),
        );
        self.send(&datagram)
    }

    fn gauge_with_timestamp(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError> {
        let datagram = encode(
            name,
            &value.to_string(),
            "g",
            tags,
            &self.global_tags,
            rate,
            Some(timestamp),
        );
        self.send(&datagram)
    }

    fn gauge(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        let datagram = encode(name, &value.to_string(), "g", tags, &self.global_tags, rate, None);
        self.send(&datagram)
    }

    fn histogram(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        let datagram = encode(name, &value.to_string(), "h", tags, &self.global_tags, rate, None);
        self.send(&datagram)
    }

    fn distribution(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        let datagram = encode(name, &value.to_string(), "d", tags, &self.global_tags, rate, None);
        self.send(&datagram)
    }
}

/// Formats one DogStatsD datagram.
///
/// A rate of 1 is omitted (always-sampled is the daemon default).
/// Global tags come first, then per-emission tags.
fn encode(
    name: &str,
    value: &str,
    kind: &str,
    tags: &[String],
    global_tags: &[String],
    rate: f64,
    timestamp: Option<DateTime<Utc>>,
) -> String {
    let mut datagram = format!("{}:{}|{}", name, value, kind);

    if rate < 1.0 {
        datagram.push_str(&format!("|@{}", rate));
    }

    if !tags.is_empty() || !global_tags.is_empty() {
        datagram.push_str("|#");
        for (i, tag) in global_tags.iter().chain(tags).enumerate() {
            if i > 0 {
                datagram.push(',');
            }
            datagram.push_str(tag);
        }
    }

    if let Some(ts) = timestamp {
        datagram.push_str(&format!("|T{}", ts.timestamp()));
    }

    datagram
}

/// One recorded emission call.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    CountWithTimestamp {
        name: String,
        value: i64,
        tags: Vec<String>,
        rate: f64,
        timestamp: DateTime<Utc>,
    },
    GaugeWithTimestamp {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
        timestamp: DateTime<Utc>,
    },
    Gauge {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
    },
    Histogram {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
    },
    Distribution {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
    },
}

/// [`MetricSink`] double that records every call for assertions.
///
/// Clones share the same emission log, so tests can hand one clone to
/// a monitor and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    emissions: Arc<Mutex<Vec<Emission>>>,
    fail_with: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails with `message` after recording.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            emissions: Arc::default(),
            fail_with: Some(message.into()),
        }
    }

    /// Everything emitted so far, in order.
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().expect("emission log poisoned").clone()
    }

    fn record(&mut self, emission: Emission) -> Result<(), StatsdError> {
        self.emissions
            .lock()
            .expect("emission log poisoned")
            .push(emission);
        match &self.fail_with {
            Some(message) => Err(StatsdError::Send(message.clone())),
            None => Ok(()),
        }
    }
}

impl MetricSink for RecordingSink {
    fn count_with_timestamp(
        &mut self,
        name: &str,
        value: i64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError> {
        self.record(Emission::CountWithTimestamp {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            rate,
            timestamp,
        })
    }

    fn gauge_with_timestamp(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StatsdError> {
        self.record(Emission::GaugeWithTimestamp {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            rate,
            timestamp,
        })
    }

    fn gauge(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        self.record(Emission::Gauge {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            rate,
        })
    }

    fn histogram(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        self.record(Emission::Histogram {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            rate,
        })
    }

    fn distribution(
        &mut self,
        name: &str,
        value: f64,
        tags: &[String],
        rate: f64,
    ) -> Result<(), StatsdError> {
        self.record(Emission::Distribution {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_gauge_with_timestamp() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 0).unwrap();
        let datagram = encode(
            "db.queries",
            "85.5",
            "g",
            &["tier:premium".to_string()],
            &["env:prod".to_string()],
            1.0,
            Some(ts),
        );
        assert_eq!(datagram, "db.queries:85.5|g|#env:prod,tier:premium|T1703500200");
    }

    #[test]
    fn test_encode_count() {
        let ts = Utc.timestamp_opt(1700000000, 0).unwrap();
        let datagram = encode("app.events", "42", "c", &[], &[], 1.0, Some(ts));
        assert_eq!(datagram, "app.events:42|c|T1700000000");
    }

    #[test]
    fn test_encode_no_tags_no_timestamp() {
        let datagram = encode("app.latency", "12.25", "h", &[], &[], 1.0, None);
        assert_eq!(datagram, "app.latency:12.25|h");
    }

    #[test]
    fn test_encode_sample_rate_below_one() {
        let datagram = encode("app.hits", "1", "c", &[], &[], 0.5, None);
        assert_eq!(datagram, "app.hits:1|c|@0.5");
    }

    #[test]
    fn test_encode_integral_float_value() {
        // f64 Display drops the trailing ".0", which the wire format expects.
        let datagram = encode("app.gauge", &42.0_f64.to_string(), "g", &[], &[], 1.0, None);
        assert_eq!(datagram, "app.gauge:42|g");
    }

    #[test]
    fn test_recording_sink_shares_log_across_clones() {
        let sink = RecordingSink::new();
        let mut handle = sink.clone();
        handle.gauge("x", 1.0, &[], 1.0).unwrap();
        assert_eq!(sink.emissions().len(), 1);
    }

    #[test]
    fn test_failing_sink_records_then_errors() {
        let mut sink = RecordingSink::failing("socket closed");
        let err = sink.gauge("x", 1.0, &[], 1.0).unwrap_err();
        assert!(matches!(err, StatsdError::Send(_)));
        assert_eq!(sink.emissions().len(), 1);
    }

    #[test]
    fn test_client_new_bad_address() {
        assert!(StatsdClient::new("not a socket addr", Vec::new()).is_err());
    }
}
