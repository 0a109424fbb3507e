use std::io::{self, Write};
use std::net::{ToSocketAddrs, UdpSocket};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::EmitterConfig;
use crate::log::Log;

/// Metric name, appended to the configured prefix.
pub const TOTAL_TIME_METRIC: &str = "request.total_time";

/// Tag key carrying the classified path.
pub const PATH_TAG: &str = "path";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to send metric: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode metric: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A request duration bound for a metrics backend.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TimingSample {
    pub name: String,
    pub tag: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub seconds: f64,
}

impl TimingSample {
    pub fn millis(&self) -> f64 {
        self.seconds * 1000.0
    }
}

pub trait MetricsSink {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError>;
}

impl<S: MetricsSink + ?Sized> MetricsSink for &mut S {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError> {
        (**self).timing(sample)
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError> {
        (**self).timing(sample)
    }
}

/// Outcome of emitting one log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Emitted {
    Sent,
    /// The line's total time was not a finite number.
    Skipped,
}

/// Turns decoded log lines into one timing sample each, tagged by path.
pub struct LoglineEmitter<S> {
    config: EmitterConfig,
    sink: S,
}

impl<S: MetricsSink> LoglineEmitter<S> {
    pub fn new(config: EmitterConfig, sink: S) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn sample(&self, log: &Log<'_>) -> TimingSample {
        let tag = self.config.classifier.classify(log.requested_path());
        TimingSample {
            name: format!("{}{}", self.config.prefix, TOTAL_TIME_METRIC),
            tag: tag.to_string(),
            timestamp: DateTime::parse_from_rfc3339(log.timestamp)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            seconds: log.total_time,
        }
    }

    pub fn emit_logline(&mut self, log: &Log<'_>) -> Result<Emitted, SinkError> {
        let sample = self.sample(log);
        if !sample.seconds.is_finite() {
            warn!(
                timestamp = log.timestamp,
                request = log.request,
                "skipping log line with non-numeric timings"
            );
            return Ok(Emitted::Skipped);
        }
        self.sink.timing(&sample)?;
        Ok(Emitted::Sent)
    }
}

/// Sends DogStatsD timing lines (`name:12.5|ms|#path:settings`) over UDP.
///
/// StatsD has no notion of event time, so sample timestamps are dropped.
pub struct StatsdSink {
    socket: UdpSocket,
}

impl StatsdSink {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        Ok(Self { socket })
    }

    pub fn encode(sample: &TimingSample) -> String {
        format!(
            "{}:{}|ms|#{}:{}",
            sample.name,
            sample.millis(),
            PATH_TAG,
            sample.tag
        )
    }
}

impl MetricsSink for StatsdSink {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError> {
        self.socket.send(Self::encode(sample).as_bytes())?;
        Ok(())
    }
}

/// Writes each sample as one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricsSink for JsonLinesSink<W> {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, sample)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
fn test_config() -> EmitterConfig {
    use crate::classify::{Classifier, Rule};

    EmitterConfig::new(
        "fxa.content.",
        Classifier::new(
            vec![
                Rule::new("auth", "^/auth").unwrap(),
                Rule::new("settings", "^/settings").unwrap(),
            ],
            "other",
        ),
    )
}

#[test]
fn test_emit_logline() {
    let line = r#"2017-06-05T23:55:32.954546Z fxa-conte-ContentS 00.00.00.00:52878 172.00.00.00:80 0.000072 0.004025 0.000048 200 200 0 1537 "GET https://accounts.stage.mozaws.net:443/settings HTTP/1.1" "Mozilla/5.0" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2"#;
    let log = crate::log::decode(line).unwrap();

    let mut emitter = LoglineEmitter::new(test_config(), JsonLinesSink::new(Vec::new()));
    assert_eq!(emitter.emit_logline(&log).unwrap(), Emitted::Sent);

    let sample = emitter.sample(&log);
    assert_eq!(sample.name, "fxa.content.request.total_time");
    assert_eq!(sample.tag, "settings");
    assert_eq!(
        sample.timestamp.map(|t| t.timestamp_micros()),
        Some(1_496_706_932_954_546)
    );
    assert!((sample.seconds - 0.004145).abs() < 1e-12);

    let output = String::from_utf8(emitter.into_sink().into_inner()).unwrap();
    assert_eq!(output.lines().count(), 1);
    assert!(output.contains(r#""tag":"settings""#));
}

#[test]
fn test_emit_skips_non_finite() {
    let line = r#"2017-06-05T23:55:32.954546Z fxa-conte-ContentS 00.00.00.00:52878 - - - - 503 0 0 0 "GET /auth/signin HTTP/1.1" "-" - -"#;
    let log = crate::log::decode(line).unwrap();

    let mut emitter = LoglineEmitter::new(test_config(), JsonLinesSink::new(Vec::new()));
    assert_eq!(emitter.emit_logline(&log).unwrap(), Emitted::Skipped);
    assert!(emitter.into_sink().into_inner().is_empty());
}

#[test]
fn test_statsd_encode() {
    let sample = TimingSample {
        name: "fxa.request.total_time".to_string(),
        tag: "auth".to_string(),
        timestamp: None,
        seconds: 0.25,
    };
    assert_eq!(
        StatsdSink::encode(&sample),
        "fxa.request.total_time:250|ms|#path:auth"
    );
}
