use std::ops::AddAssign;

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::batch::parse_logfile;
use crate::emit::{Emitted, LoglineEmitter, MetricsSink, SinkError};
use crate::source::{read_log_blob, ObjectSource, SourceError};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("no data returned for {bucket}/{key}")]
    MissingSourceData { bucket: String, key: String },

    #[error("invalid S3 event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// S3 object notification, reduced to what locating a log file needs.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Deserialize, Clone, Debug)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Deserialize, Clone, Debug)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct S3Object {
    /// URL-encoded, with spaces as `+`.
    pub key: String,
}

impl S3Event {
    pub fn from_json(input: &str) -> Result<Self, HandlerError> {
        Ok(serde_json::from_str(input)?)
    }
}

impl S3EventRecord {
    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> String {
        let key = self.s3.object.key.replace('+', " ");
        percent_decode_str(&key).decode_utf8_lossy().into_owned()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Lines that decoded into records.
    pub records: usize,
    pub emitted: usize,
    /// Records not sent because their timings were not numbers.
    pub skipped: usize,
}

impl AddAssign for BatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.records += rhs.records;
        self.emitted += rhs.emitted;
        self.skipped += rhs.skipped;
    }
}

/// Fetches one log file and emits a timing sample for every record in it.
///
/// An object with no content fails the whole batch, as does any sink error.
pub fn process_object<O, S>(
    source: &O,
    bucket: &str,
    key: &str,
    emitter: &mut LoglineEmitter<S>,
) -> Result<BatchSummary, HandlerError>
where
    O: ObjectSource + ?Sized,
    S: MetricsSink,
{
    let bytes = source
        .get_object(bucket, key)?
        .ok_or_else(|| HandlerError::MissingSourceData {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
    let blob = read_log_blob(&bytes, key)?;

    let mut summary = BatchSummary::default();
    for log in parse_logfile(&blob) {
        summary.records += 1;
        match emitter.emit_logline(&log)? {
            Emitted::Sent => summary.emitted += 1,
            Emitted::Skipped => summary.skipped += 1,
        }
    }

    info!(
        bucket,
        key,
        records = summary.records,
        emitted = summary.emitted,
        skipped = summary.skipped,
        "processed log file"
    );
    Ok(summary)
}

/// Processes every object named by an S3 notification, stopping at the first
/// failure.
pub fn handle_event<O, S>(
    event: &S3Event,
    source: &O,
    emitter: &mut LoglineEmitter<S>,
) -> Result<BatchSummary, HandlerError>
where
    O: ObjectSource + ?Sized,
    S: MetricsSink,
{
    let mut summary = BatchSummary::default();
    for record in &event.records {
        summary += process_object(source, record.bucket(), &record.key(), emitter)?;
    }
    Ok(summary)
}

#[test]
fn test_event_keys() {
    let event = S3Event::from_json(
        r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"fxa-elb-logs"},"object":{"key":"AWSLogs/2017/06/05/my+log%3A1.log","size":1024}}}]}"#,
    )
    .unwrap();

    assert_eq!(event.records.len(), 1);
    assert_eq!(event.records[0].bucket(), "fxa-elb-logs");
    assert_eq!(event.records[0].key(), "AWSLogs/2017/06/05/my log:1.log");

    assert!(matches!(
        S3Event::from_json("{\"Records\": 1}"),
        Err(HandlerError::InvalidEvent(_))
    ));
}
