mod batch;
mod classify;
mod config;
mod emit;
mod handler;
mod lex;
mod log;
mod resource;
mod source;

pub use crate::batch::parse_logfile;
pub use crate::classify::{classify, Classifier, Rule};
pub use crate::config::{ConfigError, EmitterConfig};
pub use crate::emit::{
    Emitted, JsonLinesSink, LoglineEmitter, MetricsSink, SinkError, StatsdSink, TimingSample,
    PATH_TAG, TOTAL_TIME_METRIC,
};
pub use crate::handler::{
    handle_event, process_object, BatchSummary, HandlerError, S3Event, S3EventRecord,
};
pub use crate::lex::Lexer;
pub use crate::log::{decode, Log, MIN_FIELDS};
pub use crate::resource::{RequestedResource, UrlComponent};
pub use crate::source::{read_log_blob, FsObjectSource, ObjectSource, SourceError};
