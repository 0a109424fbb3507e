use std::fs;

use libaws_access_parser::{
    decode, handle_event, process_object, BatchSummary, Classifier, EmitterConfig,
    FsObjectSource, HandlerError, LoglineEmitter, MetricsSink, Rule, S3Event, SinkError,
    TimingSample, UrlComponent,
};
use pretty_assertions::assert_eq;

const VALID_LOG_LINE: &str = r#"2017-06-05T23:55:32.954546Z fxa-conte-ContentS 00.00.00.00:52878 172.00.00.00:80 0.000072 0.004025 0.000048 200 200 0 1537 "GET https://accounts.stage.mozaws.net:443/settings HTTP/1.1" "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.10; rv:40.0) Gecko/20100101 Firefox/40.0 FxATester/1.0" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2"#;

#[derive(Default)]
struct RecordingSink {
    samples: Vec<TimingSample>,
}

impl MetricsSink for RecordingSink {
    fn timing(&mut self, sample: &TimingSample) -> Result<(), SinkError> {
        self.samples.push(sample.clone());
        Ok(())
    }
}

fn emitter() -> LoglineEmitter<RecordingSink> {
    let classifier = Classifier::new(
        vec![
            Rule::new("auth", r"^/auth").unwrap(),
            Rule::new("settings", r"^/settings").unwrap(),
        ],
        "other",
    );
    LoglineEmitter::new(
        EmitterConfig::new("fxa.content.", classifier),
        RecordingSink::default(),
    )
}

#[test]
fn test_valid_log_line() {
    let log = decode(VALID_LOG_LINE).unwrap();

    assert_eq!(log.timestamp, "2017-06-05T23:55:32.954546Z");
    assert_eq!(log.elb, "fxa-conte-ContentS");
    assert_eq!(log.client, "00.00.00.00");
    assert_eq!(log.client_port, "00.00.00.00:52878");
    assert_eq!(log.backend, "172.00.00.00");
    assert_eq!(log.backend_port, "172.00.00.00:80");
    assert_eq!(log.request_processing_time, 0.000072);
    assert_eq!(log.backend_processing_time, 0.004025);
    assert_eq!(log.response_processing_time, 0.000048);
    assert!((log.total_time - 0.004145).abs() < 1e-12);
    assert_eq!(log.elb_status_code, "200");
    assert_eq!(log.backend_status_code, "200");
    assert_eq!(log.received_bytes, "0");
    assert_eq!(log.sent_bytes, "1537");
    assert_eq!(
        log.request,
        r#""GET https://accounts.stage.mozaws.net:443/settings HTTP/1.1""#
    );
    assert_eq!(
        log.requested_resource,
        Some("https://accounts.stage.mozaws.net:443/settings")
    );
    assert_eq!(
        log.resource.iter().collect::<Vec<_>>(),
        vec![
            (UrlComponent::Pathname, "/settings"),
            (UrlComponent::Host, "accounts.stage.mozaws.net:443"),
            (UrlComponent::Protocol, "https:"),
            (UrlComponent::Port, "443"),
            (UrlComponent::Hostname, "accounts.stage.mozaws.net"),
            (UrlComponent::Path, "/settings"),
            (
                UrlComponent::Href,
                "https://accounts.stage.mozaws.net:443/settings"
            ),
        ]
    );
    assert_eq!(
        log.user_agent,
        r#""Mozilla/5.0 (Macintosh; Intel Mac OS X 10.10; rv:40.0) Gecko/20100101 Firefox/40.0 FxATester/1.0""#
    );
    assert_eq!(log.ssl_cipher, Some("ECDHE-RSA-AES128-GCM-SHA256"));
    assert_eq!(log.ssl_protocol, Some("TLSv1.2"));
    assert_eq!(log.target_group_arn, None);
    assert_eq!(log.trace_id, None);
    assert_eq!(log.r#type, None);
}

#[test]
fn test_valid_log_line_json() {
    let log = decode(VALID_LOG_LINE).unwrap();
    let json = serde_json::to_value(&log).unwrap();
    let object = json.as_object().unwrap();

    assert_eq!(object["requested_resource.path"], "/settings");
    assert_eq!(object["backend:port"], "172.00.00.00:80");
    assert_eq!(object["ssl_protocol"], "TLSv1.2");
    for absent in [
        "requested_resource.hash",
        "requested_resource.search",
        "target_group_arn",
        "trace_id",
        "type",
    ] {
        assert!(!object.contains_key(absent), "{absent} should be absent");
    }
}

#[test]
fn test_type_shifts_fields() {
    let plain = decode(VALID_LOG_LINE).unwrap();
    let typed_line = format!("https {VALID_LOG_LINE}");
    let typed = decode(&typed_line).unwrap();

    assert_eq!(typed.r#type, Some("https"));
    assert_eq!(typed.timestamp, plain.timestamp);
    assert_eq!(typed.elb, plain.elb);
    assert_eq!(typed.backend, plain.backend);
    assert_eq!(typed.user_agent, plain.user_agent);
    assert_eq!(typed.ssl_protocol, plain.ssl_protocol);
    assert_eq!(typed.resource, plain.resource);
}

#[test]
fn test_trailing_optional_fields() {
    let line = format!(
        "{VALID_LOG_LINE} arn:aws:elasticloadbalancing:us-west-2:000000000000:targetgroup/fxa/0 \"Root=1-5935ef14-2b3e\""
    );
    let log = decode(&line).unwrap();
    assert_eq!(
        log.target_group_arn,
        Some("arn:aws:elasticloadbalancing:us-west-2:000000000000:targetgroup/fxa/0")
    );
    assert_eq!(log.trace_id, Some("\"Root=1-5935ef14-2b3e\""));

    // 14 fields: ssl_protocol missing
    let (short, _) = VALID_LOG_LINE.rsplit_once(' ').unwrap();
    let log = decode(short).unwrap();
    assert_eq!(log.ssl_cipher, Some("ECDHE-RSA-AES128-GCM-SHA256"));
    assert_eq!(log.ssl_protocol, None);
}

#[test]
fn test_total_time_is_sum() {
    let timings = [
        ("0.000072", "0.004025", "0.000048"),
        ("1.5", "0.25", "0.125"),
        ("0", "0", "0"),
        ("-1", "-1", "-1"),
    ];
    for (request, backend, response) in timings {
        let line = format!(
            r#"2017-06-05T23:55:32.954546Z elb 10.0.0.1:1234 10.0.0.2:80 {request} {backend} {response} 200 200 0 1 "GET /a HTTP/1.1" "ua" - -"#
        );
        let log = decode(&line).unwrap();
        let sum = log.request_processing_time
            + log.backend_processing_time
            + log.response_processing_time;
        assert!((log.total_time - sum).abs() < 1e-12);
    }
}

#[test]
fn test_short_lines_are_rejected() {
    assert!(decode("").is_none());
    let fields: Vec<&str> = VALID_LOG_LINE.splitn(14, ' ').collect();
    for n in 0..13 {
        let line = fields[..n].join(" ");
        assert!(decode(&line).is_none(), "{n} fields should not decode");
    }
}

#[test]
fn test_decode_is_idempotent() {
    assert_eq!(decode(VALID_LOG_LINE), decode(VALID_LOG_LINE));
}

#[test]
fn test_process_object() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("fxa-elb-logs/2017/06/05")).unwrap();
    let blob = [
        VALID_LOG_LINE.to_string(),
        String::new(),
        "garbage".to_string(),
        VALID_LOG_LINE.replace("/settings HTTP", "/auth/signin HTTP"),
        VALID_LOG_LINE.replace("/settings HTTP", "/metrics HTTP"),
        VALID_LOG_LINE.replace("0.000072", "-"),
    ]
    .join("\n");
    fs::write(dir.path().join("fxa-elb-logs/2017/06/05/a b.log"), blob).unwrap();

    let source = FsObjectSource::new(dir.path());
    let mut emitter = emitter();
    let event = S3Event::from_json(
        r#"{"Records":[{"s3":{"bucket":{"name":"fxa-elb-logs"},"object":{"key":"2017/06/05/a+b.log"}}}]}"#,
    )
    .unwrap();
    let summary = handle_event(&event, &source, &mut emitter).unwrap();

    assert_eq!(
        summary,
        BatchSummary {
            records: 4,
            emitted: 3,
            skipped: 1,
        }
    );
    let tags: Vec<_> = emitter
        .sink()
        .samples
        .iter()
        .map(|s| s.tag.as_str())
        .collect();
    assert_eq!(tags, ["settings", "auth", "other"]);
    assert!(emitter
        .sink()
        .samples
        .iter()
        .all(|s| s.name == "fxa.content.request.total_time"));
}

#[test]
fn test_missing_source_data() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("bucket")).unwrap();
    fs::write(dir.path().join("bucket/empty.log"), "").unwrap();

    let source = FsObjectSource::new(dir.path());
    let mut emitter = emitter();
    for key in ["empty.log", "missing.log"] {
        let err = process_object(&source, "bucket", key, &mut emitter).unwrap_err();
        assert!(matches!(err, HandlerError::MissingSourceData { .. }));
    }
    assert!(emitter.sink().samples.is_empty());
}

#[test]
fn test_demo_emitter_config() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/emitter.toml");
    let config = EmitterConfig::load(path).unwrap();

    assert_eq!(config.prefix, "fxa.content.");
    assert_eq!(config.classifier.classify(Some("/oauth/token")), "oauth");
    assert_eq!(config.classifier.classify(Some("/auth/signin")), "auth");
    assert_eq!(config.classifier.classify(Some("/")), "other");
}
