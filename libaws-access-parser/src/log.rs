use chrono::DateTime;
use serde::Serialize;

use crate::lex::Lexer;
use crate::resource::{RequestedResource, UrlComponent};

/// Lines with fewer fields than this are not access log entries.
pub const MIN_FIELDS: usize = 14;

/// One decoded access log entry.
///
/// String fields borrow from the input line. `requested_resource` and the
/// timing fields are derived while decoding.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Log<'a> {
    pub timestamp: &'a str,
    pub elb: &'a str,
    pub client: &'a str,
    #[serde(rename = "client:port")]
    pub client_port: &'a str,
    pub backend: &'a str,
    #[serde(rename = "backend:port")]
    pub backend_port: &'a str,
    pub request_processing_time: f64,
    pub backend_processing_time: f64,
    pub response_processing_time: f64,
    pub elb_status_code: &'a str,
    pub backend_status_code: &'a str,
    pub received_bytes: &'a str,
    pub sent_bytes: &'a str,
    pub request: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_resource: Option<&'a str>,
    #[serde(flatten)]
    pub resource: RequestedResource,
    pub user_agent: &'a str,
    pub total_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_cipher: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_protocol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<&'a str>,
}

impl<'a> Log<'a> {
    /// Path plus query of the requested URL, used to classify the request.
    pub fn requested_path(&self) -> Option<&str> {
        self.resource.get(UrlComponent::Path)
    }
}

fn is_timestamp(field: &str) -> bool {
    DateTime::parse_from_rfc3339(field).is_ok()
}

/// Timings that are not numbers decode to NaN instead of rejecting the line.
fn seconds(field: &str) -> f64 {
    field.parse().unwrap_or(f64::NAN)
}

fn host(host_port: &str) -> &str {
    host_port
        .split_once(':')
        .map_or(host_port, |(host, _)| host)
}

/// `"GET https://example.com/ HTTP/1.1"` → `https://example.com/`
fn request_target(request: &str) -> Option<&str> {
    let inner = request.strip_prefix('"').unwrap_or(request);
    let inner = inner.strip_suffix('"').unwrap_or(inner);
    inner.split(' ').nth(1)
}

/// Decodes one access log line.
///
/// Returns `None` for lines that do not have enough fields to be a log
/// entry, including blank lines. An optional leading record type (ALB logs
/// start with `http`, `https`, `h2`, ...) is detected by the first field not
/// being a timestamp.
pub fn decode(line: &str) -> Option<Log<'_>> {
    let mut fields: Vec<&str> = Lexer::new(line).collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let r#type = if is_timestamp(fields[0]) {
        None
    } else {
        Some(fields.remove(0))
    };

    let f = |i: usize| fields.get(i).copied();

    let request_processing_time = seconds(fields[4]);
    let backend_processing_time = seconds(fields[5]);
    let response_processing_time = seconds(fields[6]);

    let request = fields[11];
    let requested_resource = request_target(request);
    let resource = requested_resource
        .map(RequestedResource::parse)
        .unwrap_or_default();

    Some(Log {
        timestamp: fields[0],
        elb: fields[1],
        client: host(fields[2]),
        client_port: fields[2],
        backend: host(fields[3]),
        backend_port: fields[3],
        request_processing_time,
        backend_processing_time,
        response_processing_time,
        elb_status_code: fields[7],
        backend_status_code: fields[8],
        received_bytes: fields[9],
        sent_bytes: fields[10],
        request,
        requested_resource,
        resource,
        user_agent: fields[12],
        total_time: request_processing_time + backend_processing_time + response_processing_time,
        ssl_cipher: f(13),
        ssl_protocol: f(14),
        target_group_arn: f(15),
        trace_id: f(16),
        r#type,
    })
}

#[test]
fn test_decode_classic_lb() {
    let log = decode(
        r#"2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 10.0.0.1:80 0.000086 0.001048 0.001337 200 200 0 57 "GET https://www.example.com:443/ HTTP/1.1" "curl/7.38.0" DHE-RSA-AES128-SHA TLSv1.2"#,
    )
    .unwrap();

    assert_eq!(log.r#type, None);
    assert_eq!(log.timestamp, "2015-05-13T23:39:43.945958Z");
    assert_eq!(log.client, "192.168.131.39");
    assert_eq!(log.client_port, "192.168.131.39:2817");
    assert_eq!(log.backend, "10.0.0.1");
    assert_eq!(log.requested_resource, Some("https://www.example.com:443/"));
    assert_eq!(log.requested_path(), Some("/"));
    assert_eq!(log.user_agent, r#""curl/7.38.0""#);
    assert_eq!(log.ssl_cipher, Some("DHE-RSA-AES128-SHA"));
    assert_eq!(log.ssl_protocol, Some("TLSv1.2"));
    assert_eq!(log.target_group_arn, None);
}

#[test]
fn test_decode_alb_with_type() {
    let log = decode(
        r#"https 2018-07-02T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.086 0.048 0.037 200 200 0 57 "GET https://www.example.com:443/auth/signin?x=1 HTTP/1.1" "curl/7.46.0" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2 arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337281-1d84f3d73c47ec4e58577259" "www.example.com""#,
    )
    .unwrap();

    assert_eq!(log.r#type, Some("https"));
    assert_eq!(log.timestamp, "2018-07-02T22:23:00.186641Z");
    assert_eq!(log.elb, "app/my-loadbalancer/50dc6c495c0c9188");
    assert_eq!(log.requested_path(), Some("/auth/signin?x=1"));
    assert_eq!(
        log.target_group_arn,
        Some("arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067")
    );
    assert_eq!(log.trace_id, Some(r#""Root=1-58337281-1d84f3d73c47ec4e58577259""#));
}

#[test]
fn test_decode_permissive_numbers() {
    let log = decode(
        r#"2015-03-27T07:06:41.177907Z my-loadbalancer 192.168.131.39:2817 - -1 -1 -1 503 0 0 0 "GET https://www.example.com:443/ HTTP/1.1" "curl/7.38.0" - -"#,
    )
    .unwrap();
    assert_eq!(log.backend, "-");
    assert_eq!(log.backend_port, "-");
    assert_eq!(log.total_time, -3.0);
    assert_eq!(log.ssl_cipher, Some("-"));
    assert_eq!(log.trace_id, None);

    let log = decode(
        r#"2015-03-27T07:06:41.177907Z my-loadbalancer 192.168.131.39:2817 - - 0.1 0.2 503 0 0 0 "- - - " "-" - -"#,
    )
    .unwrap();
    assert!(log.request_processing_time.is_nan());
    assert!(log.total_time.is_nan());
    assert_eq!(log.requested_resource, Some("-"));
}

#[test]
fn test_decode_rejects_short_lines() {
    assert!(decode("").is_none());
    assert!(decode("\n").is_none());
    assert!(decode(
        "2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 200 0 29"
    )
    .is_none());
}
