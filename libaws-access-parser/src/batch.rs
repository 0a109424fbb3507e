use tracing::debug;

use crate::log::{decode, Log};

/// Lazily decodes every line of a log file, in order.
///
/// Blank lines and lines that do not decode are skipped.
pub fn parse_logfile(blob: &str) -> impl Iterator<Item = Log<'_>> {
    blob.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .filter_map(|(idx, line)| {
            let log = decode(line);
            if log.is_none() {
                debug!(line = idx + 1, "skipping undecodable log line");
            }
            log
        })
}

#[test]
fn test_parse_logfile() {
    let blob = concat!(
        r#"2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 200 0 29 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.38.0" - -"#,
        "\r\n",
        "\n",
        "truncated line\n",
        r#"http 2018-07-02T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/settings HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337262-36d228ad5d99923122bbe354""#,
        "\n",
    );

    let logs: Vec<_> = parse_logfile(blob).collect();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].r#type, None);
    assert_eq!(logs[0].ssl_protocol, Some("-"));
    assert_eq!(logs[1].r#type, Some("http"));
    assert_eq!(logs[1].requested_path(), Some("/settings"));

    assert_eq!(parse_logfile("").count(), 0);
    assert_eq!(parse_logfile("\n\r\n\n").count(), 0);
}
