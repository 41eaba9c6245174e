//! Command-line and environment configuration.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Durable ordered event buffer over HTTP.
#[derive(Debug, Parser)]
#[command(name = "backlog-server", version, about)]
pub struct Config {
    /// Address the event API listens on. `:PORT` binds all interfaces.
    #[arg(long, env = "ADDR", default_value = ":5566", value_parser = parse_bind_addr)]
    pub addr: SocketAddr,

    /// Address the Prometheus metrics endpoint listens on.
    #[arg(long, env = "METRICS_ADDR", default_value = ":3000", value_parser = parse_bind_addr)]
    pub metrics_addr: SocketAddr,

    /// Path of the on-disk event store.
    #[arg(long, env = "STATE_FILE", default_value = "state")]
    pub state_file: String,

    /// How long events are kept before being pruned.
    #[arg(long, env = "RETENTION_PERIOD", default_value = "2h", value_parser = parse_duration)]
    pub retention_period: Duration,

    /// How often the retention task runs.
    #[arg(long, env = "PRUNE_FREQUENCY", default_value = "5m", value_parser = parse_duration)]
    pub prune_frequency: Duration,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Parses a bind address, accepting the `:PORT` shorthand for
/// "all interfaces" as well as a full `host:port`.
fn parse_bind_addr(s: &str) -> Result<SocketAddr, String> {
    let full;
    let addr = if s.starts_with(':') {
        full = format!("0.0.0.0{s}");
        full.as_str()
    } else {
        s
    };
    addr.parse()
        .map_err(|_| format!("'{s}' is not a bind address (expected host:port or :port)"))
}

/// Parses durations like `20s`, `5m`, `2h`, `150ms`, or compounds like
/// `1h30m`. Units: `ms`, `s`, `m`, `h`, `d`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let err = || format!("'{s}' is not a duration (expected e.g. 30s, 5m, 2h, 1h30m)");

    let mut total = Duration::ZERO;
    let mut rest = s;
    if rest.is_empty() {
        return Err(err());
    }

    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(err());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| err())?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86_400),
            _ => return Err(err()),
        };
        total += part;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_defaults() {
        let config = Config::parse_from(["backlog-server"]);
        assert_eq!(config.addr, "0.0.0.0:5566".parse().unwrap());
        assert_eq!(config.metrics_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.state_file, "state");
        assert_eq!(config.retention_period, Duration::from_secs(2 * 3600));
        assert_eq!(config.prune_frequency, Duration::from_secs(5 * 60));
        assert!(!config.log_json);
    }

    #[test]
    fn parses_explicit_flags() {
        let config = Config::parse_from([
            "backlog-server",
            "--addr",
            "127.0.0.1:9000",
            "--state-file",
            "/tmp/buffer.db",
            "--retention-period",
            "1h30m",
            "--prune-frequency",
            "30s",
        ]);
        assert_eq!(config.addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.state_file, "/tmp/buffer.db");
        assert_eq!(config.retention_period, Duration::from_secs(90 * 60));
        assert_eq!(config.prune_frequency, Duration::from_secs(30));
    }

    #[test]
    fn bind_addr_forms() {
        assert_eq!(
            parse_bind_addr(":5566").unwrap(),
            "0.0.0.0:5566".parse().unwrap()
        );
        assert_eq!(
            parse_bind_addr("192.168.1.5:80").unwrap(),
            "192.168.1.5:80".parse().unwrap()
        );
        assert!(parse_bind_addr("not-an-addr").is_err());
        assert!(parse_bind_addr(":").is_err());
    }

    #[test]
    fn duration_forms() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("20s").unwrap(), Duration::from_secs(20));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(90 * 60)
        );

        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("10w").is_err());
        assert!(parse_duration("5m junk").is_err());
    }
}
