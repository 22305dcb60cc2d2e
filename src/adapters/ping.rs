//! Platform specific ping invocation and output parsing.
//!
//! Both strategies send a single ICMP echo request with a ~2 second timeout;
//! they only differ in the command line and in the shape of the text the
//! system `ping` prints.

use std::sync::LazyLock;

use regex::Regex;

static POSIX_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d+\.?\d*)\s*ms").expect("static regex")
});

static WINDOWS_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time[=<](\d+\.?\d*)\s*ms").expect("static regex")
});

/// Outcome extracted from the output of one ping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingReading {
    /// Reply received with a measured round trip in whole milliseconds.
    Latency(i64),
    /// Tool reports one packet received but no parseable time.
    ReceivedUnmeasured,
    /// Nothing in the output proves a reply arrived.
    NoReply,
}

/// Platform specific way of running `ping` and reading its output.
pub trait ReachabilityStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Program to execute.
    fn program(&self) -> &str {
        "ping"
    }

    /// Arguments probing `target` once.
    fn args(&self, target: &str) -> Vec<String>;

    /// Interpret the combined stdout/stderr of a successful run.
    fn parse(&self, output: &str) -> PingReading;
}

/// `ping -c 1 -W 2` as shipped by iputils, busybox and the BSDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixPing;

impl ReachabilityStrategy for PosixPing {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn args(&self, target: &str) -> Vec<String> {
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            "2".into(),
            target.to_string(),
        ]
    }

    fn parse(&self, output: &str) -> PingReading {
        parse_with(&POSIX_RTT, output, &["1 received", "1 packets received"])
    }
}

/// `ping -n 1 -w 2000` from the Windows toolset.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPing;

impl ReachabilityStrategy for WindowsPing {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn args(&self, target: &str) -> Vec<String> {
        vec![
            "-n".into(),
            "1".into(),
            "-w".into(),
            "2000".into(),
            target.to_string(),
        ]
    }

    fn parse(&self, output: &str) -> PingReading {
        parse_with(&WINDOWS_RTT, output, &["Received = 1", "Lost = 0"])
    }
}

fn parse_with(rtt: &Regex, output: &str, received_markers: &[&str]) -> PingReading {
    if let Some(ms) = rtt
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return PingReading::Latency(ms.round() as i64);
    }
    if received_markers.iter().any(|marker| output.contains(*marker)) {
        return PingReading::ReceivedUnmeasured;
    }
    PingReading::NoReply
}

/// Strategy matching the platform this binary was built for.
pub fn default_strategy() -> Box<dyn ReachabilityStrategy> {
    if cfg!(windows) {
        Box::new(WindowsPing)
    } else {
        Box::new(PosixPing)
    }
}
