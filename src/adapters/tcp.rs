use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Check whether `host:port` accepts a TCP connection within `timeout`.
///
/// The connection is dropped as soon as it is established. Resolution
/// failures, refusals and timeouts all report `false`.
#[instrument(skip(timeout))]
pub async fn is_reachable_tcp(host: &str, port: u16, timeout: Duration) -> bool {
    let addr = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "tcp connect failed");
            false
        }
        Err(_) => {
            debug!(%addr, "tcp connect timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn local_listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_reachable_tcp("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!is_reachable_tcp("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn ipv6_literal_is_bracketed() {
        let Ok(listener) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let port = listener.local_addr().unwrap().port();
        assert!(is_reachable_tcp("::1", port, Duration::from_secs(1)).await);
    }
}
