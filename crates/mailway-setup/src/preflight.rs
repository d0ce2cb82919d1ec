use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Public host accepting TCP connections on every port.
const PORT_CHECK_HOST: &str = "portquiz.net";

const PORT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Verify outbound connections to `port` are not filtered by the provider.
pub fn check_outbound_port(port: u16) -> Result<()> {
    check_port_on(PORT_CHECK_HOST, port, PORT_CHECK_TIMEOUT)
}

fn check_port_on(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let addr = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("could not resolve {host}"))?
        .next()
        .with_context(|| format!("{host} has no address"))?;

    if let Err(e) = TcpStream::connect_timeout(&addr, timeout) {
        bail!("port {port} appears to be blocked: {e}");
    }
    tracing::debug!(port, "outbound port reachable");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn open_port_passes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        check_port_on("127.0.0.1", port, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn closed_port_fails() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = check_port_on("127.0.0.1", port, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("appears to be blocked"));
    }
}
