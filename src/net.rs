use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Reduce a server argument to a bare host name. Operators paste the value
/// straight out of the console UI, so scheme prefixes, paths and explicit
/// ports all show up here.
pub fn host_of(server: &str) -> &str {
    let host = match server.split_once("://") {
        Some((_, rest)) => rest,
        None => server,
    };
    let host = host.split('/').next().unwrap_or(host);
    host.split(':').next().unwrap_or(host)
}

/// TCP reachability probe against the management port. Any resolved address
/// accepting the connection counts; resolution failure is simply "unreachable".
pub fn server_reachable(server: &str, port: u16, timeout: Duration) -> bool {
    let host = host_of(server);
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::warn!(host, %e, "failed to resolve destination server");
            return false;
        }
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::TcpListener;

    #[test]
    fn host_of_strips_scheme_path_and_port() {
        assert_eq!(host_of("ds137.awmdm.com"), "ds137.awmdm.com");
        assert_eq!(host_of("https://ds137.awmdm.com"), "ds137.awmdm.com");
        assert_eq!(host_of("https://ds137.awmdm.com/enroll"), "ds137.awmdm.com");
        assert_eq!(host_of("ds137.awmdm.com:8443"), "ds137.awmdm.com");
    }

    #[test]
    fn reachable_when_listener_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(server_reachable(
            "127.0.0.1",
            port,
            Duration::from_millis(500)
        ));
    }

    #[test]
    fn unreachable_after_listener_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!server_reachable(
            "127.0.0.1",
            port,
            Duration::from_millis(500)
        ));
    }

    #[test]
    fn unreachable_when_resolution_fails() {
        assert!(!server_reachable(
            "no-such-host.invalid",
            443,
            Duration::from_millis(200)
        ));
    }
}
