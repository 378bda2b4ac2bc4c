//! Listener sourcing: fresh bind or a socket inherited through socket activation.
//!
//! # Responsibilities
//! - Collect sockets passed in by the init system (`LISTEN_FDS`)
//! - Decide, once, which single listener the process serves from
//! - Fail fast on conflicting or unsupported configurations
//!
//! # Design Decisions
//! - The decision is a value (`ListenerSource`) resolved before serving and never revisited
//! - Exactly one socket per process; more is a startup error
//! - An inherited socket plus an explicit address/port is a conflict, never a silent choice

use std::io;
use std::net::{IpAddr, SocketAddr};

use listenfd::ListenFd;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::SpeedtestConfig;

/// Error type for listener sourcing.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("error whilst checking for socket activation: {0}")]
    Activation(#[source] io::Error),

    #[error("proxyprotocol_port is deprecated, use enable_proxyprotocol")]
    DeprecatedProxyPort,

    #[error(
        "configure either 'bind_address' and 'listen_port' or socket activation, not both \
         (set both to '' to use the inherited socket)"
    )]
    Conflict,

    #[error("asked to listen on {0} sockets via socket activation, only 1 is supported")]
    TooManySockets(usize),

    #[error("invalid listen_port {0:?}")]
    InvalidPort(String),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot use inherited socket: {0}")]
    Inherited(#[source] io::Error),
}

/// Where the process listener comes from.
#[derive(Debug)]
pub enum ListenerSource {
    /// Bind a new socket.
    FreshBind { address: String, port: u16 },
    /// Use a socket created by the init system.
    Inherited(std::net::TcpListener),
}

impl ListenerSource {
    /// Pick the listener source from the configuration and inherited sockets.
    pub fn resolve(config: &SpeedtestConfig, mut inherited: Vec<std::net::TcpListener>) -> Result<Self, ListenerError> {
        if config.uses_legacy_proxy_port() {
            return Err(ListenerError::DeprecatedProxyPort);
        }

        match inherited.len() {
            0 => {
                let port = parse_port(&config.listen_port)?;
                Ok(Self::FreshBind {
                    address: config.bind_address.clone(),
                    port,
                })
            }
            1 => {
                if config.has_explicit_bind() {
                    tracing::error!(
                        bind_address = %config.bind_address,
                        listen_port = %config.listen_port,
                        "Both an address/port has been configured and socket activation has been detected"
                    );
                    return Err(ListenerError::Conflict);
                }
                Ok(Self::Inherited(inherited.remove(0)))
            }
            n => Err(ListenerError::TooManySockets(n)),
        }
    }

    /// Turn the resolved source into a Tokio listener.
    pub async fn into_listener(self) -> Result<TcpListener, ListenerError> {
        match self {
            Self::FreshBind { address, port } => {
                let addr = bind_addr(&address, port)?;
                tracing::info!(address = %addr, "Starting backend server");
                TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
                    addr: addr.to_string(),
                    source,
                })
            }
            Self::Inherited(listener) => {
                tracing::info!("Starting backend server on inherited socket via socket activation");
                listener.set_nonblocking(true).map_err(ListenerError::Inherited)?;
                TcpListener::from_std(listener).map_err(ListenerError::Inherited)
            }
        }
    }
}

/// TCP sockets handed over by the init system, in descriptor order.
pub fn inherited_sockets() -> Result<Vec<std::net::TcpListener>, ListenerError> {
    let mut fds = ListenFd::from_env();
    let mut sockets = Vec::with_capacity(fds.len());
    for index in 0..fds.len() {
        if let Some(listener) = fds.take_tcp_listener(index).map_err(ListenerError::Activation)? {
            sockets.push(listener);
        }
    }
    Ok(sockets)
}

/// Resolve and open the process listener.
pub async fn bind_listener(config: &SpeedtestConfig) -> Result<TcpListener, ListenerError> {
    let inherited = inherited_sockets()?;
    ListenerSource::resolve(config, inherited)?.into_listener().await
}

fn parse_port(port: &str) -> Result<u16, ListenerError> {
    if port.is_empty() {
        return Ok(0);
    }
    port.parse()
        .map_err(|_| ListenerError::InvalidPort(port.to_string()))
}

fn bind_addr(address: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let host = address.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = if host.is_empty() {
        IpAddr::from([0, 0, 0, 0])
    } else {
        host.parse().map_err(|e| ListenerError::Bind {
            addr: format!("{address}:{port}"),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?
    };
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bind_address: &str, listen_port: &str) -> SpeedtestConfig {
        SpeedtestConfig {
            bind_address: bind_address.into(),
            listen_port: listen_port.into(),
            ..Default::default()
        }
    }

    fn inherited() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[tokio::test]
    async fn no_inherited_socket_binds_fresh() {
        let source = ListenerSource::resolve(&config("127.0.0.1", "0"), Vec::new()).unwrap();
        assert!(matches!(source, ListenerSource::FreshBind { port: 0, .. }));

        let listener = source.into_listener().await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn fresh_bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port().to_string();

        let source = ListenerSource::resolve(&config("127.0.0.1", &port), Vec::new()).unwrap();
        assert!(matches!(source.into_listener().await, Err(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn single_inherited_socket_is_used() {
        let socket = inherited();
        let addr = socket.local_addr().unwrap();

        let source = ListenerSource::resolve(&config("", ""), vec![socket]).unwrap();
        assert!(matches!(source, ListenerSource::Inherited(_)));
        let listener = source.into_listener().await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), addr);
    }

    #[test]
    fn inherited_socket_with_explicit_bind_conflicts() {
        for (address, port) in [("127.0.0.1", ""), ("", "8989"), ("0.0.0.0", "8989")] {
            let result = ListenerSource::resolve(&config(address, port), vec![inherited()]);
            assert!(matches!(result, Err(ListenerError::Conflict)));
        }
    }

    #[test]
    fn more_than_one_inherited_socket_fails() {
        let result = ListenerSource::resolve(&config("", ""), vec![inherited(), inherited()]);
        assert!(matches!(result, Err(ListenerError::TooManySockets(2))));
    }

    #[test]
    fn legacy_proxy_port_is_rejected() {
        let mut cfg = config("", "");
        cfg.proxyprotocol_port = "8443".into();
        assert!(matches!(
            ListenerSource::resolve(&cfg, Vec::new()),
            Err(ListenerError::DeprecatedProxyPort)
        ));
    }

    #[test]
    fn bind_address_forms() {
        assert_eq!(bind_addr("", 80).unwrap(), "0.0.0.0:80".parse().unwrap());
        assert_eq!(bind_addr("[::1]", 80).unwrap(), "[::1]:80".parse().unwrap());
        assert!(bind_addr("localhost", 80).is_err());
        assert!(matches!(parse_port("http"), Err(ListenerError::InvalidPort(_))));
    }
}
