use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Endpoint;

/// Connect to `endpoint`, giving up after `timeout`.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    let stream = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(TransportError::TimedOut {
                endpoint: endpoint.clone(),
                after: timeout,
            })
        }
    };
    // Commands are tiny and latency-sensitive.
    stream.set_nodelay(true)?;
    debug!(%endpoint, "connected");
    Ok(stream)
}

/// Listening side of the link (the motion controller).
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind and listen on `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening for host connections");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
