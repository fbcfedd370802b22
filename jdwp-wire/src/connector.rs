// Transport connectors
//
// A connector only establishes the byte stream; the handshake and everything
// above it are transport independent.

use crate::protocol::{JdwpError, JdwpResult, JDWP_HANDSHAKE};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Something that can produce a connected stream to a debuggee VM
pub trait Connector {
    fn connect(&self) -> impl Future<Output = JdwpResult<TcpStream>> + Send;
}

/// Attach to a VM started with `server=y`
#[derive(Debug, Clone)]
pub struct SocketAttachConnector {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl SocketAttachConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Connector for SocketAttachConnector {
    async fn connect(&self) -> JdwpResult<TcpStream> {
        info!("Connecting to JDWP at {}:{}", self.host, self.port);

        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(stream) => Ok(stream?),
            Err(_) => Err(timed_out("connect", self.timeout)),
        }
    }
}

/// Wait for a VM started with `server=n` to connect back
#[derive(Debug)]
pub struct SocketListenConnector {
    listener: TcpListener,
    timeout: Option<Duration>,
}

impl SocketListenConnector {
    pub async fn bind(addr: SocketAddr) -> JdwpResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening for a VM on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn local_addr(&self) -> JdwpResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

impl Connector for SocketListenConnector {
    async fn connect(&self) -> JdwpResult<TcpStream> {
        let accept = self.listener.accept();
        let (stream, peer) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, accept)
                .await
                .map_err(|_| timed_out("accept", limit))??,
            None => accept.await?,
        };

        info!("VM connected from {}", peer);
        Ok(stream)
    }
}

fn timed_out(what: &str, limit: Duration) -> JdwpError {
    JdwpError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} timed out after {:?}", what, limit),
    ))
}

/// Perform the debugger side of the JDWP handshake
pub async fn handshake<S>(stream: &mut S) -> JdwpResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Performing JDWP handshake");

    stream.write_all(JDWP_HANDSHAKE).await?;
    stream.flush().await?;

    expect_handshake(stream).await?;

    info!("JDWP handshake successful");
    Ok(())
}

/// Read the 14 handshake bytes and check them
pub async fn expect_handshake<S: AsyncRead + Unpin>(stream: &mut S) -> JdwpResult<()> {
    let mut buf = [0u8; JDWP_HANDSHAKE.len()];
    stream.read_exact(&mut buf).await?;

    if buf != JDWP_HANDSHAKE {
        warn!("Invalid handshake response: {:?}", buf);
        return Err(JdwpError::InvalidHandshake);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_accepts_echo() {
        let (mut debugger, mut vm) = tokio::io::duplex(64);

        let vm_side = tokio::spawn(async move {
            expect_handshake(&mut vm).await.unwrap();
            vm.write_all(JDWP_HANDSHAKE).await.unwrap();
        });

        handshake(&mut debugger).await.unwrap();
        vm_side.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejects_garbage() {
        let (mut debugger, mut vm) = tokio::io::duplex(64);

        tokio::spawn(async move {
            let mut buf = [0u8; 14];
            vm.read_exact(&mut buf).await.unwrap();
            vm.write_all(b"NOT-A-HANDSHAK").await.unwrap();
        });

        assert!(matches!(
            handshake(&mut debugger).await,
            Err(JdwpError::InvalidHandshake)
        ));
    }

    #[tokio::test]
    async fn test_listen_connector_accepts_vm() {
        let connector = SocketListenConnector::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        let addr = connector.local_addr().unwrap();

        let vm = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            expect_handshake(&mut stream).await.unwrap();
            stream.write_all(JDWP_HANDSHAKE).await.unwrap();
        });

        let mut stream = connector.connect().await.unwrap();
        handshake(&mut stream).await.unwrap();
        vm.await.unwrap();
    }

    #[tokio::test]
    async fn test_attach_connector_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = SocketAttachConnector::new("127.0.0.1", port);
        connector.connect().await.unwrap();
        accept.await.unwrap();
    }
}
