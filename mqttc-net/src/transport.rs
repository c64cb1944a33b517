use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

#[cfg(feature = "tls")]
use rustls::{
    pki_types::{pem::PemObject, CertificateDer, ServerName},
    ClientConfig, RootCertStore,
};
#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use tokio_rustls::{client::TlsStream, TlsConnector};

#[cfg(feature = "ws")]
use crate::ws::WsStream;
use crate::{MqttError, Result};

/// Any full duplex byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedTransport = Box<dyn Transport>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    #[inline]
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Tcp => 1883,
            Scheme::Tls => 8883,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }

    #[inline]
    pub fn is_tls(&self) -> bool {
        matches!(self, Scheme::Tls | Scheme::Wss)
    }
}

impl FromStr for Scheme {
    type Err = MqttError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => Scheme::Tcp,
            "mqtts" | "tls" | "ssl" => Scheme::Tls,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            _ => return Err(MqttError::UnsupportedScheme(s.into())),
        })
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Tcp => "mqtt",
            Scheme::Tls => "mqtts",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        })
    }
}

/// Broker address, e.g. `mqtt://localhost:1883` or `wss://broker.example.com/mqtt`.
///
/// A bare `host:port` is read as plain tcp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ServerAddr {
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        let url = if addr.contains("://") {
            url::Url::parse(addr)
        } else {
            url::Url::parse(&format!("mqtt://{addr}"))
        }
        .map_err(|e| MqttError::InvalidUrl(format!("{addr}, {e}")))?;

        let scheme = Scheme::from_str(url.scheme())?;
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            _ => return Err(MqttError::InvalidUrl(format!("{addr}, missing host"))),
        };
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let path = match url.path() {
            "" | "/" if matches!(scheme, Scheme::Ws | Scheme::Wss) => "/mqtt".into(),
            p => p.to_string(),
        };
        Ok(ServerAddr { scheme, host, port, path })
    }

    #[inline]
    pub fn is_tls(&self) -> bool {
        self.scheme.is_tls()
    }

    #[cfg(feature = "ws")]
    fn ws_url(&self) -> String {
        let scheme = if self.is_tls() { "wss" } else { "ws" };
        if self.host.contains(':') {
            format!("{scheme}://[{}]:{}{}", self.host, self.port, self.path)
        } else {
            format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
        }
    }
}

impl FromStr for ServerAddr {
    type Err = MqttError;

    fn from_str(s: &str) -> Result<Self> {
        ServerAddr::parse(s)
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if matches!(self.scheme, Scheme::Ws | Scheme::Wss) {
            f.write_str(&self.path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DialOptions {
    /// Zero waits for the OS to give up.
    pub connect_timeout: Duration,
    /// Path to an extra PEM root certificate, trusted on top of the webpki roots
    pub root_cert: Option<String>,
}

/// Open a byte stream to `addr`, performing the TLS and WebSocket handshakes its scheme asks for.
pub async fn dial(addr: &ServerAddr, opts: &DialOptions) -> Result<BoxedTransport> {
    log::debug!("dialing {addr}");
    if opts.connect_timeout.is_zero() {
        dial_inner(addr, opts).await
    } else {
        match tokio::time::timeout(opts.connect_timeout, dial_inner(addr, opts)).await {
            Ok(res) => res,
            Err(_) => Err(MqttError::ConnectTimeout),
        }
    }
}

#[allow(unused_variables)]
async fn dial_inner(addr: &ServerAddr, opts: &DialOptions) -> Result<BoxedTransport> {
    let tcp = TcpStream::connect((addr.host.as_str(), addr.port)).await?;
    tcp.set_nodelay(true)?;
    match addr.scheme {
        Scheme::Tcp => Ok(Box::new(tcp)),
        #[cfg(feature = "tls")]
        Scheme::Tls => Ok(Box::new(tls_connect(addr, opts, tcp).await?)),
        #[cfg(feature = "ws")]
        Scheme::Ws => Ok(Box::new(ws_connect(addr, tcp).await?)),
        #[cfg(all(feature = "tls", feature = "ws"))]
        Scheme::Wss => {
            let tls = tls_connect(addr, opts, tcp).await?;
            Ok(Box::new(ws_connect(addr, tls).await?))
        }
        #[allow(unreachable_patterns)]
        scheme => Err(MqttError::UnsupportedScheme(format!("{scheme}, feature not enabled"))),
    }
}

#[cfg(feature = "tls")]
fn build_tls_connector(root_cert: Option<&str>) -> Result<TlsConnector> {
    let mut root_store = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.into() };

    if let Some(c) = root_cert {
        root_store.add_parsable_certificates(
            CertificateDer::pem_file_iter(c)
                .map_err(|e| MqttError::Tls(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| MqttError::Tls(e.to_string()))?,
        );
    }

    let config = ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(feature = "tls")]
async fn tls_connect(addr: &ServerAddr, opts: &DialOptions, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let connector = build_tls_connector(opts.root_cert.as_deref())?;
    let domain = ServerName::try_from(addr.host.clone()).map_err(|e| MqttError::Tls(e.to_string()))?;
    Ok(connector.connect(domain, tcp).await?)
}

#[cfg(feature = "ws")]
async fn ws_connect<S>(addr: &ServerAddr, stream: S) -> Result<WsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    let mut req = addr.ws_url().into_client_request().map_err(|e| MqttError::WebSocket(e.to_string()))?;
    req.headers_mut().insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mqtt"));
    let (ws, _resp) =
        tokio_tungstenite::client_async(req, stream).await.map_err(|e| MqttError::WebSocket(e.to_string()))?;
    Ok(WsStream::new(ws))
}
