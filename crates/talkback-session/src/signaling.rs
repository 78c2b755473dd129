//! Outbound signaling socket carrying encoded audio to the remote endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use talkback_settings::SignalingSettings;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, trace, warn};

use crate::errors::{StreamKind, TalkbackError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a close handshake may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// An open signaling connection.
#[async_trait]
pub trait SignalingConnection: Send + Sync {
    /// Send one binary message.
    async fn send_binary(&self, payload: Bytes) -> Result<(), TalkbackError>;

    /// Close the connection. Later calls are no-ops.
    async fn close(&self);
}

/// Dials signaling connections.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn SignalingConnection>, TalkbackError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct WsSignalingConnector {
    connect_timeout: Duration,
    accept_invalid_certs: bool,
}

impl WsSignalingConnector {
    /// Create a connector from settings.
    pub fn new(settings: &SignalingSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            accept_invalid_certs: settings.accept_invalid_certs,
        }
    }
}

#[async_trait]
impl SignalingConnector for WsSignalingConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn SignalingConnection>, TalkbackError> {
        let fail = |reason: String| TalkbackError::SignalingConnect {
            url: url.to_string(),
            reason,
        };

        let connector = if url.starts_with("wss://") {
            let config = tls_config(self.accept_invalid_certs).map_err(|e| fail(e.to_string()))?;
            Some(Connector::Rustls(Arc::new(config)))
        } else if url.starts_with("ws://") {
            None
        } else {
            return Err(fail("unsupported scheme".into()));
        };

        debug!(url, insecure = self.accept_invalid_certs, "dialing signaling socket");

        let (ws, _response) = tokio::time::timeout(
            self.connect_timeout,
            connect_async_tls_with_config(url, None, true, connector),
        )
        .await
        .map_err(|_| fail(format!("timed out after {:?}", self.connect_timeout)))?
        .map_err(|e| fail(e.to_string()))?;

        debug!(url, "signaling socket connected");
        Ok(Arc::new(WsSignaling::new(url, ws, self.connect_timeout)))
    }
}

/// Client TLS configuration for `wss://` dials.
fn tls_config(accept_invalid_certs: bool) -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(config)
}

/// Certificate verifier that trusts any server. Signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// An open WebSocket signaling connection.
pub struct WsSignaling {
    url: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    send_timeout: Duration,
    closed: AtomicBool,
    reader: JoinHandle<()>,
}

impl WsSignaling {
    fn new(url: &str, ws: WsStream, send_timeout: Duration) -> Self {
        let (sink, stream) = ws.split();
        let reader = tokio::spawn(drain_inbound(url.to_string(), stream));
        Self {
            url: url.to_string(),
            sink: Mutex::new(sink),
            send_timeout,
            closed: AtomicBool::new(false),
            reader,
        }
    }

    /// URL this connection was dialed to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Read and discard inbound frames so control frames keep being answered.
async fn drain_inbound(url: String, mut stream: SplitStream<WsStream>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(frame)) => {
                debug!(url, ?frame, "signaling peer closed");
                break;
            }
            Ok(msg) => trace!(url, len = msg.len(), "inbound signaling frame ignored"),
            Err(e) => {
                debug!(url, error = %e, "signaling read ended");
                break;
            }
        }
    }
}

#[async_trait]
impl SignalingConnection for WsSignaling {
    async fn send_binary(&self, payload: Bytes) -> Result<(), TalkbackError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TalkbackError::write(StreamKind::Signaling, "connection closed"));
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.send_timeout, sink.send(Message::Binary(payload))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TalkbackError::write(StreamKind::Signaling, e)),
            Err(_) => Err(TalkbackError::write(
                StreamKind::Signaling,
                format!("send timed out after {:?}", self.send_timeout),
            )),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!(url = %self.url, "signaling socket closed"),
            Ok(Err(e)) => debug!(url = %self.url, error = %e, "signaling close failed"),
            Err(_) => warn!(url = %self.url, "signaling close timed out"),
        }
        self.reader.abort();
    }
}

impl Drop for WsSignaling {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
