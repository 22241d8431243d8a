//! gRPC channel construction for both URI schemes.
//!
//! `grpc://` connects in plaintext; `grpc+tls://` negotiates TLS with peer
//! verification against the system roots. Skip-verify swaps in a permissive
//! certificate verifier and runs the TLS handshake below tonic, since tonic
//! deliberately exposes no insecure mode.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Uri};

use crate::error::DuckArrowError;
use crate::validate::uri_is_tls;

pub const MAX_ENCODING_MESSAGE_SIZE: usize = 256 * 1024 * 1024;
pub const MAX_DECODING_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

const DEFAULT_TLS_PORT: u16 = 443;

/// Rewrites `grpc://` / `grpc+tls://` into the `http://` / `https://` form
/// tonic expects. Callers validate the URI first.
pub fn http_uri(uri: &str) -> String {
    let trimmed = uri.trim();
    if let Some(rest) = trimmed.strip_prefix("grpc+tls://") {
        format!("https://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("grpc://") {
        format!("http://{}", rest)
    } else {
        trimmed.to_string()
    }
}

fn base_endpoint(uri: &str) -> Result<Endpoint, Box<dyn Error>> {
    let endpoint = Endpoint::from_shared(http_uri(uri))
        .map_err(|e| DuckArrowError::connect(&format!("invalid endpoint: {}", e), Some(uri)))?
        .connect_timeout(CONNECT_TIMEOUT)
        .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(false)
        .tcp_nodelay(true);
    Ok(endpoint)
}

/// Connects the channel eagerly so callers fail fast on unreachable hosts.
pub async fn new_flight_channel(uri: &str, skip_verify: bool) -> Result<Channel, Box<dyn Error>> {
    let tls = uri_is_tls(uri);
    if tls && skip_verify {
        return connect_skip_verify(uri).await;
    }

    let mut endpoint = base_endpoint(uri)?;
    if tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| {
                DuckArrowError::connect(&format!("TLS configuration failed: {}", e), Some(uri))
            })?;
    }
    endpoint
        .connect()
        .await
        .map_err(|e| DuckArrowError::connect(&e.to_string(), Some(uri)).into())
}

/// TLS without peer verification: the handshake runs over tokio-rustls with
/// a verifier that accepts any certificate, and tonic sees a plain stream.
async fn connect_skip_verify(uri: &str) -> Result<Channel, Box<dyn Error>> {
    let authority = http_uri(uri);
    let parsed: Uri = authority
        .parse()
        .map_err(|e| DuckArrowError::connect(&format!("invalid endpoint: {}", e), Some(uri)))?;
    let host = parsed
        .host()
        .ok_or_else(|| DuckArrowError::connect("URI is missing a host", Some(uri)))?
        .to_string();
    let port = parsed.port_u16().unwrap_or(DEFAULT_TLS_PORT);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| {
            DuckArrowError::connect(&format!("TLS configuration failed: {}", e), Some(uri))
        })?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_no_client_auth();
    tls_config.alpn_protocols = vec![b"h2".to_vec()];
    let connector = TlsConnector::from(Arc::new(tls_config));

    // tonic never dials itself here; the connector owns TCP + TLS.
    let endpoint = base_endpoint(uri)?;
    let connect_host = host.clone();
    let channel = endpoint
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let connector = connector.clone();
            let host = connect_host.clone();
            async move {
                let tcp = TcpStream::connect((host.as_str(), port)).await?;
                let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
                })?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok::<_, std::io::Error>(hyper_util::rt::TokioIo::new(tls))
            }
        }))
        .await
        .map_err(|e| DuckArrowError::connect(&e.to_string(), Some(uri)))?;
    Ok(channel)
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: rustls::crypto::CryptoProvider,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        AcceptAnyServerCert {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_uri_rewrite() {
        assert_eq!(http_uri("grpc://h:31337"), "http://h:31337");
        assert_eq!(http_uri("grpc+tls://h:31337"), "https://h:31337");
        assert_eq!(http_uri("  grpc://h:1  "), "http://h:1");
    }

    #[test]
    fn test_base_endpoint_accepts_valid_uri() {
        assert!(base_endpoint("grpc://localhost:50051").is_ok());
        assert!(base_endpoint("grpc+tls://remote.example.com:443").is_ok());
    }
}
