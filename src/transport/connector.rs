//! TCP + rustls connector.
//!
//! Chain trust is delegated to rustls/webpki. Host identity is checked
//! separately against the certificate's subjectAltName/CN with the rules
//! in [`crate::ssl`], so a name mismatch surfaces as
//! `Error::CertificateMismatch` instead of a generic handshake failure.
//!
//! With a proxy configured, every connection dials the proxy. `https`
//! targets are tunnelled with `CONNECT` before the handshake.

use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use crate::error::{Error, Result};
use crate::options::{Options, Proxy, Verify};
use crate::parser::{parse_head, MAX_HEADERS_SIZE};
use crate::ssl::{self, Certificate};

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    Https(Box<TlsStream<TcpStream>>),
}

impl MaybeHttpsStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Https(_))
    }

    /// Leaf certificate presented by the server, if any.
    pub fn peer_certificate(&self) -> Option<&CertificateDer<'static>> {
        match self {
            Self::Http(_) => None,
            Self::Https(stream) => stream.get_ref().1.peer_certificates()?.first(),
        }
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Validates the chain via webpki but leaves the name check to `ssl`.
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any certificate; handshake signatures are still checked.
#[derive(Debug)]
struct NoVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Opens plain or TLS connections according to request options.
#[derive(Clone)]
pub struct Connector {
    tls_config: Arc<ClientConfig>,
    verify_name: bool,
    connect_timeout: Option<Duration>,
    proxy: Option<Proxy>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("verify_name", &self.verify_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("proxy", &self.proxy.as_ref().map(|p| p.url.as_str()))
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Build a connector for the trust settings in `options`.
    ///
    /// A `Verify::Bundle` path is read here; failure to read it is an `Io` error.
    pub async fn from_options(options: &Options) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let verifier: Arc<dyn ServerCertVerifier> = match &options.verify {
            Verify::Off => Arc::new(NoVerifier {
                algorithms: provider.signature_verification_algorithms,
            }),
            Verify::Platform => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                chain_verifier(roots, &provider)?
            }
            Verify::Bundle(path) => {
                let pem = tokio::fs::read(path).await?;
                let mut roots = RootCertStore::empty();
                for cert in CertificateDer::pem_slice_iter(&pem) {
                    let cert = cert.map_err(|e| {
                        Error::tls(format!("invalid PEM in {}: {}", path.display(), e))
                    })?;
                    roots
                        .add(cert)
                        .map_err(|e| Error::tls(format!("invalid root certificate: {}", e)))?;
                }
                if roots.is_empty() {
                    return Err(Error::tls(format!(
                        "no certificates found in {}",
                        path.display()
                    )));
                }
                chain_verifier(roots, &provider)?
            }
        };

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(format!("Failed to configure TLS: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            tls_config: Arc::new(config),
            verify_name: options.verify_name && options.verify != Verify::Off,
            connect_timeout: options.connect_timeout,
            proxy: options.proxy.clone(),
        })
    }

    /// Connect to the URL's host, performing the TLS handshake for https.
    pub async fn connect(&self, url: &Url) -> Result<MaybeHttpsStream> {
        let connect = self.connect_inner(url);
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => connect.await,
        }
    }

    async fn connect_inner(&self, url: &Url) -> Result<MaybeHttpsStream> {
        let host = url
            .host()
            .ok_or_else(|| Error::connection("Missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::connection(format!("No port for {}", url)))?;

        let addr_host = match &host {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };

        let (dial_host, dial_port) = match &self.proxy {
            Some(proxy) => proxy.address(),
            None => (addr_host.clone(), port),
        };

        tracing::debug!(host = %dial_host, port = dial_port, "connecting");
        let mut tcp_stream = TcpStream::connect((dial_host.as_str(), dial_port))
            .await
            .map_err(|e| {
                Error::connection(format!(
                    "Failed to connect to {}:{}: {}",
                    dial_host, dial_port, e
                ))
            })?;
        // Best effort; small requests should not wait on Nagle.
        let _ = tcp_stream.set_nodelay(true);

        if url.scheme() != "https" {
            return Ok(MaybeHttpsStream::Http(tcp_stream));
        }

        if let Some(proxy) = &self.proxy {
            let authority = format!("{}:{}", url.host_str().unwrap_or_default(), port);
            open_tunnel(&mut tcp_stream, &authority, proxy).await?;
        }

        let server_name = match host {
            Host::Domain(domain) => ServerName::try_from(domain.to_string())
                .map_err(|e| Error::tls(format!("Invalid server name {}: {}", domain, e)))?,
            Host::Ipv4(ip) => ServerName::IpAddress(IpAddr::V4(ip).into()),
            Host::Ipv6(ip) => ServerName::IpAddress(IpAddr::V6(ip).into()),
        };

        let connector = TlsConnector::from(self.tls_config.clone());
        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;
        let stream = MaybeHttpsStream::Https(Box::new(tls_stream));
        tracing::debug!(host = %addr_host, "TLS handshake complete");

        if self.verify_name {
            verify_peer_identity(&stream, &addr_host)?;
        }

        Ok(stream)
    }
}

/// Ask the proxy for a `CONNECT` tunnel to `authority` (host:port).
async fn open_tunnel(stream: &mut TcpStream, authority: &str, proxy: &Proxy) -> Result<()> {
    let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", authority);
    if let Some(auth) = proxy.authorization() {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::connection(format!("Failed to write CONNECT: {}", e)))?;

    // The proxy sends nothing past the head until the client speaks TLS.
    let mut buffer = BytesMut::with_capacity(1024);
    let head = loop {
        if let Some(head) = parse_head(&buffer)? {
            if !head.is_informational() {
                break head;
            }
            let _ = buffer.split_to(head.len);
            continue;
        }
        if buffer.len() >= MAX_HEADERS_SIZE {
            return Err(Error::parse("Proxy response headers too large"));
        }
        let n = stream
            .read_buf(&mut buffer)
            .await
            .map_err(|e| Error::connection(format!("Failed to read CONNECT response: {}", e)))?;
        if n == 0 {
            return Err(Error::connection("Proxy closed the connection during CONNECT"));
        }
    };

    if !(200..300).contains(&head.status) {
        tracing::warn!(status = head.status, authority, "proxy refused tunnel");
        return Err(Error::connection(format!(
            "Proxy CONNECT to {} failed: {} {}",
            authority, head.status, head.reason
        )));
    }

    tracing::debug!(authority, "proxy tunnel established");
    Ok(())
}

fn chain_verifier(
    roots: RootCertStore,
    provider: &Arc<CryptoProvider>,
) -> Result<Arc<dyn ServerCertVerifier>> {
    let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| Error::tls(format!("Failed to build certificate verifier: {}", e)))?;
    Ok(Arc::new(ChainOnlyVerifier { inner }))
}

fn verify_peer_identity(stream: &MaybeHttpsStream, host: &str) -> Result<()> {
    let der = stream
        .peer_certificate()
        .ok_or_else(|| Error::tls("Server presented no certificate"))?;
    let certificate = Certificate::from_der(der)?;

    if ssl::verify_certificate(host, &certificate) {
        Ok(())
    } else {
        tracing::warn!(
            host,
            common_name = certificate.common_name.as_deref().unwrap_or_default(),
            "certificate does not match host"
        );
        Err(Error::CertificateMismatch {
            host: host.to_string(),
        })
    }
}
