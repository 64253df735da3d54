use std::sync::Arc;

use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// A test CA plus a TLS acceptor whose leaf certificate it issued.
pub struct TestPki {
    pub acceptor: TlsAcceptor,
    /// PEM of the CA certificate, suitable for a bundle file.
    pub ca_pem: String,
}

fn ca() -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "hopwire test CA");
    let key = KeyPair::generate().expect("Failed to generate CA key");
    let cert = params.self_signed(&key).expect("Failed to sign CA");
    (cert, key)
}

/// Issue a leaf for `names` (DNS names or IP literals) from a fresh CA.
pub fn generate_pki(names: &[&str]) -> TestPki {
    let (ca_cert, ca_key) = ca();

    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let mut params = CertificateParams::new(names).expect("Failed to build leaf params");
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "hopwire test leaf");
    let leaf_key = KeyPair::generate().expect("Failed to generate leaf key");
    let leaf = params
        .signed_by(&leaf_key, &ca_cert, &ca_key)
        .expect("Failed to sign leaf");

    let chain = vec![
        CertificateDer::from(leaf.der().to_vec()),
        CertificateDer::from(ca_cert.der().to_vec()),
    ];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));

    let mut config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("Failed to set protocol versions")
    .with_no_client_auth()
    .with_single_cert(chain, key)
    .expect("Failed to set certificate");
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    TestPki {
        acceptor: TlsAcceptor::from(Arc::new(config)),
        ca_pem: ca_cert.pem(),
    }
}
