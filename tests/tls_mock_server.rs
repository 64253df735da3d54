use hopwire::{Client, Error, Options, Verify};
use std::io::Write;

mod helpers;
use helpers::mock_server::{response, MockHttpServer};
use helpers::tls::generate_pki;

fn bundle_file(pem: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(pem.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_tls_with_ca_bundle() {
    helpers::init_tracing();

    let pki = generate_pki(&["localhost", "127.0.0.1"]);
    let bundle = bundle_file(&pki.ca_pem);

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    server.start_tls(pki.acceptor, |_| response("200 OK", &[], b"Hello"));

    let client = Client::builder()
        .options(Options::new().verify(Verify::Bundle(bundle.path().to_path_buf())))
        .build()
        .unwrap();

    let resp = client.get(&url).send().await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.protocol_version.as_protocol(), "HTTP/1.1");
    assert_eq!(resp.text().unwrap(), "Hello");
}

#[tokio::test]
async fn test_tls_name_mismatch() {
    helpers::init_tracing();

    let pki = generate_pki(&["other.test"]);
    let bundle = bundle_file(&pki.ca_pem);

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    server.start_tls(pki.acceptor, |_| response("200 OK", &[], b"Hello"));

    let client = Client::builder()
        .options(Options::new().verify(Verify::Bundle(bundle.path().to_path_buf())))
        .build()
        .unwrap();

    let err = client.get(&url).send().await.unwrap_err();
    match err {
        Error::CertificateMismatch { host } => assert_eq!(host, "localhost"),
        other => panic!("expected CertificateMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tls_name_check_disabled() {
    helpers::init_tracing();

    let pki = generate_pki(&["other.test"]);
    let bundle = bundle_file(&pki.ca_pem);

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    server.start_tls(pki.acceptor, |_| response("200 OK", &[], b"Hello"));

    let options = Options::new()
        .verify(Verify::Bundle(bundle.path().to_path_buf()))
        .verify_name(false);
    let resp = Client::new()
        .get(&url)
        .options(options)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_tls_untrusted_chain() {
    helpers::init_tracing();

    // Server certificate comes from a CA the client does not trust.
    let pki = generate_pki(&["localhost"]);
    let unrelated = generate_pki(&["localhost"]);
    let bundle = bundle_file(&unrelated.ca_pem);

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    server.start_tls(pki.acceptor, |_| response("200 OK", &[], b"Hello"));

    let client = Client::builder()
        .options(Options::new().verify(Verify::Bundle(bundle.path().to_path_buf())))
        .build()
        .unwrap();

    let err = client.get(&url).send().await.unwrap_err();
    assert!(matches!(err, Error::Tls(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_tls_verification_off() {
    helpers::init_tracing();

    let pki = generate_pki(&["other.test"]);

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    server.start_tls(pki.acceptor, |_| response("200 OK", &[], b"Hello"));

    let client = Client::builder()
        .options(Options::new().verify(false))
        .build()
        .unwrap();

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text().unwrap(), "Hello");
}

#[tokio::test]
async fn test_tls_missing_bundle_file() {
    let client = Client::builder()
        .options(Options::new().verify(Verify::Bundle("/nonexistent/ca.pem".into())))
        .build()
        .unwrap();

    let err = client.get("https://localhost:1/").send().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)), "got {:?}", err);
}
