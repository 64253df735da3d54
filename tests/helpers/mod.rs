#![allow(dead_code)]

pub mod mock_server;
pub mod tls;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hopwire=debug")
        .with_test_writer()
        .try_init();
}
