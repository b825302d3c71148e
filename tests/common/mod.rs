//! Shared fixtures for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. Honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Upstream body split into the given chunks.
pub fn body_stream(
    chunks: &[&'static str],
) -> tokio_stream::Iter<std::vec::IntoIter<Result<Bytes, Infallible>>> {
    let items: Vec<Result<Bytes, Infallible>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    tokio_stream::iter(items)
}

/// Give spawned store writes a chance to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
