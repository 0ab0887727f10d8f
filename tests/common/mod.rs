#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use textws::config::ServerConfig;
use textws::server::{MessageHandler, Server};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use textws::test_utils::{
    client_close, client_frame, client_text, init_test_logging, init_test_logging_with_level,
    read_response_head, read_server_frame, upgrade_request, TEST_ACCEPT, TEST_KEY, TEST_MASK,
};

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;
/// Upper bound for any single network step in the end-to-end tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

const PROPTEST_SEED_ENV: &str = "TEXTWS_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED)
}

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<textws::Result<()>>,
}

impl TestServer {
    /// Binds `config` on 127.0.0.1:0 and serves it in a background task.
    pub async fn start(config: ServerConfig) -> Self {
        Self::start_with(config, None::<textws::LogHandler>).await
    }

    /// Like [`start`](Self::start) with an explicit handler.
    pub async fn start_with<H>(config: ServerConfig, handler: Option<H>) -> Self
    where
        H: MessageHandler + 'static,
    {
        let config = config.bind("127.0.0.1:0".parse().expect("loopback address"));
        let mut server = Server::bind(config).await.expect("bind test server");
        if let Some(handler) = handler {
            server = server.with_handler(handler);
        }
        let addr = server.local_addr().expect("local addr");
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            task,
        }
    }

    /// Opens a raw TCP connection to the server.
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.expect("connect")
    }

    /// Connects and completes the upgrade, returning the stream and the
    /// response head.
    pub async fn upgrade(&self) -> (TcpStream, String) {
        let mut stream = self.connect().await;
        stream
            .write_all(&upgrade_request(TEST_KEY))
            .await
            .expect("send upgrade");
        let head = within(read_response_head(&mut stream)).await;
        (stream, head)
    }

    /// Resolves the shutdown future and waits for the server to stop.
    pub async fn stop(mut self) -> textws::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        within(self.task).await.expect("server task")
    }
}

/// Awaits `fut`, failing the test after [`STEP_TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, fut)
        .await
        .expect("step timed out")
}
