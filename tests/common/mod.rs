//! Shared utilities for integration tests.

use std::net::SocketAddr;

use admission_gate::config::GuardConfig;
use admission_gate::http::GuardServer;
use admission_gate::lifecycle::Shutdown;
use admission_gate::GuardStack;
use tokio::net::TcpListener;

/// A gate serving on an ephemeral local port.
pub struct RunningGate {
    pub addr: SocketAddr,
    pub stack: GuardStack,
    pub shutdown: Shutdown,
}

impl RunningGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGate {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gate with `config` on 127.0.0.1:0.
pub async fn start_gate(mut config: GuardConfig) -> RunningGate {
    config.observability.metrics_enabled = false;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GuardServer::new(config).unwrap();
    let stack = server.stack().clone();
    let shutdown = Shutdown::new();
    let stop = shutdown.wait();

    tokio::spawn(async move {
        let _ = server.run(listener, stop).await;
    });

    RunningGate {
        addr,
        stack,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
