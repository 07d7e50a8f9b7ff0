//! Echo server fixture.

use std::net::SocketAddr;
use std::sync::Arc;

use barews::{ServerConfig, ServerEvent, ServerHandle, WebSocketServer};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A [`WebSocketServer`] that echoes every payload back to its sender and
/// records disconnect reasons.
pub struct TestServer {
    pub handle: ServerHandle,
    disconnects: Arc<Mutex<Vec<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestServer {
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::spawn_with(ServerConfig::default()).await
    }

    pub async fn spawn_with(config: ServerConfig) -> (Self, SocketAddr) {
        let (server, mut events) = WebSocketServer::bind("127.0.0.1:0", config)
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let handle = server.handle();

        let disconnects = Arc::new(Mutex::new(Vec::new()));
        let echo = {
            let handle = handle.clone();
            let disconnects = disconnects.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ServerEvent::Data(socket, payload) => handle.send(&socket, payload),
                        ServerEvent::Disconnect { reason, .. } => disconnects.lock().push(reason),
                        ServerEvent::Request(_, responder) => {
                            let _ = responder.respond(404, "Not Found", &[], b"").await;
                        }
                        ServerEvent::Connection(_) => {}
                    }
                }
            })
        };

        let test_server = Self {
            handle,
            disconnects,
            tasks: vec![tokio::spawn(server.run()), echo],
        };
        (test_server, addr)
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().clone()
    }

    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
