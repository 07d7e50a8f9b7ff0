//! Echo server.
//!
//! Run with: `cargo run --example echo_server [-- --secure]`
//!
//! Every payload is sent back to the socket it came from. Plain HTTP
//! requests get a short text response. `--secure` serves `wss://` with a
//! throwaway self-signed certificate.

use barews::{ServerConfig, ServerEvent, WebSocketServer};
use log::info;

const ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> barews::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let secure = std::env::args().any(|arg| arg == "--secure");
    let config = ServerConfig::default()
        .with_verbose(true)
        .with_secure(secure);

    let (server, mut events) = WebSocketServer::bind(ADDR, config).await?;
    info!("listening on port {}", server.local_addr()?.port());

    let handle = server.handle();
    tokio::spawn(server.run());

    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Connection(socket) => info!("new connection: {:?}", socket),
            ServerEvent::Data(socket, payload) => {
                info!("{}", String::from_utf8_lossy(&payload));
                handle.send(&socket, payload);
            }
            ServerEvent::Request(request, responder) => {
                info!("http request: {} {}", request.method(), request.target());
                let body = if secure {
                    &b"Testing secure Websocket channel"[..]
                } else {
                    &b"Testing Websocket channel"[..]
                };
                if let Err(e) = responder
                    .respond(200, "OK", &[("Content-Type", "text/plain")], body)
                    .await
                {
                    info!("response failed: {}", e);
                }
            }
            ServerEvent::Disconnect { id, reason } => {
                info!("user disconnected: {} ({})", id, reason)
            }
        }
    }

    Ok(())
}
