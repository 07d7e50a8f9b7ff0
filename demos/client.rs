//! Interactive client.
//!
//! Run with: `cargo run --example client [-- ws://localhost:8080/]`
//!
//! Each stdin line is sent as one frame; `.close` closes the connection.

use barews::{ClientConfig, ClientEvent, WebSocketClient};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> barews::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8080/".to_string());

    let (client, mut events) = WebSocketClient::new(ClientConfig::default());
    client.connect(&url)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Connect) => info!("Connected"),
                Some(ClientEvent::ConnectFail(e)) => {
                    warn!("connect failed: {}", e);
                    return Err(e);
                }
                Some(ClientEvent::Data(payload)) => println!("{}", String::from_utf8_lossy(&payload)),
                Some(ClientEvent::Disconnect(reason)) => {
                    info!("{}", reason);
                    break;
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().eq_ignore_ascii_case(".close") => client.close(),
                Some(line) => client.send(format!("{}\n", line)),
                None => {
                    stdin_open = false;
                    client.close();
                }
            },
        }
    }

    Ok(())
}
