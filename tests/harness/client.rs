//! Awaitable client fixture.

use std::net::SocketAddr;

use barews::{ClientConfig, ClientEvent, ClientEvents, Error, WebSocketClient};

use super::WAIT;

pub struct TestClient {
    pub id: usize,
    pub client: WebSocketClient,
    events: ClientEvents,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, Error> {
        Self::connect_with_id(addr, 0).await
    }

    pub async fn connect_with_id(addr: SocketAddr, id: usize) -> Result<Self, Error> {
        Self::connect_url(&format!("ws://{}/client/{}", addr, id), ClientConfig::default(), id)
            .await
    }

    pub async fn connect_url(url: &str, config: ClientConfig, id: usize) -> Result<Self, Error> {
        let (client, mut events) = WebSocketClient::new(config);
        client.connect(url)?;

        match tokio::time::timeout(WAIT, events.recv()).await {
            Ok(Some(ClientEvent::Connect)) => Ok(Self { id, client, events }),
            Ok(Some(ClientEvent::ConnectFail(e))) => Err(e),
            Ok(other) => panic!("client {}: unexpected first event {:?}", id, other),
            Err(_) => Err(Error::HandshakeTimeout),
        }
    }

    pub fn send(&self, payload: impl AsRef<[u8]>) {
        self.client.send(payload);
    }

    pub fn send_text(&self, text: &str) {
        self.client.send(text.as_bytes());
    }

    /// Next payload, or `None` if the connection ended first.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match tokio::time::timeout(WAIT, self.events.recv()).await {
                Ok(Some(ClientEvent::Data(payload))) => return Some(payload),
                Ok(Some(ClientEvent::Disconnect(_))) | Ok(None) => return None,
                Ok(Some(_)) => continue,
                Err(_) => panic!("client {}: timed out waiting for data", self.id),
            }
        }
    }

    pub async fn recv_text(&mut self) -> Option<String> {
        self.recv()
            .await
            .map(|payload| String::from_utf8(payload).expect("utf-8 payload"))
    }

    /// Wait for the disconnect event and return its reason.
    pub async fn disconnected(&mut self) -> String {
        loop {
            match tokio::time::timeout(WAIT, self.events.recv()).await {
                Ok(Some(ClientEvent::Disconnect(reason))) => return reason,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("client {}: event stream ended", self.id),
                Err(_) => panic!("client {}: timed out waiting for disconnect", self.id),
            }
        }
    }

    pub async fn close(mut self) -> String {
        self.client.close();
        self.disconnected().await
    }
}
