//! Mock feed server for integration tests.
//!
//! Provides a websocket server that:
//! - Accepts connections and counts them
//! - Records every text frame it receives
//! - Acknowledges `bts:subscribe` and then plays a scripted list of frames
//! - Optionally closes the connection after the script

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Server behaviour after a subscribe request.
#[derive(Clone, Default)]
pub struct Script {
    /// Frames sent after the subscription ack.
    pub frames: Vec<String>,
    /// Close the connection once the frames are out.
    pub close_after: bool,
}

/// A mock feed server.
pub struct MockFeedServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockFeedServer {
    /// Start on an available port.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let received_clone = Arc::clone(&received);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            Arc::clone(&received_clone),
                            Arc::clone(&connections_clone),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            received,
            connections,
        }
    }

    /// Websocket URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Text frames received so far.
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Script,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    *connections.lock().await += 1;

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("Websocket handshake failed: {e}");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                received.lock().await.push(text.clone());

                let Ok(request) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                if request["event"] != "bts:subscribe" {
                    continue;
                }

                let ack = serde_json::json!({
                    "event": "bts:subscription_succeeded",
                    "channel": request["data"]["channel"],
                    "data": {}
                });
                let _ = write.send(Message::Text(ack.to_string())).await;
                for frame in &script.frames {
                    let _ = write.send(Message::Text(frame.clone())).await;
                }
                if script.close_after {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
