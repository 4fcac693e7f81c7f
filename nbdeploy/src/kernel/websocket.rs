//! Kernel channel over the Jupyter server websocket

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::BridgeError;
use crate::kernel::messages::KernelMessage;
use crate::kernel::{Channel, ChannelError, ExecuteReply, ExecuteRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket channel options
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Jupyter server base URL (http or https)
    pub base_url: String,

    /// Jupyter server token
    pub token: Option<SecretString>,

    /// Username reported in message headers
    pub username: String,

    /// Maximum time to wait for one execute_reply
    pub execute_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            token: None,
            username: "nbdeploy".to_string(),
            execute_timeout: Duration::from_secs(600),
        }
    }
}

/// Channel to one kernel. Requests are serialized on the socket and each
/// reply is matched to its request by `msg_id`.
pub struct WsKernelChannel {
    stream: Mutex<WsStream>,
    session: String,
    username: String,
    execute_timeout: Duration,
}

impl WsKernelChannel {
    /// Connect to the channels endpoint of a running kernel
    pub async fn connect(options: &ConnectOptions, kernel_id: &str) -> Result<Self, BridgeError> {
        let session = uuid::Uuid::new_v4().to_string();
        let url = build_channels_url(&options.base_url, kernel_id, &session)?;
        info!("Connecting to kernel channel: {}", url);

        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = &options.token {
            let value = HeaderValue::from_str(&format!("token {}", token.expose_secret()))
                .map_err(|e| BridgeError::ConfigError(format!("invalid token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request).await?;
        info!("Connected to kernel {}", kernel_id);

        Ok(Self {
            stream: Mutex::new(stream),
            session,
            username: options.username.clone(),
            execute_timeout: options.execute_timeout,
        })
    }

    /// Close the socket
    pub async fn close(&self) {
        let mut stream = self.stream.lock().await;
        if let Err(e) = stream.close(None).await {
            warn!("Failed to close kernel channel: {}", e);
        }
    }
}

#[async_trait]
impl Channel for WsKernelChannel {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteReply, ChannelError> {
        let message = KernelMessage::execute_request(&self.session, &self.username, &request);
        let msg_id = message.header.msg_id.clone();
        let text = serde_json::to_string(&message)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let mut stream = self.stream.lock().await;
        debug!("Sending execute_request {}", msg_id);
        stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        match tokio::time::timeout(self.execute_timeout, await_reply(&mut stream, &msg_id)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Transport(format!(
                "no execute_reply for {} within {:?}",
                msg_id, self.execute_timeout
            ))),
        }
    }
}

async fn await_reply(stream: &mut WsStream, msg_id: &str) -> Result<ExecuteReply, ChannelError> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| ChannelError::Transport(e.to_string()))?;
        match frame {
            Message::Text(text) => {
                let message: KernelMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("Skipping unparseable kernel frame: {}", e);
                        continue;
                    }
                };
                if message.parent_msg_id() != Some(msg_id) {
                    continue;
                }
                if !message.is_execute_reply() {
                    debug!("Kernel {} for {}", message.header.msg_type, msg_id);
                    continue;
                }
                return message.into_execute_reply();
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ChannelError::Transport("kernel channel closed".to_string()))
}

/// Build `ws(s)://<base>/api/kernels/<id>/channels?session_id=<session>`
pub fn build_channels_url(base_url: &str, kernel_id: &str, session: &str) -> Result<Url, BridgeError> {
    let mut url = Url::parse(base_url).map_err(|e| BridgeError::ConfigError(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(BridgeError::ConfigError("Invalid Jupyter URL scheme".to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| BridgeError::ConfigError("Failed to set scheme".to_string()))?;

    url.set_path(&format!(
        "{}/api/kernels/{}/channels",
        url.path().trim_end_matches('/'),
        kernel_id
    ));
    url.set_query(None);
    url.query_pairs_mut().append_pair("session_id", session);

    Ok(url)
}
