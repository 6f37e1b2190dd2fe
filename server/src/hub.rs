//! TCP broker that shares one [`MemoryBackend`] between processes.
//!
//! Every frame is a 4-byte big-endian length followed by a bincode payload.
//! A connection carries strictly alternating request/response frames until it
//! sends [`HubRequest::Subscribe`], after which the hub only pushes
//! [`HubResponse::Published`] frames down it.

use crate::backend::{
    BackendError, BackendResult, EventChannel, IntentQueue, KeyValueStore, MemoryBackend,
};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};

/// Largest frame either side will send or accept.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubRequest {
    Get { key: String },
    Set { key: String, value: String },
    SetIfAbsent { key: String, value: String, ttl_ms: u64 },
    Delete { key: String },
    Push { topic: String, payload: String },
    Pop { topic: String, wait_ms: u64 },
    Publish { channel: String, payload: String },
    Subscribe { channel: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubResponse {
    Ok,
    Value(Option<String>),
    Acquired(bool),
    Message(Option<String>),
    Published { channel: String, payload: String },
    Error { reason: String },
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> BackendResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serialize(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(BackendError::FrameTooLarge(data.len()));
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. `None` means the peer closed the connection between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> BackendResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(BackendError::FrameTooLarge(len));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(deserialize(&data)?))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The broker process' listener.
pub struct HubServer {
    listener: TcpListener,
    backend: MemoryBackend,
}

impl HubServer {
    pub async fn bind(addr: &str) -> BackendResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            backend: MemoryBackend::new(),
        })
    }

    pub fn local_addr(&self) -> BackendResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// Accepts connections forever, one task per connection.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Hub listening on {}", addr),
            Err(e) => warn!("Hub listening on unknown address: {}", e),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Hub connection from {}", peer);
                    let backend = self.backend.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, backend).await {
                            warn!("Hub connection {} ended: {}", peer, e);
                        } else {
                            debug!("Hub connection {} closed", peer);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept hub connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, backend: MemoryBackend) -> BackendResult<()> {
    loop {
        let Some(request) = read_frame::<_, HubRequest>(&mut stream).await? else {
            return Ok(());
        };

        if let HubRequest::Subscribe { channel } = request {
            let receiver = backend.subscribe(&channel);
            write_frame(&mut stream, &HubResponse::Ok).await?;
            return forward_channel(stream, receiver, channel).await;
        }

        let response = answer(&backend, request).await;
        write_frame(&mut stream, &response).await?;
    }
}

async fn answer(backend: &MemoryBackend, request: HubRequest) -> HubResponse {
    let result = match request {
        HubRequest::Get { key } => backend.get(&key).await.map(HubResponse::Value),
        HubRequest::Set { key, value } => backend.set(&key, value).await.map(|()| HubResponse::Ok),
        HubRequest::SetIfAbsent { key, value, ttl_ms } => backend
            .set_if_absent(&key, value, Duration::from_millis(ttl_ms))
            .await
            .map(HubResponse::Acquired),
        HubRequest::Delete { key } => backend.delete(&key).await.map(|()| HubResponse::Ok),
        HubRequest::Push { topic, payload } => {
            backend.push(&topic, payload).await.map(|()| HubResponse::Ok)
        }
        HubRequest::Pop { topic, wait_ms } => backend
            .pop(&topic, Duration::from_millis(wait_ms))
            .await
            .map(HubResponse::Message),
        HubRequest::Publish { channel, payload } => backend
            .publish(&channel, payload)
            .await
            .map(|()| HubResponse::Ok),
        HubRequest::Subscribe { .. } => Err(BackendError::Protocol(
            "subscribe must be handled by the connection".to_string(),
        )),
    };

    result.unwrap_or_else(|e| HubResponse::Error {
        reason: e.to_string(),
    })
}

async fn forward_channel(
    mut stream: TcpStream,
    mut receiver: broadcast::Receiver<String>,
    channel: String,
) -> BackendResult<()> {
    loop {
        match receiver.recv().await {
            Ok(payload) => {
                let frame = HubResponse::Published {
                    channel: channel.clone(),
                    payload,
                };
                write_frame(&mut stream, &frame).await?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Subscriber on {} skipped {} messages", channel, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Request/response connection to a hub. Clones share the connection and
/// take turns on it.
///
/// A call that fails or is dropped part way discards the connection, and the
/// next call dials the hub again.
#[derive(Debug, Clone)]
pub struct HubClient {
    addr: SocketAddr,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

async fn dial(addr: SocketAddr) -> BackendResult<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl HubClient {
    pub async fn connect(addr: &str) -> BackendResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        Ok(Self {
            addr,
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Opens a separate push connection for `channel`.
    pub async fn subscribe(&self, channel: &str) -> BackendResult<HubSubscription> {
        HubSubscription::open(&self.addr.to_string(), channel).await
    }

    async fn call(&self, request: HubRequest) -> BackendResult<HubResponse> {
        let mut slot = self.stream.lock().await;
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => {
                debug!("Reconnecting to hub at {}", self.addr);
                dial(self.addr).await?
            }
        };

        // The stream is only put back after a complete exchange.
        write_frame(&mut stream, &request).await?;
        let response = match read_frame(&mut stream).await? {
            Some(response) => response,
            None => return Err(BackendError::Closed),
        };
        *slot = Some(stream);

        match response {
            HubResponse::Error { reason } => Err(BackendError::Rejected(reason)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: HubResponse) -> BackendError {
    BackendError::Protocol(format!("{:?}", response))
}

impl KeyValueStore for HubClient {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        match self.call(HubRequest::Get { key: key.to_string() }).await? {
            HubResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&self, key: &str, value: String) -> BackendResult<()> {
        match self
            .call(HubRequest::Set {
                key: key.to_string(),
                value,
            })
            .await?
        {
            HubResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BackendResult<bool> {
        let request = HubRequest::SetIfAbsent {
            key: key.to_string(),
            value,
            ttl_ms: millis(ttl),
        };
        match self.call(request).await? {
            HubResponse::Acquired(acquired) => Ok(acquired),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        match self.call(HubRequest::Delete { key: key.to_string() }).await? {
            HubResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

impl IntentQueue for HubClient {
    async fn push(&self, topic: &str, payload: String) -> BackendResult<()> {
        let request = HubRequest::Push {
            topic: topic.to_string(),
            payload,
        };
        match self.call(request).await? {
            HubResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn pop(&self, topic: &str, wait: Duration) -> BackendResult<Option<String>> {
        let request = HubRequest::Pop {
            topic: topic.to_string(),
            wait_ms: millis(wait),
        };
        match self.call(request).await? {
            HubResponse::Message(message) => Ok(message),
            other => Err(unexpected(other)),
        }
    }
}

impl EventChannel for HubClient {
    async fn publish(&self, channel: &str, payload: String) -> BackendResult<()> {
        let request = HubRequest::Publish {
            channel: channel.to_string(),
            payload,
        };
        match self.call(request).await? {
            HubResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

/// Push connection delivering messages from one channel.
#[derive(Debug)]
pub struct HubSubscription {
    stream: TcpStream,
    channel: String,
}

impl HubSubscription {
    pub async fn open(addr: &str, channel: &str) -> BackendResult<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        write_frame(
            &mut stream,
            &HubRequest::Subscribe {
                channel: channel.to_string(),
            },
        )
        .await?;
        match read_frame(&mut stream).await? {
            Some(HubResponse::Ok) => Ok(Self {
                stream,
                channel: channel.to_string(),
            }),
            Some(other) => Err(unexpected(other)),
            None => Err(BackendError::Closed),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next message on the channel, or `None` once the hub hangs up.
    pub async fn recv(&mut self) -> BackendResult<Option<String>> {
        match read_frame(&mut self.stream).await? {
            Some(HubResponse::Published { payload, .. }) => Ok(Some(payload)),
            Some(other) => Err(unexpected(other)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn start_hub() -> (String, MemoryBackend) {
        let server = HubServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let backend = server.backend().clone();
        tokio::spawn(server.run());
        (addr, backend)
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let request = HubRequest::Pop {
            topic: "t".into(),
            wait_ms: 25,
        };
        assert_ok!(write_frame(&mut a, &request).await);
        let decoded: Option<HubRequest> = read_frame(&mut b).await.unwrap();
        assert_eq!(decoded, Some(request));
    }

    #[tokio::test]
    async fn test_clean_eof_reads_none() {
        let mut empty: &[u8] = &[];
        let decoded: Option<HubRequest> = read_frame(&mut empty).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut reader: &[u8] = &header;
        let result: BackendResult<Option<HubRequest>> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(BackendError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_oversized_message_not_sent() {
        let mut sink = Vec::new();
        let huge = HubRequest::Set {
            key: "k".into(),
            value: "x".repeat(MAX_FRAME_LEN),
        };
        assert_err!(write_frame(&mut sink, &huge).await);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_client_store_operations() {
        let (addr, backend) = start_hub().await;
        let client = HubClient::connect(&addr).await.unwrap();

        assert_eq!(client.get("k").await.unwrap(), None);
        assert_ok!(client.set("k", "v".into()).await);
        assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        let ttl = Duration::from_secs(5);
        assert!(client.set_if_absent("lease", "1".into(), ttl).await.unwrap());
        assert!(!client.set_if_absent("lease", "1".into(), ttl).await.unwrap());
        assert_ok!(client.delete("lease").await);
        assert!(client.set_if_absent("lease", "1".into(), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_client_queue_between_connections() {
        let (addr, _) = start_hub().await;
        let producer = HubClient::connect(&addr).await.unwrap();
        let consumer = HubClient::connect(&addr).await.unwrap();

        let wait = Duration::from_millis(20);
        assert_eq!(consumer.pop("t", wait).await.unwrap(), None);
        assert_ok!(producer.push("t", "first".into()).await);
        assert_ok!(producer.push("t", "second".into()).await);
        assert_eq!(consumer.pop("t", wait).await.unwrap().as_deref(), Some("first"));
        assert_eq!(consumer.pop("t", wait).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_backend_errors_are_rejections() {
        let (addr, backend) = start_hub().await;
        let client = HubClient::connect(&addr).await.unwrap();
        backend.set_store_offline(true);
        assert!(matches!(
            client.get("k").await,
            Err(BackendError::Rejected(_))
        ));
        backend.set_store_offline(false);
        assert_ok!(client.get("k").await);
    }

    #[tokio::test]
    async fn test_subscription_receives_published() {
        let (addr, _) = start_hub().await;
        let client = HubClient::connect(&addr).await.unwrap();
        let mut subscription = client.subscribe("ship_updates").await.unwrap();
        assert_eq!(subscription.channel(), "ship_updates");

        assert_ok!(client.publish("ship_updates", "one".into()).await);
        assert_ok!(client.publish("other", "ignored".into()).await);
        assert_ok!(client.publish("ship_updates", "two".into()).await);

        assert_eq!(subscription.recv().await.unwrap().as_deref(), Some("one"));
        assert_eq!(subscription.recv().await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_client_reconnects_after_hub_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let client = HubClient::connect(&addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        drop(accepted);
        drop(listener);

        let server = HubServer::bind(&addr).await.unwrap();
        tokio::spawn(server.run());

        // The hung-up connection fails once, then the client dials again.
        assert_err!(client.get("k").await);
        assert_ok!(client.set("k", "v".into()).await);
        assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_abandoned_call_does_not_shift_replies() {
        let (addr, _) = start_hub().await;
        let client = HubClient::connect(&addr).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            client.pop("t", Duration::from_secs(5)),
        )
        .await;
        assert_err!(abandoned);

        assert_ok!(client.set("k", "v".into()).await);
        assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(client.set_if_absent("lease", "1".into(), Duration::from_secs(5)).await.unwrap());
    }
}
