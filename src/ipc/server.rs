//! Unix domain socket server for IPC
//!
//! Provides request-response control of the shared session and push
//! notifications of session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::session::{ChannelListener, SessionManager, SubscriptionToken};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared by every client handler
struct ServerContext {
    manager: SessionManager,
    start_time: Instant,
}

/// A client's session event subscription; dropping it unsubscribes
struct Subscription {
    manager: SessionManager,
    token: SubscriptionToken,
    forwarder: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.token);
        self.forwarder.abort();
        debug!(token = ?self.token, "client unsubscribed");
    }
}

/// Aborts the wrapped task when dropped
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Bind a fresh socket at `path`, readable by the current user only
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(?path, "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("failed to remove stale socket"),
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("failed to restrict socket permissions")?;
    }

    Ok(listener)
}

impl Server {
    /// Bind the control socket for `manager`
    pub fn new(socket_path: &Path, manager: SessionManager) -> Result<Self> {
        let listener = bind_socket(socket_path)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        info!(?socket_path, "control socket listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context: Arc::new(ServerContext {
                manager,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Accept clients until [`shutdown`](Self::shutdown) is called
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let stream = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!(?e, "failed to accept control client");
                        continue;
                    }
                },
                _ = shutdown_rx.recv() => return Ok(()),
            };
            self.spawn_client(stream);
        }
    }

    /// Serve one client on its own task; shutdown drops the handler, and
    /// with it the client's subscription and writer
    fn spawn_client(&self, stream: UnixStream) {
        debug!("control client connected");
        let context = Arc::clone(&self.context);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                result = Self::handle_client(stream, context) => {
                    if let Err(e) = result {
                        warn!(?e, "control client failed");
                    }
                }
                _ = shutdown_rx.recv() => debug!("closing control client"),
            }
        });
    }

    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();

        // Responses and notifications share one writer
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let _writer = TaskGuard(tokio::spawn(Self::write_messages(writer, out_rx)));

        let mut subscription: Option<Subscription> = None;
        let result = Self::serve_requests(&mut reader, &context, &out_tx, &mut subscription).await;
        drop(subscription);
        result
    }

    async fn serve_requests<R: AsyncRead + Unpin>(
        reader: &mut R,
        context: &ServerContext,
        out_tx: &mpsc::UnboundedSender<Vec<u8>>,
        subscription: &mut Option<Subscription>,
    ) -> Result<()> {
        loop {
            let Some(body) = read_frame(reader).await? else {
                debug!("client disconnected");
                return Ok(());
            };

            let response = match serde_json::from_slice::<Request>(&body) {
                Ok(request) => {
                    debug!(?request, "received request");
                    if request == Request::Subscribe && subscription.is_none() {
                        *subscription = Some(Self::subscribe(context, out_tx.clone()));
                        debug!("client subscribed to notifications");
                    }
                    Self::process_request(request, context).await
                }
                Err(e) => {
                    warn!(?e, "failed to parse request");
                    Response::Error {
                        code: "invalid_request".into(),
                        message: e.to_string(),
                    }
                }
            };

            out_tx
                .send(encode_frame(&response)?)
                .map_err(|_| anyhow::anyhow!("client writer closed"))?;
        }
    }

    /// Forward session events to the client's writer
    fn subscribe(context: &ServerContext, out_tx: mpsc::UnboundedSender<Vec<u8>>) -> Subscription {
        let (listener, mut events) = ChannelListener::new();
        let token = context.manager.subscribe(Arc::new(listener));

        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let frame = match encode_frame(&Notification::SessionEvent { event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        Subscription {
            manager: context.manager.clone(),
            token,
            forwarder,
        }
    }

    async fn write_messages<W: AsyncWrite + Unpin>(
        mut writer: W,
        mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                debug!(?e, "client write failed");
                break;
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        let manager = &context.manager;
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: context.start_time.elapsed().as_secs(),
                engine: manager.engine_name(),
                session: manager.snapshot(),
            }),

            request @ Request::StartListening { .. } => {
                if let Some(options) = request.listen_options() {
                    info!(?options, "start requested via IPC");
                    manager.start_listening(options).await;
                }
                Response::Ok
            }

            Request::StopListening => match manager.stop_listening().await {
                Ok(()) => Response::Ok,
                Err(e) => stop_error(e),
            },

            Request::AbortListening => match manager.abort_listening().await {
                Ok(()) => Response::Ok,
                Err(e) => stop_error(e),
            },

            Request::ResetTranscript => {
                manager.reset_transcript();
                Response::Ok
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Stop accepting, close every client and remove the socket file
    pub async fn shutdown(&self) {
        let clients = self.shutdown_tx.send(()).unwrap_or(0);
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(?e, path = ?self.socket_path, "failed to remove control socket"),
        }
        info!(receivers = clients, "control socket closed");
    }
}

fn stop_error(error: crate::error::SessionError) -> Response {
    Response::Error {
        code: "stop_cancelled".into(),
        message: error.to_string(),
    }
}

/// Read one length-prefixed message; `None` on clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large: {len} bytes");
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Encode a length-prefixed JSON message
fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::scripted::ScriptedFactory;
    use crate::engine::EngineFactory;
    use crate::events::SessionEvent;
    use crate::platform::PlatformProfile;
    use crate::session::ListenOptions;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "speech-session-{}-{}.sock",
            name,
            std::process::id()
        ))
    }

    async fn request(stream: &mut UnixStream, request: &Request) -> Vec<u8> {
        stream.write_all(&encode_frame(request).unwrap()).await.unwrap();
        next_frame(stream).await
    }

    async fn next_frame(stream: &mut UnixStream) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(1), read_frame(stream))
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .expect("server closed connection")
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_pipe() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&encode_frame(&Request::Ping).unwrap()).await.unwrap();
        drop(client);

        let body = read_frame(&mut server).await.unwrap().unwrap();
        let request: Request = serde_json::from_slice(&body).unwrap();
        assert_eq!(request, Request::Ping);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_MESSAGE_LEN as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        assert!(read_frame(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_control_and_notifications() {
        let manager = SessionManager::new(PlatformProfile::desktop());
        let factory = Arc::new(ScriptedFactory::native());
        manager.configure(Some(factory.clone() as Arc<dyn EngineFactory>));

        let path = socket_path("control");
        let server = Server::new(&path, manager.clone()).unwrap();
        let server = Arc::new(server);
        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };

        let mut stream = UnixStream::connect(&path).await.unwrap();

        let pong: Response = serde_json::from_slice(&request(&mut stream, &Request::Ping).await).unwrap();
        assert_eq!(pong, Response::Pong);

        let subscribed: Response =
            serde_json::from_slice(&request(&mut stream, &Request::Subscribe).await).unwrap();
        assert_eq!(subscribed, Response::Subscribed);

        let start = Request::StartListening {
            continuous: true,
            language: None,
        };
        stream.write_all(&encode_frame(&start).unwrap()).await.unwrap();

        // The notification and the response travel separately, in either order
        let mut frames = Vec::new();
        for _ in 0..2 {
            frames.push(next_frame(&mut stream).await);
        }
        let note = frames
            .iter()
            .find_map(|frame| serde_json::from_slice::<Notification>(frame).ok())
            .expect("no notification pushed");
        assert_eq!(
            note,
            Notification::SessionEvent {
                event: SessionEvent::ListeningChanged { listening: true }
            }
        );
        assert!(frames
            .iter()
            .any(|frame| serde_json::from_slice::<Response>(frame).ok() == Some(Response::Ok)));

        let status = request(&mut stream, &Request::GetStatus).await;
        match serde_json::from_slice::<Response>(&status).unwrap() {
            Response::Status(status) => {
                assert!(status.session.listening);
                assert_eq!(status.engine.as_deref(), Some("scripted"));
            }
            other => panic!("unexpected response {other:?}"),
        }

        let invalid: Response = {
            let body = br#"{"type":"set_mode"}"#;
            stream.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
            stream.write_all(body).await.unwrap();
            serde_json::from_slice(&next_frame(&mut stream).await).unwrap()
        };
        assert!(matches!(invalid, Response::Error { ref code, .. } if code == "invalid_request"));

        server.shutdown().await;
        tokio_test::assert_ok!(running.await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_subscribed_clients() {
        let manager = SessionManager::new(PlatformProfile::desktop());
        let factory = Arc::new(ScriptedFactory::native());
        manager.configure(Some(factory as Arc<dyn EngineFactory>));

        let path = socket_path("shutdown");
        let server = Arc::new(Server::new(&path, manager.clone()).unwrap());
        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let subscribed: Response =
            serde_json::from_slice(&request(&mut stream, &Request::Subscribe).await).unwrap();
        assert_eq!(subscribed, Response::Subscribed);

        server.shutdown().await;
        tokio_test::assert_ok!(running.await.unwrap());

        let closed = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut stream))
            .await
            .expect("client was not disconnected");
        assert!(closed.unwrap().is_none());

        // Session changes after shutdown reach nobody
        manager.start_listening(ListenOptions::continuous()).await;
        assert!(read_frame(&mut stream).await.unwrap().is_none());
    }
}
