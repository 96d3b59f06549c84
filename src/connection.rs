use crate::common::Task;
use crate::push::PushMessage;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Derives the socket endpoint from the device origin.
pub fn socket_url(origin: &str) -> anyhow::Result<Url> {
    let mut url =
        Url::parse(origin).with_context(|| format!("invalid device origin {}", origin))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("unsupported scheme {} in {}", other, origin)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot derive socket url from {}", origin))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    /// Binary, ping and pong frames.
    Ignored,
    Closed,
    Error(String),
}

/// An open socket.
#[async_trait]
pub trait Link: Send {
    async fn next_event(&mut self) -> SocketEvent;
    async fn send_text(&mut self, text: &str) -> anyhow::Result<()>;
    async fn close(&mut self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> anyhow::Result<Box<dyn Link>>;
}

pub struct WsTransport {
    pub connect_timeout: Duration,
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> anyhow::Result<Box<dyn Link>> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .with_context(|| format!("connect {} timeout expired.", url))??;
        Ok(Box::new(WsLink { stream }))
    }
}

#[async_trait]
impl Link for WsLink {
    async fn next_event(&mut self) -> SocketEvent {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => SocketEvent::Text(text),
            Some(Ok(Message::Close(_))) | None => SocketEvent::Closed,
            Some(Ok(_)) => SocketEvent::Ignored,
            Some(Err(e)) => SocketEvent::Error(e.to_string()),
        }
    }

    async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("socket close ({:?})", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outbound side of the push channel as seen by the dispatcher.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    fn is_open(&self) -> bool;
    /// Sends a bare command. Returns `false` if the channel was not open.
    async fn send(&self, command: &str) -> bool;
}

pub type SharedChannel = Arc<dyn CommandChannel>;

struct SendRequest {
    command: String,
    reply: oneshot::Sender<bool>,
}

#[derive(Clone)]
pub struct ConnectionHandle {
    requests: UnboundedSender<SendRequest>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

#[async_trait]
impl CommandChannel for ConnectionHandle {
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn send(&self, command: &str) -> bool {
        if !self.is_open() {
            warn!("socket not open, {} not sent", command);
            return false;
        }
        let (reply, answer) = oneshot::channel();
        let request = SendRequest {
            command: command.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            warn!("connection task is gone, {} not sent", command);
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

fn refuse(request: SendRequest) {
    warn!("socket not open, {} not sent", request.command);
    let _ = request.reply.send(false);
}

/// Owns the socket. The previous link is always dropped before a new attempt.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    url: Url,
    reconnect_delay: Duration,
    tasks: UnboundedSender<Task>,
    requests: UnboundedReceiver<SendRequest>,
    state: watch::Sender<ConnectionState>,
}

enum LinkEnd {
    Reconnect,
    Shutdown,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        url: Url,
        reconnect_delay: Duration,
        tasks: UnboundedSender<Task>,
    ) -> (ConnectionManager, ConnectionHandle) {
        let (requests_tx, requests) = unbounded_channel();
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            ConnectionManager {
                transport,
                url,
                reconnect_delay,
                tasks,
                requests,
                state,
            },
            ConnectionHandle {
                requests: requests_tx,
                state: state_rx,
            },
        )
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Runs until every handle is dropped or the session stops listening.
    pub async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            debug!("connect to {}", self.url);

            let attempt = {
                let connect = self.transport.connect(&self.url);
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        result = &mut connect => break Some(result),
                        request = self.requests.recv() => match request {
                            Some(r) => refuse(r),
                            None => break None,
                        },
                    }
                }
            };

            let end = match attempt {
                None => LinkEnd::Shutdown,
                Some(Ok(link)) => {
                    info!("socket connected to {}", self.url);
                    self.set_state(ConnectionState::Connected);
                    self.serve(link).await
                }
                Some(Err(e)) => {
                    warn!("socket connect failed ({:#})", e);
                    LinkEnd::Reconnect
                }
            };
            self.set_state(ConnectionState::Disconnected);

            if let LinkEnd::Shutdown = end {
                info!("connection task stopped");
                return;
            }

            info!(
                "socket disconnected, retrying in {:?}",
                self.reconnect_delay
            );
            let delay = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    request = self.requests.recv() => match request {
                        Some(r) => refuse(r),
                        None => {
                            info!("connection task stopped");
                            return;
                        }
                    },
                }
            }
        }
    }

    /// Pumps one link until it ends. The link is closed and dropped on return.
    async fn serve(&mut self, mut link: Box<dyn Link>) -> LinkEnd {
        loop {
            tokio::select! {
                event = link.next_event() => match event {
                    SocketEvent::Text(text) => {
                        if !self.forward(&text) {
                            link.close().await;
                            return LinkEnd::Shutdown;
                        }
                    }
                    SocketEvent::Ignored => {}
                    SocketEvent::Closed => {
                        info!("socket closed by device");
                        return LinkEnd::Reconnect;
                    }
                    SocketEvent::Error(e) => {
                        warn!("socket error ({})", e);
                        link.close().await;
                        return LinkEnd::Reconnect;
                    }
                },
                request = self.requests.recv() => match request {
                    Some(SendRequest { command, reply }) => {
                        match link.send_text(&command).await {
                            Ok(()) => {
                                debug!("sent {}", command);
                                let _ = reply.send(true);
                            }
                            Err(e) => {
                                warn!("socket send {} failed ({:#})", command, e);
                                let _ = reply.send(false);
                                link.close().await;
                                return LinkEnd::Reconnect;
                            }
                        }
                    }
                    None => {
                        link.close().await;
                        return LinkEnd::Shutdown;
                    }
                },
            }
        }
    }

    /// Returns `false` once the session has gone away.
    fn forward(&self, text: &str) -> bool {
        match PushMessage::parse(text) {
            Ok(PushMessage::Unknown) => {
                debug!("ignore push frame {}", text);
                true
            }
            Ok(message) => self.tasks.send(Task::Push(message)).is_ok(),
            Err(e) => {
                warn!("drop malformed push frame ({}): {}", e, text);
                true
            }
        }
    }
}

pub fn start(
    transport: Arc<dyn Transport>,
    url: Url,
    reconnect_delay: Duration,
    tasks: UnboundedSender<Task>,
) -> ConnectionHandle {
    let (manager, handle) = ConnectionManager::new(transport, url, reconnect_delay, tasks);
    tokio::spawn(manager.run());
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const DELAY: Duration = Duration::from_millis(3000);

    struct FakeLink {
        events: UnboundedReceiver<SocketEvent>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<Option<Instant>>>,
    }

    impl Drop for FakeLink {
        fn drop(&mut self) {
            self.closed.lock().unwrap().get_or_insert_with(Instant::now);
        }
    }

    #[async_trait]
    impl Link for FakeLink {
        async fn next_event(&mut self) -> SocketEvent {
            self.events.recv().await.unwrap_or(SocketEvent::Closed)
        }

        async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn close(&mut self) {
            self.closed.lock().unwrap().get_or_insert_with(Instant::now);
        }
    }

    /// Control side of a scripted link.
    struct LinkControl {
        events: UnboundedSender<SocketEvent>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<Option<Instant>>>,
    }

    #[derive(Default)]
    struct FakeTransport {
        links: Mutex<VecDeque<FakeLink>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FakeTransport {
        /// Queues a link for the next attempt; attempts with nothing queued fail.
        fn queue_link(&self) -> LinkControl {
            let (events_tx, events) = unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(Mutex::new(None));
            self.links.lock().unwrap().push_back(FakeLink {
                events,
                sent: sent.clone(),
                closed: closed.clone(),
            });
            LinkControl {
                events: events_tx,
                sent,
                closed,
            }
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self, _url: &Url) -> anyhow::Result<Box<dyn Link>> {
            self.attempts.lock().unwrap().push(Instant::now());
            match self.links.lock().unwrap().pop_front() {
                Some(link) => Ok(Box::new(link)),
                None => Err(anyhow!("connection refused")),
            }
        }
    }

    fn spawn(
        transport: &Arc<FakeTransport>,
    ) -> (ConnectionHandle, UnboundedReceiver<Task>) {
        let (tasks, task_rx) = unbounded_channel();
        let url = socket_url("http://heater.local").unwrap();
        let handle = start(transport.clone(), url, DELAY, tasks);
        (handle, task_rx)
    }

    async fn wait_for(handle: &ConnectionHandle, state: ConnectionState) {
        let mut rx = handle.watch();
        while *rx.borrow_and_update() != state {
            rx.changed().await.unwrap();
        }
    }

    #[test]
    fn socket_url_from_origin() {
        assert_eq!(
            socket_url("http://192.168.1.40").unwrap().as_str(),
            "ws://192.168.1.40/ws"
        );
        assert_eq!(
            socket_url("https://heater.local:8443/index.html?x=1").unwrap().as_str(),
            "wss://heater.local:8443/ws"
        );
        assert!(socket_url("ftp://heater.local").is_err());
        assert!(socket_url("heater.local").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_one_reconnect_after_delay() {
        let transport = Arc::new(FakeTransport::default());
        let first = transport.queue_link();
        let _second = transport.queue_link();
        let (handle, _tasks) = spawn(&transport);

        wait_for(&handle, ConnectionState::Connected).await;
        first.events.send(SocketEvent::Closed).unwrap();
        wait_for(&handle, ConnectionState::Disconnected).await;
        let closed_at = first.closed.lock().unwrap().expect("link dropped");

        tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
        assert_eq!(transport.attempts().len(), 1);

        wait_for(&handle, ConnectionState::Connected).await;
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] >= closed_at + DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn error_closes_link_and_retries_once() {
        let transport = Arc::new(FakeTransport::default());
        let first = transport.queue_link();
        let (handle, _tasks) = spawn(&transport);

        wait_for(&handle, ConnectionState::Connected).await;
        let errored_at = Instant::now();
        first
            .events
            .send(SocketEvent::Error("reset by peer".to_string()))
            .unwrap();
        wait_for(&handle, ConnectionState::Disconnected).await;
        assert!(first.closed.lock().unwrap().is_some());

        // one retry at +3s (fails), the next one only at +6s
        tokio::time::sleep_until(errored_at + DELAY + Duration::from_millis(500)).await;
        assert_eq!(transport.attempts().len(), 2);
        tokio::time::sleep_until(errored_at + DELAY * 2 + Duration::from_millis(500)).await;
        assert_eq!(transport.attempts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_forever_at_fixed_delay() {
        let transport = Arc::new(FakeTransport::default());
        let (handle, _tasks) = spawn(&transport);

        tokio::time::sleep(DELAY * 5 + Duration::from_millis(500)).await;
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 6);
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], DELAY);
        }
        assert_ne!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_forwarded_and_bad_ones_dropped() {
        let transport = Arc::new(FakeTransport::default());
        let link = transport.queue_link();
        let (handle, mut tasks) = spawn(&transport);
        wait_for(&handle, ConnectionState::Connected).await;

        for frame in [
            SocketEvent::Text("not json".to_string()),
            SocketEvent::Text(r#"{"type":"ota_progress","pct":3}"#.to_string()),
            SocketEvent::Ignored,
            SocketEvent::Text(r#"{"type":"log_append","line":"boot"}"#.to_string()),
        ] {
            link.events.send(frame).unwrap();
        }

        match tasks.recv().await {
            Some(Task::Push(PushMessage::LogAppend { line })) => {
                assert_eq!(line.as_deref(), Some("boot"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(tasks.try_recv().is_err());
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(transport.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_only_while_open() {
        let transport = Arc::new(FakeTransport::default());
        let link = transport.queue_link();
        let (handle, _tasks) = spawn(&transport);

        wait_for(&handle, ConnectionState::Connected).await;
        assert!(handle.is_open());
        assert!(handle.send("toggle_heater").await);
        assert!(handle.send("toggle_heater").await);
        assert_eq!(
            *link.sent.lock().unwrap(),
            vec!["toggle_heater".to_string(), "toggle_heater".to_string()]
        );

        link.events.send(SocketEvent::Closed).unwrap();
        wait_for(&handle, ConnectionState::Disconnected).await;
        assert!(!handle.is_open());
        assert!(!handle.send("toggle_deadzone").await);
        assert_eq!(link.sent.lock().unwrap().len(), 2);
    }
}
