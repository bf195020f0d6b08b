use std::sync::mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::console::TransportEvent;
use crate::console::Transport;
use crate::error::TransportError;

const CLOSE_HANDSHAKE_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Websocket transport driven by a tokio task. Inbound traffic is forwarded
/// to the receiver returned by [`WebSocketTransport::new`].
pub struct WebSocketTransport {
    runtime: Handle,
    events: mpsc::Sender<TransportEvent>,
    outbound: Option<UnboundedSender<Outbound>>,
    cookie: Option<String>,
}

impl WebSocketTransport {
    pub fn new(runtime: Handle) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel();
        (
            Self {
                runtime,
                events,
                outbound: None,
                cookie: None,
            },
            receiver,
        )
    }

    /// Sends `cookie` as the `Cookie` header of the handshake request.
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|value| !value.trim().is_empty());
        self
    }

    fn handshake_request(&self, url: &Url) -> Result<Request, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: url.to_string(),
            reason,
        };
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| connect_error(err.to_string()))?;
        if let Some(cookie) = &self.cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| connect_error(format!("invalid session cookie: {err}")))?;
            request.headers_mut().insert(COOKIE, value);
        }
        Ok(request)
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &Url) -> Result<(), TransportError> {
        let request = self.handshake_request(url)?;
        let (outbound, commands) = unbounded_channel();
        self.outbound = Some(outbound);
        let events = self.events.clone();
        self.runtime.spawn(run_connection(request, events, commands));
        Ok(())
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        outbound
            .send(Outbound::Text(payload.to_owned()))
            .map_err(|_| TransportError::Send("connection task has ended".to_owned()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let outbound = self.outbound.take().ok_or(TransportError::NotConnected)?;
        // The task may already be gone after a remote close.
        let _ = outbound.send(Outbound::Close);
        Ok(())
    }
}

async fn run_connection(
    request: Request,
    events: mpsc::Sender<TransportEvent>,
    mut commands: UnboundedReceiver<Outbound>,
) {
    let target = request.uri().to_string();
    let (mut ws, _) = match connect_async(request).await {
        Ok(value) => value,
        Err(err) => {
            warn!("ws_connect_error: {target}: {err}");
            let _ = events.send(TransportEvent::Error(err.to_string()));
            return;
        }
    };
    info!("ws_connected: {target}");
    if events.send(TransportEvent::Opened).is_err() {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            incoming = ws.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text),
                    Some(Ok(Message::Binary(bytes))) => {
                        TransportEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "ws_remote_close");
                        let _ = events.send(TransportEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!("ws_read_error: {err}");
                        let _ = events.send(TransportEvent::Error(err.to_string()));
                        return;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed);
                        return;
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(Outbound::Text(payload)) => {
                    if let Err(err) = ws.send(Message::Text(payload)).await {
                        warn!("ws_send_error: {err}");
                        let _ = events.send(TransportEvent::Error(err.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
        }
    }

    if let Err(err) = ws.close(None).await {
        debug!("ws_close_error: {err}");
    }
    // Wait for the peer to acknowledge so the close is clean.
    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_WAIT, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    let _ = events.send(TransportEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{Request as ServerRequest, Response};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime")
    }

    fn next_event(events: &mpsc::Receiver<TransportEvent>) -> TransportEvent {
        events
            .recv_timeout(Duration::from_secs(5))
            .expect("transport event")
    }

    #[test]
    fn relays_server_output_and_client_messages() {
        let runtime = runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (cookie_tx, cookie_rx) = mpsc::channel();

        let server = runtime.spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_hdr_async(stream, move |request: &ServerRequest, response: Response| {
                let cookie = request
                    .headers()
                    .get(COOKIE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                let _ = cookie_tx.send(cookie);
                Ok(response)
            })
            .await
            .expect("handshake");
            let greeting = ws.next().await.expect("greeting").expect("frame");
            ws.send(Message::Text("Task (id: 1) Status: running".to_owned()))
                .await
                .expect("send");
            ws.send(Message::Binary(b"step 1\r\n".to_vec()))
                .await
                .expect("send");
            ws.close(None).await.expect("close");
            greeting
        });

        let (transport, events) = WebSocketTransport::new(runtime.handle().clone());
        let mut transport = transport.with_cookie(Some("JWT=abc".to_owned()));
        let url = Url::parse(&format!("ws://{addr}/ws/runsh/1")).expect("url");
        transport.open(&url).expect("open");

        assert_eq!(next_event(&events), TransportEvent::Opened);
        transport.send("Hi From the Client!").expect("send");
        assert_eq!(
            next_event(&events),
            TransportEvent::Message("Task (id: 1) Status: running".to_owned())
        );
        assert_eq!(
            next_event(&events),
            TransportEvent::Message("step 1\r\n".to_owned())
        );
        assert_eq!(next_event(&events), TransportEvent::Closed);

        let greeting = runtime.block_on(server).expect("server task");
        assert_eq!(greeting, Message::Text("Hi From the Client!".to_owned()));
        assert_eq!(
            cookie_rx.recv_timeout(Duration::from_secs(1)).expect("cookie"),
            Some("JWT=abc".to_owned())
        );
    }

    #[test]
    fn refused_connection_is_reported_as_error_event() {
        let runtime = runtime();
        let addr = runtime
            .block_on(async {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                listener.local_addr()
            })
            .expect("free port");

        let (mut transport, events) = WebSocketTransport::new(runtime.handle().clone());
        let url = Url::parse(&format!("ws://{addr}/ws/runsh/1")).expect("url");
        transport.open(&url).expect("open is asynchronous");

        assert!(matches!(next_event(&events), TransportEvent::Error(_)));
    }

    #[test]
    fn send_before_open_is_not_connected() {
        let runtime = runtime();
        let (mut transport, _events) = WebSocketTransport::new(runtime.handle().clone());
        assert_eq!(transport.send("hello"), Err(TransportError::NotConnected));
        assert_eq!(transport.close(), Err(TransportError::NotConnected));
    }
}
