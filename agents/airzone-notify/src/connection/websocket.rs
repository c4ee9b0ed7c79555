//! Event Stream Supervisor
//!
//! Keeps the connection to the Airzone Cloud event stream alive: runs the
//! handshake, answers keep-alive pings, correlates responses to outbound
//! requests and reconnects after a fixed delay whenever the transport closes.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::interpreter::DeviceInterpreter;
use crate::bridge::router::{self, Dispatch, Route};
use crate::bridge::state::{ConnectionLifecycle, ConnectionState};
use crate::cli::logging::WIRE_TARGET;
use crate::cloud::types::Installation;
use crate::connection::protocol::{self, Frame, MessageType, OPEN_FRAME, PONG_FRAME};
use crate::connection::transport::{Connector, Transport, TransportEvent};
use crate::notify::sink::Notifier;

/// Continuation run when the response to a request arrives. It may return a
/// follow-up request, which is sent right away.
pub type ResponseHandler = Box<dyn FnOnce(MessageType, Value) -> Option<Request> + Send>;

/// An outbound event
pub struct Request {
    name: String,
    args: Vec<Value>,
    on_response: Option<ResponseHandler>,
}

impl Request {
    pub fn new(name: &str, args: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            args,
            on_response: None,
        }
    }

    pub fn on_response(
        mut self,
        handler: impl FnOnce(MessageType, Value) -> Option<Request> + Send + 'static,
    ) -> Self {
        self.on_response = Some(Box::new(handler));
        self
    }
}

/// Cloneable handle used to stop the supervisor
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request an intentional stop. Returns false if a stop was already
    /// requested.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        })
    }

    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }
}

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Intentional stop
    Stopped,
    /// The transport closed on its own
    Closed,
}

/// Supervisor of the event stream connection
pub struct Supervisor {
    websocket_url: String,
    token: String,
    installation: Installation,
    reconnect_interval: Duration,
    connector: Arc<dyn Connector>,
    notifier: Notifier,
    state: ConnectionLifecycle,
    interpreter: DeviceInterpreter,
    next_request_id: u64,
    pending: HashMap<u64, ResponseHandler>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    /// Create a new supervisor for one installation
    pub fn new(
        websocket_url: &str,
        token: &str,
        installation: Installation,
        connector: Arc<dyn Connector>,
        notifier: Notifier,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            websocket_url: websocket_url.to_string(),
            token: token.to_string(),
            interpreter: DeviceInterpreter::new(installation.clone()),
            installation,
            reconnect_interval: Duration::from_secs(5),
            connector,
            notifier,
            state: ConnectionLifecycle::new(),
            next_request_id: 0,
            pending: HashMap::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Set the fixed delay between a close and the next connect attempt
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Interpreter of the current (or last) connection
    pub fn interpreter(&self) -> &DeviceInterpreter {
        &self.interpreter
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn connect_url(&self) -> String {
        format!(
            "{}?jwt={}&EIO=4&transport=websocket",
            self.websocket_url, self.token
        )
    }

    /// Run until an intentional stop, reconnecting after every close
    pub async fn run(&mut self) -> Result<()> {
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if self.is_stopping() {
                break;
            }

            match self.connect_and_run().await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Closed) => {}
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Event stream connection failed");
                }
            }

            if self.is_stopping() {
                self.state.transition(ConnectionState::Closing, "Stop requested");
                break;
            }

            self.state
                .transition(ConnectionState::ReconnectWait, "Connection lost");
            info!(
                delay_ms = self.reconnect_interval.as_millis() as u64,
                "Reconnecting after delay"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => {}
                _ = stopped(&mut shutdown) => {
                    debug!("Pending reconnect cancelled");
                    break;
                }
            }
        }

        self.state.transition(ConnectionState::Disconnected, "Stopped");
        info!("Event stream supervisor stopped");
        Ok(())
    }

    /// Connect once and process events until the transport closes or a stop
    /// is requested
    async fn connect_and_run(&mut self) -> Result<SessionEnd> {
        self.state.transition(ConnectionState::Connecting, "Opening transport");
        self.reset_session();

        info!(
            url = %self.websocket_url,
            installation = %self.installation.name,
            "Connecting to Airzone event stream"
        );

        let mut shutdown = self.shutdown_rx.clone();
        let url = self.connect_url();

        let mut transport = tokio::select! {
            result = self.connector.connect(&url) => result?,
            _ = stopped(&mut shutdown) => {
                self.state.transition(ConnectionState::Closing, "Stop requested");
                return Ok(SessionEnd::Stopped);
            }
        };

        loop {
            tokio::select! {
                event = transport.next_event() => {
                    if let Some(end) = self.handle_event(transport.as_mut(), event).await {
                        return Ok(end);
                    }
                }
                _ = stopped(&mut shutdown) => {
                    info!("Closing event stream");
                    self.state.transition(ConnectionState::Closing, "Stop requested");
                    if let Err(e) = transport.close().await {
                        warn!(error = %e, "Failed to close event stream cleanly");
                    }
                    return Ok(SessionEnd::Stopped);
                }
            }
        }
    }

    /// Fresh per-connection state: zone names, tracked values and request
    /// correlation all start over.
    fn reset_session(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                abandoned = self.pending.len(),
                "Dropping pending responses from previous connection"
            );
        }
        self.pending.clear();
        self.next_request_id = 0;
        self.interpreter = DeviceInterpreter::new(self.installation.clone());
    }

    async fn handle_event(
        &mut self,
        transport: &mut dyn Transport,
        event: TransportEvent,
    ) -> Option<SessionEnd> {
        match event {
            TransportEvent::Open => {
                self.state.transition(ConnectionState::Open, "Transport open");
                info!("Event stream connected, waiting for events");
                send_frame(transport, OPEN_FRAME).await;
                None
            }
            TransportEvent::Text(text) => {
                self.handle_frame(transport, &text).await;
                None
            }
            TransportEvent::Error(e) => {
                error!(error = %e, "Event stream error");
                None
            }
            TransportEvent::Close(reason) => {
                info!(reason = ?reason, "Event stream closed");
                Some(SessionEnd::Closed)
            }
        }
    }

    async fn handle_frame(&mut self, transport: &mut dyn Transport, text: &str) {
        trace!(target: WIRE_TARGET, frame = %text, "Frame received");

        let frame = match protocol::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, frame = %text, "Failed to decode frame");
                return;
            }
        };

        match &frame {
            Frame::Connect(info) => {
                debug!(info = %info, "Connect frame received");
            }
            Frame::Ping => {
                trace!("Ping received, sending pong");
                send_frame(transport, PONG_FRAME).await;
            }
            Frame::Pong => {
                trace!("Pong received");
            }
            Frame::Message {
                kind: MessageType::Open,
                ..
            } => {
                debug!("Namespace open acknowledged");
            }
            Frame::Message {
                kind: MessageType::Event,
                id,
                ..
            } => {
                let Some((name, data)) = frame.event() else {
                    warn!(frame = %text, "Event without a name");
                    return;
                };

                match router::dispatch(&mut self.interpreter, name, data) {
                    Dispatch::Handshake(Route::Ready) => self.on_ready(transport).await,
                    Dispatch::Handshake(Route::Auth) => self.on_auth(transport, *id).await,
                    Dispatch::Handshake(_) | Dispatch::Ignored => {}
                    Dispatch::Handled(notifications) => {
                        for notification in notifications {
                            self.notifier.dispatch(notification);
                        }
                    }
                }
            }
            Frame::Message {
                kind: MessageType::Response,
                id,
                payload,
            } => {
                self.on_response(transport, *id, payload.clone()).await;
            }
        }
    }

    /// Reset the server-side listeners, then listen to the installation
    async fn on_ready(&mut self, transport: &mut dyn Transport) {
        let installation = self.installation.clone();
        let request = Request::new("clear_listeners", Vec::new()).on_response(move |_, _| {
            info!(
                installation = %installation.name,
                installation_id = %installation.id,
                "Listening for installation events"
            );
            Some(Request::new(
                "listen_installation",
                vec![Value::String(installation.id)],
            ))
        });
        self.send_request(transport, request).await;
    }

    /// Answer an auth request with the bearer token
    async fn on_auth(&mut self, transport: &mut dyn Transport, id: Option<u64>) {
        let Some(id) = id else {
            warn!("Auth request without message id, not answering");
            return;
        };

        let frame = protocol::encode_response(id, &[Value::String(self.token.clone())]);
        let masked = protocol::encode_response(id, &[Value::String("****".to_string())]);
        trace!(target: WIRE_TARGET, frame = %masked, "Frame sent");
        if let Err(e) = transport.send(&frame).await {
            warn!(error = %e, "Failed to answer auth request");
        }
    }

    async fn on_response(&mut self, transport: &mut dyn Transport, id: Option<u64>, payload: Value) {
        let Some(id) = id else {
            debug!("Response without id dropped");
            return;
        };

        let Some(handler) = self.pending.remove(&id) else {
            debug!(id, "Response to unknown request dropped");
            return;
        };

        if let Some(next) = handler(MessageType::Response, payload) {
            self.send_request(transport, next).await;
        }
    }

    /// Send an event under the next request id, registering its response
    /// handler if any
    pub async fn send_request(&mut self, transport: &mut dyn Transport, request: Request) {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let mut payload = Vec::with_capacity(request.args.len() + 1);
        payload.push(Value::String(request.name));
        payload.extend(request.args);

        send_frame(transport, &protocol::encode(id, &payload)).await;

        if let Some(handler) = request.on_response {
            self.pending.insert(id, handler);
        }
    }
}

async fn send_frame(transport: &mut dyn Transport, frame: &str) {
    trace!(target: WIRE_TARGET, frame = %frame, "Frame sent");
    if let Err(e) = transport.send(frame).await {
        warn!(error = %e, "Failed to send frame");
    }
}

/// Resolves once a stop has been requested
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::testing::ScriptedConnector;
    use crate::notify::sink::testing::RecordingSink;
    use serde_json::json;

    fn installation() -> Installation {
        Installation {
            id: "inst-1".to_string(),
            name: "Maison".to_string(),
        }
    }

    fn text(frame: &str) -> TransportEvent {
        TransportEvent::Text(frame.to_string())
    }

    fn supervisor(connector: Arc<ScriptedConnector>, sink: Arc<RecordingSink>) -> Supervisor {
        Supervisor::new(
            "wss://example.test/conn/",
            "jwt",
            installation(),
            connector,
            Notifier::new(sink),
        )
    }

    /// Run the supervisor for `secs` of (paused) time, then stop it
    async fn run_for(mut supervisor: Supervisor, secs: u64) -> Supervisor {
        let handle = supervisor.shutdown_handle();
        let task = tokio::spawn(async move {
            supervisor.run().await.unwrap();
            supervisor
        });

        tokio::time::sleep(Duration::from_secs(secs)).await;
        assert!(handle.stop());
        task.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_sends_open_frame() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![TransportEvent::Open]]));
        let supervisor = run_for(
            supervisor(connector.clone(), Arc::new(RecordingSink::default())),
            1,
        )
        .await;

        assert_eq!(connector.wire.sent(), vec!["40"]);
        assert_eq!(
            connector.urls.lock()[0],
            "wss://example.test/conn/?jwt=jwt&EIO=4&transport=websocket"
        );
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_is_answered() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text("2"),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 1).await;

        assert_eq!(connector.wire.sent(), vec!["40", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_reply_is_correlated() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text(r#"0{"sid":"s1"}"#),
            text(r#"427["auth"]"#),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 1).await;

        assert_eq!(connector.wire.sent(), vec!["40", r#"437["jwt"]"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_without_id_is_not_answered() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text(r#"42["auth"]"#),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 1).await;

        assert_eq!(connector.wire.sent(), vec!["40"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_waits_for_clear_listeners_response() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text(r#"42["ready"]"#),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 1).await;

        assert_eq!(connector.wire.sent(), vec!["40", r#"420["clear_listeners"]"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_then_listen_installation() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text(r#"42["ready"]"#),
            text("439[]"),
            text("430[]"),
            text("430[]"),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 1).await;

        assert_eq!(
            connector.wire.sent(),
            vec![
                "40",
                r#"420["clear_listeners"]"#,
                r#"421["listen_installation","inst-1"]"#,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            text(r#"42["DEVICE_STATE.inst-1",{"device_id":"z1","device_type":"az_zone","status":{"name":"Salon"}}]"#),
            text(r#"42["DEVICE_STATE_END.inst-1"]"#),
            text(r#"42["DEVICES_UPDATES.inst-1",{"device_id":"z1","change":{"status":{"mode":3}}}]"#),
            text(r#"42["DEVICES_UPDATES.inst-1",{"device_id":"z1","change":{"status":{"mode":3}}}]"#),
            text("not a frame"),
            text(r#"42["DEVICES_UPDATES.inst-1",{"device_id":"z1","change":{"status":{"power":false}}}]"#),
        ]]));
        let supervisor = run_for(supervisor(connector, sink.clone()), 1).await;

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let mut titles = sink.titles();
        titles.sort();
        assert_eq!(titles, vec!["Maison - Mode changed", "Maison - Power deactivated"]);
        assert_eq!(supervisor.interpreter().tracked().mode, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_schedules_one_reconnect_with_fresh_state() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            vec![
                TransportEvent::Open,
                text(r#"42["DEVICE_STATE.inst-1",{"device_id":"z1","device_type":"az_zone","status":{"name":"Salon"}}]"#),
                text(r#"42["DEVICES_UPDATES.inst-1",{"device_id":"z1","change":{"status":{"mode":2}}}]"#),
                text(r#"42["ready"]"#),
                TransportEvent::Close(None),
            ],
            vec![TransportEvent::Open],
        ]));
        let supervisor = run_for(
            supervisor(connector.clone(), Arc::new(RecordingSink::default())),
            8,
        )
        .await;

        assert_eq!(connector.attempts(), 2);
        let urls = connector.urls.lock().clone();
        assert_eq!(urls[0], urls[1]);

        let times = connector.times.lock().clone();
        let delay = times[1] - times[0];
        assert!(delay >= Duration::from_secs(5) && delay < Duration::from_secs(6));

        assert!(supervisor.interpreter().registry().is_empty());
        assert_eq!(supervisor.interpreter().tracked().mode, None);
        assert!(supervisor.pending.is_empty());
        assert_eq!(supervisor.next_request_id, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_does_not_reconnect() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            TransportEvent::Error("boom".to_string()),
        ]]));
        run_for(supervisor(connector.clone(), Arc::new(RecordingSink::default())), 30).await;

        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_stop_closes_once() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![TransportEvent::Open]]));
        let mut supervisor = supervisor(connector.clone(), Arc::new(RecordingSink::default()));
        let handle = supervisor.shutdown_handle();
        let task = tokio::spawn(async move {
            supervisor.run().await.unwrap();
            supervisor
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.stop());
        assert!(!handle.stop());
        let supervisor = task.await.unwrap();
        assert!(!handle.stop());
        assert!(handle.is_stopping());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.wire.closes(), 1);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let connector = Arc::new(ScriptedConnector::new(vec![vec![
            TransportEvent::Open,
            TransportEvent::Close(Some("server restart".to_string())),
        ]]));
        let supervisor = run_for(
            supervisor(connector.clone(), Arc::new(RecordingSink::default())),
            2,
        )
        .await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.wire.closes(), 0);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_request_allocates_monotonic_ids() {
        let connector = Arc::new(ScriptedConnector::new(vec![Vec::new()]));
        let mut supervisor = supervisor(connector.clone(), Arc::new(RecordingSink::default()));
        let mut transport = connector.connect("ws://unused").await.unwrap();

        supervisor
            .send_request(transport.as_mut(), Request::new("a", vec![json!(1)]))
            .await;
        supervisor
            .send_request(
                transport.as_mut(),
                Request::new("b", Vec::new()).on_response(|_, _| None),
            )
            .await;

        assert_eq!(connector.wire.sent(), vec![r#"420["a",1]"#, r#"421["b"]"#]);
        assert!(supervisor.pending.contains_key(&1));
        assert!(!supervisor.pending.contains_key(&0));
    }
}
