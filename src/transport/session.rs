use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crypto::Cipher;
use crate::error::{FrameError, LinkError, SsoError};
use crate::identity::{AppInfo, SessionHandle};
use crate::sign::{Signer, requires_signature};

use super::codec::{
    AuthFlag, DEFAULT_MAX_FRAME_LEN, LOCALE_ID, ServiceRequest, SsoRequest, SsoResponse,
    decode_service_frame, decode_sso_response, encode_service_request, encode_sso_request,
    frame_codec,
};
use super::pending::PendingTable;
use super::proto::{SsoReservedFields, SsoSecureInfo, generate_trace};
use super::push::{PushReceiver, push_channel};
use super::sequence::SequenceAllocator;
use super::state::ConnectionState;

pub const DEFAULT_HOST: &str = "msfwifi.3g.qq.com";
pub const DEFAULT_PORT: u16 = 8080;

/// Connection parameters for a [`TransportSession`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub host: String,
    pub port: u16,
    /// Pause between losing a connection and the next attempt.
    pub reconnect_delay: Duration,
    /// `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Deadline for a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Deadline for the registration issued after a reconnect.
    pub register_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Some(Duration::from_secs(300)),
            connect_timeout: Duration::from_secs(15),
            register_timeout: Duration::from_secs(15),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

async fn connect_within(addr: &str, deadline: Duration) -> std::io::Result<TcpStream> {
    match tokio::time::timeout(deadline, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect timed out after {deadline:?}"),
        )),
    }
}

/// Write half of the live connection. A failed write reports back to the
/// connection driver through `failed` so the connection is torn down.
struct Link {
    write: OwnedWriteHalf,
    failed: Option<oneshot::Sender<std::io::Error>>,
}

/// One long-lived SSO connection multiplexing RPCs and server pushes.
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct TransportSession {
    inner: Arc<Inner>,
}

struct Inner {
    options: TransportOptions,
    app: AppInfo,
    identity: SessionHandle,
    cipher: Arc<dyn Cipher>,
    signer: Arc<dyn Signer>,
    sequence: SequenceAllocator,
    pending: PendingTable,
    link: tokio::sync::Mutex<Option<Link>>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    /// Build a disconnected session. Frames nobody is waiting for arrive on
    /// the returned receiver.
    pub fn new(
        options: TransportOptions,
        app: AppInfo,
        identity: SessionHandle,
        cipher: Arc<dyn Cipher>,
        signer: Arc<dyn Signer>,
    ) -> (Self, PushReceiver) {
        let (push, push_rx) = push_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(Inner {
            options,
            app,
            identity,
            cipher,
            signer,
            sequence: SequenceAllocator::new(),
            pending: PendingTable::new(push),
            link: tokio::sync::Mutex::new(None),
            state,
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
        });
        (Self { inner }, push_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn identity(&self) -> &SessionHandle {
        &self.inner.identity
    }

    pub fn app_info(&self) -> &AppInfo {
        &self.inner.app
    }

    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }

    /// Start the connection driver and wait for the first attempt.
    ///
    /// On failure the driver keeps retrying in the background; later
    /// successes are visible through [`TransportSession::watch_state`].
    pub async fn connect(&self) -> Result<(), SsoError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SsoError::Closed);
        }
        let first_attempt = {
            let mut driver = self.inner.lock_driver();
            if driver.is_some() {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            *driver = Some(tokio::spawn(self.inner.clone().drive(tx)));
            rx
        };
        first_attempt.await.unwrap_or(Err(SsoError::Closed))
    }

    /// Issue one RPC and wait up to `timeout` for its answer.
    ///
    /// A non-zero return code is still `Ok`; see [`TransportSession::call`]
    /// for the typed variant.
    pub async fn send(
        &self,
        command: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<SsoResponse, SsoError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(SsoError::Closed);
        }

        let sequence = inner.sequence.next();
        let frame = inner.build_request(command, sequence, payload).await?;
        let slot = inner.pending.register(sequence, command)?;

        {
            let mut link = inner.link.lock().await;
            let Some(conn) = link.as_mut() else {
                drop(link);
                inner.pending.cancel(sequence);
                return Err(SsoError::NotConnected);
            };
            if let Err(e) = conn.write.write_all(&frame).await {
                error!("[seq={sequence}] Write failed: {e}");
                if let Some(failed) = conn.failed.take() {
                    let _ = failed.send(e);
                }
            } else {
                debug!("[seq={sequence}] -> {command}");
            }
        }

        match tokio::time::timeout(timeout, slot).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SsoError::Disconnected {
                reason: "request dropped".to_string(),
            }),
            Err(_) => {
                inner.pending.cancel(sequence);
                warn!("[seq={sequence}] {command} timed out after {timeout:?}");
                Err(SsoError::Timeout {
                    command: command.to_string(),
                    sequence,
                    timeout,
                })
            }
        }
    }

    /// Stop reconnecting, fail pending requests and drop the socket.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let driver = self.inner.lock_driver().take();
        match driver {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Connection driver panicked: {e}");
                }
            }
            None => {
                self.inner.teardown(SsoError::Closed).await;
                self.inner.state.send_replace(ConnectionState::Disconnected);
            }
        }
        info!("Transport session closed");
    }
}

impl Inner {
    fn lock_driver(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn session(self: &Arc<Self>) -> TransportSession {
        TransportSession { inner: self.clone() }
    }

    /// Connect / read / reconnect until shutdown.
    async fn drive(self: Arc<Self>, first_attempt: oneshot::Sender<Result<(), SsoError>>) {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let mut first_attempt = Some(first_attempt);

        while !self.shutdown.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            info!("Connecting to {addr}");
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                r = connect_within(&addr, self.options.connect_timeout) => r,
            };

            match connected {
                Ok(stream) => {
                    info!("Connected to {addr}");
                    // Every connection after the first attempt came through
                    // ReconnectPending and must register again.
                    let replay_register = first_attempt.is_none();
                    let lost = self
                        .run_connection(stream, replay_register, first_attempt.take())
                        .await;
                    let Some(err) = lost else { break };
                    error!("Connection to {addr} lost: {err}");
                    self.teardown(SsoError::Disconnected {
                        reason: err.to_string(),
                    })
                    .await;
                }
                Err(e) => {
                    warn!("Failed to connect to {addr}: {e}");
                    if let Some(tx) = first_attempt.take() {
                        let _ = tx.send(Err(SsoError::Connect {
                            addr: addr.clone(),
                            source: Arc::new(e),
                        }));
                    }
                }
            }

            let delay = self.options.reconnect_delay;
            self.set_state(ConnectionState::ReconnectPending(delay));
            info!("Reconnecting in {delay:?}");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.teardown(SsoError::Closed).await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Serve one established connection. Returns `None` on shutdown and the
    /// cause otherwise.
    async fn run_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        replay_register: bool,
        first_attempt: Option<oneshot::Sender<Result<(), SsoError>>>,
    ) -> Option<LinkError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }
        let (read, write) = stream.into_split();
        let (failed_tx, mut failed_rx) = oneshot::channel();
        *self.link.lock().await = Some(Link {
            write,
            failed: Some(failed_tx),
        });
        self.set_state(ConnectionState::Connected);
        if let Some(tx) = first_attempt {
            let _ = tx.send(Ok(()));
        }

        let conn = self.shutdown.child_token();
        if replay_register {
            self.spawn_register();
        }
        if let Some(every) = self.options.heartbeat_interval {
            self.spawn_heartbeat(every, conn.clone());
        }

        let lost = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            err = self.read_loop(read) => Some(err),
            Ok(e) = &mut failed_rx => Some(LinkError::Io(e)),
        };
        conn.cancel();
        lost
    }

    async fn read_loop(&self, read: OwnedReadHalf) -> LinkError {
        let mut frames = FramedRead::new(read, frame_codec(self.options.max_frame_len));
        loop {
            let packet = match frames.next().await {
                Some(Ok(packet)) => packet,
                Some(Err(e)) => return LinkError::Io(e),
                None => return LinkError::Eof,
            };
            if let Err(e) = self.dispatch(&packet).await {
                return LinkError::Frame(e);
            }
        }
    }

    /// Handle one inbound Service Frame. Errors are fatal to the connection;
    /// problems inside the SSO Frame only fail the matching request.
    async fn dispatch(&self, packet: &[u8]) -> Result<(), FrameError> {
        let frame = decode_service_frame(packet)?;
        let d2_key = match frame.auth_flag {
            AuthFlag::SessionKey => self.identity.snapshot().await.d2_key,
            _ => Vec::new(),
        };
        let body = match frame.auth_flag.key(&d2_key) {
            Some(key) => self
                .cipher
                .decrypt(&frame.body, key)
                .map_err(|e| FrameError::Decrypt(e.to_string()))?,
            None => frame.body,
        };

        match decode_sso_response(&body) {
            Ok(sso) => {
                let sequence = sso.sequence;
                match sso.into_response() {
                    Ok(resp) => {
                        debug!(
                            "[seq={sequence}] <- {} (code={})",
                            resp.command, resp.return_code
                        );
                        self.pending.complete(resp);
                    }
                    Err(e) => self.malformed(sequence, e),
                }
            }
            Err((Some(sequence), e)) => self.malformed(sequence, e),
            Err((None, e)) => warn!("Dropping unreadable SSO frame: {e}"),
        }
        Ok(())
    }

    fn malformed(&self, sequence: i32, source: FrameError) {
        warn!("[seq={sequence}] Malformed response: {source}");
        self.pending
            .fail(sequence, SsoError::MalformedResponse { sequence, source });
    }

    /// Fail everything still pending, then close the write half. The link
    /// lock is held throughout so no request slips onto the dying socket.
    async fn teardown(&self, err: SsoError) {
        let mut link = self.link.lock().await;
        let failed = self.pending.fail_all(err.clone());
        if failed > 0 {
            warn!("Failed {failed} pending request(s): {err}");
        }
        if let Some(mut conn) = link.take() {
            let _ = conn.write.shutdown().await;
        }
    }

    async fn build_request(
        &self,
        command: &str,
        sequence: i32,
        payload: &[u8],
    ) -> Result<Vec<u8>, SsoError> {
        let sec_info = if requires_signature(command) {
            self.signer
                .sign(command, sequence, payload)
                .await
                .map_err(|e| SsoError::Sign {
                    command: command.to_string(),
                    message: format!("{e:#}"),
                })?
                .map(|r| SsoSecureInfo {
                    sign: r.sign,
                    token: r.token,
                    extra: r.extra,
                })
        } else {
            None
        };

        let session = self.identity.snapshot().await;
        let sso = SsoRequest {
            sequence,
            sub_app_id: self.app.sub_app_id,
            locale_id: LOCALE_ID,
            a2: session.a2,
            command: command.to_string(),
            guid_hex: hex::encode(&session.guid),
            app_version: self.app.current_version.clone(),
            reserved: SsoReservedFields {
                trace: generate_trace(),
                uid: (!session.uid.is_empty()).then_some(session.uid),
                sec_info,
            },
            payload: payload.to_vec(),
        };

        let auth_flag = AuthFlag::for_request(&session.d2);
        let plain = encode_sso_request(&sso);
        let body = match auth_flag.key(&session.d2_key) {
            Some(key) => self.cipher.encrypt(&plain, key),
            None => plain,
        };
        Ok(encode_service_request(&ServiceRequest {
            auth_flag,
            d2: session.d2,
            uin: session.uin.to_string(),
            body,
        }))
    }

    fn spawn_register(self: &Arc<Self>) {
        let session = self.session();
        tokio::spawn(async move {
            match session.online().await {
                Ok(()) => info!("Registered again after reconnect"),
                Err(e) => warn!("Registration after reconnect failed: {e}"),
            }
        });
    }

    fn spawn_heartbeat(self: &Arc<Self>, every: Duration, conn: CancellationToken) {
        let session = self.session();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // consume first immediate tick
            loop {
                tokio::select! {
                    _ = conn.cancelled() => break,
                    _ = ticker.tick() => {
                        match session.heartbeat().await {
                            Ok(()) => debug!("Heartbeat acknowledged"),
                            Err(e) => warn!("Heartbeat failed: {e}"),
                        }
                    }
                }
            }
        });
    }
}
