use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use prost::Message as _;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

use ssolink::crypto::{Cipher, PlainCipher};
use ssolink::service::proto::RegisterInfoResponse;
use ssolink::service::system::{HEARTBEAT_COMMAND, REGISTER_COMMAND};
use ssolink::sign::{NoSigner, SignResult, Signer};
use ssolink::transport::compress::deflate;
use ssolink::transport::codec::{
    AuthFlag, DEFAULT_MAX_FRAME_LEN, ServiceFrame, ServiceRequest, SsoFrame, SsoRequest,
    decode_service_request, decode_sso_request, encode_service_frame, encode_sso_response,
    frame_codec,
};
use ssolink::{
    ConnectionState, PushReceiver, SessionHandle, SessionStore, SsoError, TransportOptions,
    TransportSession,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Mock server ──

struct MockConn {
    frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    write: OwnedWriteHalf,
}

impl MockConn {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("no connection")
            .unwrap();
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            frames: FramedRead::new(read, frame_codec(DEFAULT_MAX_FRAME_LEN)),
            write,
        }
    }

    async fn next_request(&mut self) -> (ServiceRequest, SsoRequest) {
        let packet = tokio::time::timeout(WAIT, self.frames.next())
            .await
            .expect("no request")
            .expect("connection closed")
            .unwrap();
        let outer = decode_service_request(&packet).unwrap();
        let sso = decode_sso_request(&outer.body).unwrap();
        (outer, sso)
    }

    async fn reply_with(&mut self, flag: AuthFlag, frame: SsoFrame) {
        let bytes = encode_service_frame(&ServiceFrame {
            protocol_tag: 12,
            auth_flag: flag,
            uin: "10001".to_string(),
            body: encode_sso_response(&frame),
        });
        self.write.write_all(&bytes).await.unwrap();
    }

    async fn reply(&mut self, sequence: i32, command: &str, code: i32, payload: &[u8]) {
        self.reply_with(AuthFlag::Plain, response(sequence, command, code, payload))
            .await;
    }

    async fn expect_silence(&mut self, window: Duration) {
        let next = tokio::time::timeout(window, self.frames.next()).await;
        assert!(next.is_err(), "unexpected frame from client");
    }

    async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(WAIT, self.frames.next())
            .await
            .expect("connection still open");
        assert!(!matches!(next, Some(Ok(_))));
    }
}

fn response(sequence: i32, command: &str, code: i32, payload: &[u8]) -> SsoFrame {
    SsoFrame {
        sequence,
        return_code: code,
        extra: if code == 0 { String::new() } else { "denied".to_string() },
        command: command.to_string(),
        message_cookie: vec![],
        compressed: false,
        reserved_field: vec![],
        payload: payload.to_vec(),
    }
}

/// Service Frame bytes with an arbitrary (possibly invalid) auth flag.
fn raw_service_frame(flag: u8, body: &[u8]) -> Vec<u8> {
    let uin = b"10001";
    let mut inner = Vec::new();
    inner.extend_from_slice(&12u32.to_be_bytes());
    inner.push(flag);
    inner.push(0);
    inner.extend_from_slice(&(uin.len() as u32 + 4).to_be_bytes());
    inner.extend_from_slice(uin);
    inner.extend_from_slice(body);
    let mut out = (inner.len() as u32 + 4).to_be_bytes().to_vec();
    out.extend_from_slice(&inner);
    out
}

// ── Test doubles ──

/// Identity cipher that remembers every key it was handed.
#[derive(Default)]
struct RecordingCipher {
    encrypt_keys: Mutex<Vec<Vec<u8>>>,
    decrypt_keys: Mutex<Vec<Vec<u8>>>,
}

impl Cipher for RecordingCipher {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Vec<u8> {
        self.encrypt_keys.lock().unwrap().push(key.to_vec());
        plaintext.to_vec()
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_keys.lock().unwrap().push(key.to_vec());
        Ok(ciphertext.to_vec())
    }
}

struct CountingSigner {
    calls: AtomicUsize,
    outcome: std::result::Result<Option<SignResult>, &'static str>,
}

impl CountingSigner {
    fn new(outcome: std::result::Result<Option<SignResult>, &'static str>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome,
        })
    }
}

#[async_trait]
impl Signer for CountingSigner {
    async fn sign(
        &self,
        _command: &str,
        _sequence: i32,
        _payload: &[u8],
    ) -> Result<Option<SignResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(anyhow::Error::msg)
    }
}

// ── Fixtures ──

fn options(addr: SocketAddr) -> TransportOptions {
    TransportOptions {
        host: addr.ip().to_string(),
        port: addr.port(),
        reconnect_delay: Duration::from_millis(50),
        heartbeat_interval: None,
        connect_timeout: Duration::from_secs(2),
        register_timeout: Duration::from_secs(2),
        max_frame_len: DEFAULT_MAX_FRAME_LEN,
    }
}

fn store() -> SessionStore {
    let mut store = SessionStore::empty();
    store.uin = 10001;
    store.uid = "u_test".to_string();
    store
}

fn logged_in_store() -> SessionStore {
    let mut store = store();
    store.a2 = vec![0xa2; 8];
    store.d2 = vec![0xd2; 8];
    store.d2_key = vec![7; 16];
    store
}

struct Harness {
    listener: TcpListener,
    session: TransportSession,
    pushes: PushReceiver,
}

async fn harness_with(
    store: SessionStore,
    cipher: Arc<dyn Cipher>,
    signer: Arc<dyn Signer>,
    tweak: impl FnOnce(&mut TransportOptions),
) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut opts = options(listener.local_addr().unwrap());
    tweak(&mut opts);
    let (session, pushes) = TransportSession::new(
        opts,
        ssolink::AppInfo::default(),
        SessionHandle::new(store),
        cipher,
        signer,
    );
    Harness {
        listener,
        session,
        pushes,
    }
}

async fn harness() -> Harness {
    harness_with(store(), Arc::new(PlainCipher), Arc::new(NoSigner), |_| {}).await
}

async fn logged_in_harness() -> Harness {
    harness_with(logged_in_store(), Arc::new(PlainCipher), Arc::new(NoSigner), |_| {}).await
}

/// Connect the session and accept its socket on the mock side.
async fn connected(h: &Harness) -> MockConn {
    let (connect, conn) = tokio::join!(h.session.connect(), MockConn::accept(&h.listener));
    connect.unwrap();
    conn
}

async fn wait_for_state(session: &TransportSession, want: impl Fn(ConnectionState) -> bool) {
    let mut rx = session.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| want(*s)))
        .await
        .expect("state not reached")
        .unwrap();
}

// ── Request / response ──

#[tokio::test]
async fn response_resolves_matching_request() {
    let h = harness().await;
    let mut server = connected(&h).await;
    assert_eq!(h.session.state(), ConnectionState::Connected);

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session
            .send("OidbSvcTrpcTcp.0xfe1_2", b"ping", Duration::from_secs(2))
            .await
    });

    let (outer, sso) = server.next_request().await;
    assert_eq!(outer.uin, "10001");
    assert_eq!(outer.auth_flag, AuthFlag::ZeroKey);
    assert!(outer.d2.is_empty());
    assert_eq!(sso.command, "OidbSvcTrpcTcp.0xfe1_2");
    assert_eq!(sso.payload, b"ping");
    assert_eq!(sso.locale_id, 2052);
    assert_eq!(sso.reserved.uid.as_deref(), Some("u_test"));
    assert!(sso.reserved.trace.starts_with("00-"));
    assert!(sso.reserved.sec_info.is_none());

    server.reply(sso.sequence, &sso.command, 0, b"pong").await;
    let resp = call.await.unwrap().unwrap();
    assert_eq!(resp.sequence, sso.sequence);
    assert_eq!(resp.payload, b"pong");
    assert_eq!(resp.extra, None);
    assert_eq!(h.session.pending_len(), 0);
    h.session.close().await;
}

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let h = harness().await;
    let mut server = connected(&h).await;

    let mut calls = Vec::new();
    for i in 0..3u8 {
        let session = h.session.clone();
        calls.push(tokio::spawn(async move {
            session.send("test.Echo", &[i], Duration::from_secs(2)).await
        }));
    }
    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(server.next_request().await.1);
    }
    for req in requests.iter().rev() {
        server.reply(req.sequence, "test.Echo", 0, &req.payload).await;
    }

    for (i, call) in calls.into_iter().enumerate() {
        let resp = call.await.unwrap().unwrap();
        assert_eq!(resp.payload, vec![i as u8]);
    }
    h.session.close().await;
}

#[tokio::test]
async fn nonzero_return_code_is_delivered_not_raised() {
    let h = harness().await;
    let mut server = connected(&h).await;
    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Fail", b"", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    server.reply(sso.sequence, "test.Fail", -10001, b"").await;

    let resp = call.await.unwrap().unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.extra.as_deref(), Some("denied"));
    h.session.close().await;
}

#[tokio::test]
async fn send_before_connect_fails_fast() {
    let h = harness().await;
    let err = h
        .session
        .send("test.Echo", b"", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SsoError::NotConnected));
    assert_eq!(h.session.pending_len(), 0);
}

#[tokio::test]
async fn failed_first_connect_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (session, _pushes) = TransportSession::new(
        options(addr),
        ssolink::AppInfo::default(),
        SessionHandle::new(store()),
        Arc::new(PlainCipher),
        Arc::new(NoSigner),
    );
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SsoError::Connect { .. }));
    session.close().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

// ── Encryption keys ──

#[tokio::test]
async fn auth_flag_selects_decrypt_key() {
    let cipher = Arc::new(RecordingCipher::default());
    let h = harness_with(logged_in_store(), cipher.clone(), Arc::new(NoSigner), |_| {}).await;
    let mut server = connected(&h).await;

    for flag in [AuthFlag::Plain, AuthFlag::SessionKey, AuthFlag::ZeroKey] {
        let session = h.session.clone();
        let call = tokio::spawn(async move {
            session.send("test.Key", b"", Duration::from_secs(2)).await
        });
        let (outer, sso) = server.next_request().await;
        assert_eq!(outer.auth_flag, AuthFlag::SessionKey);
        assert_eq!(outer.d2, vec![0xd2; 8]);
        assert_eq!(sso.a2, vec![0xa2; 8]);
        server
            .reply_with(flag, response(sso.sequence, "test.Key", 0, b"ok"))
            .await;
        assert_eq!(call.await.unwrap().unwrap().payload, b"ok");
    }

    assert_eq!(*cipher.encrypt_keys.lock().unwrap(), vec![vec![7u8; 16]; 3]);
    assert_eq!(
        *cipher.decrypt_keys.lock().unwrap(),
        vec![vec![7u8; 16], vec![0u8; 16]]
    );
    h.session.close().await;
}

#[tokio::test]
async fn requests_without_d2_use_zero_key() {
    let cipher = Arc::new(RecordingCipher::default());
    let h = harness_with(store(), cipher.clone(), Arc::new(NoSigner), |_| {}).await;
    let mut server = connected(&h).await;
    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Key", b"", Duration::from_secs(2)).await
    });
    let (outer, sso) = server.next_request().await;
    assert_eq!(outer.auth_flag, AuthFlag::ZeroKey);
    server.reply(sso.sequence, "test.Key", 0, b"").await;
    call.await.unwrap().unwrap();
    assert_eq!(*cipher.encrypt_keys.lock().unwrap(), vec![vec![0u8; 16]]);
    h.session.close().await;
}

#[tokio::test]
async fn unknown_auth_flag_drops_connection() {
    let h = harness().await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Echo", b"", Duration::from_secs(5)).await
    });
    server.next_request().await;
    server
        .write
        .write_all(&raw_service_frame(9, b"garbage"))
        .await
        .unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_disconnect(), "{err}");
    assert_eq!(h.session.pending_len(), 0);
    server.expect_closed().await;
    h.session.close().await;
}

// ── Signing ──

#[tokio::test]
async fn allow_listed_command_carries_signature() {
    let signer = CountingSigner::new(Ok(Some(SignResult {
        sign: vec![1, 2, 3],
        token: vec![4],
        extra: vec![],
    })));
    let h = harness_with(store(), Arc::new(PlainCipher), signer.clone(), |_| {}).await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("wtlogin.login", b"tlv", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    let sec = sso.reserved.sec_info.expect("sec_info missing");
    assert_eq!(sec.sign, vec![1, 2, 3]);
    assert_eq!(sec.token, vec![4]);
    server.reply(sso.sequence, "wtlogin.login", 0, b"").await;
    call.await.unwrap().unwrap();

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Unsigned", b"", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    assert!(sso.reserved.sec_info.is_none());
    server.reply(sso.sequence, "test.Unsigned", 0, b"").await;
    call.await.unwrap().unwrap();

    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    h.session.close().await;
}

#[tokio::test]
async fn signer_declining_sends_unsigned() {
    let signer = CountingSigner::new(Ok(None));
    let h = harness_with(store(), Arc::new(PlainCipher), signer.clone(), |_| {}).await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("MessageSvc.PbSendMsg", b"", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    assert!(sso.reserved.sec_info.is_none());
    server.reply(sso.sequence, &sso.command, 0, b"").await;
    call.await.unwrap().unwrap();
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    h.session.close().await;
}

#[tokio::test]
async fn signer_failure_fails_send_without_writing() {
    let signer = CountingSigner::new(Err("sign server unreachable"));
    let h = harness_with(store(), Arc::new(PlainCipher), signer.clone(), |_| {}).await;
    let mut server = connected(&h).await;

    let err = h
        .session
        .send("wtlogin.login", b"tlv", Duration::from_secs(2))
        .await
        .unwrap_err();
    match err {
        SsoError::Sign { command, message } => {
            assert_eq!(command, "wtlogin.login");
            assert!(message.contains("sign server unreachable"), "{message}");
        }
        other => panic!("expected a sign error, got {other}"),
    }
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.pending_len(), 0);
    server.expect_silence(Duration::from_millis(300)).await;
    assert_eq!(h.session.state(), ConnectionState::Connected);
    h.session.close().await;
}

// ── Timeouts and pushes ──

#[tokio::test]
async fn late_response_after_timeout_becomes_push() {
    let mut h = harness().await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Slow", b"", Duration::from_millis(100)).await
    });
    let (_, sso) = server.next_request().await;
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SsoError::Timeout { sequence, .. } if sequence == sso.sequence));
    assert_eq!(h.session.pending_len(), 0);

    server.reply(sso.sequence, "test.Slow", 0, b"late").await;
    let push = tokio::time::timeout(WAIT, h.pushes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(push.sequence, sso.sequence);
    assert_eq!(push.payload, b"late");
    h.session.close().await;
}

#[tokio::test]
async fn unsolicited_frame_is_pushed() {
    let mut h = harness().await;
    let mut server = connected(&h).await;
    server
        .reply(999, "trpc.msg.olpush.OlPushService.MsgPush", 0, b"event")
        .await;
    let push = tokio::time::timeout(WAIT, h.pushes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(push.command, "trpc.msg.olpush.OlPushService.MsgPush");
    assert_eq!(push.payload, b"event");
    assert_eq!(h.session.state(), ConnectionState::Connected);
    h.session.close().await;
}

#[tokio::test]
async fn compressed_push_is_inflated() {
    let mut h = harness().await;
    let mut server = connected(&h).await;
    let mut frame = response(4242, "test.Push", 0, &deflate(b"inflated"));
    frame.compressed = true;
    server.reply_with(AuthFlag::Plain, frame).await;

    let push = tokio::time::timeout(WAIT, h.pushes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(push.payload, b"inflated");
    h.session.close().await;
}

#[tokio::test]
async fn malformed_response_fails_only_its_request() {
    let h = harness().await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Broken", b"", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    let mut frame = response(sso.sequence, "test.Broken", 0, b"not zlib at all");
    frame.compressed = true;
    server.reply_with(AuthFlag::Plain, frame).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(
        matches!(err, SsoError::MalformedResponse { sequence, .. } if sequence == sso.sequence),
        "{err}"
    );
    assert_eq!(h.session.state(), ConnectionState::Connected);
    assert_eq!(h.session.pending_len(), 0);

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Echo", b"still up", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    server.reply(sso.sequence, "test.Echo", 0, b"still up").await;
    assert_eq!(call.await.unwrap().unwrap().payload, b"still up");
    h.session.close().await;
}

// ── Connection loss ──

#[tokio::test]
async fn dropped_connection_fails_every_pending_request() {
    let h = harness().await;
    let mut server = connected(&h).await;

    let mut calls = Vec::new();
    for _ in 0..3 {
        let session = h.session.clone();
        calls.push(tokio::spawn(async move {
            session.send("test.Hang", b"", Duration::from_secs(5)).await
        }));
    }
    for _ in 0..3 {
        server.next_request().await;
    }
    assert_eq!(h.session.pending_len(), 3);
    drop(server);

    for call in calls {
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, SsoError::Disconnected { .. }), "{err}");
    }
    assert_eq!(h.session.pending_len(), 0);
    h.session.close().await;
}

#[tokio::test]
async fn reconnect_registers_before_anything_else() {
    let h = logged_in_harness().await;
    let server = connected(&h).await;
    drop(server);

    let mut server = MockConn::accept(&h.listener).await;
    let (_, sso) = server.next_request().await;
    assert_eq!(sso.command, REGISTER_COMMAND);

    let ok = RegisterInfoResponse {
        message: "register success".to_string(),
    }
    .encode_to_vec();
    server.reply(sso.sequence, REGISTER_COMMAND, 0, &ok).await;
    wait_for_state(&h.session, |s| s.is_connected()).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Echo", b"again", Duration::from_secs(2)).await
    });
    let (_, sso) = server.next_request().await;
    assert_eq!(sso.command, "test.Echo");
    server.reply(sso.sequence, "test.Echo", 0, b"again").await;
    assert_eq!(call.await.unwrap().unwrap().payload, b"again");
    h.session.close().await;
}

#[tokio::test]
async fn registers_once_server_comes_up_after_failed_first_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (session, _pushes) = TransportSession::new(
        options(addr),
        ssolink::AppInfo::default(),
        SessionHandle::new(logged_in_store()),
        Arc::new(PlainCipher),
        Arc::new(NoSigner),
    );
    assert!(matches!(session.connect().await, Err(SsoError::Connect { .. })));

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut server = MockConn::accept(&listener).await;
    let (_, sso) = server.next_request().await;
    assert_eq!(sso.command, REGISTER_COMMAND);

    let ok = RegisterInfoResponse {
        message: "register success".to_string(),
    }
    .encode_to_vec();
    server.reply(sso.sequence, REGISTER_COMMAND, 0, &ok).await;
    wait_for_state(&session, |s| s.is_connected()).await;
    session.close().await;
}

#[tokio::test]
async fn connect_attempt_is_bounded_by_deadline() {
    // TEST-NET-1 is never routed, so the attempt either hangs or fails fast.
    let (session, _pushes) = TransportSession::new(
        TransportOptions {
            host: "192.0.2.1".to_string(),
            port: 8080,
            connect_timeout: Duration::from_millis(200),
            ..options("127.0.0.1:0".parse().unwrap())
        },
        ssolink::AppInfo::default(),
        SessionHandle::new(store()),
        Arc::new(PlainCipher),
        Arc::new(NoSigner),
    );
    let result = tokio::time::timeout(Duration::from_secs(3), session.connect())
        .await
        .expect("connect attempt outlived its deadline");
    assert!(matches!(result, Err(SsoError::Connect { .. })), "{result:?}");
    session.close().await;
}

#[tokio::test]
async fn close_fails_pending_and_stops_reconnecting() {
    let h = harness().await;
    let mut server = connected(&h).await;

    let session = h.session.clone();
    let call = tokio::spawn(async move {
        session.send("test.Hang", b"", Duration::from_secs(5)).await
    });
    server.next_request().await;
    h.session.close().await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SsoError::Closed), "{err}");
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    server.expect_closed().await;

    let again = tokio::time::timeout(Duration::from_millis(300), h.listener.accept()).await;
    assert!(again.is_err(), "session reconnected after close");
    assert!(matches!(
        h.session.send("test.Echo", b"", Duration::from_secs(1)).await,
        Err(SsoError::Closed)
    ));
}

// ── Status service ──

#[tokio::test]
async fn online_checks_register_message() {
    let h = logged_in_harness().await;
    let mut server = connected(&h).await;

    for (message, accepted) in [("register success", true), ("kicked", false)] {
        let session = h.session.clone();
        let call = tokio::spawn(async move { session.online().await });
        let (_, sso) = server.next_request().await;
        assert_eq!(sso.command, REGISTER_COMMAND);
        let payload = RegisterInfoResponse {
            message: message.to_string(),
        }
        .encode_to_vec();
        server.reply(sso.sequence, REGISTER_COMMAND, 0, &payload).await;
        let result = call.await.unwrap();
        assert_eq!(result.is_ok(), accepted, "{result:?}");
        if !accepted {
            assert!(matches!(result, Err(SsoError::Online(m)) if m == "kicked"));
        }
    }
    h.session.close().await;
}

#[tokio::test]
async fn service_error_carries_return_code() {
    let h = harness().await;
    let mut server = connected(&h).await;
    let session = h.session.clone();
    let call = tokio::spawn(async move { session.heartbeat().await });
    let (_, sso) = server.next_request().await;
    server.reply(sso.sequence, HEARTBEAT_COMMAND, 3, b"").await;
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SsoError::Service { code: 3, .. }), "{err}");
    h.session.close().await;
}

#[tokio::test]
async fn heartbeat_runs_on_interval() {
    let h = harness_with(store(), Arc::new(PlainCipher), Arc::new(NoSigner), |o| {
        o.heartbeat_interval = Some(Duration::from_millis(100));
    })
    .await;
    let mut server = connected(&h).await;
    for _ in 0..2 {
        let (_, sso) = server.next_request().await;
        assert_eq!(sso.command, HEARTBEAT_COMMAND);
        server.reply(sso.sequence, HEARTBEAT_COMMAND, 0, b"").await;
    }
    h.session.close().await;
}
