//! Integration tests against an in-process stub Broker listener.
//!
//! The stub speaks just enough of the XWB protocol to exercise the full
//! connection sequence, invoke round trips, the plaintext ACCESS/VERIFY
//! fallback, the encrypted-context fallback, and context-loss recovery.
//! No real VistA is involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use vista_broker::{
    string_params, BrokerConfig, BrokerError, BrokerSession, CipherTable, FRAME_TERMINATOR,
};

const ACCESS: &str = "worker1";
const VERIFY: &str = "pass.123";
const PINNED_CONTEXT: &str = "VPR APPLICATION PROXY";

fn test_table() -> CipherTable {
    CipherTable::new(vec![
        "abcdefghijklmnopqrstuvwxyz0123456789;.".to_string(),
        "bcdefghijklmnopqrstuvwxyz0123456789;.a".to_string(),
        "cdefghijklmnopqrstuvwxyz0123456789;.ab".to_string(),
        "defghijklmnopqrstuvwxyz0123456789;.abc".to_string(),
    ])
    .unwrap()
}

/// Behavior knobs for the stub, shared across accepted connections.
#[derive(Default)]
struct StubState {
    /// Accept only the plaintext ACCESS;VERIFY payload, forcing the
    /// client's plaintext retry.
    av_plaintext_only: bool,
    /// Reject the first XWB CREATE CONTEXT attempt of each connection.
    reject_first_context: bool,
    /// Answer the first ECHO PARAMS with a context-lost error.
    drop_context_once: bool,
    /// Close the connection instead of answering a heartbeat probe.
    drop_on_heartbeat: bool,
    context_attempts: AtomicUsize,
    connections: AtomicUsize,
    echoes_dropped: AtomicUsize,
    heartbeats: AtomicUsize,
    created_contexts: Mutex<Vec<String>>,
}

/// One parsed request frame.
struct Request {
    name: String,
    params: Vec<String>,
}

async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut frame = Vec::new();
    loop {
        let byte = match stream.read_u8().await {
            Ok(b) => b,
            Err(_) => return None, // EOF or reset: #BYE# / dropped peer
        };
        if byte == FRAME_TERMINATOR {
            return Some(frame);
        }
        frame.push(byte);
        // A #BYE# marker arrives without a terminator.
        if frame == b"#BYE#" {
            return None;
        }
    }
}

fn parse_frame(frame: &[u8]) -> Request {
    assert!(frame.starts_with(b"[XWB]1130"), "bad prefix: {:?}", frame);
    let mut idx = 9;
    // Command mode is a single "4"; RPC mode is three bytes.
    idx += if frame[idx] == b'4' { 1 } else { 3 };
    let name_len = frame[idx] as usize;
    idx += 1;
    let name = String::from_utf8_lossy(&frame[idx..idx + name_len]).into_owned();
    idx += name_len;

    let mut params = Vec::new();
    if &frame[idx..] != b"54f" {
        assert_eq!(frame[idx], b'5');
        idx += 1;
        while idx < frame.len() {
            idx += 1; // kind byte
            let len: usize = String::from_utf8_lossy(&frame[idx..idx + 3]).parse().unwrap();
            idx += 3;
            params.push(String::from_utf8_lossy(&frame[idx..idx + len]).into_owned());
            idx += len;
            assert_eq!(frame[idx], b'f');
            idx += 1;
        }
    }
    Request { name, params }
}

async fn reply(stream: &mut TcpStream, body: &str) {
    let mut out = body.as_bytes().to_vec();
    out.push(FRAME_TERMINATOR);
    stream.write_all(&out).await.unwrap();
}

async fn handle_connection(mut stream: TcpStream, state: Arc<StubState>, table: CipherTable) {
    let mut context_rejected = false;
    while let Some(frame) = read_frame(&mut stream).await {
        let request = parse_frame(&frame);
        match request.name.as_str() {
            "TCPConnect" => {
                assert_eq!(request.params.len(), 3);
                assert_eq!(request.params[1], "0");
                assert_eq!(request.params[2], "FMQL");
                reply(&mut stream, "accept").await;
            }
            "XUS SIGNON SETUP" => reply(&mut stream, "8^VISTA.EXAMPLE.ORG^").await,
            "XUS AV CODE" => {
                let expected = format!("{};{}", ACCESS, VERIFY);
                let presented = &request.params[0];
                let matched = if state.av_plaintext_only {
                    presented == &expected
                } else {
                    table.decrypt(presented).map(|p| p == expected).unwrap_or(false)
                        || presented == &expected
                };
                if matched {
                    // First caret piece is the signed-on DUZ.
                    reply(&mut stream, "123^0^0^^^^^^").await;
                } else {
                    reply(&mut stream, "0^0^0^Not a valid ACCESS CODE/VERIFY CODE pair").await;
                }
            }
            "XWB CREATE CONTEXT" => {
                state.context_attempts.fetch_add(1, Ordering::SeqCst);
                if state.reject_first_context && !context_rejected {
                    context_rejected = true;
                    reply(&mut stream, "-1^Application context has not been created").await;
                    continue;
                }
                let name = table
                    .decrypt(&request.params[0])
                    .unwrap_or_else(|_| request.params[0].clone());
                state.created_contexts.lock().unwrap().push(name);
                reply(&mut stream, "1").await;
            }
            "ECHO PARAMS" => {
                if state.drop_context_once && state.echoes_dropped.load(Ordering::SeqCst) == 0 {
                    state.echoes_dropped.fetch_add(1, Ordering::SeqCst);
                    reply(&mut stream, "-1^Application context has not been created").await;
                    continue;
                }
                reply(&mut stream, &request.params.join("|")).await;
            }
            "XUS GET USER INFO" => {
                state.heartbeats.fetch_add(1, Ordering::SeqCst);
                if state.drop_on_heartbeat {
                    return;
                }
                reply(&mut stream, "123^WORKER,ONE").await;
            }
            other => reply(&mut stream, &format!("-1^Unknown RPC {}", other)).await,
        }
    }
}

async fn spawn_stub(state: Arc<StubState>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            state.connections.fetch_add(1, Ordering::SeqCst);
            let state = Arc::clone(&state);
            tokio::spawn(handle_connection(stream, state, test_table()));
        }
    });
    port
}

fn session_for(port: u16) -> BrokerSession {
    let config = BrokerConfig::new("127.0.0.1", port, ACCESS, VERIFY, PINNED_CONTEXT);
    BrokerSession::new(config, test_table())
}

#[tokio::test]
async fn test_full_handshake_and_invoke() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();
    assert_eq!(session.duz().await.as_deref(), Some("123"));

    let echoed = session
        .invoke("ECHO PARAMS", &string_params(["alpha", "beta"]))
        .await
        .unwrap();
    assert_eq!(echoed, "alpha|beta");

    assert_eq!(
        state.created_contexts.lock().unwrap().as_slice(),
        [PINNED_CONTEXT.to_string()]
    );
    session.close().await;
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();
    session.connect().await.unwrap();
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plaintext_av_fallback() {
    let state = Arc::new(StubState {
        av_plaintext_only: true,
        ..Default::default()
    });
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();
    assert_eq!(session.duz().await.as_deref(), Some("123"));
}

#[tokio::test]
async fn test_bad_codes_denied_after_both_attempts() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let config = BrokerConfig::new("127.0.0.1", port, "wrong", "codes", PINNED_CONTEXT);
    let session = BrokerSession::new(config, test_table());
    let result = session.connect().await;
    assert!(matches!(result, Err(BrokerError::AccessDenied)));
}

#[tokio::test]
async fn test_encrypted_context_fallback() {
    let state = Arc::new(StubState {
        reject_first_context: true,
        ..Default::default()
    });
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();

    // One rejected plaintext attempt, one accepted encrypted attempt; the
    // stub decrypts, so the recorded name is the plaintext context.
    assert_eq!(state.context_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        state.created_contexts.lock().unwrap().as_slice(),
        [PINNED_CONTEXT.to_string()]
    );
}

#[tokio::test]
async fn test_context_loss_reconnects_and_retries_once() {
    let state = Arc::new(StubState {
        drop_context_once: true,
        ..Default::default()
    });
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();

    let echoed = session.invoke("ECHO PARAMS", &string_params(["x"])).await.unwrap();
    assert_eq!(echoed, "x");
    // The lost context forced a second physical connection.
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_context_restores_pinned() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    session.connect().await.unwrap();

    let echoed = session
        .invoke_in_context("OR CPRS GUI CHART", "ECHO PARAMS", &string_params(["y"]))
        .await
        .unwrap();
    assert_eq!(echoed, "y");

    let contexts = state.created_contexts.lock().unwrap().clone();
    assert_eq!(
        contexts,
        vec![
            PINNED_CONTEXT.to_string(),
            "OR CPRS GUI CHART".to_string(),
            PINNED_CONTEXT.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_idle_heartbeat_probes_user_info() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = Arc::new(session_for(port));
    session.connect().await.unwrap();

    let heartbeat = session.spawn_heartbeat(
        std::time::Duration::from_millis(20),
        std::time::Duration::from_millis(5),
    );
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    heartbeat.abort();

    assert!(state.heartbeats.load(Ordering::SeqCst) >= 1);
    session.close().await;
}

#[tokio::test]
async fn test_failed_heartbeat_forces_reconnect_on_next_invoke() {
    let state = Arc::new(StubState {
        drop_on_heartbeat: true,
        ..Default::default()
    });
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = Arc::new(session_for(port));
    session.connect().await.unwrap();

    // The stub hangs up on the probe, so the heartbeat drops the socket.
    let heartbeat = session.spawn_heartbeat(
        std::time::Duration::from_millis(20),
        std::time::Duration::from_millis(5),
    );
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    heartbeat.abort();
    assert!(state.heartbeats.load(Ordering::SeqCst) >= 1);

    let echoed = session.invoke("ECHO PARAMS", &string_params(["back"])).await.unwrap();
    assert_eq!(echoed, "back");
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lazy_connect_on_first_invoke() {
    let state = Arc::new(StubState::default());
    let port = spawn_stub(Arc::clone(&state)).await;

    let session = session_for(port);
    let echoed = session.invoke("ECHO PARAMS", &string_params(["lazy"])).await.unwrap();
    assert_eq!(echoed, "lazy");
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}
