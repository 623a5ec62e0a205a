//! Broker session: one TCP connection, one application context.
//!
//! A session owns a single socket and serializes every use of it behind
//! one async mutex. The Broker protocol carries no correlation ids, so
//! replies are matched to requests purely by ordering; two frames in
//! flight on the same socket would interleave.
//!
//! # Connection sequence
//!
//! ```text
//! TCP connect (keepalive on)
//!   -> TCPConnect [local-ip, "0", "FMQL"]   (command; reply must "accept")
//!   -> XUS SIGNON SETUP                     (reply logged, not checked)
//!   -> XUS AV CODE encrypt("ACCESS;VERIFY") (plaintext retry on rejection)
//!   -> XWB CREATE CONTEXT context           (encrypted retry on rejection)
//! ```
//!
//! Each session is pinned to exactly one steady-state context. A call in
//! a different context switches, runs the call, and restores the pinned
//! context before the lock is released; callers never observe the session
//! parked on a foreign context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::cipher::CipherTable;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::frame::{encode_frame, read_reply};
use crate::params::{string_params, RpcParam};

/// Cheap no-op RPC issued by the heartbeat to keep an idle socket alive.
const HEARTBEAT_RPC: &str = "XUS GET USER INFO";

/// Server rejection text for a bad ACCESS/VERIFY pair.
const AV_REJECTED: &str = "Not a valid ACCESS CODE/VERIFY CODE pair";

/// Mutable half of a session, guarded by the session mutex.
struct SessionInner {
    stream: Option<TcpStream>,
    /// The context currently established on the socket.
    context: Option<String>,
    /// Signed-on user id, from the first caret piece of the AV reply.
    duz: Option<String>,
    last_used: Instant,
}

/// A connection to one Broker listener, pinned to one application context.
pub struct BrokerSession {
    config: BrokerConfig,
    cipher: CipherTable,
    inner: Mutex<SessionInner>,
}

impl BrokerSession {
    /// Create a session. No I/O happens until [`connect`](Self::connect)
    /// or the first invoke.
    pub fn new(config: BrokerConfig, cipher: CipherTable) -> Self {
        Self {
            config,
            cipher,
            inner: Mutex::new(SessionInner {
                stream: None,
                context: None,
                duz: None,
                last_used: Instant::now(),
            }),
        }
    }

    /// The session's configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// The context this session is pinned to.
    pub fn context(&self) -> &str {
        &self.config.context
    }

    /// The signed-on user's DUZ, once connected.
    pub async fn duz(&self) -> Option<String> {
        self.inner.lock().await.duz.clone()
    }

    /// Open the socket and run the full connection sequence.
    ///
    /// Idempotent: an already-connected session is left alone.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.stream.is_some() {
            return Ok(());
        }
        self.connect_locked(&mut inner).await
    }

    /// Invoke an RPC in the session's pinned context.
    ///
    /// Holds the session lock for the full round trip. If the reply
    /// matches a configured context-lost marker the session reconnects
    /// from scratch and retries the call exactly once.
    pub async fn invoke(&self, rpc: &str, params: &[RpcParam]) -> Result<String> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let reply = self.roundtrip(&mut inner, rpc, params, false).await?;
        if !self.context_lost(&reply) {
            return Ok(reply);
        }

        warn!(rpc, "context lost mid-session, reconnecting and retrying once");
        self.teardown(&mut inner).await;
        self.connect_locked(&mut inner).await?;
        self.roundtrip(&mut inner, rpc, params, false).await
    }

    /// Invoke an RPC in a specific context.
    ///
    /// If the requested context is not the pinned one the session
    /// switches, runs the call, and restores the pinned context, all
    /// under the same lock acquisition. Switching is expected to be rare:
    /// the dual-socket gateway pins each session to the context its RPCs
    /// need.
    pub async fn invoke_in_context(
        &self,
        context: &str,
        rpc: &str,
        params: &[RpcParam],
    ) -> Result<String> {
        if context == self.config.context {
            return self.invoke(rpc, params).await;
        }

        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        debug!(from = %self.config.context, to = %context, "transient context switch");
        self.create_context(&mut inner, context).await?;
        let call = self.roundtrip(&mut inner, rpc, params, false).await;

        // Restore the pinned context even when the call failed, so the
        // next caller finds the session in its steady state.
        let restore = self.create_context(&mut inner, &self.config.context).await;
        if let Err(e) = &restore {
            warn!(error = %e, "failed to restore pinned context, tearing down");
            self.teardown(&mut inner).await;
        }
        let reply = call?;
        restore?;
        Ok(reply)
    }

    /// Send a best-effort `#BYE#` and drop the socket. Idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
    }

    /// Spawn a background heartbeat for this session.
    ///
    /// Every `interval` the task checks the session; if it has been idle
    /// longer than `idle_threshold` it issues a cheap user-info RPC. The
    /// task uses `try_lock` so it never queues behind a real caller; a
    /// failed heartbeat tears the socket down and lets the next real call
    /// reconnect.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        idle_threshold: Duration,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut inner = match session.inner.try_lock() {
                    Ok(inner) => inner,
                    // A real call is in flight; it refreshes the socket.
                    Err(_) => continue,
                };
                if inner.stream.is_none() || inner.last_used.elapsed() < idle_threshold {
                    continue;
                }
                trace!(context = %session.config.context, "heartbeat");
                if let Err(e) = session.roundtrip(&mut inner, HEARTBEAT_RPC, &[], false).await {
                    warn!(error = %e, "heartbeat failed, dropping socket");
                    session.teardown(&mut inner).await;
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Locked internals
    // ------------------------------------------------------------------

    async fn ensure_connected(&self, inner: &mut SessionInner) -> Result<()> {
        if inner.stream.is_none() {
            self.connect_locked(inner).await?;
        }
        Ok(())
    }

    async fn connect_locked(&self, inner: &mut SessionInner) -> Result<()> {
        let addr_str = self.config.site();
        debug!(addr = %addr_str, context = %self.config.context, "connecting");

        let addr = lookup_host(&addr_str)
            .await?
            .next()
            .ok_or_else(|| BrokerError::Handshake(format!("no address for {}", addr_str)))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;

        let stream = timeout(self.config.connect_timeout, socket.connect(addr))
            .await
            .map_err(|_| BrokerError::Timeout(format!("connect to {}", addr_str)))??;
        stream.set_nodelay(true)?;

        let local_ip = stream.local_addr()?.ip().to_string();
        inner.stream = Some(stream);
        inner.context = None;
        inner.duz = None;

        // TCPConnect preamble.
        let params = string_params([local_ip.as_str(), "0", "FMQL"]);
        let reply = self.roundtrip(inner, "TCPConnect", &params, true).await?;
        if !reply.to_lowercase().contains("accept") {
            self.teardown(inner).await;
            return Err(BrokerError::Handshake(format!(
                "TCPConnect not accepted: {:?}",
                reply
            )));
        }

        // Signon setup; the reply is informational.
        let setup = self.roundtrip(inner, "XUS SIGNON SETUP", &[], false).await?;
        trace!(reply = %setup, "signon setup");

        // ACCESS/VERIFY, encrypted first, plaintext once on rejection.
        let pair = format!("{};{}", self.config.access_code, self.config.verify_code);
        let mut reply = self
            .roundtrip(
                inner,
                "XUS AV CODE",
                &[RpcParam::String(self.cipher.encrypt(&pair))],
                false,
            )
            .await?;
        if reply.contains(AV_REJECTED) {
            warn!("encrypted ACCESS/VERIFY rejected, retrying plaintext");
            reply = self
                .roundtrip(inner, "XUS AV CODE", &[RpcParam::String(pair)], false)
                .await?;
            if reply.contains(AV_REJECTED) {
                self.teardown(inner).await;
                return Err(BrokerError::AccessDenied);
            }
        }
        let duz = reply.split('^').next().unwrap_or("").trim().to_string();
        if !duz.is_empty() && duz != "0" {
            inner.duz = Some(duz);
        }

        self.create_context(inner, &self.config.context).await?;
        info!(addr = %addr_str, context = %self.config.context, duz = ?inner.duz, "session established");
        Ok(())
    }

    /// Establish an application context, plaintext first, encrypted once
    /// on rejection.
    async fn create_context(&self, inner: &mut SessionInner, name: &str) -> Result<()> {
        let reply = self
            .roundtrip(
                inner,
                "XWB CREATE CONTEXT",
                &[RpcParam::String(name.to_string())],
                false,
            )
            .await?;
        if context_created(&reply) {
            inner.context = Some(name.to_string());
            return Ok(());
        }

        warn!(context = %name, reply = %reply, "plaintext context rejected, retrying encrypted");
        let encrypted = self.cipher.encrypt(name);
        let reply = self
            .roundtrip(inner, "XWB CREATE CONTEXT", &[RpcParam::String(encrypted)], false)
            .await?;
        if context_created(&reply) {
            inner.context = Some(name.to_string());
            return Ok(());
        }

        Err(BrokerError::ContextRejected {
            context: name.to_string(),
            reply,
        })
    }

    /// One serialized frame exchange. The caller already holds the lock.
    async fn roundtrip(
        &self,
        inner: &mut SessionInner,
        name: &str,
        params: &[RpcParam],
        is_command: bool,
    ) -> Result<String> {
        let frame = encode_frame(name, params, is_command)?;
        let stream = inner.stream.as_mut().ok_or(BrokerError::NotConnected)?;

        timeout(self.config.io_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| BrokerError::Timeout(format!("write {}", name)))??;
        let reply = timeout(self.config.io_timeout, read_reply(stream))
            .await
            .map_err(|_| BrokerError::Timeout(format!("read {}", name)))??;

        inner.last_used = Instant::now();
        trace!(rpc = name, reply_len = reply.len(), "roundtrip complete");
        Ok(reply)
    }

    fn context_lost(&self, reply: &str) -> bool {
        reply.starts_with("-1^")
            && self
                .config
                .context_lost_markers
                .iter()
                .any(|m| reply.contains(m.as_str()))
    }

    async fn teardown(&self, inner: &mut SessionInner) {
        if let Some(mut stream) = inner.stream.take() {
            // Best effort; the peer may already be gone.
            let _ = stream.write_all(b"#BYE#").await;
            let _ = stream.shutdown().await;
            debug!(context = %self.config.context, "session closed");
        }
        inner.context = None;
    }
}

/// Whether an `XWB CREATE CONTEXT` reply indicates success.
///
/// Success is the reply `"1"` exactly, modulo surrounding whitespace.
pub fn context_created(reply: &str) -> bool {
    reply.trim() == "1"
}

/// The seam between the gateway and a live session.
///
/// Implemented by [`BrokerSession`]; tests drive the gateway with
/// scripted channels instead of sockets.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Invoke an RPC in the channel's pinned context.
    async fn invoke(&self, rpc: &str, params: &[RpcParam]) -> Result<String>;

    /// Invoke an RPC in a specific context, restoring the pinned context
    /// afterwards when it differs.
    async fn invoke_in_context(
        &self,
        context: &str,
        rpc: &str,
        params: &[RpcParam],
    ) -> Result<String>;

    /// The context this channel is pinned to.
    fn pinned_context(&self) -> &str;
}

#[async_trait]
impl RpcChannel for BrokerSession {
    async fn invoke(&self, rpc: &str, params: &[RpcParam]) -> Result<String> {
        BrokerSession::invoke(self, rpc, params).await
    }

    async fn invoke_in_context(
        &self,
        context: &str,
        rpc: &str,
        params: &[RpcParam],
    ) -> Result<String> {
        BrokerSession::invoke_in_context(self, context, rpc, params).await
    }

    fn pinned_context(&self) -> &str {
        self.context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_created_matcher() {
        assert!(context_created("1"));
        assert!(context_created("1 "));
        assert!(context_created(" 1\r\n"));
        assert!(!context_created("-1^Application context has not been created"));
        assert!(!context_created("-1^foo"));
        assert!(!context_created("0"));
        assert!(!context_created(""));
    }

    #[test]
    fn test_context_lost_requires_error_prefix() {
        let config = BrokerConfig::new("h", 1, "a", "v", "CTX");
        let cipher = CipherTable::new(vec!["ab".into(), "ba".into()]).unwrap();
        let session = BrokerSession::new(config, cipher);
        assert!(session.context_lost("-1^Application context has not been created"));
        assert!(session.context_lost("-1^Context does not exist"));
        // Ordinary payloads mentioning the words are not context loss.
        assert!(!session.context_lost("note: context does not exist for patient"));
        assert!(!session.context_lost("-1^some other error"));
    }
}
