//! # vista-broker
//!
//! VistA RPC Broker wire protocol client.
//!
//! This crate provides the transport layer for talking to a VistA system
//! over its legacy RPC Broker TCP listener:
//!
//! - **Frame codec**: length-prefixed `[XWB]` frames terminated by `0x04`
//! - **Signon cipher**: the Broker's substitution-cipher obfuscation for
//!   ACCESS/VERIFY codes
//! - **Sessions**: connect/signon/context sequencing, serialized invokes,
//!   context-loss recovery, idle heartbeat
//!
//! ## Protocol overview
//!
//! 1. Client opens a TCP connection and sends a `TCPConnect` command
//! 2. Client signs on (`XUS SIGNON SETUP`, `XUS AV CODE` with the
//!    enciphered ACCESS;VERIFY pair)
//! 3. Client establishes an application context (`XWB CREATE CONTEXT`)
//! 4. RPCs are invoked as ordered frames; replies are matched by ordering
//!    alone, so each session serializes all socket use behind one lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vista_broker::{BrokerConfig, BrokerSession, CipherTable, string_params};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let cipher = CipherTable::from_json(std::env::var("VISTA_CIPHER_TABLE")?.as_str())?;
//!     let config = BrokerConfig::new("vista.example.org", 9430, "access", "verify", "VPR APPLICATION PROXY");
//!
//!     let session = Arc::new(BrokerSession::new(config, cipher));
//!     session.connect().await?;
//!
//!     let reply = session
//!         .invoke("VPR GET PATIENT DATA", &string_params(["8", "vital"]))
//!         .await?;
//!     println!("{} bytes of XML", reply.len());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

mod cipher;
mod config;
mod error;
mod frame;
mod params;
mod session;

pub use cipher::CipherTable;
pub use config::{
    BrokerConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONTEXT_LOST_MARKERS, DEFAULT_IO_TIMEOUT,
};
pub use error::{BrokerError, Result};
pub use frame::{encode_frame, read_reply, FRAME_TERMINATOR, PROTOCOL_PREFIX};
pub use params::{string_params, RpcParam};
pub use session::{context_created, BrokerSession, RpcChannel};
