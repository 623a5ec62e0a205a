//! # vista-gateway
//!
//! Dual-context gateway over the VistA RPC Broker.
//!
//! The gateway owns two [`vista_broker::BrokerSession`]s against one
//! listener (one pinned to the chart context, one to the
//! patient-data-XML context) and layers on:
//!
//! - **Domain fetches**: `VPR GET PATIENT DATA` with a positional-XML
//!   primary path and a named-array legacy fallback
//! - **Caching**: per-patient, per-domain LRU with TTL and deep-copy hits
//! - **Document text**: TIU record text with a context-fallback priority
//!   list
//! - **Lab panels**: interim-report parsing into structured panels
//! - **Patient service**: friendly domain names and "quick" view models
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vista_gateway::{GatewayConfig, PatientService, VistaGateway};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, cipher) = GatewayConfig::from_env()?;
//!     let gateway = Arc::new(VistaGateway::connect(config, cipher).await?);
//!     let service = PatientService::new(Arc::clone(&gateway));
//!
//!     if let Some(demographics) = service.quick_demographics("8").await? {
//!         println!("{} born {:?}", demographics.name, demographics.dob);
//!     }
//!
//!     let chart = service.fullchart("8").await;
//!     println!("{} items across {} domains", chart.total(), chart.domains.len());
//!
//!     gateway.close().await;
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod gateway;
mod patient;

pub use cache::{CacheKey, DomainCache};
pub use config::{
    GatewayConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_CHART_CONTEXT,
    DEFAULT_DOCUMENT_CONTEXTS, DEFAULT_DOCUMENT_FAILURE_MARKERS, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_IDLE_THRESHOLD, DEFAULT_VPR_CONTEXT,
};
pub use error::{GatewayError, Result};
pub use gateway::{normalize_document_id, DomainParams, FullChart, VistaGateway};
pub use patient::{PatientService, QuickDemographics, QuickDocument, QuickLab, QuickMed};

// Re-exported so callers need not depend on the lower crates directly.
pub use vista_broker::{BrokerConfig, BrokerError, BrokerSession, CipherTable, RpcChannel, RpcParam};
pub use vista_vpr::{DomainItem, LabPanel, LabResult, VprDomain};
