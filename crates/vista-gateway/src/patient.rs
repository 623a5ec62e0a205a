//! Caller-facing patient service.
//!
//! Maps friendly domain names onto [`VprDomain`] tokens and reshapes
//! normalized records into the compact "quick" view models the web layer
//! renders directly.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use vista_broker::RpcChannel;
use vista_vpr::{DomainItem, VprDomain};

use crate::error::{GatewayError, Result};
use crate::gateway::{DomainParams, FullChart, VistaGateway};

/// Compact demographic summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuickDemographics {
    pub name: String,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub ssn: Option<String>,
}

/// Compact medication summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuickMed {
    pub name: String,
    pub sig: Option<String>,
    pub status: Option<String>,
    pub last_filled: Option<String>,
}

/// Compact lab result summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuickLab {
    pub test: String,
    pub result: Option<String>,
    pub units: Option<String>,
    pub flag: Option<String>,
    pub collected: Option<String>,
}

/// Compact document summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuickDocument {
    pub id: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub author: Option<String>,
}

/// Service layer over a [`VistaGateway`].
pub struct PatientService<C: RpcChannel> {
    gateway: Arc<VistaGateway<C>>,
}

impl<C: RpcChannel> PatientService<C> {
    /// Wrap a gateway.
    pub fn new(gateway: Arc<VistaGateway<C>>) -> Self {
        Self { gateway }
    }

    /// The underlying gateway.
    pub fn gateway(&self) -> &VistaGateway<C> {
        &self.gateway
    }

    /// Fetch a domain by its caller-facing name ("medications", "vitals",
    /// "notes", ...).
    pub async fn domain_by_name(
        &self,
        dfn: &str,
        name: &str,
        params: &DomainParams,
    ) -> Result<Vec<DomainItem>> {
        let domain = VprDomain::from_friendly(name)
            .ok_or_else(|| GatewayError::UnknownDomain(name.to_string()))?;
        debug!(dfn, name, %domain, "domain fetch by friendly name");
        self.gateway.get_vpr_domain(dfn, domain, params).await
    }

    /// Every domain at once, tolerating individual failures.
    pub async fn fullchart(&self, dfn: &str) -> FullChart {
        self.gateway.get_vpr_fullchart(dfn).await
    }

    /// The patient's demographic quick view.
    pub async fn quick_demographics(&self, dfn: &str) -> Result<Option<QuickDemographics>> {
        let Some(patient) = self.gateway.get_demographics(dfn).await? else {
            return Ok(None);
        };
        Ok(Some(QuickDemographics {
            name: field(&patient, &["fullName", "name"]).unwrap_or_default(),
            dob: field(&patient, &["dobISO", "dob"]),
            gender: field(&patient, &["genderName", "gender"]),
            ssn: field(&patient, &["ssn"]),
        }))
    }

    /// Medication quick views.
    pub async fn quick_meds(&self, dfn: &str) -> Result<Vec<QuickMed>> {
        let items = self
            .gateway
            .get_vpr_domain(dfn, VprDomain::Med, &DomainParams::default())
            .await?;
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(QuickMed {
                    name: field(item, &["name", "qualifiedName", "productFormName"])?,
                    sig: field(item, &["sig"]),
                    status: field(item, &["vaStatus", "status", "statusName"]),
                    last_filled: field(item, &["lastFilledISO", "lastFilled"]),
                })
            })
            .collect())
    }

    /// Lab result quick views.
    pub async fn quick_labs(&self, dfn: &str) -> Result<Vec<QuickLab>> {
        let items = self
            .gateway
            .get_vpr_domain(dfn, VprDomain::Lab, &DomainParams::default())
            .await?;
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(QuickLab {
                    test: field(item, &["typeName", "test", "name"])?,
                    result: field(item, &["result", "value"]),
                    units: field(item, &["units"]),
                    flag: field(item, &["interpretationName", "interpretationCode", "flag"]),
                    collected: field(item, &["collectedISO", "collected"]),
                })
            })
            .collect())
    }

    /// Document quick views (most recent first is the caller's concern;
    /// order follows the RPC).
    pub async fn quick_documents(&self, dfn: &str) -> Result<Vec<QuickDocument>> {
        let items = self
            .gateway
            .get_vpr_domain(dfn, VprDomain::Document, &DomainParams::default())
            .await?;
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(QuickDocument {
                    id: field(item, &["localId", "uid"])?,
                    title: field(item, &["localTitle", "title"]),
                    date: field(item, &["referenceDateTimeISO", "referenceDateTime"]),
                    author: field(item, &["author", "authorDisplayName", "clinician"]),
                })
            })
            .collect())
    }
}

/// First present-and-string field among candidates.
fn field(item: &DomainItem, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| item.str_field(key))
        .map(str::to_string)
}
