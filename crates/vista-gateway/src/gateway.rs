//! The dual-context gateway.
//!
//! A gateway owns two broker sessions against the same listener: one
//! pinned to the chart context (TIU document text, lab reports, generic
//! chart RPCs) and one pinned to the patient-data-XML context (the `VPR
//! GET PATIENT DATA` RPC). Each logical operation routes to the session
//! whose context its RPC needs, so context switching stays a rare,
//! defensive path rather than a per-call cost.
//!
//! ```text
//! caller ──> VistaGateway ──┬──> chart session  (OR CPRS GUI CHART)
//!            │  cache       └──> VPR session    (VPR APPLICATION PROXY)
//!            └──> vista-vpr parsing/normalization
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vista_broker::{BrokerSession, CipherTable, RpcChannel, RpcParam};
use vista_vpr::{
    normalize_items, parse_generic_xml, parse_lab_panel_detail, parse_lab_panels,
    parse_problem_lines, parse_results_xml, DomainItem, LabPanel, VprDomain,
};

use crate::cache::{CacheKey, DomainCache};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// The domain-fetch RPC name.
const VPR_RPC: &str = "VPR GET PATIENT DATA";

/// The document-text RPC name.
const TIU_TEXT_RPC: &str = "TIU GET RECORD TEXT";

/// The lab interim-report RPC name.
const LAB_REPORT_RPC: &str = "ORWLRR INTERIM";

/// The legacy problem-list RPC name.
const PROBLEM_LIST_RPC: &str = "ORQQPL PROBLEM LIST";

/// Optional positional filters for a domain fetch.
///
/// Serialized (sorted) into the cache key so differently-filtered
/// requests occupy distinct entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainParams {
    /// Start of the date range (FileMan or ISO, passed through).
    pub start: Option<String>,
    /// End of the date range.
    pub stop: Option<String>,
    /// Maximum number of items.
    pub max: Option<String>,
    /// A specific item id.
    pub item: Option<String>,
}

impl DomainParams {
    /// Limit the fetch to `max` items.
    pub fn with_max(mut self, max: impl Into<String>) -> Self {
        self.max = Some(max.into());
        self
    }

    /// Restrict the fetch to a date range.
    pub fn with_range(mut self, start: impl Into<String>, stop: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self.stop = Some(stop.into());
        self
    }

    /// Fetch one specific item.
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    fn entries(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(v) = &self.start {
            map.insert("start".to_string(), v.clone());
        }
        if let Some(v) = &self.stop {
            map.insert("stop".to_string(), v.clone());
        }
        if let Some(v) = &self.max {
            map.insert("max".to_string(), v.clone());
        }
        if let Some(v) = &self.item {
            map.insert("item".to_string(), v.clone());
        }
        map
    }

    /// Canonical serialization for cache keys: sorted keys, JSON shape.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.entries()).unwrap_or_else(|_| "{}".to_string())
    }

    /// The positional parameter list `[dfn, token, start?, stop?, max?,
    /// item?]`, with empty placeholders for skipped middle positions and
    /// trailing empties trimmed.
    fn positional(&self, dfn: &str, token: &str) -> Vec<RpcParam> {
        let mut tail = vec![
            self.start.clone().unwrap_or_default(),
            self.stop.clone().unwrap_or_default(),
            self.max.clone().unwrap_or_default(),
            self.item.clone().unwrap_or_default(),
        ];
        while tail.last().map(String::is_empty).unwrap_or(false) {
            tail.pop();
        }
        let mut params = vec![RpcParam::String(dfn.to_string()), RpcParam::String(token.to_string())];
        params.extend(tail.into_iter().map(RpcParam::String));
        params
    }

    /// The named-array form used by the legacy invocation path.
    fn named_array(&self, dfn: &str, token: &str) -> RpcParam {
        let mut map = self.entries();
        map.insert("patientId".to_string(), dfn.to_string());
        map.insert("domain".to_string(), token.to_string());
        RpcParam::NamedArray(map)
    }
}

/// Aggregated result of a fullchart fetch.
#[derive(Debug, Clone, Default)]
pub struct FullChart {
    /// Items per domain token, failing domains omitted.
    pub domains: BTreeMap<String, Vec<DomainItem>>,
}

impl FullChart {
    /// Total items across all fetched domains.
    pub fn total(&self) -> usize {
        self.domains.values().map(Vec::len).sum()
    }
}

/// A gateway over two pinned-context channels.
///
/// Generic over [`RpcChannel`] so tests can drive it with scripted
/// channels; production code uses [`VistaGateway::connect`], which builds
/// two [`BrokerSession`]s.
pub struct VistaGateway<C: RpcChannel> {
    chart: Arc<C>,
    vpr: Arc<C>,
    site: String,
    config: GatewayConfig,
    cache: DomainCache,
    heartbeats: Vec<JoinHandle<()>>,
}

impl VistaGateway<BrokerSession> {
    /// Connect both sessions and start their heartbeats.
    pub async fn connect(config: GatewayConfig, cipher: CipherTable) -> Result<Self> {
        let chart = Arc::new(BrokerSession::new(
            config.broker_config(&config.chart_context),
            cipher.clone(),
        ));
        let vpr = Arc::new(BrokerSession::new(
            config.broker_config(&config.vpr_context),
            cipher,
        ));
        chart.connect().await?;
        vpr.connect().await?;

        let heartbeats = vec![
            chart.spawn_heartbeat(config.heartbeat_interval, config.idle_threshold),
            vpr.spawn_heartbeat(config.heartbeat_interval, config.idle_threshold),
        ];
        info!(site = %config.site(), "gateway connected");
        Ok(Self::assemble(chart, vpr, config, heartbeats))
    }

    /// Stop heartbeats and close both sessions.
    pub async fn close(&self) {
        for heartbeat in &self.heartbeats {
            heartbeat.abort();
        }
        self.chart.close().await;
        self.vpr.close().await;
    }
}

impl<C: RpcChannel> VistaGateway<C> {
    /// Build a gateway over existing channels. Test seam; `connect` is
    /// the production constructor.
    pub fn with_channels(chart: Arc<C>, vpr: Arc<C>, config: GatewayConfig) -> Self {
        Self::assemble(chart, vpr, config, Vec::new())
    }

    fn assemble(
        chart: Arc<C>,
        vpr: Arc<C>,
        config: GatewayConfig,
        heartbeats: Vec<JoinHandle<()>>,
    ) -> Self {
        let site = config.site();
        let cache = DomainCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            chart,
            vpr,
            site,
            config,
            cache,
            heartbeats,
        }
    }

    /// Fetch one clinical domain for a patient.
    ///
    /// Cacheable domains are served from the cache when fresh. A network
    /// fetch tries the positional XML path first; when that yields no
    /// items it retries with the legacy named-array invocation and a
    /// generic parse. Normalization is applied uniformly regardless of
    /// path. An empty result means the patient has no data in the
    /// domain; unreachability raises.
    pub async fn get_vpr_domain(
        &self,
        dfn: &str,
        domain: VprDomain,
        params: &DomainParams,
    ) -> Result<Vec<DomainItem>> {
        let key = CacheKey {
            site: self.site.clone(),
            dfn: dfn.to_string(),
            domain: domain.type_token().to_string(),
            extra: params.canonical(),
        };
        if domain.cacheable() {
            if let Some(items) = self.cache.get(&key) {
                debug!(dfn, %domain, "cache hit");
                return Ok(items);
            }
        }

        let items = self.fetch_domain(dfn, domain, params).await?;
        if domain.cacheable() {
            self.cache.put(key, items.clone());
        }
        Ok(items)
    }

    async fn fetch_domain(
        &self,
        dfn: &str,
        domain: VprDomain,
        params: &DomainParams,
    ) -> Result<Vec<DomainItem>> {
        let token = domain.type_token();

        let reply = self.vpr.invoke(VPR_RPC, &params.positional(dfn, token)).await?;
        let mut items = parse_results_xml(&reply, domain).unwrap_or_default();

        if items.is_empty() {
            debug!(dfn, %domain, "positional fetch empty, trying named-array path");
            let reply = self
                .vpr
                .invoke(VPR_RPC, &[params.named_array(dfn, token)])
                .await?;
            items = parse_results_xml(&reply, domain)
                .or_else(|_| parse_generic_xml(&reply))
                .unwrap_or_default();
        }

        normalize_items(domain, &mut items);
        Ok(items)
    }

    /// Fetch every domain for a patient, tolerating individual failures.
    ///
    /// A domain that errors is skipped with a warning; the result is the
    /// union of the rest.
    pub async fn get_vpr_fullchart(&self, dfn: &str) -> FullChart {
        let mut chart = FullChart::default();
        for domain in VprDomain::ALL {
            match self.get_vpr_domain(dfn, domain, &DomainParams::default()).await {
                Ok(items) => {
                    chart.domains.insert(domain.type_token().to_string(), items);
                }
                Err(e) => {
                    warn!(dfn, %domain, error = %e, "skipping failed domain in fullchart");
                }
            }
        }
        chart
    }

    /// The patient's demographic record, if the site has one.
    pub async fn get_demographics(&self, dfn: &str) -> Result<Option<DomainItem>> {
        let items = self
            .get_vpr_domain(dfn, VprDomain::Patient, &DomainParams::default())
            .await?;
        Ok(items.into_iter().next())
    }

    /// Fetch document text for a batch of TIU document ids.
    ///
    /// Ids are normalized first (urn prefixes and trailing suffixes
    /// stripped); ids that are equivalent after normalization are fetched
    /// once. Each document is tried against the configured
    /// context priority list until one yields text that does not match a
    /// failure marker. Documents that fail in every context are omitted
    /// from the result.
    pub async fn get_document_texts(
        &self,
        dfn: &str,
        doc_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let mut texts = BTreeMap::new();
        for raw_id in doc_ids {
            let id = normalize_document_id(raw_id);
            // Equivalent spellings of one id coalesce into one fetch.
            if texts.contains_key(&id) {
                continue;
            }
            match self.fetch_document_text(dfn, &id).await? {
                Some(lines) => {
                    texts.insert(id, lines);
                }
                None => warn!(dfn, doc_id = %id, "no context yielded document text"),
            }
        }
        Ok(texts)
    }

    /// Fetch text for one document, erroring when no context yields it.
    pub async fn get_document_text(&self, dfn: &str, doc_id: &str) -> Result<Vec<String>> {
        let id = normalize_document_id(doc_id);
        self.fetch_document_text(dfn, &id)
            .await?
            .ok_or(GatewayError::NoDocumentText { id })
    }

    async fn fetch_document_text(&self, dfn: &str, id: &str) -> Result<Option<Vec<String>>> {
        let params = [RpcParam::String(id.to_string())];
        for context in &self.config.document_contexts {
            let reply = match self.chart.invoke_in_context(context, TIU_TEXT_RPC, &params).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(dfn, doc_id = id, context = %context, error = %e, "document fetch failed in context");
                    continue;
                }
            };
            let lowered = reply.to_lowercase();
            let failed = reply.trim().is_empty()
                || reply.starts_with("-1^")
                || self
                    .config
                    .document_failure_markers
                    .iter()
                    .any(|m| lowered.contains(&m.to_lowercase()));
            if failed {
                debug!(dfn, doc_id = id, context = %context, "failure marker in document reply");
                continue;
            }
            return Ok(Some(reply.lines().map(str::to_string).collect()));
        }
        Ok(None)
    }

    /// Fetch lab panels for a patient over a date range.
    pub async fn get_lab_panels(
        &self,
        dfn: &str,
        start: &str,
        end: &str,
        max_panels: usize,
    ) -> Result<Vec<LabPanel>> {
        let params = [
            RpcParam::String(dfn.to_string()),
            RpcParam::String(start.to_string()),
            RpcParam::String(end.to_string()),
            RpcParam::String(max_panels.to_string()),
        ];
        let reply = self.chart.invoke(LAB_REPORT_RPC, &params).await?;
        Ok(parse_lab_panels(&reply))
    }

    /// Fetch one lab panel with its results, by lab id.
    pub async fn get_lab_panel_detail(&self, dfn: &str, lab_id: &str) -> Result<Option<LabPanel>> {
        let params = [
            RpcParam::String(dfn.to_string()),
            RpcParam::String(lab_id.to_string()),
        ];
        let reply = self.chart.invoke(LAB_REPORT_RPC, &params).await?;
        Ok(parse_lab_panel_detail(&reply, lab_id))
    }

    /// Fetch the legacy caret-delimited problem list as
    /// `(ien, description, status)` tuples.
    ///
    /// The richer problem records come from the problem domain fetch;
    /// this is the line-oriented chart view some sites still expose.
    pub async fn get_problem_list(&self, dfn: &str) -> Result<Vec<(String, String, String)>> {
        let params = [
            RpcParam::String(dfn.to_string()),
            // "A" selects active problems, the chart default.
            RpcParam::String("A".to_string()),
        ];
        let reply = self.chart.invoke(PROBLEM_LIST_RPC, &params).await?;
        Ok(parse_problem_lines(&reply))
    }

    /// Drop every cached entry for one patient.
    pub fn invalidate_patient(&self, dfn: &str) {
        self.cache.invalidate_patient(dfn);
    }

    /// The `host:port` site this gateway talks to.
    pub fn site(&self) -> &str {
        &self.site
    }
}

/// Reduce a caller-supplied document id to the bare TIU record id.
///
/// `urn:va:document:SITE:8:12345` and `12345;TIU` both resolve to
/// `12345`, so either spelling lands on the same RPC token and the same
/// cache entry.
pub fn normalize_document_id(raw: &str) -> String {
    let tail = if raw.starts_with("urn:") {
        raw.rsplit(':').next().unwrap_or(raw)
    } else {
        raw
    };
    let bare = tail.split([';', ',']).next().unwrap_or(tail);
    bare.trim().to_string()
}
