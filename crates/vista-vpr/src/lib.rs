//! # vista-vpr
//!
//! Parsing and normalization for VistA patient-data responses.
//!
//! The `VPR GET PATIENT DATA` RPC returns one clinical domain per call as
//! a `<results>` XML document; older chart RPCs return caret-delimited
//! line reports. This crate turns both into normalized [`DomainItem`]
//! records:
//!
//! - **XML parsing**: an explicit element tree with explicit
//!   element-to-record mapping, including collection-wrapper flattening
//!   and boolean coercion
//! - **Generic fallback**: `data/items/item` extraction for non-VPR XML
//! - **FileMan dates**: `YYYMMDD.HHMMSS` (year 1700 offset) to ISO-8601
//! - **Per-domain normalization**: gender URNs, telecom usage names,
//!   order field aliasing, problem status cross-population
//! - **Legacy reports**: caret-delimited lab panel extraction
//!
//! ## Example
//!
//! ```
//! use vista_vpr::{parse_domain_response, VprDomain};
//!
//! let xml = r#"<results>
//!     <vitals total="1">
//!         <vital><localId value="32"/><typeName value="PULSE"/><result value="74"/></vital>
//!     </vitals>
//! </results>"#;
//!
//! let items = parse_domain_response(xml, VprDomain::Vital);
//! assert_eq!(items.len(), 1);
//! assert_eq!(items[0].str_field("typeName"), Some("PULSE"));
//! ```

mod domain;
mod element;
mod error;
mod fileman;
mod legacy;
mod normalize;
mod parser;
mod record;

pub use domain::VprDomain;
pub use element::{parse_xml, XmlElement};
pub use error::{Result, VprError};
pub use fileman::{fileman_to_iso, looks_like_fileman, parse_fileman};
pub use legacy::{
    parse_lab_panel_detail, parse_lab_panels, parse_problem_lines, split_caret_line, LabPanel,
    LabResult,
};
pub use parser::{element_to_item, parse_domain_response, parse_generic_xml, parse_results_xml};
pub use record::DomainItem;

/// Re-exported normalization pass, applied by [`parse_domain_response`]
/// and available to callers that parse through the strict entry points.
pub use normalize::apply as normalize_items;
