//! VPR response parsing.
//!
//! A domain reply is usually a `<results>` document:
//!
//! ```text
//! <results version="1.13" timeZone="-0500">
//!   <vitals total="2">
//!     <vital>
//!       <entered value="3140912.1138"/>
//!       <facility code="500" name="CAMP MASTER"/>
//!       ...
//!     </vital>
//!     ...
//!   </vitals>
//! </results>
//! ```
//!
//! Items are mapped to [`DomainItem`]s by an explicit element walk:
//! attributes merge in directly, single-`value` children collapse to that
//! value, attribute-only children become nested objects, and VistA's
//! collection-wrapper idiom (`<addresses><address/>...</addresses>`)
//! flattens to a list under the wrapper's name.
//!
//! Replies without a `<results>` tag fall back to a generic walk that
//! looks for items under a `data/items/item` path, or failing that treats
//! the whole document as one item.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::VprDomain;
use crate::element::{parse_xml, XmlElement};
use crate::error::{Result, VprError};
use crate::normalize;
use crate::record::DomainItem;

/// Attribute names whose `"1"`/`"0"` values are boolean flags.
///
/// `"true"`/`"false"` coerce everywhere; bare digits only coerce for these
/// keys, so identifiers like `localId="1"` survive as strings.
const BOOLEAN_ATTRS: [&str; 6] = ["removed", "hidden", "verified", "completed", "active", "summary"];

/// Parse and normalize a raw domain reply, falling back through every
/// parse path.
///
/// Never fails: if no path can make sense of the text the result is an
/// empty list, so a single bad domain cannot abort an aggregation.
pub fn parse_domain_response(text: &str, domain: VprDomain) -> Vec<DomainItem> {
    let mut items = match parse_results_xml(text, domain) {
        Ok(items) if !items.is_empty() => items,
        Ok(_) | Err(_) => match parse_generic_xml(text) {
            Ok(items) => {
                debug!(%domain, count = items.len(), "generic parse fallback");
                items
            }
            Err(e) => {
                warn!(%domain, error = %e, "unparseable domain reply, returning no items");
                Vec::new()
            }
        },
    };
    normalize::apply(domain, &mut items);
    items
}

/// Strict parse of a `<results>` document for one domain.
///
/// # Errors
///
/// Fails if the text is not a well-formed `<results>` document. An empty
/// or missing domain section is not an error; it yields an empty list.
pub fn parse_results_xml(text: &str, domain: VprDomain) -> Result<Vec<DomainItem>> {
    if !text.to_lowercase().contains("<results") {
        return Err(VprError::UnexpectedShape("no <results> tag".to_string()));
    }
    let root = parse_xml(text)?;
    if !root.name.eq_ignore_ascii_case("results") {
        return Err(VprError::UnexpectedShape(format!(
            "root element is <{}>, not <results>",
            root.name
        )));
    }

    let (section_tag, item_tag) = domain.section_tags();
    let Some(section) = root.find_descendant(section_tag) else {
        return Ok(Vec::new());
    };
    Ok(section
        .children_named(item_tag)
        .map(element_to_item)
        .collect())
}

/// Generic fallback: items under `data/items/item`, or the whole document
/// as a single item.
pub fn parse_generic_xml(text: &str) -> Result<Vec<DomainItem>> {
    let root = parse_xml(text)?;
    if let Some(items) = root
        .find_descendant("items")
        .filter(|items| items.children_named("item").next().is_some())
    {
        return Ok(items.children_named("item").map(element_to_item).collect());
    }
    Ok(vec![element_to_item(&root)])
}

/// Map one item element to a record.
///
/// This is the single explicit element-to-record function every parse
/// path funnels through.
pub fn element_to_item(element: &XmlElement) -> DomainItem {
    let mut item = DomainItem::new();

    for (key, value) in &element.attributes {
        item.set(key.clone(), coerce_value(key, value));
    }
    if let Some(text) = &element.text {
        item.set("content", text.clone());
    }

    for child in &element.children {
        if let Some(list) = collection_items(child) {
            // <addresses><address .../>...</addresses> flattens to a list
            // under the wrapper's own (plural) name.
            let values: Vec<Value> = list.iter().map(|e| element_to_item(e).into_value()).collect();
            item.set(child.name.clone(), Value::Array(values));
        } else if let Some(value) = child.attr("value").filter(|_| child.attributes.len() == 1) {
            item.set(child.name.clone(), coerce_value(&child.name, value));
        } else if child.is_leaf() && !child.attributes.is_empty() {
            item.set(child.name.clone(), element_to_item(child).into_value());
        } else if child.is_leaf() {
            item.set(child.name.clone(), Value::Null);
        } else if child.children.is_empty() {
            item.set(
                child.name.clone(),
                child.text.clone().map(Value::String).unwrap_or(Value::Null),
            );
        } else {
            item.set(child.name.clone(), element_to_item(child).into_value());
        }
    }

    item
}

/// A wrapper element's repeated children, when it is a collection
/// wrapper: two or more child elements all sharing one name, or a single
/// child whose name is the singular of the wrapper's.
fn collection_items(element: &XmlElement) -> Option<&[XmlElement]> {
    if element.children.is_empty() || !element.attributes.is_empty() {
        return None;
    }
    let first = &element.children[0].name;
    if !element.children.iter().all(|c| &c.name == first) {
        return None;
    }
    let singular_of_wrapper = element
        .name
        .to_lowercase()
        .strip_suffix('s')
        .map(|s| s.to_string())
        .map(|s| first.eq_ignore_ascii_case(&s))
        .unwrap_or(false);
    if element.children.len() > 1 || singular_of_wrapper {
        Some(&element.children)
    } else {
        None
    }
}

fn coerce_value(key: &str, raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if (raw == "1" || raw == "0") && BOOLEAN_ATTRS.iter().any(|a| key.eq_ignore_ascii_case(a)) {
        return Value::Bool(raw == "1");
    }
    Value::String(raw.to_string())
}
