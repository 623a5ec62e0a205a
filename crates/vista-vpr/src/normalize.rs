//! Per-domain record normalization.
//!
//! The element walk in [`crate::parser`] produces records that still carry
//! VistA idioms: coded fields as `{code, name}` objects, FileMan dates,
//! single-letter gender codes. This module applies one explicit pass per
//! domain, plus a uniform FileMan-to-ISO derivation for date-like fields,
//! regardless of which parse path produced the records.

use serde_json::{json, Map, Value};

use crate::domain::VprDomain;
use crate::fileman::{fileman_to_iso, looks_like_fileman};
use crate::record::DomainItem;

/// Field names treated as dates when their value looks like a FileMan
/// date. Each gets an `<name>ISO` companion field.
const DATE_KEYS: [&str; 18] = [
    "dob", "entered", "taken", "collected", "resulted", "observed", "start", "stop", "due",
    "released", "signed", "cosigned", "admitted", "discharged", "onset", "resolved",
    "referenceDateTime", "dateTime",
];

/// Coded `{code, name}` fields flattened to `<name>Code`/`<name>Name`.
const CODED_KEYS: [&str; 7] = [
    "provider", "facility", "location", "status", "type", "specimen", "service",
];

/// Telecom usage codes and their display names.
const TELECOM_USAGES: [(&str, &str); 7] = [
    ("HP", "home phone"),
    ("WP", "work place"),
    ("MC", "mobile contact"),
    ("PG", "pager"),
    ("NET", "internet address"),
    ("AS", "answering service"),
    ("EC", "emergency contact"),
];

/// Normalize a batch of records for a domain, in place.
pub fn apply(domain: VprDomain, items: &mut Vec<DomainItem>) {
    for item in items.iter_mut() {
        flatten_coded_fields(item);
        derive_iso_dates(item);
        match domain {
            VprDomain::Patient => normalize_patient(item),
            VprDomain::Order => normalize_order(item),
            VprDomain::Problem => normalize_problem(item),
            VprDomain::Document => normalize_document(item),
            _ => {}
        }
    }
}

/// Flatten `{code, name}` objects for the known coded fields: the field
/// becomes its display name, with `<field>Code`/`<field>Name` companions.
fn flatten_coded_fields(item: &mut DomainItem) {
    for key in CODED_KEYS {
        let Some(Value::Object(map)) = item.get(key).cloned() else {
            continue;
        };
        if let Some(code) = map.get("code").and_then(Value::as_str) {
            item.set(format!("{}Code", key), code.to_string());
        }
        if let Some(name) = map.get("name").and_then(Value::as_str) {
            item.set(format!("{}Name", key), name.to_string());
            item.set(key, name.to_string());
        }
    }
}

/// Add `<key>ISO` companions for date-like fields, including inside the
/// `results` and `clinicians` sub-record lists orders carry.
fn derive_iso_dates(item: &mut DomainItem) {
    let derived: Vec<(String, String)> = item
        .iter()
        .filter_map(|(key, value)| {
            let raw = value.as_str()?;
            if is_date_key(key) && looks_like_fileman(raw) {
                Some((format!("{}ISO", key), fileman_to_iso(raw)?))
            } else {
                None
            }
        })
        .collect();
    for (key, iso) in derived {
        item.set(key, iso);
    }

    for list_key in ["results", "clinicians"] {
        if let Some(Value::Array(mut entries)) = item.get(list_key).cloned() {
            for entry in entries.iter_mut() {
                if let Value::Object(map) = entry {
                    derive_iso_dates_object(map);
                }
            }
            item.set(list_key, Value::Array(entries));
        }
    }
}

fn derive_iso_dates_object(map: &mut Map<String, Value>) {
    let derived: Vec<(String, String)> = map
        .iter()
        .filter_map(|(key, value)| {
            let raw = value.as_str()?;
            if is_date_key(key) && looks_like_fileman(raw) {
                Some((format!("{}ISO", key), fileman_to_iso(raw)?))
            } else {
                None
            }
        })
        .collect();
    for (key, iso) in derived {
        map.insert(key, Value::String(iso));
    }
}

fn is_date_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    DATE_KEYS.iter().any(|d| d.eq_ignore_ascii_case(key))
        || lowered.contains("date")
        || lowered.contains("time")
}

/// Patient demographics: gender URN + display name, telecom usage names.
fn normalize_patient(item: &mut DomainItem) {
    let gender = item
        .str_field("gender")
        .or_else(|| item.str_field("genderCode"))
        .map(str::to_string);
    if let Some(code) = gender {
        let letter = code.rsplit(':').next().unwrap_or(&code).to_uppercase();
        let display = match letter.as_str() {
            "M" => Some("Male"),
            "F" => Some("Female"),
            "U" => Some("Unknown"),
            "O" => Some("Other"),
            _ => None,
        };
        if let Some(display) = display {
            item.set("genderCode", format!("urn:va:pat-gender:{}", letter));
            item.set("genderName", display);
        }
    }

    if let Some(Value::Array(mut telecoms)) = item.get("telecoms").cloned() {
        for telecom in telecoms.iter_mut() {
            let Value::Object(map) = telecom else { continue };
            let usage = map
                .get("usageCode")
                .or_else(|| map.get("usage"))
                .and_then(Value::as_str)
                .map(str::to_uppercase);
            if let Some(usage) = usage {
                if let Some((_, name)) = TELECOM_USAGES.iter().find(|(code, _)| *code == usage) {
                    map.insert("usageName".to_string(), json!(name));
                }
            }
        }
        item.set("telecoms", Value::Array(telecoms));
    }
}

/// Orders: alias the type name and guarantee list shape for sub-records.
fn normalize_order(item: &mut DomainItem) {
    if !item.contains("typeName") {
        let derived = item
            .str_field("oiName")
            .or_else(|| item.str_field("name"))
            .map(str::to_string);
        if let Some(name) = derived {
            item.set("typeName", name);
        }
    }

    // A single sub-record arrives as a bare object; callers expect lists.
    for list_key in ["results", "clinicians"] {
        if let Some(value @ Value::Object(_)) = item.get(list_key).cloned() {
            item.set(list_key, Value::Array(vec![value]));
        }
    }
}

/// Problems: cross-populate status name and code.
fn normalize_problem(item: &mut DomainItem) {
    let name = item.str_field("statusName").map(str::to_string);
    let code = item.str_field("statusCode").map(str::to_string);
    match (name, code) {
        (Some(name), None) => {
            let code = match name.to_uppercase().as_str() {
                "ACTIVE" => Some("A"),
                "INACTIVE" => Some("I"),
                _ => None,
            };
            if let Some(code) = code {
                item.set("statusCode", code);
            }
        }
        (None, Some(code)) => {
            let name = match code.to_uppercase().as_str() {
                "A" => Some("ACTIVE"),
                "I" => Some("INACTIVE"),
                _ => None,
            };
            if let Some(name) = name {
                item.set("statusName", name);
                item.set("status", name);
            }
        }
        _ => {}
    }
}

/// Documents: `localId` must be populated whenever it is derivable from
/// the uid.
fn normalize_document(item: &mut DomainItem) {
    if item.str_field("localId").map(|s| !s.is_empty()).unwrap_or(false) {
        return;
    }
    let derived = item
        .str_field("uid")
        .and_then(|uid| uid.rsplit(':').next())
        .filter(|tail| !tail.is_empty())
        .map(str::to_string);
    if let Some(local_id) = derived {
        item.set("localId", local_id);
    }
}
