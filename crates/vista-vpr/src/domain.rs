//! VPR clinical domains.
//!
//! The `VPR GET PATIENT DATA` RPC serves one domain per call, selected by
//! a type token. Each domain also fixes the section and item tag names in
//! the returned `<results>` XML, and whether the gateway may cache its
//! records.

use std::fmt;

/// A clinical domain served by the VPR RPC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VprDomain {
    Patient,
    Med,
    Lab,
    Vital,
    Document,
    Problem,
    Allergy,
    Order,
    Appointment,
    Visit,
    Procedure,
    Immunization,
    Image,
    Consult,
}

impl VprDomain {
    /// Every domain, in fullchart aggregation order.
    pub const ALL: [VprDomain; 14] = [
        VprDomain::Patient,
        VprDomain::Med,
        VprDomain::Lab,
        VprDomain::Vital,
        VprDomain::Document,
        VprDomain::Problem,
        VprDomain::Allergy,
        VprDomain::Order,
        VprDomain::Appointment,
        VprDomain::Visit,
        VprDomain::Procedure,
        VprDomain::Immunization,
        VprDomain::Image,
        VprDomain::Consult,
    ];

    /// The type token passed as the second VPR parameter.
    pub fn type_token(&self) -> &'static str {
        match self {
            VprDomain::Patient => "patient",
            VprDomain::Med => "med",
            VprDomain::Lab => "lab",
            VprDomain::Vital => "vital",
            VprDomain::Document => "document",
            VprDomain::Problem => "problem",
            VprDomain::Allergy => "allergy",
            VprDomain::Order => "order",
            VprDomain::Appointment => "appointment",
            VprDomain::Visit => "visit",
            VprDomain::Procedure => "procedure",
            VprDomain::Immunization => "immunization",
            VprDomain::Image => "image",
            VprDomain::Consult => "consult",
        }
    }

    /// The `(section_tag, item_tag)` pair in the `<results>` document.
    pub fn section_tags(&self) -> (&'static str, &'static str) {
        match self {
            VprDomain::Patient => ("demographics", "patient"),
            VprDomain::Med => ("meds", "med"),
            VprDomain::Lab => ("labs", "lab"),
            VprDomain::Vital => ("vitals", "vital"),
            VprDomain::Document => ("documents", "document"),
            VprDomain::Problem => ("problems", "problem"),
            VprDomain::Allergy => ("allergies", "allergy"),
            VprDomain::Order => ("orders", "order"),
            VprDomain::Appointment => ("appointments", "appointment"),
            VprDomain::Visit => ("visits", "visit"),
            VprDomain::Procedure => ("procedures", "procedure"),
            VprDomain::Immunization => ("immunizations", "immunization"),
            VprDomain::Image => ("images", "image"),
            VprDomain::Consult => ("consults", "consult"),
        }
    }

    /// Whether the gateway may serve this domain from its cache.
    pub fn cacheable(&self) -> bool {
        matches!(
            self,
            VprDomain::Patient
                | VprDomain::Med
                | VprDomain::Lab
                | VprDomain::Vital
                | VprDomain::Document
                | VprDomain::Image
                | VprDomain::Procedure
                | VprDomain::Visit
                | VprDomain::Problem
                | VprDomain::Allergy
        )
    }

    /// Resolve a caller-facing domain name.
    ///
    /// Accepts both friendly plurals ("medications", "labs") and the raw
    /// type tokens, case-insensitively.
    pub fn from_friendly(name: &str) -> Option<VprDomain> {
        let token = name.trim().to_lowercase();
        let domain = match token.as_str() {
            "patient" | "demographics" => VprDomain::Patient,
            "med" | "meds" | "medication" | "medications" => VprDomain::Med,
            "lab" | "labs" => VprDomain::Lab,
            "vital" | "vitals" => VprDomain::Vital,
            "document" | "documents" | "note" | "notes" => VprDomain::Document,
            "problem" | "problems" => VprDomain::Problem,
            "allergy" | "allergies" => VprDomain::Allergy,
            "order" | "orders" => VprDomain::Order,
            "appointment" | "appointments" => VprDomain::Appointment,
            "visit" | "visits" => VprDomain::Visit,
            "procedure" | "procedures" => VprDomain::Procedure,
            "immunization" | "immunizations" => VprDomain::Immunization,
            "image" | "images" => VprDomain::Image,
            "consult" | "consults" => VprDomain::Consult,
            _ => return None,
        };
        Some(domain)
    }
}

impl fmt::Display for VprDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_names() {
        assert_eq!(VprDomain::from_friendly("demographics"), Some(VprDomain::Patient));
        assert_eq!(VprDomain::from_friendly("Medications"), Some(VprDomain::Med));
        assert_eq!(VprDomain::from_friendly("notes"), Some(VprDomain::Document));
        assert_eq!(VprDomain::from_friendly("vital"), Some(VprDomain::Vital));
        assert_eq!(VprDomain::from_friendly("bogus"), None);
    }

    #[test]
    fn test_section_tags() {
        assert_eq!(VprDomain::Vital.section_tags(), ("vitals", "vital"));
        assert_eq!(VprDomain::Patient.section_tags(), ("demographics", "patient"));
    }

    #[test]
    fn test_cacheable_set() {
        assert!(VprDomain::Med.cacheable());
        assert!(VprDomain::Patient.cacheable());
        assert!(!VprDomain::Order.cacheable());
        assert!(!VprDomain::Appointment.cacheable());
    }

    #[test]
    fn test_all_is_exhaustive() {
        assert_eq!(VprDomain::ALL.len(), 14);
    }
}
