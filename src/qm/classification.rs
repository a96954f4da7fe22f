//! ASIL / Security categories of a test case.
//!
//! Each category is an element under `rdf:RDF/oslc_qm:TestCase` whose
//! `rdf:resource` points at a category value:
//! `<term>/<code>:<uuid>.`. The code is what the spreadsheets carry.

use super::{ClassificationError, QmError};
use crate::config::QmConfig;
use crate::rules::NOT_SECURITY_RELEVANT;
use crate::xml::{ns, parse_document, qname, XmlValue};

pub const ASIL_NOT_PRESENT: &str = "ASIL Value not present";
pub const SECURITY_NOT_PRESENT: &str = "Security Value not present";

/// One category slot of a test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryValue {
    Present(String),
    /// The element is missing; `default` stands in for it.
    Absent { default: String },
}

impl CategoryValue {
    pub fn value(&self) -> &str {
        match self {
            Self::Present(code) => code,
            Self::Absent { default } => default,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// Code and UUID carried by a category reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub code: String,
    pub uuid: String,
}

/// Parse `http://host/path/CODE:UUID.` into its code and UUID.
pub fn parse_category_reference(resource: &str) -> Result<CategoryRef, ClassificationError> {
    let tail = resource.rsplit('/').next().unwrap_or(resource);
    let (code, uuid) = tail
        .split_once(':')
        .ok_or_else(|| ClassificationError::MissingSeparator(resource.to_string()))?;

    if code.trim().is_empty() {
        return Err(ClassificationError::EmptyCode(resource.to_string()));
    }

    Ok(CategoryRef {
        code: code.trim().to_string(),
        uuid: uuid.trim_end_matches('.').to_string(),
    })
}

/// Build the resource URL for a category value, inverse of
/// [`parse_category_reference`].
pub fn category_resource(term: &str, code: &str, uuid: &str) -> String {
    format!("{term}{code}:{uuid}.")
}

/// Current ASIL and Security categories of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseClassification {
    pub asil: CategoryValue,
    pub security: CategoryValue,
}

impl TestCaseClassification {
    pub fn pair(&self) -> (String, String) {
        (self.asil.value().to_string(), self.security.value().to_string())
    }
}

/// The `oslc_qm:TestCase` node of a parsed test case document.
pub fn test_case_node(doc: &XmlValue) -> Option<&XmlValue> {
    doc.path(&[qname(ns::RDF, "RDF"), qname(ns::OSLC_QM, "TestCase")])
}

/// Read both category slots. Each slot is independent: a missing ASIL
/// element does not affect the Security one and vice versa.
pub fn classify_test_case(
    doc: &XmlValue,
    config: &QmConfig,
) -> Result<TestCaseClassification, ClassificationError> {
    let test_case = test_case_node(doc);

    let asil = category_value(test_case, &config.asil_category_key, "")?;
    let security = category_value(
        test_case,
        &config.security_category_key,
        NOT_SECURITY_RELEVANT,
    )?;

    Ok(TestCaseClassification { asil, security })
}

fn category_value(
    test_case: Option<&XmlValue>,
    key: &str,
    default: &str,
) -> Result<CategoryValue, ClassificationError> {
    let resource = test_case
        .and_then(|tc| tc.get(key))
        .and_then(|v| v.items().into_iter().next())
        .and_then(|v| v.resource().or_else(|| v.as_text()))
        .filter(|r| !r.trim().is_empty());

    match resource {
        Some(resource) => Ok(CategoryValue::Present(
            parse_category_reference(resource)?.code,
        )),
        None => Ok(CategoryValue::Absent {
            default: default.to_string(),
        }),
    }
}

/// Parse a test case document and return its `(ASIL, Security)` codes.
///
/// A missing ASIL yields `""`, a missing Security category yields
/// "Not Security Relevant"; both are logged at info level.
pub fn fetch_asil_security(xml: &str, config: &QmConfig) -> Result<(String, String), QmError> {
    let doc = parse_document(xml)?;
    let classification = classify_test_case(&doc, config)?;

    if !classification.asil.is_present() {
        tracing::info!("{}", ASIL_NOT_PRESENT);
    }
    if !classification.security.is_present() {
        tracing::info!("{}", SECURITY_NOT_PRESENT);
    }

    Ok(classification.pair())
}
