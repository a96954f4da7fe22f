//! Push derived ASIL / Security classifications back to the QM server.
//!
//! The test case document is edited in place: only the category (and,
//! for approved test cases, state) elements are rewritten so every other
//! property the server sent comes back unchanged.

use std::collections::HashSet;
use std::ops::Range;

use super::{category_resource, QmClient, QmError};
use crate::config::QmConfig;
use crate::rules::needs_update;
use crate::sheet::columns::{
    TEST_CASE_ID, TEST_CASE_STATE, TEST_CASE_URL, UPDATED_ASIL, UPDATED_SECURITY,
};
use crate::sheet::Table;
use crate::xml::ns;

/// Outcome of one update run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Test cases that were PUT back.
    pub updated: Vec<String>,
    /// Test cases whose classification already matched.
    pub skipped: Vec<String>,
}

/// Target values for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUpdate<'a> {
    pub asil: &'a str,
    pub security: &'a str,
    /// New state resource, when the state must change too.
    pub state: Option<&'a str>,
}

/// PUT the updated classification of every changed test case in `table`.
///
/// Rows sharing a `TestCaseID` describe the same test case; only the first
/// is used. Stops at the first failure.
pub fn put_asil_category(
    client: &dyn QmClient,
    table: &Table,
    config: &QmConfig,
) -> Result<UpdateSummary, QmError> {
    let ids = table.column(TEST_CASE_ID)?;
    let urls = table.column(TEST_CASE_URL)?;
    let updated_asil = table.column(UPDATED_ASIL)?;
    let updated_security = table.column(UPDATED_SECURITY)?;
    let states = table.column(TEST_CASE_STATE)?;

    let mut summary = UpdateSummary::default();
    let mut seen = HashSet::new();

    for row in 0..table.len() {
        let id = ids[row].trim();
        if !seen.insert(id) {
            continue;
        }

        if !needs_update(table, row)? {
            tracing::info!(test_case = id, "Classification unchanged, skipping");
            summary.skipped.push(id.to_string());
            continue;
        }

        let url = urls[row].trim();
        if url.is_empty() {
            return Err(QmError::MalformedDocument {
                url: String::new(),
                reason: format!("test case {id} has no URL"),
            });
        }

        let update = CategoryUpdate {
            asil: updated_asil[row].trim(),
            security: updated_security[row].trim(),
            state: if config.is_approved(states[row]) {
                config.new_state.as_deref()
            } else {
                None
            },
        };

        let xml = client.get_xml(url)?;
        let body = rewrite_test_case(&xml, url, &update, config)?;
        client.put_xml(url, &body)?;

        tracing::info!(
            test_case = id,
            asil = update.asil,
            security = update.security,
            state_changed = update.state.is_some(),
            "Test case classification updated"
        );
        summary.updated.push(id.to_string());
    }

    Ok(summary)
}

/// Rewrite the category (and optionally state) elements of a test case
/// document, inserting them when the server omitted them.
pub fn rewrite_test_case(
    xml: &str,
    url: &str,
    update: &CategoryUpdate<'_>,
    config: &QmConfig,
) -> Result<String, QmError> {
    let malformed = |reason: &str| QmError::MalformedDocument {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let asil_uuid = config
        .asil_uuids
        .get(update.asil)
        .ok_or_else(|| QmError::UnknownCategory(update.asil.to_string()))?;
    let security_uuid = config
        .security_uuids
        .get(update.security)
        .ok_or_else(|| QmError::UnknownCategory(update.security.to_string()))?;

    let mut targets = vec![
        (
            config.asil_category_key.as_str(),
            category_resource(&config.term, update.asil, asil_uuid),
        ),
        (
            config.security_category_key.as_str(),
            category_resource(&config.term, update.security, security_uuid),
        ),
    ];
    if let Some(state) = update.state {
        targets.push((config.state_key.as_str(), state.to_string()));
    }

    let doc = roxmltree::Document::parse(xml).map_err(crate::xml::XmlError::from)?;
    let test_case = doc
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name((ns::OSLC_QM, "TestCase")))
        .ok_or_else(|| malformed("no oslc_qm:TestCase element"))?;
    let rdf_prefix = test_case
        .lookup_prefix(ns::RDF)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| malformed("rdf namespace has no prefix"))?;

    let body = test_case.range();
    let close_at = xml[body.clone()]
        .rfind("</")
        .map(|offset| body.start + offset)
        .ok_or_else(|| malformed("oslc_qm:TestCase has no closing tag"))?;

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (key, resource) in targets {
        let (namespace, local) =
            split_qname(key).ok_or_else(|| malformed(&format!("unqualified key {key}")))?;
        let resource = escape_attribute(&resource);

        let existing = test_case
            .children()
            .find(|n| n.is_element() && n.has_tag_name((namespace, local)));

        match existing {
            Some(node) => {
                let range = node.range();
                let tag = raw_tag_name(xml, range.start);
                let declarations = own_namespace_declarations(node);
                edits.push((
                    range,
                    format!(r#"<{tag}{declarations} {rdf_prefix}:resource="{resource}"/>"#),
                ));
            }
            None => {
                let element = match test_case.lookup_prefix(namespace).filter(|p| !p.is_empty()) {
                    Some(prefix) => {
                        format!(r#"<{prefix}:{local} {rdf_prefix}:resource="{resource}"/>"#)
                    }
                    None => format!(
                        r#"<{local} xmlns="{namespace}" {rdf_prefix}:resource="{resource}"/>"#
                    ),
                };
                edits.push((close_at..close_at, element));
            }
        }
    }

    // apply back to front so earlier offsets stay valid
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = xml.to_string();
    for (range, text) in edits {
        out.replace_range(range, &text);
    }
    Ok(out)
}

/// `{namespace}local` → `(namespace, local)`
fn split_qname(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix('{')?;
    let (namespace, local) = rest.split_once('}')?;
    (!local.is_empty()).then_some((namespace, local))
}

/// Element name exactly as written in the source, prefix included.
fn raw_tag_name(xml: &str, start: usize) -> &str {
    xml[start + 1..]
        .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .next()
        .unwrap_or_default()
}

/// `xmlns` attributes declared on `node` itself, as tag text.
fn own_namespace_declarations(node: roxmltree::Node<'_, '_>) -> String {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|n| (n.name(), n.uri())).collect())
        .unwrap_or_default();

    node.namespaces()
        .filter(|n| !inherited.contains(&(n.name(), n.uri())))
        .map(|n| match n.name() {
            Some(prefix) => format!(r#" xmlns:{prefix}="{}""#, escape_attribute(n.uri())),
            None => format!(r#" xmlns="{}""#, escape_attribute(n.uri())),
        })
        .collect()
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}
