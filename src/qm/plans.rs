//! Master / child test plans and the test cases under them.

use super::{classify_test_case, test_case_node, QmClient, QmError, TestCaseClassification};
use crate::config::QmConfig;
use crate::sheet::columns::{
    CHILD_TEST_PLAN, DOORS_ASIL, DOORS_CATEGORY, MASTER_TEST_PLAN, PREVIOUS_ASIL,
    PREVIOUS_CATEGORY, REQUIREMENT_URL, TEST_CASE_ID, TEST_CASE_STATE, TEST_CASE_URL, TEST_PLAN,
};
use crate::sheet::Table;
use crate::xml::{descendant_texts, ns, parse_document, qname, Records, XmlValue};

/// ASIL written for a test case that validates no requirement.
pub const NO_REQUIREMENT_ASIL: &str = "-";

/// GET `url` and parse the body into the generic mapping.
pub fn convert_xml_dict(url: &str, client: &dyn QmClient) -> Result<XmlValue, QmError> {
    let xml = client.get_xml(url)?;
    Ok(parse_document(&xml)?)
}

/// Short identifiers of every test plan listed at `url`.
pub fn master_plan_ids(url: &str, client: &dyn QmClient) -> Result<Vec<String>, QmError> {
    let xml = client.get_xml(url)?;
    Ok(descendant_texts(&xml, ns::RQM, "shortIdentifier")?)
}

/// OSLC query selecting one master plan and its child-plan links.
pub fn test_plan_query_url(config: &QmConfig, mtp_id: &str) -> String {
    format!(
        "{}/oslc_qm/contexts/{}/resources/com.ibm.rqm.planning.VersionedTestPlan\
         ?oslc.where=rqm_qm:shortIdentifier=\"{}\"&oslc.select=rqm_qm:hasChildPlan",
        config.base_url, config.project_area, mtp_id
    )
}

/// `rdf:RDF/oslc_qm:TestPlanQuery/oslc_qm:testPlan/oslc_qm:TestPlan`
pub fn test_plan_node(doc: &XmlValue) -> Option<&XmlValue> {
    doc.path(&[
        qname(ns::RDF, "RDF"),
        qname(ns::OSLC_QM, "TestPlanQuery"),
        qname(ns::OSLC_QM, "testPlan"),
        qname(ns::OSLC_QM, "TestPlan"),
    ])
}

/// Child-plan references of a test plan query result. Empty when the plan
/// has no `rqm_qm:hasChildPlan`.
pub fn child_plan_ids(doc: &XmlValue) -> Vec<String> {
    let Some(children) = test_plan_node(doc).and_then(|p| p.get(&qname(ns::RQM, "hasChildPlan")))
    else {
        return Vec::new();
    };

    match Records::from_value(children) {
        Some(records) => records.text_values(),
        None => children
            .as_text()
            .filter(|t| !t.is_empty())
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
    }
}

/// One row per child plan of `mtp_id`. Empty table when there are none.
pub fn child_plans_for_master(
    mtp_id: &str,
    client: &dyn QmClient,
    config: &QmConfig,
) -> Result<Table, QmError> {
    let doc = convert_xml_dict(&test_plan_query_url(config, mtp_id), client)?;
    let children = child_plan_ids(&doc);

    let mut table = Table::with_columns(&[MASTER_TEST_PLAN, CHILD_TEST_PLAN]);
    for child in &children {
        table.push_row(vec![mtp_id.to_string(), child.clone()])?;
    }

    if table.is_empty() {
        tracing::info!(master_plan = mtp_id, "No child test plans");
    } else {
        tracing::info!(master_plan = mtp_id, children = table.len(), "Child test plans found");
    }
    Ok(table)
}

/// Test case links of a test plan resource (`oslc_qm:usesTestCase`).
pub fn plan_test_cases(plan_url: &str, client: &dyn QmClient) -> Result<Vec<String>, QmError> {
    let doc = convert_xml_dict(plan_url, client)?;
    let plan = doc.path(&[qname(ns::RDF, "RDF"), qname(ns::OSLC_QM, "TestPlan")]);

    Ok(plan
        .and_then(|p| p.get(&qname(ns::OSLC_QM, "usesTestCase")))
        .map(resources)
        .unwrap_or_default())
}

/// Requirements a test case validates (`oslc_qm:validatesRequirement`).
pub fn requirement_links(test_case: &XmlValue) -> Vec<String> {
    test_case
        .get(&qname(ns::OSLC_QM, "validatesRequirement"))
        .map(resources)
        .unwrap_or_default()
}

fn resources(value: &XmlValue) -> Vec<String> {
    value
        .items()
        .into_iter()
        .filter_map(XmlValue::resource)
        .map(str::to_string)
        .collect()
}

/// Last segment of a state resource:
/// `.../com.ibm.rqm.planning.common.approved` → `approved`.
pub fn state_label(resource: &str) -> &str {
    let tail = resource.rsplit(&['/', '#'][..]).next().unwrap_or(resource);
    tail.rsplit('.').next().unwrap_or(tail)
}

/// Everything the update pipeline needs to know about one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseRecord {
    pub id: String,
    pub url: String,
    pub classification: TestCaseClassification,
    pub state: String,
    pub requirements: Vec<String>,
}

pub fn read_test_case(
    url: &str,
    client: &dyn QmClient,
    config: &QmConfig,
) -> Result<TestCaseRecord, QmError> {
    let doc = convert_xml_dict(url, client)?;
    let node = test_case_node(&doc).ok_or_else(|| QmError::MalformedDocument {
        url: url.to_string(),
        reason: "no oslc_qm:TestCase element".into(),
    })?;

    let id = [qname(ns::RQM, "shortIdentifier"), qname(ns::DCTERMS, "identifier")]
        .iter()
        .find_map(|key| node.get(key).and_then(XmlValue::as_text))
        .map(str::to_string)
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).to_string());

    let state = node
        .get(&config.state_key)
        .and_then(|s| s.resource().or_else(|| s.as_text()))
        .map(|s| state_label(s).to_string())
        .unwrap_or_default();

    Ok(TestCaseRecord {
        id,
        url: url.to_string(),
        classification: classify_test_case(&doc, config)?,
        state,
        requirements: requirement_links(node),
    })
}

/// DOORS `(ASIL, category)` attributes of one requirement.
pub fn requirement_attributes(
    url: &str,
    client: &dyn QmClient,
    config: &QmConfig,
) -> Result<(String, String), QmError> {
    let doc = convert_xml_dict(url, client)?;
    let described = doc
        .get(&qname(ns::RDF, "RDF"))
        .and_then(XmlValue::as_map)
        .into_iter()
        .flat_map(|rdf| rdf.values())
        .flat_map(XmlValue::items)
        .find(|node| node.get(&config.requirement_asil_key).is_some()
            || node.get(&config.requirement_category_key).is_some());

    let attribute = |key: &str| {
        described
            .and_then(|node| node.get(key))
            .and_then(|v| v.resource().map(attribute_label).or_else(|| v.as_text()))
            .map(|v| v.trim().to_string())
    };

    let asil = attribute(&config.requirement_asil_key)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| NO_REQUIREMENT_ASIL.to_string());
    let category = attribute(&config.requirement_category_key).unwrap_or_default();

    Ok((asil, category))
}

/// Enumeration literals are published as `.../attribute#Label` resources.
fn attribute_label(resource: &str) -> &str {
    resource.rsplit(&['/', '#'][..]).next().unwrap_or(resource)
}

/// One row per (test case, validated requirement) across `plans`.
///
/// A test case without requirement links still gets a row, with ASIL `-`.
pub fn test_case_report(
    plans: &[String],
    client: &dyn QmClient,
    config: &QmConfig,
) -> Result<Table, QmError> {
    let mut table = Table::with_columns(&[
        TEST_PLAN,
        TEST_CASE_ID,
        TEST_CASE_URL,
        REQUIREMENT_URL,
        DOORS_ASIL,
        DOORS_CATEGORY,
        PREVIOUS_ASIL,
        PREVIOUS_CATEGORY,
        TEST_CASE_STATE,
    ]);

    for plan in plans {
        let test_cases = plan_test_cases(plan, client)?;
        tracing::info!(plan = %plan, test_cases = test_cases.len(), "Reading test plan");

        for url in &test_cases {
            let record = read_test_case(url, client, config)?;
            let (previous_asil, previous_security) = record.classification.pair();

            let links: Vec<(String, String, String)> = if record.requirements.is_empty() {
                vec![(String::new(), NO_REQUIREMENT_ASIL.to_string(), String::new())]
            } else {
                record
                    .requirements
                    .iter()
                    .map(|req| {
                        requirement_attributes(req, client, config)
                            .map(|(asil, category)| (req.clone(), asil, category))
                    })
                    .collect::<Result<_, _>>()?
            };

            for (requirement, asil, category) in links {
                table.push_row(vec![
                    plan.clone(),
                    record.id.clone(),
                    record.url.clone(),
                    requirement,
                    asil,
                    category,
                    previous_asil.clone(),
                    previous_security.clone(),
                    record.state.clone(),
                ])?;
            }
        }
    }

    Ok(table)
}
