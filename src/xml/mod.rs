pub mod value;
pub mod records;

pub use value::*;
pub use records::*;

use thiserror::Error;

/// Namespaces used by the QM server's OSLC / RDF documents.
pub mod ns {
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const OSLC_QM: &str = "http://open-services.net/ns/qm#";
    pub const RQM: &str = "http://jazz.net/ns/qm/rqm#";
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    pub const PROCESS: &str = "http://jazz.net/ns/process#";
}

/// Fully-qualified `{namespace}local` key, the form every parsed element uses.
pub fn qname(namespace: &str, local: &str) -> String {
    format!("{{{namespace}}}{local}")
}

/// Attribute key: `@{namespace}local`.
pub fn attr_qname(namespace: &str, local: &str) -> String {
    format!("@{{{namespace}}}{local}")
}

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),
}
