pub mod session;
pub mod classification;
pub mod plans;
pub mod update;

pub use session::*;
pub use classification::*;
pub use plans::*;
pub use update::*;

use thiserror::Error;

use crate::rules::RuleError;
use crate::sheet::SheetError;
use crate::xml::XmlError;

#[derive(Error, Debug)]
pub enum QmError {
    #[error("QM server is not reachable at {0}")]
    Connection(String),

    #[error("QM server returned error (status {status}) for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Rule evaluation error: {0}")]
    Rules(#[from] RuleError),

    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("No category UUID configured for '{0}'")]
    UnknownCategory(String),

    #[error("Malformed test case document {url}: {reason}")]
    MalformedDocument { url: String, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Category reference has no code separator: {0}")]
    MissingSeparator(String),

    #[error("Category reference has an empty code: {0}")]
    EmptyCode(String),
}
