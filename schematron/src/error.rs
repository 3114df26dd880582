use std::path::PathBuf;

use thiserror::Error;

use crate::{report::ReportError, schema::SchemaError, xpath::XPathError};

#[derive(Debug, Error)]
pub enum SchematronError {
    /// Well-formed XML, but written in the pre-ISO Schematron dialect.
    #[error("File {path:?} is an old Schematron schema. This program supports only ISO Schematron")]
    LegacySchematron { path: PathBuf },
    /// The root element is neither ISO nor legacy Schematron.
    #[error("File {path:?} not an ISO Schematron")]
    NotIsoSchematron { path: PathBuf },
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} is not valid UTF-8")]
    Encoding { path: PathBuf },
    #[error("{path:?} is not well-formed XML: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("XPath evaluation failed: {0}")]
    XPath(#[from] XPathError),
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize XML: {0}")]
    Serialize(#[from] quick_xml::Error),
    #[error("malformed validation report: {0}")]
    Report(#[from] ReportError),
}

impl From<std::io::Error> for SchematronError {
    /// Serialization into an in-memory buffer; there is no file to blame.
    fn from(source: std::io::Error) -> Self {
        Self::Serialize(quick_xml::Error::from(source))
    }
}
