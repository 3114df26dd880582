//! SVRL (Schematron Validation Report Language) reports.

use std::path::Path;

use roxmltree::Document;
use thiserror::Error;

use crate::{writer::write_file, SchematronError};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReportError {
    /// A `failed-assert` without a child element holding its message.
    #[error("failed assertion No. {index} at {} has no message", .location.as_deref().unwrap_or("-"))]
    MissingMessage {
        index: usize,
        location: Option<String>,
    },
    #[error("root element {0} is not svrl:schematron-output")]
    NotSvrl(String),
}

/// A serialized SVRL report, pretty-printed UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    xml: String,
}

impl ValidationReport {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn document(&self) -> Result<Document<'_>, roxmltree::Error> {
        Document::parse(&self.xml)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SchematronError> {
        write_file(path, &self.xml)
    }
}
