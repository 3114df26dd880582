//! ISO Schematron validation of XML documents.
//!
//! [`process()`] runs a complete validation: the schema is checked to be ISO
//! Schematron, the document is validated by a [`ValidationEngine`], and every
//! failed assertion of the resulting SVRL report is logged at the severity
//! named by its `role`.

pub mod detect;
pub mod engine;
pub mod process;
pub mod qname;
pub mod report;
pub mod schema;
pub mod severity;
pub mod source;
pub mod walk;
pub mod xpath;
pub mod xslt;

mod error;
mod writer;

pub use detect::{check_schematron, SchemaDocument, SchemaKind};
pub use engine::{EngineOptions, Schematron, ValidationEngine};
pub use error::SchematronError;
pub use process::{
    process, process_with, run_validation, validate_sch, ProcessOptions, Validation, EXIT_OK,
    EXIT_VALIDATION_FAILED,
};
pub use report::{ReportError, ValidationReport};
pub use schema::SchemaError;
pub use severity::{role_to_severity, Severity};
pub use source::{ParserOptions, XmlParser, XmlSource};
pub use walk::{failed_assertions, FailedAssertion};
pub use xpath::XPathError;
pub use xslt::ValidatorXslt;
