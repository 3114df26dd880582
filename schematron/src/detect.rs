use std::path::Path;

use roxmltree::Document;

use crate::{
    qname::{OLD_SCHEMA_TAG, SCHEMA_TAG},
    source::{XmlParser, XmlSource},
    SchematronError,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    IsoSchematron,
    LegacySchematron,
    Unrecognized,
}

impl SchemaKind {
    pub fn of(document: &Document) -> Self {
        let root = document.root_element();
        if SCHEMA_TAG.matches(root) {
            SchemaKind::IsoSchematron
        } else if OLD_SCHEMA_TAG.matches(root) {
            SchemaKind::LegacySchematron
        } else {
            SchemaKind::Unrecognized
        }
    }
}

/// A schema file whose root element is `sch:schema` in the ISO namespace.
#[derive(Clone, Debug)]
pub struct SchemaDocument {
    source: XmlSource,
}

impl SchemaDocument {
    pub fn source(&self) -> &XmlSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }
}

/// Check that `schema` is an ISO Schematron schema.
pub fn check_schematron(
    schema: &Path,
    parser: &dyn XmlParser,
) -> Result<SchemaDocument, SchematronError> {
    let source = parser.read(schema)?;
    confirm_schematron(source, parser)
}

/// Same as [`check_schematron()`] for text that is already in memory.
pub fn confirm_schematron(
    source: XmlSource,
    parser: &dyn XmlParser,
) -> Result<SchemaDocument, SchematronError> {
    let kind = {
        let document = parser.parse(&source)?;
        tracing::debug!(
            "Found root element: {}",
            crate::qname::QualifiedName::of(document.root_element())
        );
        SchemaKind::of(&document)
    };

    match kind {
        SchemaKind::LegacySchematron => Err(SchematronError::LegacySchematron {
            path: source.path().to_path_buf(),
        }),
        SchemaKind::Unrecognized => Err(SchematronError::NotIsoSchematron {
            path: source.path().to_path_buf(),
        }),
        SchemaKind::IsoSchematron => Ok(SchemaDocument { source }),
    }
}
