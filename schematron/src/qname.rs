use lazy_static::lazy_static;
use std::fmt;

pub type NCName = String;
pub type AnyURI = String;

/// Namespace of ISO/IEC 19757-3 Schematron.
pub const SCHEMATRON_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";
/// Namespace of the pre-ISO ("1.5") Schematron dialect.
pub const OLD_SCHEMATRON_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";
/// Namespace of the Schematron Validation Report Language.
pub const SVRL_NAMESPACE: &str = "http://purl.oclc.org/dsdl/svrl";
pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

lazy_static! {
    /// The root element of an ISO Schematron schema
    pub static ref SCHEMA_TAG: QualifiedName = QualifiedName::with_namespace(SCHEMATRON_NAMESPACE, "schema");
    /// The root element of a legacy Schematron schema
    pub static ref OLD_SCHEMA_TAG: QualifiedName = QualifiedName::with_namespace(OLD_SCHEMATRON_NAMESPACE, "schema");
}

/// An expanded XML name: optional namespace plus local name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace: Option<AnyURI>,
    pub local_name: NCName,
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = self.namespace.as_ref() {
            write!(f, "{{{}}}{}", namespace, self.local_name)
        } else {
            write!(f, "{}", self.local_name)
        }
    }
}

impl QualifiedName {
    pub fn with_namespace(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::with_optional_namespace(Some(namespace), local_name)
    }

    pub fn with_optional_namespace(
        namespace: Option<impl Into<String>>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.map(Into::into),
            local_name: local_name.into(),
        }
    }

    /// The expanded name of an element node.
    pub fn of(node: roxmltree::Node) -> Self {
        let tag = node.tag_name();
        Self::with_optional_namespace(tag.namespace(), tag.name())
    }

    /// Compare against a node's tag without allocating.
    pub fn matches(&self, node: roxmltree::Node) -> bool {
        let tag = node.tag_name();
        node.is_element()
            && tag.name() == self.local_name
            && tag.namespace() == self.namespace.as_deref()
    }
}

/// Builds names in a single namespace, e.g. `Namespace::SVRL.name("failed-assert")`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Namespace(pub &'static str);

impl Namespace {
    pub const SCHEMATRON: Namespace = Namespace(SCHEMATRON_NAMESPACE);
    pub const SVRL: Namespace = Namespace(SVRL_NAMESPACE);

    pub fn name(self, local_name: &str) -> QualifiedName {
        QualifiedName::with_namespace(self.0, local_name)
    }

    /// True if `node` is an element in this namespace named `local_name`.
    pub fn is(self, node: roxmltree::Node, local_name: &str) -> bool {
        node.is_element()
            && node.tag_name().namespace() == Some(self.0)
            && node.tag_name().name() == local_name
    }
}
