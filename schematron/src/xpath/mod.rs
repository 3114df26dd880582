//! XPath 1.0 over `roxmltree` documents.
//!
//! This is the query language behind Schematron rule contexts, assertion
//! tests, `let` values and `value-of` selections. The full expression grammar
//! and the core function library are implemented, plus XSLT's `current()`.
//! The namespace axis, `id()` and `lang()` are rejected when compiling.

mod eval;
mod functions;
mod lexer;
mod parser;

use roxmltree::{Document, Node};
use thiserror::Error;

use crate::qname::XML_NAMESPACE;

pub use eval::{number_to_string, string_to_number};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("syntax error in {expression:?}: {message}")]
    Syntax { expression: String, message: String },
    #[error("namespace prefix {0:?} is not declared")]
    UnboundPrefix(String),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("unknown function {0}()")]
    UnknownFunction(String),
    #[error("{function}() takes {expected} arguments, {found} given")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("variable ${0} is not bound")]
    UnknownVariable(String),
    #[error("{0} does not evaluate to a node-set")]
    NotANodeSet(String),
}

/// Prefix to namespace bindings used when compiling expressions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespaces {
    bindings: Vec<(String, String)>,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            bindings: vec![("xml".to_string(), XML_NAMESPACE.to_string())],
        }
    }
}

impl Namespaces {
    /// Bind `prefix`; a later binding of the same prefix wins.
    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.bindings.push((prefix.into(), uri.into()));
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Declared bindings, without the implicit `xml` prefix.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .skip(1)
            .map(|(p, uri)| (p.as_str(), uri.as_str()))
    }
}

/// A node in the XPath data model. `roxmltree` does not model attributes as
/// nodes, so they are addressed by their owner element and index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum XNode<'a, 'i: 'a> {
    Node(Node<'a, 'i>),
    Attribute(Node<'a, 'i>, usize),
}

impl<'a, 'i: 'a> XNode<'a, 'i> {
    /// Sort key in document order; attributes follow their owner element.
    pub fn key(&self) -> (usize, usize) {
        match self {
            XNode::Node(node) => (node.id().get_usize(), 0),
            XNode::Attribute(owner, index) => (owner.id().get_usize(), index + 1),
        }
    }

    /// The element node, or the owner element of an attribute.
    pub fn node(&self) -> Node<'a, 'i> {
        match self {
            XNode::Node(node) | XNode::Attribute(node, _) => *node,
        }
    }

    pub fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'i>> {
        match self {
            XNode::Node(_) => None,
            XNode::Attribute(owner, index) => owner.attributes().nth(*index),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        match self {
            XNode::Node(node) => node.parent().map(XNode::Node),
            XNode::Attribute(owner, _) => Some(XNode::Node(*owner)),
        }
    }

    pub fn root(&self) -> Self {
        XNode::Node(self.node().document().root())
    }

    /// Namespace and local name of elements and attributes, target of
    /// processing instructions.
    pub fn expanded_name(&self) -> Option<(Option<&'a str>, &'a str)> {
        match self {
            XNode::Attribute(..) => self
                .attribute()
                .map(|attribute| (attribute.namespace(), attribute.name())),
            XNode::Node(node) if node.is_element() => {
                let tag = node.tag_name();
                Some((tag.namespace(), tag.name()))
            }
            XNode::Node(node) => node.pi().map(|pi| (None, pi.target)),
        }
    }

    /// The QName as written in the document, using the prefix in scope.
    pub fn name(&self) -> String {
        let Some((namespace, local)) = self.expanded_name() else {
            return String::new();
        };
        let prefix = namespace.and_then(|uri| self.node().lookup_prefix(uri));
        match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        }
    }

    /// The string-value of the node (§5).
    pub fn string_value(&self) -> String {
        match self {
            XNode::Attribute(..) => self
                .attribute()
                .map(|attribute| attribute.value().to_string())
                .unwrap_or_default(),
            XNode::Node(node) if node.is_root() || node.is_element() => node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
            XNode::Node(node) if node.is_pi() => node
                .pi()
                .and_then(|pi| pi.value)
                .unwrap_or_default()
                .to_string(),
            XNode::Node(node) => node.text().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value<'a, 'i> {
    NodeSet(Vec<XNode<'a, 'i>>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl<'a, 'i> Value<'a, 'i> {
    pub fn boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn number(&self) -> f64 {
        match self {
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            other => string_to_number(&other.string()),
        }
    }

    pub fn string(&self) -> String {
        match self {
            Value::NodeSet(nodes) => nodes
                .first()
                .map(XNode::string_value)
                .unwrap_or_default(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
        }
    }
}

/// Variable bindings in scope. Later bindings shadow earlier ones.
#[derive(Clone, Debug, Default)]
pub struct Variables<'a, 'i> {
    bindings: Vec<(String, Value<'a, 'i>)>,
}

impl<'a, 'i> Variables<'a, 'i> {
    pub fn bind(&mut self, name: impl Into<String>, value: Value<'a, 'i>) {
        self.bindings.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a, 'i>> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }
}

/// The evaluation context (§1): context node, position and size, plus the
/// XSLT current node.
#[derive(Clone, Debug)]
pub struct Context<'c, 'a, 'i> {
    pub node: XNode<'a, 'i>,
    pub position: usize,
    pub size: usize,
    pub current: XNode<'a, 'i>,
    pub variables: &'c Variables<'a, 'i>,
}

impl<'c, 'a, 'i> Context<'c, 'a, 'i> {
    pub fn new(node: XNode<'a, 'i>, variables: &'c Variables<'a, 'i>) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
            current: node,
            variables,
        }
    }

    fn focus(&self, node: XNode<'a, 'i>, position: usize, size: usize) -> Self {
        Self {
            node,
            position,
            size,
            current: self.current,
            variables: self.variables,
        }
    }
}

/// A compiled XPath expression.
#[derive(Clone, Debug)]
pub struct XPath {
    source: String,
    expr: parser::Expr,
}

impl XPath {
    pub fn compile(source: &str, namespaces: &Namespaces) -> Result<Self, XPathError> {
        let expr = parser::parse(source, namespaces)?;
        functions::check(&expr)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate<'a, 'i>(
        &self,
        context: &Context<'_, 'a, 'i>,
    ) -> Result<Value<'a, 'i>, XPathError> {
        eval::evaluate(&self.expr, context)
    }

    /// Nodes matched by this expression used as an XSLT pattern, in document
    /// order.
    ///
    /// A relative location path matches wherever it selects from some
    /// ancestor, so it is evaluated as if prefixed with `//`.
    pub fn matching_nodes<'a, 'i>(
        &self,
        document: &'a Document<'i>,
        variables: &Variables<'a, 'i>,
    ) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
        let root = XNode::Node(document.root());
        let context = Context::new(root, variables);
        eval::pattern_matches(&self.expr, &context)
            .map_err(|err| match err {
                XPathError::NotANodeSet(_) => XPathError::NotANodeSet(self.source.clone()),
                err => err,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_string(xml: &str, expr: &str) -> String {
        let doc = Document::parse(xml).unwrap();
        let variables = Variables::default();
        let context = Context::new(XNode::Node(doc.root_element()), &variables);
        XPath::compile(expr, &Namespaces::default())
            .unwrap()
            .evaluate(&context)
            .unwrap()
            .string()
    }

    #[test]
    fn string_value_of_element_concatenates_text() {
        assert_eq!(eval_string("<a>x<b>y</b>z</a>", "string(.)"), "xyz");
        assert_eq!(eval_string("<a b='1'/>", "string(@b)"), "1");
    }

    #[test]
    fn namespaces_resolve_latest_binding() {
        let mut namespaces = Namespaces::default();
        namespaces.insert("a", "urn:one");
        namespaces.insert("a", "urn:two");
        assert_eq!(namespaces.resolve("a"), Some("urn:two"));
        assert_eq!(namespaces.resolve("xml"), Some(XML_NAMESPACE));
        assert_eq!(namespaces.iter().count(), 2);
    }

    #[test]
    fn variables_shadow() {
        let mut variables = Variables::default();
        variables.bind("x", Value::Number(1.0));
        variables.bind("x", Value::Number(2.0));
        assert_eq!(variables.get("x"), Some(&Value::Number(2.0)));
        assert_eq!(variables.get("y"), None);
    }

    #[test]
    fn pattern_matching_treats_relative_paths_as_anywhere() {
        let doc = Document::parse("<a><b/><c><b/></c></a>").unwrap();
        let variables = Variables::default();
        let pattern = XPath::compile("b | /a", &Namespaces::default()).unwrap();
        let nodes = pattern.matching_nodes(&doc, &variables).unwrap();
        let names = nodes
            .iter()
            .map(|n| n.expanded_name().unwrap().1)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "b"]);
    }
}
