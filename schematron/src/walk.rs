//! Extract failed assertions from an SVRL report.

use roxmltree::{Descendants, Document, Node};

use crate::{
    qname::Namespace,
    report::ReportError,
    severity::{role_to_severity, Severity},
};

/// One `svrl:failed-assert`, numbered from 1 in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedAssertion {
    pub index: usize,
    pub location: Option<String>,
    pub message: String,
    /// The assertion's own role, or else the one of the closest preceding
    /// `fired-rule`.
    pub role: Option<String>,
    /// `None` when the role is absent or not a known severity.
    pub severity: Option<Severity>,
}

impl FailedAssertion {
    /// Severity to log this assertion at.
    pub fn severity_or(&self, default: Severity) -> Severity {
        self.severity.unwrap_or(default)
    }
}

/// Iterator over the failed assertions of a report, see [`failed_assertions()`].
pub struct FailedAssertions<'a, 'i> {
    nodes: Descendants<'a, 'i>,
    index: usize,
}

/// Walk `report` in document order.
///
/// A malformed `failed-assert` yields [`ReportError::MissingMessage`] and
/// still takes up its index, so later assertions keep their numbers.
pub fn failed_assertions<'a, 'i>(report: &'a Document<'i>) -> FailedAssertions<'a, 'i> {
    FailedAssertions {
        nodes: report.root().descendants(),
        index: 0,
    }
}

/// Check that `report` is SVRL at all.
pub fn check_svrl(report: &Document) -> Result<(), ReportError> {
    let root = report.root_element();
    if Namespace::SVRL.is(root, "schematron-output") {
        Ok(())
    } else {
        Err(ReportError::NotSvrl(
            crate::qname::QualifiedName::of(root).to_string(),
        ))
    }
}

impl<'a, 'i> Iterator for FailedAssertions<'a, 'i> {
    type Item = Result<FailedAssertion, ReportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self
            .nodes
            .find(|node| Namespace::SVRL.is(*node, "failed-assert"))?;
        self.index += 1;
        Some(read_assertion(node, self.index))
    }
}

fn read_assertion(node: Node, index: usize) -> Result<FailedAssertion, ReportError> {
    let location = node.attribute("location").map(str::to_string);

    // An empty first child is an empty message, only a missing one is malformed
    let Some(message) = node.first_element_child() else {
        return Err(ReportError::MissingMessage { index, location });
    };
    let message = message.text().unwrap_or_default().trim().to_string();

    let role = node
        .attribute("role")
        .or_else(|| inherited_role(node))
        .map(str::to_string);
    let severity = role_to_severity(role.as_deref());

    Ok(FailedAssertion {
        index,
        location,
        message,
        role,
        severity,
    })
}

/// Role of the closest preceding sibling `fired-rule`, if it has one.
fn inherited_role<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.prev_siblings()
        .skip(1)
        .find(|sibling| Namespace::SVRL.is(*sibling, "fired-rule"))
        .and_then(|rule| rule.attribute("role"))
}
