//! The validation engine seam and the native implementation.

use std::collections::HashMap;

use roxmltree::{Document, Node, NodeType};

use crate::{
    detect::SchemaDocument,
    qname::SVRL_NAMESPACE,
    report::ValidationReport,
    schema::{Check, CheckKind, Let, Message, MessagePart, Pattern, Rule, Schema},
    source::XmlParser,
    writer::XmlWriter,
    xpath::{Context, Value, Variables, XNode},
    xslt::ValidatorXslt,
    SchematronError,
};

/// How an engine is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Phase to run; `None` means the default phase of the schema.
    pub phase: Option<String>,
    /// Keep the SVRL report of the last validation.
    pub store_report: bool,
    /// Keep the generated validation stylesheet.
    pub store_xslt: bool,
}

/// Compiles a Schematron schema and validates documents against it.
pub trait ValidationEngine {
    fn from_schema(
        schema: &SchemaDocument,
        options: &EngineOptions,
        parser: &dyn XmlParser,
    ) -> Result<Self, SchematronError>
    where
        Self: Sized;

    /// Validate `document`; `true` if no assertion failed.
    fn validate(&mut self, document: &Document) -> Result<bool, SchematronError>;

    /// The SVRL report of the last validation, if reports are stored.
    fn validation_report(&self) -> Option<&ValidationReport>;

    /// The validation stylesheet, if it is stored.
    fn validator_xslt(&self) -> Option<&ValidatorXslt>;
}

/// Interprets the schema model directly with the built-in XPath 1.0 engine.
#[derive(Debug)]
pub struct Schematron {
    schema: Schema,
    phase: Option<String>,
    store_report: bool,
    report: Option<ValidationReport>,
    xslt: Option<ValidatorXslt>,
}

impl Schematron {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl ValidationEngine for Schematron {
    fn from_schema(
        schema: &SchemaDocument,
        options: &EngineOptions,
        parser: &dyn XmlParser,
    ) -> Result<Self, SchematronError> {
        let model = Schema::from_document(schema, parser)?;
        // Unknown phases fail here rather than on the first document
        let active = model.select_phase(options.phase.as_deref())?;
        tracing::debug!(
            "Compiled {} with {} active patterns in phase {}",
            schema.path().display(),
            active.patterns.len(),
            active.id
        );
        let xslt = if options.store_xslt {
            Some(ValidatorXslt::generate(&model, &active)?)
        } else {
            None
        };

        Ok(Self {
            schema: model,
            phase: options.phase.clone(),
            store_report: options.store_report,
            report: None,
            xslt,
        })
    }

    fn validate(&mut self, document: &Document) -> Result<bool, SchematronError> {
        let (passed, report) = run(&self.schema, self.phase.as_deref(), document)?;
        if self.store_report {
            self.report = Some(report);
        }
        Ok(passed)
    }

    fn validation_report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    fn validator_xslt(&self) -> Option<&ValidatorXslt> {
        self.xslt.as_ref()
    }
}

/// Validate `document`, returning the outcome and the SVRL report.
fn run(
    schema: &Schema,
    phase: Option<&str>,
    document: &Document,
) -> Result<(bool, ValidationReport), SchematronError> {
    let active = schema.select_phase(phase)?;

    let mut svrl = XmlWriter::new(
        "svrl:schematron-output",
        &[
            ("xmlns:svrl", Some(SVRL_NAMESPACE)),
            ("title", schema.title.as_deref()),
            ("schemaVersion", schema.schema_version.as_deref()),
            ("phase", Some(active.id)),
        ],
    )?;
    for (prefix, uri) in schema.namespaces.iter() {
        svrl.empty(
            "svrl:ns-prefix-in-attribute-values",
            &[("uri", Some(uri)), ("prefix", Some(prefix))],
        )?;
    }

    let root = XNode::Node(document.root());
    let mut variables = Variables::default();
    bind_lets(&schema.lets, root, &mut variables)?;
    bind_lets(active.lets, root, &mut variables)?;

    let mut passed = true;
    for pattern in active.patterns {
        passed &= run_pattern(schema, pattern, document, &variables, &mut svrl)?;
    }

    let report = ValidationReport::new(svrl.finish()?);
    Ok((passed, report))
}

fn run_pattern<'a, 'i>(
    schema: &Schema,
    pattern: &Pattern,
    document: &'a Document<'i>,
    variables: &Variables<'a, 'i>,
    svrl: &mut XmlWriter,
) -> Result<bool, SchematronError> {
    svrl.empty(
        "svrl:active-pattern",
        &[
            ("id", pattern.id.as_deref()),
            ("name", pattern.title.as_deref()),
        ],
    )?;

    let mut variables = variables.clone();
    bind_lets(&pattern.lets, XNode::Node(document.root()), &mut variables)?;

    // Each node is handled by the first rule whose context matches it
    let mut fired: HashMap<(usize, usize), (XNode, usize)> = HashMap::new();
    for (index, rule) in pattern.rules.iter().enumerate() {
        for node in rule.context.matching_nodes(document, &variables)? {
            fired.entry(node.key()).or_insert((node, index));
        }
    }
    let mut fired = fired.into_iter().collect::<Vec<_>>();
    fired.sort_by_key(|(key, _)| *key);

    let mut passed = true;
    for (_, (node, index)) in fired {
        passed &= fire_rule(schema, &pattern.rules[index], node, &variables, svrl)?;
    }
    Ok(passed)
}

fn fire_rule<'a, 'i>(
    schema: &Schema,
    rule: &Rule,
    node: XNode<'a, 'i>,
    variables: &Variables<'a, 'i>,
    svrl: &mut XmlWriter,
) -> Result<bool, SchematronError> {
    svrl.empty(
        "svrl:fired-rule",
        &[
            ("context", Some(rule.context.source())),
            ("id", rule.id.as_deref()),
            ("role", rule.role.as_deref()),
            ("flag", rule.flag.as_deref()),
        ],
    )?;

    let mut variables = variables.clone();
    bind_lets(&rule.lets, node, &mut variables)?;
    let context = Context::new(node, &variables);

    let mut passed = true;
    for check in &rule.checks {
        let result = check.test.evaluate(&context)?.boolean();
        let element = match (check.kind, result) {
            (CheckKind::Assert, false) => {
                passed = false;
                "svrl:failed-assert"
            }
            (CheckKind::Report, true) => "svrl:successful-report",
            _ => continue,
        };
        write_check(schema, check, element, &context, svrl)?;
    }
    Ok(passed)
}

fn write_check(
    schema: &Schema,
    check: &Check,
    element: &str,
    context: &Context,
    svrl: &mut XmlWriter,
) -> Result<(), SchematronError> {
    let location = location(context.node);
    svrl.open(
        element,
        &[
            ("test", Some(check.test.source())),
            ("id", check.id.as_deref()),
            ("role", check.role.as_deref()),
            ("flag", check.flag.as_deref()),
            ("location", Some(location.as_str())),
        ],
    )?;
    // Consumers read the message from the first child
    svrl.text("svrl:text", &[], &expand(&check.message, context)?)?;
    for id in &check.diagnostics {
        if let Some(diagnostic) = schema.diagnostic(id) {
            svrl.text(
                "svrl:diagnostic-reference",
                &[("diagnostic", Some(id.as_str()))],
                &expand(&diagnostic.message, context)?,
            )?;
        }
    }
    svrl.close(element)
}

fn bind_lets<'a, 'i>(
    lets: &[Let],
    node: XNode<'a, 'i>,
    variables: &mut Variables<'a, 'i>,
) -> Result<(), SchematronError> {
    for binding in lets {
        let value = binding.value.evaluate(&Context::new(node, variables))?;
        variables.bind(binding.name.clone(), value);
    }
    Ok(())
}

/// Message text with `name` and `value-of` evaluated at the context node.
fn expand(message: &Message, context: &Context) -> Result<String, SchematronError> {
    let mut text = String::new();
    for part in message {
        match part {
            MessagePart::Text(t) => text.push_str(t),
            MessagePart::Name(None) => text.push_str(&context.node.name()),
            MessagePart::Name(Some(path)) => {
                if let Value::NodeSet(nodes) = path.evaluate(context)? {
                    if let Some(node) = nodes.into_iter().min_by_key(XNode::key) {
                        text.push_str(&node.name());
                    }
                }
            }
            MessagePart::ValueOf(select) => text.push_str(&select.evaluate(context)?.string()),
        }
    }
    Ok(text)
}

/// Absolute path of `node` in the form written by the XSLT 1.0 skeleton.
///
/// Every step names the element by local name and namespace, all but the
/// document element add their position among equally named siblings:
/// `/*[local-name()='a' and namespace-uri()='']/*[local-name()='b' and namespace-uri()=''][2]`.
pub fn location(node: XNode) -> String {
    match node {
        XNode::Attribute(owner, _) => {
            let (namespace, local) = node.expanded_name().unwrap_or_default();
            format!(
                "{}/@*[local-name()='{local}' and namespace-uri()='{}']",
                element_path(owner),
                namespace.unwrap_or_default()
            )
        }
        XNode::Node(node) => match node.node_type() {
            NodeType::Root => "/".to_string(),
            NodeType::Element => element_path(node),
            NodeType::Text => child_step(node, "text()", |n| n.is_text()),
            NodeType::Comment => child_step(node, "comment()", |n| n.is_comment()),
            NodeType::PI => child_step(node, "processing-instruction()", |n| n.is_pi()),
        },
    }
}

fn element_path(element: Node) -> String {
    let mut path = String::new();
    let elements = element.ancestors().filter(Node::is_element).collect::<Vec<_>>();
    for node in elements.into_iter().rev() {
        let tag = node.tag_name();
        path.push_str(&format!(
            "/*[local-name()='{}' and namespace-uri()='{}']",
            tag.name(),
            tag.namespace().unwrap_or_default()
        ));
        if node.parent().is_some_and(|parent| !parent.is_root()) {
            let position = node
                .prev_siblings()
                .filter(|sibling| sibling.is_element() && sibling.tag_name() == tag)
                .count();
            path.push_str(&format!("[{position}]"));
        }
    }
    path
}

/// Path of a non-element child: its parent's path plus a positional step.
fn child_step(node: Node, test: &str, same_kind: fn(&Node) -> bool) -> String {
    let parent = node
        .parent()
        .filter(Node::is_element)
        .map(element_path)
        .unwrap_or_default();
    let position = node.prev_siblings().filter(same_kind).count();
    format!("{parent}/{test}[{position}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detect::confirm_schematron,
        source::{ParserOptions, XmlSource},
        walk::failed_assertions,
    };
    use pretty_assertions::assert_eq;

    fn engine(schema: &str, phase: Option<&str>) -> Schematron {
        let parser = ParserOptions::default();
        let schema = confirm_schematron(XmlSource::new("test.sch", schema), &parser).unwrap();
        let options = EngineOptions {
            phase: phase.map(str::to_string),
            store_report: true,
            store_xslt: false,
        };
        Schematron::from_schema(&schema, &options, &parser).unwrap()
    }

    fn messages(engine: &Schematron) -> Vec<String> {
        let report = engine.validation_report().unwrap();
        let doc = report.document().unwrap();
        failed_assertions(&doc)
            .map(|record| record.unwrap().message)
            .collect()
    }

    const BOOKS: &str = r#"
        <schema xmlns="http://purl.oclc.org/dsdl/schematron" defaultPhase="all-checks">
          <ns prefix="l" uri="urn:library"/>
          <phase id="all-checks"><active pattern="titles"/><active pattern="prices"/></phase>
          <phase id="prices-only"><active pattern="prices"/></phase>
          <pattern id="titles">
            <rule context="l:book[@special]">
              <report test="true()">special <value-of select="@id"/></report>
            </rule>
            <rule context="l:book">
              <assert test="l:title">Book <value-of select="@id"/> has no <name path="l:*[1]"/> title</assert>
            </rule>
          </pattern>
          <pattern id="prices">
            <rule context="@price" role="warning">
              <let name="p" value="number(.)"/>
              <assert test="$p &gt; 0"><name/> of <value-of select="../@id"/> must be positive</assert>
            </rule>
          </pattern>
        </schema>"#;

    const LIBRARY: &str = r#"<library xmlns="urn:library">
        <book id="b1" price="10"><title>One</title></book>
        <book id="b2" price="0"><author>Anon</author></book>
        <book id="b3" special="yes"/>
    </library>"#;

    #[test]
    fn first_matching_rule_wins() {
        let mut engine = engine(BOOKS, None);
        let doc = Document::parse(LIBRARY).unwrap();
        assert!(!engine.validate(&doc).unwrap());
        assert_eq!(
            messages(&engine),
            vec![
                "Book b2 has no author title".to_string(),
                "price of b2 must be positive".to_string(),
            ]
        );

        let report = engine.validation_report().unwrap().as_str();
        assert!(report.contains(r#"<svrl:successful-report test="true()" location="#));
        assert!(report.contains(r#"phase="all-checks""#));
        assert!(report.contains(r#"<svrl:ns-prefix-in-attribute-values uri="urn:library" prefix="l"/>"#));
    }

    #[test]
    fn phase_restricts_patterns() {
        let mut engine = engine(BOOKS, Some("prices-only"));
        let doc = Document::parse(LIBRARY).unwrap();
        assert!(!engine.validate(&doc).unwrap());
        assert_eq!(messages(&engine), vec!["price of b2 must be positive".to_string()]);
    }

    #[test]
    fn unknown_phase_fails_when_compiling() {
        let parser = ParserOptions::default();
        let schema = confirm_schematron(XmlSource::new("test.sch", BOOKS), &parser).unwrap();
        let options = EngineOptions {
            phase: Some("nope".to_string()),
            ..Default::default()
        };
        let err = Schematron::from_schema(&schema, &options, &parser).unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(crate::schema::SchemaError::UnknownPhase(_))
        ));
    }

    #[test]
    fn passing_document_has_no_failed_asserts() {
        let mut engine = engine(BOOKS, None);
        let doc = Document::parse(
            r#"<library xmlns="urn:library"><book id="b1" price="3"><title/></book></library>"#,
        )
        .unwrap();
        assert!(engine.validate(&doc).unwrap());
        assert!(messages(&engine).is_empty());
    }

    #[test]
    fn report_is_not_kept_unless_asked() {
        let parser = ParserOptions::default();
        let schema = confirm_schematron(XmlSource::new("test.sch", BOOKS), &parser).unwrap();
        let mut engine =
            Schematron::from_schema(&schema, &EngineOptions::default(), &parser).unwrap();
        engine.validate(&Document::parse(LIBRARY).unwrap()).unwrap();
        assert!(engine.validation_report().is_none());
        assert!(engine.validator_xslt().is_none());
    }

    #[test]
    fn assertion_without_text_reports_an_empty_message() {
        let mut engine = engine(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="/doc" role="fatal"><assert test="false()"/></rule></pattern>
               </schema>"#,
            None,
        );
        let doc = Document::parse("<doc/>").unwrap();
        assert!(!engine.validate(&doc).unwrap());

        let report = engine.validation_report().unwrap().document().unwrap();
        let records = failed_assertions(&report)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "");
        assert_eq!(records[0].severity, Some(crate::Severity::Fatal));
    }

    #[test]
    fn locations_follow_the_skeleton_format() {
        let doc = Document::parse(r#"<a xmlns:n="urn:n"><b/><n:c/><b x="1">t</b></a>"#).unwrap();
        let root = doc.root_element();
        let second_b = root.children().filter(|n| n.is_element()).nth(2).unwrap();

        assert_eq!(location(XNode::Node(doc.root())), "/");
        assert_eq!(
            location(XNode::Node(root)),
            "/*[local-name()='a' and namespace-uri()='']"
        );
        assert_eq!(
            location(XNode::Node(second_b)),
            "/*[local-name()='a' and namespace-uri()='']/*[local-name()='b' and namespace-uri()=''][2]"
        );
        assert_eq!(
            location(XNode::Attribute(second_b, 0)),
            "/*[local-name()='a' and namespace-uri()='']/*[local-name()='b' and namespace-uri()=''][2]/@*[local-name()='x' and namespace-uri()='']"
        );
        assert_eq!(
            location(XNode::Node(second_b.first_child().unwrap())),
            "/*[local-name()='a' and namespace-uri()='']/*[local-name()='b' and namespace-uri()=''][2]/text()[1]"
        );
        let c = root.children().filter(|n| n.is_element()).nth(1).unwrap();
        assert_eq!(
            location(XNode::Node(c)),
            "/*[local-name()='a' and namespace-uri()='']/*[local-name()='c' and namespace-uri()='urn:n'][1]"
        );
    }
}
