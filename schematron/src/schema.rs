//! The Schematron schema model and its mapping from ISO/IEC 19757-3 XML.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use roxmltree::Node;
use thiserror::Error;

use crate::{
    detect::SchemaDocument,
    qname::{Namespace, SCHEMATRON_NAMESPACE},
    source::XmlParser,
    xpath::{Namespaces, XPath, XPathError},
    SchematronError,
};

/// Nesting limit for `sch:include`, which also stops include cycles.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Query bindings evaluated by the XPath 1.0 engine.
const SUPPORTED_QUERY_BINDINGS: [&str; 3] = ["xslt", "xslt1", "xpath"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("<{element}> is missing the {attribute:?} attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("phase {0:?} is not defined")]
    UnknownPhase(String),
    #[error("phase {phase:?} activates undefined pattern {pattern:?}")]
    UnknownPattern { phase: String, pattern: String },
    #[error("abstract rule {0:?} is not defined")]
    UnknownAbstractRule(String),
    #[error("rule {0:?} extends itself")]
    CyclicExtends(String),
    #[error("diagnostic {0:?} is not defined")]
    UnknownDiagnostic(String),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("includes are nested deeper than {0} levels")]
    IncludeDepth(usize),
    #[error("invalid XPath in the {attribute:?} attribute of <{element}>: {source}")]
    InvalidXPath {
        element: String,
        attribute: &'static str,
        #[source]
        source: XPathError,
    },
}

/// A Schematron schema (§5.4.18)
#[derive(Clone, Debug)]
pub struct Schema {
    pub title: Option<String>,
    pub schema_version: Option<String>,
    pub query_binding: Option<String>,
    pub default_phase: Option<String>,
    pub namespaces: Namespaces,
    pub lets: Vec<Let>,
    pub phases: Vec<Phase>,
    pub patterns: Vec<Pattern>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A variable binding (§5.4.9)
#[derive(Clone, Debug)]
pub struct Let {
    pub name: String,
    pub value: XPath,
}

#[derive(Clone, Debug)]
pub struct Phase {
    pub id: String,
    pub lets: Vec<Let>,
    pub active: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Pattern {
    pub id: Option<String>,
    pub title: Option<String>,
    pub lets: Vec<Let>,
    pub rules: Vec<Rule>,
}

/// A concrete rule, with the contents of any extended abstract rules in place.
#[derive(Clone, Debug)]
pub struct Rule {
    pub id: Option<String>,
    pub context: XPath,
    pub role: Option<String>,
    pub flag: Option<String>,
    pub lets: Vec<Let>,
    pub checks: Vec<Check>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckKind {
    /// Fails when the test is false.
    Assert,
    /// Fires when the test is true.
    Report,
}

/// An `assert` or `report` element.
#[derive(Clone, Debug)]
pub struct Check {
    pub kind: CheckKind,
    pub id: Option<String>,
    pub test: XPath,
    pub role: Option<String>,
    pub flag: Option<String>,
    pub diagnostics: Vec<String>,
    pub message: Message,
}

pub type Message = Vec<MessagePart>;

/// Message content. Inline markup (`emph`, `dir`, `span`) is flattened into
/// its text.
#[derive(Clone, Debug)]
pub enum MessagePart {
    Text(String),
    /// `sch:name`, naming the context node or the node selected by `path`
    Name(Option<XPath>),
    /// `sch:value-of`
    ValueOf(XPath),
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub id: String,
    pub message: Message,
}

/// The phase selected for a validation run.
#[derive(Debug)]
pub struct ActivePhase<'s> {
    /// `#ALL` or a phase id
    pub id: &'s str,
    pub lets: &'s [Let],
    pub patterns: Vec<&'s Pattern>,
}

pub const ALL_PHASES: &str = "#ALL";
pub const DEFAULT_PHASE: &str = "#DEFAULT";

impl Schema {
    /// Map a confirmed ISO Schematron schema, resolving `sch:include` through
    /// `parser`.
    pub fn from_document(
        schema: &SchemaDocument,
        parser: &dyn XmlParser,
    ) -> Result<Self, SchematronError> {
        let document = parser.parse(schema.source())?;
        let mut mapper = Mapper::new(parser, schema.path());
        mapper.map_schema(document.root_element())
    }

    /// Select the patterns to run. `None` and `#DEFAULT` mean the
    /// `defaultPhase` of the schema, or `#ALL` if there is none.
    pub fn select_phase(&self, phase: Option<&str>) -> Result<ActivePhase<'_>, SchemaError> {
        let phase = match phase {
            None | Some(DEFAULT_PHASE) => self.default_phase.as_deref().unwrap_or(ALL_PHASES),
            Some(phase) => phase,
        };

        if phase == ALL_PHASES {
            return Ok(ActivePhase {
                id: ALL_PHASES,
                lets: &[],
                patterns: self.patterns.iter().collect(),
            });
        }

        let selected = self
            .phases
            .iter()
            .find(|p| p.id == phase)
            .ok_or_else(|| SchemaError::UnknownPhase(phase.to_string()))?;
        let patterns = self
            .patterns
            .iter()
            .filter(|pattern| {
                pattern
                    .id
                    .as_ref()
                    .is_some_and(|id| selected.active.contains(id))
            })
            .collect();
        Ok(ActivePhase {
            id: &selected.id,
            lets: &selected.lets,
            patterns,
        })
    }

    pub fn diagnostic(&self, id: &str) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.id == id)
    }
}

/// A rule before `sch:extends` is resolved.
struct RuleDraft {
    id: Option<String>,
    context: Option<XPath>,
    role: Option<String>,
    flag: Option<String>,
    items: Vec<RuleItem>,
}

enum RuleItem {
    Let(Let),
    Check(Check),
    Extends(String),
}

struct PatternDraft {
    pattern: Pattern,
    rules: Vec<RuleDraft>,
}

/// Mapping state: include stack, in-scope namespaces and abstract rules.
struct Mapper<'p> {
    parser: &'p dyn XmlParser,
    files: Vec<PathBuf>,
    namespaces: Namespaces,
    abstract_rules: HashMap<String, Vec<RuleItem>>,
}

fn attribute(node: Node, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn required(node: Node, name: &'static str) -> Result<String, SchemaError> {
    attribute(node, name).ok_or_else(|| SchemaError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attribute: name,
    })
}

/// Text content of a `sch:title`, whitespace normalized.
fn title_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_sch(node: Node, local_name: &str) -> bool {
    Namespace::SCHEMATRON.is(node, local_name)
}

impl<'p> Mapper<'p> {
    fn new(parser: &'p dyn XmlParser, path: &Path) -> Self {
        Self {
            parser,
            files: vec![path.to_path_buf()],
            namespaces: Namespaces::default(),
            abstract_rules: HashMap::new(),
        }
    }

    fn xpath(&self, node: Node, name: &'static str) -> Result<XPath, SchemaError> {
        let source = required(node, name)?;
        XPath::compile(&source, &self.namespaces).map_err(|source| SchemaError::InvalidXPath {
            element: node.tag_name().name().to_string(),
            attribute: name,
            source,
        })
    }

    /// Call `f` for `node`, or for the root of the document it includes.
    fn visit<F>(&mut self, node: Node, f: &mut F) -> Result<(), SchematronError>
    where
        F: FnMut(&mut Self, Node<'_, '_>) -> Result<(), SchematronError>,
    {
        if !is_sch(node, "include") {
            return f(self, node);
        }

        // The include element references an external document whose root element replaces
        // the include element (§5.4.8)
        let href = required(node, "href")?;
        if href.contains('#') {
            return Err(SchemaError::Unsupported(format!("include of fragment {href:?}")).into());
        }
        if self.files.len() > MAX_INCLUDE_DEPTH {
            return Err(SchemaError::IncludeDepth(MAX_INCLUDE_DEPTH).into());
        }
        let base = self
            .files
            .last()
            .and_then(|file| file.parent())
            .unwrap_or(Path::new(""));
        let path = base.join(&href);
        tracing::debug!("Including {}", path.display());

        let source = self.parser.read(&path)?;
        let document = self.parser.parse(&source)?;
        self.files.push(path);
        let result = self.visit(document.root_element(), f);
        self.files.pop();
        result
    }

    /// Visit the Schematron children of `parent`, resolving includes.
    fn for_each_child<F>(&mut self, parent: Node, mut f: F) -> Result<(), SchematronError>
    where
        F: FnMut(&mut Self, Node<'_, '_>) -> Result<(), SchematronError>,
    {
        let children = parent
            .children()
            .filter(|n| n.is_element() && n.tag_name().namespace() == Some(SCHEMATRON_NAMESPACE));
        for child in children {
            self.visit(child, &mut f)?;
        }
        Ok(())
    }

    fn map_schema(&mut self, schema: Node) -> Result<Schema, SchematronError> {
        let query_binding = attribute(schema, "queryBinding");
        if let Some(binding) = query_binding.as_deref() {
            if !SUPPORTED_QUERY_BINDINGS.contains(&binding.to_ascii_lowercase().as_str()) {
                tracing::warn!(
                    "Query binding {binding:?} is not supported, evaluating as XPath 1.0"
                );
            }
        }

        // Namespaces, included ones too, must be known before any XPath is compiled
        self.for_each_child(schema, |m, child| {
            if child.tag_name().name() == "ns" {
                let prefix = required(child, "prefix")?;
                let uri = required(child, "uri")?;
                m.namespaces.insert(prefix, uri);
            }
            Ok(())
        })?;

        let mut title = None;
        let mut lets = Vec::new();
        let mut phases = Vec::new();
        let mut drafts = Vec::new();
        let mut diagnostics = Vec::new();

        self.for_each_child(schema, |m, child| {
            match child.tag_name().name() {
                "title" => title = Some(title_text(child)),
                "let" => lets.push(m.map_let(child)?),
                "phase" => phases.push(m.map_phase(child)?),
                "pattern" => {
                    if let Some(draft) = m.map_pattern(child)? {
                        drafts.push(draft);
                    }
                }
                "diagnostics" => m.for_each_child(child, |m, diagnostic| {
                    if diagnostic.tag_name().name() == "diagnostic" {
                        diagnostics.push(Diagnostic {
                            id: required(diagnostic, "id")?,
                            message: m.map_message(diagnostic)?,
                        });
                    }
                    Ok(())
                })?,
                // ISO/IEC 19757-3:2016 container for abstract rules
                "rules" => m.for_each_child(child, |m, rule| {
                    if rule.tag_name().name() == "rule" {
                        m.map_rule(rule)?;
                    }
                    Ok(())
                })?,
                _ => {}
            }
            Ok(())
        })?;

        let mut patterns = Vec::with_capacity(drafts.len());
        for PatternDraft { mut pattern, rules } in drafts {
            pattern.rules = rules
                .into_iter()
                .map(|draft| self.resolve_rule(draft))
                .collect::<Result<_, _>>()?;
            patterns.push(pattern);
        }

        let schema = Schema {
            title,
            schema_version: attribute(schema, "schemaVersion"),
            query_binding,
            default_phase: attribute(schema, "defaultPhase"),
            namespaces: self.namespaces.clone(),
            lets,
            phases,
            patterns,
            diagnostics,
        };
        check_references(&schema)?;
        Ok(schema)
    }

    fn map_let(&self, node: Node) -> Result<Let, SchemaError> {
        Ok(Let {
            name: required(node, "name")?,
            value: self.xpath(node, "value")?,
        })
    }

    fn map_phase(&mut self, phase: Node) -> Result<Phase, SchematronError> {
        let id = required(phase, "id")?;
        let mut lets = Vec::new();
        let mut active = Vec::new();
        self.for_each_child(phase, |m, child| {
            match child.tag_name().name() {
                "let" => lets.push(m.map_let(child)?),
                "active" => active.push(required(child, "pattern")?),
                _ => {}
            }
            Ok(())
        })?;
        Ok(Phase { id, lets, active })
    }

    /// `None` for abstract patterns, which only serve as templates.
    fn map_pattern(&mut self, pattern: Node) -> Result<Option<PatternDraft>, SchematronError> {
        if pattern.attribute("abstract") == Some("true") {
            tracing::debug!(
                "Skipping abstract pattern {:?}",
                pattern.attribute("id").unwrap_or_default()
            );
            return Ok(None);
        }
        if pattern.has_attribute("is-a") {
            return Err(SchemaError::Unsupported("pattern instantiation (is-a)".to_string()).into());
        }

        let mut title = None;
        let mut lets = Vec::new();
        let mut rules = Vec::new();
        self.for_each_child(pattern, |m, child| {
            match child.tag_name().name() {
                "title" => title = Some(title_text(child)),
                "let" => lets.push(m.map_let(child)?),
                "rule" => {
                    if let Some(rule) = m.map_rule(child)? {
                        rules.push(rule);
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(Some(PatternDraft {
            pattern: Pattern {
                id: attribute(pattern, "id"),
                title,
                lets,
                rules: Vec::new(),
            },
            rules,
        }))
    }

    /// Abstract rules are registered by id and yield `None`.
    fn map_rule(&mut self, rule: Node) -> Result<Option<RuleDraft>, SchematronError> {
        let is_abstract = rule.attribute("abstract") == Some("true");

        let mut items = Vec::new();
        self.for_each_child(rule, |m, child| {
            match child.tag_name().name() {
                "let" => items.push(RuleItem::Let(m.map_let(child)?)),
                "assert" => items.push(RuleItem::Check(m.map_check(child, CheckKind::Assert)?)),
                "report" => items.push(RuleItem::Check(m.map_check(child, CheckKind::Report)?)),
                "extends" => {
                    if child.has_attribute("href") {
                        return Err(SchemaError::Unsupported("extends by href".to_string()).into());
                    }
                    items.push(RuleItem::Extends(required(child, "rule")?));
                }
                _ => {}
            }
            Ok(())
        })?;

        if is_abstract {
            // An abstract rule shall have an id and shall not have a context attribute
            let id = required(rule, "id")?;
            self.abstract_rules.insert(id, items);
            return Ok(None);
        }

        Ok(Some(RuleDraft {
            id: attribute(rule, "id"),
            context: Some(self.xpath(rule, "context")?),
            role: attribute(rule, "role"),
            flag: attribute(rule, "flag"),
            items,
        }))
    }

    fn map_check(&mut self, check: Node, kind: CheckKind) -> Result<Check, SchematronError> {
        Ok(Check {
            kind,
            id: attribute(check, "id"),
            test: self.xpath(check, "test")?,
            role: attribute(check, "role"),
            flag: attribute(check, "flag"),
            diagnostics: check
                .attribute("diagnostics")
                .map(|ids| ids.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            message: self.map_message(check)?,
        })
    }

    fn map_message(&self, node: Node) -> Result<Message, SchemaError> {
        let mut parts = Vec::new();
        self.collect_message(node, &mut parts)?;
        Ok(parts)
    }

    fn collect_message(&self, node: Node, parts: &mut Message) -> Result<(), SchemaError> {
        for child in node.children() {
            if child.is_text() {
                parts.push(MessagePart::Text(child.text().unwrap_or_default().to_string()));
            } else if is_sch(child, "name") {
                let path = child
                    .has_attribute("path")
                    .then(|| self.xpath(child, "path"))
                    .transpose()?;
                parts.push(MessagePart::Name(path));
            } else if is_sch(child, "value-of") {
                parts.push(MessagePart::ValueOf(self.xpath(child, "select")?));
            } else if child.is_element() {
                // emph, dir, span and foreign markup contribute their text
                self.collect_message(child, parts)?;
            }
        }
        Ok(())
    }

    fn resolve_rule(&self, draft: RuleDraft) -> Result<Rule, SchemaError> {
        let mut lets = Vec::new();
        let mut checks = Vec::new();
        let mut chain = Vec::new();
        self.resolve_items(&draft.items, &mut chain, &mut lets, &mut checks)?;
        Ok(Rule {
            id: draft.id,
            // Only abstract rules lack a context, and they never get here
            context: draft.context.ok_or_else(|| SchemaError::MissingAttribute {
                element: "rule".to_string(),
                attribute: "context",
            })?,
            role: draft.role,
            flag: draft.flag,
            lets,
            checks,
        })
    }

    fn resolve_items<'r>(
        &'r self,
        items: &'r [RuleItem],
        chain: &mut Vec<&'r str>,
        lets: &mut Vec<Let>,
        checks: &mut Vec<Check>,
    ) -> Result<(), SchemaError> {
        for item in items {
            match item {
                RuleItem::Let(binding) => lets.push(binding.clone()),
                RuleItem::Check(check) => checks.push(check.clone()),
                RuleItem::Extends(id) => {
                    if chain.contains(&id.as_str()) {
                        return Err(SchemaError::CyclicExtends(id.clone()));
                    }
                    let extended = self
                        .abstract_rules
                        .get(id)
                        .ok_or_else(|| SchemaError::UnknownAbstractRule(id.clone()))?;
                    chain.push(id);
                    self.resolve_items(extended, chain, lets, checks)?;
                    chain.pop();
                }
            }
        }
        Ok(())
    }
}

/// Phases must activate defined patterns and checks must cite defined
/// diagnostics.
fn check_references(schema: &Schema) -> Result<(), SchemaError> {
    for phase in &schema.phases {
        for pattern in &phase.active {
            let defined = schema
                .patterns
                .iter()
                .any(|p| p.id.as_deref() == Some(pattern.as_str()));
            if !defined {
                return Err(SchemaError::UnknownPattern {
                    phase: phase.id.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
    }

    let cited = schema
        .patterns
        .iter()
        .flat_map(|p| &p.rules)
        .flat_map(|r| &r.checks)
        .flat_map(|c| &c.diagnostics);
    for id in cited {
        if schema.diagnostic(id).is_none() {
            return Err(SchemaError::UnknownDiagnostic(id.clone()));
        }
    }

    if let Some(phase) = schema.default_phase.as_deref() {
        if phase != ALL_PHASES && !schema.phases.iter().any(|p| p.id == phase) {
            return Err(SchemaError::UnknownPhase(phase.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detect::confirm_schematron,
        source::{ParserOptions, XmlSource},
    };

    fn map(text: &str) -> Result<Schema, SchematronError> {
        let parser = ParserOptions::default();
        let schema = confirm_schematron(XmlSource::new("schema.sch", text), &parser)?;
        Schema::from_document(&schema, &parser)
    }

    const SCHEMA: &str = r#"
        <sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron"
                    queryBinding="xslt" defaultPhase="basic" schemaVersion="1.0">
          <sch:title>Library   rules</sch:title>
          <sch:ns prefix="l" uri="urn:library"/>
          <sch:let name="max" value="3"/>
          <sch:phase id="basic">
            <sch:active pattern="books"/>
          </sch:phase>
          <sch:pattern id="books">
            <sch:rule abstract="true" id="titled">
              <sch:assert test="l:title">A <sch:name/> needs a title</sch:assert>
            </sch:rule>
            <sch:rule context="l:book" role="warning">
              <sch:let name="n" value="count(l:author)"/>
              <sch:extends rule="titled"/>
              <sch:report test="$n &gt; $max" diagnostics="many">Too many authors:
                <sch:value-of select="$n"/></sch:report>
            </sch:rule>
          </sch:pattern>
          <sch:pattern id="unused" abstract="true"/>
          <sch:diagnostics>
            <sch:diagnostic id="many">Found <sch:emph>many</sch:emph></sch:diagnostic>
          </sch:diagnostics>
        </sch:schema>"#;

    #[test]
    fn maps_schema_elements() {
        let schema = map(SCHEMA).unwrap();
        assert_eq!(schema.title.as_deref(), Some("Library rules"));
        assert_eq!(schema.schema_version.as_deref(), Some("1.0"));
        assert_eq!(schema.namespaces.resolve("l"), Some("urn:library"));
        assert_eq!(schema.lets.len(), 1);
        assert_eq!(schema.patterns.len(), 1);
        assert_eq!(schema.diagnostics.len(), 1);

        let rule = &schema.patterns[0].rules[0];
        assert_eq!(rule.context.source(), "l:book");
        assert_eq!(rule.role.as_deref(), Some("warning"));
        assert_eq!(rule.lets.len(), 1);
        let kinds = rule.checks.iter().map(|c| c.kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec![CheckKind::Assert, CheckKind::Report]);
        assert_eq!(rule.checks[1].diagnostics, vec!["many".to_string()]);
        assert!(matches!(
            rule.checks[0].message.as_slice(),
            [MessagePart::Text(_), MessagePart::Name(None), MessagePart::Text(_)]
        ));
    }

    #[test]
    fn selects_phases() {
        let schema = map(SCHEMA).unwrap();
        assert_eq!(schema.select_phase(None).unwrap().id, "basic");
        assert_eq!(schema.select_phase(Some("#DEFAULT")).unwrap().id, "basic");
        assert_eq!(schema.select_phase(Some("#ALL")).unwrap().patterns.len(), 1);
        assert!(matches!(
            schema.select_phase(Some("missing")),
            Err(SchemaError::UnknownPhase(phase)) if phase == "missing"
        ));
    }

    #[test]
    fn missing_context_is_reported() {
        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <pattern><rule><assert test="true()">x</assert></rule></pattern>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::MissingAttribute { attribute: "context", .. })
        ));
    }

    #[test]
    fn invalid_xpath_names_the_attribute() {
        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <pattern><rule context="a"><assert test="b:c">x</assert></rule></pattern>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::InvalidXPath {
                attribute: "test",
                source: XPathError::UnboundPrefix(_),
                ..
            })
        ));
    }

    #[test]
    fn unknown_and_cyclic_extends_are_errors() {
        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <pattern><rule context="a"><extends rule="nope"/></rule></pattern>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::UnknownAbstractRule(id)) if id == "nope"
        ));

        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <pattern>
                <rule abstract="true" id="x"><extends rule="x"/></rule>
                <rule context="a"><extends rule="x"/></rule>
              </pattern>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::CyclicExtends(id)) if id == "x"
        ));
    }

    #[test]
    fn pattern_instantiation_is_unsupported() {
        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <pattern is-a="template" id="p"/>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::Unsupported(_))
        ));
    }

    #[test]
    fn includes_resolve_relative_to_the_including_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("parts")).unwrap();
        std::fs::write(
            dir.path().join("parts/pattern.sch"),
            r#"<pattern xmlns="http://purl.oclc.org/dsdl/schematron" id="inc">
                 <include href="rule.sch"/>
               </pattern>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("parts/rule.sch"),
            r#"<rule xmlns="http://purl.oclc.org/dsdl/schematron" context="/">
                 <assert test="false()">included</assert>
               </rule>"#,
        )
        .unwrap();
        let main = dir.path().join("main.sch");
        std::fs::write(
            &main,
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <include href="parts/pattern.sch"/>
               </schema>"#,
        )
        .unwrap();

        let parser = ParserOptions::default();
        let document = crate::detect::check_schematron(&main, &parser).unwrap();
        let schema = Schema::from_document(&document, &parser).unwrap();
        assert_eq!(schema.patterns[0].id.as_deref(), Some("inc"));
        assert_eq!(schema.patterns[0].rules[0].checks.len(), 1);
    }

    #[test]
    fn included_namespace_declarations_apply_to_all_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ns.sch"),
            r#"<ns xmlns="http://purl.oclc.org/dsdl/schematron" prefix="l" uri="urn:library"/>"#,
        )
        .unwrap();
        let main = dir.path().join("main.sch");
        std::fs::write(
            &main,
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="l:book"><assert test="l:title">x</assert></rule></pattern>
                 <include href="ns.sch"/>
               </schema>"#,
        )
        .unwrap();

        let parser = ParserOptions::default();
        let document = crate::detect::check_schematron(&main, &parser).unwrap();
        let schema = Schema::from_document(&document, &parser).unwrap();
        assert_eq!(schema.namespaces.resolve("l"), Some("urn:library"));
        assert_eq!(schema.patterns[0].rules[0].context.source(), "l:book");
    }

    #[test]
    fn self_include_hits_the_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("loop.sch"),
            r#"<include xmlns="http://purl.oclc.org/dsdl/schematron" href="loop.sch"/>"#,
        )
        .unwrap();
        let main = dir.path().join("main.sch");
        std::fs::write(
            &main,
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <include href="loop.sch"/>
               </schema>"#,
        )
        .unwrap();

        let parser = ParserOptions::default();
        let document = crate::detect::check_schematron(&main, &parser).unwrap();
        let err = Schema::from_document(&document, &parser).unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::IncludeDepth(MAX_INCLUDE_DEPTH))
        ));
    }

    #[test]
    fn undefined_references_are_rejected() {
        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
              <phase id="p"><active pattern="nope"/></phase>
            </schema>"#)
        .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::UnknownPattern { .. })
        ));

        let err = map(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron" defaultPhase="x"/>"#)
            .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Schema(SchemaError::UnknownPhase(_))
        ));
    }
}
