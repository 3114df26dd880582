//! Export of a schema as an XSLT 1.0 validation stylesheet.
//!
//! The stylesheet follows the structure of the ISO skeleton implementation:
//! one mode per active pattern, one template per rule with priorities
//! falling in document order, and `svrl:` literal result elements for the
//! report. The native engine does not run it, it is written out for use with
//! an external XSLT processor.

use std::path::Path;

use crate::{
    qname::{SVRL_NAMESPACE, XSL_NAMESPACE},
    schema::{ActivePhase, Check, CheckKind, Let, Message, MessagePart, Schema},
    writer::{write_file, XmlWriter},
    SchematronError,
};

/// A generated validation stylesheet, pretty-printed UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorXslt {
    xml: String,
}

/// Escape `{` and `}` in a literal result attribute, which is an attribute
/// value template.
fn avt(value: &str) -> String {
    value.replace('{', "{{").replace('}', "}}")
}

const FULL_PATH: &str = "schematron-get-full-path";

impl ValidatorXslt {
    pub fn generate(schema: &Schema, phase: &ActivePhase) -> Result<Self, SchematronError> {
        let declarations = schema
            .namespaces
            .iter()
            .map(|(prefix, uri)| (format!("xmlns:{prefix}"), uri.to_string()))
            .collect::<Vec<_>>();
        let mut attributes = vec![
            ("version", Some("1.0")),
            ("xmlns:xsl", Some(XSL_NAMESPACE)),
            ("xmlns:svrl", Some(SVRL_NAMESPACE)),
        ];
        attributes.extend(
            declarations
                .iter()
                .map(|(name, uri)| (name.as_str(), Some(uri.as_str()))),
        );

        let mut xsl = XmlWriter::new("xsl:stylesheet", &attributes)?;
        xsl.empty(
            "xsl:output",
            &[
                ("method", Some("xml")),
                ("omit-xml-declaration", Some("no")),
                ("indent", Some("yes")),
            ],
        )?;
        write_full_path_templates(&mut xsl)?;

        for binding in schema.lets.iter().chain(phase.lets) {
            write_variable(&mut xsl, binding)?;
        }

        // Root template: report header, then every pattern in its own mode
        xsl.open("xsl:template", &[("match", Some("/"))])?;
        let title = schema.title.as_deref().map(avt);
        let version = schema.schema_version.as_deref().map(avt);
        xsl.open(
            "svrl:schematron-output",
            &[
                ("title", title.as_deref()),
                ("schemaVersion", version.as_deref()),
                ("phase", Some(phase.id)),
            ],
        )?;
        for (prefix, uri) in schema.namespaces.iter() {
            xsl.empty(
                "svrl:ns-prefix-in-attribute-values",
                &[("uri", Some(avt(uri).as_str())), ("prefix", Some(prefix))],
            )?;
        }
        for (index, pattern) in phase.patterns.iter().enumerate() {
            let id = pattern.id.as_deref().map(avt);
            let name = pattern.title.as_deref().map(avt);
            xsl.empty(
                "svrl:active-pattern",
                &[("id", id.as_deref()), ("name", name.as_deref())],
            )?;
            let mode = format!("M{index}");
            xsl.empty(
                "xsl:apply-templates",
                &[("select", Some("/")), ("mode", Some(mode.as_str()))],
            )?;
        }
        xsl.close("svrl:schematron-output")?;
        xsl.close("xsl:template")?;

        for (index, pattern) in phase.patterns.iter().enumerate() {
            let mode = format!("M{index}");
            for binding in &pattern.lets {
                write_variable(&mut xsl, binding)?;
            }

            let count = pattern.rules.len();
            for (position, rule) in pattern.rules.iter().enumerate() {
                // Earlier rules take precedence
                let priority = (1000 + count - position).to_string();
                xsl.open(
                    "xsl:template",
                    &[
                        ("match", Some(rule.context.source())),
                        ("priority", Some(priority.as_str())),
                        ("mode", Some(mode.as_str())),
                    ],
                )?;
                let context = avt(rule.context.source());
                let id = rule.id.as_deref().map(avt);
                let role = rule.role.as_deref().map(avt);
                let flag = rule.flag.as_deref().map(avt);
                xsl.empty(
                    "svrl:fired-rule",
                    &[
                        ("context", Some(context.as_str())),
                        ("id", id.as_deref()),
                        ("role", role.as_deref()),
                        ("flag", flag.as_deref()),
                    ],
                )?;
                for binding in &rule.lets {
                    write_variable(&mut xsl, binding)?;
                }
                for check in &rule.checks {
                    write_check(&mut xsl, schema, check)?;
                }
                apply_to_children(&mut xsl, &mode)?;
                xsl.close("xsl:template")?;
            }

            xsl.empty(
                "xsl:template",
                &[
                    ("match", Some("text()")),
                    ("priority", Some("-1")),
                    ("mode", Some(mode.as_str())),
                ],
            )?;
            xsl.open(
                "xsl:template",
                &[
                    ("match", Some("@*|node()")),
                    ("priority", Some("-2")),
                    ("mode", Some(mode.as_str())),
                ],
            )?;
            apply_to_children(&mut xsl, &mode)?;
            xsl.close("xsl:template")?;
        }

        Ok(Self { xml: xsl.finish()? })
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SchematronError> {
        write_file(path, &self.xml)
    }
}

fn write_variable(xsl: &mut XmlWriter, binding: &Let) -> Result<(), SchematronError> {
    xsl.empty(
        "xsl:variable",
        &[
            ("name", Some(binding.name.as_str())),
            ("select", Some(binding.value.source())),
        ],
    )
}

fn apply_to_children(xsl: &mut XmlWriter, mode: &str) -> Result<(), SchematronError> {
    xsl.empty(
        "xsl:apply-templates",
        &[
            ("select", Some("@*|*|comment()|processing-instruction()")),
            ("mode", Some(mode)),
        ],
    )
}

fn write_check(xsl: &mut XmlWriter, schema: &Schema, check: &Check) -> Result<(), SchematronError> {
    let element = match check.kind {
        CheckKind::Assert => {
            xsl.open("xsl:choose", &[])?;
            xsl.empty("xsl:when", &[("test", Some(check.test.source()))])?;
            xsl.open("xsl:otherwise", &[])?;
            "svrl:failed-assert"
        }
        CheckKind::Report => {
            xsl.open("xsl:if", &[("test", Some(check.test.source()))])?;
            "svrl:successful-report"
        }
    };

    let test = avt(check.test.source());
    let id = check.id.as_deref().map(avt);
    let role = check.role.as_deref().map(avt);
    let flag = check.flag.as_deref().map(avt);
    xsl.open(
        element,
        &[
            ("test", Some(test.as_str())),
            ("id", id.as_deref()),
            ("role", role.as_deref()),
            ("flag", flag.as_deref()),
        ],
    )?;
    xsl.open("xsl:attribute", &[("name", Some("location"))])?;
    xsl.empty(
        "xsl:apply-templates",
        &[("select", Some(".")), ("mode", Some(FULL_PATH))],
    )?;
    xsl.close("xsl:attribute")?;

    xsl.open("svrl:text", &[])?;
    write_message(xsl, &check.message)?;
    xsl.close("svrl:text")?;
    for id in &check.diagnostics {
        if let Some(diagnostic) = schema.diagnostic(id) {
            xsl.open("svrl:diagnostic-reference", &[("diagnostic", Some(avt(id).as_str()))])?;
            write_message(xsl, &diagnostic.message)?;
            xsl.close("svrl:diagnostic-reference")?;
        }
    }
    xsl.close(element)?;

    match check.kind {
        CheckKind::Assert => {
            xsl.close("xsl:otherwise")?;
            xsl.close("xsl:choose")
        }
        CheckKind::Report => xsl.close("xsl:if"),
    }
}

fn write_message(xsl: &mut XmlWriter, message: &Message) -> Result<(), SchematronError> {
    for part in message {
        match part {
            MessagePart::Text(text) => xsl.text("xsl:text", &[], text)?,
            MessagePart::Name(None) => xsl.empty("xsl:value-of", &[("select", Some("name(.)"))])?,
            MessagePart::Name(Some(path)) => {
                let select = format!("name({})", path.source());
                xsl.empty("xsl:value-of", &[("select", Some(select.as_str()))])?
            }
            MessagePart::ValueOf(select) => {
                xsl.empty("xsl:value-of", &[("select", Some(select.source()))])?
            }
        }
    }
    Ok(())
}

/// `prefix[local-name()='…' and namespace-uri()='…']` for the context node.
fn name_step(xsl: &mut XmlWriter, prefix: &str) -> Result<(), SchematronError> {
    xsl.text("xsl:text", &[], &format!("{prefix}[local-name()='"))?;
    xsl.empty("xsl:value-of", &[("select", Some("local-name()"))])?;
    xsl.text("xsl:text", &[], "' and namespace-uri()='")?;
    xsl.empty("xsl:value-of", &[("select", Some("namespace-uri()"))])?;
    xsl.text("xsl:text", &[], "']")
}

/// Location templates producing the same paths as the native engine.
fn write_full_path_templates(xsl: &mut XmlWriter) -> Result<(), SchematronError> {
    let parent = [("select", Some("parent::*")), ("mode", Some(FULL_PATH))];

    xsl.open("xsl:template", &[("match", Some("*")), ("mode", Some(FULL_PATH))])?;
    xsl.empty("xsl:apply-templates", &parent)?;
    name_step(xsl, "/*")?;
    xsl.open("xsl:if", &[("test", Some("parent::*"))])?;
    xsl.text("xsl:text", &[], "[")?;
    xsl.empty(
        "xsl:value-of",
        &[(
            "select",
            Some(
                "1 + count(preceding-sibling::*[local-name()=local-name(current()) \
                 and namespace-uri()=namespace-uri(current())])",
            ),
        )],
    )?;
    xsl.text("xsl:text", &[], "]")?;
    xsl.close("xsl:if")?;
    xsl.close("xsl:template")?;

    xsl.open("xsl:template", &[("match", Some("@*")), ("mode", Some(FULL_PATH))])?;
    xsl.empty("xsl:apply-templates", &parent)?;
    name_step(xsl, "/@*")?;
    xsl.close("xsl:template")?;

    xsl.open("xsl:template", &[("match", Some("/")), ("mode", Some(FULL_PATH))])?;
    xsl.text("xsl:text", &[], "/")?;
    xsl.close("xsl:template")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detect::confirm_schematron,
        qname::Namespace,
        source::{ParserOptions, XmlSource},
    };
    use roxmltree::Document;

    const SCHEMA: &str = r#"
        <schema xmlns="http://purl.oclc.org/dsdl/schematron" schemaVersion="{1}">
          <ns prefix="l" uri="urn:library"/>
          <let name="limit" value="5"/>
          <pattern id="p">
            <rule context="l:book">
              <assert test="count(l:author) &lt;= $limit">Too many authors in <name/></assert>
            </rule>
            <rule context="l:*">
              <report test="true()">Other: <value-of select="local-name()"/></report>
            </rule>
          </pattern>
        </schema>"#;

    fn generate() -> ValidatorXslt {
        let parser = ParserOptions::default();
        let document = confirm_schematron(XmlSource::new("s.sch", SCHEMA), &parser).unwrap();
        let schema = Schema::from_document(&document, &parser).unwrap();
        let phase = schema.select_phase(None).unwrap();
        ValidatorXslt::generate(&schema, &phase).unwrap()
    }

    #[test]
    fn stylesheet_is_well_formed_xslt() {
        let xslt = generate();
        let doc = Document::parse(xslt.as_str()).unwrap();
        let root = doc.root_element();
        assert_eq!(root.tag_name().namespace(), Some(XSL_NAMESPACE));
        assert_eq!(root.tag_name().name(), "stylesheet");
        assert_eq!(root.lookup_namespace_uri(Some("l")), Some("urn:library"));
    }

    #[test]
    fn rules_become_prioritized_templates() {
        let xslt = generate();
        let doc = Document::parse(xslt.as_str()).unwrap();
        let rule_templates = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "template" && n.attribute("mode") == Some("M0"))
            .filter_map(|n| Some((n.attribute("match")?, n.attribute("priority")?)))
            .collect::<Vec<_>>();
        assert_eq!(
            rule_templates,
            vec![
                ("l:book", "1002"),
                ("l:*", "1001"),
                ("text()", "-1"),
                ("@*|node()", "-2"),
            ]
        );

        let failed = doc
            .descendants()
            .find(|n| Namespace::SVRL.is(*n, "failed-assert"))
            .unwrap();
        assert_eq!(failed.attribute("test"), Some("count(l:author) <= $limit"));
    }

    #[test]
    fn literal_attributes_escape_braces() {
        let xslt = generate();
        assert!(xslt.as_str().contains(r#"schemaVersion="{{1}}""#));
    }
}
