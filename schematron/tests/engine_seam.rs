//! Validation through an engine other than the built-in one.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use dt_schematron::{
    process_with, run_validation, EngineOptions, ParserOptions, ProcessOptions, SchemaDocument,
    SchematronError, ValidationEngine, ValidationReport, ValidatorXslt, XmlParser,
    EXIT_VALIDATION_FAILED,
};
use roxmltree::Document;

/// Build counts, one per test so that concurrent tests don't interfere.
static BUILT: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

const REPORT: &str = r#"<svrl:schematron-output xmlns:svrl="http://purl.oclc.org/dsdl/svrl">
  <svrl:fired-rule context="/" role="warning"/>
  <svrl:failed-assert test="false()" location="/">
    <svrl:text>canned failure</svrl:text>
  </svrl:failed-assert>
</svrl:schematron-output>"#;

/// Fails every document with a fixed report and counts how often it is built.
#[derive(Debug)]
struct CannedEngine<const COUNTER: usize> {
    phase: Option<String>,
    report: Option<ValidationReport>,
}

impl<const COUNTER: usize> ValidationEngine for CannedEngine<COUNTER> {
    fn from_schema(
        _schema: &SchemaDocument,
        options: &EngineOptions,
        _parser: &dyn XmlParser,
    ) -> Result<Self, SchematronError> {
        BUILT[COUNTER].fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            phase: options.phase.clone(),
            report: None,
        })
    }

    fn validate(&mut self, _document: &Document) -> Result<bool, SchematronError> {
        self.report = Some(ValidationReport::new(REPORT));
        Ok(false)
    }

    fn validation_report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    fn validator_xslt(&self) -> Option<&ValidatorXslt> {
        None
    }
}

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

#[test]
fn engine_is_only_built_for_iso_schemas() {
    let parser = ParserOptions::default();

    let err = run_validation::<CannedEngine<0>>(
        &data("legacy.sch"),
        &data("library.xml"),
        None,
        &parser,
    )
    .unwrap_err();
    assert!(matches!(err, SchematronError::LegacySchematron { .. }));
    assert_eq!(BUILT[0].load(Ordering::SeqCst), 0);

    let err = run_validation::<CannedEngine<0>>(
        &data("not-schematron.xsd"),
        &data("library.xml"),
        None,
        &parser,
    )
    .unwrap_err();
    assert!(matches!(err, SchematronError::NotIsoSchematron { .. }));
    assert_eq!(BUILT[0].load(Ordering::SeqCst), 0);

    let validation = run_validation::<CannedEngine<0>>(
        &data("always-fails.sch"),
        &data("library.xml"),
        Some("any"),
        &parser,
    )
    .unwrap();
    assert_eq!(BUILT[0].load(Ordering::SeqCst), 1);
    assert!(!validation.passed);
    assert_eq!(validation.engine.phase.as_deref(), Some("any"));
    assert_eq!(validation.report().map(ValidationReport::as_str), Some(REPORT));
    assert!(validation.xslt().is_none());
}

#[test]
fn custom_engine_drives_the_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = ProcessOptions::new(data("always-fails.sch"), data("valid-library.xml"));
    options.report = Some(dir.path().join("canned.svrl"));
    // Nothing to store, the run still succeeds
    options.store_xslt = Some(dir.path().join("canned.xsl"));

    assert_eq!(
        process_with::<CannedEngine<1>>(&options).unwrap(),
        EXIT_VALIDATION_FAILED
    );
    assert_eq!(BUILT[1].load(Ordering::SeqCst), 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("canned.svrl")).unwrap(),
        REPORT
    );
    assert!(!dir.path().join("canned.xsl").exists());
}
