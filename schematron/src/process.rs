//! Validation runs: detect, validate, export artifacts and log failed
//! assertions.

use std::path::{Path, PathBuf};

use crate::{
    detect::check_schematron,
    emit,
    engine::{EngineOptions, Schematron, ValidationEngine},
    report::{ReportError, ValidationReport},
    severity::Severity,
    source::{ParserOptions, XmlParser},
    walk::{check_svrl, failed_assertions, FailedAssertion},
    xslt::ValidatorXslt,
    SchematronError,
};

/// Exit code of a successful validation.
pub const EXIT_OK: u8 = 0;
/// Exit code when at least one assertion failed.
pub const EXIT_VALIDATION_FAILED: u8 = 200;

const SEPARATOR: &str = "--------------------";

/// Outcome of [`run_validation()`], holding the engine with its artifacts.
#[derive(Debug)]
pub struct Validation<E> {
    pub passed: bool,
    pub engine: E,
}

impl<E: ValidationEngine> Validation<E> {
    pub fn report(&self) -> Option<&ValidationReport> {
        self.engine.validation_report()
    }

    pub fn xslt(&self) -> Option<&ValidatorXslt> {
        self.engine.validator_xslt()
    }
}

/// Validate the document at `xml` against the schema at `schema`.
///
/// The document is parsed first, then the schema is checked to be ISO
/// Schematron; a legacy or foreign schema fails before the engine is built.
pub fn run_validation<E: ValidationEngine>(
    schema: &Path,
    xml: &Path,
    phase: Option<&str>,
    parser: &dyn XmlParser,
) -> Result<Validation<E>, SchematronError> {
    let source = parser.read(xml)?;
    let document = parser.parse(&source)?;
    let schema = check_schematron(schema, parser)?;

    let options = EngineOptions {
        phase: phase.map(str::to_string),
        store_report: true,
        store_xslt: true,
    };
    let mut engine = E::from_schema(&schema, &options, parser)?;
    let passed = engine.validate(&document)?;
    tracing::debug!("Validated {} against {}", xml.display(), schema.path().display());
    Ok(Validation { passed, engine })
}

/// [`run_validation()`] with the native engine.
pub fn validate_sch(
    schema: &Path,
    xml: &Path,
    phase: Option<&str>,
    parser: &dyn XmlParser,
) -> Result<Validation<Schematron>, SchematronError> {
    run_validation(schema, xml, phase, parser)
}

/// Everything a command line run needs.
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    pub schema: PathBuf,
    pub xml: PathBuf,
    pub phase: Option<String>,
    /// Where to write the SVRL report
    pub report: Option<PathBuf>,
    /// Where to write the validation stylesheet
    pub store_xslt: Option<PathBuf>,
    /// Severity for failed assertions without a known role
    pub default_severity: Severity,
    pub parser: ParserOptions,
}

impl ProcessOptions {
    pub fn new(schema: impl Into<PathBuf>, xml: impl Into<PathBuf>) -> Self {
        Self {
            schema: schema.into(),
            xml: xml.into(),
            phase: None,
            report: None,
            store_xslt: None,
            default_severity: Severity::Error,
            parser: ParserOptions::default(),
        }
    }
}

/// Run a validation with the native engine and return the exit code.
pub fn process(options: &ProcessOptions) -> Result<u8, SchematronError> {
    process_with::<Schematron>(options)
}

pub fn process_with<E: ValidationEngine>(options: &ProcessOptions) -> Result<u8, SchematronError> {
    let validation = run_validation::<E>(
        &options.schema,
        &options.xml,
        options.phase.as_deref(),
        &options.parser,
    )?;

    save_report(validation.report(), options.report.as_deref())?;
    save_xslt(validation.xslt(), options.store_xslt.as_deref())?;
    match validation.report() {
        Some(report) => {
            process_result_svrl(report, options.default_severity)?;
        }
        None => tracing::warn!("The validation engine kept no report"),
    }

    if validation.passed {
        tracing::info!("Validation was successful");
        Ok(EXIT_OK)
    } else {
        emit!(Severity::Fatal, "Validation failed!");
        Ok(EXIT_VALIDATION_FAILED)
    }
}

fn save_report(
    report: Option<&ValidationReport>,
    path: Option<&Path>,
) -> Result<(), SchematronError> {
    match (report, path) {
        (Some(report), Some(path)) => {
            report.write_to(path)?;
            tracing::info!("Wrote Schematron validation report to {:?}", path);
        }
        (Some(report), None) => tracing::debug!("{}", report.as_str()),
        (None, Some(path)) => {
            tracing::warn!("No validation report to write to {:?}", path);
        }
        (None, None) => {}
    }
    Ok(())
}

fn save_xslt(xslt: Option<&ValidatorXslt>, path: Option<&Path>) -> Result<(), SchematronError> {
    let Some(path) = path else {
        return Ok(());
    };
    match xslt {
        Some(xslt) => {
            xslt.write_to(path)?;
            tracing::info!("Wrote validation XSLT file to {:?}", path);
        }
        None => tracing::warn!("No validation XSLT to write to {:?}", path),
    }
    Ok(())
}

/// Log every failed assertion of `report` at its severity, or at `default`
/// if its role has none.
///
/// Malformed assertions are skipped with a warning and keep their number.
pub fn process_result_svrl(
    report: &ValidationReport,
    default: Severity,
) -> Result<Vec<FailedAssertion>, SchematronError> {
    let document = report.document().map_err(|source| SchematronError::Xml {
        path: PathBuf::from("<validation report>"),
        source,
    })?;
    check_svrl(&document)?;

    let mut records = Vec::new();
    for record in failed_assertions(&document) {
        match record {
            Ok(record) => {
                emit!(
                    record.severity_or(default),
                    "No. {}\n\tLocation: {}\n\tMessage:{}\n{}",
                    record.index,
                    record.location.as_deref().unwrap_or("-"),
                    record.message,
                    SEPARATOR
                );
                records.push(record);
            }
            Err(err @ ReportError::MissingMessage { .. }) => {
                tracing::warn!("Skipping malformed report entry: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(records)
}
