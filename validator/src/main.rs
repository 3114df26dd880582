mod cli;

use std::process::ExitCode;

use clap::Parser;
use dt_schematron::{ParserOptions, ProcessOptions, SchematronError};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SCHVALIDATOR_LOG";

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Process exit status for a run that could not complete.
fn exit_code(err: &SchematronError) -> u8 {
    match err {
        SchematronError::Xml { .. } | SchematronError::Encoding { .. } => 10,
        SchematronError::LegacySchematron { .. } => 20,
        SchematronError::NotIsoSchematron { .. } => 30,
        SchematronError::Io { .. } | SchematronError::Write { .. } => 40,
        SchematronError::Schema(_) | SchematronError::XPath(_) => 50,
        SchematronError::Serialize(_) | SchematronError::Report(_) => 1,
    }
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_tracing(cli.log_level());

    let options = ProcessOptions {
        phase: cli.phase,
        report: cli.report,
        store_xslt: cli.store_xslt,
        default_severity: cli.default_severity,
        parser: ParserOptions {
            allow_dtd: cli.allow_dtd,
            ..Default::default()
        },
        ..ProcessOptions::new(cli.schema, cli.xml)
    };

    match dt_schematron::process(&options) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                tracing::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::from(exit_code(&err))
        }
    }
}
