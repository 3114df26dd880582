use std::path::PathBuf;

use clap::Parser;
use dt_schematron::Severity;

#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    #[clap(value_parser, value_name = "SCHEMA", help = "The ISO Schematron schema")]
    pub schema: PathBuf,

    #[clap(value_parser, value_name = "XMLFILE", help = "The XML document to validate")]
    pub xml: PathBuf,

    #[clap(short, long, help = "Validate only the patterns of this phase")]
    pub phase: Option<String>,

    #[clap(short, long, value_name = "FILE", help = "Write the SVRL report to FILE")]
    pub report: Option<PathBuf>,

    #[clap(
        long,
        value_name = "FILE",
        help = "Write the generated validation XSLT to FILE"
    )]
    pub store_xslt: Option<PathBuf>,

    #[clap(
        long,
        default_value = "error",
        help = "Severity of failed assertions without a known role (fatal, error, warning, info, debug)"
    )]
    pub default_severity: Severity,

    #[clap(long, help = "Allow a XML Document Type Definition (DTD) to occur")]
    pub allow_dtd: bool,

    #[clap(short, long, action = clap::ArgAction::Count, help = "More output, repeat for debug output")]
    pub verbose: u8,

    #[clap(short, long, conflicts_with = "verbose", help = "Only report errors")]
    pub quiet: bool,
}

impl Cli {
    /// Level filter used when `SCHVALIDATOR_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
