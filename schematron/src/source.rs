use std::path::{Path, PathBuf};

use encoding_rs::UTF_8;
use roxmltree::Document;

use crate::SchematronError;

/// The text of an XML file together with the path it was read from.
///
/// `roxmltree` documents borrow their input, so the text is kept here and
/// parsed on demand.
#[derive(Clone, Debug)]
pub struct XmlSource {
    path: PathBuf,
    text: String,
}

impl XmlSource {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Reads and parses XML files. Implement this to change how documents are
/// loaded; [`ParserOptions`] is the default.
pub trait XmlParser {
    fn read(&self, path: &Path) -> Result<XmlSource, SchematronError>;

    fn parse<'s>(&self, source: &'s XmlSource) -> Result<Document<'s>, SchematronError>;

    fn load(&self, path: &Path) -> Result<XmlSource, SchematronError> {
        let source = self.read(path)?;
        // Fail early on malformed input
        self.parse(&source)?;
        Ok(source)
    }
}

/// The default parser: UTF-8 input (a BOM may select UTF-16), no DTDs.
///
/// External entities are never resolved and nothing is fetched over the
/// network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParserOptions {
    pub allow_dtd: bool,
    pub nodes_limit: u32,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            allow_dtd: false,
            nodes_limit: u32::MAX,
        }
    }
}

impl XmlParser for ParserOptions {
    fn read(&self, path: &Path) -> Result<XmlSource, SchematronError> {
        let buf = std::fs::read(path).map_err(|source| SchematronError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (decoded, _, had_errors) = UTF_8.decode(&buf);
        if had_errors {
            return Err(SchematronError::Encoding {
                path: path.to_path_buf(),
            });
        }
        Ok(XmlSource::new(path, decoded.into_owned()))
    }

    fn parse<'s>(&self, source: &'s XmlSource) -> Result<Document<'s>, SchematronError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: self.allow_dtd,
            nodes_limit: self.nodes_limit,
            ..Default::default()
        };
        Document::parse_with_options(source.text(), options).map_err(|source_err| {
            SchematronError::Xml {
                path: source.path().to_path_buf(),
                source: source_err,
            }
        })
    }
}
