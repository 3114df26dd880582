use std::path::Path;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use crate::SchematronError;

/// Attributes of an element; `None` values are left out.
pub(crate) type Attributes<'k> = [(&'k str, Option<&'k str>)];

/// Streams elements into an indented UTF-8 document.
pub(crate) struct XmlWriter {
    writer: Writer<Vec<u8>>,
    root: &'static str,
}

fn start(name: &str, attributes: &Attributes) -> BytesStart<'static> {
    let mut element = BytesStart::new(name.to_string());
    for (key, value) in attributes {
        if let Some(value) = value {
            element.push_attribute((*key, *value));
        }
    }
    element
}

impl XmlWriter {
    /// Write the XML declaration and open the root element.
    pub fn new(root: &'static str, attributes: &Attributes) -> Result<Self, SchematronError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(start(root, attributes)))?;
        Ok(Self { writer, root })
    }

    /// An element without content.
    pub fn empty(&mut self, name: &str, attributes: &Attributes) -> Result<(), SchematronError> {
        self.writer
            .write_event(Event::Empty(start(name, attributes)))?;
        Ok(())
    }

    pub fn open(&mut self, name: &str, attributes: &Attributes) -> Result<(), SchematronError> {
        self.writer
            .write_event(Event::Start(start(name, attributes)))?;
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> Result<(), SchematronError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name.to_string())))?;
        Ok(())
    }

    /// Escaped character data at the current position.
    pub fn characters(&mut self, text: &str) -> Result<(), SchematronError> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    /// An element holding only text.
    pub fn text(
        &mut self,
        name: &str,
        attributes: &Attributes,
        text: &str,
    ) -> Result<(), SchematronError> {
        self.open(name, attributes)?;
        self.characters(text)?;
        self.close(name)
    }

    /// Close the root element and return the document.
    pub fn finish(mut self) -> Result<String, SchematronError> {
        self.close(self.root)?;
        Ok(String::from_utf8_lossy(&self.writer.into_inner()).into_owned())
    }
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), SchematronError> {
    std::fs::write(path, contents).map_err(|source| SchematronError::Write {
        path: path.to_path_buf(),
        source,
    })
}
