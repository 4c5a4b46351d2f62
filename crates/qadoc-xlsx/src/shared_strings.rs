use quick_xml::events::Event;
use quick_xml::Reader;

use crate::package::WorkbookArchive;
use crate::xml::local_name;
use crate::XlsxError;

/// Plain-text view of `xl/sharedStrings.xml`.
///
/// Read-only: text written back to worksheets always uses inline strings, so existing
/// indices never move and the shared-string part is left byte-identical.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SharedStringTable {
    values: Vec<String>,
}

impl SharedStringTable {
    /// Load the table from `part`, or an empty table when the workbook has none.
    pub fn load(archive: &mut WorkbookArchive<'_>, part: Option<&str>) -> Result<Self, XlsxError> {
        let Some(part) = part else {
            return Ok(Self::default());
        };
        match archive.read_part(part)? {
            Some(bytes) => Self::from_xml(&bytes),
            None => {
                log::warn!("shared string part {part} is referenced but missing");
                Ok(Self::default())
            }
        }
    }

    /// Rich-text runs are flattened; phonetic (`rPh`) runs are skipped.
    pub fn from_xml(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut values = Vec::new();
        let mut current: Option<String> = None;
        let mut phonetic_depth = 0usize;
        let mut in_text = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"si" => current = Some(String::new()),
                    b"rPh" => phonetic_depth += 1,
                    b"t" if phonetic_depth == 0 => in_text = true,
                    _ => {}
                },
                Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => {
                    values.push(String::new());
                }
                Event::End(e) => match local_name(e.name().as_ref()) {
                    b"si" => values.push(current.take().unwrap_or_default()),
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"t" => in_text = false,
                    _ => {}
                },
                Event::Text(t) if in_text => {
                    if let Some(current) = current.as_mut() {
                        current.push_str(&t.unescape()?);
                    }
                }
                Event::CData(t) if in_text => {
                    if let Some(current) = current.as_mut() {
                        current.push_str(&t.decode().map_err(quick_xml::Error::from)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { values })
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.values.get(idx as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
