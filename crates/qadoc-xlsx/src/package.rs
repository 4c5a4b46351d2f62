use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::zip_util::{find_part, read_with_limit, MAX_PART_BYTES};
use crate::XlsxError;

/// A workbook package opened over borrowed bytes.
///
/// Parts are only inflated when asked for. The original bytes are never modified;
/// [`WorkbookArchive::replace_parts`] produces a new package.
pub struct WorkbookArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
    len: usize,
}

impl<'a> WorkbookArchive<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut names = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            names.push(archive.by_index_raw(idx)?.name().to_string());
        }
        Ok(Self {
            archive,
            names,
            len: bytes.len(),
        })
    }

    /// Entry names in archive order.
    pub fn part_names(&self) -> &[String] {
        &self.names
    }

    /// The stored entry name that `name` refers to, tolerating producer quirks in naming.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        find_part(&self.names, name).map(|idx| self.names[idx].as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        find_part(&self.names, name).is_some()
    }

    pub fn read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, XlsxError> {
        let Some(idx) = find_part(&self.names, name) else {
            return Ok(None);
        };
        let file = self.archive.by_index(idx)?;
        let size = file.size();
        read_with_limit(file, name, size, MAX_PART_BYTES).map(Some)
    }

    pub fn read_required_part(&mut self, name: &str) -> Result<Vec<u8>, XlsxError> {
        self.read_part(name)?
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    /// Write a new package in which each named part carries the given content.
    ///
    /// Every other entry is raw-copied (compressed bytes, CRC and header fields untouched). A
    /// replaced entry keeps its position, compression method, modification time and unix mode.
    pub fn replace_parts(
        &mut self,
        replacements: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, XlsxError> {
        let mut by_index: HashMap<usize, &[u8]> = HashMap::with_capacity(replacements.len());
        for (name, bytes) in replacements {
            let idx = find_part(&self.names, name)
                .ok_or_else(|| XlsxError::MissingPart(name.clone()))?;
            by_index.insert(idx, bytes.as_slice());
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(self.len)));
        for idx in 0..self.archive.len() {
            let file = self.archive.by_index_raw(idx)?;
            let Some(bytes) = by_index.get(&idx) else {
                zip.raw_copy_file(file)?;
                continue;
            };

            let mut options =
                FileOptions::<()>::default().compression_method(file.compression());
            if let Some(modified) = file.last_modified() {
                options = options.last_modified_time(modified);
            }
            if let Some(mode) = file.unix_mode() {
                options = options.unix_permissions(mode);
            }
            let name = file.name().to_string();
            drop(file);

            log::debug!("rewriting part {name} ({} bytes)", bytes.len());
            zip.start_file(name, options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// Replace the named parts of `original` and return the new package bytes.
///
/// See [`WorkbookArchive::replace_parts`].
pub fn replace_parts(
    original: &[u8],
    replacements: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<u8>, XlsxError> {
    WorkbookArchive::open(original)?.replace_parts(replacements)
}
