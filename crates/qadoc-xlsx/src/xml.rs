use quick_xml::events::BytesStart;

use crate::XlsxError;

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Namespace prefix of a qualified element name (`x:worksheet` -> `x`).
pub(crate) fn element_prefix(name: &[u8]) -> Option<String> {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

pub(crate) fn prefixed_tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// Unescaped value of the first attribute whose local name is `local`.
pub(crate) fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == local {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Inline text needs `xml:space="preserve"` or consumers trim it.
pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}
