use std::io::Read;

use crate::XlsxError;

/// Maximum uncompressed size permitted for any single ZIP part inflated into memory.
pub(crate) const MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Comparison key for a ZIP entry name.
///
/// Producers disagree on leading `/`, `\` separators, ASCII case and percent-encoding
/// (`sheet%201.xml`); all of those collapse to the same key.
pub(crate) fn part_name_key(name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_leading_separators = true;
    while let Some(&b) = bytes.first() {
        let hi = bytes.get(1).copied().and_then(hex_val);
        let lo = bytes.get(2).copied().and_then(hex_val);
        let decoded = match (b, hi, lo) {
            (b'%', Some(hi), Some(lo)) => {
                bytes = &bytes[3..];
                (hi << 4) | lo
            }
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        if in_leading_separators && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        in_leading_separators = false;

        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    out
}

pub(crate) fn part_names_equivalent(a: &str, b: &str) -> bool {
    part_name_key(a) == part_name_key(b)
}

/// Index of the entry best matching `name`: exact name, then a leading-slash variant, then any
/// [`part_names_equivalent`] entry.
pub(crate) fn find_part(entries: &[String], name: &str) -> Option<usize> {
    let mut candidate: Option<(usize, u8)> = None;
    for (idx, entry) in entries.iter().enumerate() {
        if entry == name {
            return Some(idx);
        }
        let slash_variant = match name.strip_prefix('/') {
            Some(stripped) => entry == stripped,
            None => entry.strip_prefix('/') == Some(name),
        };
        let score = if slash_variant {
            2
        } else if part_names_equivalent(entry, name) {
            1
        } else {
            continue;
        };
        if candidate.map_or(true, |(_, best)| best < score) {
            candidate = Some((idx, score));
        }
    }
    candidate.map(|(idx, _)| idx)
}

/// Inflate at most `max_bytes` from `reader`.
///
/// `declared_size` comes from ZIP metadata and is checked first, but the read itself is also
/// capped so a forged size field cannot trigger an unbounded allocation.
pub(crate) fn read_with_limit<R: Read>(
    reader: R,
    part: &str,
    declared_size: u64,
    max_bytes: u64,
) -> Result<Vec<u8>, XlsxError> {
    if declared_size > max_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_bytes,
        });
    }

    let mut buf = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)?;
    let observed = buf.len() as u64;
    if observed > max_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_bytes,
        });
    }
    Ok(buf)
}
