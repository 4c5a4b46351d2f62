#![no_main]

use libfuzzer_sys::fuzz_target;

const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    let Ok(sheet) = qadoc_xlsx::Worksheet::from_xml(data) else {
        return;
    };
    // Re-emitting an untouched sheet must not fail on markup the reader accepted.
    let _ = sheet.to_xml(data);
});
