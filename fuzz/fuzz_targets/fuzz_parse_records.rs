#![no_main]

use libfuzzer_sys::fuzz_target;

const MAX_INPUT_BYTES: usize = 64 * 1024;
const COLUMNS: [&str; 4] = ["대분류", "중분류", "소분류", "기능 설명"];

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];
    let text = String::from_utf8_lossy(data);

    let Ok(records) = qadoc_model::parse_records(&text, &COLUMNS) else {
        return;
    };
    // Whatever parses must serialize and parse back to the same records.
    let csv = qadoc_model::write_records(&records, &COLUMNS).expect("write parsed records");
    let again = qadoc_model::parse_records(&csv, &COLUMNS).expect("reparse written records");
    assert_eq!(records, again);
});
