#![no_main]

use std::path::Path;

use dependi_python::parsers::install_line::InstallLine;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        for line in content.lines() {
            if let Ok(parsed) = InstallLine::parse(line, Path::new("."), None)
                && let Some(record) = parsed.to_record("requirements.txt")
            {
                let mut sorted = record.extras.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(record.extras, sorted, "extras must be sorted and unique");
            }
        }
    }
});
