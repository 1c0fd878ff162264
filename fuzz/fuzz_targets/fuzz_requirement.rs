#![no_main]

use dependi_python::parsers::requirement::Requirement;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        match Requirement::parse(content) {
            Ok(req) => {
                assert!(!req.name.is_empty(), "parsed requirement without a name");

                // A rendered specifier set is stable under reparsing
                let rendered = req.specifier.to_string();
                if !rendered.is_empty()
                    && let Ok(again) = Requirement::parse(&format!("{}{rendered}", req.name))
                {
                    assert_eq!(again.specifier.to_string(), rendered);
                }
            }
            Err(err) => {
                assert!(
                    err.position <= err.text.len(),
                    "error position must be within the input"
                );
            }
        }
    }
});
