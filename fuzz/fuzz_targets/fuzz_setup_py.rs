#![no_main]

use dependi_python::config::SandboxConfig;
use dependi_python::parsers::setup_cfg::IniDocument;
use dependi_python::sandbox::evaluate_setup_script;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let config = SandboxConfig {
            step_limit: 20_000,
            max_call_depth: 16,
            ..SandboxConfig::default()
        };

        // Any script must end in a classified result, never a panic or a hang
        let _ = evaluate_setup_script(content, &config);
        let _ = IniDocument::parse(content, "setup.cfg");
    }
});
