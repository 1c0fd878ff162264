//! Regression tests for fuzz crashes

use std::panic::AssertUnwindSafe;
use std::path::Path;

use dependi_python::config::SandboxConfig;
use dependi_python::parsers::install_line::InstallLine;
use dependi_python::parsers::requirement::Requirement;
use dependi_python::parsers::setup_cfg::IniDocument;
use dependi_python::sandbox::evaluate_setup_script;

fn fuzz_config() -> SandboxConfig {
    SandboxConfig {
        step_limit: 20_000,
        max_call_depth: 16,
        ..SandboxConfig::default()
    }
}

fn evaluate_without_panic(source: &str, name: &str) -> Option<String> {
    let config = fuzz_config();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        evaluate_setup_script(source, &config)
    }));
    match result {
        Ok(Ok(_)) => None,
        Ok(Err(err)) => Some(err.class),
        Err(_) => panic!("{name}: sandbox should not panic"),
    }
}

#[test]
fn test_requirement_multibyte_error_position() {
    // Error caret computed from a byte offset inside a multi-byte char
    for content in ["é>=1", "pkg>=1é", "pkg[é]", "pkg; os_name == 'é' and"] {
        let result = std::panic::catch_unwind(|| Requirement::parse(content));
        match result {
            Ok(Ok(req)) => assert!(!req.name.is_empty()),
            Ok(Err(err)) => {
                let rendered = err.to_string();
                assert!(rendered.contains(content));
            }
            Err(_) => panic!("Requirement parser should not panic on {content:?}"),
        }
    }
}

#[test]
fn test_install_line_odd_inputs() {
    for line in [
        ";",
        " ; ",
        "#egg=",
        "https://",
        "git+https://host/repo#egg=",
        "./",
        "pkg.whl",
        "-foo.whl",
        "file:",
        "@",
        "pkg @ ",
    ] {
        let result =
            std::panic::catch_unwind(|| InstallLine::parse(line, Path::new("."), None));
        assert!(result.is_ok(), "InstallLine::parse panicked on {line:?}");
    }
}

#[test]
fn test_sandbox_deep_nesting() {
    let brackets = format!("x = {}1{}\n", "(".repeat(5000), ")".repeat(5000));
    assert_eq!(
        evaluate_without_panic(&brackets, "brackets").as_deref(),
        Some("SyntaxError")
    );

    let unary = format!("x = {}1\n", "-".repeat(5000));
    assert_eq!(
        evaluate_without_panic(&unary, "unary").as_deref(),
        Some("SyntaxError")
    );
}

#[test]
fn test_sandbox_unbounded_recursion() {
    let source = "def f(n):\n    return f(n + 1)\nf(0)\n";
    assert_eq!(
        evaluate_without_panic(source, "recursion").as_deref(),
        Some("RecursionError")
    );
}

#[test]
fn test_sandbox_runaway_loops() {
    for source in [
        "while 1:\n    pass\n",
        "x = []\nfor i in range(10 ** 9):\n    x.append(i)\n",
        "x = 'a'\nwhile True:\n    x = x + x\n",
    ] {
        let class = evaluate_without_panic(source, "loop");
        assert!(class.is_some(), "runaway loop must fail: {source:?}");
    }
}

#[test]
fn test_sandbox_truncated_sources() {
    for source in [
        "setup(",
        "'''",
        "\"abc",
        "if x:\n",
        "def f(:\n",
        "x = [1, 2",
        "class C(\n",
        "f'{'",
        "\tx = 1\n  y = 2\n",
        "lambda: (yield)",
        "x = 1 if\n",
    ] {
        assert!(
            evaluate_without_panic(source, "truncated").is_some(),
            "{source:?} must be rejected"
        );
    }
}

#[test]
fn test_sandbox_arithmetic_edges() {
    for source in [
        "x = 1 // 0\n",
        "x = 1 % 0\n",
        "x = 9223372036854775807 + 1\n",
        "x = (-9223372036854775807 - 1) // -1\n",
        "x = 2 ** 200\n",
        "x = 'a' * 10 ** 12\n",
        "x = [0] * -1\n",
        "x = 1.0 / 0\n",
        "x = 10 ** -1\n",
        "x = -5 % 3\n",
    ] {
        let _ = evaluate_without_panic(source, "arithmetic");
    }
}

#[test]
fn test_sandbox_padding_widths() {
    for method in ["center", "ljust", "rjust", "zfill"] {
        let huge = format!("x = 'a'.{method}(10 ** 12)\n");
        assert_eq!(
            evaluate_without_panic(&huge, method).as_deref(),
            Some("RuntimeError"),
            "{method} with a huge width must exhaust the budget"
        );

        let small = format!("x = 'a'.{method}(8)\n");
        assert_eq!(evaluate_without_panic(&small, method), None);
    }
}

#[test]
fn test_sandbox_long_operator_chains() {
    let terms = |count: usize, op: &str, term: &str| {
        let body = vec![term; count].join(op);
        format!("x = {body}\n")
    };

    // Evaluated iteratively: no stack growth per operator
    assert_eq!(evaluate_without_panic(&terms(1000, " + ", "1"), "sum"), None);
    assert_eq!(evaluate_without_panic(&terms(1000, " or ", "0"), "or"), None);
    assert_eq!(
        evaluate_without_panic(&terms(1000, " and ", "1"), "and"),
        None
    );

    for (source, name) in [
        (terms(10_000, " + ", "['p']"), "lists"),
        (terms(10_000, " and ", "1"), "and"),
        (terms(5000, " ** ", "2"), "power"),
        (format!("x = 'a'{}\n", ".strip()".repeat(100)), "trailers"),
    ] {
        assert_eq!(
            evaluate_without_panic(&source, name).as_deref(),
            Some("SyntaxError"),
            "{name} chain must be rejected by the parser"
        );
    }
}

#[test]
fn test_setup_cfg_odd_inputs() {
    for content in [
        "[",
        "[]\n",
        "[options]\n  continuation without key\n",
        "[options]\ninstall_requires = %(\n",
        "[options]\na = %(a)s\ninstall_requires = %(a)s\n",
        "\u{feff}[options]\n",
        "[options]\n=value\n",
    ] {
        let result = std::panic::catch_unwind(|| IniDocument::parse(content, "setup.cfg"));
        assert!(result.is_ok(), "setup.cfg parser panicked on {content:?}");
    }
}
