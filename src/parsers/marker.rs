//! Environment marker parsing and normalization
//!
//! Markers are kept as the flat `atom (and|or atom)*` sequence the source
//! spelled out, with explicit parentheses preserved as groups. Rendering
//! quotes every literal with double quotes and drops redundant parentheses
//! around single atoms, which is how `packaging` prints them.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::requirement::{Cursor, RequirementError, SyntaxKind};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:python_version|python_full_version|os[._]name|sys[._]platform|platform_(?:release|system)|platform[._](?:version|machine|python_implementation)|python_implementation|implementation_(?:name|version)|extras?|dependency_groups)\b",
    )
    .expect("marker variable regex")
});

static QUOTED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:'[^']*'|"[^"]*")"#).expect("quoted string regex"));

static BOOL_OP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:or|and)\b").expect("bool op regex"));

static IN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^in\b").expect("in regex"));

static NOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^not\b").expect("not regex"));

static COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:===|==|~=|!=|<=|>=|<|>)").expect("comparison regex"));

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("name separator regex"));

/// One side of a marker comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Variable(name) => f.write_str(name),
            MarkerValue::Literal(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerNode {
    Compare {
        lhs: MarkerValue,
        op: &'static str,
        rhs: MarkerValue,
    },
    Group(Vec<MarkerNode>),
    And,
    Or,
}

/// A parsed environment marker expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTree {
    nodes: Vec<MarkerNode>,
}

impl MarkerTree {
    /// Parse a standalone marker expression (the text after `;`)
    pub fn parse(text: &str) -> Result<Self, RequirementError> {
        let mut cursor = Cursor::new(text, SyntaxKind::Marker);
        let marker = parse_marker(&mut cursor)?;
        if !cursor.at_end() {
            return Err(cursor.error("Expected end of marker expression"));
        }
        Ok(marker)
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_list(&self.nodes, true))
    }
}

fn format_list(nodes: &[MarkerNode], first: bool) -> String {
    if let [only @ (MarkerNode::Compare { .. } | MarkerNode::Group(_))] = nodes {
        return format_node(only, true);
    }
    let inner = nodes
        .iter()
        .map(|node| format_node(node, false))
        .collect::<Vec<_>>()
        .join(" ");
    if first { inner } else { format!("({inner})") }
}

fn format_node(node: &MarkerNode, first: bool) -> String {
    match node {
        MarkerNode::Compare { lhs, op, rhs } => format!("{lhs} {op} {rhs}"),
        MarkerNode::Group(inner) => format_list(inner, first),
        MarkerNode::And => "and".to_string(),
        MarkerNode::Or => "or".to_string(),
    }
}

/// Parse `atom (boolop atom)*` starting at the cursor
pub(crate) fn parse_marker(cursor: &mut Cursor<'_>) -> Result<MarkerTree, RequirementError> {
    let nodes = parse_sequence(cursor)?;
    Ok(MarkerTree { nodes })
}

fn parse_sequence(cursor: &mut Cursor<'_>) -> Result<Vec<MarkerNode>, RequirementError> {
    let mut nodes = vec![parse_atom(cursor)?];
    while let Some(op) = cursor.eat_regex(&BOOL_OP) {
        nodes.push(if op == "and" {
            MarkerNode::And
        } else {
            MarkerNode::Or
        });
        nodes.push(parse_atom(cursor)?);
    }
    Ok(nodes)
}

fn parse_atom(cursor: &mut Cursor<'_>) -> Result<MarkerNode, RequirementError> {
    cursor.eat_ws();
    let node = if cursor.eat_char('(') {
        cursor.eat_ws();
        let inner = parse_sequence(cursor)?;
        cursor.eat_ws();
        if !cursor.eat_char(')') {
            return Err(cursor.error(
                "Expected matching RIGHT_PARENTHESIS for LEFT_PARENTHESIS, after marker expression",
            ));
        }
        MarkerNode::Group(inner)
    } else {
        parse_item(cursor)?
    };
    cursor.eat_ws();
    Ok(node)
}

fn parse_item(cursor: &mut Cursor<'_>) -> Result<MarkerNode, RequirementError> {
    cursor.eat_ws();
    let lhs = parse_value(cursor)?;
    cursor.eat_ws();
    let op = parse_op(cursor)?;
    cursor.eat_ws();
    let rhs = parse_value(cursor)?;
    cursor.eat_ws();
    Ok(normalize_extra(lhs, op, rhs))
}

fn parse_value(cursor: &mut Cursor<'_>) -> Result<MarkerValue, RequirementError> {
    if let Some(variable) = cursor.eat_regex(&VARIABLE) {
        let name = match variable {
            "python_implementation" => "platform_python_implementation",
            other => other,
        };
        return Ok(MarkerValue::Variable(name.to_string()));
    }
    if let Some(quoted) = cursor.eat_regex(&QUOTED_STRING) {
        return Ok(MarkerValue::Literal(quoted[1..quoted.len() - 1].to_string()));
    }
    Err(cursor.error("Expected a marker variable or quoted string"))
}

fn parse_op(cursor: &mut Cursor<'_>) -> Result<&'static str, RequirementError> {
    if cursor.eat_regex(&IN).is_some() {
        return Ok("in");
    }
    if cursor.eat_regex(&NOT).is_some() {
        cursor.eat_ws();
        if cursor.eat_regex(&IN).is_none() {
            return Err(cursor.error("Expected 'in' after 'not'"));
        }
        return Ok("not in");
    }
    match cursor.eat_regex(&COMPARISON) {
        Some("===") => Ok("==="),
        Some("==") => Ok("=="),
        Some("~=") => Ok("~="),
        Some("!=") => Ok("!="),
        Some("<=") => Ok("<="),
        Some(">=") => Ok(">="),
        Some("<") => Ok("<"),
        Some(">") => Ok(">"),
        _ => Err(cursor.error(
            "Expected marker operator, one of <=, <, !=, ==, >=, >, ~=, ===, in, not in",
        )),
    }
}

/// Values compared against `extra` are canonicalized like project names.
fn normalize_extra(lhs: MarkerValue, op: &'static str, rhs: MarkerValue) -> MarkerNode {
    let is_extra = |value: &MarkerValue| matches!(value, MarkerValue::Variable(name) if name == "extra");
    let (lhs, rhs) = match (lhs, rhs) {
        (lhs, MarkerValue::Literal(value)) if is_extra(&lhs) => {
            (lhs, MarkerValue::Literal(canonicalize_name(&value)))
        }
        (MarkerValue::Literal(value), rhs) if is_extra(&rhs) => {
            (MarkerValue::Literal(canonicalize_name(&value)), rhs)
        }
        other => other,
    };
    MarkerNode::Compare { lhs, op, rhs }
}

/// PEP 503 name normalization
pub fn canonicalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}
