//! Tokenizer for the Python subset
//!
//! Produces explicit `Newline`, `Indent` and `Dedent` tokens the way
//! CPython's tokenizer does. Newlines inside brackets and after a
//! backslash continuation are dropped. Formatted string bodies are kept
//! raw so the parser can split out their replacement fields.

use super::SandboxError;

const OPERATORS: [&str; 48] = [
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "==", "!=", "<=", ">=", "<<", ">>",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "!",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str {
        value: String,
        formatted: bool,
        raw: bool,
    },
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: &str) -> SandboxError {
        SandboxError::syntax(message, self.line)
    }

    fn run(&mut self) -> Result<(), SandboxError> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if !self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if matches!(self.peek_at(1), Some('\n' | '\r')) => {
                    self.pos += 1;
                    self.consume_newline();
                }
                '\n' | '\r' => {
                    if self.depth == 0 {
                        self.push(TokenKind::Newline);
                        at_line_start = true;
                    }
                    self.consume_newline();
                }
                c if c.is_alphabetic() || c == '_' => self.name_or_string()?,
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(false, false)?,
                _ => self.operator()?,
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected EOF while parsing"));
        }
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline | TokenKind::Dedent)
        ) {
            self.push(TokenKind::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::EndOfFile);
        Ok(())
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.pos += 1;
            if self.peek() == Some('\n') {
                self.pos += 1;
            }
        } else {
            self.pos += 1;
        }
        self.line += 1;
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Handle leading whitespace; returns `false` for blank or comment-only
    /// lines, which are consumed entirely.
    fn indentation(&mut self) -> Result<bool, SandboxError> {
        let mut column = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / 8 + 1) * 8,
                '\x0c' => column = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('#') => {
                self.skip_comment();
                if self.peek().is_some() {
                    self.consume_newline();
                }
                return Ok(false);
            }
            Some('\n' | '\r') => {
                self.consume_newline();
                return Ok(false);
            }
            Some('\\') if matches!(self.peek_at(1), Some('\n' | '\r')) => return Ok(true),
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if column > current {
            self.indents.push(column);
            self.push(TokenKind::Indent);
        } else if column < current {
            while self.indents.last().is_some_and(|&level| level > column) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != column {
                return Err(SandboxError {
                    class: "IndentationError".to_string(),
                    ..self.error("unindent does not match any outer indentation level")
                });
            }
        }
        Ok(true)
    }

    fn name_or_string(&mut self) -> Result<(), SandboxError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('\'' | '"')) {
            let prefix = name.to_lowercase();
            if matches!(
                prefix.as_str(),
                "r" | "u" | "b" | "f" | "rb" | "br" | "fr" | "rf"
            ) {
                return self.string(prefix.contains('r'), prefix.contains('f'));
            }
        }
        self.push(TokenKind::Name(name));
        Ok(())
    }

    fn number(&mut self) -> Result<(), SandboxError> {
        let start = self.pos;

        if self.peek() == Some('0')
            && let Some(radix_char) = self.peek_at(1)
        {
            let radix = match radix_char {
                'x' | 'X' => Some(16),
                'o' | 'O' => Some(8),
                'b' | 'B' => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                    self.pos += 1;
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| self.error("invalid number literal"))?;
                self.push(TokenKind::Int(value));
                return Ok(());
            }
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(self.error("complex literals are not supported"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| self.error("invalid number literal"))?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| self.error("integer literal too large"))?)
        };
        self.push(kind);
        Ok(())
    }

    fn string(&mut self, raw: bool, formatted: bool) -> Result<(), SandboxError> {
        let start_line = self.line;
        let Some(quote) = self.peek() else {
            return Err(self.error("unterminated string literal"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(SandboxError::syntax("unterminated string literal", start_line));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\\'
                && let Some(next) = self.peek_at(1)
            {
                body.push(c);
                body.push(next);
                self.pos += 2;
                if next == '\n' {
                    self.line += 1;
                }
                continue;
            }
            if (c == '\n' || c == '\r') && !triple {
                return Err(SandboxError::syntax("unterminated string literal", start_line));
            }
            if c == '\n' {
                self.line += 1;
            }
            body.push(c);
            self.pos += 1;
        }

        let value = if raw || formatted { body } else { unescape(&body) };
        self.tokens.push(Token {
            kind: TokenKind::Str {
                value,
                formatted,
                raw,
            },
            line: start_line,
        });
        Ok(())
    }

    fn operator(&mut self) -> Result<(), SandboxError> {
        let rest: String = self.chars[self.pos..self.chars.len().min(self.pos + 3)]
            .iter()
            .collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) else {
            return Err(self.error(&format!(
                "invalid character '{}'",
                self.peek().unwrap_or_default()
            )));
        };
        match *op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(TokenKind::Op(op));
        Ok(())
    }
}

/// Process backslash escapes of a non-raw string literal
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3
                    && let Some(&d) = chars.peek()
                    && ('0'..='7').contains(&d)
                {
                    digits.push(d);
                    chars.next();
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                match (digits.len() == width)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                {
                    Some(decoded) => {
                        out.push(decoded);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if x:\n    y = 1\nz\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name("if".into()),
                TokenKind::Name("x".into()),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("y".into()),
                TokenKind::Op("="),
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("z".into()),
                TokenKind::Newline,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("x = [\n  1,\n\n  2,\n]\n");
        assert!(!tokens[3..tokens.len() - 2].contains(&TokenKind::Newline));
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let tokens = kinds("# header\n\nx = 1  # trailing\n    # indented comment\ny = 2\n");
        assert!(!tokens.contains(&TokenKind::Indent));
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 2);
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#"a = 'it\'s' + "tab\t" + r'\d+' + '''multi
line'''"#);
        let strings: Vec<String> = tokens
            .into_iter()
            .filter_map(|t| match t {
                TokenKind::Str { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["it's", "tab\t", r"\d+", "multi\nline"]);
    }

    #[test]
    fn test_formatted_strings_stay_raw() {
        let tokens = kinds("f'{name}\\n'");
        assert_eq!(
            tokens[0],
            TokenKind::Str {
                value: "{name}\\n".into(),
                formatted: true,
                raw: false
            }
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("2.5e1")[0], TokenKind::Float(25.0));
    }

    #[test]
    fn test_bad_dedent_is_indentation_error() {
        let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
        assert_eq!(err.class, "IndentationError");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.class, "SyntaxError");
        assert_eq!(err.message, "unterminated string literal (setup.py, line 1)");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\x41\u00e9\101\q"), "aAéA\\q");
    }
}
