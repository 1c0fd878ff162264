//! Recursive descent parser producing [`Stmt`] trees
//!
//! Follows the precedence levels of the Python grammar. Generators,
//! coroutines and pattern matching are rejected as unsupported.

use std::rc::Rc;

use super::SandboxError;
use super::ast::{
    Argument, BinOp, BoolOp, CmpOp, ComprehensionKind, Constant, DictItem, ExceptHandler, Expr,
    FormatPart, Generator, ImportName, Param, Parameters, Stmt, StmtKind, UnaryOp, WithItem,
};
use super::lexer::{Token, TokenKind, tokenize, unescape};

const KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Deepest expression or block nesting accepted
const MAX_NESTING: usize = 64;

/// Longest run of operators joined at one precedence level
const MAX_CHAIN_OPERATORS: usize = 1024;

const AUGMENTED: [(&str, BinOp); 13] = [
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("//=", BinOp::FloorDiv),
    ("%=", BinOp::Mod),
    ("**=", BinOp::Pow),
    ("@=", BinOp::MatMul),
    ("&=", BinOp::BitAnd),
    ("|=", BinOp::BitOr),
    ("^=", BinOp::BitXor),
    ("<<=", BinOp::LShift),
    (">>=", BinOp::RShift),
];

/// Parse a whole module
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SandboxError> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.module()
}

/// Parse a single expression, as `eval()` does
pub fn parse_expression(source: &str) -> Result<Expr, SandboxError> {
    let mut parser = Parser::new(tokenize(source.trim())?);
    let expr = parser.star_expressions()?;
    while matches!(parser.peek(), TokenKind::Newline) {
        parser.advance();
    }
    if !matches!(parser.peek(), TokenKind::EndOfFile) {
        return Err(parser.error());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        self.deepen()?;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn deepen(&mut self) -> Result<(), SandboxError> {
        if self.nesting >= MAX_NESTING {
            return Err(SandboxError::syntax("too many nested levels", self.line()));
        }
        self.nesting += 1;
        Ok(())
    }

    /// Count one more operator of a left-associative chain
    fn extend_chain(&self, operators: &mut usize) -> Result<(), SandboxError> {
        *operators += 1;
        if *operators > MAX_CHAIN_OPERATORS {
            return Err(SandboxError::syntax("too many chained operators", self.line()));
        }
        Ok(())
    }

    fn token_at(&self, offset: usize) -> Option<&Token> {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
    }

    fn peek(&self) -> &TokenKind {
        self.token_at(0)
            .map_or(&TokenKind::EndOfFile, |token| &token.kind)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.token_at(offset)
            .map_or(&TokenKind::EndOfFile, |token| &token.kind)
    }

    fn line(&self) -> usize {
        self.token_at(0).map_or(0, |token| token.line)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn error(&self) -> SandboxError {
        SandboxError::syntax("invalid syntax", self.line())
    }

    fn unsupported(&self, what: &str) -> SandboxError {
        SandboxError::syntax(&format!("unsupported syntax '{what}'"), self.line())
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(current) if *current == op)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Name(name) if name == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SandboxError> {
        if self.eat_op(op) { Ok(()) } else { Err(self.error()) }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SandboxError> {
        if self.eat_keyword(keyword) { Ok(()) } else { Err(self.error()) }
    }

    fn expect_name(&mut self) -> Result<String, SandboxError> {
        match self.peek() {
            TokenKind::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error()),
        }
    }

    fn expect_newline(&mut self) -> Result<(), SandboxError> {
        match self.peek() {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(())
            }
            TokenKind::EndOfFile => Ok(()),
            _ => Err(self.error()),
        }
    }

    /// Whether the next token can begin an expression
    fn starts_expression(&self) -> bool {
        match self.peek() {
            TokenKind::Name(name) => {
                !KEYWORDS.contains(&name.as_str())
                    || matches!(
                        name.as_str(),
                        "not" | "lambda" | "None" | "True" | "False" | "await"
                    )
            }
            TokenKind::Int(_) | TokenKind::Float(_) | TokenKind::Str { .. } => true,
            TokenKind::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~" | "*" | "..."),
            _ => false,
        }
    }

    // ----- statements -----

    fn module(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => return Err(self.indentation_error("unexpected indent")),
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn indentation_error(&self, message: &str) -> SandboxError {
        SandboxError {
            class: "IndentationError".to_string(),
            ..SandboxError::syntax(message, self.line())
        }
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let line = self.line();
        let kind = match self.peek() {
            TokenKind::Name(name) => match name.as_str() {
                "if" => self.if_statement()?,
                "while" => self.while_statement()?,
                "for" => self.for_statement()?,
                "try" => self.try_statement()?,
                "with" => self.with_statement()?,
                "def" => self.function_def(Vec::new())?,
                "class" => self.class_def(Vec::new())?,
                "async" => return Err(self.unsupported("async")),
                _ => return self.simple_statements(),
            },
            TokenKind::Op("@") => self.decorated()?,
            _ => return self.simple_statements(),
        };
        Ok(vec![Stmt { line, kind }])
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.nested(Self::block_body)
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.expect_op(":")?;
        if !matches!(self.peek(), TokenKind::Newline) {
            return self.simple_statements();
        }
        self.advance();
        if !matches!(self.peek(), TokenKind::Indent) {
            return Err(self.indentation_error("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut statements = Vec::new();
        loop {
            let line = self.line();
            let kind = self.small_statement()?;
            statements.push(Stmt { line, kind });
            if !self.eat_op(";") {
                break;
            }
            if matches!(self.peek(), TokenKind::Newline | TokenKind::EndOfFile) {
                break;
            }
        }
        self.expect_newline()?;
        Ok(statements)
    }

    fn small_statement(&mut self) -> Result<StmtKind, SandboxError> {
        if let TokenKind::Name(name) = self.peek() {
            match name.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(StmtKind::Pass);
                }
                "break" => {
                    self.advance();
                    return Ok(StmtKind::Break);
                }
                "continue" => {
                    self.advance();
                    return Ok(StmtKind::Continue);
                }
                "return" => {
                    self.advance();
                    let value = if self.starts_expression() {
                        Some(self.star_expressions()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Return(value));
                }
                "raise" => {
                    self.advance();
                    let exception = if self.starts_expression() {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    let cause = if self.eat_keyword("from") {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Raise { exception, cause });
                }
                "global" | "nonlocal" => {
                    let is_global = name == "global";
                    self.advance();
                    let mut names = vec![self.expect_name()?];
                    while self.eat_op(",") {
                        names.push(self.expect_name()?);
                    }
                    return Ok(if is_global {
                        StmtKind::Global(names)
                    } else {
                        StmtKind::Nonlocal(names)
                    });
                }
                "del" => {
                    self.advance();
                    let targets = match self.target_list()? {
                        Expr::Tuple(items) => items,
                        single => vec![single],
                    };
                    return Ok(StmtKind::Delete(targets));
                }
                "assert" => {
                    self.advance();
                    let test = self.expression()?;
                    let message = if self.eat_op(",") {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Assert { test, message });
                }
                "import" => return self.import(),
                "from" => return self.import_from(),
                "yield" => return Err(self.unsupported("yield")),
                _ => {}
            }
        }
        self.expression_statement()
    }

    fn expression_statement(&mut self) -> Result<StmtKind, SandboxError> {
        let first = self.star_expressions()?;

        if self.is_op("=") {
            let mut targets = vec![first];
            self.advance();
            let mut value = self.assignment_value()?;
            while self.eat_op("=") {
                targets.push(value);
                value = self.assignment_value()?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }

        if let TokenKind::Op(op) = self.peek()
            && let Some((_, bin_op)) = AUGMENTED.iter().find(|(symbol, _)| symbol == op)
        {
            let op = *bin_op;
            self.advance();
            let value = self.assignment_value()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.eat_op(":") {
            self.expression()?;
            let value = if self.eat_op("=") {
                Some(self.assignment_value()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                value,
            });
        }

        Ok(StmtKind::Expr(first))
    }

    fn assignment_value(&mut self) -> Result<Expr, SandboxError> {
        if self.is_keyword("yield") {
            return Err(self.unsupported("yield"));
        }
        self.star_expressions()
    }

    fn dotted_name(&mut self) -> Result<String, SandboxError> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import(&mut self) -> Result<StmtKind, SandboxError> {
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let alias = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn import_from(&mut self) -> Result<StmtKind, SandboxError> {
        self.expect_keyword("from")?;
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.is_keyword("import") {
            String::new()
        } else {
            self.dotted_name()?
        };
        self.expect_keyword("import")?;

        let mut names = Vec::new();
        if self.eat_op("*") {
            names.push(ImportName {
                name: "*".to_string(),
                alias: None,
            });
            return Ok(StmtKind::ImportFrom {
                module,
                level,
                names,
            });
        }

        let parenthesized = self.eat_op("(");
        loop {
            if parenthesized && self.is_op(")") {
                break;
            }
            let name = self.expect_name()?;
            let alias = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat_op(",") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            level,
            names,
        })
    }

    fn if_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.is_keyword("elif") {
            let line = self.line();
            let kind = self.if_statement()?;
            vec![Stmt { line, kind }]
        } else if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    fn while_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::While { test, body, orelse })
    }

    fn for_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.star_expressions()?;
        let body = self.block()?;
        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn try_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            if self.eat_op("*") {
                return Err(self.unsupported("except*"));
            }
            let kind = if self.is_op(":") {
                None
            } else {
                Some(self.expression()?)
            };
            let name = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(ExceptHandler { kind, name, body });
        }

        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_keyword("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error());
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        let mut items = Vec::new();
        loop {
            let context = self.expression()?;
            let target = if self.eat_keyword("as") {
                Some(self.star_target()?)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.block()?;
        Ok(StmtKind::With { items, body })
    }

    fn decorated(&mut self) -> Result<StmtKind, SandboxError> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_expression()?);
            self.expect_newline()?;
        }
        if self.is_keyword("def") {
            self.function_def(decorators)
        } else if self.is_keyword("class") {
            self.class_def(decorators)
        } else {
            Err(self.error())
        }
    }

    fn function_def(&mut self, decorators: Vec<Expr>) -> Result<StmtKind, SandboxError> {
        self.expect_keyword("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parameters(")", true)?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expression()?;
        }
        let body = self.block()?;
        Ok(StmtKind::FunctionDef {
            name,
            params: Rc::new(params),
            body: Rc::new(body),
            decorators,
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> Result<StmtKind, SandboxError> {
        self.expect_keyword("class")?;
        let name = self.expect_name()?;
        let bases = if self.eat_op("(") {
            let args = self.arguments()?;
            self.expect_op(")")?;
            args
        } else {
            Vec::new()
        };
        let body = self.block()?;
        Ok(StmtKind::ClassDef {
            name,
            bases,
            body,
            decorators,
        })
    }

    fn parameters(&mut self, closing: &str, annotations: bool) -> Result<Parameters, SandboxError> {
        let mut params = Parameters::default();
        let mut keyword_only = false;

        while !self.is_op(closing) {
            if self.eat_op("/") {
                // positional-only marker
            } else if self.eat_op("**") {
                params.kwarg = Some(self.expect_name()?);
                if annotations && self.eat_op(":") {
                    self.expression()?;
                }
            } else if self.eat_op("*") {
                keyword_only = true;
                if !self.is_op(",") && !self.is_op(closing) {
                    params.vararg = Some(self.expect_name()?);
                    if annotations && self.eat_op(":") {
                        self.expression()?;
                    }
                }
            } else {
                let name = self.expect_name()?;
                if annotations && self.eat_op(":") {
                    self.expression()?;
                }
                let default = if self.eat_op("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                let param = Param { name, default };
                if keyword_only {
                    params.keyword_only.push(param);
                } else {
                    params.positional.push(param);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    // ----- expressions -----

    fn star_expressions(&mut self) -> Result<Expr, SandboxError> {
        let first = self.star_expression()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.star_expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_expression(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.bit_or()?)));
        }
        self.named_expression()
    }

    fn named_expression(&mut self) -> Result<Expr, SandboxError> {
        if let TokenKind::Name(name) = self.peek()
            && matches!(self.peek_at(1), TokenKind::Op(":="))
        {
            let target = name.clone();
            self.pos += 2;
            let value = self.expression()?;
            return Ok(Expr::NamedExpr {
                target,
                value: Box::new(value),
            });
        }
        self.expression()
    }

    fn expression(&mut self) -> Result<Expr, SandboxError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_keyword("lambda") {
            let params = self.parameters(":", false)?;
            self.expect_op(":")?;
            let body = self.expression()?;
            return Ok(Expr::Lambda {
                params: Rc::new(params),
                body: Rc::new(body),
            });
        }

        let body = self.disjunction()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.disjunction()?;
        self.expect_keyword("else")?;
        let orelse = self.expression()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn disjunction(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.conjunction()?;
        let mut operators = 0;
        while self.eat_keyword("or") {
            self.extend_chain(&mut operators)?;
            let right = self.conjunction()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.inversion()?;
        let mut operators = 0;
        while self.eat_keyword("and") {
            self.extend_chain(&mut operators)?;
            let right = self.inversion()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn inversion(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::inversion)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison_operator(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(name) if name == "in" => CmpOp::In,
            TokenKind::Name(name) if name == "not" => {
                if !matches!(self.peek_at(1), TokenKind::Name(next) if next == "in") {
                    return None;
                }
                self.pos += 1;
                CmpOp::NotIn
            }
            TokenKind::Name(name) if name == "is" => {
                if matches!(self.peek_at(1), TokenKind::Name(next) if next == "not") {
                    self.pos += 1;
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, SandboxError> {
        let left = self.bit_or()?;
        let mut comparisons = Vec::new();
        while let Some(op) = self.comparison_operator() {
            comparisons.push((op, self.bit_or()?));
        }
        if comparisons.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            comparisons,
        })
    }

    fn binary_level(
        &mut self,
        operators: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, SandboxError>,
    ) -> Result<Expr, SandboxError> {
        let mut left = next(self)?;
        let mut count = 0;
        loop {
            let Some(op) = operators
                .iter()
                .find(|(symbol, _)| self.is_op(symbol))
                .map(|(_, op)| *op)
            else {
                break;
            };
            self.extend_chain(&mut count)?;
            self.advance();
            let right = next(self)?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn bit_or(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::sum)
    }

    fn sum(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMul),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, SandboxError> {
        let op = match self.peek() {
            TokenKind::Op("-") => UnaryOp::Neg,
            TokenKind::Op("+") => UnaryOp::Pos,
            TokenKind::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Self::factor)?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, SandboxError> {
        if self.is_keyword("await") {
            return Err(self.unsupported("await"));
        }
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::BinOp {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, SandboxError> {
        let expr = self.atom()?;
        let outer = self.nesting;
        let result = self.trailers(expr);
        self.nesting = outer;
        result
    }

    /// Attribute, call and subscript suffixes; each one nests a level
    fn trailers(&mut self, mut expr: Expr) -> Result<Expr, SandboxError> {
        loop {
            if !(self.is_op(".") || self.is_op("(") || self.is_op("[")) {
                break;
            }
            self.deepen()?;
            if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("(") {
                let args = self.arguments()?;
                self.expect_op(")")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_op("[") {
                let index = self.slices()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Argument>, SandboxError> {
        let mut args = Vec::new();
        while !self.is_op(")") {
            if self.eat_op("**") {
                args.push(Argument::DoubleStarred(self.expression()?));
            } else if self.eat_op("*") {
                args.push(Argument::Starred(self.expression()?));
            } else if let TokenKind::Name(name) = self.peek()
                && matches!(self.peek_at(1), TokenKind::Op("="))
            {
                let name = name.clone();
                self.pos += 2;
                args.push(Argument::Keyword(name, self.expression()?));
            } else {
                let value = self.named_expression()?;
                if self.is_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    args.push(Argument::Positional(Expr::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(value),
                        value: None,
                        generators,
                    }));
                } else {
                    args.push(Argument::Positional(value));
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(args)
    }

    fn slices(&mut self) -> Result<Expr, SandboxError> {
        let first = self.slice()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.slice()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn slice(&mut self) -> Result<Expr, SandboxError> {
        let lower = if self.is_op(":") {
            None
        } else {
            let expr = self.star_expression()?;
            if !self.is_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let upper = if self.is_op(":") || self.is_op("]") || self.is_op(",") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat_op(":") && !self.is_op("]") && !self.is_op(",") {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Generator>, SandboxError> {
        let mut generators = Vec::new();
        while self.eat_keyword("for") {
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.disjunction()?;
            let mut conditions = Vec::new();
            while self.eat_keyword("if") {
                conditions.push(self.disjunction()?);
            }
            generators.push(Generator {
                target,
                iter,
                conditions,
            });
        }
        if self.is_keyword("async") {
            return Err(self.unsupported("async"));
        }
        Ok(generators)
    }

    fn target_list(&mut self) -> Result<Expr, SandboxError> {
        let first = self.star_target()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_keyword("in") || self.is_op("=") || !self.starts_expression() {
                break;
            }
            items.push(self.star_target()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_target(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.bit_or()?)));
        }
        self.bit_or()
    }

    fn atom(&mut self) -> Result<Expr, SandboxError> {
        let line = self.line();
        match self.advance() {
            TokenKind::Name(name) => match name.as_str() {
                "None" => Ok(Expr::Constant(Constant::None)),
                "True" => Ok(Expr::Constant(Constant::Bool(true))),
                "False" => Ok(Expr::Constant(Constant::Bool(false))),
                "yield" | "await" | "async" => Err(self.unsupported(&name)),
                keyword if KEYWORDS.contains(&keyword) => Err(SandboxError::syntax("invalid syntax", line)),
                _ => Ok(Expr::Name(name)),
            },
            TokenKind::Int(value) => Ok(Expr::Constant(Constant::Int(value))),
            TokenKind::Float(value) => Ok(Expr::Constant(Constant::Float(value))),
            TokenKind::Str {
                value,
                formatted,
                raw,
            } => self.strings(value, formatted, raw, line),
            TokenKind::Op("...") => Ok(Expr::Constant(Constant::Ellipsis)),
            TokenKind::Op("(") => self.parenthesized(),
            TokenKind::Op("[") => self.list_display(),
            TokenKind::Op("{") => self.brace_display(),
            _ => Err(SandboxError::syntax("invalid syntax", line)),
        }
    }

    /// Adjacent literals concatenate; any f-string makes the whole a format
    fn strings(
        &mut self,
        first: String,
        formatted: bool,
        raw: bool,
        line: usize,
    ) -> Result<Expr, SandboxError> {
        let mut pieces = vec![(first, formatted, raw)];
        while let TokenKind::Str {
            value,
            formatted,
            raw,
        } = self.peek()
        {
            pieces.push((value.clone(), *formatted, *raw));
            self.advance();
        }

        if pieces.iter().all(|(_, formatted, _)| !formatted) {
            let joined: String = pieces.into_iter().map(|(value, _, _)| value).collect();
            return Ok(Expr::Constant(Constant::Str(joined)));
        }

        let mut parts = Vec::new();
        for (value, formatted, raw) in pieces {
            if formatted {
                parts.extend(parse_format_string(&value, raw, line)?);
            } else {
                parts.push(FormatPart::Literal(value));
            }
        }
        Ok(Expr::FormattedString(parts))
    }

    fn parenthesized(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.is_keyword("yield") {
            return Err(self.unsupported("yield"));
        }
        let first = self.star_expression()?;
        if self.is_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        if !self.is_op(",") {
            self.expect_op(")")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op(")") {
                break;
            }
            items.push(self.star_expression()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_display(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.star_expression()?;
        if self.is_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.star_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn brace_display(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }

        let first_item = if self.eat_op("**") {
            DictItem::Unpack(self.bit_or()?)
        } else {
            let first = self.star_expression()?;
            if !self.eat_op(":") {
                return self.set_display(first);
            }
            let value = self.expression()?;
            if self.is_keyword("for") {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::Comprehension {
                    kind: ComprehensionKind::Dict,
                    element: Box::new(first),
                    value: Some(Box::new(value)),
                    generators,
                });
            }
            DictItem::Pair(first, value)
        };

        let mut items = vec![first_item];
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            if self.eat_op("**") {
                items.push(DictItem::Unpack(self.bit_or()?));
            } else {
                let key = self.expression()?;
                self.expect_op(":")?;
                let value = self.expression()?;
                items.push(DictItem::Pair(key, value));
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(items))
    }

    fn set_display(&mut self, first: Expr) -> Result<Expr, SandboxError> {
        if self.is_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            items.push(self.star_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(items))
    }
}

/// Split an f-string body into literal text and replacement fields
fn parse_format_string(body: &str, raw: bool, line: usize) -> Result<Vec<FormatPart>, SandboxError> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, parts: &mut Vec<FormatPart>| {
        if !literal.is_empty() {
            let text = if raw {
                std::mem::take(literal)
            } else {
                unescape(&std::mem::take(literal))
            };
            parts.push(FormatPart::Literal(text));
        }
    };

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(SandboxError::syntax(
                    "f-string: single '}' is not allowed",
                    line,
                ));
            }
            '{' => {
                flush(&mut literal, &mut parts);
                let (field, next) = replacement_field(&chars, i + 1, line)?;
                parts.push(field);
                i = next;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut parts);
    Ok(parts)
}

/// Parse `expr[!conv][:spec]}` starting after the opening brace.
/// Format specs are accepted but not applied.
fn replacement_field(chars: &[char], start: usize, line: usize) -> Result<(FormatPart, usize), SandboxError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut expr_end = None;
    let mut conversion = None;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') && expr_end.is_none() => {
                expr_end = Some(i);
                conversion = chars.get(i + 1).copied();
                i += 1;
            }
            ':' if depth == 0 => {
                expr_end.get_or_insert(i);
                let mut nested = 0usize;
                while i < chars.len() {
                    match chars[i] {
                        '{' => nested += 1,
                        '}' if nested == 0 => break,
                        '}' => nested -= 1,
                        _ => {}
                    }
                    i += 1;
                }
                continue;
            }
            '}' => {
                let end = expr_end.unwrap_or(i);
                let mut text: String = chars[start..end].iter().collect();
                if text.trim_end().ends_with('=') && !text.trim_end().ends_with("==") {
                    text = text.trim_end().trim_end_matches('=').to_string();
                }
                if text.trim().is_empty() {
                    return Err(SandboxError::syntax("f-string: empty expression not allowed", line));
                }
                let expr = parse_expression(&format!("({text})"))
                    .map_err(|err| SandboxError::syntax("f-string: invalid syntax", err.line.unwrap_or(line)))?;
                return Ok((FormatPart::Field { expr, conversion }, i + 1));
            }
            _ => {}
        }
        i += 1;
    }
    Err(SandboxError::syntax("f-string: expecting '}'", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Stmt> {
        parse_program(source).unwrap()
    }

    #[test]
    fn test_setup_call_with_keywords() {
        let program = parse("setup(name='x', install_requires=['a', 'b'], **extra)\n");
        assert_eq!(program.len(), 1);
        let StmtKind::Expr(Expr::Call { args, .. }) = &program[0].kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[0], Argument::Keyword(name, _) if name == "name"));
        assert!(matches!(&args[2], Argument::DoubleStarred(_)));
    }

    #[test]
    fn test_compound_statements() {
        let program = parse(
            "import os, sys as system\n\
             from setuptools import (setup,\n    find_packages)\n\
             if sys.version_info >= (3, 0):\n    x = 1\nelif y:\n    x = 2\nelse:\n    x = 3\n\
             for a, b in items:\n    pass\n\
             try:\n    import foo\nexcept (ImportError, OSError) as e:\n    foo = None\nfinally:\n    pass\n\
             with fake_open('x') as f:\n    data = f.read()\n\
             def helper(a, b=1, *args, c, **kwargs) -> str:\n    return a\n\
             class Cmd(Base):\n    x = 1\n    def run(self): pass\n",
        );
        assert_eq!(program.len(), 8);
        assert!(matches!(program[2].kind, StmtKind::If { .. }));
        assert!(matches!(program[5].kind, StmtKind::With { .. }));
        let StmtKind::FunctionDef { params, .. } = &program[6].kind else {
            panic!("expected def");
        };
        assert_eq!(params.positional.len(), 2);
        assert_eq!(params.vararg.as_deref(), Some("args"));
        assert_eq!(params.keyword_only.len(), 1);
        assert_eq!(params.kwarg.as_deref(), Some("kwargs"));
    }

    #[test]
    fn test_statement_lines() {
        let program = parse("a = 1\n\n\nb = [\n  1,\n]\nc = 3\n");
        let lines: Vec<usize> = program.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 4, 7]);
    }

    #[test]
    fn test_comprehensions_and_lambdas() {
        parse("x = [l.strip() for l in lines if l and not l.startswith('#')]\n");
        parse("d = {k: v for k, v in pairs}\n");
        parse("s = {a for a in b}\n");
        parse("t = sum(len(x) for x in xs)\n");
        parse("f = lambda x, y=2: x + y\n");
        parse("v = a if cond else b\n");
        parse("z = x[1:], y[::2], w[-1]\n");
    }

    #[test]
    fn test_format_strings() {
        let program = parse("s = f'{name!r}-{{literal}}-{value:>10}' 'tail'\n");
        let StmtKind::Assign { value, .. } = &program[0].kind else {
            panic!("expected assignment");
        };
        let Expr::FormattedString(parts) = value else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 4);
        assert!(matches!(&parts[0], FormatPart::Field { conversion: Some('r'), .. }));
        assert!(matches!(&parts[1], FormatPart::Literal(text) if text == "-{literal}-"));
        assert!(matches!(&parts[3], FormatPart::Literal(text) if text == "tail"));
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_program("setup(\n").unwrap_err();
        assert_eq!(err.class, "SyntaxError");

        let err = parse_program("x = = 1\n").unwrap_err();
        assert_eq!(err.message, "invalid syntax (setup.py, line 1)");

        let err = parse_program("def gen():\n    yield 1\n").unwrap_err();
        assert!(err.message.starts_with("unsupported syntax 'yield'"));

        let err = parse_program("  x = 1\n").unwrap_err();
        assert_eq!(err.class, "IndentationError");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("x = {}1{}\n", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&deep).unwrap_err();
        assert!(err.message.starts_with("too many nested levels"));
        assert!(parse_program(&format!("x = {}\n", "-".repeat(1000) + "1")).is_err());

        let calls = format!("x = s{}\n", ".strip()".repeat(80));
        let err = parse_program(&calls).unwrap_err();
        assert!(err.message.starts_with("too many nested levels"));
        assert!(parse_program(&format!("x = s{}\n", ".strip()".repeat(20))).is_ok());
    }

    #[test]
    fn test_operator_chain_limit() {
        let long = format!("x = {}\n", vec!["1"; 2000].join(" + "));
        let err = parse_program(&long).unwrap_err();
        assert!(err.message.starts_with("too many chained operators"));

        let ok = format!("x = {}\n", vec!["1"; 500].join(" | "));
        assert!(parse_program(&ok).is_ok());
    }

    #[test]
    fn test_parse_expression() {
        assert!(matches!(
            parse_expression(" 1 + 2 ").unwrap(),
            Expr::BinOp { op: BinOp::Add, .. }
        ));
        assert!(parse_expression("1 +").is_err());
    }
}
