//! Tree-walking evaluator for sanitized setup scripts
//!
//! Statements run against explicit frames: a module frame whose locals are
//! the globals, function frames with captured enclosing scopes, and class
//! frames whose namespace becomes the class attributes. Exceptions unwind
//! as [`Unwind::Raise`] and can be caught; budget exhaustion unwinds as
//! [`Unwind::Fatal`] and cannot.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::iter;
use std::rc::Rc;

use super::ast::{
    Argument, BinOp, BoolOp, CmpOp, ComprehensionKind, Constant, DictItem, Expr, FormatPart,
    Generator, ImportName, Stmt, StmtKind, UnaryOp,
};
use super::builtins;
use super::parser::{parse_expression, parse_program};
use super::recorder::SetupRecorder;
use super::value::{
    Builtin, Class, Dict, Exception, Exec, Function, FunctionBody, Instance, Method, Scope, Unwind, Value,
    class_matches, exception_type, new_scope, raise, type_error,
};
use super::{SCRIPT_NAME, SandboxError};
use crate::config::SandboxConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Module,
    Function,
    Class,
}

/// Name resolution context of the code being executed
#[derive(Clone)]
pub(super) struct Frame {
    pub(super) locals: Scope,
    enclosing: Rc<[Scope]>,
    pub(super) globals: Scope,
    declared_global: HashSet<String>,
    declared_nonlocal: HashSet<String>,
    kind: FrameKind,
}

impl Frame {
    fn module(globals: Scope) -> Self {
        Frame {
            locals: Rc::clone(&globals),
            enclosing: Vec::new().into(),
            globals,
            declared_global: HashSet::new(),
            declared_nonlocal: HashSet::new(),
            kind: FrameKind::Module,
        }
    }

    fn nested(&self, kind: FrameKind) -> Self {
        Frame {
            locals: new_scope(),
            enclosing: self.closure(),
            globals: Rc::clone(&self.globals),
            declared_global: HashSet::new(),
            declared_nonlocal: HashSet::new(),
            kind,
        }
    }

    /// Scopes visible to functions defined in this frame. Class bodies
    /// are not part of their methods' closures.
    fn closure(&self) -> Rc<[Scope]> {
        match self.kind {
            FrameKind::Module => Vec::new().into(),
            FrameKind::Function => self
                .enclosing
                .iter()
                .cloned()
                .chain(iter::once(Rc::clone(&self.locals)))
                .collect(),
            FrameKind::Class => Rc::clone(&self.enclosing),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: Scope,
    recorder: Rc<RefCell<SetupRecorder>>,
    file_content: Rc<str>,
    modules: HashMap<String, Value>,
    /// Exceptions being handled, innermost last, for bare `raise`
    handling: Vec<Value>,
    globals_view: Option<Rc<RefCell<Dict>>>,
    steps: u64,
    step_limit: u64,
    depth: usize,
    max_depth: usize,
    line: usize,
}

impl Interpreter {
    pub fn new(config: &SandboxConfig, recorder: Rc<RefCell<SetupRecorder>>) -> Self {
        let globals = new_scope();
        {
            let mut scope = globals.borrow_mut();
            for (name, value) in config.placeholders.globals() {
                scope.insert(name, Value::string(value));
            }
            scope.insert("__name__".into(), Value::string("__main__"));
            scope.insert("__file__".into(), Value::string(SCRIPT_NAME));
            scope.insert("noop".into(), Value::Builtin(Builtin::Noop));
            scope.insert("print".into(), Value::Builtin(Builtin::Noop));
            scope.insert("fake_parse".into(), Value::Builtin(Builtin::FakeParse));
            for name in ["fake_open", "open", "file"] {
                scope.insert(name.into(), Value::Builtin(Builtin::FakeOpen));
            }
        }

        Interpreter {
            globals,
            recorder,
            file_content: config.placeholders.file_content().into(),
            modules: HashMap::new(),
            handling: Vec::new(),
            globals_view: None,
            steps: 0,
            step_limit: config.step_limit,
            depth: 0,
            max_depth: config.max_call_depth,
            line: 0,
        }
    }

    /// Execute a module body
    pub fn run(&mut self, program: &[Stmt]) -> Result<(), SandboxError> {
        let mut frame = Frame::module(Rc::clone(&self.globals));
        match self.exec_block(program, &mut frame) {
            Ok(_) => Ok(()),
            Err(Unwind::Fatal(err)) => Err(err.at_line(self.line)),
            Err(Unwind::Raise(exception)) => Err(self.uncaught(&exception)),
        }
    }

    fn uncaught(&self, exception: &Value) -> SandboxError {
        let (class, message) = match exception {
            Value::Exception(exc) => (exc.class_name(), exc.message()),
            other => ("TypeError".to_string(), format!("uncaught {}", other.type_name())),
        };
        tracing::debug!("setup.py raised {class} at line {}", self.line);
        SandboxError::new(class, message).at_line(self.line)
    }

    pub(super) fn recorder(&self) -> &Rc<RefCell<SetupRecorder>> {
        &self.recorder
    }

    pub(super) fn file_content(&self) -> Rc<str> {
        Rc::clone(&self.file_content)
    }

    fn tick(&mut self) -> Exec<()> {
        self.charge(1)
    }

    /// Spend evaluation budget; running out is not catchable
    pub(super) fn charge(&mut self, amount: usize) -> Exec<()> {
        self.steps = self.steps.saturating_add(amount as u64);
        if self.steps > self.step_limit {
            return Err(Unwind::Fatal(SandboxError::new(
                "RuntimeError",
                format!(
                    "evaluation step budget of {} exhausted",
                    self.step_limit
                ),
            )));
        }
        Ok(())
    }

    // ----- statements -----

    fn exec_block(&mut self, body: &[Stmt], frame: &mut Frame) -> Exec<Flow> {
        for stmt in body {
            self.line = stmt.line;
            self.tick()?;
            let flow = self.exec_stmt(stmt, frame)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &mut Frame) -> Exec<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target, frame)?;
                let operand = self.eval(value, frame)?;
                let result = if let (BinOp::Add, Value::List(items)) = (op, &current) {
                    let extra = builtins::iterate(&operand)?;
                    items.borrow_mut().extend(extra);
                    current.clone()
                } else {
                    self.binary_op(*op, &current, &operand)?
                };
                self.assign(target, result, frame)?;
            }
            StmtKind::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let value = self.eval(value, frame)?;
                    self.assign(target, value, frame)?;
                }
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, frame)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, frame);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, frame)?;
                for item in builtins::iterate(&iterable)? {
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            StmtKind::While { test, body, orelse } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, frame)?.truthy() {
                        return self.exec_block(orelse, frame);
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
            } => {
                let mut defaults = HashMap::new();
                for param in params.positional.iter().chain(&params.keyword_only) {
                    if let Some(default) = &param.default {
                        defaults.insert(param.name.clone(), self.eval(default, frame)?);
                    }
                }
                let function = Value::Function(Rc::new(Function {
                    name: name.clone(),
                    params: Rc::clone(params),
                    defaults,
                    body: FunctionBody::Block(Rc::clone(body)),
                    closure: frame.closure(),
                    globals: Rc::clone(&frame.globals),
                }));
                let function = self.decorate(function, decorators, frame)?;
                self.store_name(name, function, frame);
            }
            StmtKind::ClassDef {
                name,
                bases,
                body,
                decorators,
            } => {
                let mut base_values = Vec::new();
                for base in bases {
                    if let Argument::Positional(expr) = base {
                        base_values.push(self.eval(expr, frame)?);
                    }
                }
                let mut class_frame = frame.nested(FrameKind::Class);
                self.exec_block(body, &mut class_frame)?;
                let attrs = class_frame.locals.take();
                let class = Value::Class(Rc::new(Class {
                    name: name.clone(),
                    bases: base_values,
                    attrs: RefCell::new(attrs),
                }));
                let class = self.decorate(class, decorators, frame)?;
                self.store_name(name, class, frame);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(names) => {
                for ImportName { name, alias } in names {
                    let module = self.import_module(name);
                    match alias {
                        Some(alias) => self.store_name(alias, module, frame),
                        None => {
                            let top = name.split('.').next().unwrap_or(name);
                            let package = self.import_module(top);
                            self.store_name(top, package, frame);
                        }
                    }
                }
            }
            StmtKind::ImportFrom {
                module,
                level,
                names,
            } => {
                let source = if *level > 0 {
                    Value::Opaque
                } else {
                    self.import_module(module)
                };
                for ImportName { name, alias } in names {
                    if name == "*" {
                        if let Value::Module(module) = &source {
                            for (key, value) in module.attrs.borrow().iter() {
                                if !key.starts_with('_') {
                                    frame.locals.borrow_mut().insert(key.clone(), value.clone());
                                }
                            }
                        }
                        continue;
                    }
                    let value = match builtins::get_attr(&source, name)? {
                        Value::Opaque if matches!(source, Value::Module(_)) => {
                            self.import_module(&format!("{module}.{name}"))
                        }
                        value => value,
                    };
                    self.store_name(alias.as_ref().unwrap_or(name), value, frame);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, frame),
            StmtKind::With { items, body } => return self.exec_with(items, body, frame),
            StmtKind::Raise { exception, cause } => {
                let Some(exception) = exception else {
                    return Err(match self.handling.last() {
                        Some(active) => Unwind::Raise(active.clone()),
                        None => raise("RuntimeError", "No active exception to reraise"),
                    });
                };
                let value = self.eval(exception, frame)?;
                if let Some(cause) = cause {
                    self.eval(cause, frame)?;
                }
                return Err(Unwind::Raise(self.to_exception(value)?));
            }
            StmtKind::Global(names) => frame.declared_global.extend(names.iter().cloned()),
            StmtKind::Nonlocal(names) => frame.declared_nonlocal.extend(names.iter().cloned()),
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, frame)?;
                }
            }
            StmtKind::Assert { test, message } => {
                if !self.eval(test, frame)?.truthy() {
                    let args = match message {
                        Some(message) => vec![self.eval(message, frame)?],
                        None => Vec::new(),
                    };
                    return Err(Unwind::Raise(Value::Exception(Rc::new(Exception {
                        class: Value::ExceptionType("AssertionError"),
                        args,
                    }))));
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn decorate(&mut self, mut value: Value, decorators: &[Expr], frame: &Frame) -> Exec<Value> {
        for decorator in decorators.iter().rev() {
            let decorator = self.eval(decorator, frame)?;
            value = self.call(&decorator, vec![value], Vec::new(), frame)?;
        }
        Ok(value)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[super::ast::ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        frame: &mut Frame,
    ) -> Exec<Flow> {
        let outcome = match self.exec_block(body, frame) {
            Ok(Flow::Normal) => self.exec_block(orelse, frame),
            Err(Unwind::Raise(exception)) => self.handle(exception, handlers, frame),
            other => other,
        };

        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, frame)? {
            Flow::Normal => outcome,
            overriding => Ok(overriding),
        }
    }

    fn handle(
        &mut self,
        exception: Value,
        handlers: &[super::ast::ExceptHandler],
        frame: &mut Frame,
    ) -> Exec<Flow> {
        let class = match &exception {
            Value::Exception(exc) => exc.class.clone(),
            _ => Value::None,
        };

        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    let kind = self.eval(kind, frame)?;
                    handler_matches(&class, &kind)
                }
            };
            if !matched {
                continue;
            }
            if let Some(name) = &handler.name {
                self.store_name(name, exception.clone(), frame);
            }
            self.handling.push(exception);
            let result = self.exec_block(&handler.body, frame);
            self.handling.pop();
            if let Some(name) = &handler.name {
                frame.locals.borrow_mut().remove(name);
            }
            return result;
        }
        Err(Unwind::Raise(exception))
    }

    fn exec_with(
        &mut self,
        items: &[super::ast::WithItem],
        body: &[Stmt],
        frame: &mut Frame,
    ) -> Exec<Flow> {
        let Some((item, rest)) = items.split_first() else {
            return self.exec_block(body, frame);
        };

        let context = self.eval(&item.context, frame)?;
        let entered = match &context {
            Value::Instance(instance) => match instance.class.lookup("__enter__") {
                Some(Value::Function(enter)) => {
                    self.call_function(&enter, vec![context.clone()], Vec::new())?
                }
                _ => context.clone(),
            },
            other => other.clone(),
        };
        if let Some(target) = &item.target {
            self.assign(target, entered, frame)?;
        }

        let result = self.exec_with(rest, body, frame);

        match &context {
            Value::File(file) => file.borrow_mut().closed = true,
            Value::Instance(instance) => {
                if let Some(Value::Function(exit)) = instance.class.lookup("__exit__") {
                    let args = vec![context.clone(), Value::None, Value::None, Value::None];
                    self.call_function(&exit, args, Vec::new())?;
                }
            }
            _ => {}
        }
        result
    }

    fn to_exception(&self, value: Value) -> Exec<Value> {
        match value {
            Value::Exception(_) => Ok(value),
            Value::ExceptionType(_) => Ok(Value::Exception(Rc::new(Exception {
                class: value,
                args: Vec::new(),
            }))),
            Value::Class(ref cls) if cls.is_exception() => Ok(Value::Exception(Rc::new(Exception {
                class: value.clone(),
                args: Vec::new(),
            }))),
            _ => Err(type_error("exceptions must derive from BaseException")),
        }
    }

    // ----- names and targets -----

    fn lookup(&self, name: &str, frame: &Frame) -> Exec<Value> {
        if !frame.declared_global.contains(name) {
            if let Some(value) = frame.locals.borrow().get(name) {
                return Ok(value.clone());
            }
            for scope in frame.enclosing.iter().rev() {
                if let Some(value) = scope.borrow().get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = frame.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        builtins::builtin(name)
            .ok_or_else(|| raise("NameError", format!("name '{name}' is not defined")))
    }

    fn store_name(&self, name: &str, value: Value, frame: &Frame) {
        if frame.declared_global.contains(name) {
            frame.globals.borrow_mut().insert(name.to_string(), value);
            return;
        }
        if frame.declared_nonlocal.contains(name)
            && let Some(scope) = frame
                .enclosing
                .iter()
                .rev()
                .find(|scope| scope.borrow().contains_key(name))
        {
            scope.borrow_mut().insert(name.to_string(), value);
            return;
        }
        frame.locals.borrow_mut().insert(name.to_string(), value);
    }

    fn assign(&mut self, target: &Expr, value: Value, frame: &Frame) -> Exec<()> {
        match target {
            Expr::Name(name) => {
                self.store_name(name, value, frame);
                Ok(())
            }
            Expr::Tuple(targets) | Expr::List(targets) => self.unpack(targets, value, frame),
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, frame)?;
                builtins::set_attr(&object, attr, value)
            }
            Expr::Subscript {
                value: object,
                index,
            } => {
                let object = self.eval(object, frame)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let bounds = self.slice_bounds(lower, upper, step, frame)?;
                    return builtins::set_slice(&object, bounds, value);
                }
                let index = self.eval(index, frame)?;
                builtins::set_item(&object, index, value)
            }
            Expr::Starred(inner) => self.assign(inner, value, frame),
            _ => Err(Unwind::Fatal(SandboxError::syntax(
                "cannot assign to expression",
                self.line,
            ))),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value, frame: &Frame) -> Exec<()> {
        if matches!(value, Value::Opaque) {
            for target in targets {
                self.assign(target, Value::Opaque, frame)?;
            }
            return Ok(());
        }

        let mut items = builtins::iterate(&value)?;
        match targets.iter().position(|t| matches!(t, Expr::Starred(_))) {
            None => {
                if items.len() < targets.len() {
                    return Err(raise(
                        "ValueError",
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ),
                    ));
                }
                if items.len() > targets.len() {
                    return Err(raise(
                        "ValueError",
                        format!("too many values to unpack (expected {})", targets.len()),
                    ));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < targets.len() - 1 {
                    return Err(raise(
                        "ValueError",
                        format!(
                            "not enough values to unpack (expected at least {}, got {})",
                            targets.len() - 1,
                            items.len()
                        ),
                    ));
                }
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                for (target, item) in targets[..star].iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
                self.assign(&targets[star], Value::list(middle), frame)?;
                for (target, item) in targets[star + 1..].iter().zip(tail) {
                    self.assign(target, item, frame)?;
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Expr, frame: &Frame) -> Exec<()> {
        match target {
            Expr::Name(name) => {
                let removed = if frame.declared_global.contains(name) {
                    frame.globals.borrow_mut().remove(name)
                } else {
                    frame.locals.borrow_mut().remove(name)
                };
                removed
                    .map(|_| ())
                    .ok_or_else(|| raise("NameError", format!("name '{name}' is not defined")))
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                for target in targets {
                    self.delete(target, frame)?;
                }
                Ok(())
            }
            Expr::Subscript { value, index } => {
                let object = self.eval(value, frame)?;
                let index = self.eval(index, frame)?;
                builtins::delete_item(&object, &index)
            }
            Expr::Attribute { value, attr } => {
                let object = self.eval(value, frame)?;
                builtins::delete_attr(&object, attr)
            }
            _ => Err(Unwind::Fatal(SandboxError::syntax(
                "cannot delete expression",
                self.line,
            ))),
        }
    }

    // ----- expressions -----

    /// Left-associative operator chains fold along their left spine
    /// without recursing once per operator.
    fn eval_binary_chain(&mut self, expr: &Expr, frame: &Frame) -> Exec<Value> {
        let mut spine = Vec::new();
        let mut innermost = expr;
        while let Expr::BinOp { op, left, right } = innermost {
            spine.push((*op, right.as_ref()));
            innermost = left.as_ref();
        }
        let mut value = self.eval(innermost, frame)?;
        for (op, right) in spine.into_iter().rev() {
            let right = self.eval(right, frame)?;
            value = self.binary_op(op, &value, &right)?;
        }
        Ok(value)
    }

    fn eval_bool_chain(&mut self, expr: &Expr, frame: &Frame) -> Exec<Value> {
        let mut spine = Vec::new();
        let mut innermost = expr;
        while let Expr::BoolOp { op, left, right } = innermost {
            spine.push((*op, right.as_ref()));
            innermost = left.as_ref();
        }
        let mut value = self.eval(innermost, frame)?;
        for (op, right) in spine.into_iter().rev() {
            match (op, value.truthy()) {
                (BoolOp::And, false) | (BoolOp::Or, true) => {}
                _ => value = self.eval(right, frame)?,
            }
        }
        Ok(value)
    }

    pub(super) fn eval(&mut self, expr: &Expr, frame: &Frame) -> Exec<Value> {
        match expr {
            Expr::Constant(constant) => Ok(match constant {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::string(s.as_str()),
                Constant::Ellipsis => Value::Opaque,
            }),
            Expr::FormattedString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FormatPart::Literal(text) => out.push_str(text),
                        FormatPart::Field { expr, conversion } => {
                            let value = self.eval(expr, frame)?;
                            if *conversion == Some('r') {
                                out.push_str(&value.repr());
                            } else {
                                out.push_str(&value.to_str());
                            }
                        }
                    }
                }
                Ok(Value::string(out))
            }
            Expr::Name(name) => self.lookup(name, frame),
            Expr::List(items) => Ok(Value::list(self.eval_items(items, frame)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_items(items, frame)?)),
            Expr::Set(items) => {
                let items = self.eval_items(items, frame)?;
                for item in &items {
                    item.check_hashable()?;
                }
                Ok(Value::set(items))
            }
            Expr::Dict(items) => {
                let mut dict = Dict::default();
                for item in items {
                    match item {
                        DictItem::Pair(key, value) => {
                            let key = self.eval(key, frame)?;
                            key.check_hashable()?;
                            let value = self.eval(value, frame)?;
                            dict.insert(key, value);
                        }
                        DictItem::Unpack(mapping) => match self.eval(mapping, frame)? {
                            Value::Dict(other) => {
                                for (key, value) in other.borrow().items() {
                                    dict.insert(key.clone(), value.clone());
                                }
                            }
                            Value::Opaque => {}
                            other => {
                                return Err(type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                )));
                            }
                        },
                    }
                }
                Ok(Value::dict(dict))
            }
            Expr::Starred(_) => Err(Unwind::Fatal(SandboxError::syntax(
                "can't use starred expression here",
                self.line,
            ))),
            Expr::Attribute { value, attr } => {
                let object = self.eval(value, frame)?;
                builtins::get_attr(&object, attr)
            }
            Expr::Subscript { value, index } => {
                let object = self.eval(value, frame)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let bounds = self.slice_bounds(lower, upper, step, frame)?;
                    return builtins::get_slice(&object, bounds);
                }
                let index = self.eval(index, frame)?;
                match &object {
                    Value::Instance(instance) => match instance.class.lookup("__getitem__") {
                        Some(Value::Function(getitem)) => {
                            self.call_function(&getitem, vec![object.clone(), index], Vec::new())
                        }
                        _ => builtins::get_item(&object, &index),
                    },
                    _ => builtins::get_item(&object, &index),
                }
            }
            Expr::Slice { .. } => Err(Unwind::Fatal(SandboxError::syntax(
                "slice outside of subscript",
                self.line,
            ))),
            Expr::Call { func, args } => {
                let callee = self.eval(func, frame)?;
                let (positional, keywords) = self.eval_arguments(args, frame)?;
                self.call(&callee, positional, keywords, frame)
            }
            Expr::BinOp { .. } => self.eval_binary_chain(expr, frame),
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(operand, frame)?;
                unary_op(*op, &operand)
            }
            Expr::BoolOp { .. } => self.eval_bool_chain(expr, frame),
            Expr::Compare { left, comparisons } => {
                let mut left = self.eval(left, frame)?;
                for (op, right) in comparisons {
                    let right = self.eval(right, frame)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, frame)?.truthy() {
                    self.eval(body, frame)
                } else {
                    self.eval(orelse, frame)
                }
            }
            Expr::Lambda { params, body } => {
                let mut defaults = HashMap::new();
                for param in params.positional.iter().chain(&params.keyword_only) {
                    if let Some(default) = &param.default {
                        defaults.insert(param.name.clone(), self.eval(default, frame)?);
                    }
                }
                Ok(Value::Function(Rc::new(Function {
                    name: "<lambda>".to_string(),
                    params: Rc::clone(params),
                    defaults,
                    body: FunctionBody::Lambda(Rc::clone(body)),
                    closure: frame.closure(),
                    globals: Rc::clone(&frame.globals),
                })))
            }
            Expr::Comprehension {
                kind,
                element,
                value,
                generators,
            } => self.comprehension(*kind, element, value.as_deref(), generators, frame),
            Expr::NamedExpr { target, value } => {
                let value = self.eval(value, frame)?;
                self.store_name(target, value.clone(), frame);
                Ok(value)
            }
        }
    }

    fn eval_items(&mut self, items: &[Expr], frame: &Frame) -> Exec<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let iterable = self.eval(inner, frame)?;
                values.extend(builtins::iterate(&iterable)?);
            } else {
                values.push(self.eval(item, frame)?);
            }
        }
        Ok(values)
    }

    fn eval_arguments(
        &mut self,
        args: &[Argument],
        frame: &Frame,
    ) -> Exec<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords: Vec<(String, Value)> = Vec::new();
        let add_keyword = |keywords: &mut Vec<(String, Value)>, name: String, value| {
            if keywords.iter().any(|(existing, _)| *existing == name) {
                return Err(type_error(format!(
                    "got multiple values for keyword argument '{name}'"
                )));
            }
            keywords.push((name, value));
            Ok(())
        };

        for arg in args {
            match arg {
                Argument::Positional(expr) => positional.push(self.eval(expr, frame)?),
                Argument::Starred(expr) => {
                    let iterable = self.eval(expr, frame)?;
                    positional.extend(builtins::iterate(&iterable)?);
                }
                Argument::Keyword(name, expr) => {
                    let value = self.eval(expr, frame)?;
                    add_keyword(&mut keywords, name.clone(), value)?;
                }
                Argument::DoubleStarred(expr) => match self.eval(expr, frame)? {
                    Value::Dict(mapping) => {
                        let entries = mapping.borrow().items().to_vec();
                        for (key, value) in entries {
                            let Value::Str(key) = key else {
                                return Err(type_error("keywords must be strings"));
                            };
                            add_keyword(&mut keywords, key.to_string(), value)?;
                        }
                    }
                    Value::Opaque => {}
                    other => {
                        return Err(type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        Ok((positional, keywords))
    }

    fn slice_bounds(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        frame: &Frame,
    ) -> Exec<[Option<i64>; 3]> {
        let mut bounds = [None; 3];
        for (slot, expr) in bounds.iter_mut().zip([lower, upper, step]) {
            if let Some(expr) = expr {
                *slot = match self.eval(expr, frame)? {
                    Value::None => None,
                    value => Some(value.as_int().ok_or_else(|| {
                        type_error("slice indices must be integers or None")
                    })?),
                };
            }
        }
        Ok(bounds)
    }

    fn comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: &Expr,
        value: Option<&Expr>,
        generators: &[Generator],
        frame: &Frame,
    ) -> Exec<Value> {
        let inner = frame.nested(FrameKind::Function);

        if let Some(value) = value {
            let mut dict = Dict::default();
            self.run_generators(
                generators,
                &inner,
                &mut |interp: &mut Interpreter, frame: &Frame| {
                    let key = interp.eval(element, frame)?;
                    key.check_hashable()?;
                    let entry = interp.eval(value, frame)?;
                    dict.insert(key, entry);
                    Ok(())
                },
            )?;
            return Ok(Value::dict(dict));
        }

        let mut items = Vec::new();
        self.run_generators(
            generators,
            &inner,
            &mut |interp: &mut Interpreter, frame: &Frame| {
                items.push(interp.eval(element, frame)?);
                Ok(())
            },
        )?;
        Ok(match kind {
            ComprehensionKind::Set => Value::set(items),
            ComprehensionKind::Generator => Value::iterator(items),
            ComprehensionKind::List | ComprehensionKind::Dict => Value::list(items),
        })
    }

    fn run_generators(
        &mut self,
        generators: &[Generator],
        frame: &Frame,
        emit: &mut dyn FnMut(&mut Self, &Frame) -> Exec<()>,
    ) -> Exec<()> {
        let Some((generator, rest)) = generators.split_first() else {
            return emit(self, frame);
        };
        let iterable = self.eval(&generator.iter, frame)?;
        'items: for item in builtins::iterate(&iterable)? {
            self.tick()?;
            self.assign(&generator.target, item, frame)?;
            for condition in &generator.conditions {
                if !self.eval(condition, frame)?.truthy() {
                    continue 'items;
                }
            }
            self.run_generators(rest, frame, emit)?;
        }
        Ok(())
    }

    // ----- calls -----

    pub(super) fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        frame: &Frame,
    ) -> Exec<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Method(method) => match method.as_ref() {
                Method::Native { receiver, name } => {
                    builtins::call_method(self, receiver, name, args, kwargs, frame)
                }
                Method::Bound { receiver, function } => {
                    let args = iter::once(receiver.clone()).chain(args).collect();
                    self.call_function(function, args, kwargs)
                }
            },
            Value::Builtin(builtin) => builtins::call_builtin(self, *builtin, args, kwargs, frame),
            Value::Class(class) => self.instantiate(class, args, kwargs),
            Value::ExceptionType(_) => Ok(Value::Exception(Rc::new(Exception {
                class: callee.clone(),
                args,
            }))),
            Value::Opaque => Ok(Value::Opaque),
            Value::Instance(instance) => match instance.class.lookup("__call__") {
                Some(Value::Function(function)) => {
                    let args = iter::once(callee.clone()).chain(args).collect();
                    self.call_function(&function, args, kwargs)
                }
                _ => Err(type_error(format!(
                    "'{}' object is not callable",
                    callee.type_name()
                ))),
            },
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn instantiate(
        &mut self,
        class: &Rc<Class>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        if class.is_exception() {
            return Ok(Value::Exception(Rc::new(Exception {
                class: Value::Class(Rc::clone(class)),
                args,
            })));
        }
        let instance = Value::Instance(Rc::new(Instance {
            class: Rc::clone(class),
            attrs: RefCell::new(HashMap::new()),
        }));
        if let Some(Value::Function(init)) = class.lookup("__init__") {
            let args = iter::once(instance.clone()).chain(args).collect();
            self.call_function(&init, args, kwargs)?;
        }
        Ok(instance)
    }

    pub(super) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        if self.depth >= self.max_depth {
            return Err(raise("RecursionError", "maximum recursion depth exceeded"));
        }
        self.depth += 1;
        let result = self.invoke(function, args, kwargs);
        self.depth -= 1;
        result
    }

    fn invoke(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        let locals = bind_arguments(function, args, kwargs)?;
        let mut frame = Frame {
            locals: Rc::new(RefCell::new(locals)),
            enclosing: Rc::clone(&function.closure),
            globals: Rc::clone(&function.globals),
            declared_global: HashSet::new(),
            declared_nonlocal: HashSet::new(),
            kind: FrameKind::Function,
        };

        let saved_line = self.line;
        let result = match &function.body {
            FunctionBody::Block(body) => match self.exec_block(body, &mut frame)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::None),
            },
            FunctionBody::Lambda(body) => self.eval(body, &frame),
        };
        self.line = saved_line;
        result
    }

    // ----- modules -----

    /// Resolve an import to an in-memory stand-in; the host is never
    /// consulted. Modules are cached per evaluation.
    fn import_module(&mut self, name: &str) -> Value {
        if let Some(module) = self.modules.get(name) {
            return module.clone();
        }
        let module = builtins::stand_in_module(name, |submodule| self.import_module(submodule));
        self.modules.insert(name.to_string(), module.clone());
        module
    }

    // ----- exec / eval -----

    pub(super) fn exec_source(
        &mut self,
        source: &str,
        namespace: Option<&Rc<RefCell<Dict>>>,
        frame: &Frame,
    ) -> Exec<()> {
        let program = parse_program(source).map_err(raise_syntax_error)?;
        let mut frame = self.namespace_frame(namespace, frame);
        let saved_line = self.line;
        let result = self.exec_block(&program, &mut frame);
        self.line = saved_line;
        result?;
        if let Some(namespace) = namespace {
            self.write_back(namespace, &frame.locals);
        }
        Ok(())
    }

    pub(super) fn eval_source(
        &mut self,
        source: &str,
        namespace: Option<&Rc<RefCell<Dict>>>,
        frame: &Frame,
    ) -> Exec<Value> {
        let expr = parse_expression(source).map_err(raise_syntax_error)?;
        let frame = self.namespace_frame(namespace, frame);
        self.eval(&expr, &frame)
    }

    /// A dict passed to `exec`/`eval` becomes a fresh global namespace
    fn namespace_frame(&self, namespace: Option<&Rc<RefCell<Dict>>>, frame: &Frame) -> Frame {
        let Some(namespace) = namespace else {
            return frame.clone();
        };
        if self
            .globals_view
            .as_ref()
            .is_some_and(|view| Rc::ptr_eq(view, namespace))
        {
            return Frame::module(Rc::clone(&self.globals));
        }
        let scope = new_scope();
        for (key, value) in namespace.borrow().items() {
            if let Value::Str(key) = key {
                scope.borrow_mut().insert(key.to_string(), value.clone());
            }
        }
        Frame::module(scope)
    }

    fn write_back(&self, namespace: &Rc<RefCell<Dict>>, scope: &Scope) {
        let mut dict = namespace.borrow_mut();
        let mut names: Vec<(String, Value)> = scope
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in names {
            dict.insert(Value::string(key), value);
        }
    }

    /// `globals()`: a dict snapshot that `exec` recognizes as the module
    /// namespace
    pub(super) fn globals_dict(&mut self, frame: &Frame) -> Value {
        let dict = Rc::new(RefCell::new(scope_to_dict(&frame.globals)));
        if Rc::ptr_eq(&frame.globals, &self.globals) {
            self.globals_view = Some(Rc::clone(&dict));
        }
        Value::Dict(dict)
    }

    // ----- operators -----

    pub(super) fn binary_op(&mut self, op: BinOp, left: &Value, right: &Value) -> Exec<Value> {
        if matches!(left, Value::Opaque) || matches!(right, Value::Opaque) {
            return Ok(Value::Opaque);
        }

        match (op, left, right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.charge(a.len() + b.len())?;
                return Ok(Value::string(format!("{a}{b}")));
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                self.charge(a.borrow().len() + b.borrow().len())?;
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Ok(Value::list(items));
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                self.charge(a.len() + b.len())?;
                return Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()));
            }
            (BinOp::Mul, sequence, count) | (BinOp::Mul, count, sequence)
                if matches!(sequence, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                    && count.as_int().is_some() =>
            {
                let count = usize::try_from(count.as_int().unwrap_or(0)).unwrap_or(0);
                return self.repeat(sequence, count);
            }
            (BinOp::Mod, Value::Str(format), args) => {
                return builtins::percent_format(format, args).map(Value::string);
            }
            (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
                let b = b.borrow();
                let items = a
                    .borrow()
                    .iter()
                    .filter(|item| !b.iter().any(|x| x.py_eq(item)))
                    .cloned()
                    .collect();
                return Ok(Value::set(items));
            }
            (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
                let items = a.borrow().iter().chain(b.borrow().iter()).cloned().collect();
                return Ok(Value::set(items));
            }
            (BinOp::BitAnd, Value::Set(a), Value::Set(b)) => {
                let b = b.borrow();
                let items = a
                    .borrow()
                    .iter()
                    .filter(|item| b.iter().any(|x| x.py_eq(item)))
                    .cloned()
                    .collect();
                return Ok(Value::set(items));
            }
            (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.borrow().clone();
                for (key, value) in b.borrow().items() {
                    merged.insert(key.clone(), value.clone());
                }
                return Ok(Value::dict(merged));
            }
            _ => {}
        }

        if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
            return int_op(op, a, b);
        }
        if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
            return float_op(op, a, b);
        }
        Err(type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            left.type_name(),
            right.type_name()
        )))
    }

    fn repeat(&mut self, sequence: &Value, count: usize) -> Exec<Value> {
        match sequence {
            Value::Str(text) => {
                self.charge(text.len().saturating_mul(count))?;
                Ok(Value::string(text.repeat(count)))
            }
            Value::List(items) => {
                let items = items.borrow();
                self.charge(items.len().saturating_mul(count))?;
                Ok(Value::list(repeat_items(&items, count)))
            }
            Value::Tuple(items) => {
                self.charge(items.len().saturating_mul(count))?;
                Ok(Value::tuple(repeat_items(items, count)))
            }
            other => Err(type_error(format!(
                "can't multiply sequence by non-int of type '{}'",
                other.type_name()
            ))),
        }
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    if items.is_empty() {
        return Vec::new();
    }
    iter::repeat_n(items, count)
        .flatten()
        .cloned()
        .collect()
}

fn raise_syntax_error(err: SandboxError) -> Unwind {
    let class = exception_type(&err.class).unwrap_or("SyntaxError");
    raise(class, err.message)
}

pub(super) fn scope_to_dict(scope: &Scope) -> Dict {
    let mut names: Vec<(String, Value)> = scope
        .borrow()
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));
    Dict::from_entries(
        names
            .into_iter()
            .map(|(key, value)| (Value::string(key), value)),
    )
}

fn handler_matches(class: &Value, handler: &Value) -> bool {
    match handler {
        Value::Tuple(options) => options.iter().any(|option| handler_matches(class, option)),
        Value::ExceptionType(_) | Value::Class(_) => class_matches(class, handler),
        _ => false,
    }
}

fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Exec<HashMap<String, Value>> {
    let params = &function.params;
    let name = &function.name;
    let mut locals = HashMap::new();
    let mut args = args.into_iter();

    for param in &params.positional {
        let by_keyword = kwargs.iter().position(|(key, _)| *key == param.name);
        let value = match (args.next(), by_keyword) {
            (Some(_), Some(_)) => {
                return Err(type_error(format!(
                    "{name}() got multiple values for argument '{}'",
                    param.name
                )));
            }
            (Some(value), None) => value,
            (None, Some(index)) => kwargs.remove(index).1,
            (None, None) => function.defaults.get(&param.name).cloned().ok_or_else(|| {
                type_error(format!(
                    "{name}() missing 1 required positional argument: '{}'",
                    param.name
                ))
            })?,
        };
        locals.insert(param.name.clone(), value);
    }

    let extra: Vec<Value> = args.collect();
    match &params.vararg {
        Some(vararg) => {
            locals.insert(vararg.clone(), Value::tuple(extra));
        }
        None if !extra.is_empty() => {
            return Err(type_error(format!(
                "{name}() takes {} positional arguments but {} were given",
                params.positional.len(),
                params.positional.len() + extra.len()
            )));
        }
        None => {}
    }

    for param in &params.keyword_only {
        let value = match kwargs.iter().position(|(key, _)| *key == param.name) {
            Some(index) => kwargs.remove(index).1,
            None => function.defaults.get(&param.name).cloned().ok_or_else(|| {
                type_error(format!(
                    "{name}() missing 1 required keyword-only argument: '{}'",
                    param.name
                ))
            })?,
        };
        locals.insert(param.name.clone(), value);
    }

    match &params.kwarg {
        Some(kwarg) => {
            let dict = Dict::from_entries(
                kwargs
                    .into_iter()
                    .map(|(key, value)| (Value::string(key), value)),
            );
            locals.insert(kwarg.clone(), Value::dict(dict));
        }
        None => {
            if let Some((key, _)) = kwargs.first() {
                return Err(type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            }
        }
    }
    Ok(locals)
}

fn unary_op(op: UnaryOp, operand: &Value) -> Exec<Value> {
    if matches!(operand, Value::Opaque) && op != UnaryOp::Not {
        return Ok(Value::Opaque);
    }
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, value) if value.as_int().is_some() => value
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(|| raise("OverflowError", "integer overflow")),
        (UnaryOp::Pos, value) if value.as_int().is_some() => {
            Ok(Value::Int(value.as_int().unwrap_or_default()))
        }
        (UnaryOp::Invert, value) if value.as_int().is_some() => {
            Ok(Value::Int(!value.as_int().unwrap_or_default()))
        }
        (_, value) => Err(type_error(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            },
            value.type_name()
        ))),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Exec<Value> {
    let overflow = || raise("OverflowError", "integer overflow");
    let zero = || raise("ZeroDivisionError", "integer division or modulo by zero");
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(raise("ZeroDivisionError", "division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).ok_or_else(overflow)?
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::LShift => {
            let shift = u32::try_from(b).map_err(|_| raise("ValueError", "negative shift count"))?;
            a.checked_shl(shift).ok_or_else(overflow)?
        }
        BinOp::RShift => {
            let shift = u32::try_from(b).map_err(|_| raise("ValueError", "negative shift count"))?;
            a >> shift.min(63)
        }
        BinOp::MatMul => {
            return Err(type_error(
                "unsupported operand type(s) for @: 'int' and 'int'",
            ));
        }
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Exec<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            return Err(raise("ZeroDivisionError", "float division by zero"));
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
        _ => {
            return Err(type_error(format!(
                "unsupported operand type(s) for {}: 'float' and 'float'",
                op_symbol(op)
            )));
        }
    };
    Ok(Value::Float(value))
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "** or pow()",
        BinOp::MatMul => "@",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::LShift => "<<",
        BinOp::RShift => ">>",
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Exec<bool> {
    let ordering = |symbol: &str| {
        if matches!(left, Value::Opaque) || matches!(right, Value::Opaque) {
            return Ok(None);
        }
        left.compare(right).map(Some).ok_or_else(|| {
            type_error(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))
        })
    };

    Ok(match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Is => left.is(right),
        CmpOp::IsNot => !left.is(right),
        CmpOp::In => builtins::contains(right, left)?,
        CmpOp::NotIn => !builtins::contains(right, left)?,
        CmpOp::Lt => ordering("<")?.is_some_and(|o| o.is_lt()),
        CmpOp::LtE => ordering("<=")?.is_some_and(|o| o.is_le()),
        CmpOp::Gt => ordering(">")?.is_some_and(|o| o.is_gt()),
        CmpOp::GtE => ordering(">=")?.is_some_and(|o| o.is_ge()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;

    fn run(source: &str) -> (Interpreter, Result<(), SandboxError>) {
        run_with(source, &SandboxConfig::default())
    }

    fn run_with(source: &str, config: &SandboxConfig) -> (Interpreter, Result<(), SandboxError>) {
        let program = parse_program(source).unwrap();
        let recorder = Rc::new(RefCell::new(SetupRecorder::default()));
        let mut interpreter = Interpreter::new(config, recorder);
        let result = interpreter.run(&program);
        (interpreter, result)
    }

    fn global(interpreter: &Interpreter, name: &str) -> String {
        interpreter
            .globals
            .borrow()
            .get(name)
            .map(Value::repr)
            .unwrap_or_default()
    }

    #[test]
    fn test_functions_and_closures() {
        let (interp, result) = run(
            "def outer(prefix):\n    def inner(name, sep='-'):\n        return prefix + sep + name\n    return inner\n\
             x = outer('a')('b')\n\
             y = (lambda *args, **kw: (len(args), sorted(kw)))(1, 2, z=3)\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "x"), "'a-b'");
        assert_eq!(global(&interp, "y"), "(2, ['z'])");
    }

    #[test]
    fn test_try_except_hierarchy() {
        let (interp, result) = run(
            "try:\n    {}['missing']\nexcept LookupError as e:\n    caught = str(e)\nelse:\n    caught = None\n\
             try:\n    import numpy\nexcept ImportError:\n    numpy = 'absent'\n\
             try:\n    raise IOError('disk')\nexcept OSError as err:\n    os_error = err.args[0]\nfinally:\n    done = True\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "caught"), "\"'missing'\"");
        assert_eq!(global(&interp, "numpy"), "<object>");
        assert_eq!(global(&interp, "os_error"), "'disk'");
        assert_eq!(global(&interp, "done"), "True");
    }

    #[test]
    fn test_unpacking_and_comprehensions() {
        let (interp, result) = run(
            "a, (b, *rest) = 1, [2, 3, 4]\n\
             squares = {n: n * n for n in range(4) if n % 2}\n\
             flat = [x for pair in [(1, 2), (3, 4)] for x in pair]\n\
             total = 0\nfor i in range(10):\n    if i == 5:\n        break\n    total += i\nelse:\n    total = -1\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "rest"), "[3, 4]");
        assert_eq!(global(&interp, "squares"), "{1: 1, 3: 9}");
        assert_eq!(global(&interp, "flat"), "[1, 2, 3, 4]");
        assert_eq!(global(&interp, "total"), "10");
    }

    #[test]
    fn test_classes_and_methods() {
        let (interp, result) = run(
            "class Base(object):\n    greeting = 'hi'\n    def __init__(self, name):\n        self.name = name\n    def greet(self):\n        return self.greeting + ' ' + self.name\n\
             class Child(Base):\n    greeting = 'yo'\n\
             message = Child('bob').greet()\n\
             class Custom(ValueError):\n    pass\n\
             try:\n    raise Custom('bad')\nexcept ValueError as e:\n    custom = repr(e)\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "message"), "'yo bob'");
        assert_eq!(global(&interp, "custom"), "\"Custom('bad')\"");
    }

    #[test]
    fn test_global_and_nonlocal() {
        let (interp, result) = run(
            "count = 0\ndef bump():\n    global count\n    count += 1\nbump(); bump()\n\
             def counter():\n    n = 0\n    def step():\n        nonlocal n\n        n += 1\n        return n\n    step()\n    return step()\n\
             stepped = counter()\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "count"), "2");
        assert_eq!(global(&interp, "stepped"), "2");
    }

    #[test]
    fn test_uncaught_exception_reports_class_and_line() {
        let (_, result) = run("x = 1\nraise ValueError('nope')\n");
        let err = result.unwrap_err();
        assert_eq!(err.class, "ValueError");
        assert_eq!(err.message, "nope");
        assert_eq!(err.line, Some(2));

        let (_, result) = run("undefined_name\n");
        assert_eq!(result.unwrap_err().class, "NameError");
    }

    #[test]
    fn test_step_budget_is_fatal() {
        let (_, result) = run("try:\n    while True:\n        pass\nexcept Exception:\n    pass\n");
        let err = result.unwrap_err();
        assert_eq!(err.class, "RuntimeError");
        assert!(err.message.contains("budget"));
    }

    #[test]
    fn test_recursion_limit() {
        let config = SandboxConfig {
            max_call_depth: 8,
            ..SandboxConfig::default()
        };
        let (_, result) = run_with("def f(n):\n    return f(n + 1)\nf(0)\n", &config);
        assert_eq!(result.unwrap_err().class, "RecursionError");
    }

    #[test]
    fn test_exec_into_namespace() {
        let (interp, result) = run(
            "about = {}\nexec(open('pkg/__about__.py').read(), about)\nversion = about['__version__']\n\
             exec('late = 1')\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "version"), "'0.0.1+placeholder'");
        assert_eq!(global(&interp, "late"), "1");
    }

    #[test]
    fn test_arithmetic() {
        let (interp, result) = run(
            "a = -7 // 2\nb = -7 % 3\nc = 2 ** 10\nd = 7 / 2\ne = 'ab' * 2\nf = '%s-%d' % ('v', 3)\n",
        );
        result.unwrap();
        assert_eq!(global(&interp, "a"), "-4");
        assert_eq!(global(&interp, "b"), "2");
        assert_eq!(global(&interp, "c"), "1024");
        assert_eq!(global(&interp, "d"), "3.5");
        assert_eq!(global(&interp, "e"), "'abab'");
        assert_eq!(global(&interp, "f"), "'v-3'");
    }
}
