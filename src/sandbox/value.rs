//! Runtime values of the sandbox interpreter

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::rc::Rc;

use super::SandboxError;
use super::ast::{Expr, Parameters, Stmt};
use crate::utils::python_str_repr;

/// A variable namespace
pub type Scope = Rc<RefCell<HashMap<String, Value>>>;

pub fn new_scope() -> Scope {
    Rc::new(RefCell::new(HashMap::new()))
}

/// Non-local exits from evaluation.
///
/// `Raise` can be caught by `try`; `Fatal` always propagates (budgets,
/// unsupported constructs).
#[derive(Debug)]
pub enum Unwind {
    Raise(Value),
    Fatal(SandboxError),
}

pub type Exec<T> = Result<T, Unwind>;

/// Build a catchable exception of a builtin class
pub fn raise(class: &'static str, message: impl Into<String>) -> Unwind {
    Unwind::Raise(Value::exception(class, message))
}

pub fn type_error(message: impl Into<String>) -> Unwind {
    raise("TypeError", message)
}

/// Builtin exception classes and their bases
const EXCEPTION_TYPES: [(&str, &str); 38] = [
    ("BaseException", ""),
    ("SystemExit", "BaseException"),
    ("KeyboardInterrupt", "BaseException"),
    ("GeneratorExit", "BaseException"),
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("AssertionError", "Exception"),
    ("AttributeError", "Exception"),
    ("EOFError", "Exception"),
    ("ImportError", "Exception"),
    ("ModuleNotFoundError", "ImportError"),
    ("LookupError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("OSError", "Exception"),
    ("FileNotFoundError", "OSError"),
    ("FileExistsError", "OSError"),
    ("IsADirectoryError", "OSError"),
    ("PermissionError", "OSError"),
    ("RuntimeError", "Exception"),
    ("NotImplementedError", "RuntimeError"),
    ("RecursionError", "RuntimeError"),
    ("StopIteration", "Exception"),
    ("SyntaxError", "Exception"),
    ("IndentationError", "SyntaxError"),
    ("TypeError", "Exception"),
    ("ValueError", "Exception"),
    ("UnicodeError", "ValueError"),
    ("UnicodeDecodeError", "UnicodeError"),
    ("UnicodeEncodeError", "UnicodeError"),
    ("Warning", "Exception"),
    ("DeprecationWarning", "Warning"),
    ("RuntimeWarning", "Warning"),
    ("UserWarning", "Warning"),
];

/// Look up a builtin exception class by name, following the legacy aliases
pub fn exception_type(name: &str) -> Option<&'static str> {
    let name = match name {
        "IOError" | "EnvironmentError" => "OSError",
        other => other,
    };
    EXCEPTION_TYPES
        .iter()
        .find(|(class, _)| *class == name)
        .map(|(class, _)| *class)
}

fn builtin_exception_is_subclass(class: &str, ancestor: &str) -> bool {
    let mut current = class;
    loop {
        if current == ancestor {
            return true;
        }
        match EXCEPTION_TYPES.iter().find(|(name, _)| *name == current) {
            Some((_, base)) if !base.is_empty() => current = base,
            _ => return false,
        }
    }
}

/// Whether `class` (an exception type or user class) derives from `handler`
pub fn class_matches(class: &Value, handler: &Value) -> bool {
    match (class, handler) {
        (Value::ExceptionType(name), Value::ExceptionType(ancestor)) => {
            builtin_exception_is_subclass(name, ancestor)
        }
        (Value::Class(cls), Value::Class(ancestor)) if Rc::ptr_eq(cls, ancestor) => true,
        (Value::Class(cls), _) => cls.bases.iter().any(|base| class_matches(base, handler)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    All,
    Any,
    Bool,
    Callable,
    Chr,
    Dict,
    Enumerate,
    Eval,
    Exec,
    Filter,
    Float,
    Format,
    Getattr,
    Globals,
    Hasattr,
    Int,
    Isinstance,
    Issubclass,
    Iter,
    Len,
    List,
    Locals,
    Map,
    Max,
    Min,
    Next,
    Object,
    Ord,
    Range,
    Repr,
    Reversed,
    Round,
    Set,
    Setattr,
    Sorted,
    Str,
    Sum,
    Super,
    Tuple,
    Type,
    Zip,
    // sandbox stand-ins
    Noop,
    FakeParse,
    FakeOpen,
    Setup,
    FindPackages,
    // os / os.path / sys
    Getenv,
    Getcwd,
    Listdir,
    System,
    PathJoin,
    PathDirname,
    PathBasename,
    PathAbspath,
    PathExists,
    PathSplitext,
    Exit,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::All => "all",
            Builtin::Any => "any",
            Builtin::Bool => "bool",
            Builtin::Callable => "callable",
            Builtin::Chr => "chr",
            Builtin::Dict => "dict",
            Builtin::Enumerate => "enumerate",
            Builtin::Eval => "eval",
            Builtin::Exec => "exec",
            Builtin::Filter => "filter",
            Builtin::Float => "float",
            Builtin::Format => "format",
            Builtin::Getattr => "getattr",
            Builtin::Globals => "globals",
            Builtin::Hasattr => "hasattr",
            Builtin::Int => "int",
            Builtin::Isinstance => "isinstance",
            Builtin::Issubclass => "issubclass",
            Builtin::Iter => "iter",
            Builtin::Len => "len",
            Builtin::List => "list",
            Builtin::Locals => "locals",
            Builtin::Map => "map",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Next => "next",
            Builtin::Object => "object",
            Builtin::Ord => "ord",
            Builtin::Range => "range",
            Builtin::Repr => "repr",
            Builtin::Reversed => "reversed",
            Builtin::Round => "round",
            Builtin::Set => "set",
            Builtin::Setattr => "setattr",
            Builtin::Sorted => "sorted",
            Builtin::Str => "str",
            Builtin::Sum => "sum",
            Builtin::Super => "super",
            Builtin::Tuple => "tuple",
            Builtin::Type => "type",
            Builtin::Zip => "zip",
            Builtin::Noop => "noop",
            Builtin::FakeParse => "fake_parse",
            Builtin::FakeOpen => "fake_open",
            Builtin::Setup => "setup",
            Builtin::FindPackages => "find_packages",
            Builtin::Getenv => "getenv",
            Builtin::Getcwd => "getcwd",
            Builtin::Listdir => "listdir",
            Builtin::System => "system",
            Builtin::PathJoin => "join",
            Builtin::PathDirname => "dirname",
            Builtin::PathBasename => "basename",
            Builtin::PathAbspath => "abspath",
            Builtin::PathExists => "exists",
            Builtin::PathSplitext => "splitext",
            Builtin::Exit => "exit",
        }
    }

    /// Builtins that are also types, usable with `isinstance`
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Bool
                | Builtin::Dict
                | Builtin::Float
                | Builtin::Int
                | Builtin::List
                | Builtin::Object
                | Builtin::Set
                | Builtin::Str
                | Builtin::Tuple
        )
    }
}

pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Lambda(Rc<Expr>),
}

/// A user-defined function or lambda with its captured scopes
pub struct Function {
    pub name: String,
    pub params: Rc<Parameters>,
    pub defaults: HashMap<String, Value>,
    pub body: FunctionBody,
    pub closure: Rc<[Scope]>,
    pub globals: Scope,
}

pub enum Method {
    /// A method of a builtin type, resolved by name at call time
    Native { receiver: Value, name: Rc<str> },
    Bound { receiver: Value, function: Rc<Function> },
}

pub struct Module {
    pub name: String,
    pub attrs: RefCell<HashMap<String, Value>>,
}

pub struct Class {
    pub name: String,
    pub bases: Vec<Value>,
    pub attrs: RefCell<HashMap<String, Value>>,
}

impl Class {
    /// Attribute lookup through the class and its bases, depth first
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        self.bases.iter().find_map(|base| match base {
            Value::Class(cls) => cls.lookup(name),
            Value::Opaque => Some(Value::Opaque),
            _ => None,
        })
    }

    pub fn is_exception(&self) -> bool {
        self.bases.iter().any(|base| match base {
            Value::ExceptionType(_) => true,
            Value::Class(cls) => cls.is_exception(),
            _ => false,
        })
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub attrs: RefCell<HashMap<String, Value>>,
}

pub struct Exception {
    /// `Value::ExceptionType` or a `Value::Class` deriving from one
    pub class: Value,
    pub args: Vec<Value>,
}

impl Exception {
    pub fn class_name(&self) -> String {
        match &self.class {
            Value::ExceptionType(name) => (*name).to_string(),
            Value::Class(cls) => cls.name.clone(),
            _ => "Exception".to_string(),
        }
    }

    /// `str(exc)`
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [arg] if matches!(self.class, Value::ExceptionType("KeyError")) => arg.repr(),
            [arg] => arg.to_str(),
            args => Value::tuple(args.to_vec()).repr(),
        }
    }
}

/// File object returned by `fake_open`; reads serve fixed content, writes
/// are discarded.
pub struct FakeFile {
    pub content: Rc<str>,
    pub position: usize,
    pub closed: bool,
}

impl FakeFile {
    pub fn new(content: Rc<str>) -> Self {
        Self {
            content,
            position: 0,
            closed: false,
        }
    }

    pub fn read(&mut self) -> String {
        let rest = self.content.get(self.position..).unwrap_or_default().to_string();
        self.position = self.content.len();
        rest
    }

    pub fn readline(&mut self) -> String {
        let rest = self.content.get(self.position..).unwrap_or_default();
        let end = rest.find('\n').map_or(rest.len(), |index| index + 1);
        let line = rest[..end].to_string();
        self.position += end;
        line
    }

    pub fn readlines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.readline();
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        lines
    }
}

/// Insertion-ordered mapping with Python equality on keys
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut dict = Dict::default();
        for (key, value) in entries {
            dict.insert(key, value);
        }
        dict
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k.py_eq(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.entries.iter().any(|(k, _)| k.py_eq(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<Method>),
    Module(Rc<Module>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    ExceptionType(&'static str),
    Exception(Rc<Exception>),
    File(Rc<RefCell<FakeFile>>),
    Iterator(Rc<RefCell<VecDeque<Value>>>),
    /// Stand-in for anything from a module the sandbox does not model
    Opaque,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

impl Value {
    pub fn string(text: impl Into<Rc<str>>) -> Value {
        Value::Str(text.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(items: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|existing| existing.py_eq(&item)) {
                unique.push(item);
            }
        }
        Value::Set(Rc::new(RefCell::new(unique)))
    }

    pub fn iterator(items: Vec<Value>) -> Value {
        Value::Iterator(Rc::new(RefCell::new(items.into())))
    }

    pub fn exception(class: &'static str, message: impl Into<String>) -> Value {
        Value::Exception(Rc::new(Exception {
            class: Value::ExceptionType(class),
            args: vec![Value::string(message.into())],
        }))
    }

    pub fn native_method(receiver: &Value, name: &str) -> Value {
        Value::Method(Rc::new(Method::Native {
            receiver: receiver.clone(),
            name: name.into(),
        }))
    }

    pub fn module(name: &str, attrs: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
        Value::Module(Rc::new(Module {
            name: name.to_string(),
            attrs: RefCell::new(
                attrs
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect(),
            ),
        }))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Set(_) => "set".into(),
            Value::Function(_) => "function".into(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::Method(_) => "method".into(),
            Value::Module(_) => "module".into(),
            Value::Class(_) | Value::ExceptionType(_) => "type".into(),
            Value::Instance(instance) => instance.class.name.clone(),
            Value::Exception(exc) => exc.class_name(),
            Value::File(_) => "TextIOWrapper".into(),
            Value::Iterator(_) => "iterator".into(),
            Value::Opaque => "object".into(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Set(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Lists, dicts and sets cannot be dict keys or set members
    pub fn check_hashable(&self) -> Exec<()> {
        match self {
            Value::List(_) | Value::Dict(_) | Value::Set(_) => Err(type_error(format!(
                "unhashable type: '{}'",
                self.type_name()
            ))),
            Value::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            _ => Ok(()),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => python_str_repr(s),
            Value::List(items) => format!("[{}]", join_reprs(&items.borrow())),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_reprs(items)),
            Value::Set(items) if items.borrow().is_empty() => "set()".into(),
            Value::Set(items) => format!("{{{}}}", join_reprs(&items.borrow())),
            Value::Dict(dict) => {
                let mut out = String::from("{");
                for (index, (key, value)) in dict.borrow().items().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: {}", key.repr(), value.repr());
                }
                out.push('}');
                out
            }
            Value::Function(function) => format!("<function {}>", function.name),
            Value::Builtin(builtin) if builtin.is_type() => format!("<class '{}'>", builtin.name()),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Method(_) => "<bound method>".into(),
            Value::Module(module) => format!("<module '{}'>", module.name),
            Value::Class(cls) => format!("<class '{}'>", cls.name),
            Value::ExceptionType(name) => format!("<class '{name}'>"),
            Value::Instance(instance) => format!("<{} object>", instance.class.name),
            Value::Exception(exc) => {
                let args: Vec<Value> = exc.args.clone();
                format!("{}({})", exc.class_name(), join_reprs(&args))
            }
            Value::File(_) => "<_io.TextIOWrapper name='setup.py'>".into(),
            Value::Iterator(_) => "<iterator>".into(),
            Value::Opaque => "<object>".into(),
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(exc) => exc.message(),
            Value::Opaque => String::new(),
            other => other.repr(),
        }
    }

    /// Python `==`
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
                self.as_int() == other.as_int()
            }
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|item| b.iter().any(|x| x.py_eq(item)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.items()
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| other.py_eq(v)))
            }
            _ => self.is(other),
        }
    }

    /// Python `is`
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`, `sorted`, `min` and `max`; `None` when the types
    /// are not comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
                Some(self.as_int()?.cmp(&other.as_int()?))
            }
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::List(a), Value::List(b)) => seq_compare(&a.borrow(), &b.borrow()),
            (Value::Tuple(a), Value::Tuple(b)) => seq_compare(a, b),
            _ => None,
        }
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn seq_compare(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.compare(y);
        }
    }
    Some(a.len().cmp(&b.len()))
}

fn join_reprs(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::repr)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Python float formatting: integral values keep a trailing `.0`
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".into()
    } else if value.is_infinite() {
        if value > 0.0 { "inf".into() } else { "-inf".into() }
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_matches_python() {
        let value = Value::list(vec![
            Value::string("a'b"),
            Value::Int(3),
            Value::Float(2.0),
            Value::tuple(vec![Value::None]),
            Value::Bool(true),
        ]);
        assert_eq!(value.repr(), "[\"a'b\", 3, 2.0, (None,), True]");
        assert_eq!(Value::set(vec![]).repr(), "set()");
    }

    #[test]
    fn test_equality_crosses_numeric_types() {
        assert!(Value::Int(1).py_eq(&Value::Bool(true)));
        assert!(Value::Int(2).py_eq(&Value::Float(2.0)));
        assert!(!Value::string("1").py_eq(&Value::Int(1)));
        assert!(
            Value::tuple(vec![Value::Int(3), Value::Int(8)])
                .py_eq(&Value::tuple(vec![Value::Int(3), Value::Float(8.0)]))
        );
    }

    #[test]
    fn test_tuple_ordering() {
        let version = Value::tuple(vec![Value::Int(3), Value::Int(12), Value::Int(0)]);
        let bound = Value::tuple(vec![Value::Int(3), Value::Int(8)]);
        assert_eq!(version.compare(&bound), Some(Ordering::Greater));
        assert_eq!(Value::string("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let mut dict = Dict::default();
        dict.insert(Value::string("b"), Value::Int(1));
        dict.insert(Value::string("a"), Value::Int(2));
        dict.insert(Value::string("b"), Value::Int(3));
        assert_eq!(Value::dict(dict).repr(), "{'b': 3, 'a': 2}");
    }

    #[test]
    fn test_exception_hierarchy() {
        let not_found = Value::ExceptionType("FileNotFoundError");
        assert!(class_matches(&not_found, &Value::ExceptionType("OSError")));
        assert!(class_matches(&not_found, &Value::ExceptionType("Exception")));
        assert!(!class_matches(&not_found, &Value::ExceptionType("ValueError")));
        assert_eq!(exception_type("IOError"), Some("OSError"));
        assert!(!class_matches(
            &Value::ExceptionType("SystemExit"),
            &Value::ExceptionType("Exception")
        ));
    }

    #[test]
    fn test_fake_file_reads() {
        let mut file = FakeFile::new("a\nb\n".into());
        assert_eq!(file.readline(), "a\n");
        assert_eq!(file.readlines(), vec!["b\n".to_string()]);
        assert_eq!(file.read(), "");
    }

    #[test]
    fn test_unhashable() {
        assert!(Value::list(vec![]).check_hashable().is_err());
        assert!(Value::tuple(vec![Value::Int(1)]).check_hashable().is_ok());
    }
}
