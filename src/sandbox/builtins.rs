//! Builtin functions, methods of builtin types and the stand-in modules
//! importable from a setup script

use std::cell::RefCell;
use std::cmp::Ordering;
use std::path::Path;
use std::rc::Rc;

use path_clean::clean;

use super::interp::{Frame, Interpreter, scope_to_dict};
use super::value::{
    Builtin, Dict, Exception, Exec, FakeFile, Method, Unwind, Value, class_matches,
    exception_type, format_float, raise, type_error,
};

/// Version reported through `sys.version_info`
const PYTHON_VERSION: (i64, i64, i64) = (3, 12, 0);

const STR_METHODS: [&str; 33] = [
    "capitalize", "center", "count", "decode", "encode", "endswith", "find", "format", "index",
    "isalnum", "isalpha", "isdigit", "islower", "isspace", "isupper", "join", "ljust", "lower",
    "lstrip", "partition", "replace", "rfind", "rjust", "rpartition", "rsplit", "rstrip", "split",
    "splitlines", "startswith", "strip", "title", "upper", "zfill",
];
const LIST_METHODS: [&str; 11] = [
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];
const TUPLE_METHODS: [&str; 2] = ["count", "index"];
const DICT_METHODS: [&str; 9] = [
    "clear", "copy", "get", "items", "keys", "pop", "setdefault", "update", "values",
];
const SET_METHODS: [&str; 10] = [
    "add", "copy", "difference", "discard", "intersection", "issubset", "issuperset", "remove",
    "union", "update",
];
const FILE_METHODS: [&str; 7] = [
    "__enter__", "__exit__", "close", "read", "readline", "readlines", "write",
];

/// Resolve a name that is not bound in any scope
pub fn builtin(name: &str) -> Option<Value> {
    let builtin = match name {
        "abs" => Builtin::Abs,
        "all" => Builtin::All,
        "any" => Builtin::Any,
        "bool" => Builtin::Bool,
        "callable" => Builtin::Callable,
        "chr" => Builtin::Chr,
        "dict" => Builtin::Dict,
        "enumerate" => Builtin::Enumerate,
        "eval" => Builtin::Eval,
        "exec" => Builtin::Exec,
        "filter" => Builtin::Filter,
        "float" => Builtin::Float,
        "format" => Builtin::Format,
        "getattr" => Builtin::Getattr,
        "globals" => Builtin::Globals,
        "hasattr" => Builtin::Hasattr,
        "int" => Builtin::Int,
        "isinstance" => Builtin::Isinstance,
        "issubclass" => Builtin::Issubclass,
        "iter" => Builtin::Iter,
        "len" => Builtin::Len,
        "list" => Builtin::List,
        "locals" | "vars" => Builtin::Locals,
        "map" => Builtin::Map,
        "max" => Builtin::Max,
        "min" => Builtin::Min,
        "next" => Builtin::Next,
        "object" => Builtin::Object,
        "ord" => Builtin::Ord,
        "range" => Builtin::Range,
        "repr" => Builtin::Repr,
        "reversed" => Builtin::Reversed,
        "round" => Builtin::Round,
        "set" | "frozenset" => Builtin::Set,
        "setattr" => Builtin::Setattr,
        "sorted" => Builtin::Sorted,
        "str" => Builtin::Str,
        "sum" => Builtin::Sum,
        "super" => Builtin::Super,
        "tuple" => Builtin::Tuple,
        "type" => Builtin::Type,
        "zip" => Builtin::Zip,
        "exit" | "quit" => Builtin::Exit,
        "property" | "staticmethod" | "classmethod" | "NotImplemented" | "Ellipsis" => {
            return Some(Value::Opaque);
        }
        _ => return exception_type(name).map(Value::ExceptionType),
    };
    Some(Value::Builtin(builtin))
}

/// In-memory replacement for an importable module. Known modules expose
/// the sandbox hooks; anything else is opaque.
pub fn stand_in_module(name: &str, mut import: impl FnMut(&str) -> Value) -> Value {
    let str_value = |text: &str| Value::string(text);
    match name {
        "setuptools" => Value::module(
            name,
            [
                ("setup", Value::Builtin(Builtin::Setup)),
                ("find_packages", Value::Builtin(Builtin::FindPackages)),
                ("find_namespace_packages", Value::Builtin(Builtin::FindPackages)),
            ],
        ),
        "distutils.core" => Value::module(name, [("setup", Value::Builtin(Builtin::Setup))]),
        "distutils" => Value::module(name, [("core", import("distutils.core"))]),
        "os" => Value::module(
            name,
            [
                ("environ", Value::dict(Dict::default())),
                ("getenv", Value::Builtin(Builtin::Getenv)),
                ("getcwd", Value::Builtin(Builtin::Getcwd)),
                ("listdir", Value::Builtin(Builtin::Listdir)),
                ("system", Value::Builtin(Builtin::System)),
                ("name", str_value("posix")),
                ("sep", str_value("/")),
                ("linesep", str_value("\n")),
                ("curdir", str_value(".")),
                ("pardir", str_value("..")),
                ("path", import("os.path")),
            ],
        ),
        "os.path" => Value::module(
            name,
            [
                ("join", Value::Builtin(Builtin::PathJoin)),
                ("dirname", Value::Builtin(Builtin::PathDirname)),
                ("basename", Value::Builtin(Builtin::PathBasename)),
                ("abspath", Value::Builtin(Builtin::PathAbspath)),
                ("realpath", Value::Builtin(Builtin::PathAbspath)),
                ("exists", Value::Builtin(Builtin::PathExists)),
                ("isfile", Value::Builtin(Builtin::PathExists)),
                ("isdir", Value::Builtin(Builtin::PathExists)),
                ("islink", Value::Builtin(Builtin::PathExists)),
                ("splitext", Value::Builtin(Builtin::PathSplitext)),
                ("sep", str_value("/")),
            ],
        ),
        "sys" => {
            let (major, minor, micro) = PYTHON_VERSION;
            Value::module(
                name,
                [
                    (
                        "version_info",
                        Value::tuple(vec![
                            Value::Int(major),
                            Value::Int(minor),
                            Value::Int(micro),
                            str_value("final"),
                            Value::Int(0),
                        ]),
                    ),
                    ("version", str_value(&format!("{major}.{minor}.{micro}"))),
                    ("platform", str_value("linux")),
                    ("byteorder", str_value("little")),
                    ("executable", str_value("python3")),
                    ("argv", Value::list(vec![str_value("setup.py")])),
                    ("path", Value::list(Vec::new())),
                    ("maxsize", Value::Int(i64::MAX)),
                    ("exit", Value::Builtin(Builtin::Exit)),
                ],
            )
        }
        "io" | "codecs" => Value::module(name, [("open", Value::Builtin(Builtin::FakeOpen))]),
        _ => {
            tracing::debug!("import of {name} resolved to an opaque stand-in");
            Value::Opaque
        }
    }
}

// ----- object protocol -----

pub fn iterate(value: &Value) -> Exec<Vec<Value>> {
    Ok(match value {
        Value::List(items) | Value::Set(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Dict(dict) => dict.borrow().keys(),
        Value::Str(text) => text.chars().map(|c| Value::string(c.to_string())).collect(),
        Value::File(file) => file
            .borrow_mut()
            .readlines()
            .into_iter()
            .map(Value::string)
            .collect(),
        Value::Iterator(items) => items.borrow_mut().drain(..).collect(),
        Value::Opaque => Vec::new(),
        other => {
            return Err(type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )));
        }
    })
}

pub fn contains(container: &Value, item: &Value) -> Exec<bool> {
    match container {
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(&**needle)),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Set(items) => {
            Ok(items.borrow().iter().any(|x| x.py_eq(item)))
        }
        Value::Tuple(items) => Ok(items.iter().any(|x| x.py_eq(item))),
        Value::Dict(dict) => Ok(dict.borrow().contains(item)),
        Value::Iterator(_) | Value::File(_) => {
            Ok(iterate(container)?.iter().any(|x| x.py_eq(item)))
        }
        Value::Opaque => Ok(false),
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn methods_of(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => &STR_METHODS,
        Value::List(_) => &LIST_METHODS,
        Value::Tuple(_) => &TUPLE_METHODS,
        Value::Dict(_) => &DICT_METHODS,
        Value::Set(_) => &SET_METHODS,
        Value::File(_) => &FILE_METHODS,
        _ => &[],
    }
}

fn attribute_error(object: &Value, name: &str) -> Unwind {
    let message = match object {
        Value::Class(class) => format!("type object '{}' has no attribute '{name}'", class.name),
        other => format!("'{}' object has no attribute '{name}'", other.type_name()),
    };
    raise("AttributeError", message)
}

pub fn get_attr(object: &Value, name: &str) -> Exec<Value> {
    match object {
        Value::Opaque => return Ok(Value::Opaque),
        Value::Module(module) => {
            if name == "__name__" {
                return Ok(Value::string(module.name.as_str()));
            }
            // stand-in modules only model part of their real counterparts
            return Ok(module
                .attrs
                .borrow()
                .get(name)
                .cloned()
                .unwrap_or(Value::Opaque));
        }
        Value::Instance(instance) => {
            if let Some(value) = instance.attrs.borrow().get(name) {
                return Ok(value.clone());
            }
            if name == "__class__" {
                return Ok(Value::Class(Rc::clone(&instance.class)));
            }
            match instance.class.lookup(name) {
                Some(Value::Function(function)) => {
                    return Ok(Value::Method(Rc::new(Method::Bound {
                        receiver: object.clone(),
                        function,
                    })));
                }
                Some(value) => return Ok(value),
                None => {}
            }
        }
        Value::Class(class) => {
            if name == "__name__" {
                return Ok(Value::string(class.name.as_str()));
            }
            if let Some(value) = class.lookup(name) {
                return Ok(value);
            }
        }
        Value::Exception(exc) if name == "args" => return Ok(Value::tuple(exc.args.clone())),
        Value::Function(function) => match name {
            "__name__" => return Ok(Value::string(function.name.as_str())),
            "__doc__" => return Ok(Value::None),
            _ => {}
        },
        Value::ExceptionType(class) if name == "__name__" => return Ok(Value::string(*class)),
        // `sys.version_info` is a plain 5-tuple; its named fields resolve by position
        Value::Tuple(items) if items.len() == 5 => {
            let field = ["major", "minor", "micro", "releaselevel", "serial"]
                .iter()
                .position(|field| *field == name);
            if let Some(index) = field {
                return Ok(items[index].clone());
            }
        }
        _ => {}
    }

    if methods_of(object).contains(&name) {
        return Ok(Value::native_method(object, name));
    }
    Err(attribute_error(object, name))
}

pub fn set_attr(object: &Value, name: &str, value: Value) -> Exec<()> {
    match object {
        Value::Instance(instance) => {
            instance.attrs.borrow_mut().insert(name.to_string(), value);
        }
        Value::Class(class) => {
            class.attrs.borrow_mut().insert(name.to_string(), value);
        }
        Value::Module(module) => {
            module.attrs.borrow_mut().insert(name.to_string(), value);
        }
        Value::Opaque | Value::Function(_) => {}
        other => return Err(attribute_error(other, name)),
    }
    Ok(())
}

pub fn delete_attr(object: &Value, name: &str) -> Exec<()> {
    let removed = match object {
        Value::Instance(instance) => instance.attrs.borrow_mut().remove(name),
        Value::Class(class) => class.attrs.borrow_mut().remove(name),
        Value::Module(module) => module.attrs.borrow_mut().remove(name),
        Value::Opaque => return Ok(()),
        _ => None,
    };
    removed.map(|_| ()).ok_or_else(|| attribute_error(object, name))
}

fn key_error(key: &Value) -> Unwind {
    Unwind::Raise(Value::Exception(Rc::new(Exception {
        class: Value::ExceptionType("KeyError"),
        args: vec![key.clone()],
    })))
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len)
        .contains(&index)
        .then(|| usize::try_from(index).ok())
        .flatten()
}

fn sequence_index(index: &Value, len: usize, kind: &str) -> Exec<usize> {
    let Some(position) = index.as_int() else {
        return Err(type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    normalize_index(position, len)
        .ok_or_else(|| raise("IndexError", format!("{kind} index out of range")))
}

pub fn get_item(object: &Value, index: &Value) -> Exec<Value> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[sequence_index(index, items.len(), "list")?].clone())
        }
        Value::Tuple(items) => Ok(items[sequence_index(index, items.len(), "tuple")?].clone()),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let position = sequence_index(index, chars.len(), "string")?;
            Ok(Value::string(chars[position].to_string()))
        }
        Value::Dict(dict) => dict.borrow().get(index).ok_or_else(|| key_error(index)),
        Value::Opaque => Ok(Value::Opaque),
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(object: &Value, index: Value, value: Value) -> Exec<()> {
    match object {
        Value::List(items) => {
            let len = items.borrow().len();
            let position = sequence_index(&index, len, "list")
                .map_err(|_| raise("IndexError", "list assignment index out of range"))?;
            items.borrow_mut()[position] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            dict.borrow_mut().insert(index, value);
            Ok(())
        }
        Value::Opaque => Ok(()),
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub fn delete_item(object: &Value, index: &Value) -> Exec<()> {
    match object {
        Value::List(items) => {
            let len = items.borrow().len();
            let position = sequence_index(index, len, "list")?;
            items.borrow_mut().remove(position);
            Ok(())
        }
        Value::Dict(dict) => dict
            .borrow_mut()
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| key_error(index)),
        Value::Opaque => Ok(()),
        other => Err(type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}

/// Indices selected by `[lower:upper:step]` on a sequence of `len` items
fn slice_indices(len: usize, [lower, upper, step]: [Option<i64>; 3]) -> Exec<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(raise("ValueError", "slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut indices = Vec::new();
    if step > 0 {
        let mut index = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        while index < stop {
            indices.push(index as usize);
            index = index.saturating_add(step);
        }
    } else {
        let mut index = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        while index > stop {
            indices.push(index as usize);
            index = index.saturating_add(step);
        }
    }
    Ok(indices)
}

pub fn get_slice(object: &Value, bounds: [Option<i64>; 3]) -> Exec<Value> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let selected = slice_indices(items.len(), bounds)?;
            Ok(Value::list(selected.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let selected = slice_indices(items.len(), bounds)?;
            Ok(Value::tuple(selected.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let selected = slice_indices(chars.len(), bounds)?;
            Ok(Value::string(selected.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Opaque => Ok(Value::Opaque),
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_slice(object: &Value, bounds: [Option<i64>; 3], value: Value) -> Exec<()> {
    let Value::List(items) = object else {
        return match object {
            Value::Opaque => Ok(()),
            other => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        };
    };
    if bounds[2].is_some_and(|step| step != 1) {
        return Err(raise("ValueError", "extended slice assignment is not supported"));
    }
    let replacement = iterate(&value)?;
    let len = items.borrow().len();
    let selected = slice_indices(len, [bounds[0], bounds[1], None])?;
    let start = match (selected.first(), bounds[0]) {
        (Some(first), _) => *first,
        (None, Some(lower)) => {
            let lower = if lower < 0 { lower + len as i64 } else { lower };
            lower.clamp(0, len as i64) as usize
        }
        (None, None) => 0,
    };
    items
        .borrow_mut()
        .splice(start..start + selected.len(), replacement);
    Ok(())
}

// ----- formatting -----

/// printf-style `format % args`
pub fn percent_format(format: &str, args: &Value) -> Exec<String> {
    let mapping = match args {
        Value::Dict(dict) => Some(Rc::clone(dict)),
        _ => None,
    };
    let mut values = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    }
    .into_iter();

    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if chars.get(i) == Some(&'%') {
            out.push('%');
            i += 1;
            continue;
        }

        let mut value = None;
        if chars.get(i) == Some(&'(') {
            let end = chars[i..]
                .iter()
                .position(|c| *c == ')')
                .ok_or_else(|| raise("ValueError", "incomplete format key"))?;
            let key: String = chars[i + 1..i + end].iter().collect();
            let dict = mapping
                .as_ref()
                .ok_or_else(|| type_error("format requires a mapping"))?;
            let key = Value::string(key);
            value = Some(dict.borrow().get(&key).ok_or_else(|| key_error(&key))?);
            i += end + 1;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(flag) = chars.get(i).filter(|c| "-+ #0".contains(**c)) {
            left |= *flag == '-';
            zero |= *flag == '0';
            i += 1;
        }
        let width = parse_count(&chars, &mut i);
        let mut precision = None;
        if chars.get(i) == Some(&'.') {
            i += 1;
            precision = Some(parse_count(&chars, &mut i));
        }
        while chars.get(i).is_some_and(|c| matches!(c, 'l' | 'h' | 'L')) {
            i += 1;
        }

        let Some(&conversion) = chars.get(i) else {
            return Err(raise("ValueError", "incomplete format"));
        };
        i += 1;
        let value = match value {
            Some(value) => value,
            None => values
                .next()
                .ok_or_else(|| type_error("not enough arguments for format string"))?,
        };

        let text = match conversion {
            's' => value.to_str(),
            'r' | 'a' => value.repr(),
            'd' | 'i' | 'u' => match &value {
                Value::Float(f) => format!("{}", f.trunc() as i64),
                other => other
                    .as_int()
                    .map(|n| n.to_string())
                    .ok_or_else(|| {
                        type_error(format!(
                            "%{conversion} format: a real number is required, not {}",
                            other.type_name()
                        ))
                    })?,
            },
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let number = value.as_float().ok_or_else(|| {
                    type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                let digits = precision.unwrap_or(6);
                match conversion {
                    'e' | 'E' => format!("{number:.digits$e}"),
                    'g' | 'G' => format_float(number),
                    _ => format!("{number:.digits$}"),
                }
            }
            'x' | 'X' | 'o' => {
                let number = value
                    .as_int()
                    .ok_or_else(|| type_error("an integer is required"))?;
                match conversion {
                    'x' => format!("{number:x}"),
                    'X' => format!("{number:X}"),
                    _ => format!("{number:o}"),
                }
            }
            'c' => match &value {
                Value::Str(text) => text.to_string(),
                other => other
                    .as_int()
                    .and_then(|n| u32::try_from(n).ok())
                    .and_then(char::from_u32)
                    .map(String::from)
                    .ok_or_else(|| type_error("%c requires int or char"))?,
            },
            other => {
                return Err(raise(
                    "ValueError",
                    format!("unsupported format character '{other}'"),
                ));
            }
        };
        let text = match (conversion, precision) {
            ('s' | 'r', Some(limit)) => text.chars().take(limit).collect(),
            _ => text,
        };
        out.push_str(&pad(&text, width, if left { '<' } else { '>' }, if zero && !left { '0' } else { ' ' }));
    }

    if mapping.is_none() && values.next().is_some() {
        return Err(type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// Widths and precisions beyond this are clamped
const MAX_FORMAT_WIDTH: usize = 4096;

fn parse_count(chars: &[char], i: &mut usize) -> usize {
    let mut count = 0usize;
    while let Some(digit) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        count = count.saturating_mul(10).saturating_add(digit as usize);
        *i += 1;
    }
    count.min(MAX_FORMAT_WIDTH)
}

fn pad(text: &str, width: usize, align: char, fill: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let missing = width - len;
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{text}{}", fill_str(missing)),
        '^' => format!(
            "{}{text}{}",
            fill_str(missing / 2),
            fill_str(missing - missing / 2)
        ),
        _ => format!("{}{text}", fill_str(missing)),
    }
}

/// Apply a `format()` spec: `[[fill]align][sign][0][width][,][.precision][type]`
fn apply_format_spec(value: &Value, spec: &str) -> Exec<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() > 1 && matches!(chars[1], '<' | '>' | '^' | '=') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if matches!(chars[0], '<' | '>' | '^' | '=') {
        align = Some(chars[0]);
        i = 1;
    }
    if chars.get(i).is_some_and(|c| matches!(c, '+' | '-' | ' ')) {
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        fill = '0';
        align.get_or_insert('>');
        i += 1;
    }
    let width = parse_count(&chars, &mut i);
    if chars.get(i) == Some(&',') {
        i += 1;
    }
    let mut precision = None;
    if chars.get(i) == Some(&'.') {
        i += 1;
        precision = Some(parse_count(&chars, &mut i));
    }
    let kind = chars.get(i).copied();

    let fixed_point = matches!(kind, Some('f' | 'F' | '%'))
        || (kind.is_none() && precision.is_some() && matches!(value, Value::Float(_)));
    let text = if fixed_point {
        let number = value.as_float().ok_or_else(|| {
            raise(
                "ValueError",
                format!(
                    "Unknown format code for object of type '{}'",
                    value.type_name()
                ),
            )
        })?;
        let digits = precision.unwrap_or(6);
        if kind == Some('%') {
            format!("{:.digits$}%", number * 100.0)
        } else {
            format!("{number:.digits$}")
        }
    } else {
        match (kind, value) {
            (Some('d'), value) => value.as_int().map(|n| n.to_string()).ok_or_else(|| {
                raise(
                    "ValueError",
                    format!(
                        "Unknown format code 'd' for object of type '{}'",
                        value.type_name()
                    ),
                )
            })?,
            (Some('x'), value) => format!("{:x}", value.as_int().unwrap_or_default()),
            (_, Value::Str(text)) => match precision {
                Some(limit) => text.chars().take(limit).collect(),
                None => text.to_string(),
            },
            (_, value) => value.to_str(),
        }
    };
    let default_align = if matches!(value, Value::Str(_)) { '<' } else { '>' };
    Ok(pad(&text, width, align.unwrap_or(default_align), fill))
}

/// `str.format(*args, **kwargs)`
fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> Exec<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '}' => {
                return Err(raise(
                    "ValueError",
                    "Single '}' encountered in format string",
                ));
            }
            '{' => {
                let mut depth = 1;
                let mut end = i + 1;
                while end < chars.len() {
                    match chars[end] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(raise(
                        "ValueError",
                        "expected '}' before end of string",
                    ));
                }
                let field: String = chars[i + 1..end].iter().collect();
                out.push_str(&format_field(&field, args, kwargs, &mut auto_index)?);
                i = end + 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn format_field(
    field: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    auto_index: &mut usize,
) -> Exec<String> {
    let (field, spec) = field.split_once(':').unwrap_or((field, ""));
    let (field, conversion) = match field.split_once('!') {
        Some((name, conversion)) => (name, conversion.chars().next()),
        None => (field, None),
    };

    let head_end = field.find(['.', '[']).unwrap_or(field.len());
    let (head, mut rest) = field.split_at(head_end);
    let mut value = if head.is_empty() {
        let index = *auto_index;
        *auto_index += 1;
        positional_field(args, index)?
    } else if let Ok(index) = head.parse::<usize>() {
        positional_field(args, index)?
    } else {
        kwargs
            .iter()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| key_error(&Value::string(head)))?
    };

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            value = get_attr(&value, &after[..end])?;
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| raise("ValueError", "Missing ']' in format string"))?;
            let key = &after[..end];
            let key = key
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::string(key));
            value = get_item(&value, &key)?;
            rest = &after[end + 1..];
        } else {
            break;
        }
    }

    let value = match conversion {
        Some('r') | Some('a') => Value::string(value.repr()),
        Some('s') => Value::string(value.to_str()),
        _ => value,
    };
    apply_format_spec(&value, spec)
}

fn positional_field(args: &[Value], index: usize) -> Exec<Value> {
    args.get(index).cloned().ok_or_else(|| {
        raise(
            "IndexError",
            format!("Replacement index {index} out of range for positional args tuple"),
        )
    })
}

// ----- argument helpers -----

fn keyword(kwargs: &[(String, Value)], name: &str) -> Option<Value> {
    kwargs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

/// Positional argument `index`, or the keyword `name`
fn argument(args: &[Value], kwargs: &[(String, Value)], index: usize, name: &str) -> Option<Value> {
    args.get(index).cloned().or_else(|| keyword(kwargs, name))
}

fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> Exec<()> {
    if args.len() < min {
        return Err(type_error(format!(
            "{name}() expected at least {min} argument{}, got {}",
            if min == 1 { "" } else { "s" },
            args.len()
        )));
    }
    if args.len() > max {
        return Err(type_error(format!(
            "{name}() expected at most {max} argument{}, got {}",
            if max == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn expect_str(value: &Value, context: &str) -> Exec<Rc<str>> {
    match value {
        Value::Str(text) => Ok(Rc::clone(text)),
        other => Err(type_error(format!(
            "{context} must be str, not {}",
            other.type_name()
        ))),
    }
}

fn optional_str(value: Option<Value>, context: &str) -> Exec<Option<Rc<str>>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => expect_str(&value, context).map(Some),
    }
}

fn is_attribute_error(err: &Unwind) -> bool {
    matches!(err, Unwind::Raise(Value::Exception(exc))
        if class_matches(&exc.class, &Value::ExceptionType("AttributeError")))
}

fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
    frame: &Frame,
) -> Exec<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match &key {
            Some(function) if !matches!(function, Value::None) => {
                interp.call(function, vec![item.clone()], Vec::new(), frame)?
            }
            _ => item.clone(),
        };
        keyed.push((sort_key, item));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        let (a, b) = if reverse { (b, a) } else { (a, b) };
        a.compare(b).unwrap_or_else(|| {
            failure.get_or_insert_with(|| {
                type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))
            });
            Ordering::Equal
        })
    });
    if let Some(err) = failure {
        return Err(err);
    }
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn extreme(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    kwargs: &[(String, Value)],
    wanted: Ordering,
    frame: &Frame,
) -> Exec<Value> {
    let candidates = if args.len() == 1 {
        iterate(&args[0])?
    } else {
        args
    };
    let key = keyword(kwargs, "key").filter(|key| !matches!(key, Value::None));

    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let rank = match &key {
            Some(function) => interp.call(function, vec![candidate.clone()], Vec::new(), frame)?,
            None => candidate.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => {
                let ordering = rank.compare(best_rank).ok_or_else(|| {
                    type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        if wanted == Ordering::Less { "<" } else { ">" },
                        rank.type_name(),
                        best_rank.type_name()
                    ))
                })?;
                ordering == wanted
            }
        };
        if replace {
            best = Some((rank, candidate));
        }
    }

    match best {
        Some((_, value)) => Ok(value),
        None => keyword(kwargs, "default")
            .ok_or_else(|| raise("ValueError", format!("{name}() arg is an empty sequence"))),
    }
}

fn isinstance(object: &Value, class: &Value) -> Exec<bool> {
    Ok(match class {
        Value::Tuple(options) => {
            for option in options.iter() {
                if isinstance(object, option)? {
                    return Ok(true);
                }
            }
            false
        }
        Value::Builtin(builtin) if builtin.is_type() => matches!(
            (builtin, object),
            (Builtin::Object, _)
                | (Builtin::Str, Value::Str(_))
                | (Builtin::Int, Value::Int(_) | Value::Bool(_))
                | (Builtin::Bool, Value::Bool(_))
                | (Builtin::Float, Value::Float(_))
                | (Builtin::List, Value::List(_))
                | (Builtin::Tuple, Value::Tuple(_))
                | (Builtin::Dict, Value::Dict(_))
                | (Builtin::Set, Value::Set(_))
        ),
        Value::ExceptionType(_) | Value::Class(_) => match object {
            Value::Exception(exc) => class_matches(&exc.class, class),
            Value::Instance(instance) => {
                class_matches(&Value::Class(Rc::clone(&instance.class)), class)
            }
            _ => false,
        },
        Value::Opaque => false,
        _ => {
            return Err(type_error(
                "isinstance() arg 2 must be a type, a tuple of types, or a union",
            ));
        }
    })
}

fn to_int(value: &Value, base: Option<i64>) -> Exec<Value> {
    match value {
        Value::Int(_) | Value::Bool(_) if base.is_none() => {
            Ok(Value::Int(value.as_int().unwrap_or_default()))
        }
        Value::Float(f) if base.is_none() => {
            if !f.is_finite() {
                return Err(raise(
                    "ValueError",
                    format!("cannot convert float {} to integer", format_float(*f)),
                ));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::Str(text) => {
            let base = base.unwrap_or(10);
            let invalid = || {
                raise(
                    "ValueError",
                    format!(
                        "invalid literal for int() with base {base}: {}",
                        value.repr()
                    ),
                )
            };
            let cleaned = text.trim().replace('_', "");
            let (negative, digits) = match cleaned.strip_prefix('-') {
                Some(rest) => (true, rest.to_string()),
                None => (false, cleaned.trim_start_matches('+').to_string()),
            };
            let (radix, digits) = match (base, digits.get(..2).map(str::to_ascii_lowercase)) {
                (0 | 16, Some(prefix)) if prefix == "0x" => (16, &digits[2..]),
                (0 | 8, Some(prefix)) if prefix == "0o" => (8, &digits[2..]),
                (0 | 2, Some(prefix)) if prefix == "0b" => (2, &digits[2..]),
                (0, _) => (10, digits.as_str()),
                (radix, _) => (radix, digits.as_str()),
            };
            let radix = u32::try_from(radix)
                .ok()
                .filter(|r| (2..=36).contains(r))
                .ok_or_else(|| raise("ValueError", "int() base must be >= 2 and <= 36, or 0"))?;
            let parsed = i64::from_str_radix(digits, radix).map_err(|_| invalid())?;
            Ok(Value::Int(if negative { -parsed } else { parsed }))
        }
        Value::Opaque => Ok(Value::Opaque),
        other => Err(type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Exec<Value> {
    match value {
        Value::Str(text) => text
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| {
                raise(
                    "ValueError",
                    format!("could not convert string to float: {}", value.repr()),
                )
            }),
        Value::Opaque => Ok(Value::Opaque),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn type_of(value: &Value) -> Value {
    match value {
        Value::Str(_) => Value::Builtin(Builtin::Str),
        Value::Int(_) => Value::Builtin(Builtin::Int),
        Value::Bool(_) => Value::Builtin(Builtin::Bool),
        Value::Float(_) => Value::Builtin(Builtin::Float),
        Value::List(_) => Value::Builtin(Builtin::List),
        Value::Tuple(_) => Value::Builtin(Builtin::Tuple),
        Value::Dict(_) => Value::Builtin(Builtin::Dict),
        Value::Set(_) => Value::Builtin(Builtin::Set),
        Value::Instance(instance) => Value::Class(Rc::clone(&instance.class)),
        Value::Exception(exc) => exc.class.clone(),
        _ => Value::Opaque,
    }
}

// ----- os.path -----

fn path_join(parts: &[Rc<str>]) -> String {
    let mut path = String::new();
    for part in parts {
        if part.starts_with('/') {
            path = part.to_string();
        } else if path.is_empty() || path.ends_with('/') {
            path.push_str(part);
        } else {
            path.push('/');
            path.push_str(part);
        }
    }
    path
}

fn path_split(path: &str) -> (&str, &str) {
    let cut = path.rfind('/').map_or(0, |index| index + 1);
    let (head, tail) = path.split_at(cut);
    let trimmed = head.trim_end_matches('/');
    (if trimmed.is_empty() { head } else { trimmed }, tail)
}

fn path_splitext(path: &str) -> (String, String) {
    let (_, base) = path_split(path);
    let stem_start = path.len() - base.len();
    let leading_dots = base.len() - base.trim_start_matches('.').len();
    match base.rfind('.') {
        Some(dot) if dot >= leading_dots && dot > 0 => {
            let cut = stem_start + dot;
            (path[..cut].to_string(), path[cut..].to_string())
        }
        _ => (path.to_string(), String::new()),
    }
}

fn path_abspath(path: &str) -> String {
    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    clean(Path::new(&absolute)).to_string_lossy().into_owned()
}

// ----- builtin functions -----

pub(super) fn call_builtin(
    interp: &mut Interpreter,
    builtin: Builtin,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    frame: &Frame,
) -> Exec<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Noop => Ok(Value::None),
        Builtin::FakeParse | Builtin::FindPackages | Builtin::Listdir => Ok(Value::list(Vec::new())),
        Builtin::FakeOpen => Ok(Value::File(Rc::new(RefCell::new(FakeFile::new(
            interp.file_content(),
        ))))),
        Builtin::Setup => {
            let declarations = Dict::from_entries(
                kwargs
                    .into_iter()
                    .map(|(key, value)| (Value::string(key), value)),
            );
            interp.recorder().borrow_mut().record_call(&declarations)?;
            Ok(Value::None)
        }
        Builtin::Getenv => Ok(argument(&args, &kwargs, 1, "default").unwrap_or(Value::None)),
        Builtin::Getcwd => Ok(Value::string("/")),
        Builtin::System => Ok(Value::Int(0)),
        Builtin::PathJoin => {
            check_arity(name, &args, 1, usize::MAX)?;
            let parts = args
                .iter()
                .map(|part| expect_str(part, "join() argument"))
                .collect::<Exec<Vec<_>>>()?;
            Ok(Value::string(path_join(&parts)))
        }
        Builtin::PathDirname | Builtin::PathBasename | Builtin::PathAbspath | Builtin::PathSplitext => {
            check_arity(name, &args, 1, 1)?;
            if matches!(args[0], Value::Opaque) {
                return Ok(Value::Opaque);
            }
            let path = expect_str(&args[0], &format!("{name}() argument"))?;
            Ok(match builtin {
                Builtin::PathDirname => Value::string(path_split(&path).0),
                Builtin::PathBasename => Value::string(path_split(&path).1),
                Builtin::PathAbspath => Value::string(path_abspath(&path)),
                _ => {
                    let (root, ext) = path_splitext(&path);
                    Value::tuple(vec![Value::string(root), Value::string(ext)])
                }
            })
        }
        Builtin::PathExists => Ok(Value::Bool(false)),
        Builtin::Exit => Err(Unwind::Raise(Value::Exception(Rc::new(Exception {
            class: Value::ExceptionType("SystemExit"),
            args,
        })))),
        Builtin::Len => {
            check_arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(text) => text.chars().count(),
                Value::List(items) | Value::Set(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(dict) => dict.borrow().len(),
                Value::Opaque => 0,
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        Builtin::Str => {
            check_arity(name, &args, 0, 1)?;
            Ok(Value::string(args.first().map(Value::to_str).unwrap_or_default()))
        }
        Builtin::Repr => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::string(args[0].repr()))
        }
        Builtin::Format => {
            check_arity(name, &args, 1, 2)?;
            let spec = optional_str(args.get(1).cloned(), "format spec")?;
            apply_format_spec(&args[0], spec.as_deref().unwrap_or("")).map(Value::string)
        }
        Builtin::Int => {
            check_arity(name, &args, 0, 2)?;
            let Some(value) = args.first() else {
                return Ok(Value::Int(0));
            };
            let base = argument(&args, &kwargs, 1, "base").and_then(|b| b.as_int());
            to_int(value, base)
        }
        Builtin::Float => {
            check_arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::Float(0.0)), to_float)
        }
        Builtin::Bool => Ok(Value::Bool(args.first().is_some_and(Value::truthy))),
        Builtin::List => Ok(Value::list(match args.first() {
            Some(iterable) => iterate(iterable)?,
            None => Vec::new(),
        })),
        Builtin::Tuple => Ok(Value::tuple(match args.first() {
            Some(iterable) => iterate(iterable)?,
            None => Vec::new(),
        })),
        Builtin::Set => {
            let items = match args.first() {
                Some(iterable) => iterate(iterable)?,
                None => Vec::new(),
            };
            for item in &items {
                item.check_hashable()?;
            }
            Ok(Value::set(items))
        }
        Builtin::Dict => {
            let mut dict = Dict::default();
            match args.first() {
                None | Some(Value::Opaque) => {}
                Some(Value::Dict(other)) => dict = other.borrow().clone(),
                Some(pairs) => {
                    for pair in iterate(pairs)? {
                        let entry = iterate(&pair)?;
                        let [key, value] = <[Value; 2]>::try_from(entry).map_err(|_| {
                            raise(
                                "ValueError",
                                "dictionary update sequence element has wrong length",
                            )
                        })?;
                        key.check_hashable()?;
                        dict.insert(key, value);
                    }
                }
            }
            for (key, value) in kwargs {
                dict.insert(Value::string(key), value);
            }
            Ok(Value::dict(dict))
        }
        Builtin::Sorted => {
            check_arity(name, &args, 1, 1)?;
            let items = iterate(&args[0])?;
            let reverse = keyword(&kwargs, "reverse").is_some_and(|r| r.truthy());
            let sorted = sort_values(interp, items, keyword(&kwargs, "key"), reverse, frame)?;
            Ok(Value::list(sorted))
        }
        Builtin::Reversed => {
            check_arity(name, &args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            items.reverse();
            Ok(Value::iterator(items))
        }
        Builtin::Enumerate => {
            check_arity(name, &args, 1, 2)?;
            let start = argument(&args, &kwargs, 1, "start")
                .and_then(|s| s.as_int())
                .unwrap_or(0);
            let items = iterate(&args[0])?;
            Ok(Value::iterator(
                (start..)
                    .zip(items)
                    .map(|(index, item)| Value::tuple(vec![Value::Int(index), item]))
                    .collect(),
            ))
        }
        Builtin::Zip => {
            let columns = args.iter().map(iterate).collect::<Exec<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::iterator(
                (0..len)
                    .map(|row| Value::tuple(columns.iter().map(|c| c[row].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::Range => {
            check_arity(name, &args, 1, 3)?;
            let bounds = args
                .iter()
                .map(|arg| {
                    arg.as_int().ok_or_else(|| {
                        type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            arg.type_name()
                        ))
                    })
                })
                .collect::<Exec<Vec<i64>>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return Err(raise("ValueError", "range() arg 3 must not be zero"));
            }
            let count = if (step > 0 && start < stop) || (step < 0 && start > stop) {
                let span = (i128::from(stop) - i128::from(start)).unsigned_abs();
                let step = i128::from(step).unsigned_abs();
                usize::try_from(span.div_ceil(step)).unwrap_or(usize::MAX)
            } else {
                0
            };
            interp.charge(count)?;
            Ok(Value::list(
                (0..count)
                    .map(|i| Value::Int((i128::from(start) + i128::from(step) * i as i128) as i64))
                    .collect(),
            ))
        }
        Builtin::Map => {
            check_arity(name, &args, 2, usize::MAX)?;
            let function = args[0].clone();
            let columns = args[1..].iter().map(iterate).collect::<Exec<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut mapped = Vec::with_capacity(len);
            for row in 0..len {
                let call_args = columns.iter().map(|c| c[row].clone()).collect();
                mapped.push(interp.call(&function, call_args, Vec::new(), frame)?);
            }
            Ok(Value::iterator(mapped))
        }
        Builtin::Filter => {
            check_arity(name, &args, 2, 2)?;
            let mut kept = Vec::new();
            for item in iterate(&args[1])? {
                let keep = match &args[0] {
                    Value::None => item.truthy(),
                    function => interp
                        .call(function, vec![item.clone()], Vec::new(), frame)?
                        .truthy(),
                };
                if keep {
                    kept.push(item);
                }
            }
            Ok(Value::iterator(kept))
        }
        Builtin::Any => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::Bool(iterate(&args[0])?.iter().any(Value::truthy)))
        }
        Builtin::All => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::Bool(iterate(&args[0])?.iter().all(Value::truthy)))
        }
        Builtin::Min => {
            check_arity(name, &args, 1, usize::MAX)?;
            extreme(interp, name, args, &kwargs, Ordering::Less, frame)
        }
        Builtin::Max => {
            check_arity(name, &args, 1, usize::MAX)?;
            extreme(interp, name, args, &kwargs, Ordering::Greater, frame)
        }
        Builtin::Sum => {
            check_arity(name, &args, 1, 2)?;
            let mut total = argument(&args, &kwargs, 1, "start").unwrap_or(Value::Int(0));
            for item in iterate(&args[0])? {
                total = interp.binary_op(super::ast::BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Abs => {
            check_arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                value => value
                    .as_int()
                    .and_then(i64::checked_abs)
                    .map(Value::Int)
                    .ok_or_else(|| {
                        type_error(format!(
                            "bad operand type for abs(): '{}'",
                            value.type_name()
                        ))
                    }),
            }
        }
        Builtin::Round => {
            check_arity(name, &args, 1, 2)?;
            let number = args[0].as_float().ok_or_else(|| {
                type_error(format!(
                    "type {} doesn't define __round__ method",
                    args[0].type_name()
                ))
            })?;
            match argument(&args, &kwargs, 1, "ndigits").and_then(|n| n.as_int()) {
                None => Ok(Value::Int(number.round_ties_even() as i64)),
                Some(digits) => {
                    let scale = 10f64.powi(i32::try_from(digits).unwrap_or(0));
                    Ok(Value::Float((number * scale).round_ties_even() / scale))
                }
            }
        }
        Builtin::Ord => {
            check_arity(name, &args, 1, 1)?;
            let text = expect_str(&args[0], "ord() argument")?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    text.chars().count()
                ))),
            }
        }
        Builtin::Chr => {
            check_arity(name, &args, 1, 1)?;
            args[0]
                .as_int()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(|c| Value::string(c.to_string()))
                .ok_or_else(|| raise("ValueError", "chr() arg not in range(0x110000)"))
        }
        Builtin::Isinstance => {
            check_arity(name, &args, 2, 2)?;
            isinstance(&args[0], &args[1]).map(Value::Bool)
        }
        Builtin::Issubclass => {
            check_arity(name, &args, 2, 2)?;
            Ok(Value::Bool(match (&args[0], &args[1]) {
                (Value::Builtin(a), Value::Builtin(b)) => a == b || *b == Builtin::Object,
                (class, Value::Tuple(options)) => {
                    options.iter().any(|option| class_matches(class, option))
                }
                (class, parent) => class_matches(class, parent),
            }))
        }
        Builtin::Getattr => {
            check_arity(name, &args, 2, 3)?;
            let attr = expect_str(&args[1], "attribute name")?;
            match get_attr(&args[0], &attr) {
                Err(err) if is_attribute_error(&err) && args.len() == 3 => Ok(args[2].clone()),
                other => other,
            }
        }
        Builtin::Hasattr => {
            check_arity(name, &args, 2, 2)?;
            let attr = expect_str(&args[1], "attribute name")?;
            match get_attr(&args[0], &attr) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if is_attribute_error(&err) => Ok(Value::Bool(false)),
                Err(err) => Err(err),
            }
        }
        Builtin::Setattr => {
            check_arity(name, &args, 3, 3)?;
            let attr = expect_str(&args[1], "attribute name")?;
            set_attr(&args[0], &attr, args[2].clone())?;
            Ok(Value::None)
        }
        Builtin::Callable => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::Bool(match &args[0] {
                Value::Function(_)
                | Value::Builtin(_)
                | Value::Method(_)
                | Value::Class(_)
                | Value::ExceptionType(_)
                | Value::Opaque => true,
                Value::Instance(instance) => instance.class.lookup("__call__").is_some(),
                _ => false,
            }))
        }
        Builtin::Iter => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::iterator(iterate(&args[0])?))
        }
        Builtin::Next => {
            check_arity(name, &args, 1, 2)?;
            let Value::Iterator(items) = &args[0] else {
                return Err(type_error(format!(
                    "'{}' object is not an iterator",
                    args[0].type_name()
                )));
            };
            let next = items.borrow_mut().pop_front();
            match (next, args.get(1)) {
                (Some(item), _) => Ok(item),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Unwind::Raise(Value::Exception(Rc::new(Exception {
                    class: Value::ExceptionType("StopIteration"),
                    args: Vec::new(),
                })))),
            }
        }
        Builtin::Type => {
            check_arity(name, &args, 1, 1)?;
            Ok(type_of(&args[0]))
        }
        Builtin::Object | Builtin::Super => Ok(Value::Opaque),
        Builtin::Globals => Ok(interp.globals_dict(frame)),
        Builtin::Locals => Ok(Value::dict(scope_to_dict(&frame.locals))),
        Builtin::Exec | Builtin::Eval => {
            check_arity(name, &args, 1, 3)?;
            let source = match &args[0] {
                Value::Str(source) => Rc::clone(source),
                Value::Opaque => return Ok(Value::Opaque),
                other => {
                    return Err(type_error(format!(
                        "{name}() arg 1 must be a string, bytes or code object, not {}",
                        other.type_name()
                    )));
                }
            };
            let namespace = match argument(&args, &kwargs, 1, "globals") {
                None | Some(Value::None) => None,
                Some(Value::Dict(dict)) => Some(dict),
                Some(other) => {
                    return Err(type_error(format!(
                        "{name}() globals must be a dict, not {}",
                        other.type_name()
                    )));
                }
            };
            if builtin == Builtin::Exec {
                interp.exec_source(&source, namespace.as_ref(), frame)?;
                Ok(Value::None)
            } else {
                interp.eval_source(&source, namespace.as_ref(), frame)
            }
        }
    }
}

// ----- methods -----

pub(super) fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    frame: &Frame,
) -> Exec<Value> {
    match receiver {
        Value::Str(text) => {
            if matches!(name, "zfill" | "ljust" | "rjust" | "center")
                && let Some(width) = args.first().and_then(Value::as_int)
            {
                interp.charge(usize::try_from(width).unwrap_or(0))?;
            }
            str_method(text, name, &args, &kwargs)
        }
        Value::List(_) => list_method(interp, receiver, name, args, &kwargs, frame),
        Value::Tuple(items) => sequence_method(items, name, &args),
        Value::Dict(_) => dict_method(receiver, name, args, &kwargs),
        Value::Set(_) => set_method(receiver, name, args),
        Value::File(file) => {
            let mut file = file.borrow_mut();
            if file.closed && name != "close" && name != "__exit__" {
                return Err(raise("ValueError", "I/O operation on closed file."));
            }
            Ok(match name {
                "read" => Value::string(file.read()),
                "readline" => Value::string(file.readline()),
                "readlines" => Value::list(file.readlines().into_iter().map(Value::string).collect()),
                "write" => Value::Int(
                    args.first()
                        .map_or(0, |text| text.to_str().chars().count() as i64),
                ),
                "__enter__" => receiver.clone(),
                _ => {
                    file.closed = true;
                    Value::None
                }
            })
        }
        other => Err(attribute_error(other, name)),
    }
}

fn str_method(
    text: &Rc<str>,
    name: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Exec<Value> {
    let text: &str = text;
    let string = |s: &str| Value::string(s);
    let list_of = |items: Vec<&str>| Value::list(items.into_iter().map(Value::string).collect());
    let char_index = |byte: usize| i64::try_from(text[..byte].chars().count()).unwrap_or(i64::MAX);

    Ok(match name {
        "format" => Value::string(str_format(text, args, kwargs)?),
        "join" => {
            check_arity("join", args, 1, 1)?;
            let mut parts = Vec::new();
            for (index, item) in iterate(&args[0])?.into_iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(type_error(format!(
                            "sequence item {index}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            Value::string(parts.join(text))
        }
        "split" | "rsplit" => {
            let separator = optional_str(argument(args, kwargs, 0, "sep"), "separator")?;
            let limit = argument(args, kwargs, 1, "maxsplit")
                .and_then(|m| m.as_int())
                .unwrap_or(-1);
            let limit = usize::try_from(limit).ok();
            let reverse = name == "rsplit";
            match separator.as_deref() {
                Some("") => return Err(raise("ValueError", "empty separator")),
                Some(sep) => match (limit, reverse) {
                    (None, _) => list_of(text.split(sep).collect()),
                    (Some(n), false) => list_of(text.splitn(n + 1, sep).collect()),
                    (Some(n), true) => {
                        let mut parts: Vec<&str> = text.rsplitn(n + 1, sep).collect();
                        parts.reverse();
                        list_of(parts)
                    }
                },
                None => list_of(split_whitespace(text, limit, reverse)),
            }
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = optional_str(args.first().cloned(), "strip arg")?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            string(match name {
                "strip" => text.trim_matches(matcher),
                "lstrip" => text.trim_start_matches(matcher),
                _ => text.trim_end_matches(matcher),
            })
        }
        "splitlines" => {
            let keepends = argument(args, kwargs, 0, "keepends").is_some_and(|k| k.truthy());
            if keepends {
                list_of(text.split_inclusive('\n').collect())
            } else {
                list_of(text.lines().collect())
            }
        }
        "startswith" | "endswith" => {
            check_arity(name, args, 1, 3)?;
            let candidates = match &args[0] {
                Value::Tuple(options) => options
                    .iter()
                    .map(|option| expect_str(option, name))
                    .collect::<Exec<Vec<_>>>()?,
                other => vec![expect_str(other, name)?],
            };
            Value::Bool(candidates.iter().any(|candidate| {
                if name == "startswith" {
                    text.starts_with(&**candidate)
                } else {
                    text.ends_with(&**candidate)
                }
            }))
        }
        "replace" => {
            check_arity(name, args, 2, 3)?;
            let old = expect_str(&args[0], "replace() argument 1")?;
            let new = expect_str(&args[1], "replace() argument 2")?;
            match args.get(2).and_then(Value::as_int).and_then(|n| usize::try_from(n).ok()) {
                Some(count) => Value::string(text.replacen(&*old, &new, count)),
                None => Value::string(text.replace(&*old, &new)),
            }
        }
        "find" | "rfind" | "index" => {
            check_arity(name, args, 1, 1)?;
            let needle = expect_str(&args[0], "must be str")?;
            let found = if name == "rfind" {
                text.rfind(&*needle)
            } else {
                text.find(&*needle)
            };
            match (found, name) {
                (Some(byte), _) => Value::Int(char_index(byte)),
                (None, "index") => return Err(raise("ValueError", "substring not found")),
                (None, _) => Value::Int(-1),
            }
        }
        "count" => {
            check_arity(name, args, 1, 1)?;
            let needle = expect_str(&args[0], "must be str")?;
            let count = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(&*needle).count()
            };
            Value::Int(i64::try_from(count).unwrap_or(i64::MAX))
        }
        "partition" | "rpartition" => {
            check_arity(name, args, 1, 1)?;
            let sep = expect_str(&args[0], "must be str")?;
            if sep.is_empty() {
                return Err(raise("ValueError", "empty separator"));
            }
            let split = if name == "partition" {
                text.split_once(&*sep)
            } else {
                text.rsplit_once(&*sep)
            };
            let parts = match (split, name) {
                (Some((head, tail)), _) => [head, &*sep, tail],
                (None, "partition") => [text, "", ""],
                (None, _) => ["", "", text],
            };
            Value::tuple(parts.into_iter().map(Value::string).collect())
        }
        "lower" => Value::string(text.to_lowercase()),
        "upper" => Value::string(text.to_uppercase()),
        "title" | "capitalize" => {
            let mut out = String::with_capacity(text.len());
            let mut boundary = true;
            for (index, c) in text.chars().enumerate() {
                let upper = if name == "title" { boundary } else { index == 0 };
                if upper {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                boundary = !c.is_alphabetic();
            }
            Value::string(out)
        }
        "isdigit" => Value::Bool(!text.is_empty() && text.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphanumeric)),
        "isspace" => Value::Bool(!text.is_empty() && text.chars().all(char::is_whitespace)),
        "islower" => Value::Bool(
            text.chars().any(char::is_lowercase) && !text.chars().any(char::is_uppercase),
        ),
        "isupper" => Value::Bool(
            text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase),
        ),
        "zfill" | "ljust" | "rjust" | "center" => {
            check_arity(name, args, 1, 2)?;
            let width = args[0]
                .as_int()
                .and_then(|w| usize::try_from(w).ok())
                .unwrap_or(0);
            let fill = optional_str(args.get(1).cloned(), "fill character")?
                .and_then(|f| f.chars().next())
                .unwrap_or(' ');
            Value::string(match name {
                "zfill" => pad(text, width, '>', '0'),
                "ljust" => pad(text, width, '<', fill),
                "rjust" => pad(text, width, '>', fill),
                _ => pad(text, width, '^', fill),
            })
        }
        // bytes are not modelled; encoding round-trips the text
        "encode" | "decode" => string(text),
        other => return Err(attribute_error(&Value::string(text), other)),
    })
}

fn split_whitespace(text: &str, limit: Option<usize>, reverse: bool) -> Vec<&str> {
    let Some(limit) = limit else {
        return text.split_whitespace().collect();
    };
    let mut parts = Vec::new();
    if reverse {
        let mut rest = text.trim_end();
        while parts.len() < limit {
            match rest.rfind(char::is_whitespace) {
                Some(index) => {
                    parts.push(&rest[index + 1..]);
                    rest = rest[..index].trim_end();
                }
                None => break,
            }
        }
        if !rest.is_empty() {
            parts.push(rest);
        }
        parts.reverse();
    } else {
        let mut rest = text.trim_start();
        while parts.len() < limit {
            match rest.find(char::is_whitespace) {
                Some(index) => {
                    parts.push(&rest[..index]);
                    rest = rest[index..].trim_start();
                }
                None => break,
            }
        }
        if !rest.is_empty() {
            parts.push(rest);
        }
    }
    parts
}

fn sequence_method(items: &[Value], name: &str, args: &[Value]) -> Exec<Value> {
    check_arity(name, args, 1, 1)?;
    let needle = &args[0];
    match name {
        "count" => Ok(Value::Int(
            i64::try_from(items.iter().filter(|item| item.py_eq(needle)).count())
                .unwrap_or(i64::MAX),
        )),
        "index" => items
            .iter()
            .position(|item| item.py_eq(needle))
            .map(|index| Value::Int(i64::try_from(index).unwrap_or(i64::MAX)))
            .ok_or_else(|| raise("ValueError", format!("{} is not in list", needle.repr()))),
        other => Err(attribute_error(&Value::tuple(items.to_vec()), other)),
    }
}

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: &[(String, Value)],
    frame: &Frame,
) -> Exec<Value> {
    let Value::List(items) = receiver else {
        return Err(attribute_error(receiver, name));
    };
    match name {
        "append" => {
            check_arity(name, &args, 1, 1)?;
            items.borrow_mut().extend(args);
        }
        "extend" => {
            check_arity(name, &args, 1, 1)?;
            let extra = iterate(&args[0])?;
            items.borrow_mut().extend(extra);
        }
        "insert" => {
            check_arity(name, &args, 2, 2)?;
            let len = items.borrow().len() as i64;
            let index = args[0].as_int().unwrap_or(0);
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            let [_, value] = <[Value; 2]>::try_from(args).unwrap_or([Value::None, Value::None]);
            items.borrow_mut().insert(index as usize, value);
        }
        "pop" => {
            check_arity(name, &args, 0, 1)?;
            let len = items.borrow().len();
            if len == 0 {
                return Err(raise("IndexError", "pop from empty list"));
            }
            let index = args.first().and_then(Value::as_int).unwrap_or(-1);
            let position = normalize_index(index, len)
                .ok_or_else(|| raise("IndexError", "pop index out of range"))?;
            return Ok(items.borrow_mut().remove(position));
        }
        "remove" => {
            check_arity(name, &args, 1, 1)?;
            let position = items
                .borrow()
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .ok_or_else(|| raise("ValueError", "list.remove(x): x not in list"))?;
            items.borrow_mut().remove(position);
        }
        "reverse" => items.borrow_mut().reverse(),
        "sort" => {
            let current = items.borrow().clone();
            let reverse = keyword(kwargs, "reverse").is_some_and(|r| r.truthy());
            let sorted = sort_values(interp, current, keyword(kwargs, "key"), reverse, frame)?;
            *items.borrow_mut() = sorted;
        }
        "copy" => return Ok(Value::list(items.borrow().clone())),
        "clear" => items.borrow_mut().clear(),
        "count" | "index" => {
            let snapshot = items.borrow().clone();
            return sequence_method(&snapshot, name, &args);
        }
        other => return Err(attribute_error(receiver, other)),
    }
    Ok(Value::None)
}

fn dict_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: &[(String, Value)],
) -> Exec<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(attribute_error(receiver, name));
    };
    match name {
        "get" => {
            check_arity(name, &args, 1, 2)?;
            Ok(dict
                .borrow()
                .get(&args[0])
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => Ok(Value::list(dict.borrow().keys())),
        "values" => Ok(Value::list(dict.borrow().values())),
        "items" => Ok(Value::list(
            dict.borrow()
                .items()
                .iter()
                .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                .collect(),
        )),
        "pop" => {
            check_arity(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0]);
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(key_error(&args[0])),
            }
        }
        "setdefault" => {
            check_arity(name, &args, 1, 2)?;
            args[0].check_hashable()?;
            let existing = dict.borrow().get(&args[0]);
            Ok(match existing {
                Some(value) => value,
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), default.clone());
                    default
                }
            })
        }
        "update" => {
            check_arity(name, &args, 0, 1)?;
            let mut entries = Vec::new();
            match args.first() {
                None | Some(Value::Opaque) => {}
                Some(Value::Dict(other)) => entries.extend(other.borrow().items().iter().cloned()),
                Some(pairs) => {
                    for pair in iterate(pairs)? {
                        let [key, value] = <[Value; 2]>::try_from(iterate(&pair)?).map_err(|_| {
                            raise(
                                "ValueError",
                                "dictionary update sequence element has wrong length",
                            )
                        })?;
                        entries.push((key, value));
                    }
                }
            }
            entries.extend(
                kwargs
                    .iter()
                    .map(|(key, value)| (Value::string(key.as_str()), value.clone())),
            );
            let mut dict = dict.borrow_mut();
            for (key, value) in entries {
                dict.insert(key, value);
            }
            Ok(Value::None)
        }
        "copy" => Ok(Value::dict(dict.borrow().clone())),
        "clear" => {
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(attribute_error(receiver, other)),
    }
}

fn set_method(receiver: &Value, name: &str, args: Vec<Value>) -> Exec<Value> {
    let Value::Set(items) = receiver else {
        return Err(attribute_error(receiver, name));
    };
    let snapshot = items.borrow().clone();
    let others = args.iter().map(iterate).collect::<Exec<Vec<_>>>()?;
    let in_all = |item: &Value| others.iter().all(|other| other.iter().any(|x| x.py_eq(item)));
    let in_any = |item: &Value| others.iter().any(|other| other.iter().any(|x| x.py_eq(item)));

    match name {
        "add" | "update" => {
            let additions = if name == "add" {
                check_arity(name, &args, 1, 1)?;
                args
            } else {
                others.into_iter().flatten().collect()
            };
            for item in &additions {
                item.check_hashable()?;
            }
            let Value::Set(merged) = Value::set(snapshot.into_iter().chain(additions).collect())
            else {
                return Ok(Value::None);
            };
            *items.borrow_mut() = merged.take();
            Ok(Value::None)
        }
        "discard" | "remove" => {
            check_arity(name, &args, 1, 1)?;
            let position = snapshot.iter().position(|item| item.py_eq(&args[0]));
            match position {
                Some(index) => {
                    items.borrow_mut().remove(index);
                }
                None if name == "remove" => return Err(key_error(&args[0])),
                None => {}
            }
            Ok(Value::None)
        }
        "union" => Ok(Value::set(
            snapshot
                .into_iter()
                .chain(others.iter().flatten().cloned())
                .collect(),
        )),
        "intersection" => Ok(Value::set(snapshot.into_iter().filter(|i| in_all(i)).collect())),
        "difference" => Ok(Value::set(snapshot.into_iter().filter(|i| !in_any(i)).collect())),
        "issubset" => Ok(Value::Bool(snapshot.iter().all(|i| in_all(i)))),
        "issuperset" => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::Bool(others[0].iter().all(|item| {
                snapshot.iter().any(|x| x.py_eq(item))
            })))
        }
        "copy" => Ok(Value::set(snapshot)),
        other => Err(attribute_error(receiver, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::string(*s)).collect()
    }

    #[test]
    fn test_str_format() {
        let kwargs = vec![("name".to_string(), Value::string("pkg"))];
        assert_eq!(
            str_format("{} {0!r} {name}-{{x}} {:>5}", &[Value::string("a"), Value::Int(7)], &kwargs)
                .unwrap(),
            "a 'a' pkg-{x}     7"
        );
        assert!(str_format("{3}", &[], &[]).is_err());
        assert_eq!(
            str_format("{0[1]}.{0[0]}", &[Value::list(strings(&["x", "y"]))], &[]).unwrap(),
            "y.x"
        );
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::string("pkg"), Value::Int(3), Value::Float(1.5)]);
        assert_eq!(percent_format("%s-%d-%.2f%%", &args).unwrap(), "pkg-3-1.50%");
        assert_eq!(percent_format("%5s|%-3d|", &Value::tuple(vec![Value::string("a"), Value::Int(1)])).unwrap(), "    a|1  |");

        let mut dict = Dict::default();
        dict.insert(Value::string("v"), Value::string("1.0"));
        assert_eq!(percent_format("v%(v)s", &Value::dict(dict)).unwrap(), "v1.0");

        assert!(percent_format("%s %s", &Value::string("one")).is_err());
        assert!(percent_format("%s", &Value::tuple(strings(&["a", "b"]))).is_err());
    }

    #[test]
    fn test_os_path_helpers() {
        let parts: Vec<Rc<str>> = ["src", "pkg", "/abs", "x.py"].iter().map(|s| Rc::from(*s)).collect();
        assert_eq!(path_join(&parts[..2]), "src/pkg");
        assert_eq!(path_join(&parts), "/abs/x.py");
        assert_eq!(path_split("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(path_split("setup.py"), ("", "setup.py"));
        assert_eq!(path_split("/setup.py"), ("/", "setup.py"));
        assert_eq!(path_splitext("a/b.tar.gz"), ("a/b.tar".to_string(), ".gz".to_string()));
        assert_eq!(path_splitext(".bashrc"), (".bashrc".to_string(), String::new()));
        assert_eq!(path_abspath("a/../b"), "/b");
    }

    #[test]
    fn test_slices() {
        assert_eq!(slice_indices(5, [Some(1), None, None]).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(slice_indices(5, [None, None, Some(-1)]).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, [Some(-2), None, None]).unwrap(), vec![3, 4]);
        assert_eq!(slice_indices(5, [None, Some(-10), None]).unwrap(), Vec::<usize>::new());
        assert!(slice_indices(5, [None, None, Some(0)]).is_err());
    }

    #[test]
    fn test_str_methods() {
        let text: Rc<str> = Rc::from("  a b  c ");
        let split = str_method(&text, "split", &[], &[]).unwrap();
        assert_eq!(split.repr(), "['a', 'b', 'c']");
        let limited = str_method(&text, "split", &[Value::None, Value::Int(1)], &[]).unwrap();
        assert_eq!(limited.repr(), "['a', 'b  c ']");

        let csv: Rc<str> = Rc::from("x,y,,z");
        let parts = str_method(&csv, "rsplit", &[Value::string(","), Value::Int(1)], &[]).unwrap();
        assert_eq!(parts.repr(), "['x,y,', 'z']");

        let version: Rc<str> = Rc::from("__version__ = '1.2'");
        let quoted = str_method(&version, "split", &[Value::string("'")], &[]).unwrap();
        assert_eq!(quoted.repr(), "['__version__ = ', '1.2', '']");

        let name: Rc<str> = Rc::from("xx-pkg-xx");
        assert_eq!(
            str_method(&name, "strip", &[Value::string("x")], &[]).unwrap().repr(),
            "'-pkg-'"
        );
        assert_eq!(
            str_method(&name, "startswith", &[Value::tuple(strings(&["a", "xx"]))], &[])
                .unwrap()
                .repr(),
            "True"
        );
    }

    #[test]
    fn test_stand_in_modules() {
        let setuptools = stand_in_module("setuptools", |_| Value::Opaque);
        assert!(matches!(
            get_attr(&setuptools, "setup").unwrap(),
            Value::Builtin(Builtin::Setup)
        ));
        assert!(matches!(get_attr(&setuptools, "Extension").unwrap(), Value::Opaque));
        assert!(matches!(stand_in_module("requests", |_| Value::None), Value::Opaque));

        let sys = stand_in_module("sys", |_| Value::Opaque);
        let version_info = get_attr(&sys, "version_info").unwrap();
        assert_eq!(get_attr(&version_info, "major").unwrap().repr(), "3");
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(&Value::string(" 42 "), None).unwrap().repr(), "42");
        assert_eq!(to_int(&Value::string("0x1f"), Some(0)).unwrap().repr(), "31");
        assert_eq!(to_int(&Value::Float(-2.7), None).unwrap().repr(), "-2");
        assert!(to_int(&Value::string("1.5"), None).is_err());
    }
}
