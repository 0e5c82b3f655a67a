use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use super::ast::LambdaDef;
use super::builtins::{Builtin, Method};
use super::namespace::{Module, Namespace};
use super::{ErrorKind, Result, ScriptError};

const JSON_DEPTH_LIMIT: usize = 32;
const COMPARE_DEPTH_LIMIT: usize = 200;

/// Runtime value of the console language.
///
/// Containers are shared and mutable (`Rc<RefCell<..>>`), so two names bound
/// to the same list observe each other's mutations.
#[derive(Debug, Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Immutable text.
    Str(Rc<str>),
    /// Mutable list.
    List(Rc<RefCell<Vec<Value>>>),
    /// Mutable insertion-ordered mapping.
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    /// User function created by `lambda`.
    Function(Rc<Function>),
    /// Builtin function.
    Builtin(Builtin),
    /// Builtin method bound to a receiver.
    Method(Rc<BoundMethod>),
    /// Imported module.
    Module(Rc<Module>),
}

/// Function value created from a lambda expression.
#[derive(Debug)]
pub struct Function {
    /// Display name.
    pub name: String,
    /// Parameters and body.
    pub def: Rc<LambdaDef>,
    /// Source the lambda was defined in.
    pub file: Rc<str>,
    /// Namespace the function resolves free names against.
    pub globals: Weak<RefCell<Namespace>>,
    /// Locals of the enclosing function at creation time.
    pub captured: BTreeMap<String, Value>,
}

/// Builtin method together with the value it was looked up on.
#[derive(Debug)]
pub struct BoundMethod {
    /// Receiver (`self`).
    pub receiver: Value,
    /// Method selector.
    pub method: Method,
}

/// Numeric view over `bool`, `int` and `float`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Bool(flag) => Some(Number::Int(i64::from(*flag))),
            Value::Int(num) => Some(Number::Int(*num)),
            Value::Float(num) => Some(Number::Float(*num)),
            _ => None,
        }
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Number::Int(num) => num as f64,
            Number::Float(num) => num,
        }
    }

    fn partial_cmp(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Str(Rc::from(text))
    }
}

impl From<i64> for Value {
    fn from(num: i64) -> Self {
        Value::Int(num)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl Value {
    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Build a dict value from ordered entries.
    pub fn dict(entries: Vec<(Value, Value)>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Type name as reported to the front end.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
        }
    }

    /// Integer view of `bool`/`int` values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(flag) => Some(i64::from(*flag)),
            Value::Int(num) => Some(*num),
            _ => None,
        }
    }

    /// Text of a `str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(flag) => *flag,
            Value::Int(num) => *num != 0,
            Value::Float(num) => *num != 0.0,
            Value::Str(text) => !text.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            _ => true,
        }
    }

    /// Developer representation (`'abc'`, `[1, 2]`).
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    /// User-facing text; differs from [`Value::repr`] only for strings.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(text) => text.to_string(),
            other => other.repr(),
        }
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<usize>) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(num) => {
                let _ = write!(out, "{}", num);
            }
            Value::Float(num) => out.push_str(&format_float(*num)),
            Value::Str(text) => write_quoted(out, text),
            Value::List(items) => {
                let id = Rc::as_ptr(items) as usize;
                if seen.contains(&id) {
                    out.push_str("[...]");
                    return;
                }
                seen.push(id);
                out.push('[');
                for (index, item) in items.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                out.push(']');
                seen.pop();
            }
            Value::Dict(entries) => {
                let id = Rc::as_ptr(entries) as usize;
                if seen.contains(&id) {
                    out.push_str("{...}");
                    return;
                }
                seen.push(id);
                out.push('{');
                for (index, (key, value)) in entries.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen);
                    out.push_str(": ");
                    value.write_repr(out, seen);
                }
                out.push('}');
                seen.pop();
            }
            Value::Function(function) => {
                let _ = write!(out, "<function {}>", function.name);
            }
            Value::Builtin(builtin) => {
                let _ = write!(out, "<built-in function {}>", builtin.name());
            }
            Value::Method(bound) => {
                let _ = write!(
                    out,
                    "<built-in method {} of {} object>",
                    bound.method.name(),
                    bound.receiver.type_name()
                );
            }
            Value::Module(module) => match module.file() {
                Some(path) => {
                    let _ = write!(out, "<module '{}' from '{}'>", module.name(), path.display());
                }
                None => {
                    let _ = write!(out, "<module '{}' (built-in)>", module.name());
                }
            },
        }
    }

    /// Identity comparison (`is`).
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    /// Value equality (`==`). Raises `RecursionError` on runaway nesting.
    pub fn py_eq(&self, other: &Value) -> Result<bool> {
        self.eq_at(other, 0)
    }

    /// Equality between dict keys, which are never containers.
    pub(crate) fn key_eq(&self, other: &Value) -> bool {
        self.eq_at(other, 0).unwrap_or(false)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> Result<bool> {
        if depth > COMPARE_DEPTH_LIMIT {
            return Err(comparison_recursion());
        }
        Ok(match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.eq_at(y, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.iter() {
                    let Some((_, other_value)) = b.iter().find(|(other_key, _)| key.key_eq(other_key))
                    else {
                        return Ok(false);
                    };
                    if !value.eq_at(other_value, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Function(_), _)
            | (Value::Method(_), _)
            | (Value::Module(_), _)
            | (Value::Builtin(_), _) => self.same(other),
            _ => match (Number::of(self), Number::of(other)) {
                (Some(a), Some(b)) => a.partial_cmp(b) == Some(Ordering::Equal),
                _ => false,
            },
        })
    }

    /// Ordering used by `<`, `sorted`, `min` and `max`. `None` when unorderable.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        self.compare_at(other, 0)
    }

    fn compare_at(&self, other: &Value, depth: usize) -> Result<Option<Ordering>> {
        if depth > COMPARE_DEPTH_LIMIT {
            return Err(comparison_recursion());
        }
        Ok(match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(Some(Ordering::Equal));
                }
                let (a, b) = (a.borrow(), b.borrow());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare_at(y, depth + 1)? {
                        Some(Ordering::Equal) => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => match (Number::of(self), Number::of(other)) {
                (Some(a), Some(b)) => a.partial_cmp(b),
                _ => None,
            },
        })
    }

    /// Introspectable members as `(name, value)` pairs sorted by name.
    pub fn members(&self) -> Vec<(String, Value)> {
        let mut members: Vec<(String, Value)> = match self {
            Value::Bool(_) | Value::Int(_) => {
                let num = self.as_int().unwrap_or_default();
                vec![
                    ("denominator".to_string(), Value::Int(1)),
                    ("imag".to_string(), Value::Int(0)),
                    ("numerator".to_string(), Value::Int(num)),
                    ("real".to_string(), Value::Int(num)),
                ]
            }
            Value::Float(num) => vec![
                ("imag".to_string(), Value::Float(0.0)),
                ("real".to_string(), Value::Float(*num)),
            ],
            Value::List(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(index, item)| (format!("[{}]", index), item.clone()))
                .collect(),
            Value::Dict(entries) => entries
                .borrow()
                .iter()
                .map(|(key, value)| (key.repr(), value.clone()))
                .collect(),
            Value::Function(function) => {
                vec![("__name__".to_string(), Value::from(function.name.as_str()))]
            }
            Value::Module(module) => module.bindings(),
            _ => Vec::new(),
        };
        members.sort_by(|a, b| a.0.cmp(&b.0));
        members
    }

    /// Attribute lookup (`value.name`).
    pub fn attribute(&self, name: &str) -> Result<Value> {
        if let Value::Module(module) = self {
            return module.attribute(name).ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::AttributeError,
                    format!("module '{}' has no attribute '{}'", module.name(), name),
                )
            });
        }
        if let Some(method) = Method::lookup(self, name) {
            return Ok(Value::Method(Rc::new(BoundMethod {
                receiver: self.clone(),
                method,
            })));
        }
        self.members()
            .into_iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::AttributeError,
                    format!("'{}' object has no attribute '{}'", self.type_name(), name),
                )
            })
    }

    /// Subscript read (`value[index]`).
    pub fn get_item(&self, index: &Value) -> Result<Value> {
        match self {
            Value::List(items) => {
                let items = items.borrow();
                let slot = sequence_index(index, items.len(), "list")?;
                Ok(items[slot].clone())
            }
            Value::Str(text) => {
                let count = text.chars().count();
                let slot = sequence_index(index, count, "string")?;
                Ok(text
                    .chars()
                    .nth(slot)
                    .map(|ch| Value::from(ch.to_string()))
                    .unwrap_or(Value::None))
            }
            Value::Dict(entries) => entries
                .borrow()
                .iter()
                .find(|(key, _)| key.key_eq(index))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ScriptError::new(ErrorKind::KeyError, index.repr())),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// Subscript write (`value[index] = item`).
    pub fn set_item(&self, index: &Value, item: Value) -> Result<()> {
        match self {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let slot = sequence_index(index, len, "list assignment")?;
                items[slot] = item;
                Ok(())
            }
            Value::Dict(entries) => {
                ensure_hashable(index)?;
                let mut entries = entries.borrow_mut();
                match entries.iter_mut().find(|(key, _)| key.key_eq(index)) {
                    Some(entry) => entry.1 = item,
                    None => entries.push((index.clone(), item)),
                }
                Ok(())
            }
            other => Err(ScriptError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// Membership test (`needle in self`).
    pub fn contains(&self, needle: &Value) -> Result<bool> {
        match self {
            Value::List(items) => {
                for item in items.borrow().iter() {
                    if item.py_eq(needle)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(entries) => Ok(entries.borrow().iter().any(|(key, _)| key.key_eq(needle))),
            Value::Str(text) => match needle {
                Value::Str(part) => Ok(text.contains(&**part)),
                other => Err(ScriptError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            other => Err(ScriptError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// JSON rendering of plain data; `None` for functions, modules and cycles.
    pub fn to_json(&self) -> Option<JsonValue> {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Option<JsonValue> {
        if depth > JSON_DEPTH_LIMIT {
            return None;
        }
        Some(match self {
            Value::None => JsonValue::Null,
            Value::Bool(flag) => JsonValue::Bool(*flag),
            Value::Int(num) => JsonValue::from(*num),
            Value::Float(num) => JsonValue::Number(serde_json::Number::from_f64(*num)?),
            Value::Str(text) => JsonValue::String(text.to_string()),
            Value::List(items) => JsonValue::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json_at(depth + 1))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Dict(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries.borrow().iter() {
                    map.insert(key.to_str(), value.to_json_at(depth + 1)?);
                }
                JsonValue::Object(map)
            }
            _ => return None,
        })
    }
}

fn comparison_recursion() -> ScriptError {
    ScriptError::new(
        ErrorKind::RecursionError,
        "maximum recursion depth exceeded in comparison",
    )
}

/// Reject values that cannot be used as dict keys.
pub(crate) fn ensure_hashable(key: &Value) -> Result<()> {
    match key {
        Value::List(_) | Value::Dict(_) => Err(ScriptError::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        ))),
        _ => Ok(()),
    }
}

fn sequence_index(index: &Value, len: usize, what: &str) -> Result<usize> {
    let raw = index.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{} indices must be integers, not {}",
            what.split(' ').next().unwrap_or(what),
            index.type_name()
        ))
    })?;
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::new(
            ErrorKind::IndexError,
            format!("{} index out of range", what),
        ));
    }
    Ok(resolved as usize)
}

fn format_float(num: f64) -> String {
    if num.is_nan() {
        "nan".to_string()
    } else if num.is_infinite() {
        let text = if num > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if num == num.trunc() && num.abs() < 1e16 {
        format!("{:.1}", num)
    } else {
        format!("{:?}", num)
    }
}

fn write_quoted(out: &mut String, text: &str) {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reprs_follow_console_conventions() {
        assert_eq!(Value::Int(2).repr(), "2");
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Float(0.5).repr(), "0.5");
        assert_eq!(Value::from("abc").repr(), "'abc'");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("abc").to_str(), "abc");
        assert_eq!(Value::None.repr(), "None");
        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::Bool(true)]);
        assert_eq!(list.repr(), "[1, 'a', True]");
        let dict = Value::dict(vec![(Value::from("k"), Value::Int(1))]);
        assert_eq!(dict.repr(), "{'k': 1}");
    }

    #[test]
    fn self_referencing_list_repr_terminates() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
        assert!(list.to_json().is_none());
    }

    #[test]
    fn comparing_distinct_cycles_raises_recursion_error() {
        let left = Value::list(Vec::new());
        let right = Value::list(Vec::new());
        for list in [&left, &right] {
            if let Value::List(items) = list {
                items.borrow_mut().push(list.clone());
            }
        }
        assert!(left.py_eq(&left).unwrap());
        let err = left.py_eq(&right).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        let err = left.compare(&right).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert!(left.contains(&left).unwrap());
    }

    #[test]
    fn members_are_sorted_by_name() {
        let names: Vec<String> = Value::Int(7).members().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["denominator", "imag", "numerator", "real"]);

        let dict = Value::dict(vec![
            (Value::from("zeta"), Value::Int(1)),
            (Value::from("alpha"), Value::Int(2)),
        ]);
        let names: Vec<String> = dict.members().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["'alpha'", "'zeta'"]);
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).py_eq(&Value::Int(1)).unwrap());
        assert!(!Value::Int(1).py_eq(&Value::from("1")).unwrap());
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(list.get_item(&Value::Int(-1)).unwrap().py_eq(&Value::Int(2)).unwrap());
        let err = list.get_item(&Value::Int(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexError);
    }

    #[test]
    fn attribute_lookup_falls_back_to_members() {
        assert!(Value::Int(5).attribute("real").unwrap().py_eq(&Value::Int(5)).unwrap());
        let err = Value::Int(5).attribute("nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AttributeError);
    }
}
