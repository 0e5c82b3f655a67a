use std::cmp::Ordering;

use super::value::{Number, Value, ensure_hashable};
use super::{ErrorKind, Result, ScriptError, ScriptHost, Stream};

const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// Builtin functions available in every namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Builtin {
    Abs,
    Bool,
    Dict,
    Float,
    Input,
    Int,
    Len,
    List,
    Max,
    Min,
    Print,
    Range,
    Repr,
    Sorted,
    Str,
    Type,
    /// `__output_special(raw, info)`: emit `info['value']` under
    /// `info['contentType']`. Bound into `__main__`, not a global builtin.
    OutputSpecial,
}

impl Builtin {
    /// Every builtin, in name order.
    pub const ALL: [Builtin; 16] = [
        Builtin::Abs,
        Builtin::Bool,
        Builtin::Dict,
        Builtin::Float,
        Builtin::Input,
        Builtin::Int,
        Builtin::Len,
        Builtin::List,
        Builtin::Max,
        Builtin::Min,
        Builtin::Print,
        Builtin::Range,
        Builtin::Repr,
        Builtin::Sorted,
        Builtin::Str,
        Builtin::Type,
    ];

    /// Name the builtin is bound under.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Bool => "bool",
            Builtin::Dict => "dict",
            Builtin::Float => "float",
            Builtin::Input => "input",
            Builtin::Int => "int",
            Builtin::Len => "len",
            Builtin::List => "list",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Print => "print",
            Builtin::Range => "range",
            Builtin::Repr => "repr",
            Builtin::Sorted => "sorted",
            Builtin::Str => "str",
            Builtin::Type => "type",
            Builtin::OutputSpecial => "__output_special",
        }
    }

    /// Resolve a builtin by name.
    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.iter().copied().find(|builtin| builtin.name() == name)
    }
}

/// Output category `__output_special` uses when none is given.
pub const SPECIAL_CATEGORY: &str = "console";

/// Builtin methods on `list`, `dict` and `str` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Method {
    Append,
    Pop,
    Get,
    Keys,
    Values,
    Items,
    Upper,
    Lower,
    Strip,
    Split,
    Join,
}

impl Method {
    /// Method name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Append => "append",
            Method::Pop => "pop",
            Method::Get => "get",
            Method::Keys => "keys",
            Method::Values => "values",
            Method::Items => "items",
            Method::Upper => "upper",
            Method::Lower => "lower",
            Method::Strip => "strip",
            Method::Split => "split",
            Method::Join => "join",
        }
    }

    /// Method `name` of `receiver`, if it has one.
    pub fn lookup(receiver: &Value, name: &str) -> Option<Method> {
        let method = match (receiver, name) {
            (Value::List(_), "append") => Method::Append,
            (Value::List(_), "pop") => Method::Pop,
            (Value::Dict(_), "get") => Method::Get,
            (Value::Dict(_), "keys") => Method::Keys,
            (Value::Dict(_), "values") => Method::Values,
            (Value::Dict(_), "items") => Method::Items,
            (Value::Str(_), "upper") => Method::Upper,
            (Value::Str(_), "lower") => Method::Lower,
            (Value::Str(_), "strip") => Method::Strip,
            (Value::Str(_), "split") => Method::Split,
            (Value::Str(_), "join") => Method::Join,
            _ => return None,
        };
        Some(method)
    }
}

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub struct CallArgs {
    /// Positional arguments.
    pub positional: Vec<Value>,
    /// Keyword arguments in call order.
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    fn check(&self, function: &str, min: usize, max: usize, keywords: &[&str]) -> Result<()> {
        if let Some((key, _)) = self.keywords.iter().find(|(key, _)| !keywords.contains(&key.as_str())) {
            return Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                function, key
            )));
        }
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("exactly {}", min)
            } else if given < min {
                format!("at least {}", min)
            } else {
                format!("at most {}", max)
            };
            return Err(ScriptError::type_error(format!(
                "{}() takes {} argument{} ({} given)",
                function,
                expected,
                if min == max && min == 1 { "" } else { "s" },
                given
            )));
        }
        Ok(())
    }
}

/// Invoke a builtin function.
pub(crate) fn call_builtin(builtin: Builtin, args: CallArgs, host: &mut dyn ScriptHost) -> Result<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            args.check(name, 0, usize::MAX, &["sep", "end", "file"])?;
            let sep = text_option(args.keyword("sep"), "sep", " ")?;
            let end = text_option(args.keyword("end"), "end", "\n")?;
            let stream = match args.keyword("file") {
                None | Some(Value::None) => Stream::Stdout,
                Some(Value::Str(target)) if &**target == "stdout" => Stream::Stdout,
                Some(Value::Str(target)) if &**target == "stderr" => Stream::Stderr,
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "print() file must be sys.stdout or sys.stderr, not {}",
                        other.repr()
                    )));
                }
            };
            let mut text = args
                .positional
                .iter()
                .map(Value::to_str)
                .collect::<Vec<_>>()
                .join(sep.as_str());
            text.push_str(&end);
            host.write(stream, &text);
            Ok(Value::None)
        }
        Builtin::Input => {
            args.check(name, 0, 1, &[])?;
            if let Some(prompt) = args.positional.first() {
                host.write(Stream::Stdout, &prompt.to_str());
            }
            let line = host
                .read_line()
                .ok_or_else(|| ScriptError::new(ErrorKind::EOFError, "EOF when reading a line"))?;
            Ok(Value::from(line.trim_end_matches(['\n', '\r'])))
        }
        Builtin::Len => {
            args.check(name, 1, 1, &[])?;
            let len = match &args.positional[0] {
                Value::Str(text) => text.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Dict(entries) => entries.borrow().len(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        Builtin::Str => {
            args.check(name, 0, 1, &[])?;
            Ok(Value::from(
                args.positional.first().map(Value::to_str).unwrap_or_default(),
            ))
        }
        Builtin::Repr => {
            args.check(name, 1, 1, &[])?;
            Ok(Value::from(args.positional[0].repr()))
        }
        Builtin::Type => {
            args.check(name, 1, 1, &[])?;
            Ok(Value::from(args.positional[0].type_name()))
        }
        Builtin::OutputSpecial => {
            args.check(name, 2, 2, &[])?;
            let info = &args.positional[1];
            let Value::Dict(entries) = info else {
                return Err(ScriptError::type_error(format!(
                    "{}() argument 2 must be dict, not {}",
                    name,
                    info.type_name()
                )));
            };
            let field = |key: &str| {
                entries
                    .borrow()
                    .iter()
                    .find(|(existing, _)| existing.as_str() == Some(key))
                    .map(|(_, value)| value.clone())
            };
            let category = field("contentType")
                .map(|value| value.to_str())
                .unwrap_or_else(|| SPECIAL_CATEGORY.to_string());
            let text = field("value")
                .map(|value| value.to_str())
                .unwrap_or_else(|| info.repr());
            host.write_special(&category, &text);
            Ok(Value::None)
        }
        Builtin::Bool => {
            args.check(name, 0, 1, &[])?;
            Ok(Value::Bool(args.positional.first().is_some_and(Value::truthy)))
        }
        Builtin::Int => {
            args.check(name, 0, 1, &[])?;
            match args.positional.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Bool(flag)) => Ok(Value::Int(i64::from(*flag))),
                Some(Value::Int(num)) => Ok(Value::Int(*num)),
                Some(Value::Float(num)) => float_to_int(*num),
                Some(Value::Str(text)) => text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    ScriptError::value_error(format!(
                        "invalid literal for int() with base 10: {}",
                        Value::Str(text.clone()).repr()
                    ))
                }),
                Some(other) => Err(ScriptError::type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Float => {
            args.check(name, 0, 1, &[])?;
            match args.positional.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(text)) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    ScriptError::value_error(format!(
                        "could not convert string to float: {}",
                        Value::Str(text.clone()).repr()
                    ))
                }),
                Some(other) => match Number::of(other) {
                    Some(num) => Ok(Value::Float(num.as_f64())),
                    None => Err(ScriptError::type_error(format!(
                        "float() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                },
            }
        }
        Builtin::Abs => {
            args.check(name, 1, 1, &[])?;
            match Number::of(&args.positional[0]) {
                Some(Number::Int(num)) => num
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::new(ErrorKind::OverflowError, "integer overflow")),
                Some(Number::Float(num)) => Ok(Value::Float(num.abs())),
                None => Err(ScriptError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    args.positional[0].type_name()
                ))),
            }
        }
        Builtin::Min | Builtin::Max => {
            args.check(name, 1, usize::MAX, &[])?;
            let candidates = if args.positional.len() == 1 {
                iterate(&args.positional[0])?
            } else {
                args.positional
            };
            let wanted = if builtin == Builtin::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = candidates.into_iter();
            let mut best = iter
                .next()
                .ok_or_else(|| ScriptError::value_error(format!("{}() arg is an empty sequence", name)))?;
            for candidate in iter {
                if ordering(&candidate, &best)? == wanted {
                    best = candidate;
                }
            }
            Ok(best)
        }
        Builtin::Sorted => {
            args.check(name, 1, 1, &["reverse"])?;
            let mut items = iterate(&args.positional[0])?;
            let mut failure = None;
            items.sort_by(|a, b| match ordering(a, b) {
                Ok(order) => order,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
            if args.keyword("reverse").is_some_and(Value::truthy) {
                items.reverse();
            }
            Ok(Value::list(items))
        }
        Builtin::Range => {
            args.check(name, 1, 3, &[])?;
            let bounds = args
                .positional
                .iter()
                .map(|arg| {
                    arg.as_int().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            arg.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<i64>>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return Err(ScriptError::value_error("range() arg 3 must not be zero"));
            }
            let span = if step > 0 {
                (stop as i128 - start as i128 + step as i128 - 1) / step as i128
            } else {
                (start as i128 - stop as i128 - step as i128 - 1) / (-(step as i128))
            };
            let count = span.max(0) as usize;
            if count > MAX_SEQUENCE_LEN {
                return Err(ScriptError::new(ErrorKind::OverflowError, "range too large"));
            }
            Ok(Value::list(
                (0..count)
                    .map(|index| Value::Int(start + step * index as i64))
                    .collect(),
            ))
        }
        Builtin::List => {
            args.check(name, 0, 1, &[])?;
            match args.positional.first() {
                Some(source) => Ok(Value::list(iterate(source)?)),
                None => Ok(Value::list(Vec::new())),
            }
        }
        Builtin::Dict => {
            args.check(name, 0, 1, &[])?;
            let mut entries = match args.positional.first() {
                Some(Value::Dict(source)) => source.borrow().clone(),
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "'{}' object is not a mapping",
                        other.type_name()
                    )));
                }
                None => Vec::new(),
            };
            for (key, value) in args.keywords {
                let key = Value::from(key);
                match entries.iter_mut().find(|(existing, _)| existing.key_eq(&key)) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
            Ok(Value::dict(entries))
        }
    }
}

/// Invoke a builtin method on its receiver.
pub(crate) fn call_method(receiver: &Value, method: Method, args: CallArgs) -> Result<Value> {
    let name = method.name();
    match (method, receiver) {
        (Method::Append, Value::List(items)) => {
            args.check(name, 1, 1, &[])?;
            let item = args.positional.into_iter().next().unwrap_or(Value::None);
            items.borrow_mut().push(item);
            Ok(Value::None)
        }
        (Method::Pop, Value::List(items)) => {
            args.check(name, 0, 1, &[])?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(ScriptError::new(ErrorKind::IndexError, "pop from empty list"));
            }
            let len = items.len() as i64;
            let raw = match args.positional.first() {
                Some(index) => index.as_int().ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        index.type_name()
                    ))
                })?,
                None => -1,
            };
            let slot = if raw < 0 { raw + len } else { raw };
            if slot < 0 || slot >= len {
                return Err(ScriptError::new(ErrorKind::IndexError, "pop index out of range"));
            }
            Ok(items.remove(slot as usize))
        }
        (Method::Get, Value::Dict(entries)) => {
            args.check(name, 1, 2, &[])?;
            let key = &args.positional[0];
            ensure_hashable(key)?;
            let found = entries
                .borrow()
                .iter()
                .find(|(existing, _)| existing.key_eq(key))
                .map(|(_, value)| value.clone());
            Ok(found.unwrap_or_else(|| args.positional.get(1).cloned().unwrap_or(Value::None)))
        }
        (Method::Keys, Value::Dict(entries)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::list(entries.borrow().iter().map(|(key, _)| key.clone()).collect()))
        }
        (Method::Values, Value::Dict(entries)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::list(entries.borrow().iter().map(|(_, value)| value.clone()).collect()))
        }
        (Method::Items, Value::Dict(entries)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| Value::list(vec![key.clone(), value.clone()]))
                    .collect(),
            ))
        }
        (Method::Upper, Value::Str(text)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::from(text.to_uppercase()))
        }
        (Method::Lower, Value::Str(text)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::from(text.to_lowercase()))
        }
        (Method::Strip, Value::Str(text)) => {
            args.check(name, 0, 0, &[])?;
            Ok(Value::from(text.trim()))
        }
        (Method::Split, Value::Str(text)) => {
            args.check(name, 0, 1, &[])?;
            let parts: Vec<Value> = match args.positional.first() {
                None | Some(Value::None) => text.split_whitespace().map(Value::from).collect(),
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ScriptError::value_error("empty separator"));
                }
                Some(Value::Str(sep)) => text.split(&**sep).map(Value::from).collect(),
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::list(parts))
        }
        (Method::Join, Value::Str(sep)) => {
            args.check(name, 1, 1, &[])?;
            let items = iterate(&args.positional[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            index,
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::from(parts.join(&**sep)))
        }
        (method, receiver) => Err(ScriptError::type_error(format!(
            "'{}' object has no method '{}'",
            receiver.type_name(),
            method.name()
        ))),
    }
}

/// Items of an iterable value.
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Dict(entries) => Ok(entries.borrow().iter().map(|(key, _)| key.clone()).collect()),
        Value::Str(text) => Ok(text.chars().map(|ch| Value::from(ch.to_string())).collect()),
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn ordering(left: &Value, right: &Value) -> Result<Ordering> {
    left.compare(right)?.ok_or_else(|| {
        ScriptError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn text_option(value: Option<&Value>, name: &str, default: &str) -> Result<String> {
    match value {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(text)) => Ok(text.to_string()),
        Some(other) => Err(ScriptError::type_error(format!(
            "{} must be None or a string, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn float_to_int(num: f64) -> Result<Value> {
    if num.is_nan() {
        return Err(ScriptError::value_error("cannot convert float NaN to integer"));
    }
    if num.is_infinite() {
        return Err(ScriptError::new(
            ErrorKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = num.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(ScriptError::new(ErrorKind::OverflowError, "integer overflow"));
    }
    Ok(Value::Int(truncated as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::testing::BufferedHost;

    fn positional(values: Vec<Value>) -> CallArgs {
        CallArgs {
            positional: values,
            keywords: Vec::new(),
        }
    }

    #[test]
    fn print_honours_sep_end_and_file() {
        let mut host = BufferedHost::default();
        let args = CallArgs {
            positional: vec![Value::Int(1), Value::from("a")],
            keywords: vec![
                ("sep".into(), Value::from("-")),
                ("end".into(), Value::from("!")),
                ("file".into(), Value::from("stderr")),
            ],
        };
        call_builtin(Builtin::Print, args, &mut host).unwrap();
        assert_eq!(host.stderr, "1-a!");
        assert!(host.stdout.is_empty());
    }

    #[test]
    fn input_reads_from_host_and_reports_eof() {
        let mut host = BufferedHost::default();
        host.input.push_back("hello\n".into());
        let value = call_builtin(Builtin::Input, positional(vec![Value::from("? ")]), &mut host).unwrap();
        assert_eq!(value.to_str(), "hello");
        assert_eq!(host.stdout, "? ");
        let err = call_builtin(Builtin::Input, CallArgs::default(), &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EOFError);
    }

    #[test]
    fn range_and_sorted() {
        let mut host = BufferedHost::default();
        let range = call_builtin(
            Builtin::Range,
            positional(vec![Value::Int(5), Value::Int(0), Value::Int(-2)]),
            &mut host,
        )
        .unwrap();
        assert_eq!(range.repr(), "[5, 3, 1]");
        let sorted = call_builtin(Builtin::Sorted, positional(vec![range]), &mut host).unwrap();
        assert_eq!(sorted.repr(), "[1, 3, 5]");
        let err = call_builtin(
            Builtin::Sorted,
            positional(vec![Value::list(vec![Value::Int(1), Value::from("a")])]),
            &mut host,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn int_parses_strings_and_rejects_garbage() {
        let mut host = BufferedHost::default();
        let ok = call_builtin(Builtin::Int, positional(vec![Value::from(" 42 ")]), &mut host).unwrap();
        assert!(ok.py_eq(&Value::Int(42)).unwrap());
        let err = call_builtin(Builtin::Int, positional(vec![Value::from("x")]), &mut host).unwrap_err();
        assert_eq!(err.message, "invalid literal for int() with base 10: 'x'");
    }

    #[test]
    fn string_methods() {
        let text = Value::from(" a b ");
        let split = call_method(&text, Method::Split, CallArgs::default()).unwrap();
        assert_eq!(split.repr(), "['a', 'b']");
        let joined = call_method(&Value::from(","), Method::Join, positional(vec![split])).unwrap();
        assert_eq!(joined.to_str(), "a,b");
    }

    #[test]
    fn list_pop_from_empty_is_an_index_error() {
        let list = Value::list(Vec::new());
        let err = call_method(&list, Method::Pop, CallArgs::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexError);
    }
}
