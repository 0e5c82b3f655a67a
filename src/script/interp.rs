use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::rc::Rc;

use tracing::debug;

use super::ast::{BinOp, CmpOp, Expr, Program, Stmt, StmtKind, Target, UnaryOp};
use super::builtins::{self, Builtin, CallArgs};
use super::namespace::{Module, ModuleRegistry, NamespaceRef, new_namespace};
use super::value::{Function, Number, Value, ensure_hashable};
use super::{ErrorKind, FutureFlags, Result, ScriptError, ScriptHost, parse_program};

/// Nesting limit for user function calls.
pub const MAX_CALL_DEPTH: usize = 64;

const MODULE_SCOPE: &str = "<module>";
const LAMBDA_NAME: &str = "<lambda>";

/// Value yielded by an expression statement.
#[derive(Debug, Clone)]
pub struct Produced {
    /// The value.
    pub value: Value,
    /// Name of the global the statement read, when it was a bare name.
    pub binding: Option<String>,
}

/// Tree-walking evaluator for console programs.
pub struct Interpreter<'h> {
    host: &'h mut dyn ScriptHost,
    modules: ModuleRegistry,
    depth: usize,
}

struct Scope<'s> {
    globals: &'s NamespaceRef,
    locals: Option<&'s BTreeMap<String, Value>>,
    file: &'s Rc<str>,
}

impl<'h> Interpreter<'h> {
    /// Interpreter that performs I/O through `host` and imports through `modules`.
    pub fn new(host: &'h mut dyn ScriptHost, modules: ModuleRegistry) -> Self {
        Self {
            host,
            modules,
            depth: 0,
        }
    }

    /// Execute `program` against `globals`.
    ///
    /// Returns the values produced by expression statements, in order. On
    /// failure the error carries a frame for the failing statement.
    pub fn run(&mut self, program: &Program, globals: &NamespaceRef, file: &str) -> Result<Vec<Produced>> {
        let file: Rc<str> = Rc::from(file);
        let scope = Scope {
            globals,
            locals: None,
            file: &file,
        };
        let mut produced = Vec::new();
        for stmt in &program.stmts {
            match self.exec(&scope, stmt) {
                Ok(Some(item)) => produced.push(item),
                Ok(None) => {}
                Err(err) => return Err(err.with_frame(&file, stmt.line, MODULE_SCOPE)),
            }
        }
        Ok(produced)
    }

    /// Call `callee` with positional `args`, as `callee(*args)` would.
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        self.call(
            callee,
            CallArgs {
                positional: args,
                keywords: Vec::new(),
            },
        )
    }

    fn exec(&mut self, scope: &Scope<'_>, stmt: &Stmt) -> Result<Option<Produced>> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.eval(scope, expr)?;
                if matches!(value, Value::None) {
                    return Ok(None);
                }
                let binding = match expr {
                    Expr::Name(name) => {
                        let bound = scope.globals.borrow().contains(name);
                        bound.then(|| name.clone())
                    }
                    _ => None,
                };
                Ok(Some(Produced { value, binding }))
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(scope, value)?;
                self.assign(scope, target, value)?;
                Ok(None)
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.read_target(scope, target)?;
                let operand = self.eval(scope, value)?;
                let updated = binary_op(*op, &current, &operand)?;
                self.assign(scope, target, updated)?;
                Ok(None)
            }
            StmtKind::Delete(names) => {
                for name in names {
                    let removed = scope.globals.borrow_mut().remove(name);
                    if removed.is_none() {
                        return Err(ScriptError::name_error(name));
                    }
                }
                Ok(None)
            }
            StmtKind::Import { module, bind_as } => {
                let loaded = self.import(module)?;
                scope
                    .globals
                    .borrow_mut()
                    .set(bind_as.clone(), Value::Module(loaded));
                Ok(None)
            }
            StmtKind::Future(_) | StmtKind::Pass => Ok(None),
        }
    }

    fn assign(&mut self, scope: &Scope<'_>, target: &Target, value: Value) -> Result<()> {
        match target {
            Target::Name(name) => {
                scope.globals.borrow_mut().set(name.clone(), value);
                Ok(())
            }
            Target::Attribute { object, name } => match self.eval(scope, object)? {
                Value::Module(module) => {
                    if module.set_attribute(name, value) {
                        Ok(())
                    } else {
                        Err(ScriptError::new(
                            ErrorKind::AttributeError,
                            format!("module '{}' attributes are read-only", module.name()),
                        ))
                    }
                }
                other => Err(ScriptError::new(
                    ErrorKind::AttributeError,
                    format!("'{}' object attribute '{}' is read-only", other.type_name(), name),
                )),
            },
            Target::Index { object, index } => {
                let container = self.eval(scope, object)?;
                let key = self.eval(scope, index)?;
                container.set_item(&key, value)
            }
        }
    }

    fn read_target(&mut self, scope: &Scope<'_>, target: &Target) -> Result<Value> {
        match target {
            Target::Name(name) => self.lookup(scope, name),
            Target::Attribute { object, name } => self.eval(scope, object)?.attribute(name),
            Target::Index { object, index } => {
                let container = self.eval(scope, object)?;
                let key = self.eval(scope, index)?;
                container.get_item(&key)
            }
        }
    }

    fn eval(&mut self, scope: &Scope<'_>, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(flag) => Ok(Value::Bool(*flag)),
            Expr::Int(num) => Ok(Value::Int(*num)),
            Expr::Float(num) => Ok(Value::Float(*num)),
            Expr::Str(text) => Ok(Value::from(text.as_str())),
            Expr::Name(name) => self.lookup(scope, name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(scope, item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            Expr::Dict(pairs) => self.eval_dict(scope, pairs),
            Expr::Attribute { object, name } => self.eval(scope, object)?.attribute(name),
            Expr::Index { object, index } => {
                let container = self.eval(scope, object)?;
                let key = self.eval(scope, index)?;
                container.get_item(&key)
            }
            Expr::Call {
                callee,
                args,
                keywords,
            } => self.eval_call(scope, callee, args, keywords),
            Expr::Unary { op, operand } => {
                let value = self.eval(scope, operand)?;
                unary_op(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(scope, left)?;
                let right = self.eval(scope, right)?;
                binary_op(*op, &left, &right)
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval(scope, left)?;
                let right = self.eval(scope, right)?;
                compare_op(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(scope, left)?;
                if left.truthy() {
                    self.eval(scope, right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(scope, left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(scope, right)
                }
            }
            Expr::Conditional { test, body, orelse } => {
                if self.eval(scope, test)?.truthy() {
                    self.eval(scope, body)
                } else {
                    self.eval(scope, orelse)
                }
            }
            Expr::Lambda(def) => Ok(Value::Function(Rc::new(Function {
                name: LAMBDA_NAME.to_string(),
                def: def.clone(),
                file: scope.file.clone(),
                globals: Rc::downgrade(scope.globals),
                captured: scope.locals.cloned().unwrap_or_default(),
            }))),
        }
    }

    // Kept out of `eval` so the recursive frame stays small.
    fn eval_dict(&mut self, scope: &Scope<'_>, pairs: &[(Expr, Expr)]) -> Result<Value> {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = self.eval(scope, key)?;
            ensure_hashable(&key)?;
            let value = self.eval(scope, value)?;
            match entries.iter_mut().find(|(existing, _)| existing.key_eq(&key)) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(Value::dict(entries))
    }

    fn eval_call(
        &mut self,
        scope: &Scope<'_>,
        callee: &Expr,
        args: &[Expr],
        keywords: &[(String, Expr)],
    ) -> Result<Value> {
        let callee = self.eval(scope, callee)?;
        let mut call_args = CallArgs::default();
        for arg in args {
            call_args.positional.push(self.eval(scope, arg)?);
        }
        for (name, arg) in keywords {
            if call_args.keywords.iter().any(|(seen, _)| seen == name) {
                return Err(ScriptError::syntax(format!("keyword argument repeated: {}", name)));
            }
            let value = self.eval(scope, arg)?;
            call_args.keywords.push((name.clone(), value));
        }
        self.call(callee, call_args)
    }

    fn lookup(&self, scope: &Scope<'_>, name: &str) -> Result<Value> {
        if let Some(value) = scope.locals.and_then(|locals| locals.get(name)) {
            return Ok(value.clone());
        }
        let global = scope.globals.borrow().get(name);
        if let Some(value) = global {
            return Ok(value);
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| ScriptError::name_error(name))
    }

    fn call(&mut self, callee: Value, args: CallArgs) -> Result<Value> {
        match callee {
            Value::Builtin(builtin) => builtins::call_builtin(builtin, args, &mut *self.host),
            Value::Method(bound) => builtins::call_method(&bound.receiver, bound.method, args),
            Value::Function(function) => self.call_function(&function, args),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Function, args: CallArgs) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let def = &function.def;
        let name = &function.name;
        if args.positional.len() > def.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional argument{} but {} were given",
                name,
                def.params.len(),
                if def.params.len() == 1 { "" } else { "s" },
                args.positional.len()
            )));
        }

        let mut locals = function.captured.clone();
        let mut assigned = BTreeSet::new();
        for (param, value) in def.params.iter().zip(args.positional) {
            locals.insert(param.clone(), value);
            assigned.insert(param.as_str());
        }
        for (key, value) in args.keywords {
            let Some(param) = def.params.iter().find(|param| **param == key) else {
                return Err(ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )));
            };
            if !assigned.insert(param.as_str()) {
                return Err(ScriptError::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    name, key
                )));
            }
            locals.insert(key, value);
        }
        if let Some(missing) = def.params.iter().find(|param| !assigned.contains(param.as_str())) {
            return Err(ScriptError::type_error(format!(
                "{}() missing required positional argument: '{}'",
                name, missing
            )));
        }

        let globals = function.globals.upgrade().ok_or_else(|| {
            ScriptError::new(ErrorKind::RuntimeError, "function namespace no longer exists")
        })?;
        let scope = Scope {
            globals: &globals,
            locals: Some(&locals),
            file: &function.file,
        };
        self.depth += 1;
        let result = self.eval(&scope, &def.body);
        self.depth -= 1;
        result.map_err(|err| err.with_frame(&function.file, def.line, name))
    }

    fn import(&mut self, name: &str) -> Result<Rc<Module>> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module);
        }
        let path = self.modules.locate(name).ok_or_else(|| {
            ScriptError::new(ErrorKind::ImportError, format!("No module named '{}'", name))
        })?;
        debug!(module = name, path = %path.display(), "loading module");
        let source = fs::read_to_string(&path).map_err(|err| {
            ScriptError::new(
                ErrorKind::IOError,
                format!("cannot read module '{}': {}", name, err),
            )
        })?;
        let file = path.display().to_string();
        let program = parse_program(&source, &file, FutureFlags::default())?;

        let namespace = new_namespace();
        {
            let mut ns = namespace.borrow_mut();
            ns.set("__name__", name);
            ns.set("__file__", file.as_str());
        }
        let module = self
            .modules
            .register(Module::new(name, Some(path), Some(namespace.clone())));
        if let Err(err) = self.run(&program, &namespace, &file) {
            self.modules.unregister(name);
            return Err(err);
        }
        Ok(module)
    }
}

fn unary_op(op: UnaryOp, value: &Value) -> Result<Value> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!value.truthy()));
    }
    let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
    match (op, Number::of(value)) {
        (UnaryOp::Neg, Some(Number::Int(num))) => num.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Number::Float(num))) => Ok(Value::Float(-num)),
        (_, Some(Number::Int(num))) => Ok(Value::Int(num)),
        (_, Some(Number::Float(num))) => Ok(Value::Float(num)),
        (_, None) => Err(ScriptError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            value.type_name()
        ))),
    }
}

/// Apply an arithmetic operator.
pub(crate) fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::from(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Mul, Value::Str(text), count) | (BinOp::Mul, count, Value::Str(text))
            if count.as_int().is_some() =>
        {
            let times = repeat_count(count, text.chars().count())?;
            return Ok(Value::from(text.repeat(times)));
        }
        (BinOp::Mul, Value::List(items), count) | (BinOp::Mul, count, Value::List(items))
            if count.as_int().is_some() =>
        {
            let items = items.borrow();
            let times = repeat_count(count, items.len())?;
            let mut repeated = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                repeated.extend(items.iter().cloned());
            }
            return Ok(Value::list(repeated));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) else {
        return Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_op(op, x, y),
        _ => float_op(op, a.as_f64(), b.as_f64()),
    }
}

fn repeat_count(count: &Value, unit: usize) -> Result<usize> {
    let times = count.as_int().unwrap_or(0).max(0) as usize;
    if unit.saturating_mul(times) > 100_000_000 {
        return Err(ScriptError::new(ErrorKind::OverflowError, "repeated sequence is too long"));
    }
    Ok(times)
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value> {
    let value = match op {
        BinOp::Add => Value::Int(x.checked_add(y).ok_or_else(overflow)?),
        BinOp::Sub => Value::Int(x.checked_sub(y).ok_or_else(overflow)?),
        BinOp::Mul => Value::Int(x.checked_mul(y).ok_or_else(overflow)?),
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            Value::Float(x as f64 / y as f64)
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let quotient = x.checked_div(y).ok_or_else(overflow)?;
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Value::Int(if adjust { quotient - 1 } else { quotient })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let rem = x.checked_rem(y).ok_or_else(overflow)?;
            Value::Int(if rem != 0 && ((rem < 0) != (y < 0)) { rem + y } else { rem })
        }
        BinOp::Pow => {
            if y >= 0 {
                let exp = u32::try_from(y).map_err(|_| overflow())?;
                Value::Int(x.checked_pow(exp).ok_or_else(overflow)?)
            } else if x == 0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            } else {
                Value::Float((x as f64).powf(y as f64))
            }
        }
    };
    Ok(value)
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let rem = x % y;
            if rem != 0.0 && ((rem < 0.0) != (y < 0.0)) {
                rem + y
            } else {
                rem
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(value))
}

fn compare_op(op: CmpOp, left: &Value, right: &Value) -> Result<Value> {
    let result = match op {
        CmpOp::Eq => left.py_eq(right)?,
        CmpOp::NotEq => !left.py_eq(right)?,
        CmpOp::Is => left.same(right),
        CmpOp::IsNot => !left.same(right),
        CmpOp::In => right.contains(left)?,
        CmpOp::NotIn => !right.contains(left)?,
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            if let (Some(Number::Float(_)), Some(_)) | (Some(_), Some(Number::Float(_))) =
                (Number::of(left), Number::of(right))
            {
                let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) else {
                    return Ok(Value::Bool(false));
                };
                let (x, y) = (a.as_f64(), b.as_f64());
                return Ok(Value::Bool(match op {
                    CmpOp::Lt => x < y,
                    CmpOp::LtE => x <= y,
                    CmpOp::Gt => x > y,
                    _ => x >= y,
                }));
            }
            let symbol = match op {
                CmpOp::Lt => "<",
                CmpOp::LtE => "<=",
                CmpOp::Gt => ">",
                _ => ">=",
            };
            let order = left.compare(right)?.ok_or_else(|| {
                ScriptError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            match op {
                CmpOp::Lt => order.is_lt(),
                CmpOp::LtE => order.is_le(),
                CmpOp::Gt => order.is_gt(),
                _ => order.is_ge(),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn overflow() -> ScriptError {
    ScriptError::new(ErrorKind::OverflowError, "integer overflow")
}

fn zero_division(message: &str) -> ScriptError {
    ScriptError::new(ErrorKind::ZeroDivisionError, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::testing::BufferedHost;

    fn run_with(host: &mut BufferedHost, globals: &NamespaceRef, source: &str) -> Result<Vec<Produced>> {
        let program = parse_program(source, "<stdin>", FutureFlags::default())?;
        let registry = ModuleRegistry::new(&[], ">>> ", "... ");
        Interpreter::new(host, registry).run(&program, globals, "<stdin>")
    }

    fn eval_repr(source: &str) -> String {
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        let produced = run_with(&mut host, &globals, source).expect("run");
        produced.last().map(|item| item.value.repr()).unwrap_or_default()
    }

    #[test]
    fn arithmetic_follows_console_semantics() {
        assert_eq!(eval_repr("1 + 1"), "2");
        assert_eq!(eval_repr("7 // -2"), "-4");
        assert_eq!(eval_repr("-7 % 3"), "2");
        assert_eq!(eval_repr("1 / 2"), "0.5");
        assert_eq!(eval_repr("2 ** 10"), "1024");
        assert_eq!(eval_repr("'ab' * 2"), "'abab'");
        assert_eq!(eval_repr("[1] + [2]"), "[1, 2]");
    }

    #[test]
    fn zero_division_is_reported() {
        let mut host = BufferedHost::default();
        let err = run_with(&mut host, &new_namespace(), "x = 1\n1 / 0").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
        assert_eq!(err.traceback[0].line, 2);
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let mut host = BufferedHost::default();
        let err = run_with(&mut host, &new_namespace(), "9223372036854775807 + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);
    }

    #[test]
    fn produced_values_carry_global_binding() {
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        let produced = run_with(&mut host, &globals, "x = 5\nx\nx + 1\nNone").unwrap();
        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].binding.as_deref(), Some("x"));
        assert_eq!(produced[1].binding, None);
    }

    #[test]
    fn state_persists_across_runs() {
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        run_with(&mut host, &globals, "items = []\nitems.append(3)").unwrap();
        let produced = run_with(&mut host, &globals, "items").unwrap();
        assert_eq!(produced[0].value.repr(), "[3]");
    }

    #[test]
    fn lambdas_capture_and_recurse() {
        assert_eq!(eval_repr("add = lambda a, b: a + b\nadd(2, b=3)"), "5");
        assert_eq!(eval_repr("mk = lambda n: lambda m: n * m\nmk(3)(4)"), "12");
        assert_eq!(
            eval_repr("fact = lambda n: 1 if n <= 1 else n * fact(n - 1)\nfact(10)"),
            "3628800"
        );
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let mut host = BufferedHost::default();
        let err = run_with(&mut host, &new_namespace(), "f = lambda n: f(n + 1)\nf(0)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
    }

    #[test]
    fn deep_conditional_recursion_raises_on_the_test_thread() {
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        let source = "f = lambda n: f(n - 1) if n else 0\nf(1000)";
        let err = run_with(&mut host, &globals, source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        let produced = run_with(&mut host, &globals, "f(50)").unwrap();
        assert_eq!(produced[0].value.repr(), "0");
    }

    #[test]
    fn print_goes_through_host() {
        let mut host = BufferedHost::default();
        run_with(&mut host, &new_namespace(), "print('hi', 2)").unwrap();
        assert_eq!(host.stdout, "hi 2\n");
    }

    #[test]
    fn unknown_names_raise_name_error() {
        let mut host = BufferedHost::default();
        let err = run_with(&mut host, &new_namespace(), "missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.traceback[0].scope, "<module>");
    }

    #[test]
    fn del_removes_bindings() {
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        run_with(&mut host, &globals, "a = 1\ndel a").unwrap();
        assert!(!globals.borrow().contains("a"));
    }

    #[test]
    fn imports_modules_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.rws"), "double = lambda x: x * 2\n").unwrap();
        let mut host = BufferedHost::default();
        let globals = new_namespace();
        let registry = ModuleRegistry::new(&[dir.path().to_path_buf()], ">>> ", "... ");
        let program = parse_program("import helpers as h\nh.double(21)", "<stdin>", FutureFlags::default()).unwrap();
        let produced = Interpreter::new(&mut host, registry.clone())
            .run(&program, &globals, "<stdin>")
            .unwrap();
        assert_eq!(produced[0].value.repr(), "42");
        assert!(registry.get("helpers").is_some());
    }
}
