//! Tree-walking evaluator holding the session namespace.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::error::{ScriptError, ScriptResult};
use crate::parser::{BinaryOp, Expr, Program, Stmt, UnaryOp, parse};
use crate::value::{FileHandle, Handle, IterState, Value};

/// What running one piece of code produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// Text written by `print`
    pub stdout: String,
    /// Value of the final statement, when it is a non-nil expression
    pub value: Option<Value>,
}

/// A live session: the namespace plus the code that mutates it.
#[derive(Debug, Default)]
pub struct Interpreter {
    globals: BTreeMap<String, Value>,
    stdout: String,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and run code against the namespace.
    ///
    /// Nothing runs if the code does not parse. A runtime error leaves the
    /// bindings made by earlier statements in place.
    pub fn run(&mut self, source: &str) -> ScriptResult<Evaluation> {
        let program = parse(source)?;
        self.run_program(&program)
    }

    pub fn run_program(&mut self, program: &Program) -> ScriptResult<Evaluation> {
        self.stdout.clear();
        let mut last = None;

        for stmt in &program.statements {
            last = match stmt {
                Stmt::Assign(name, expr) => {
                    let value = self.eval(expr)?;
                    trace!("bind {} = {}", name, value.repr());
                    self.globals.insert(name.clone(), value);
                    None
                }
                Stmt::Del(name) => {
                    if self.globals.remove(name).is_none() {
                        return Err(ScriptError::Name(name.clone()));
                    }
                    None
                }
                Stmt::Expr(expr) => Some(self.eval(expr)?),
            };
        }

        Ok(Evaluation {
            stdout: std::mem::take(&mut self.stdout),
            value: last.filter(|v| !matches!(v, Value::Nil)),
        })
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Bind a name directly.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// The whole namespace, ordered by name.
    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    /// Replace the whole namespace.
    pub fn replace_bindings(&mut self, bindings: BTreeMap<String, Value>) {
        self.globals = bindings;
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::List(items))
            }
            Expr::Name(name) => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::Name(name.clone())),
            Expr::Unary(ops, operand) => {
                let value = self.eval(operand)?;
                ops.iter().rev().try_fold(value, |value, op| unary(*op, value))
            }
            Expr::Binary(first, rest) => {
                let mut acc = self.eval(first)?;
                for (op, operand) in rest {
                    acc = match op {
                        BinaryOp::And if !acc.is_truthy() => acc,
                        BinaryOp::Or if acc.is_truthy() => acc,
                        BinaryOp::And | BinaryOp::Or => self.eval(operand)?,
                        _ => {
                            let right = self.eval(operand)?;
                            binary(*op, acc, right)?
                        }
                    };
                }
                Ok(acc)
            }
            Expr::Index(target, indices) => {
                let mut value = self.eval(target)?;
                for index in indices {
                    let index = self.eval(index)?;
                    value = index_value(&value, &index)?;
                }
                Ok(value)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<ScriptResult<Vec<_>>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        match name {
            "print" => {
                let line: Vec<String> = args.iter().map(Value::display).collect();
                self.stdout.push_str(&line.join(" "));
                self.stdout.push('\n');
                Ok(Value::Nil)
            }
            "len" => match one(name, args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(ScriptError::type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            "str" => Ok(Value::Str(one(name, args)?.display())),
            "int" => to_int(one(name, args)?),
            "float" => to_float(one(name, args)?),
            "type" => Ok(Value::Str(one(name, args)?.type_name().to_string())),
            "abs" => match one(name, args)? {
                Value::Int(n) => n.checked_abs().map(Value::Int).ok_or(ScriptError::Overflow),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(bad_operand("abs()", &other)),
            },
            "range" => range(args),
            "sum" => match one(name, args)? {
                Value::List(items) => items
                    .into_iter()
                    .try_fold(Value::Int(0), |acc, item| binary(BinaryOp::Add, acc, item)),
                other => Err(bad_operand("sum()", &other)),
            },
            "min" | "max" => extreme(name, args),
            "append" => {
                let [list, item] = exactly::<2>(name, args)?;
                match list {
                    Value::List(mut items) => {
                        items.push(item);
                        Ok(Value::List(items))
                    }
                    other => Err(bad_operand("append()", &other)),
                }
            }
            "sleep" => {
                let seconds = match one(name, args)? {
                    Value::Int(n) => n as f64,
                    Value::Float(x) => x,
                    other => return Err(bad_operand("sleep()", &other)),
                };
                if !(seconds.is_finite() && seconds >= 0.0) {
                    return Err(ScriptError::Value(
                        "sleep length must be a non-negative number".to_string(),
                    ));
                }
                std::thread::sleep(Duration::from_secs_f64(seconds));
                Ok(Value::Nil)
            }
            "open" => match one(name, args)? {
                Value::Str(path) => {
                    let file = FileHandle::open(PathBuf::from(path))?;
                    Ok(Value::Handle(Handle::File(Rc::new(RefCell::new(file)))))
                }
                other => Err(bad_operand("open()", &other)),
            },
            "read" => match one(name, args)? {
                Value::Handle(Handle::File(file)) => {
                    Ok(Value::Str(file.borrow_mut().read_to_end()?))
                }
                other => Err(bad_operand("read()", &other)),
            },
            "iter" => {
                let items = match one(name, args)? {
                    Value::List(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => return Err(bad_operand("iter()", &other)),
                };
                Ok(Value::Handle(Handle::Iter(Rc::new(RefCell::new(
                    IterState::new(items),
                )))))
            }
            "next" => match one(name, args)? {
                Value::Handle(Handle::Iter(state)) => {
                    Ok(state.borrow_mut().next_item().unwrap_or(Value::Nil))
                }
                other => Err(bad_operand("next()", &other)),
            },
            _ => {
                if self.globals.contains_key(name) {
                    Err(ScriptError::type_error(format!(
                        "'{}' is not callable",
                        name
                    )))
                } else {
                    Err(ScriptError::Name(name.to_string()))
                }
            }
        }
    }
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> ScriptResult<[Value; N]> {
    let count = args.len();
    args.try_into().map_err(|_| {
        ScriptError::type_error(format!(
            "{}() takes {} argument{} ({} given)",
            name,
            N,
            if N == 1 { "" } else { "s" },
            count
        ))
    })
}

fn one(name: &str, args: Vec<Value>) -> ScriptResult<Value> {
    let [value] = exactly::<1>(name, args)?;
    Ok(value)
}

fn bad_operand(what: &str, value: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "bad operand type for {}: '{}'",
        what,
        value.type_name()
    ))
}

fn to_int(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(x) => {
            let truncated = x.trunc();
            if x.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(ScriptError::Value(format!(
                    "cannot convert float {} to int",
                    Value::Float(x).repr()
                )))
            }
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::Value(format!(
                "invalid literal for int(): {}",
                Value::Str(s.clone()).repr()
            ))
        }),
        other => Err(bad_operand("int()", &other)),
    }
}

fn to_float(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Float(n as f64)),
        Value::Float(x) => Ok(Value::Float(x)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ScriptError::Value(format!(
                "could not convert string to float: {}",
                Value::Str(s.clone()).repr()
            ))
        }),
        other => Err(bad_operand("float()", &other)),
    }
}

fn range(args: Vec<Value>) -> ScriptResult<Value> {
    let bounds = args
        .iter()
        .map(|arg| match arg {
            Value::Int(n) => Ok(*n),
            other => Err(ScriptError::type_error(format!(
                "range() arguments must be int, not '{}'",
                other.type_name()
            ))),
        })
        .collect::<ScriptResult<Vec<i64>>>()?;

    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(ScriptError::type_error(format!(
                "range() takes 1 to 3 arguments ({} given)",
                bounds.len()
            )));
        }
    };
    if step == 0 {
        return Err(ScriptError::Value("range() step must not be zero".to_string()));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}

fn extreme(name: &str, mut args: Vec<Value>) -> ScriptResult<Value> {
    let items = if args.len() == 1 {
        match args.remove(0) {
            Value::List(items) => items,
            other => return Err(bad_operand(&format!("{}()", name), &other)),
        }
    } else {
        args
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(ScriptError::Value(format!("{}() arg is an empty sequence", name)));
    };
    for item in items {
        let ordering = compare(&item, &best)?;
        let better = if name == "min" {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if better {
            best = item;
        }
    }
    Ok(best)
}

fn unary(op: UnaryOp, value: Value) -> ScriptResult<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or(ScriptError::Overflow),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, other) => Err(bad_operand("unary -", &other)),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> ScriptResult<Value> {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, &left, &right) {
        (_, Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(items))
        }
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(s.repeat(repeat_count(*n, s.len())?)))
        }
        (BinaryOp::Mul, Value::List(items), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            let count = repeat_count(*n, items.len())?;
            let mut repeated = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::List(repeated))
        }
        _ => match (as_float(&left), as_float(&right)) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(ScriptError::type_error(format!(
                "unsupported operand types for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

/// Repetition count for `*`, rejecting results that would not fit in memory.
fn repeat_count(n: i64, unit: usize) -> ScriptResult<usize> {
    let count = usize::try_from(n.max(0)).map_err(|_| ScriptError::Overflow)?;
    match count.checked_mul(unit) {
        Some(total) if total <= isize::MAX as usize => Ok(count),
        _ => Err(ScriptError::Overflow),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> ScriptResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float_arithmetic(op, a as f64, b as f64),
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision);
            }
            // Result takes the sign of the divisor.
            a.checked_rem(b)
                .map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        _ => None,
    };
    result.map(Value::Int).ok_or(ScriptError::Overflow)
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> ScriptResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        other => {
            return Err(ScriptError::type_error(format!(
                "unsupported operand for {}",
                other.symbol()
            )));
        }
    };
    Ok(Value::Float(result))
}

fn compare(left: &Value, right: &Value) -> ScriptResult<std::cmp::Ordering> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (as_float(left), as_float(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        ScriptError::type_error(format!(
            "cannot order '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn index_value(target: &Value, index: &Value) -> ScriptResult<Value> {
    let Value::Int(i) = index else {
        return Err(ScriptError::type_error(format!(
            "indices must be integers, not '{}'",
            index.type_name()
        )));
    };
    match target {
        Value::List(items) => resolve_index(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| ScriptError::Index("list index out of range".to_string())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve_index(*i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| ScriptError::Index("string index out of range".to_string()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Map a possibly negative index onto `0..len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index.checked_add(len)? } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}
