//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::rc::Rc;

use crate::error::ScriptResult;
use crate::lexer::{Token, tokenize};

/// A value bound in the session namespace.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Live resource; shared between copies of the binding.
    Handle(Handle),
}

/// Live resources that only exist inside a running session.
#[derive(Debug, Clone)]
pub enum Handle {
    File(Rc<RefCell<FileHandle>>),
    Iter(Rc<RefCell<IterState>>),
}

#[derive(Debug)]
pub struct FileHandle {
    pub path: PathBuf,
    file: Option<File>,
}

impl FileHandle {
    pub fn open(path: PathBuf) -> ScriptResult<Self> {
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Read everything left in the file. Subsequent reads return "".
    pub fn read_to_end(&mut self) -> ScriptResult<String> {
        let mut text = String::new();
        if let Some(mut file) = self.file.take() {
            file.read_to_string(&mut text)?;
        }
        Ok(text)
    }
}

#[derive(Debug)]
pub struct IterState {
    items: Vec<Value>,
    position: usize,
}

impl IterState {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items, position: 0 }
    }

    pub fn next_item(&mut self) -> Option<Value> {
        let item = self.items.get(self.position).cloned()?;
        self.position += 1;
        Some(item)
    }
}

impl Value {
    /// Name of the value's type, as returned by `type()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Handle(Handle::File(_)) => "file",
            Value::Handle(Handle::Iter(_)) => "iterator",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Handle(_) => true,
        }
    }

    /// Form used by `print` and `str()`: strings are shown raw.
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// Form used for cell results: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Str(s) => quote(s, '\''),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Handle(Handle::File(file)) => {
                format!("<file '{}'>", file.borrow().path.display())
            }
            Value::Handle(Handle::Iter(_)) => "<iterator>".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Handle(Handle::File(a)), Value::Handle(Handle::File(b))) => Rc::ptr_eq(a, b),
            (Value::Handle(Handle::Iter(a)), Value::Handle(Handle::Iter(b))) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x == f64::INFINITY {
        "inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn quote(s: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Render a parameter value as script source.
///
/// Integers, floats and booleans are emitted verbatim; anything else becomes
/// a string literal.
pub fn literal(value: &str) -> String {
    if !value.is_empty() && !value.contains(char::is_whitespace) && is_scalar_literal(value) {
        value.to_string()
    } else {
        quote(value, '"')
    }
}

fn is_scalar_literal(value: &str) -> bool {
    let Ok(tokens) = tokenize(value) else {
        return false;
    };
    let tokens: Vec<Token> = tokens.into_iter().map(|s| s.token).collect();
    matches!(
        tokens.as_slice(),
        [Token::Int(_) | Token::Float(_) | Token::True | Token::False, Token::Eof]
            | [Token::Minus, Token::Int(_) | Token::Float(_), Token::Eof]
    )
}
