//! Tokenizer for script source, built on winnow.

use std::fmt;

use winnow::Parser;
use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, fail, not, opt, repeat};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::token::{none_of, one_of, take_till, take_while};

use crate::error::{ScriptError, ScriptResult};

/// Position of a token in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    // 1-based
    pub line: usize,
    // 1-based, in characters
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Let,
    Del,
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    /// Statement separator: a newline or `;` outside brackets.
    Separator,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(x) => write!(f, "{}", x),
            Token::Str(_) => write!(f, "string literal"),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Let => write!(f, "'let'"),
            Token::Del => write!(f, "'del'"),
            Token::True => write!(f, "'true'"),
            Token::False => write!(f, "'false'"),
            Token::Nil => write!(f, "'nil'"),
            Token::And => write!(f, "'and'"),
            Token::Or => write!(f, "'or'"),
            Token::Not => write!(f, "'not'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Assign => write!(f, "'='"),
            Token::EqEq => write!(f, "'=='"),
            Token::NotEq => write!(f, "'!='"),
            Token::Lt => write!(f, "'<'"),
            Token::Le => write!(f, "'<='"),
            Token::Gt => write!(f, "'>'"),
            Token::Ge => write!(f, "'>='"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
            Token::Separator => write!(f, "end of statement"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its starting position.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

/// Maximum nesting of `(` and `[`.
pub const MAX_DEPTH: usize = 64;

const UNEXPECTED_CHARACTER: &str = "unexpected character";

type ParseResult<T> = Result<T, ErrMode<ContextError>>;

/// What one lexing step produced, before separators are resolved.
#[derive(Debug, Clone)]
enum Lexeme<'s> {
    Token(Token),
    Number(&'s str),
    Newline,
    Semicolon,
}

/// Split source into tokens, ending with [`Token::Eof`].
///
/// Newlines and `;` become [`Token::Separator`] outside brackets; inside
/// brackets newlines are ignored and `;` is an error.
pub fn tokenize(source: &str) -> ScriptResult<Vec<Spanned>> {
    let mut input = source;
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    let mut depth = 0usize;

    loop {
        let skipped = trivia.parse_next(&mut input);
        let pos = cursor.advance_to(source.len() - input.len());
        if let Err(error) = skipped {
            return Err(lex_error(&error, input, pos));
        }
        if input.is_empty() {
            tokens.push(Spanned {
                token: Token::Eof,
                pos,
            });
            return Ok(tokens);
        }

        let start = input;
        let lexeme = lexeme
            .parse_next(&mut input)
            .map_err(|e| lex_error(&e, start, pos))?;

        let token = match lexeme {
            Lexeme::Newline if depth > 0 => continue,
            Lexeme::Semicolon if depth > 0 => {
                return Err(ScriptError::syntax(
                    pos.line,
                    pos.column,
                    "unexpected ';' inside brackets",
                ));
            }
            Lexeme::Newline | Lexeme::Semicolon => Token::Separator,
            Lexeme::Number(text) => number_token(text, pos)?,
            Lexeme::Token(token) => token,
        };

        match token {
            Token::LParen | Token::LBracket => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ScriptError::syntax(
                        pos.line,
                        pos.column,
                        "expression nested too deeply",
                    ));
                }
            }
            Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
            _ => {}
        }
        tokens.push(Spanned { token, pos });
    }
}

/// Tracks line and column while the lexer moves forward through the source.
struct Cursor<'s> {
    source: &'s str,
    offset: usize,
    pos: Pos,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            offset: 0,
            pos: Pos { line: 1, column: 1 },
        }
    }

    fn advance_to(&mut self, offset: usize) -> Pos {
        for c in self.source[self.offset..offset].chars() {
            if c == '\n' {
                self.pos.line += 1;
                self.pos.column = 1;
            } else {
                self.pos.column += 1;
            }
        }
        self.offset = offset;
        self.pos
    }
}

fn lex_error(error: &ErrMode<ContextError>, start: &str, pos: Pos) -> ScriptError {
    let label = match error {
        ErrMode::Backtrack(e) | ErrMode::Cut(e) => label(e),
        ErrMode::Incomplete(_) => None,
    };
    let message = match label {
        Some(UNEXPECTED_CHARACTER) | None => match start.chars().next() {
            Some(c) => format!("{} '{}'", UNEXPECTED_CHARACTER, c),
            None => "unexpected end of input".to_string(),
        },
        Some(label) => label.to_string(),
    };
    ScriptError::syntax(pos.line, pos.column, message)
}

/// Innermost label attached to a parse error.
pub(crate) fn label(error: &ContextError) -> Option<&'static str> {
    error.context().find_map(|context| match context {
        StrContext::Label(label) => Some(*label),
        _ => None,
    })
}

fn number_token(text: &str, pos: Pos) -> ScriptResult<Token> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    if digits.contains(['.', 'e', 'E']) {
        digits
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ScriptError::syntax(pos.line, pos.column, "invalid float literal"))
    } else {
        digits.parse::<i64>().map(Token::Int).map_err(|_| {
            ScriptError::syntax(pos.line, pos.column, "integer literal too large")
        })
    }
}

/// Spaces, tabs and `#` comments; never a newline.
fn trivia(input: &mut &str) -> ParseResult<()> {
    repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace() && c != '\n').void(),
            ('#', take_till(0.., '\n')).void(),
        )),
    )
    .parse_next(input)
}

fn lexeme<'s>(input: &mut &'s str) -> ParseResult<Lexeme<'s>> {
    alt((
        '\n'.value(Lexeme::Newline),
        ';'.value(Lexeme::Semicolon),
        string.map(|s| Lexeme::Token(Token::Str(s))),
        number.map(Lexeme::Number),
        word.map(|w| Lexeme::Token(keyword(w).unwrap_or_else(|| Token::Ident(w.to_string())))),
        symbol.map(Lexeme::Token),
        cut_err(fail).context(StrContext::Label(UNEXPECTED_CHARACTER)),
    ))
    .parse_next(input)
}

fn string(input: &mut &str) -> ParseResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut text = String::new();
    loop {
        let c = string_char(input)?;
        if c == quote {
            return Ok(text);
        }
        if c != '\\' {
            text.push(c);
            continue;
        }
        let escaped = match string_char(input)? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            _ => {
                return cut_err(fail)
                    .context(StrContext::Label("unknown escape sequence"))
                    .parse_next(input);
            }
        };
        text.push(escaped);
    }
}

fn string_char(input: &mut &str) -> ParseResult<char> {
    cut_err(none_of('\n'))
        .context(StrContext::Label("unterminated string literal"))
        .parse_next(input)
}

/// Digits with `_` separators, an optional fraction and an optional exponent.
fn number<'s>(input: &mut &'s str) -> ParseResult<&'s str> {
    let text = (
        digits,
        opt(('.', digits)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digits)),
    )
        .take()
        .parse_next(input)?;
    cut_err(not(one_of(|c: char| c.is_alphanumeric() || c == '_')))
        .context(StrContext::Label("invalid number literal"))
        .parse_next(input)?;
    Ok(text)
}

fn digits<'s>(input: &mut &'s str) -> ParseResult<&'s str> {
    (digit1, repeat::<_, _, (), _, _>(0.., ('_', digit1)))
        .take()
        .parse_next(input)
}

fn word<'s>(input: &mut &'s str) -> ParseResult<&'s str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn symbol(input: &mut &str) -> ParseResult<Token> {
    alt((
        alt((
            "==".value(Token::EqEq),
            "!=".value(Token::NotEq),
            "<=".value(Token::Le),
            ">=".value(Token::Ge),
        )),
        alt((
            '<'.value(Token::Lt),
            '>'.value(Token::Gt),
            '='.value(Token::Assign),
            '+'.value(Token::Plus),
            '-'.value(Token::Minus),
            '*'.value(Token::Star),
            '/'.value(Token::Slash),
            '%'.value(Token::Percent),
        )),
        alt((
            ','.value(Token::Comma),
            '('.value(Token::LParen),
            ')'.value(Token::RParen),
            '['.value(Token::LBracket),
            ']'.value(Token::RBracket),
        )),
    ))
    .parse_next(input)
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" => Token::Let,
        "del" => Token::Del,
        "true" => Token::True,
        "false" => Token::False,
        "nil" => Token::Nil,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => return None,
    })
}
