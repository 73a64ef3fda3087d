//! Statement and expression grammar, built on winnow over the token stream.
//!
//! Operator chains and prefix operators are collected into flat nodes, so the
//! tree only grows deeper with bracket nesting, which the lexer bounds.

use winnow::Parser;
use winnow::combinator::{
    alt, cut_err, delimited, fail, not, opt, peek, preceded, repeat, separated,
};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::token::any;

use crate::error::{ScriptError, ScriptResult};
use crate::lexer::{Spanned, Token, label, tokenize};

type Tokens<'t> = &'t [Spanned];
type ParseResult<T> = Result<T, ErrMode<ContextError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Name(String),
    /// Prefix operators, outermost first.
    Unary(Vec<UnaryOp>, Box<Expr>),
    /// Left-associative chain: `first op expr op expr ...`.
    Binary(Box<Expr>, Vec<(BinaryOp, Expr)>),
    /// Subscripts applied left to right.
    Index(Box<Expr>, Vec<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(String, Expr),
    Del(String),
    Expr(Expr),
}

/// A parsed cell: its statements in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Parse script source into a program.
pub fn parse(source: &str) -> ScriptResult<Program> {
    let tokens = tokenize(source)?;
    let mut input: Tokens<'_> = &tokens;
    let result = program.parse_next(&mut input);

    result.map_err(|error| {
        let found = tokens.get(tokens.len() - input.len()).or(tokens.last());
        let pos = found.map(|s| s.pos).unwrap_or_default();
        let message = match &error {
            ErrMode::Backtrack(e) | ErrMode::Cut(e) => label(e),
            ErrMode::Incomplete(_) => None,
        }
        .unwrap_or("invalid syntax");
        let found = found.map_or(Token::Eof, |s| s.token.clone());
        ScriptError::syntax(pos.line, pos.column, format!("{}, found {}", message, found))
    })
}

fn tok<'t>(expected: Token) -> impl Parser<Tokens<'t>, (), ErrMode<ContextError>> {
    any.verify(move |s: &Spanned| s.token == expected).void()
}

/// A required closing token; failing here is a syntax error.
fn expect<'t>(
    expected: Token,
    message: &'static str,
) -> impl Parser<Tokens<'t>, (), ErrMode<ContextError>> {
    cut_err(tok(expected)).context(StrContext::Label(message))
}

fn ident(input: &mut Tokens<'_>) -> ParseResult<String> {
    any.verify_map(|s: Spanned| match s.token {
        Token::Ident(name) => Some(name),
        _ => None,
    })
    .context(StrContext::Label("expected a name"))
    .parse_next(input)
}

fn program(input: &mut Tokens<'_>) -> ParseResult<Program> {
    let mut statements = Vec::new();
    loop {
        let _: () = repeat(0.., tok(Token::Separator)).parse_next(input)?;
        if opt(tok(Token::Eof)).parse_next(input)?.is_some() {
            return Ok(Program { statements });
        }
        statements.push(statement(input)?);
        cut_err(peek(alt((tok(Token::Separator), tok(Token::Eof)))))
            .context(StrContext::Label("expected end of statement"))
            .parse_next(input)?;
    }
}

fn statement(input: &mut Tokens<'_>) -> ParseResult<Stmt> {
    alt((
        preceded(
            tok(Token::Let),
            cut_err((ident, expect(Token::Assign, "expected '='"), expression)),
        )
        .map(|(name, (), value)| Stmt::Assign(name, value)),
        preceded(tok(Token::Del), cut_err(ident)).map(Stmt::Del),
        (ident, tok(Token::Assign), cut_err(expression))
            .map(|(name, (), value)| Stmt::Assign(name, value)),
        expression.map(Stmt::Expr),
    ))
    .parse_next(input)
}

fn expression(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    chain(input, or_op, conjunction)
}

fn conjunction(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    chain(input, and_op, negation)
}

fn negation(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    let ops: Vec<UnaryOp> = repeat(0.., tok(Token::Not).value(UnaryOp::Not)).parse_next(input)?;
    if ops.is_empty() {
        return comparison(input);
    }
    let operand = cut_err(comparison).parse_next(input)?;
    Ok(Expr::Unary(ops, Box::new(operand)))
}

fn comparison(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    let left = additive(input)?;
    let Some((op, right)) = opt((operator(comparison_op), cut_err(additive))).parse_next(input)?
    else {
        return Ok(left);
    };
    cut_err(not(operator(comparison_op)))
        .context(StrContext::Label("comparisons cannot be chained"))
        .parse_next(input)?;
    Ok(Expr::Binary(Box::new(left), vec![(op, right)]))
}

fn additive(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    chain(input, additive_op, multiplicative)
}

fn multiplicative(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    chain(input, multiplicative_op, unary)
}

fn unary(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    let ops: Vec<UnaryOp> = repeat(0.., tok(Token::Minus).value(UnaryOp::Neg)).parse_next(input)?;
    if ops.is_empty() {
        return postfix(input);
    }
    let operand = cut_err(postfix).parse_next(input)?;
    Ok(Expr::Unary(ops, Box::new(operand)))
}

fn postfix(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    let target = primary(input)?;
    let indices: Vec<Expr> = repeat(
        0..,
        delimited(
            tok(Token::LBracket),
            cut_err(expression),
            expect(Token::RBracket, "expected ']'"),
        ),
    )
    .parse_next(input)?;
    if indices.is_empty() {
        return Ok(target);
    }
    Ok(Expr::Index(Box::new(target), indices))
}

fn primary(input: &mut Tokens<'_>) -> ParseResult<Expr> {
    alt((
        any.verify_map(|s: Spanned| literal(s.token)),
        (
            ident,
            opt(preceded(
                tok(Token::LParen),
                cut_err(items(Token::RParen, "expected ')'")),
            )),
        )
            .map(|(name, args)| match args {
                Some(args) => Expr::Call(name, args),
                None => Expr::Name(name),
            }),
        delimited(
            tok(Token::LParen),
            cut_err(expression),
            expect(Token::RParen, "expected ')'"),
        ),
        preceded(
            tok(Token::LBracket),
            cut_err(items(Token::RBracket, "expected ']'")),
        )
        .map(Expr::List),
        fail.context(StrContext::Label("expected an expression")),
    ))
    .parse_next(input)
}

/// Comma-separated expressions up to `close`, allowing a trailing comma.
fn items<'t>(
    close: Token,
    message: &'static str,
) -> impl Parser<Tokens<'t>, Vec<Expr>, ErrMode<ContextError>> {
    move |input: &mut Tokens<'t>| -> ParseResult<Vec<Expr>> {
        let items: Vec<Expr> = separated(0.., expression, tok(Token::Comma)).parse_next(input)?;
        if !items.is_empty() {
            opt(tok(Token::Comma)).parse_next(input)?;
        }
        expect(close.clone(), message).parse_next(input)?;
        Ok(items)
    }
}

/// `operand (op operand)*`, flattened into one node.
fn chain<'t>(
    input: &mut Tokens<'t>,
    op: fn(&Token) -> Option<BinaryOp>,
    operand: fn(&mut Tokens<'t>) -> ParseResult<Expr>,
) -> ParseResult<Expr> {
    let first = operand(input)?;
    let rest: Vec<(BinaryOp, Expr)> =
        repeat(0.., (operator(op), cut_err(operand))).parse_next(input)?;
    if rest.is_empty() {
        return Ok(first);
    }
    Ok(Expr::Binary(Box::new(first), rest))
}

fn operator<'t>(
    op: fn(&Token) -> Option<BinaryOp>,
) -> impl Parser<Tokens<'t>, BinaryOp, ErrMode<ContextError>> {
    any.verify_map(move |s: Spanned| op(&s.token))
}

fn or_op(token: &Token) -> Option<BinaryOp> {
    (*token == Token::Or).then_some(BinaryOp::Or)
}

fn and_op(token: &Token) -> Option<BinaryOp> {
    (*token == Token::And).then_some(BinaryOp::And)
}

fn comparison_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::EqEq => BinaryOp::Eq,
        Token::NotEq => BinaryOp::NotEq,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
        _ => return None,
    })
}

fn additive_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Plus => Some(BinaryOp::Add),
        Token::Minus => Some(BinaryOp::Sub),
        _ => None,
    }
}

fn multiplicative_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Star => Some(BinaryOp::Mul),
        Token::Slash => Some(BinaryOp::Div),
        Token::Percent => Some(BinaryOp::Mod),
        _ => None,
    }
}

fn literal(token: Token) -> Option<Expr> {
    Some(match token {
        Token::Int(n) => Expr::Int(n),
        Token::Float(x) => Expr::Float(x),
        Token::Str(s) => Expr::Str(s),
        Token::True => Expr::Bool(true),
        Token::False => Expr::Bool(false),
        Token::Nil => Expr::Nil,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Stmt {
        let program = parse(source).unwrap();
        assert_eq!(program.statements.len(), 1, "{:?}", program);
        program.statements.into_iter().next().unwrap()
    }

    fn syntax_message(source: &str) -> String {
        match parse(source) {
            Err(ScriptError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            single("1 + 2 * 3"),
            Stmt::Expr(Expr::Binary(
                Box::new(Expr::Int(1)),
                vec![(
                    BinaryOp::Add,
                    Expr::Binary(Box::new(Expr::Int(2)), vec![(BinaryOp::Mul, Expr::Int(3))])
                )]
            ))
        );
    }

    #[test]
    fn test_chains_are_flat() {
        assert_eq!(
            single("1 - 2 - 3"),
            Stmt::Expr(Expr::Binary(
                Box::new(Expr::Int(1)),
                vec![(BinaryOp::Sub, Expr::Int(2)), (BinaryOp::Sub, Expr::Int(3))]
            ))
        );
        assert_eq!(
            single("- -x[0][1]"),
            Stmt::Expr(Expr::Unary(
                vec![UnaryOp::Neg, UnaryOp::Neg],
                Box::new(Expr::Index(
                    Box::new(Expr::Name("x".to_string())),
                    vec![Expr::Int(0), Expr::Int(1)]
                ))
            ))
        );
    }

    #[test]
    fn test_long_chain_parses() {
        let source = vec!["1"; 5000].join(" + ");
        match single(&source) {
            Stmt::Expr(Expr::Binary(_, rest)) => assert_eq!(rest.len(), 4999),
            other => panic!("expected a chain, got {:?}", other),
        }

        let negated = format!("{}1", "-".repeat(500));
        assert!(matches!(
            single(&negated),
            Stmt::Expr(Expr::Unary(ops, _)) if ops.len() == 500
        ));
    }

    #[test]
    fn test_statements() {
        let program = parse("let a = 1; b = a\n\ndel a\nprint(b, [1, 2,])").unwrap();
        assert_eq!(program.statements.len(), 4);
        assert_eq!(program.statements[0], Stmt::Assign("a".to_string(), Expr::Int(1)));
        assert_eq!(program.statements[1], Stmt::Assign("b".to_string(), Expr::Name("a".to_string())));
        assert_eq!(program.statements[2], Stmt::Del("a".to_string()));
        assert!(matches!(
            &program.statements[3],
            Stmt::Expr(Expr::Call(name, args)) if name == "print" && args.len() == 2
        ));
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        assert!(matches!(
            single("a == 1"),
            Stmt::Expr(Expr::Binary(_, rest)) if rest[0].0 == BinaryOp::Eq
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("1 +").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("(1").is_err());
        assert!(parse("1 < 2 < 3").is_err());
        assert!(parse("let = 3").is_err());
        assert!(parse("[1,,]").is_err());

        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse(&deep).is_err());
    }

    #[test]
    fn test_syntax_error_messages() {
        assert_eq!(syntax_message("1 +"), "expected an expression, found end of input");
        assert_eq!(syntax_message("a b"), "expected end of statement, found 'b'");
        assert_eq!(syntax_message("(1"), "expected ')', found end of input");
        assert_eq!(syntax_message("1 < 2 < 3"), "comparisons cannot be chained, found '<'");

        match parse("x = 1\ny = (2 +\n)") {
            Err(ScriptError::Syntax { line, column, .. }) => assert_eq!((line, column), (3, 1)),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_program() {
        assert!(parse("").unwrap().statements.is_empty());
        assert!(parse("# only a comment\n\n").unwrap().statements.is_empty());
    }
}
