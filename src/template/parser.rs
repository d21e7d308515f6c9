//! Template parser using nom.
//!
//! # Grammar
//!
//! ```text
//! template    := (escaped | block | shorthand | text)*
//! escaped     := "\$" | "\\"
//! block       := "${" expression "}"
//! shorthand   := "$" ident ("." ident)*
//!
//! expression  := or ("?:" expression | "?" expression ":" expression)?
//! or          := and ("||" and)*
//! and         := equality ("&&" equality)*
//! equality    := comparison (("==" | "!=") comparison)*
//! comparison  := additive (("<=" | ">=" | "<" | ">") additive)*
//! additive    := unary (("+" | "-") unary)*
//! unary       := ("!" | "-") unary | postfix
//! postfix     := primary ("." ident args? | "[" expression "]")*
//! primary     := "(" expression ")" | string | number | ident args?
//! ```
//!
//! A backslash before anything other than `$` or `\` is kept as written.
//! Postgres dollar-quoted strings must escape each dollar: `$$body$$` is
//! written `\$\$body\$\$`, because a bare `$$` reads as a literal `$`
//! followed by a substitution attempt.

use super::{BinaryOp, Expr, Function, Segment, UnaryOp};
use crate::error::{LurryError, LurryResult};
use nom::Err as NomErr;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, opt, recognize, value},
    error::{ErrorKind, ParseError},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded},
};
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug)]
pub(super) struct SyntaxError<'a> {
    input: &'a str,
    message: Cow<'static, str>,
}

impl<'a> SyntaxError<'a> {
    fn new(input: &'a str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            input,
            message: message.into(),
        }
    }
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self::new(input, "invalid expression")
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

fn failure<'a>(input: &'a str, message: impl Into<Cow<'static, str>>) -> NomErr<SyntaxError<'a>> {
    NomErr::Failure(SyntaxError::new(input, message))
}

/// Turn a recoverable error into a hard failure with a message.
fn expect<'a, O, F>(message: &'static str, mut parser: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    move |input: &'a str| match parser(input) {
        Err(NomErr::Error(e)) => Err(failure(e.input, message)),
        other => other,
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn space(input: &str) -> PResult<'_, &str> {
    multispace0(input)
}

fn sym<'a>(c: char) -> impl Fn(&'a str) -> PResult<'a, char> {
    char(c)
}

fn keyword<'a>(t: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    tag(t)
}

/// Parse a complete template into segments.
pub(super) fn parse_template(input: &str) -> LurryResult<Vec<Segment>> {
    match many0(segment)(input) {
        Ok((rest, parts)) if rest.is_empty() => Ok(merge_text(parts)),
        Ok((rest, _)) => Err(LurryError::compile(
            input.len() - rest.len(),
            "unexpected content",
        )),
        Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => {
            Err(LurryError::compile(input.len() - e.input.len(), e.message))
        }
        Err(NomErr::Incomplete(_)) => Err(LurryError::compile(input.len(), "incomplete template")),
    }
}

fn merge_text(parts: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(parts.len());
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(Segment::Text(prev)), Segment::Text(next)) => prev.push_str(&next),
            (_, part) => merged.push(part),
        }
    }
    merged
}

fn segment(input: &str) -> PResult<'_, Segment> {
    let text = |s: &str| Segment::Text(s.to_string());
    alt((
        map(keyword("\\\\"), |_| Segment::Text("\\".to_string())),
        map(keyword("\\$"), |_| Segment::Text("$".to_string())),
        block,
        shorthand,
        map(keyword("$"), text),
        map(keyword("\\"), text),
        map(take_till1(|c| c == '$' || c == '\\'), text),
    ))(input)
}

/// `${ expression }`
fn block(input: &str) -> PResult<'_, Segment> {
    let (input, _) = keyword("${")(input)?;
    let (input, expr) = expect("expected expression", ws(expression))(input)?;
    let (input, _) = expect("expected '}' to close '${'", sym('}'))(input)?;
    Ok((input, Segment::Expr(expr)))
}

/// `$name` or `$name.field.field`
fn shorthand(input: &str) -> PResult<'_, Segment> {
    let (input, _) = sym('$')(input)?;
    let (input, name) = identifier(input)?;
    let (input, fields) = many0(preceded(sym('.'), identifier))(input)?;
    let expr = fields
        .into_iter()
        .fold(Expr::Var(name.to_string()), |target, field| {
            Expr::Member(Box::new(target), field.to_string())
        });
    Ok((input, Segment::Expr(expr)))
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

pub(super) fn expression(input: &str) -> PResult<'_, Expr> {
    let (input, cond) = or_expr(input)?;
    let (input, _) = space(input)?;

    if let Ok((rest, _)) = keyword("?:")(input) {
        let (rest, fallback) = expect("expected expression after '?:'", ws(expression))(rest)?;
        return Ok((rest, Expr::Elvis(Box::new(cond), Box::new(fallback))));
    }

    if let Ok((rest, _)) = sym('?')(input) {
        let (rest, then) = expect("expected expression after '?'", ws(expression))(rest)?;
        let (rest, _) = expect("expected ':' in conditional", sym(':'))(rest)?;
        let (rest, otherwise) = expect("expected expression after ':'", ws(expression))(rest)?;
        return Ok((
            rest,
            Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ));
    }

    Ok((input, cond))
}

/// Left-associative chain of `next` separated by `op`.
fn chain<'a>(
    input: &'a str,
    next: fn(&'a str) -> PResult<'a, Expr>,
    op: fn(&'a str) -> PResult<'a, BinaryOp>,
) -> PResult<'a, Expr> {
    let (input, first) = next(input)?;
    let (input, rest) = many0(pair(ws(op), next))(input)?;
    let expr = rest.into_iter().fold(first, |left, (op, right)| {
        Expr::Binary(op, Box::new(left), Box::new(right))
    });
    Ok((input, expr))
}

fn or_op(input: &str) -> PResult<'_, BinaryOp> {
    value(BinaryOp::Or, tag("||"))(input)
}

fn and_op(input: &str) -> PResult<'_, BinaryOp> {
    value(BinaryOp::And, tag("&&"))(input)
}

fn equality_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
    ))(input)
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn additive_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Add, char('+')),
        value(BinaryOp::Sub, char('-')),
    ))(input)
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    chain(input, and_expr, or_op)
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    chain(input, equality, and_op)
}

fn equality(input: &str) -> PResult<'_, Expr> {
    chain(input, comparison, equality_op)
}

fn comparison(input: &str) -> PResult<'_, Expr> {
    chain(input, additive, comparison_op)
}

fn additive(input: &str) -> PResult<'_, Expr> {
    chain(input, unary, additive_op)
}

fn unary(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(ws(sym('!')), unary), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        map(preceded(ws(sym('-')), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        postfix,
    ))(input)
}

fn postfix(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = primary(input)?;
    loop {
        if let Ok((rest, _)) = sym('.')(input) {
            let (after_name, name) = expect("expected member name after '.'", identifier)(rest)?;
            let (after_args, args) = opt(arguments)(after_name)?;
            expr = match args {
                // `value.escape()` is `escape(value)`
                Some(mut args) => {
                    args.insert(0, expr);
                    make_call(rest, name, args)?
                }
                None => Expr::Member(Box::new(expr), name.to_string()),
            };
            input = after_args;
            continue;
        }

        if let Ok((rest, _)) = sym('[')(input) {
            let (rest, index) = expect("expected index expression", ws(expression))(rest)?;
            let (rest, _) = expect("expected ']'", sym(']'))(rest)?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
            input = rest;
            continue;
        }

        return Ok((input, expr));
    }
}

fn primary(input: &str) -> PResult<'_, Expr> {
    alt((
        delimited(
            sym('('),
            expect("expected expression", ws(expression)),
            expect("expected ')'", sym(')')),
        ),
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        number,
        call_or_variable,
    ))(input)
}

fn arguments(input: &str) -> PResult<'_, Vec<Expr>> {
    delimited(
        sym('('),
        ws(separated_list0(ws(sym(',')), expression)),
        expect("expected ')' after arguments", sym(')')),
    )(input)
}

fn call_or_variable(input: &str) -> PResult<'_, Expr> {
    let (rest, name) = identifier(input)?;
    match name {
        "true" => return Ok((rest, Expr::Literal(Value::Bool(true)))),
        "false" => return Ok((rest, Expr::Literal(Value::Bool(false)))),
        "null" => return Ok((rest, Expr::Literal(Value::Null))),
        _ => {}
    }

    let (rest, args) = opt(arguments)(rest)?;
    match args {
        Some(args) => Ok((rest, make_call(input, name, args)?)),
        None => Ok((rest, Expr::Var(name.to_string()))),
    }
}

fn make_call<'a>(at: &'a str, name: &str, args: Vec<Expr>) -> Result<Expr, NomErr<SyntaxError<'a>>> {
    let func = Function::from_name(name)
        .ok_or_else(|| failure(at, format!("unknown function '{}'", name)))?;
    if args.len() != func.arity() {
        return Err(failure(
            at,
            format!(
                "{}() takes {} argument(s), got {}",
                func.name(),
                func.arity(),
                args.len()
            ),
        ));
    }
    Ok(Expr::Call(func, args))
}

fn number_text(input: &str) -> PResult<'_, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn number(input: &str) -> PResult<'_, Expr> {
    let (rest, text) = number_text(input)?;
    let parsed = if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    };
    match parsed {
        Some(v) => Ok((rest, Expr::Literal(v))),
        None => Err(failure(input, "number out of range")),
    }
}

/// `'text'` or `"text"` with backslash escapes.
fn string_literal(input: &str) -> PResult<'_, String> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err(NomErr::Error(SyntaxError::new(input, "expected string"))),
    };

    let body = &input[1..];
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c if c == quote => return Ok((&body[i + 1..], out)),
            c => out.push(c),
        }
    }
    Err(failure(input, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr(src: &str) -> Expr {
        let (rest, e) = expression(src).unwrap();
        assert!(rest.trim().is_empty(), "trailing input: {:?}", rest);
        e
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    fn lit(v: Value) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    #[test]
    fn test_plain_text() {
        let segments = parse_template("SELECT * FROM users").unwrap();
        assert_eq!(segments, vec![Segment::Text("SELECT * FROM users".to_string())]);
    }

    #[test]
    fn test_empty_template() {
        assert!(parse_template("").unwrap().is_empty());
    }

    #[test]
    fn test_shorthand_and_block() {
        let segments = parse_template("WHERE id = $id AND x = ${x}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("WHERE id = ".to_string()),
                Segment::Expr(Expr::Var("id".to_string())),
                Segment::Text(" AND x = ".to_string()),
                Segment::Expr(Expr::Var("x".to_string())),
            ]
        );
    }

    #[test]
    fn test_shorthand_member_path() {
        let segments = parse_template("$user.name.").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Expr(Expr::Member(var("user"), "name".to_string())),
                Segment::Text(".".to_string()),
            ]
        );
    }

    #[test]
    fn test_literal_dollars() {
        let segments = parse_template(r"a = $1 AND b = \$x AND c = 5$").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Text("a = $1 AND b = $x AND c = 5$".to_string())]
        );
    }

    #[test]
    fn test_escaped_backslash_before_substitution() {
        let segments = parse_template(r"a\\$x").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("a\\".to_string()),
                Segment::Expr(Expr::Var("x".to_string())),
            ]
        );
    }

    #[test]
    fn test_escaped_dollar_quoting() {
        let segments = parse_template(r"SELECT \$\$text\$\$").unwrap();
        assert_eq!(segments, vec![Segment::Text("SELECT $$text$$".to_string())]);
    }

    #[test]
    fn test_backslash_kept() {
        let segments = parse_template(r"LIKE 'a\_b'").unwrap();
        assert_eq!(segments, vec![Segment::Text(r"LIKE 'a\_b'".to_string())]);
    }

    #[test]
    fn test_conditional() {
        assert_eq!(
            expr("active ? 'AND active = 1' : ''"),
            Expr::Conditional {
                cond: var("active"),
                then: lit(json!("AND active = 1")),
                otherwise: lit(json!("")),
            }
        );
    }

    #[test]
    fn test_elvis() {
        assert_eq!(expr("limit ?: 10"), Expr::Elvis(var("limit"), lit(json!(10))));
    }

    #[test]
    fn test_precedence() {
        // a || b && c == d + 1
        assert_eq!(
            expr("a || b && c == d + 1"),
            Expr::Binary(
                BinaryOp::Or,
                var("a"),
                Box::new(Expr::Binary(
                    BinaryOp::And,
                    var("b"),
                    Box::new(Expr::Binary(
                        BinaryOp::Eq,
                        var("c"),
                        Box::new(Expr::Binary(BinaryOp::Add, var("d"), lit(json!(1)))),
                    )),
                )),
            )
        );
    }

    #[test]
    fn test_method_sugar() {
        assert_eq!(
            expr("name.escape()"),
            Expr::Call(Function::Escape, vec![Expr::Var("name".to_string())])
        );
        assert_eq!(
            expr("joinNumbers(ids)"),
            Expr::Call(Function::JoinNumbers, vec![Expr::Var("ids".to_string())])
        );
    }

    #[test]
    fn test_index_and_member() {
        assert_eq!(
            expr("filter.ids[0]"),
            Expr::Index(
                Box::new(Expr::Member(var("filter"), "ids".to_string())),
                lit(json!(0))
            )
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(expr("1.5"), Expr::Literal(json!(1.5)));
        assert_eq!(expr("null"), Expr::Literal(Value::Null));
        assert_eq!(expr("nullable"), Expr::Var("nullable".to_string()));
        assert_eq!(expr(r#""a\"b""#), Expr::Literal(json!("a\"b")));
        assert_eq!(expr("!done"), Expr::Unary(UnaryOp::Not, var("done")));
    }

    #[test]
    fn test_string_may_contain_brace() {
        let segments = parse_template("${x ? '}' : '{'}").unwrap();
        assert_eq!(segments.len(), 1);
    }

    fn compile_error(src: &str) -> (usize, String) {
        match parse_template(src) {
            Err(LurryError::TemplateCompile { position, message }) => (position, message),
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_block() {
        let (position, message) = compile_error("SELECT ${id");
        assert_eq!(position, 11);
        assert!(message.contains("'}'"), "{}", message);
    }

    #[test]
    fn test_empty_block() {
        let (position, message) = compile_error("SELECT ${}");
        assert_eq!(position, 9);
        assert_eq!(message, "expected expression");
    }

    #[test]
    fn test_unknown_function() {
        let (position, message) = compile_error("${drop(x)}");
        assert_eq!(position, 2);
        assert_eq!(message, "unknown function 'drop'");
    }

    #[test]
    fn test_wrong_arity() {
        let (_, message) = compile_error("${escape(a, b)}");
        assert_eq!(message, "escape() takes 1 argument(s), got 2");
    }

    #[test]
    fn test_unterminated_string() {
        let (position, message) = compile_error("${x ? 'abc}");
        assert_eq!(message, "unterminated string literal");
        assert_eq!(position, 6);
    }

    #[test]
    fn test_dangling_conditional() {
        let (_, message) = compile_error("${x ? 'a'}");
        assert_eq!(message, "expected ':' in conditional");
    }
}
