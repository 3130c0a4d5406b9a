//! Skip and stop condition expressions
//!
//! Conditions are parsed once, when the survey is built, into a small
//! expression tree. Evaluation is three-valued: a reference to a question
//! that has not reached a terminal status makes the result undecided.
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | compare
//! compare := operand (op operand)?
//! op      := "==" | "!=" | "<=" | ">=" | "<" | ">" | "not in" | "in"
//! operand := "(" or ")" | "[" operand,* "]" | string | number
//!          | "true" | "false" | "null" | reference | "{{" reference "}}"
//! ```

use crate::context::AnswerContext;
use crate::error::{Result, SurveyError};
use crate::scenario::Scenario;
use crate::value::{compare_values, contains, is_truthy, lookup_path, number_value, values_equal};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value, verify},
    error::{VerboseError, context},
    multi::{many0, separated_list0},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated},
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const RESERVED: &[&str] = &["and", "or", "not", "in", "true", "false", "null"];

/// A value read from the interview at evaluation time
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Answer { question: String, path: Vec<String> },
    Comment { question: String },
    Scenario { path: Vec<String> },
    Agent { path: Vec<String> },
}

impl Reference {
    pub fn question(&self) -> Option<&str> {
        match self {
            Self::Answer { question, .. } | Self::Comment { question } => Some(question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(Reference),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Outcome of evaluating a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Undecided,
}

impl Truth {
    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    fn from_bool(b: bool) -> Self {
        if b { Truth::True } else { Truth::False }
    }

    fn negate(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Undecided => Truth::Undecided,
        }
    }
}

/// Inputs a condition may read
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub answers: &'a AnswerContext,
    pub scenario: &'a Scenario,
    pub traits: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |message: String| SurveyError::InvalidExpression {
            expression: source.to_string(),
            message,
        };

        if source.trim().is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }

        match all_consuming(delimited(multispace0, or_expr, multispace0))(source) {
            Ok((_, root)) => Ok(Self { source: source.to_string(), root }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let remaining = e.errors.first().map(|(input, _)| *input).unwrap_or(source);
                let offset = source.len() - remaining.len();
                let snippet: String = remaining.chars().take(16).collect();
                Err(invalid(format!("unexpected input at offset {}: '{}'", offset, snippet)))
            }
            Err(nom::Err::Incomplete(_)) => Err(invalid("incomplete expression".to_string())),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Questions this condition reads, in name order
    pub fn question_refs(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        collect_refs(&self.root, &mut refs);
        refs
    }

    pub fn evaluate(&self, env: &Environment<'_>) -> Truth {
        truth(&self.root, env)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_refs(expr: &Expr, refs: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Reference(reference) => {
            if let Some(question) = reference.question() {
                refs.insert(question.to_string());
            }
        }
        Expr::List(items) => items.iter().for_each(|item| collect_refs(item, refs)),
        Expr::Not(inner) => collect_refs(inner, refs),
        Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}

fn truth(expr: &Expr, env: &Environment<'_>) -> Truth {
    match expr {
        Expr::Not(inner) => truth(inner, env).negate(),
        Expr::And(left, right) => match truth(left, env) {
            Truth::False => Truth::False,
            l => match (l, truth(right, env)) {
                (_, Truth::False) => Truth::False,
                (Truth::True, Truth::True) => Truth::True,
                _ => Truth::Undecided,
            },
        },
        Expr::Or(left, right) => match truth(left, env) {
            Truth::True => Truth::True,
            l => match (l, truth(right, env)) {
                (_, Truth::True) => Truth::True,
                (Truth::False, Truth::False) => Truth::False,
                _ => Truth::Undecided,
            },
        },
        Expr::Compare { op, left, right } => match (resolve(left, env), resolve(right, env)) {
            (Some(l), Some(r)) => Truth::from_bool(compare(*op, &l, &r)),
            _ => Truth::Undecided,
        },
        other => match resolve(other, env) {
            Some(v) => Truth::from_bool(is_truthy(&v)),
            None => Truth::Undecided,
        },
    }
}

/// `None` means the value is not yet known
fn resolve(expr: &Expr, env: &Environment<'_>) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Reference(reference) => resolve_reference(reference, env),
        Expr::List(items) => items
            .iter()
            .map(|item| resolve(item, env))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        boolean => match truth(boolean, env) {
            Truth::Undecided => None,
            t => Some(Value::Bool(t.is_true())),
        },
    }
}

fn resolve_reference(reference: &Reference, env: &Environment<'_>) -> Option<Value> {
    match reference {
        Reference::Answer { question, path } => {
            if !env.answers.is_terminal(question) {
                return None;
            }
            let answer = env.answers.answer(question).and_then(|a| lookup_path(a, path));
            Some(answer.cloned().unwrap_or(Value::Null))
        }
        Reference::Comment { question } => {
            if !env.answers.is_terminal(question) {
                return None;
            }
            Some(env.answers.comment(question).map(Value::from).unwrap_or(Value::Null))
        }
        Reference::Scenario { path } => {
            Some(env.scenario.get_path(path).cloned().unwrap_or(Value::Null))
        }
        Reference::Agent { path } => {
            let (first, rest) = path.split_first()?;
            let found = env.traits.get(first).and_then(|v| lookup_path(v, rest));
            Some(found.cloned().unwrap_or(Value::Null))
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => compare_values(left, right) == Some(Ordering::Less),
        CompareOp::Le => {
            matches!(compare_values(left, right), Some(Ordering::Less | Ordering::Equal))
        }
        CompareOp::Gt => compare_values(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => {
            matches!(compare_values(left, right), Some(Ordering::Greater | Ordering::Equal))
        }
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => !contains(right, left),
    }
}

// Parsers

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    F: FnMut(&'a str) -> ParseResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A keyword not followed by an identifier character
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    terminated(tag(word), not(peek(satisfy(is_ident_char))))
}

fn identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn path(input: &str) -> ParseResult<'_, Vec<String>> {
    map(pair(identifier, many0(preceded(char('.'), alt((identifier, digit1))))), |(first, rest)| {
        std::iter::once(first).chain(rest).map(str::to_string).collect()
    })(input)
}

fn build_reference(segments: Vec<String>) -> std::result::Result<Reference, String> {
    let (first, rest) = segments.split_first().ok_or_else(|| "empty reference".to_string())?;
    match first.as_str() {
        "scenario" | "agent" if rest.is_empty() => Err(format!("'{}' needs a key", first)),
        "scenario" => Ok(Reference::Scenario { path: rest.to_vec() }),
        "agent" => Ok(Reference::Agent { path: rest.to_vec() }),
        question => match rest.split_first() {
            None => Ok(Reference::Answer { question: question.to_string(), path: vec![] }),
            Some((attr, tail)) if attr == "answer" => {
                Ok(Reference::Answer { question: question.to_string(), path: tail.to_vec() })
            }
            Some((attr, tail)) if attr == "comment" && tail.is_empty() => {
                Ok(Reference::Comment { question: question.to_string() })
            }
            Some((attr, _)) => Err(format!("unknown attribute '{}'", attr)),
        },
    }
}

fn bare_reference(input: &str) -> ParseResult<'_, Reference> {
    context(
        "reference",
        map_res(
            verify(path, |segments: &Vec<String>| !RESERVED.contains(&segments[0].as_str())),
            build_reference,
        ),
    )(input)
}

fn reference(input: &str) -> ParseResult<'_, Expr> {
    map(
        alt((delimited(ws(tag("{{")), bare_reference, ws(tag("}}"))), bare_reference)),
        Expr::Reference,
    )(input)
}

fn string_literal(input: &str) -> ParseResult<'_, Expr> {
    context(
        "string",
        map(
            alt((
                delimited(char('\''), take_while(|c| c != '\''), char('\'')),
                delimited(char('"'), take_while(|c| c != '"'), char('"')),
            )),
            |s: &str| Expr::Literal(Value::String(s.to_string())),
        ),
    )(input)
}

fn number_literal(input: &str) -> ParseResult<'_, Expr> {
    context(
        "number",
        map(map_res(recognize_float, |s: &str| s.parse::<f64>()), |n| {
            Expr::Literal(number_value(n))
        }),
    )(input)
}

fn keyword_literal(input: &str) -> ParseResult<'_, Expr> {
    alt((
        value(Expr::Literal(Value::Bool(true)), alt((keyword("true"), keyword("True")))),
        value(Expr::Literal(Value::Bool(false)), alt((keyword("false"), keyword("False")))),
        value(Expr::Literal(Value::Null), alt((keyword("null"), keyword("None")))),
    ))(input)
}

fn list_literal(input: &str) -> ParseResult<'_, Expr> {
    context(
        "list",
        map(
            delimited(ws(char('[')), separated_list0(ws(char(',')), operand), ws(char(']'))),
            Expr::List,
        ),
    )(input)
}

fn parenthesized(input: &str) -> ParseResult<'_, Expr> {
    delimited(ws(char('(')), or_expr, ws(char(')')))(input)
}

fn operand(input: &str) -> ParseResult<'_, Expr> {
    ws(alt((
        parenthesized,
        list_literal,
        string_literal,
        number_literal,
        keyword_literal,
        reference,
    )))(input)
}

fn compare_op(input: &str) -> ParseResult<'_, CompareOp> {
    ws(alt((
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::NotIn, pair(keyword("not"), preceded(multispace1, keyword("in")))),
        value(CompareOp::In, keyword("in")),
    )))(input)
}

fn comparison(input: &str) -> ParseResult<'_, Expr> {
    map(pair(operand, opt(pair(compare_op, operand))), |(left, rhs)| match rhs {
        Some((op, right)) => Expr::Compare { op, left: Box::new(left), right: Box::new(right) },
        None => left,
    })(input)
}

fn not_op(input: &str) -> ParseResult<'_, &str> {
    ws(alt((keyword("not"), terminated(tag("!"), not(peek(char('=')))))))(input)
}

fn unary(input: &str) -> ParseResult<'_, Expr> {
    alt((map(preceded(not_op, unary), |e| Expr::Not(Box::new(e))), comparison))(input)
}

fn and_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(ws(alt((keyword("and"), tag("&&")))), unary))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)))))
}

fn or_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(alt((keyword("or"), tag("||")))), and_expr))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)))))
}
