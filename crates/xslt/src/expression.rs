//! XPath 1.0 subset: expression AST and parser.
//!
//! Supported: location paths over the child, attribute, self, parent,
//! descendant, descendant-or-self, ancestor and sibling axes with
//! predicates; string and number literals; variables; function calls
//! (core and prefixed extension functions); `|`, comparisons, `and`, `or`.
//! Arithmetic is not supported.

use crate::error::XsltError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize, value};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

type Res<'a, T> = IResult<&'a str, T>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    Path(LocationPath),
    /// A primary expression followed by predicates and/or a relative path,
    /// e.g. `$items[1]/name`.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    FunctionCall {
        prefix: Option<String>,
        /// Namespace URI of `prefix`, filled in at compile time.
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn abbreviated(axis: Axis) -> Self {
        Step {
            axis,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }

    pub(crate) fn descendant_or_self() -> Self {
        Self::abbreviated(Axis::DescendantOrSelf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    /// Reverse axes count proximity positions backwards from the context node.
    pub fn is_reverse(self) -> bool {
        matches!(self, Axis::Ancestor | Axis::PrecedingSibling | Axis::Parent)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name {
        prefix: Option<String>,
        namespace: Option<String>,
        local: String,
    },
    Wildcard,
    Text,
    Node,
    Comment,
}

/// Parses an expression. Prefixes are left unresolved; see [`resolve_prefixes`].
pub fn parse_expression(text: &str) -> Result<Expr, XsltError> {
    match all_consuming(ws(expr)).parse(text) {
        Ok((_, parsed)) => Ok(parsed),
        Err(e) => Err(XsltError::XPathParse(text.to_string(), e.to_string())),
    }
}

/// Replaces prefixes with namespace URIs using `lookup`.
///
/// Every namespace reached through a function call is reported to
/// `on_extension` so the compiler can record what the program calls.
pub fn resolve_prefixes(
    expr: &mut Expr,
    lookup: &dyn Fn(&str) -> Option<String>,
    on_extension: &mut dyn FnMut(&str),
) -> Result<(), XsltError> {
    match expr {
        Expr::Literal(_) | Expr::Number(_) | Expr::Variable(_) => Ok(()),
        Expr::Path(path) => resolve_steps(&mut path.steps, lookup, on_extension),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            resolve_prefixes(primary, lookup, on_extension)?;
            for p in predicates.iter_mut() {
                resolve_prefixes(p, lookup, on_extension)?;
            }
            resolve_steps(steps, lookup, on_extension)
        }
        Expr::Binary { left, right, .. } => {
            resolve_prefixes(left, lookup, on_extension)?;
            resolve_prefixes(right, lookup, on_extension)
        }
        Expr::FunctionCall {
            prefix,
            namespace,
            name,
            args,
        } => {
            if let Some(p) = prefix {
                let uri = lookup(p).ok_or_else(|| {
                    XsltError::Compilation(format!(
                        "Undeclared namespace prefix '{}' in call to '{}:{}'",
                        p, p, name
                    ))
                })?;
                on_extension(&uri);
                *namespace = Some(uri);
            }
            for a in args.iter_mut() {
                resolve_prefixes(a, lookup, on_extension)?;
            }
            Ok(())
        }
    }
}

fn resolve_steps(
    steps: &mut [Step],
    lookup: &dyn Fn(&str) -> Option<String>,
    on_extension: &mut dyn FnMut(&str),
) -> Result<(), XsltError> {
    for step in steps.iter_mut() {
        if let NodeTest::Name {
            prefix: Some(p),
            namespace,
            local,
        } = &mut step.test
        {
            let uri = lookup(p).ok_or_else(|| {
                XsltError::Compilation(format!(
                    "Undeclared namespace prefix '{}' in name test '{}:{}'",
                    p, p, local
                ))
            })?;
            *namespace = Some(uri);
        }
        for p in step.predicates.iter_mut() {
            resolve_prefixes(p, lookup, on_extension)?;
        }
    }
    Ok(())
}

// --- Parser ---

pub(crate) fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub(crate) fn ncname(input: &str) -> Res<'_, &str> {
    recognize(pair(take_while1(is_name_start), take_while(is_name_char))).parse(input)
}

/// `local` or `prefix:local`. A following `::` belongs to an axis, not a prefix.
pub(crate) fn qname(input: &str) -> Res<'_, (Option<&str>, &str)> {
    let (rest, first) = ncname(input)?;
    if let Some(after) = rest.strip_prefix(':') {
        if !after.starts_with(':') {
            if let Ok((rest2, local)) = ncname(after) {
                return Ok((rest2, (Some(first), local)));
            }
        }
    }
    Ok((rest, (None, first)))
}

fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(kw), not(satisfy(is_name_char)))
}

fn slash(input: &str) -> Res<'_, &str> {
    ws(tag("/")).parse(input)
}

fn double_slash(input: &str) -> Res<'_, &str> {
    ws(tag("//")).parse(input)
}

fn expr(input: &str) -> Res<'_, Expr> {
    or_expr(input)
}

fn binary_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> Res<'a, Expr>,
    operator: fn(&'a str) -> Res<'a, BinaryOp>,
) -> Res<'a, Expr> {
    let (mut input, mut left) = operand(input)?;
    loop {
        match operator(input) {
            Ok((rest, op)) => {
                let (rest, right) = operand(rest)?;
                left = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, left))
}

fn or_expr(input: &str) -> Res<'_, Expr> {
    binary_chain(input, and_expr, |i| value(BinaryOp::Or, ws(keyword("or"))).parse(i))
}

fn and_expr(input: &str) -> Res<'_, Expr> {
    binary_chain(input, equality_expr, |i| {
        value(BinaryOp::And, ws(keyword("and"))).parse(i)
    })
}

fn equality_expr(input: &str) -> Res<'_, Expr> {
    binary_chain(input, relational_expr, |i| {
        alt((
            value(BinaryOp::Ne, ws(tag("!="))),
            value(BinaryOp::Eq, ws(tag("="))),
        ))
        .parse(i)
    })
}

fn relational_expr(input: &str) -> Res<'_, Expr> {
    binary_chain(input, union_expr, |i| {
        alt((
            value(BinaryOp::Le, ws(tag("<="))),
            value(BinaryOp::Ge, ws(tag(">="))),
            value(BinaryOp::Lt, ws(tag("<"))),
            value(BinaryOp::Gt, ws(tag(">"))),
        ))
        .parse(i)
    })
}

fn union_expr(input: &str) -> Res<'_, Expr> {
    binary_chain(input, path_expr, |i| value(BinaryOp::Union, ws(tag("|"))).parse(i))
}

fn path_expr(input: &str) -> Res<'_, Expr> {
    if let Ok((rest, primary)) = ws(primary_expr).parse(input) {
        let (rest, predicates) = many0(predicate).parse(rest)?;
        let (rest, steps) = if let Ok((r, _)) = double_slash(rest) {
            let (r, mut steps) = relative_path(r)?;
            steps.insert(0, Step::descendant_or_self());
            (r, steps)
        } else if let Ok((r, _)) = slash(rest) {
            relative_path(r)?
        } else {
            (rest, Vec::new())
        };

        if predicates.is_empty() && steps.is_empty() {
            return Ok((rest, primary));
        }
        return Ok((
            rest,
            Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            },
        ));
    }
    map(ws(location_path), Expr::Path).parse(input)
}

fn primary_expr(input: &str) -> Res<'_, Expr> {
    alt((
        delimited(ws(char('(')), expr, ws(char(')'))),
        map(string_literal, Expr::Literal),
        map(number, Expr::Number),
        map(preceded(char('$'), qname), |(prefix, local)| {
            Expr::Variable(match prefix {
                Some(p) => format!("{}:{}", p, local),
                None => local.to_string(),
            })
        }),
        function_call,
    ))
    .parse(input)
}

fn string_literal(input: &str) -> Res<'_, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
        str::to_string,
    )
    .parse(input)
}

fn number(input: &str) -> Res<'_, f64> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

fn function_call(input: &str) -> Res<'_, Expr> {
    let (rest, (prefix, name)) = qname(input)?;
    if prefix.is_none() && matches!(name, "text" | "node" | "comment" | "processing-instruction") {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expr),
        ws(char(')')),
    )
    .parse(rest)?;
    Ok((
        rest,
        Expr::FunctionCall {
            prefix: prefix.map(str::to_string),
            namespace: None,
            name: name.to_string(),
            args,
        },
    ))
}

pub(crate) fn predicate(input: &str) -> Res<'_, Expr> {
    delimited(ws(char('[')), expr, ws(char(']'))).parse(input)
}

fn location_path(input: &str) -> Res<'_, LocationPath> {
    if let Ok((rest, _)) = double_slash(input) {
        let (rest, mut steps) = relative_path(rest)?;
        steps.insert(0, Step::descendant_or_self());
        return Ok((
            rest,
            LocationPath {
                absolute: true,
                steps,
            },
        ));
    }
    if let Ok((rest, _)) = slash(input) {
        return match relative_path(rest) {
            Ok((rest, steps)) => Ok((
                rest,
                LocationPath {
                    absolute: true,
                    steps,
                },
            )),
            Err(_) => Ok((
                rest,
                LocationPath {
                    absolute: true,
                    steps: Vec::new(),
                },
            )),
        };
    }
    let (rest, steps) = relative_path(input)?;
    Ok((
        rest,
        LocationPath {
            absolute: false,
            steps,
        },
    ))
}

pub(crate) fn relative_path(input: &str) -> Res<'_, Vec<Step>> {
    let (mut input, first) = step(input)?;
    let mut steps = vec![first];
    loop {
        if let Ok((rest, _)) = double_slash(input) {
            let (rest, next) = step(rest)?;
            steps.push(Step::descendant_or_self());
            steps.push(next);
            input = rest;
        } else if let Ok((rest, _)) = slash(input) {
            let (rest, next) = step(rest)?;
            steps.push(next);
            input = rest;
        } else {
            break;
        }
    }
    Ok((input, steps))
}

fn step(input: &str) -> Res<'_, Step> {
    alt((
        value(Step::abbreviated(Axis::Parent), ws(tag(".."))),
        value(Step::abbreviated(Axis::SelfAxis), ws(char('.'))),
        axis_step,
    ))
    .parse(input)
}

fn axis_step(input: &str) -> Res<'_, Step> {
    let (input, axis) = opt(ws(alt((
        value(Axis::Attribute, char('@')),
        terminated(axis_name, ws(tag("::"))),
    ))))
    .parse(input)?;
    let (input, test) = ws(node_test).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        Step {
            axis: axis.unwrap_or(Axis::Child),
            test,
            predicates,
        },
    ))
}

fn axis_name(input: &str) -> Res<'_, Axis> {
    alt((
        value(Axis::DescendantOrSelf, tag("descendant-or-self")),
        value(Axis::Descendant, tag("descendant")),
        value(Axis::FollowingSibling, tag("following-sibling")),
        value(Axis::PrecedingSibling, tag("preceding-sibling")),
        value(Axis::Ancestor, tag("ancestor")),
        value(Axis::Attribute, tag("attribute")),
        value(Axis::Parent, tag("parent")),
        value(Axis::SelfAxis, tag("self")),
        value(Axis::Child, tag("child")),
    ))
    .parse(input)
}

fn empty_parens(input: &str) -> Res<'_, ()> {
    value((), pair(ws(char('(')), char(')'))).parse(input)
}

pub(crate) fn node_test(input: &str) -> Res<'_, NodeTest> {
    alt((
        value(NodeTest::Wildcard, char('*')),
        value(NodeTest::Text, pair(tag("text"), empty_parens)),
        value(NodeTest::Node, pair(tag("node"), empty_parens)),
        value(NodeTest::Comment, pair(tag("comment"), empty_parens)),
        map(qname, |(prefix, local)| NodeTest::Name {
            prefix: prefix.map(str::to_string),
            namespace: None,
            local: local.to_string(),
        }),
    ))
    .parse(input)
}
