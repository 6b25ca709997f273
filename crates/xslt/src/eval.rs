//! Expression evaluation against the input tree.

use crate::datasources::{NodeKind, XmlNode};
use crate::error::XsltError;
use crate::expression::{Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};
use metadoc_template_core::ExtensionNamespaceBinding;

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a, 'i> {
    NodeSet(Vec<XmlNode<'a, 'i>>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, 'i> Value<'a, 'i> {
    pub fn to_string_value(&self) -> String {
        match self {
            Value::NodeSet(nodes) => nodes.first().map(|n| n.string_value()).unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&other.to_string_value()),
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    pub fn into_nodes(self) -> Result<Vec<XmlNode<'a, 'i>>, XsltError> {
        match self {
            Value::NodeSet(nodes) => Ok(nodes),
            other => Err(XsltError::Execution(format!(
                "Expected a node-set, found {:?}",
                other
            ))),
        }
    }
}

/// Formats a number the way XPath's `string()` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits != ".";
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// The context node with its position in the current node list.
#[derive(Debug, Clone, Copy)]
pub struct Focus<'a, 'i> {
    pub node: XmlNode<'a, 'i>,
    pub position: usize,
    pub size: usize,
}

impl<'a, 'i> Focus<'a, 'i> {
    pub fn single(node: XmlNode<'a, 'i>) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }
}

pub type Variables<'a, 'i> = Vec<(String, Value<'a, 'i>)>;

/// Evaluates expressions with a fixed set of in-scope variables.
pub struct Evaluator<'r, 'a, 'i> {
    root: XmlNode<'a, 'i>,
    locals: &'r [(String, Value<'a, 'i>)],
    globals: &'r [(String, Value<'a, 'i>)],
    binding: &'r ExtensionNamespaceBinding,
}

impl<'r, 'a, 'i> Evaluator<'r, 'a, 'i> {
    pub fn new(
        root: XmlNode<'a, 'i>,
        locals: &'r [(String, Value<'a, 'i>)],
        globals: &'r [(String, Value<'a, 'i>)],
        binding: &'r ExtensionNamespaceBinding,
    ) -> Self {
        Self {
            root,
            locals,
            globals,
            binding,
        }
    }

    fn variable(&self, name: &str) -> Result<Value<'a, 'i>, XsltError> {
        self.locals
            .iter()
            .rev()
            .chain(self.globals.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| XsltError::Execution(format!("Undefined variable '${}'", name)))
    }

    pub fn evaluate(&self, expr: &Expr, focus: Focus<'a, 'i>) -> Result<Value<'a, 'i>, XsltError> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Variable(name) => self.variable(name),
            Expr::Path(path) => self.location_path(path, focus).map(Value::NodeSet),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.evaluate(primary, focus)?.into_nodes()?;
                for pred in predicates {
                    nodes = self.filter(nodes, pred)?;
                }
                for step in steps {
                    nodes = self.step(&nodes, step)?;
                }
                Ok(Value::NodeSet(nodes))
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right, focus),
            Expr::FunctionCall {
                namespace: Some(ns),
                name,
                args,
                ..
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, focus)?.to_string_value());
                }
                self.binding
                    .invoke(ns, name, &values)
                    .map(Value::String)
                    .map_err(|e| XsltError::Extension(e.to_string()))
            }
            Expr::FunctionCall { name, args, .. } => self.core_function(name, args, focus),
        }
    }

    pub fn evaluate_nodes(
        &self,
        expr: &Expr,
        focus: Focus<'a, 'i>,
    ) -> Result<Vec<XmlNode<'a, 'i>>, XsltError> {
        self.evaluate(expr, focus)?.into_nodes()
    }

    pub fn evaluate_string(&self, expr: &Expr, focus: Focus<'a, 'i>) -> Result<String, XsltError> {
        Ok(self.evaluate(expr, focus)?.to_string_value())
    }

    pub fn evaluate_boolean(&self, expr: &Expr, focus: Focus<'a, 'i>) -> Result<bool, XsltError> {
        Ok(self.evaluate(expr, focus)?.to_boolean())
    }

    fn location_path(
        &self,
        path: &LocationPath,
        focus: Focus<'a, 'i>,
    ) -> Result<Vec<XmlNode<'a, 'i>>, XsltError> {
        let mut nodes = vec![if path.absolute { self.root } else { focus.node }];
        for step in &path.steps {
            nodes = self.step(&nodes, step)?;
        }
        Ok(nodes)
    }

    fn step(
        &self,
        context: &[XmlNode<'a, 'i>],
        step: &Step,
    ) -> Result<Vec<XmlNode<'a, 'i>>, XsltError> {
        let mut result = Vec::new();
        for node in context {
            let mut candidates: Vec<_> = axis_nodes(*node, step.axis)
                .into_iter()
                .filter(|n| node_test_matches(*n, &step.test, step.axis))
                .collect();
            // Candidates are already in proximity order for the axis.
            for pred in &step.predicates {
                candidates = self.filter(candidates, pred)?;
            }
            result.extend(candidates);
        }
        result.sort();
        result.dedup();
        Ok(result)
    }

    fn filter(
        &self,
        nodes: Vec<XmlNode<'a, 'i>>,
        predicate: &Expr,
    ) -> Result<Vec<XmlNode<'a, 'i>>, XsltError> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.evaluate(predicate, focus)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        focus: Focus<'a, 'i>,
    ) -> Result<Value<'a, 'i>, XsltError> {
        match op {
            BinaryOp::Or => Ok(Value::Boolean(
                self.evaluate_boolean(left, focus)? || self.evaluate_boolean(right, focus)?,
            )),
            BinaryOp::And => Ok(Value::Boolean(
                self.evaluate_boolean(left, focus)? && self.evaluate_boolean(right, focus)?,
            )),
            BinaryOp::Union => {
                let mut nodes = self.evaluate_nodes(left, focus)?;
                nodes.extend(self.evaluate_nodes(right, focus)?);
                nodes.sort();
                nodes.dedup();
                Ok(Value::NodeSet(nodes))
            }
            _ => {
                let l = self.evaluate(left, focus)?;
                let r = self.evaluate(right, focus)?;
                Ok(Value::Boolean(compare(op, &l, &r)))
            }
        }
    }

    fn arg(
        &self,
        args: &[Expr],
        index: usize,
        focus: Focus<'a, 'i>,
    ) -> Result<Value<'a, 'i>, XsltError> {
        match args.get(index) {
            Some(expr) => self.evaluate(expr, focus),
            None => Ok(Value::NodeSet(vec![focus.node])),
        }
    }

    fn string_arg(
        &self,
        args: &[Expr],
        index: usize,
        focus: Focus<'a, 'i>,
    ) -> Result<String, XsltError> {
        Ok(self.arg(args, index, focus)?.to_string_value())
    }

    fn core_function(
        &self,
        name: &str,
        args: &[Expr],
        focus: Focus<'a, 'i>,
    ) -> Result<Value<'a, 'i>, XsltError> {
        let expect = |min: usize, max: usize| -> Result<(), XsltError> {
            if args.len() < min || args.len() > max {
                return Err(XsltError::Execution(format!(
                    "Function '{}' called with {} arguments",
                    name,
                    args.len()
                )));
            }
            Ok(())
        };

        let value = match name {
            "string" => {
                expect(0, 1)?;
                Value::String(self.string_arg(args, 0, focus)?)
            }
            "concat" => {
                expect(2, usize::MAX)?;
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.evaluate_string(arg, focus)?);
                }
                Value::String(out)
            }
            "count" => {
                expect(1, 1)?;
                Value::Number(self.evaluate_nodes(&args[0], focus)?.len() as f64)
            }
            "normalize-space" => {
                expect(0, 1)?;
                let s = self.string_arg(args, 0, focus)?;
                Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "not" => {
                expect(1, 1)?;
                Value::Boolean(!self.evaluate_boolean(&args[0], focus)?)
            }
            "true" => {
                expect(0, 0)?;
                Value::Boolean(true)
            }
            "false" => {
                expect(0, 0)?;
                Value::Boolean(false)
            }
            "boolean" => {
                expect(1, 1)?;
                Value::Boolean(self.evaluate_boolean(&args[0], focus)?)
            }
            "number" => {
                expect(0, 1)?;
                Value::Number(self.arg(args, 0, focus)?.to_number())
            }
            "contains" => {
                expect(2, 2)?;
                let (a, b) = (self.string_arg(args, 0, focus)?, self.string_arg(args, 1, focus)?);
                Value::Boolean(a.contains(&b))
            }
            "starts-with" => {
                expect(2, 2)?;
                let (a, b) = (self.string_arg(args, 0, focus)?, self.string_arg(args, 1, focus)?);
                Value::Boolean(a.starts_with(&b))
            }
            "substring-before" => {
                expect(2, 2)?;
                let (a, b) = (self.string_arg(args, 0, focus)?, self.string_arg(args, 1, focus)?);
                Value::String(a.find(&b).map(|i| a[..i].to_string()).unwrap_or_default())
            }
            "substring-after" => {
                expect(2, 2)?;
                let (a, b) = (self.string_arg(args, 0, focus)?, self.string_arg(args, 1, focus)?);
                Value::String(
                    a.find(&b)
                        .map(|i| a[i + b.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                expect(2, 3)?;
                let s = self.string_arg(args, 0, focus)?;
                let start = self.evaluate(&args[1], focus)?.to_number();
                let length = match args.get(2) {
                    Some(expr) => Some(self.evaluate(expr, focus)?.to_number()),
                    None => None,
                };
                Value::String(substring(&s, start, length))
            }
            "string-length" => {
                expect(0, 1)?;
                Value::Number(self.string_arg(args, 0, focus)?.chars().count() as f64)
            }
            "translate" => {
                expect(3, 3)?;
                let s = self.string_arg(args, 0, focus)?;
                let from: Vec<char> = self.string_arg(args, 1, focus)?.chars().collect();
                let to: Vec<char> = self.string_arg(args, 2, focus)?.chars().collect();
                Value::String(
                    s.chars()
                        .filter_map(|c| match from.iter().position(|f| *f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "name" | "local-name" | "namespace-uri" => {
                expect(0, 1)?;
                let node = match args.first() {
                    Some(expr) => self.evaluate_nodes(expr, focus)?.first().copied(),
                    None => Some(focus.node),
                };
                Value::String(match node {
                    Some(n) => match name {
                        "name" => n.qualified_name(),
                        "local-name" => n.local_name().to_string(),
                        _ => n.namespace().unwrap_or("").to_string(),
                    },
                    None => String::new(),
                })
            }
            "position" => {
                expect(0, 0)?;
                Value::Number(focus.position as f64)
            }
            "last" => {
                expect(0, 0)?;
                Value::Number(focus.size as f64)
            }
            other => {
                return Err(XsltError::Execution(format!("Unknown function '{}'", other)));
            }
        };
        Ok(value)
    }
}

fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = start.round();
    let last = match length {
        Some(len) => first + len.round(),
        None => f64::INFINITY,
    };
    if first.is_nan() || last.is_nan() {
        return String::new();
    }
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect()
}

fn axis_nodes<'a, 'i>(node: XmlNode<'a, 'i>, axis: Axis) -> Vec<XmlNode<'a, 'i>> {
    match axis {
        Axis::Child => node.children(),
        Axis::Attribute => node.attributes(),
        Axis::SelfAxis => vec![node],
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Descendant => node.descendants(),
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            out.extend(node.descendants());
            out
        }
        Axis::Ancestor => node.ancestors(),
        Axis::FollowingSibling => node.following_siblings(),
        Axis::PrecedingSibling => node.preceding_siblings(),
    }
}

fn node_test_matches(node: XmlNode<'_, '_>, test: &NodeTest, axis: Axis) -> bool {
    let kind = node.kind();
    let principal = if axis == Axis::Attribute {
        NodeKind::Attribute
    } else {
        NodeKind::Element
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => kind == NodeKind::Text,
        NodeTest::Comment => kind == NodeKind::Comment,
        NodeTest::Wildcard => kind == principal,
        NodeTest::Name {
            namespace, local, ..
        } => {
            kind == principal
                && node.local_name() == local
                && node.namespace() == namespace.as_deref()
        }
    }
}

fn compare(op: BinaryOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match (left, right) {
        (Value::NodeSet(l), Value::NodeSet(r)) => l.iter().any(|a| {
            let a = a.string_value();
            r.iter()
                .any(|b| compare_atomic(op, &Value::String(a.clone()), &Value::String(b.string_value())))
        }),
        (Value::NodeSet(nodes), Value::Boolean(_)) => {
            compare_atomic(op, &Value::Boolean(!nodes.is_empty()), right)
        }
        (Value::Boolean(_), Value::NodeSet(nodes)) => {
            compare_atomic(op, left, &Value::Boolean(!nodes.is_empty()))
        }
        (Value::NodeSet(nodes), other) => nodes
            .iter()
            .any(|n| compare_atomic(op, &Value::String(n.string_value()), other)),
        (other, Value::NodeSet(nodes)) => nodes
            .iter()
            .any(|n| compare_atomic(op, other, &Value::String(n.string_value()))),
        _ => compare_atomic(op, left, right),
    }
}

fn compare_atomic(op: BinaryOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    left.to_boolean() == right.to_boolean()
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => left.to_number() == right.to_number(),
                _ => left.to_string_value() == right.to_string_value(),
            };
            if op == BinaryOp::Eq { equal } else { !equal }
        }
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            match op {
                BinaryOp::Lt => l < r,
                BinaryOp::Le => l <= r,
                BinaryOp::Gt => l > r,
                BinaryOp::Ge => l >= r,
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasources::XmlDocument;
    use crate::expression::parse_expression;
    use metadoc_template_core::ExtensionBinding;
    use metadoc_traits::InMemoryResourceResolver;
    use std::sync::Arc;

    const DOC: &str = r#"<metadata>
        <idinfo><citation><title>Rivers of Norway</title></citation></idinfo>
        <keywords><theme>water</theme><theme>hydrology</theme><place>Norway</place></keywords>
        <count>3</count>
    </metadata>"#;

    fn eval_with(xml: &str, expr: &str, binding: &ExtensionNamespaceBinding) -> String {
        let doc = XmlDocument::parse(xml).unwrap();
        let evaluator = Evaluator::new(doc.root(), &[], &[], binding);
        let expr = parse_expression(expr).unwrap();
        evaluator
            .evaluate(&expr, Focus::single(doc.root()))
            .unwrap()
            .to_string_value()
    }

    fn eval(expr: &str) -> String {
        eval_with(DOC, expr, &ExtensionNamespaceBinding::default())
    }

    #[test]
    fn test_paths_and_string_value() {
        assert_eq!(eval("metadata/idinfo/citation/title"), "Rivers of Norway");
        assert_eq!(eval("//title"), "Rivers of Norway");
        assert_eq!(eval("count(//theme)"), "2");
        assert_eq!(eval("count(/metadata/keywords/*)"), "3");
    }

    #[test]
    fn test_predicates_and_positions() {
        assert_eq!(eval("//theme[2]"), "hydrology");
        assert_eq!(eval("//theme[last()]"), "hydrology");
        assert_eq!(eval("//theme[. = 'water']"), "water");
        assert_eq!(eval("//place/preceding-sibling::theme[1]"), "hydrology");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("//count = 3"), "true");
        assert_eq!(eval("//count > 2"), "true");
        assert_eq!(eval("//theme = 'hydrology'"), "true");
        assert_eq!(eval("//theme != 'water'"), "true");
        assert_eq!(eval("//missing = ''"), "false");
        assert_eq!(eval("not(//missing)"), "true");
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval("concat('a', 'b', 'c')"), "abc");
        assert_eq!(eval("normalize-space('  a   b ')"), "a b");
        assert_eq!(eval("substring-before('2024-01-02', '-')"), "2024");
        assert_eq!(eval("substring-after('2024-01-02', '-')"), "01-02");
        assert_eq!(eval("substring('12345', 2, 3)"), "234");
        assert_eq!(eval("translate('abc', 'abc', 'AB')"), "AB");
        assert_eq!(eval("string-length('héllo')"), "5");
        assert_eq!(eval("name(/*)"), "metadata");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(-0.0), "0");
        assert!(parse_number("abc").is_nan());
        assert_eq!(parse_number(" 42 "), 42.0);
    }

    #[test]
    fn test_extension_function_dispatch() {
        let strings = Arc::new(InMemoryResourceResolver::from_pairs([("title", "Tittel")]));
        let binding = ExtensionBinding::new().bind("urn:res", strings).build();
        let doc = XmlDocument::parse("<r/>").unwrap();
        let evaluator = Evaluator::new(doc.root(), &[], &[], &binding);
        let expr = Expr::FunctionCall {
            prefix: Some("res".to_string()),
            namespace: Some("urn:res".to_string()),
            name: "GetString".to_string(),
            args: vec![Expr::Literal("title".to_string())],
        };
        let value = evaluator.evaluate(&expr, Focus::single(doc.root())).unwrap();
        assert_eq!(value.to_string_value(), "Tittel");
    }

    #[test]
    fn test_unbound_extension_namespace_fails() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let binding = ExtensionNamespaceBinding::default();
        let evaluator = Evaluator::new(doc.root(), &[], &[], &binding);
        let expr = Expr::FunctionCall {
            prefix: Some("x".to_string()),
            namespace: Some("urn:none".to_string()),
            name: "f".to_string(),
            args: vec![],
        };
        let err = evaluator
            .evaluate(&expr, Focus::single(doc.root()))
            .unwrap_err();
        assert!(matches!(err, XsltError::Extension(_)));
    }

    #[test]
    fn test_variables_shadow_globals() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let binding = ExtensionNamespaceBinding::default();
        let globals = vec![("v".to_string(), Value::String("global".to_string()))];
        let locals = vec![("v".to_string(), Value::String("local".to_string()))];
        let evaluator = Evaluator::new(doc.root(), &locals, &globals, &binding);
        let expr = parse_expression("$v").unwrap();
        assert_eq!(
            evaluator
                .evaluate(&expr, Focus::single(doc.root()))
                .unwrap()
                .to_string_value(),
            "local"
        );
        assert!(evaluator
            .evaluate(&parse_expression("$nope").unwrap(), Focus::single(doc.root()))
            .is_err());
    }

    #[test]
    fn test_unknown_function_fails() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let binding = ExtensionNamespaceBinding::default();
        let evaluator = Evaluator::new(doc.root(), &[], &[], &binding);
        let expr = parse_expression("frobnicate()").unwrap();
        assert!(evaluator.evaluate(&expr, Focus::single(doc.root())).is_err());
    }
}
