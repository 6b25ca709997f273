//! Parsing and matching of XSLT `match` patterns.
//!
//! A pattern is a union of location paths built from child and attribute
//! steps joined by `/` or `//`, with optional predicates. Matching walks
//! the path right to left from the candidate node.

use crate::datasources::{NodeKind, XmlNode};
use crate::error::XsltError;
use crate::eval::{Evaluator, Focus, Value};
use crate::expression::{self, Expr, NodeTest, node_test, predicate, ws};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::{all_consuming, opt, value};
use nom::multi::{many0, separated_list1};
use nom::{IResult, Parser};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternAxis {
    Child,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
struct PatternStep {
    axis: PatternAxis,
    test: NodeTest,
    predicates: Vec<Expr>,
    /// Preceded by `//`: any number of ancestors may sit between this step
    /// and the previous one.
    skip_ancestors: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct PathPattern {
    absolute: bool,
    steps: Vec<PatternStep>,
}

/// A compiled match pattern such as `metadata/idinfo | keyword`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    alternatives: Vec<PathPattern>,
    text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, XsltError> {
        match all_consuming(ws(union_pattern)).parse(text) {
            Ok((_, alternatives)) => Ok(Pattern {
                alternatives,
                text: text.to_string(),
            }),
            Err(e) => Err(XsltError::XPathParse(text.to_string(), e.to_string())),
        }
    }

    /// Resolves name-test prefixes and predicate expressions against the
    /// stylesheet's namespace declarations.
    pub fn resolve_prefixes(
        &mut self,
        lookup: &dyn Fn(&str) -> Option<String>,
        on_extension: &mut dyn FnMut(&str),
    ) -> Result<(), XsltError> {
        for alt in &mut self.alternatives {
            for step in &mut alt.steps {
                if let NodeTest::Name {
                    prefix: Some(p),
                    namespace,
                    local,
                } = &mut step.test
                {
                    let uri = lookup(p).ok_or_else(|| {
                        XsltError::Compilation(format!(
                            "Undeclared namespace prefix '{}' in pattern step '{}:{}'",
                            p, p, local
                        ))
                    })?;
                    *namespace = Some(uri);
                }
                for pred in &mut step.predicates {
                    expression::resolve_prefixes(pred, lookup, on_extension)?;
                }
            }
        }
        Ok(())
    }

    /// The default priority of the highest-priority alternative matching
    /// `node`, or `None` if no alternative matches.
    pub fn match_priority<'a, 'i>(
        &self,
        node: XmlNode<'a, 'i>,
        evaluator: &Evaluator<'_, 'a, 'i>,
    ) -> Result<Option<f64>, XsltError> {
        let mut best: Option<f64> = None;
        for alt in &self.alternatives {
            if alt.matches(node, evaluator)? {
                let p = alt.default_priority();
                best = Some(best.map_or(p, |b| b.max(p)));
            }
        }
        Ok(best)
    }

    pub fn matches<'a, 'i>(
        &self,
        node: XmlNode<'a, 'i>,
        evaluator: &Evaluator<'_, 'a, 'i>,
    ) -> Result<bool, XsltError> {
        Ok(self.match_priority(node, evaluator)?.is_some())
    }
}

impl PathPattern {
    fn default_priority(&self) -> f64 {
        if self.absolute || self.steps.len() != 1 {
            return 0.5;
        }
        let step = &self.steps[0];
        if !step.predicates.is_empty() || step.skip_ancestors {
            return 0.5;
        }
        match step.test {
            NodeTest::Name { .. } => 0.0,
            _ => -0.5,
        }
    }

    fn matches<'a, 'i>(
        &self,
        node: XmlNode<'a, 'i>,
        evaluator: &Evaluator<'_, 'a, 'i>,
    ) -> Result<bool, XsltError> {
        if self.steps.is_empty() {
            // "/"
            return Ok(node.kind() == NodeKind::Root);
        }
        self.match_from(self.steps.len() - 1, node, evaluator)
    }

    fn match_from<'a, 'i>(
        &self,
        index: usize,
        node: XmlNode<'a, 'i>,
        evaluator: &Evaluator<'_, 'a, 'i>,
    ) -> Result<bool, XsltError> {
        let step = &self.steps[index];
        if !step.matches(node, evaluator)? {
            return Ok(false);
        }

        if index == 0 {
            if !self.absolute || step.skip_ancestors {
                return Ok(true);
            }
            return Ok(node.parent().is_some_and(|p| p.kind() == NodeKind::Root));
        }

        if step.skip_ancestors {
            for ancestor in node.ancestors() {
                if self.match_from(index - 1, ancestor, evaluator)? {
                    return Ok(true);
                }
            }
            Ok(false)
        } else {
            match node.parent() {
                Some(parent) => self.match_from(index - 1, parent, evaluator),
                None => Ok(false),
            }
        }
    }
}

impl PatternStep {
    fn test_matches(&self, node: XmlNode<'_, '_>) -> bool {
        let kind = node.kind();
        let on_axis = match self.axis {
            PatternAxis::Attribute => kind == NodeKind::Attribute,
            PatternAxis::Child => !matches!(kind, NodeKind::Attribute | NodeKind::Root),
        };
        if !on_axis {
            return false;
        }

        let principal = match self.axis {
            PatternAxis::Attribute => NodeKind::Attribute,
            PatternAxis::Child => NodeKind::Element,
        };
        match &self.test {
            NodeTest::Wildcard => kind == principal,
            NodeTest::Name {
                namespace, local, ..
            } => kind == principal && node.local_name() == local && node.namespace() == namespace.as_deref(),
            NodeTest::Text => kind == NodeKind::Text,
            NodeTest::Comment => kind == NodeKind::Comment,
            NodeTest::Node => true,
        }
    }

    fn matches<'a, 'i>(
        &self,
        node: XmlNode<'a, 'i>,
        evaluator: &Evaluator<'_, 'a, 'i>,
    ) -> Result<bool, XsltError> {
        if !self.test_matches(node) {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }

        // Predicates see the node's position among its siblings that pass
        // the same node test.
        let siblings: Vec<_> = match node.parent() {
            Some(parent) => match self.axis {
                PatternAxis::Attribute => parent.attributes(),
                PatternAxis::Child => parent.children(),
            },
            None => vec![node],
        }
        .into_iter()
        .filter(|n| self.test_matches(*n))
        .collect();

        let size = siblings.len();
        let position = siblings.iter().position(|n| *n == node).map_or(1, |p| p + 1);
        let focus = Focus {
            node,
            position,
            size,
        };
        for pred in &self.predicates {
            let passed = match evaluator.evaluate(pred, focus)? {
                Value::Number(n) => n == position as f64,
                other => other.to_boolean(),
            };
            if !passed {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// --- Parser ---

type Res<'a, T> = IResult<&'a str, T>;

fn union_pattern(input: &str) -> Res<'_, Vec<PathPattern>> {
    separated_list1(ws(char('|')), path_pattern).parse(input)
}

fn path_pattern(input: &str) -> Res<'_, PathPattern> {
    if let Ok((rest, _)) = ws(tag("//")).parse(input) {
        let (rest, mut steps) = relative_pattern(rest)?;
        steps[0].skip_ancestors = true;
        return Ok((
            rest,
            PathPattern {
                absolute: true,
                steps,
            },
        ));
    }
    if let Ok((rest, _)) = ws(char('/')).parse(input) {
        let (rest, steps) = opt(relative_pattern).parse(rest)?;
        return Ok((
            rest,
            PathPattern {
                absolute: true,
                steps: steps.unwrap_or_default(),
            },
        ));
    }
    let (rest, steps) = relative_pattern(input)?;
    Ok((
        rest,
        PathPattern {
            absolute: false,
            steps,
        },
    ))
}

fn relative_pattern(input: &str) -> Res<'_, Vec<PatternStep>> {
    let (mut input, first) = pattern_step(input)?;
    let mut steps = vec![first];
    loop {
        let separator = alt((value(true, ws(tag("//"))), value(false, ws(char('/'))))).parse(input);
        match separator {
            Ok((rest, skip_ancestors)) => {
                let (rest, mut step) = pattern_step(rest)?;
                step.skip_ancestors = skip_ancestors;
                steps.push(step);
                input = rest;
            }
            Err(_) => break,
        }
    }
    Ok((input, steps))
}

fn pattern_step(input: &str) -> Res<'_, PatternStep> {
    let (input, axis) = opt(ws(alt((
        value(PatternAxis::Attribute, char('@')),
        value(PatternAxis::Attribute, tag("attribute::")),
        value(PatternAxis::Child, tag("child::")),
    ))))
    .parse(input)?;
    let (input, test) = ws(node_test).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        PatternStep {
            axis: axis.unwrap_or(PatternAxis::Child),
            test,
            predicates,
            skip_ancestors: false,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasources::XmlDocument;
    use metadoc_template_core::ExtensionNamespaceBinding;

    const DOC: &str = r#"<metadata><idinfo><citation><title>T</title></citation></idinfo><keyword type="theme">a</keyword><keyword>b</keyword></metadata>"#;

    fn find<'a, 'i>(root: XmlNode<'a, 'i>, name: &str) -> Vec<XmlNode<'a, 'i>> {
        root.descendants()
            .into_iter()
            .filter(|n| n.kind() == NodeKind::Element && n.local_name() == name)
            .collect()
    }

    fn check(pattern: &str, f: impl for<'a, 'i> Fn(&Pattern, &Evaluator<'_, 'a, 'i>, XmlNode<'a, 'i>)) {
        let doc = XmlDocument::parse(DOC).unwrap();
        let binding = ExtensionNamespaceBinding::default();
        let evaluator = Evaluator::new(doc.root(), &[], &[], &binding);
        let pattern = Pattern::parse(pattern).unwrap();
        f(&pattern, &evaluator, doc.root());
    }

    #[test]
    fn test_root_pattern() {
        check("/", |p, ev, root| {
            assert!(p.matches(root, ev).unwrap());
            assert!(!p.matches(find(root, "metadata")[0], ev).unwrap());
        });
    }

    #[test]
    fn test_parent_child_and_descendant_patterns() {
        check("citation/title", |p, ev, root| {
            assert!(p.matches(find(root, "title")[0], ev).unwrap());
        });
        check("metadata//title", |p, ev, root| {
            assert!(p.matches(find(root, "title")[0], ev).unwrap());
        });
        check("idinfo/title", |p, ev, root| {
            assert!(!p.matches(find(root, "title")[0], ev).unwrap());
        });
        check("/metadata", |p, ev, root| {
            assert!(p.matches(find(root, "metadata")[0], ev).unwrap());
        });
        check("/idinfo", |p, ev, root| {
            assert!(!p.matches(find(root, "idinfo")[0], ev).unwrap());
        });
    }

    #[test]
    fn test_predicates_in_patterns() {
        check("keyword[@type='theme']", |p, ev, root| {
            let keywords = find(root, "keyword");
            assert!(p.matches(keywords[0], ev).unwrap());
            assert!(!p.matches(keywords[1], ev).unwrap());
        });
        check("keyword[2]", |p, ev, root| {
            let keywords = find(root, "keyword");
            assert!(!p.matches(keywords[0], ev).unwrap());
            assert!(p.matches(keywords[1], ev).unwrap());
        });
    }

    #[test]
    fn test_default_priorities() {
        check("keyword | * | citation/title", |p, ev, root| {
            let keyword = find(root, "keyword")[0];
            assert_eq!(p.match_priority(keyword, ev).unwrap(), Some(0.0));
            let title = find(root, "title")[0];
            assert_eq!(p.match_priority(title, ev).unwrap(), Some(0.5));
            let idinfo = find(root, "idinfo")[0];
            assert_eq!(p.match_priority(idinfo, ev).unwrap(), Some(-0.5));
        });
    }

    #[test]
    fn test_attribute_and_text_patterns() {
        check("@type", |p, ev, root| {
            let attr = find(root, "keyword")[0].attributes()[0];
            assert!(p.matches(attr, ev).unwrap());
        });
        check("text()", |p, ev, root| {
            let text = find(root, "title")[0].children()[0];
            assert!(p.matches(text, ev).unwrap());
            assert!(!p.matches(root, ev).unwrap());
        });
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Pattern::parse("a[").is_err());
        assert!(Pattern::parse("").is_err());
    }
}
