use crate::ast::{Binding, SortKey, TemplateRule};
use crate::datasources::{NodeKind, XmlNode};
use crate::error::XsltError;
use crate::eval::{Focus, Variables};
use crate::executor::TemplateExecutor;
use crate::expression::Expr;
use crate::output::OutputBuilder;
use std::cmp::Ordering;

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_apply_templates<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    select: Option<&Expr>,
    mode: Option<&str>,
    sort_keys: &[SortKey],
    params: &[Binding],
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let mut nodes = match select {
        Some(expr) => executor.evaluator().evaluate_nodes(expr, focus)?,
        None => focus.node.children(),
    };
    executor.sort_nodes(&mut nodes, sort_keys)?;
    let params = executor.evaluate_params(params, focus)?;
    apply_templates_to_nodes(executor, &nodes, mode, &params, out)
}

/// Processes each node with its best matching rule, or the built-in rule.
pub(crate) fn apply_templates_to_nodes<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    nodes: &[XmlNode<'a, 'i>],
    mode: Option<&str>,
    params: &Variables<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let size = nodes.len();
    for (i, node) in nodes.iter().enumerate() {
        let focus = Focus {
            node: *node,
            position: i + 1,
            size,
        };
        match find_template(executor, *node, mode)? {
            Some(template) => executor.invoke_template(template, params.clone(), focus, out)?,
            None => apply_builtin(executor, focus, mode, params, out)?,
        }
    }
    Ok(())
}

/// Conflict resolution: highest import precedence, then highest priority,
/// then the rule declared last.
fn find_template<'p, 'a, 'i>(
    executor: &TemplateExecutor<'p, 'a, 'i>,
    node: XmlNode<'a, 'i>,
    mode: Option<&str>,
) -> Result<Option<&'p TemplateRule>, XsltError> {
    let program = executor.program;
    let evaluator = executor.evaluator();

    let mut best: Option<(&'p TemplateRule, f64)> = None;
    for rule in &program.templates {
        let Some(pattern) = &rule.pattern else {
            continue;
        };
        if rule.mode.as_deref() != mode {
            continue;
        }
        let Some(default_priority) = pattern.match_priority(node, &evaluator)? else {
            continue;
        };
        let priority = rule.priority.unwrap_or(default_priority);
        let better = match best {
            None => true,
            Some((current, current_priority)) => {
                rule.precedence
                    .cmp(&current.precedence)
                    .then(priority.total_cmp(&current_priority))
                    .then(rule.order.cmp(&current.order))
                    == Ordering::Greater
            }
        };
        if better {
            best = Some((rule, priority));
        }
    }

    if let Some((rule, _)) = best {
        log::trace!(
            "Node '{}' matched template '{}'",
            node.qualified_name(),
            rule.pattern.as_ref().map(|p| p.to_string()).unwrap_or_default()
        );
    }
    Ok(best.map(|(rule, _)| rule))
}

fn apply_builtin<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    focus: Focus<'a, 'i>,
    mode: Option<&str>,
    params: &Variables<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    match focus.node.kind() {
        NodeKind::Root | NodeKind::Element => {
            let children = focus.node.children();
            apply_templates_to_nodes(executor, &children, mode, params, out)
        }
        NodeKind::Text | NodeKind::Attribute => {
            out.text(&focus.node.string_value());
            Ok(())
        }
        NodeKind::Comment | NodeKind::ProcessingInstruction => Ok(()),
    }
}
