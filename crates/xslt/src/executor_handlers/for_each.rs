use crate::ast::{Body, SortKey};
use crate::error::XsltError;
use crate::eval::Focus;
use crate::executor::TemplateExecutor;
use crate::expression::Expr;
use crate::output::OutputBuilder;

pub(crate) fn handle_for_each<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    select: &Expr,
    sort_keys: &[SortKey],
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let mut nodes = executor.evaluator().evaluate_nodes(select, focus)?;
    executor.sort_nodes(&mut nodes, sort_keys)?;

    let size = nodes.len();
    for (i, node) in nodes.into_iter().enumerate() {
        let inner = Focus {
            node,
            position: i + 1,
            size,
        };
        executor.execute_body(body, inner, out)?;
    }
    Ok(())
}
