use crate::ast::{Body, When};
use crate::error::XsltError;
use crate::eval::Focus;
use crate::executor::TemplateExecutor;
use crate::expression::Expr;
use crate::output::OutputBuilder;

pub(crate) fn handle_if<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    test: &Expr,
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    if executor.evaluator().evaluate_boolean(test, focus)? {
        executor.execute_body(body, focus, out)?;
    }
    Ok(())
}

pub(crate) fn handle_choose<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    whens: &[When],
    otherwise: Option<&Body>,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    for when in whens {
        if executor.evaluator().evaluate_boolean(&when.test, focus)? {
            return executor.execute_body(&when.body, focus, out);
        }
    }
    match otherwise {
        Some(body) => executor.execute_body(body, focus, out),
        None => Ok(()),
    }
}
