use crate::ast::Binding;
use crate::error::XsltError;
use crate::eval::Focus;
use crate::executor::TemplateExecutor;
use crate::output::OutputBuilder;

pub(crate) fn handle_call_template<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    name: &str,
    params: &[Binding],
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let program = executor.program;
    let template = program
        .templates
        .iter()
        .filter(|t| t.name.as_deref() == Some(name))
        .max_by_key(|t| (t.precedence, t.order))
        .ok_or_else(|| XsltError::Execution(format!("No template named '{}'", name)))?;

    let params = executor.evaluate_params(params, focus)?;
    log::trace!("Calling template '{}' with {} params", name, params.len());
    // The called template keeps the caller's focus.
    executor.invoke_template(template, params, focus, out)
}
