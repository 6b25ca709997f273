use crate::ast::Binding;
use crate::error::XsltError;
use crate::eval::Focus;
use crate::executor::TemplateExecutor;

/// Binds a local variable for the rest of the enclosing body.
pub(crate) fn handle_variable<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    binding: &Binding,
    focus: Focus<'a, 'i>,
) -> Result<(), XsltError> {
    let value = executor.evaluate_binding(binding, focus)?;
    executor.locals.push((binding.name.clone(), value));
    Ok(())
}
