use crate::ast::{AttributeValueTemplate, AvtPart, Body};
use crate::error::XsltError;
use crate::eval::Focus;
use crate::executor::TemplateExecutor;
use crate::expression::Expr;
use crate::output::{NamespaceDecl, OutputBuilder, TextCollector};

pub(crate) fn handle_value_of<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    select: &Expr,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let text = executor.evaluator().evaluate_string(select, focus)?;
    out.text(&text);
    Ok(())
}

pub(crate) fn evaluate_avt<'a, 'i>(
    executor: &TemplateExecutor<'_, 'a, 'i>,
    avt: &AttributeValueTemplate,
    focus: Focus<'a, 'i>,
) -> Result<String, XsltError> {
    let evaluator = executor.evaluator();
    let mut out = String::new();
    for part in &avt.0 {
        match part {
            AvtPart::Static(text) => out.push_str(text),
            AvtPart::Dynamic(expr) => out.push_str(&evaluator.evaluate_string(expr, focus)?),
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_literal_element<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    name: &str,
    namespaces: &[NamespaceDecl],
    attributes: &[(String, AttributeValueTemplate)],
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    out.start_element(name, namespaces);
    for (attr_name, avt) in attributes {
        let value = evaluate_avt(executor, avt, focus)?;
        out.attribute(attr_name, &value);
    }
    executor.execute_body(body, focus, out)?;
    out.end_element();
    Ok(())
}

pub(crate) fn handle_element<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    name: &AttributeValueTemplate,
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let name = evaluate_avt(executor, name, focus)?;
    if name.is_empty() {
        return Err(XsltError::Execution(
            "xsl:element produced an empty name".to_string(),
        ));
    }
    out.start_element(&name, &[]);
    executor.execute_body(body, focus, out)?;
    out.end_element();
    Ok(())
}

pub(crate) fn handle_attribute<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    name: &AttributeValueTemplate,
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let name = evaluate_avt(executor, name, focus)?;
    let mut collector = TextCollector::new();
    executor.execute_body(body, focus, &mut collector)?;
    out.attribute(&name, &collector.finish());
    Ok(())
}

pub(crate) fn handle_comment<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    body: &Body,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let mut collector = TextCollector::new();
    executor.execute_body(body, focus, &mut collector)?;
    out.comment(&collector.finish());
    Ok(())
}
