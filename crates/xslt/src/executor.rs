//! Executes a `CompiledProgram` against one input document.

use crate::ast::{Body, CompiledProgram, Instruction, SortKey, TemplateRule};
use crate::datasources::XmlNode;
use crate::error::XsltError;
use crate::eval::{Evaluator, Focus, Value, Variables};
use crate::executor_handlers::{
    apply_templates, call_template, control_flow, copy, for_each, literals, variables,
};
use crate::output::{OutputBuilder, TextCollector};
use metadoc_template_core::ExtensionNamespaceBinding;
use std::cmp::Ordering;

/// Template nesting beyond this is treated as runaway recursion.
pub(crate) const MAX_DEPTH: usize = 256;

pub struct TemplateExecutor<'p, 'a, 'i> {
    pub(crate) program: &'p CompiledProgram,
    pub(crate) binding: &'p ExtensionNamespaceBinding,
    pub(crate) root: XmlNode<'a, 'i>,
    pub(crate) globals: Variables<'a, 'i>,
    /// Local bindings, innermost last. Bodies truncate back to their entry
    /// length when they finish.
    pub(crate) locals: Variables<'a, 'i>,
    depth: usize,
}

impl<'p, 'a, 'i> TemplateExecutor<'p, 'a, 'i> {
    pub fn new(
        program: &'p CompiledProgram,
        binding: &'p ExtensionNamespaceBinding,
        root: XmlNode<'a, 'i>,
    ) -> Self {
        Self {
            program,
            binding,
            root,
            globals: Vec::new(),
            locals: Vec::new(),
            depth: 0,
        }
    }

    /// Evaluates global variables, then applies templates to the root.
    pub fn run(&mut self, out: &mut dyn OutputBuilder) -> Result<(), XsltError> {
        let program = self.program;
        let root = self.root;
        let focus = Focus::single(root);
        for global in &program.globals {
            let value = self.evaluate_binding(global, focus)?;
            self.globals.push((global.name.clone(), value));
        }
        apply_templates::apply_templates_to_nodes(self, &[root], None, &Variables::new(), out)
    }

    pub(crate) fn evaluator(&self) -> Evaluator<'_, 'a, 'i> {
        Evaluator::new(self.root, &self.locals, &self.globals, self.binding)
    }

    pub(crate) fn evaluate(
        &self,
        expr: &crate::expression::Expr,
        focus: Focus<'a, 'i>,
    ) -> Result<Value<'a, 'i>, XsltError> {
        self.evaluator().evaluate(expr, focus)
    }

    /// A variable's value: its `select`, or the text its body produces.
    pub(crate) fn evaluate_binding(
        &mut self,
        binding: &crate::ast::Binding,
        focus: Focus<'a, 'i>,
    ) -> Result<Value<'a, 'i>, XsltError> {
        match &binding.select {
            Some(select) => self.evaluate(select, focus),
            None => {
                let mut collector = TextCollector::new();
                self.execute_body(&binding.body, focus, &mut collector)?;
                Ok(Value::String(collector.finish()))
            }
        }
    }

    pub(crate) fn execute_body(
        &mut self,
        body: &Body,
        focus: Focus<'a, 'i>,
        out: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        let mark = self.locals.len();
        let mut result = Ok(());
        for instruction in body {
            result = self.execute_instruction(instruction, focus, out);
            if result.is_err() {
                break;
            }
        }
        self.locals.truncate(mark);
        result
    }

    fn execute_instruction(
        &mut self,
        instruction: &Instruction,
        focus: Focus<'a, 'i>,
        out: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        match instruction {
            Instruction::Text(text) => {
                out.text(text);
                Ok(())
            }
            Instruction::ValueOf { select } => literals::handle_value_of(self, select, focus, out),
            Instruction::CopyOf { select } => copy::handle_copy_of(self, select, focus, out),
            Instruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
                params,
            } => apply_templates::handle_apply_templates(
                self,
                select.as_ref(),
                mode.as_deref(),
                sort_keys,
                params,
                focus,
                out,
            ),
            Instruction::CallTemplate { name, params } => {
                call_template::handle_call_template(self, name, params, focus, out)
            }
            Instruction::ForEach {
                select,
                sort_keys,
                body,
            } => for_each::handle_for_each(self, select, sort_keys, body, focus, out),
            Instruction::If { test, body } => control_flow::handle_if(self, test, body, focus, out),
            Instruction::Choose { whens, otherwise } => {
                control_flow::handle_choose(self, whens, otherwise.as_ref(), focus, out)
            }
            Instruction::Variable(binding) => variables::handle_variable(self, binding, focus),
            Instruction::LiteralElement {
                name,
                namespaces,
                attributes,
                body,
            } => literals::handle_literal_element(self, name, namespaces, attributes, body, focus, out),
            Instruction::Element { name, body } => {
                literals::handle_element(self, name, body, focus, out)
            }
            Instruction::Attribute { name, body } => {
                literals::handle_attribute(self, name, body, focus, out)
            }
            Instruction::Comment { body } => literals::handle_comment(self, body, focus, out),
        }
    }

    /// Runs `template` for `focus` with a fresh local scope holding `params`.
    pub(crate) fn invoke_template(
        &mut self,
        template: &TemplateRule,
        params: Variables<'a, 'i>,
        focus: Focus<'a, 'i>,
        out: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        if self.depth >= MAX_DEPTH {
            return Err(XsltError::Execution(format!(
                "Template recursion exceeded {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let saved = std::mem::take(&mut self.locals);

        let result = self.bind_params_and_run(template, params, focus, out);
        self.locals = saved;
        self.depth -= 1;
        result
    }

    fn bind_params_and_run(
        &mut self,
        template: &TemplateRule,
        mut passed: Variables<'a, 'i>,
        focus: Focus<'a, 'i>,
        out: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        for declared in &template.params {
            // Defaults are only evaluated when the caller did not pass a value.
            let value = match passed.iter().rposition(|(n, _)| *n == declared.name) {
                Some(index) => passed.swap_remove(index).1,
                None => self.evaluate_binding(declared, focus)?,
            };
            self.locals.push((declared.name.clone(), value));
        }
        self.execute_body(&template.body, focus, out)
    }

    /// Evaluates `with-param` bindings in the caller's context.
    pub(crate) fn evaluate_params(
        &mut self,
        params: &[crate::ast::Binding],
        focus: Focus<'a, 'i>,
    ) -> Result<Variables<'a, 'i>, XsltError> {
        let mut values = Vec::with_capacity(params.len());
        for param in params {
            values.push((param.name.clone(), self.evaluate_binding(param, focus)?));
        }
        Ok(values)
    }

    /// Stable sort of `nodes` by `keys`; each key sees the node's original position.
    pub(crate) fn sort_nodes(
        &self,
        nodes: &mut Vec<XmlNode<'a, 'i>>,
        keys: &[SortKey],
    ) -> Result<(), XsltError> {
        if keys.is_empty() {
            return Ok(());
        }
        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, node) in nodes.iter().enumerate() {
            let focus = Focus {
                node: *node,
                position: i + 1,
                size,
            };
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                values.push(self.evaluate(&key.select, focus)?);
            }
            keyed.push((values, *node));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (key, (va, vb)) in keys.iter().zip(a.iter().zip(b.iter())) {
                let ord = if key.numeric {
                    let (x, y) = (va.to_number(), vb.to_number());
                    // NaN sorts first.
                    match (x.is_nan(), y.is_nan()) {
                        (true, true) => Ordering::Equal,
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        _ => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    }
                } else {
                    va.to_string_value().cmp(&vb.to_string_value())
                };
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        *nodes = keyed.into_iter().map(|(_, n)| n).collect();
        Ok(())
    }
}
