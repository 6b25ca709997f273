//! Handlers for `apply-templates`, `call-template`, `for-each`, `if` and `choose`.

use crate::ast::{Instruction, When};
use crate::compiler::{CompilerBuilder, is_xsl, required_attr, structure_error};
use crate::error::XsltError;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn handle_apply_templates(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        for child in node.children().filter(|n| n.is_element()) {
            if !(is_xsl(child, "sort") || is_xsl(child, "with-param")) {
                return Err(structure_error(
                    child,
                    "<xsl:apply-templates> may only contain xsl:sort and xsl:with-param",
                ));
            }
        }
        Ok(Instruction::ApplyTemplates {
            select: self.optional_expression(node, "select")?,
            mode: node.attribute("mode").map(str::to_string),
            sort_keys: self.handle_sort_keys(node)?,
            params: self.handle_with_params(node)?,
        })
    }

    pub(crate) fn handle_call_template(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        Ok(Instruction::CallTemplate {
            name: required_attr(node, "name")?.to_string(),
            params: self.handle_with_params(node)?,
        })
    }

    pub(crate) fn handle_for_each(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        let select = self.required_expression(node, "select")?;
        let sort_keys = self.handle_sort_keys(node)?;
        let rest: Vec<_> = node.children().filter(|n| !is_xsl(*n, "sort")).collect();
        Ok(Instruction::ForEach {
            select,
            sort_keys,
            body: self.compile_nodes(&rest)?,
        })
    }

    pub(crate) fn handle_if(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        Ok(Instruction::If {
            test: self.required_expression(node, "test")?,
            body: self.compile_body(node)?,
        })
    }

    pub(crate) fn handle_choose(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        let mut whens = Vec::new();
        let mut otherwise = None;
        for child in node.children().filter(|n| n.is_element()) {
            if is_xsl(child, "when") && otherwise.is_none() {
                whens.push(When {
                    test: self.required_expression(child, "test")?,
                    body: self.compile_body(child)?,
                });
            } else if is_xsl(child, "otherwise") && otherwise.is_none() {
                otherwise = Some(self.compile_body(child)?);
            } else {
                return Err(structure_error(
                    child,
                    "<xsl:choose> may only contain xsl:when elements followed by one xsl:otherwise",
                ));
            }
        }
        if whens.is_empty() {
            return Err(structure_error(node, "<xsl:choose> needs at least one xsl:when"));
        }
        Ok(Instruction::Choose { whens, otherwise })
    }
}
