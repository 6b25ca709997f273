//! Handlers for `<xsl:variable>`, `<xsl:param>`, `<xsl:with-param>` and `<xsl:sort>`.

use super::xsl_children;
use crate::ast::{Binding, SortKey};
use crate::compiler::{CompilerBuilder, required_attr, structure_error};
use crate::error::XsltError;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    /// A variable or parameter: either `select` or a content body, not both.
    pub(crate) fn handle_binding(&mut self, node: Node<'_, '_>) -> Result<Binding, XsltError> {
        let name = required_attr(node, "name")?.to_string();
        let select = self.optional_expression(node, "select")?;
        let body = self.compile_body(node)?;
        if select.is_some() && !body.is_empty() {
            return Err(structure_error(
                node,
                format!("'{}' has both a select attribute and content", name),
            ));
        }
        Ok(Binding { name, select, body })
    }

    pub(crate) fn handle_with_params(&mut self, node: Node<'_, '_>) -> Result<Vec<Binding>, XsltError> {
        xsl_children(node, "with-param")
            .map(|child| self.handle_binding(child))
            .collect()
    }

    pub(crate) fn handle_sort_keys(&mut self, node: Node<'_, '_>) -> Result<Vec<SortKey>, XsltError> {
        let mut keys = Vec::new();
        for child in xsl_children(node, "sort") {
            let select = match child.attribute("select") {
                Some(text) => self.expression(child, text)?,
                None => self.expression(child, ".")?,
            };
            let descending = match child.attribute("order") {
                None | Some("ascending") => false,
                Some("descending") => true,
                Some(other) => {
                    return Err(structure_error(child, format!("Invalid sort order '{}'", other)));
                }
            };
            let numeric = child.attribute("data-type") == Some("number");
            keys.push(SortKey {
                select,
                descending,
                numeric,
            });
        }
        Ok(keys)
    }
}
