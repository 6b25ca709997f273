pub(super) mod control_flow;
pub(super) mod stylesheet;
pub(super) mod variables;

use crate::ast::{Body, Instruction};
use crate::compiler::{CompilerBuilder, XSLT_NAMESPACE, is_xsl, required_attr, structure_error};
use crate::error::XsltError;
use crate::output::NamespaceDecl;
use roxmltree::Node;

// Instruction bodies, literal result elements and the simple content
// instructions. Handlers live in `impl CompilerBuilder` blocks.

impl CompilerBuilder<'_> {
    pub(crate) fn compile_body(&mut self, node: Node<'_, '_>) -> Result<Body, XsltError> {
        let children: Vec<_> = node.children().collect();
        self.compile_nodes(&children)
    }

    pub(crate) fn compile_nodes(&mut self, nodes: &[Node<'_, '_>]) -> Result<Body, XsltError> {
        let mut body = Vec::new();
        for node in nodes {
            if node.is_text() {
                let text = node.text().unwrap_or("");
                // Whitespace-only text in a stylesheet is not significant.
                if !text.trim().is_empty() {
                    body.push(Instruction::Text(text.to_string()));
                }
            } else if node.is_element() {
                body.push(self.compile_element(*node)?);
            }
        }
        Ok(body)
    }

    fn compile_element(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        if node.tag_name().namespace() != Some(XSLT_NAMESPACE) {
            return self.handle_literal_result_element(node);
        }

        match node.tag_name().name() {
            "text" => Ok(Instruction::Text(
                node.children().filter_map(|n| n.text()).collect(),
            )),
            "value-of" => Ok(Instruction::ValueOf {
                select: self.required_expression(node, "select")?,
            }),
            "copy-of" => Ok(Instruction::CopyOf {
                select: self.required_expression(node, "select")?,
            }),
            "apply-templates" => self.handle_apply_templates(node),
            "call-template" => self.handle_call_template(node),
            "for-each" => self.handle_for_each(node),
            "if" => self.handle_if(node),
            "choose" => self.handle_choose(node),
            "variable" => Ok(Instruction::Variable(self.handle_binding(node)?)),
            "element" => Ok(Instruction::Element {
                name: self.avt(node, required_attr(node, "name")?)?,
                body: self.compile_body(node)?,
            }),
            "attribute" => Ok(Instruction::Attribute {
                name: self.avt(node, required_attr(node, "name")?)?,
                body: self.compile_body(node)?,
            }),
            "comment" => Ok(Instruction::Comment {
                body: self.compile_body(node)?,
            }),
            "param" | "with-param" | "sort" | "when" | "otherwise" => Err(structure_error(
                node,
                format!("<xsl:{}> is not allowed here", node.tag_name().name()),
            )),
            other => Err(structure_error(
                node,
                format!("Unsupported XSLT instruction <xsl:{}>", other),
            )),
        }
    }

    fn handle_literal_result_element(&mut self, node: Node<'_, '_>) -> Result<Instruction, XsltError> {
        let own_namespace = node.tag_name().namespace();
        let name = qualified_name(node, own_namespace, node.tag_name().name());

        let mut namespaces = Vec::new();
        for ns in node.namespaces() {
            if ns.name() == Some("xml") {
                continue;
            }
            let is_own = Some(ns.uri()) == own_namespace && ns.name() == node.lookup_prefix(ns.uri());
            if !is_own && self.excluded_namespaces.contains(ns.uri()) {
                continue;
            }
            namespaces.push(NamespaceDecl::new(ns.name(), ns.uri()));
        }

        let mut attributes = Vec::new();
        for attr in node.attributes() {
            if attr.namespace() == Some(XSLT_NAMESPACE) {
                continue;
            }
            let attr_name = qualified_name(node, attr.namespace(), attr.name());
            attributes.push((attr_name, self.avt(node, attr.value())?));
        }

        Ok(Instruction::LiteralElement {
            name,
            namespaces,
            attributes,
            body: self.compile_body(node)?,
        })
    }
}

/// `prefix:local` using the prefix the stylesheet declares for `namespace`.
fn qualified_name(node: Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    match namespace.and_then(|ns| node.lookup_prefix(ns)) {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

pub(crate) fn xsl_children<'a, 'i>(
    node: Node<'a, 'i>,
    local: &'static str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| is_xsl(*n, local))
}
