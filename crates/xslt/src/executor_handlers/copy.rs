use crate::datasources::{NodeKind, XmlNode};
use crate::error::XsltError;
use crate::eval::{Focus, Value};
use crate::executor::TemplateExecutor;
use crate::expression::Expr;
use crate::output::{NamespaceDecl, OutputBuilder};

pub(crate) fn handle_copy_of<'a, 'i>(
    executor: &mut TemplateExecutor<'_, 'a, 'i>,
    select: &Expr,
    focus: Focus<'a, 'i>,
    out: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    match executor.evaluate(select, focus)? {
        Value::NodeSet(nodes) => {
            for node in nodes {
                copy_node(node, out);
            }
        }
        other => out.text(&other.to_string_value()),
    }
    Ok(())
}

/// Deep-copies an input node into the result tree.
fn copy_node(node: XmlNode<'_, '_>, out: &mut dyn OutputBuilder) {
    match node.kind() {
        NodeKind::Root => {
            for child in node.children() {
                copy_node(child, out);
            }
        }
        NodeKind::Element => {
            let attributes = node.attributes();
            let mut namespaces = Vec::new();
            for n in std::iter::once(&node).chain(attributes.iter()) {
                if let Some(uri) = n.namespace() {
                    let decl = NamespaceDecl::new(n.prefix(), uri);
                    if decl.prefix.as_deref() != Some("xml") && !namespaces.contains(&decl) {
                        namespaces.push(decl);
                    }
                }
            }

            out.start_element(&node.qualified_name(), &namespaces);
            for attr in &attributes {
                out.attribute(&attr.qualified_name(), &attr.string_value());
            }
            for child in node.children() {
                copy_node(child, out);
            }
            out.end_element();
        }
        NodeKind::Attribute => out.attribute(&node.qualified_name(), &node.string_value()),
        NodeKind::Text => out.text(&node.string_value()),
        NodeKind::Comment => out.comment(&node.string_value()),
        NodeKind::ProcessingInstruction => {}
    }
}
