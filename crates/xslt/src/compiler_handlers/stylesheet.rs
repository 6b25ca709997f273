//! Handlers for the stylesheet root and its top-level declarations.

use crate::ast::TemplateRule;
use crate::compiler::{CompilerBuilder, ModuleDecls, XSLT_NAMESPACE, is_xsl, required_attr, structure_error};
use crate::error::XsltError;
use roxmltree::Node;
use std::collections::BTreeSet;
use std::path::Path;

impl CompilerBuilder<'_> {
    pub(crate) fn process_module_root(
        &mut self,
        root: Node<'_, '_>,
        base: Option<&Path>,
        decls: &mut ModuleDecls,
    ) -> Result<(), XsltError> {
        if !(is_xsl(root, "stylesheet") || is_xsl(root, "transform")) {
            return Err(structure_error(
                root,
                format!(
                    "Root element must be xsl:stylesheet or xsl:transform, found '{}'",
                    root.tag_name().name()
                ),
            ));
        }

        let excluded = excluded_namespaces(root);
        let saved = std::mem::replace(&mut self.excluded_namespaces, excluded);
        let result = self.process_declarations(root, base, decls);
        self.excluded_namespaces = saved;
        result
    }

    fn process_declarations(
        &mut self,
        root: Node<'_, '_>,
        base: Option<&Path>,
        decls: &mut ModuleDecls,
    ) -> Result<(), XsltError> {
        for child in root.children().filter(|n| n.is_element()) {
            if child.tag_name().namespace() != Some(XSLT_NAMESPACE) {
                // Top-level elements in other namespaces are user data.
                continue;
            }
            match child.tag_name().name() {
                "import" => self.import_module(required_attr(child, "href")?, base)?,
                "include" => self.include_module(required_attr(child, "href")?, base, decls)?,
                "template" => {
                    let template = self.handle_template(child)?;
                    decls.templates.push(template);
                }
                "variable" | "param" => {
                    let binding = self.handle_binding(child)?;
                    decls.globals.push(binding);
                }
                "output" => handle_output(child, decls),
                "strip-space" | "preserve-space" | "key" | "decimal-format"
                | "attribute-set" | "namespace-alias" => {
                    log::warn!(
                        "Ignoring unsupported declaration <xsl:{}>",
                        child.tag_name().name()
                    );
                }
                other => {
                    return Err(structure_error(
                        child,
                        format!("<xsl:{}> is not allowed at the top level", other),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn handle_template(&mut self, node: Node<'_, '_>) -> Result<TemplateRule, XsltError> {
        let name = node.attribute("name").map(str::to_string);
        let pattern = match node.attribute("match") {
            Some(text) => Some(self.pattern(node, text)?),
            None => None,
        };
        if pattern.is_none() && name.is_none() {
            return Err(structure_error(
                node,
                "<xsl:template> needs a 'match' or a 'name' attribute",
            ));
        }
        let priority = match node.attribute("priority") {
            Some(text) => Some(text.trim().parse::<f64>().map_err(|_| {
                structure_error(node, format!("Invalid template priority '{}'", text))
            })?),
            None => None,
        };

        // Parameters lead the body.
        let mut params = Vec::new();
        let mut rest = Vec::new();
        for child in node.children() {
            if is_xsl(child, "param") && rest.iter().all(|n: &Node<'_, '_>| !n.is_element()) {
                params.push(self.handle_binding(child)?);
            } else {
                rest.push(child);
            }
        }
        let body = self.compile_nodes(&rest)?;

        Ok(TemplateRule {
            pattern,
            name,
            mode: node.attribute("mode").map(str::to_string),
            priority,
            precedence: 0,
            order: self.next_order(),
            params,
            body,
        })
    }
}

fn handle_output(node: Node<'_, '_>, decls: &mut ModuleDecls) {
    if let Some(omit) = node.attribute("omit-xml-declaration") {
        decls.omit_xml_declaration = Some(omit == "yes");
    }
    if let Some(method) = node.attribute("method") {
        decls.method = Some(method.to_string());
    }
    if let Some(encoding) = node.attribute("encoding") {
        if !encoding.eq_ignore_ascii_case("utf-8") {
            log::warn!("Output encoding '{}' requested; output is always UTF-8", encoding);
        }
    }
}

/// Namespaces named by `exclude-result-prefixes` and
/// `extension-element-prefixes` on the stylesheet root.
fn excluded_namespaces(root: Node<'_, '_>) -> BTreeSet<String> {
    let mut excluded = BTreeSet::new();
    excluded.insert(XSLT_NAMESPACE.to_string());
    for attr in ["exclude-result-prefixes", "extension-element-prefixes"] {
        let Some(list) = root.attribute(attr) else {
            continue;
        };
        for prefix in list.split_whitespace() {
            if prefix == "#all" {
                excluded.extend(root.namespaces().map(|ns| ns.uri().to_string()));
                continue;
            }
            let lookup = if prefix == "#default" { None } else { Some(prefix) };
            match root.lookup_namespace_uri(lookup) {
                Some(uri) => {
                    excluded.insert(uri.to_string());
                }
                None => log::warn!("'{}' names undeclared prefix '{}'", attr, prefix),
            }
        }
    }
    excluded
}
