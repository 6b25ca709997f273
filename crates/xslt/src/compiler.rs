//! Compiles stylesheet source into a `CompiledProgram`.
//!
//! Each module (the main stylesheet, every import and include) is parsed
//! with roxmltree and lowered to owned AST immediately, so no parsed
//! document outlives its own compilation step.

use crate::ast::{AttributeValueTemplate, Binding, CompiledProgram, TemplateRule};
use crate::error::{Location, XsltError};
use crate::expression::{self, Expr};
use crate::pattern::Pattern;
use metadoc_template_core::{ImportResolver, TemplateError};
use roxmltree::{Node, ParsingOptions};
use std::collections::BTreeSet;
use std::path::Path;

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Imports and includes nested deeper than this are rejected.
const MAX_MODULE_DEPTH: usize = 32;

pub(crate) fn location(node: Node<'_, '_>) -> Location {
    node.document().text_pos_at(node.range().start).into()
}

pub(crate) fn structure_error(node: Node<'_, '_>, message: impl Into<String>) -> XsltError {
    XsltError::TemplateStructure {
        message: message.into(),
        location: location(node),
    }
}

pub(crate) fn is_xsl(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(XSLT_NAMESPACE)
        && node.tag_name().name() == local
}

pub(crate) fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, XsltError> {
    node.attribute(name).ok_or_else(|| {
        structure_error(
            node,
            format!(
                "<xsl:{}> is missing required attribute '{}'",
                node.tag_name().name(),
                name
            ),
        )
    })
}

/// Declarations gathered from one module and its includes. They receive
/// the module's import precedence once all of its imports are compiled.
#[derive(Default)]
pub(crate) struct ModuleDecls {
    pub(crate) templates: Vec<TemplateRule>,
    pub(crate) globals: Vec<Binding>,
    pub(crate) omit_xml_declaration: Option<bool>,
    pub(crate) method: Option<String>,
}

pub(crate) struct CompilerBuilder<'r> {
    imports: &'r dyn ImportResolver,
    pub(crate) program: CompiledProgram,
    /// Global bindings with their precedence, before duplicates are resolved.
    globals: Vec<(Binding, usize)>,
    next_order: usize,
    next_precedence: usize,
    /// Identities of the modules currently being compiled.
    module_stack: Vec<String>,
    /// Namespace URIs not copied onto literal result elements in the current module.
    pub(crate) excluded_namespaces: BTreeSet<String>,
}

impl<'r> CompilerBuilder<'r> {
    pub fn new(imports: &'r dyn ImportResolver) -> Self {
        Self {
            imports,
            program: CompiledProgram::default(),
            globals: Vec::new(),
            next_order: 0,
            next_precedence: 0,
            module_stack: Vec::new(),
            excluded_namespaces: BTreeSet::new(),
        }
    }

    pub(crate) fn next_order(&mut self) -> usize {
        self.next_order += 1;
        self.next_order
    }

    /// Compiles a module and everything it imports; returns its precedence.
    pub fn compile_module(
        &mut self,
        source: &str,
        identity: &str,
        base: Option<&Path>,
    ) -> Result<usize, XsltError> {
        self.enter_module(identity)?;
        let result = self.compile_module_inner(source, base);
        self.module_stack.pop();
        result
    }

    fn compile_module_inner(
        &mut self,
        source: &str,
        base: Option<&Path>,
    ) -> Result<usize, XsltError> {
        let doc = parse_stylesheet_document(source)?;
        let mut decls = ModuleDecls::default();
        self.process_module_root(doc.root_element(), base, &mut decls)?;

        let precedence = self.next_precedence;
        self.next_precedence += 1;

        for mut template in decls.templates {
            template.precedence = precedence;
            self.program.templates.push(template);
        }
        for global in decls.globals {
            self.globals.push((global, precedence));
        }
        if let Some(omit) = decls.omit_xml_declaration {
            self.program.output.omit_xml_declaration = omit;
        }
        if decls.method.is_some() {
            self.program.output.method = decls.method;
        }
        Ok(precedence)
    }

    /// Processes the declarations of an included module into `decls`.
    pub(crate) fn include_module(
        &mut self,
        href: &str,
        base: Option<&Path>,
        decls: &mut ModuleDecls,
    ) -> Result<(), XsltError> {
        let resolved = self.imports.resolve(href, base).map_err(XsltError::Import)?;
        let identity = resolved.path.display().to_string();
        log::debug!("Including stylesheet module '{}'", identity);

        self.enter_module(&identity)?;
        let result = parse_stylesheet_document(&resolved.source).and_then(|doc| {
            self.process_module_root(doc.root_element(), resolved.path.parent(), decls)
        });
        self.module_stack.pop();
        result
    }

    pub(crate) fn import_module(&mut self, href: &str, base: Option<&Path>) -> Result<(), XsltError> {
        let resolved = self.imports.resolve(href, base).map_err(XsltError::Import)?;
        let identity = resolved.path.display().to_string();
        log::debug!("Importing stylesheet module '{}'", identity);
        self.compile_module(&resolved.source, &identity, resolved.path.parent())?;
        Ok(())
    }

    fn enter_module(&mut self, identity: &str) -> Result<(), XsltError> {
        if self.module_stack.iter().any(|m| m == identity) {
            return Err(XsltError::Import(TemplateError::Import {
                href: identity.to_string(),
                message: "circular import or include".to_string(),
            }));
        }
        if self.module_stack.len() >= MAX_MODULE_DEPTH {
            return Err(XsltError::Import(TemplateError::Import {
                href: identity.to_string(),
                message: format!("modules nested deeper than {}", MAX_MODULE_DEPTH),
            }));
        }
        self.module_stack.push(identity.to_string());
        Ok(())
    }

    /// Parses an XPath expression found on `node` and resolves its prefixes
    /// against the namespaces in scope there.
    pub(crate) fn expression(&mut self, node: Node<'_, '_>, text: &str) -> Result<Expr, XsltError> {
        let mut expr = expression::parse_expression(text)
            .map_err(|e| structure_error(node, e.to_string()))?;
        let lookup = |prefix: &str| node.lookup_namespace_uri(Some(prefix)).map(str::to_string);
        let namespaces = &mut self.program.extension_namespaces;
        expression::resolve_prefixes(&mut expr, &lookup, &mut |ns| {
            namespaces.insert(ns.to_string());
        })?;
        Ok(expr)
    }

    pub(crate) fn required_expression(
        &mut self,
        node: Node<'_, '_>,
        attr: &str,
    ) -> Result<Expr, XsltError> {
        let text = required_attr(node, attr)?;
        self.expression(node, text)
    }

    pub(crate) fn optional_expression(
        &mut self,
        node: Node<'_, '_>,
        attr: &str,
    ) -> Result<Option<Expr>, XsltError> {
        match node.attribute(attr) {
            Some(text) => self.expression(node, text).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn pattern(&mut self, node: Node<'_, '_>, text: &str) -> Result<Pattern, XsltError> {
        let mut pattern = Pattern::parse(text).map_err(|e| structure_error(node, e.to_string()))?;
        let lookup = |prefix: &str| node.lookup_namespace_uri(Some(prefix)).map(str::to_string);
        let namespaces = &mut self.program.extension_namespaces;
        pattern.resolve_prefixes(&lookup, &mut |ns| {
            namespaces.insert(ns.to_string());
        })?;
        Ok(pattern)
    }

    /// Parses an attribute value template: `{expr}` parts are evaluated,
    /// `{{` and `}}` are literal braces.
    pub(crate) fn avt(
        &mut self,
        node: Node<'_, '_>,
        text: &str,
    ) -> Result<AttributeValueTemplate, XsltError> {
        use crate::ast::AvtPart;

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let start = i + 1;
                    let mut quote: Option<char> = None;
                    let mut end = None;
                    for (j, d) in chars.by_ref() {
                        match (quote, d) {
                            (Some(q), d) if d == q => quote = None,
                            (Some(_), _) => {}
                            (None, '\'' | '"') => quote = Some(d),
                            (None, '}') => {
                                end = Some(j);
                                break;
                            }
                            _ => {}
                        }
                    }
                    let end = end.ok_or_else(|| {
                        structure_error(node, format!("Unterminated '{{' in attribute value '{}'", text))
                    })?;
                    if !literal.is_empty() {
                        parts.push(AvtPart::Static(std::mem::take(&mut literal)));
                    }
                    parts.push(AvtPart::Dynamic(self.expression(node, &text[start..end])?));
                }
                '}' => {
                    return Err(structure_error(
                        node,
                        format!("Unmatched '}}' in attribute value '{}'", text),
                    ));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Static(literal));
        }
        Ok(AttributeValueTemplate(parts))
    }

    /// Resolves duplicate global names in favor of the highest precedence.
    pub fn finish(mut self) -> CompiledProgram {
        let globals = std::mem::take(&mut self.globals);
        let winners: Vec<Binding> = globals
            .iter()
            .enumerate()
            .filter(|(i, (binding, precedence))| {
                !globals.iter().enumerate().any(|(j, (other, other_precedence))| {
                    j != *i
                        && other.name == binding.name
                        && (other_precedence > precedence || (other_precedence == precedence && j > *i))
                })
            })
            .map(|(_, (binding, _))| binding.clone())
            .collect();
        self.program.globals = winners;
        self.program
    }
}

fn parse_stylesheet_document(source: &str) -> Result<roxmltree::Document<'_>, XsltError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(roxmltree::Document::parse_with_options(source, options)?)
}

/// Compiles `source` and all of its imports into a program.
pub fn compile_program(
    source: &str,
    identity: &str,
    base: Option<&Path>,
    imports: &dyn ImportResolver,
) -> Result<CompiledProgram, XsltError> {
    let mut builder = CompilerBuilder::new(imports);
    builder.compile_module(source, identity, base)?;
    let program = builder.finish();
    log::debug!(
        "Compiled '{}': {} templates, {} globals, {} extension namespaces",
        identity,
        program.templates.len(),
        program.globals.len(),
        program.extension_namespaces.len()
    );
    Ok(program)
}
