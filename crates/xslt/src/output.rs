//! Defines the `OutputBuilder` trait, which decouples the executor from
//! how the result tree is materialized.
//!
//! [`TextSerializer`] writes XML text directly; [`TextCollector`] keeps only
//! character data and backs variable, attribute and comment bodies.

use crate::ast::OutputSettings;
use quick_xml::escape::{escape, partial_escape};

/// A namespace declaration to emit on an element, `None` being the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

impl NamespaceDecl {
    pub fn new(prefix: Option<&str>, uri: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        }
    }
}

/// The semantic actions of building a result tree.
pub trait OutputBuilder {
    fn start_element(&mut self, name: &str, namespaces: &[NamespaceDecl]);
    fn end_element(&mut self);

    /// Adds an attribute to the currently open element. Ignored once the
    /// element has content.
    fn attribute(&mut self, name: &str, value: &str);

    fn text(&mut self, text: &str);
    fn comment(&mut self, text: &str);
}

struct PendingTag {
    name: String,
    attributes: Vec<(String, String)>,
    namespaces: Vec<NamespaceDecl>,
}

/// Serializes the result tree as XML text.
///
/// The start tag of an element is held back until its first child so that
/// attributes may still be added, and so that an element without content
/// can be written as `<name />`.
pub struct TextSerializer {
    out: String,
    text_only: bool,
    pending: Option<PendingTag>,
    open: Vec<String>,
    /// In-scope declarations, one frame per open element.
    scopes: Vec<Vec<NamespaceDecl>>,
}

impl TextSerializer {
    pub const XML_DECLARATION: &'static str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

    pub fn new(settings: &OutputSettings) -> Self {
        let text_only = settings.method.as_deref() == Some("text");
        let mut out = String::new();
        if !text_only && !settings.omit_xml_declaration {
            out.push_str(Self::XML_DECLARATION);
        }
        Self {
            out,
            text_only,
            pending: None,
            open: Vec::new(),
            scopes: Vec::new(),
        }
    }

    fn in_scope(&self, decl: &NamespaceDecl) -> bool {
        for frame in self.scopes.iter().rev() {
            if let Some(found) = frame.iter().find(|d| d.prefix == decl.prefix) {
                return found.uri == decl.uri;
            }
        }
        // The default namespace starts out empty.
        decl.prefix.is_none() && decl.uri.is_empty()
    }

    fn flush_start_tag(&mut self, self_closing: bool) {
        let Some(tag) = self.pending.take() else {
            return;
        };

        let mut declared = Vec::new();
        for decl in tag.namespaces {
            if !self.in_scope(&decl) && !declared.contains(&decl) {
                declared.push(decl);
            }
        }

        self.out.push('<');
        self.out.push_str(&tag.name);
        for decl in &declared {
            match &decl.prefix {
                Some(prefix) => {
                    self.out.push_str(" xmlns:");
                    self.out.push_str(prefix);
                }
                None => self.out.push_str(" xmlns"),
            }
            self.out.push_str("=\"");
            self.out.push_str(&escape(decl.uri.as_str()));
            self.out.push('"');
        }
        for (name, value) in &tag.attributes {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value.as_str()));
            self.out.push('"');
        }

        if self_closing {
            self.out.push_str(" />");
        } else {
            self.out.push('>');
            self.open.push(tag.name);
            self.scopes.push(declared);
        }
    }

    pub fn finish(mut self) -> String {
        self.flush_start_tag(true);
        while let Some(name) = self.open.pop() {
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }
        self.out
    }
}

impl OutputBuilder for TextSerializer {
    fn start_element(&mut self, name: &str, namespaces: &[NamespaceDecl]) {
        if self.text_only {
            return;
        }
        self.flush_start_tag(false);
        self.pending = Some(PendingTag {
            name: name.to_string(),
            attributes: Vec::new(),
            namespaces: namespaces.to_vec(),
        });
    }

    fn end_element(&mut self) {
        if self.text_only {
            return;
        }
        if self.pending.is_some() {
            self.flush_start_tag(true);
            return;
        }
        if let Some(name) = self.open.pop() {
            self.scopes.pop();
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }
    }

    fn attribute(&mut self, name: &str, value: &str) {
        match &mut self.pending {
            Some(tag) => {
                if let Some(existing) = tag.attributes.iter_mut().find(|(n, _)| n == name) {
                    existing.1 = value.to_string();
                } else {
                    tag.attributes.push((name.to_string(), value.to_string()));
                }
            }
            None => log::debug!("Dropping attribute '{}' added after element content", name),
        }
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.text_only {
            self.out.push_str(text);
            return;
        }
        self.flush_start_tag(false);
        self.out.push_str(&partial_escape(text));
    }

    fn comment(&mut self, text: &str) {
        if self.text_only {
            return;
        }
        self.flush_start_tag(false);
        self.out.push_str("<!--");
        // "--" is not allowed inside a comment.
        self.out.push_str(&text.replace("--", "- -"));
        self.out.push_str("-->");
    }
}

/// Collects the character data written to it and ignores structure.
#[derive(Default)]
pub struct TextCollector {
    text: String,
}

impl TextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.text
    }
}

impl OutputBuilder for TextCollector {
    fn start_element(&mut self, _name: &str, _namespaces: &[NamespaceDecl]) {}
    fn end_element(&mut self) {}
    fn attribute(&mut self, _name: &str, _value: &str) {}
    fn text(&mut self, text: &str) {
        self.text.push_str(text);
    }
    fn comment(&mut self, _text: &str) {}
}
