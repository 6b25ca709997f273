//! The compiled, owned form of a stylesheet.

use crate::expression::Expr;
use crate::output::NamespaceDecl;
use crate::pattern::Pattern;
use std::collections::BTreeSet;

/// A sequence of instructions, executed in order.
pub type Body = Vec<Instruction>;

/// A whole stylesheet after imports and includes have been merged.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    pub templates: Vec<TemplateRule>,
    pub globals: Vec<Binding>,
    pub output: OutputSettings,
    /// Namespace URIs of every prefixed function call in the program.
    pub extension_namespaces: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSettings {
    pub omit_xml_declaration: bool,
    pub method: Option<String>,
}

/// An `xsl:template`, carrying the data needed for conflict resolution.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    pub pattern: Option<Pattern>,
    pub name: Option<String>,
    pub mode: Option<String>,
    /// Explicit `priority` attribute; overrides the pattern's default.
    pub priority: Option<f64>,
    /// Import precedence. Higher wins. Imported modules get lower values.
    pub precedence: usize,
    /// Declaration order across the whole program. Later wins ties.
    pub order: usize,
    pub params: Vec<Binding>,
    pub body: Body,
}

/// A variable, parameter or `xsl:with-param`.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub select: Option<Expr>,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub select: Expr,
    pub descending: bool,
    pub numeric: bool,
}

/// An attribute value template such as `id="{@name}-row"`.
#[derive(Debug, Clone, Default)]
pub struct AttributeValueTemplate(pub Vec<AvtPart>);

#[derive(Debug, Clone)]
pub enum AvtPart {
    Static(String),
    Dynamic(Expr),
}

#[derive(Debug, Clone)]
pub struct When {
    pub test: Expr,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Text(String),
    ValueOf {
        select: Expr,
    },
    CopyOf {
        select: Expr,
    },
    ApplyTemplates {
        select: Option<Expr>,
        mode: Option<String>,
        sort_keys: Vec<SortKey>,
        params: Vec<Binding>,
    },
    CallTemplate {
        name: String,
        params: Vec<Binding>,
    },
    ForEach {
        select: Expr,
        sort_keys: Vec<SortKey>,
        body: Body,
    },
    If {
        test: Expr,
        body: Body,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<Body>,
    },
    Variable(Binding),
    LiteralElement {
        name: String,
        namespaces: Vec<NamespaceDecl>,
        attributes: Vec<(String, AttributeValueTemplate)>,
        body: Body,
    },
    Element {
        name: AttributeValueTemplate,
        body: Body,
    },
    Attribute {
        name: AttributeValueTemplate,
        body: Body,
    },
    Comment {
        body: Body,
    },
}
