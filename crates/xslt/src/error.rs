use metadoc_template_core::TemplateError;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<roxmltree::TextPos> for Location {
    fn from(pos: roxmltree::TextPos) -> Self {
        Location {
            line: pos.row,
            col: pos.col,
        }
    }
}

#[derive(Error, Debug)]
pub enum XsltError {
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("XPath parse error in '{0}': {1}")]
    XPathParse(String, String),

    #[error("Template compilation error: {0}")]
    Compilation(String),

    #[error("Template structure error at {location}: {message}")]
    TemplateStructure { message: String, location: Location },

    #[error("Template execution error: {0}")]
    Execution(String),

    #[error("Extension call failed: {0}")]
    Extension(String),

    #[error(transparent)]
    Import(TemplateError),
}

impl XsltError {
    /// Converts a compile-time failure into the pipeline's load error.
    pub fn into_load_error(self, locator: &str) -> TemplateError {
        match self {
            XsltError::Import(inner) => inner,
            other => TemplateError::StylesheetLoad {
                locator: locator.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<XsltError> for TemplateError {
    fn from(err: XsltError) -> Self {
        match err {
            XsltError::Import(inner) => inner,
            other => TemplateError::TransformExecution(other.to_string()),
        }
    }
}
