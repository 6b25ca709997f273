use crate::ast::CompiledProgram;
use crate::compiler;
use crate::datasources::XmlDocument;
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::output::TextSerializer;
use metadoc_template_core::{
    CompiledStylesheet, ExtensionNamespaceBinding, ImportResolver, MetadataDocument,
    StylesheetCompiler, StylesheetLocator, TemplateError, TransformResult,
};
use std::sync::Arc;

/// A compiled XSLT program, shareable across threads and documents.
#[derive(Debug)]
pub struct XsltStylesheet {
    program: CompiledProgram,
    locator: StylesheetLocator,
}

impl XsltStylesheet {
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    fn run(
        &self,
        document: &MetadataDocument,
        binding: &ExtensionNamespaceBinding,
    ) -> Result<String, XsltError> {
        let doc = XmlDocument::parse(document.xml())?;
        let mut serializer = TextSerializer::new(&self.program.output);
        let mut executor = TemplateExecutor::new(&self.program, binding, doc.root());
        executor.run(&mut serializer)?;
        Ok(serializer.finish())
    }
}

impl CompiledStylesheet for XsltStylesheet {
    fn execute(
        &self,
        document: &MetadataDocument,
        binding: &ExtensionNamespaceBinding,
    ) -> Result<TransformResult, TemplateError> {
        for ns in &self.program.extension_namespaces {
            if !binding.is_bound(ns) {
                log::debug!(
                    "Stylesheet '{}' references unbound extension namespace '{}'",
                    self.locator,
                    ns
                );
            }
        }
        let text = self.run(document, binding)?;
        Ok(TransformResult::new(text))
    }

    fn locator(&self) -> &StylesheetLocator {
        &self.locator
    }

    fn extension_namespaces(&self) -> Vec<String> {
        self.program.extension_namespaces.iter().cloned().collect()
    }
}

/// An implementation of `StylesheetCompiler` for the supported XSLT 1.0 subset.
#[derive(Debug, Default, Clone, Copy)]
pub struct XsltCompiler;

impl XsltCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl StylesheetCompiler for XsltCompiler {
    fn compile(
        &self,
        source: &str,
        locator: &StylesheetLocator,
        imports: &dyn ImportResolver,
    ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
        let identity = locator.to_string();
        let program = compiler::compile_program(source, &identity, locator.base_dir(), imports)
            .map_err(|e| e.into_load_error(&identity))?;
        Ok(Arc::new(XsltStylesheet {
            program,
            locator: locator.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "xslt-subset"
    }
}
