//! Input document access for the evaluator.

mod xml;

pub use xml::{NodeKind, XmlDocument, XmlNode};
