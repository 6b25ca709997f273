//! Final textual corrections applied to localized output.
//!
//! Both corrections are exact-substring edits and can be applied any number
//! of times with the same result.

pub const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
pub const XHTML_DOCTYPE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#;

const THUMBNAIL_RULE: &str = ".noThumbnail {";
const THUMBNAIL_FIX: &str = "display:inline-block;";

/// Applies every correction to `text`.
pub fn finalize(text: &str) -> String {
    let with_doctype = insert_doctype(text);
    patch_thumbnail_rule(&with_doctype)
}

/// Inserts the XHTML DOCTYPE after the XML prolog, unless a DOCTYPE already
/// follows it.
pub fn insert_doctype(text: &str) -> String {
    let Some(at) = text.find(XML_PROLOG) else {
        return text.to_string();
    };
    let after = at + XML_PROLOG.len();
    if text[after..].trim_start().starts_with("<!DOCTYPE") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + XHTML_DOCTYPE.len());
    out.push_str(&text[..after]);
    out.push_str(XHTML_DOCTYPE);
    out.push_str(&text[after..]);
    out
}

/// Makes `.noThumbnail` blocks render inline, once per occurrence.
pub fn patch_thumbnail_rule(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(THUMBNAIL_RULE) {
        let end = at + THUMBNAIL_RULE.len();
        out.push_str(&rest[..end]);
        rest = &rest[end..];
        if !rest.starts_with(THUMBNAIL_FIX) {
            out.push_str(THUMBNAIL_FIX);
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctype_follows_prolog() {
        let text = format!("{}<html/>", XML_PROLOG);
        assert_eq!(
            finalize(&text),
            format!("{}{}<html/>", XML_PROLOG, XHTML_DOCTYPE)
        );
    }

    #[test]
    fn test_existing_doctype_is_kept() {
        let text = format!("{}\n<!DOCTYPE html><html/>", XML_PROLOG);
        assert_eq!(finalize(&text), text);
    }

    #[test]
    fn test_no_prolog_no_doctype() {
        assert_eq!(finalize("<html/>"), "<html/>");
    }

    #[test]
    fn test_thumbnail_rule_patched() {
        let css = "<style>.noThumbnail {color:gray;} .other {x}</style>";
        assert_eq!(
            finalize(css),
            "<style>.noThumbnail {display:inline-block;color:gray;} .other {x}</style>"
        );
    }

    #[test]
    fn test_css_untouched_without_class() {
        let css = "<style>.thumbnail {color:gray;}</style>";
        assert_eq!(finalize(css), css);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let text = format!(
            "{}<html><style>.noThumbnail {{a}} .noThumbnail {{b}}</style></html>",
            XML_PROLOG
        );
        let once = finalize(&text);
        assert_eq!(finalize(&once), once);
        assert_eq!(once.matches(THUMBNAIL_FIX).count(), 2);
        assert_eq!(once.matches("<!DOCTYPE").count(), 1);
    }
}
