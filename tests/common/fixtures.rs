/// Metadata document used by most tests.
pub const SAMPLE_METADATA: &str = "<meta><title>Sample</title></meta>";

/// Renders a body with a localized label, a title looked up through the
/// extension namespace and the document title.
pub const SAMPLE_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:esri="http://www.esri.com/metadata/"
    xmlns:res="http://www.esri.com/metadata/res/"
    exclude-result-prefixes="esri res">
  <xsl:output method="xml" indent="no"/>
  <xsl:template match="/">
    <html>
      <head><title><xsl:value-of select="esri:GetString('docTitle')"/></title></head>
      <body><res:idTitle/>: <xsl:value-of select="/meta/title"/></body>
    </html>
  </xsl:template>
</xsl:stylesheet>"#;

/// Same shape as `SAMPLE_STYLESHEET`, plus a thumbnail style rule and a
/// placeholder whose key is never defined.
pub const STYLED_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:res="http://www.esri.com/metadata/res/"
    exclude-result-prefixes="res">
  <xsl:template match="/">
    <html>
      <head><style><xsl:text>.noThumbnail {color:gray;}</xsl:text></style></head>
      <body><p><res:idTitle/></p><p><res:idUnknown/></p></body>
    </html>
  </xsl:template>
</xsl:stylesheet>"#;

/// Fails while transforming because `urn:unbound` has no provider.
pub const UNBOUND_EXTENSION_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:x="urn:unbound">
  <xsl:template match="/"><p><xsl:value-of select="x:lookup('k')"/></p></xsl:template>
</xsl:stylesheet>"#;

/// Imported by `MAIN_WITH_IMPORT`; supplies the rule for `title`.
pub const COMMON_MODULE: &str = r#"<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="title"><h1><xsl:value-of select="."/></h1></xsl:template>
  <xsl:template match="abstract"><p>imported</p></xsl:template>
</xsl:stylesheet>"#;

pub const MAIN_WITH_IMPORT: &str = r#"<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:import href="common.xsl"/>
  <xsl:output omit-xml-declaration="yes"/>
  <xsl:template match="/"><div><xsl:apply-templates select="meta/*"/></div></xsl:template>
  <xsl:template match="abstract"><p><xsl:value-of select="."/></p></xsl:template>
</xsl:stylesheet>"#;

/// Resource strings for the fixtures above.
pub fn sample_strings() -> Vec<(&'static str, &'static str)> {
    vec![("idTitle", "Title"), ("docTitle", "Metadata")]
}
