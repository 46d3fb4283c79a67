//! XSLT 1.0 transformation engine.
//!
//! The member crates carry the machinery: `folio-dom` owns the document
//! trees, `folio-xpath1` evaluates expressions, and `folio-xslt` compiles
//! stylesheets and runs the transformation. This crate re-exports them and
//! adds [`Processor`], a convenience for callers holding strings.

pub use folio_dom as dom;
pub use folio_xpath1 as xpath1;
pub use folio_xslt as xslt;

pub use folio_dom::Document;
pub use folio_xslt::{CompiledStylesheet, OutputMethod, XsltError, apply_stylesheet, compile};

/// A compiled stylesheet ready to transform documents.
///
/// ```
/// use folio::Processor;
///
/// let processor = Processor::from_stylesheet_str(
///     r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
///          <xsl:template match="/"><hi><xsl:value-of select="r"/></hi></xsl:template>
///        </xsl:stylesheet>"#,
/// ).unwrap();
/// assert_eq!(processor.transform_str("<r>there</r>").unwrap(), "<hi>there</hi>");
/// ```
pub struct Processor {
    style: CompiledStylesheet,
}

impl Processor {
    pub fn from_stylesheet_str(stylesheet: &str) -> Result<Processor, XsltError> {
        let doc = Document::parse(stylesheet).map_err(XsltError::from)?;
        Ok(Processor { style: compile(&doc)? })
    }

    pub fn style(&self) -> &CompiledStylesheet {
        &self.style
    }

    /// Applies the stylesheet to an already parsed document. The source is
    /// mutated by whitespace stripping.
    pub fn transform_document(&self, source: &mut Document) -> Result<Document, XsltError> {
        apply_stylesheet(&self.style, source)
    }

    /// Parses, transforms, and renders in one go, honouring the output
    /// method: `text` yields the result's text content, `xml` and `html`
    /// serialize the tree.
    pub fn transform_str(&self, source: &str) -> Result<String, XsltError> {
        let mut doc = Document::parse(source).map_err(XsltError::from)?;
        let result = self.transform_document(&mut doc)?;
        match OutputMethod::resolve(&self.style.output)? {
            OutputMethod::Text => Ok(result.string_value(result.root())),
            OutputMethod::Xml | OutputMethod::Html => Ok(result.to_xml_string()?),
        }
    }
}
