use folio_dom::DomError;
use folio_xpath1::XPathError;
use thiserror::Error;

/// Failures that abort compilation or the whole transformation.
///
/// Recoverable conditions (missing attributes, bad values, unresolved
/// references) are reported through the log facade and skipped instead of
/// surfacing here.
#[derive(Error, Debug)]
pub enum XsltError {
    #[error("XML error: {0}")]
    Dom(#[from] DomError),

    #[error("XPath error: {0}")]
    XPath(#[from] XPathError),

    #[error("stylesheet compilation error: {0}")]
    Compile(String),

    #[error("pattern parse error in '{0}': {1}")]
    PatternParse(String, String),

    #[error("unsupported output method '{0}'")]
    UnsupportedOutputMethod(String),
}
