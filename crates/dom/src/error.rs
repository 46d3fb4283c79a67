use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomError {
    #[error("XML parsing error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("UTF-8 encoding error: {0}")]
    Utf8String(#[from] std::string::FromUtf8Error),

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),

    #[error("document ended with unclosed elements")]
    UnclosedElements,
}
