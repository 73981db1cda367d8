//! Rendering of authority records into output documents.
//!
//! Both formats share the field mapping in [`mapping`]; they differ only in
//! how the resulting MARC records are framed.

pub mod mapping;
mod marc;
mod marcxml;

use std::fmt;

pub use marc::MarcSerializer;
pub use marcxml::MarcXmlSerializer;

use crate::error::Result;
use crate::types::AuthorityRecord;

/// Output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// ISO 2709 binary records.
    Marc,

    /// MARC 21 slim XML.
    MarcXml,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Marc => "marc",
            Self::MarcXml => "marcxml",
        }
    }

    /// File extension, including the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Marc => ".mrc",
            Self::MarcXml => ".marcxml",
        }
    }

    /// The serializer for this format.
    #[must_use]
    pub fn serializer(&self) -> Box<dyn RecordSerializer> {
        match self {
            Self::Marc => Box::new(MarcSerializer),
            Self::MarcXml => Box::new(MarcXmlSerializer),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered document, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub format: OutputFormat,
    pub record_count: usize,
    pub bytes: Vec<u8>,
}

/// Renders an ordered record sequence into one document.
///
/// Output must be deterministic: the same records in the same order always
/// produce the same bytes.
pub trait RecordSerializer {
    fn format(&self) -> OutputFormat;

    /// Render all records; fails on the first record without a field mapping.
    fn serialize(&self, records: &[AuthorityRecord]) -> Result<OutputDocument>;
}
