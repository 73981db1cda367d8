//! MARCXML output.

use super::mapping::to_marc;
use super::{OutputDocument, OutputFormat, RecordSerializer};
use crate::error::Result;
use crate::marc::xml::write_collection;
use crate::types::AuthorityRecord;

/// A single `<collection>` document with one `<record>` per authority.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcXmlSerializer;

impl RecordSerializer for MarcXmlSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::MarcXml
    }

    fn serialize(&self, records: &[AuthorityRecord]) -> Result<OutputDocument> {
        let marc_records = records.iter().map(to_marc).collect::<Result<Vec<_>>>()?;
        Ok(OutputDocument {
            format: OutputFormat::MarcXml,
            record_count: records.len(),
            bytes: write_collection(&marc_records)?,
        })
    }
}
