//! ISO 2709 output.

use super::mapping::to_marc;
use super::{OutputDocument, OutputFormat, RecordSerializer};
use crate::error::Result;
use crate::marc::binary::encode_record;
use crate::types::AuthorityRecord;

/// Concatenated binary MARC records.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcSerializer;

impl RecordSerializer for MarcSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Marc
    }

    fn serialize(&self, records: &[AuthorityRecord]) -> Result<OutputDocument> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&encode_record(&to_marc(record)?)?);
        }
        Ok(OutputDocument {
            format: OutputFormat::Marc,
            record_count: records.len(),
            bytes,
        })
    }
}
