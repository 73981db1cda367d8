//! MARC 21 record model with ISO 2709 and MARCXML codecs.

pub mod binary;
mod record;
pub mod xml;

pub use record::{is_control_tag, is_forbidden_char, Field, MarcRecord, Subfield, AUTHORITY_LEADER};
