//! ISO 2709 (MARC transmission format) encoding and decoding.

use super::record::{is_control_tag, is_forbidden_char, Field, MarcRecord, Subfield};
use crate::error::{HarvesterError, Result};

/// Marks the start of a subfield.
pub const SUBFIELD_DELIMITER: u8 = 0x1F;

/// Terminates the directory and every field.
pub const FIELD_TERMINATOR: u8 = 0x1E;

/// Terminates a record.
pub const RECORD_TERMINATOR: u8 = 0x1D;

const LEADER_LEN: usize = 24;
const DIRECTORY_ENTRY_LEN: usize = 12;
const MAX_RECORD_LEN: usize = 99_999;
const MAX_FIELD_LEN: usize = 9_999;

fn check_value(tag: &str, value: &str) -> Result<()> {
    match value.chars().find(|c| is_forbidden_char(*c)) {
        Some(c) => Err(HarvesterError::InvalidMarc(format!(
            "field {tag} contains control character U+{:04X}",
            u32::from(c)
        ))),
        None => Ok(()),
    }
}

fn encode_field(field: &Field) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match field {
        Field::Control { tag, value } => {
            check_value(tag, value)?;
            data.extend_from_slice(value.as_bytes());
        }
        Field::Data {
            tag,
            ind1,
            ind2,
            subfields,
        } => {
            let mut buf = [0u8; 4];
            for c in [*ind1, *ind2] {
                check_value(tag, c.encode_utf8(&mut buf))?;
                data.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            for subfield in subfields {
                check_value(tag, subfield.code.encode_utf8(&mut buf))?;
                check_value(tag, &subfield.value)?;
                data.push(SUBFIELD_DELIMITER);
                data.extend_from_slice(subfield.code.encode_utf8(&mut buf).as_bytes());
                data.extend_from_slice(subfield.value.as_bytes());
            }
        }
    }
    data.push(FIELD_TERMINATOR);
    Ok(data)
}

/// Leader with record length (00-04) and base address (12-16) set for
/// the given record.
pub fn leader_for(record: &MarcRecord) -> Result<String> {
    let mut field_bytes = 0;
    for field in &record.fields {
        field_bytes += encode_field(field)?.len();
    }
    let base_address = LEADER_LEN + DIRECTORY_ENTRY_LEN * record.fields.len() + 1;
    build_leader(&record.leader, base_address + field_bytes + 1, base_address)
}

fn build_leader(template: &str, record_len: usize, base_address: usize) -> Result<String> {
    if record_len > MAX_RECORD_LEN {
        return Err(HarvesterError::InvalidMarc(format!(
            "record length {record_len} exceeds {MAX_RECORD_LEN} bytes"
        )));
    }
    if !template.is_ascii() || template.len() != LEADER_LEN {
        return Err(HarvesterError::InvalidMarc(format!(
            "leader must be {LEADER_LEN} ASCII characters: '{template}'"
        )));
    }
    Ok(format!(
        "{record_len:05}{}{base_address:05}{}",
        &template[5..12],
        &template[17..]
    ))
}

/// Encode one record.
pub fn encode_record(record: &MarcRecord) -> Result<Vec<u8>> {
    let mut directory = Vec::with_capacity(record.fields.len() * DIRECTORY_ENTRY_LEN + 1);
    let mut body = Vec::new();

    for field in &record.fields {
        let tag = field.tag();
        if tag.len() != 3 || !tag.is_ascii() {
            return Err(HarvesterError::InvalidMarc(format!("invalid tag '{tag}'")));
        }
        let data = encode_field(field)?;
        if data.len() > MAX_FIELD_LEN {
            return Err(HarvesterError::InvalidMarc(format!(
                "field {tag} is {} bytes, limit is {MAX_FIELD_LEN}",
                data.len()
            )));
        }
        directory.extend_from_slice(format!("{tag}{:04}{:05}", data.len(), body.len()).as_bytes());
        body.extend_from_slice(&data);
    }
    directory.push(FIELD_TERMINATOR);

    let base_address = LEADER_LEN + directory.len();
    let record_len = base_address + body.len() + 1;
    let leader = build_leader(&record.leader, record_len, base_address)?;

    let mut out = Vec::with_capacity(record_len);
    out.extend_from_slice(leader.as_bytes());
    out.extend_from_slice(&directory);
    out.extend_from_slice(&body);
    out.push(RECORD_TERMINATOR);
    Ok(out)
}

fn parse_number(bytes: &[u8], what: &str) -> Result<usize> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| HarvesterError::InvalidMarc(format!("invalid {what}")))
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| HarvesterError::InvalidMarc("field is not valid UTF-8".to_string()))
}

fn decode_field(tag: &str, data: &[u8]) -> Result<Field> {
    let data = data.strip_suffix(&[FIELD_TERMINATOR]).unwrap_or(data);

    if is_control_tag(tag) {
        return Ok(Field::control(tag, decode_text(data)?));
    }

    let mut parts = data.split(|b| *b == SUBFIELD_DELIMITER);
    let indicators = decode_text(parts.next().unwrap_or_default())?;
    let mut chars = indicators.chars();
    let ind1 = chars.next().unwrap_or(' ');
    let ind2 = chars.next().unwrap_or(' ');

    let mut subfields = Vec::new();
    for part in parts {
        let text = decode_text(part)?;
        let mut chars = text.chars();
        if let Some(code) = chars.next() {
            subfields.push(Subfield::new(code, chars.as_str()));
        }
    }

    Ok(Field::data(tag, ind1, ind2, subfields))
}

/// Decode one record from the start of `bytes`, returning it and the number
/// of bytes consumed.
pub fn decode_record(bytes: &[u8]) -> Result<(MarcRecord, usize)> {
    if bytes.len() < LEADER_LEN {
        return Err(HarvesterError::InvalidMarc("truncated leader".to_string()));
    }
    let record_len = parse_number(&bytes[0..5], "record length")?;
    let base_address = parse_number(&bytes[12..17], "base address")?;
    if record_len > bytes.len() || base_address > record_len || base_address <= LEADER_LEN {
        return Err(HarvesterError::InvalidMarc(format!(
            "record length {record_len} / base address {base_address} out of range"
        )));
    }

    let record_bytes = &bytes[..record_len];
    let leader = decode_text(&record_bytes[..LEADER_LEN])?;
    let directory = &record_bytes[LEADER_LEN..base_address - 1];
    if directory.len() % DIRECTORY_ENTRY_LEN != 0 {
        return Err(HarvesterError::InvalidMarc("malformed directory".to_string()));
    }

    let mut fields = Vec::with_capacity(directory.len() / DIRECTORY_ENTRY_LEN);
    for entry in directory.chunks(DIRECTORY_ENTRY_LEN) {
        let tag = decode_text(&entry[0..3])?;
        let len = parse_number(&entry[3..7], "field length")?;
        let start = base_address + parse_number(&entry[7..12], "field start")?;
        let data = record_bytes
            .get(start..start + len)
            .ok_or_else(|| HarvesterError::InvalidMarc(format!("field {tag} out of range")))?;
        fields.push(decode_field(&tag, data)?);
    }

    Ok((MarcRecord { leader, fields }, record_len))
}

/// Decode a stream of concatenated records.
pub fn decode(bytes: &[u8]) -> Result<Vec<MarcRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (record, consumed) = decode_record(&bytes[offset..])?;
        records.push(record);
        offset += consumed;
    }
    Ok(records)
}
