//! MARCXML (MARC 21 slim) writing and reading.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};

use super::binary::leader_for;
use super::record::{Field, MarcRecord, Subfield};
use crate::error::{HarvesterError, Result};

/// MARC 21 slim namespace.
pub const MARCXML_NAMESPACE: &str = "http://www.loc.gov/MARC21/slim";

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.loc.gov/MARC21/slim http://www.loc.gov/standards/marcxml/schema/MARC21slim.xsd";

/// Write records as one `<collection>` document.
pub fn write_collection(records: &[MarcRecord]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("collection").with_attributes([
        ("xmlns", MARCXML_NAMESPACE),
        ("xmlns:xsi", XSI_NAMESPACE),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
    ])))?;

    for record in records {
        write_record(&mut writer, record)?;
    }

    writer.write_event(Event::End(BytesEnd::new("collection")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    text: &str,
) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_record(writer: &mut Writer<Vec<u8>>, record: &MarcRecord) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("record")))?;
    write_text_element(writer, BytesStart::new("leader"), &leader_for(record)?)?;

    for field in &record.fields {
        match field {
            Field::Control { tag, value } => {
                let start = BytesStart::new("controlfield").with_attributes([("tag", tag.as_str())]);
                write_text_element(writer, start, value)?;
            }
            Field::Data {
                tag,
                ind1,
                ind2,
                subfields,
            } => {
                let (ind1, ind2) = (ind1.to_string(), ind2.to_string());
                writer.write_event(Event::Start(BytesStart::new("datafield").with_attributes([
                    ("tag", tag.as_str()),
                    ("ind1", ind1.as_str()),
                    ("ind2", ind2.as_str()),
                ])))?;
                for subfield in subfields {
                    let code = subfield.code.to_string();
                    let start =
                        BytesStart::new("subfield").with_attributes([("code", code.as_str())]);
                    write_text_element(writer, start, &subfield.value)?;
                }
                writer.write_event(Event::End(BytesEnd::new("datafield")))?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("record")))?;
    Ok(())
}

fn first_char(value: Option<&str>) -> char {
    value.and_then(|v| v.chars().next()).unwrap_or(' ')
}

/// Read a `<record>` element, ignoring its namespace and unknown children.
pub fn parse_record(node: Node<'_, '_>) -> MarcRecord {
    let mut record = MarcRecord::new();

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "leader" => {
                let leader = child.text().unwrap_or_default();
                if leader.len() == record.leader.len() && leader.is_ascii() {
                    record.leader = leader.to_string();
                }
            }
            "controlfield" => {
                let tag = child.attribute("tag").unwrap_or_default();
                record.push(Field::control(tag, child.text().unwrap_or_default()));
            }
            "datafield" => {
                let subfields = child
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "subfield")
                    .map(|n| {
                        Subfield::new(
                            first_char(n.attribute("code")),
                            n.text().unwrap_or_default(),
                        )
                    })
                    .collect();
                record.push(Field::data(
                    child.attribute("tag").unwrap_or_default(),
                    first_char(child.attribute("ind1")),
                    first_char(child.attribute("ind2")),
                    subfields,
                ));
            }
            _ => {}
        }
    }

    record
}

fn is_record(node: &Node<'_, '_>) -> bool {
    node.is_element() && node.tag_name().name() == "record"
}

/// Parse the first `<record>` in a MARCXML document (bare record or collection).
pub fn parse_record_str(xml: &str) -> Result<MarcRecord> {
    let doc = Document::parse(xml)?;
    doc.descendants()
        .find(is_record)
        .map(parse_record)
        .ok_or_else(|| HarvesterError::InvalidMarc("no <record> element".to_string()))
}

/// Parse every `<record>` of a MARCXML document.
pub fn parse_collection(xml: &str) -> Result<Vec<MarcRecord>> {
    let doc = Document::parse(xml)?;
    Ok(doc.descendants().filter(is_record).map(parse_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> MarcRecord {
        let mut record = MarcRecord::new();
        record.push(Field::control("001", "thesauri:_a1b2"));
        record.push(Field::data(
            "150",
            ' ',
            ' ',
            vec![Subfield::new('a', "Gefäße & <Keramik>"), Subfield::new('l', "de")],
        ));
        record
    }

    #[test]
    fn test_write_collection_structure() {
        let xml = String::from_utf8(write_collection(&[sample()]).unwrap()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<collection xmlns=\"http://www.loc.gov/MARC21/slim\""));
        assert!(xml.contains("<controlfield tag=\"001\">thesauri:_a1b2</controlfield>"));
        assert!(xml.contains("<datafield tag=\"150\" ind1=\" \" ind2=\" \">"));
        assert!(xml.contains("Gefäße &amp; &lt;Keramik&gt;"));
        assert!(xml.trim_end().ends_with("</collection>"));
    }

    #[test]
    fn test_written_collection_parses_back() {
        let record = sample();
        let xml = String::from_utf8(write_collection(&[record.clone(), record.clone()]).unwrap())
            .unwrap();
        let parsed = parse_collection(&xml).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].fields, record.fields);
        assert_eq!(parsed[0].leader, leader_for(&record).unwrap());
    }

    #[test]
    fn test_parse_bare_record_with_prefix() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<marcxml:record xmlns:marcxml="http://www.loc.gov/MARC21/slim">
  <marcxml:leader>00594cz  a2200181n  4500</marcxml:leader>
  <marcxml:controlfield tag="001">n79021164</marcxml:controlfield>
  <marcxml:controlfield tag="005">20240105102211.0</marcxml:controlfield>
  <marcxml:datafield tag="100" ind1="1" ind2=" ">
    <marcxml:subfield code="a">Twain, Mark,</marcxml:subfield>
    <marcxml:subfield code="d">1835-1910</marcxml:subfield>
  </marcxml:datafield>
  <marcxml:unknown>ignored</marcxml:unknown>
</marcxml:record>"#;

        let record = parse_record_str(xml).unwrap();
        assert_eq!(record.leader, "00594cz  a2200181n  4500");
        assert_eq!(record.control_value("001"), Some("n79021164"));
        assert_eq!(record.fields.len(), 3);
        let heading = record.heading().unwrap();
        assert_eq!(heading.subfield('a'), Some("Twain, Mark,"));
        assert!(matches!(heading, Field::Data { ind1: '1', ind2: ' ', .. }));
    }

    #[test]
    fn test_parse_record_str_without_record() {
        assert!(parse_record_str("<collection/>").is_err());
    }
}
