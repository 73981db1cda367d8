//! In-memory MARC 21 record model shared by the binary and XML codecs.

/// Leader of a new authority record: status `n`, type `z`, UCS/Unicode,
/// encoding level `n`. Length and base address are filled in on encoding.
pub const AUTHORITY_LEADER: &str = "00000nz  a2200000n  4500";

/// A single subfield (`$a Rome`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

impl Subfield {
    pub fn new(code: char, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }
}

/// A variable field: control (`00X`) or data field with indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Control {
        tag: String,
        value: String,
    },
    Data {
        tag: String,
        ind1: char,
        ind2: char,
        subfields: Vec<Subfield>,
    },
}

impl Field {
    pub fn control(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Control {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub fn data(tag: impl Into<String>, ind1: char, ind2: char, subfields: Vec<Subfield>) -> Self {
        Self::Data {
            tag: tag.into(),
            ind1,
            ind2,
            subfields,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Control { tag, .. } | Self::Data { tag, .. } => tag,
        }
    }

    /// Values of all subfields with the given code, in order.
    pub fn subfield_values(&self, code: char) -> impl Iterator<Item = &str> {
        let subfields: &[Subfield] = match self {
            Self::Control { .. } => &[],
            Self::Data { subfields, .. } => subfields,
        };
        subfields
            .iter()
            .filter(move |s| s.code == code)
            .map(|s| s.value.as_str())
    }

    /// First subfield with the given code.
    #[must_use]
    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfield_values(code).next()
    }
}

/// Whether a tag denotes a control field (`001`..`009`).
#[must_use]
pub fn is_control_tag(tag: &str) -> bool {
    tag.len() == 3 && tag.starts_with("00")
}

/// C0 control characters other than TAB, LF and CR. They collide with the
/// ISO 2709 delimiters and are not allowed in XML 1.0 text.
#[must_use]
pub fn is_forbidden_char(c: char) -> bool {
    matches!(c, '\0'..='\x08' | '\x0b' | '\x0c' | '\x0e'..='\x1f')
}

/// A MARC record: leader plus ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarcRecord {
    pub leader: String,
    pub fields: Vec<Field>,
}

impl Default for MarcRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl MarcRecord {
    /// Empty authority record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            leader: AUTHORITY_LEADER.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Fields with the given tag, in record order.
    pub fn fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Field> {
        self.fields.iter().filter(move |f| f.tag() == tag)
    }

    /// Value of a control field.
    #[must_use]
    pub fn control_value(&self, tag: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            Field::Control { tag: t, value } if t == tag => Some(value.as_str()),
            _ => None,
        })
    }

    /// The first 1XX heading field.
    #[must_use]
    pub fn heading(&self) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| matches!(f, Field::Data { tag, .. } if tag.starts_with('1')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarcRecord {
        let mut record = MarcRecord::new();
        record.push(Field::control("001", "n79021164"));
        record.push(Field::data(
            "100",
            '1',
            ' ',
            vec![Subfield::new('a', "Twain, Mark,"), Subfield::new('d', "1835-1910")],
        ));
        record.push(Field::data("400", '1', ' ', vec![Subfield::new('a', "Clemens, Samuel")]));
        record.push(Field::data("400", '1', ' ', vec![Subfield::new('a', "Snodgrass, Quintus")]));
        record
    }

    #[test]
    fn test_leader_length() {
        assert_eq!(AUTHORITY_LEADER.len(), 24);
    }

    #[test]
    fn test_accessors() {
        let record = sample();
        assert_eq!(record.control_value("001"), Some("n79021164"));
        assert_eq!(record.heading().map(Field::tag), Some("100"));
        assert_eq!(record.fields_with_tag("400").count(), 2);
        assert_eq!(
            record.heading().and_then(|f| f.subfield('d')),
            Some("1835-1910")
        );
    }

    #[test]
    fn test_is_control_tag() {
        assert!(is_control_tag("001"));
        assert!(is_control_tag("008"));
        assert!(!is_control_tag("010"));
        assert!(!is_control_tag("100"));
    }
}
