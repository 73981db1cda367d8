//! XML utility functions for navigating and extracting data from DOM trees.
//!
//! Every lookup is by local name, so callers do not care whether a registry
//! uses a default namespace or a prefix.

use roxmltree::Node;

/// The `xml:` namespace, bound implicitly in every document.
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// RDF syntax namespace.
pub const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use authority_harvester::xml::get_tag_name;
///
/// let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry/></feed>"#;
/// let doc = Document::parse(xml).unwrap();
/// let entry = doc.root_element().first_element_child().unwrap();
/// assert_eq!(get_tag_name(entry), "entry");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check if a node is an element with a specific local name.
pub fn has_tag(node: Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && get_tag_name(node) == tag
}

/// Find the first child element with the given tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use authority_harvester::xml::find_child;
///
/// let xml = r#"<entry><updated>2024-01-05</updated></entry>"#;
/// let doc = Document::parse(xml).unwrap();
/// let root = doc.root_element();
///
/// assert!(find_child(root, "updated").is_some());
/// assert!(find_child(root, "missing").is_none());
/// ```
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| has_tag(*child, tag))
}

/// Find all child elements with the given tag name.
pub fn find_children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| has_tag(*child, tag))
}

/// Get the text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Trimmed text of the first child with `tag`, if present and non-empty.
pub fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    find_child(node, tag)
        .map(get_text)
        .filter(|text| !text.is_empty())
}

/// The `xml:lang` of a node, if any.
pub fn get_lang<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attribute((XML_NAMESPACE, "lang"))
}

/// An `rdf:` attribute such as `rdf:about` or `rdf:resource`.
pub fn rdf_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((RDF_NAMESPACE, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn test_prefixed_and_default_namespaces() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                          xmlns:skos="http://www.w3.org/2004/02/skos/core#">
            <rdf:Description rdf:about="http://thesauri.dainst.org/_a1">
                <skos:prefLabel xml:lang="de"> Amphora </skos:prefLabel>
                <skos:broader rdf:resource="http://thesauri.dainst.org/_b2"/>
            </rdf:Description>
        </rdf:RDF>"#;
        let doc = Document::parse(xml).unwrap();
        let description = find_child(doc.root_element(), "Description").unwrap();

        assert_eq!(
            rdf_attribute(description, "about"),
            Some("http://thesauri.dainst.org/_a1")
        );
        let label = find_child(description, "prefLabel").unwrap();
        assert_eq!(get_lang(label), Some("de"));
        assert_eq!(get_text(label), "Amphora");
        assert_eq!(child_text(description, "prefLabel").as_deref(), Some("Amphora"));
        assert_eq!(child_text(description, "broader"), None);
        assert_eq!(find_children(description, "broader").count(), 1);
    }
}
