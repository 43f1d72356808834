//! Decoded CryXmlB document structure

use indexmap::IndexMap;

/// One element of a decoded CryXmlB tree.
///
/// Attribute order is preserved as written in the binary tables; keys are
/// unique within an element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Tag name
    pub tag: String,
    /// Attribute key/value pairs in table order
    pub attributes: IndexMap<String, String>,
    /// Child elements in child-table order
    pub children: Vec<XmlElement>,
    /// Text content, when the node carries any
    pub text: Option<String>,
}

impl XmlElement {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Attribute value by key
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// First child with the given tag
    #[must_use]
    pub fn child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}
