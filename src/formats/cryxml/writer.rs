//! XML text serialization for decoded CryXmlB documents

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::Result;
use super::document::XmlElement;

enum Step<'a> {
    Open(&'a XmlElement),
    Close(&'a str),
}

/// Serialize a decoded document to indented XML text.
///
/// Elements with neither text nor children are written self-closing. No
/// XML declaration is emitted; the output is the document body only.
///
/// # Errors
/// Returns an error if XML serialization fails.
pub fn to_xml_string(root: &XmlElement) -> Result<String> {
    let mut output = Vec::new();
    let mut writer = Writer::new_with_indent(&mut output, b' ', 2);

    // Iterative walk; document depth is attacker-controlled
    let mut work = vec![Step::Open(root)];
    while let Some(step) = work.pop() {
        match step {
            Step::Open(element) => {
                let mut start = BytesStart::new(element.tag.as_str());
                for (key, value) in &element.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }

                if element.children.is_empty() && element.text.is_none() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    if let Some(text) = &element.text {
                        writer.write_event(Event::Text(BytesText::new(text)))?;
                    }
                    work.push(Step::Close(&element.tag));
                    for child in element.children.iter().rev() {
                        work.push(Step::Open(child));
                    }
                }
            }
            Step::Close(tag) => {
                writer.write_event(Event::End(BytesEnd::new(tag)))?;
            }
        }
    }

    let mut xml = String::from_utf8(output)?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_element_is_self_closing() {
        let root = XmlElement::new("Empty");
        assert_eq!(to_xml_string(&root).unwrap(), "<Empty/>\n");
    }

    #[test]
    fn test_attributes_and_text() {
        let mut root = XmlElement::new("Item");
        root.attributes
            .insert("name".to_string(), "thruster".to_string());
        root.text = Some("ready".to_string());
        assert_eq!(
            to_xml_string(&root).unwrap(),
            "<Item name=\"thruster\">ready</Item>\n"
        );
    }

    #[test]
    fn test_nested_children_are_indented() {
        let mut root = XmlElement::new("Table");
        let mut row = XmlElement::new("Row");
        row.attributes.insert("id".to_string(), "1".to_string());
        root.children.push(row);
        root.children.push(XmlElement::new("Row"));
        assert_eq!(
            to_xml_string(&root).unwrap(),
            "<Table>\n  <Row id=\"1\"/>\n  <Row/>\n</Table>\n"
        );
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let mut root = XmlElement::new("E");
        root.attributes.insert("z".to_string(), "1".to_string());
        root.attributes.insert("a".to_string(), "2".to_string());
        let xml = to_xml_string(&root).unwrap();
        assert_eq!(xml, "<E z=\"1\" a=\"2\"/>\n");
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let mut root = XmlElement::new("E");
        root.attributes
            .insert("q".to_string(), "a\"b".to_string());
        root.text = Some("1 < 2 & 3".to_string());
        let xml = to_xml_string(&root).unwrap();
        assert!(xml.contains("&quot;"));
        assert!(xml.contains("1 &lt; 2 &amp; 3"));
    }
}
