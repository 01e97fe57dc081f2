//! XML reading and writing for element trees
//!
//! Reading produces a schema-less tree: every attribute becomes a string
//! parameter and element text becomes a string value. Writing emits set or
//! required attributes and any value slot.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::element::{ElementId, ElementTree};
use crate::error::DocumentError;
use crate::param::ParamType;

/// Parse an XML document into a new tree, returning the root element
pub fn parse_str(xml: &str) -> Result<(ElementTree, ElementId), DocumentError> {
    let mut tree = ElementTree::new();
    let root = parse_into(&mut tree, xml)?;
    Ok((tree, root))
}

/// Parse an XML document into an existing tree; the root comes back detached
pub fn parse_into(tree: &mut ElementTree, xml: &str) -> Result<ElementId, DocumentError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<ElementId> = Vec::new();
    let mut root: Option<ElementId> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            DocumentError::ParseError(format!("at position {}: {}", reader.error_position(), e))
        })?;
        match event {
            Event::Start(start) => {
                let id = open_element(tree, &start, &stack, root)?;
                if root.is_none() {
                    root = Some(id);
                }
                stack.push(id);
            }
            Event::Empty(start) => {
                let id = open_element(tree, &start, &stack, root)?;
                if root.is_none() {
                    root = Some(id);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| DocumentError::ParseError(e.to_string()))?;
                append_text(tree, stack.last().copied(), &text)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(tree, stack.last().copied(), &text)?;
            }
            Event::Eof => {
                if let Some(open) = stack.last() {
                    return Err(DocumentError::ParseError(format!(
                        "unexpected end of document inside <{}>",
                        tree.name(*open)
                    )));
                }
                break;
            }
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    root.ok_or_else(|| DocumentError::ParseError("document has no root element".to_string()))
}

fn open_element(
    tree: &mut ElementTree,
    start: &BytesStart<'_>,
    stack: &[ElementId],
    root: Option<ElementId>,
) -> Result<ElementId, DocumentError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let parent = stack.last().copied();
    if parent.is_none() && root.is_some() {
        return Err(DocumentError::ParseError(format!(
            "unexpected second root element <{}>",
            name
        )));
    }

    let id = tree.create(&name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::ParseError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::ParseError(e.to_string()))?;
        tree.add_attribute(id, &key, ParamType::String, "", false, "")
            .map_err(|e| DocumentError::ParseError(e.to_string()))?;
        tree.set_attribute(id, &key, &value)
            .map_err(|e| DocumentError::ParseError(e.to_string()))?;
    }
    if let Some(parent) = parent {
        tree.insert_element(parent, id);
    }
    Ok(id)
}

fn append_text(
    tree: &mut ElementTree,
    target: Option<ElementId>,
    text: &str,
) -> Result<(), DocumentError> {
    let Some(id) = target else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }
    let combined = match tree.value(id) {
        Some(existing) => format!("{}{}", existing.as_string(), text),
        None => {
            tree.add_value(id, ParamType::String, "", false, "")
                .map_err(|e| DocumentError::ParseError(e.to_string()))?;
            text.to_string()
        }
    };
    tree.set_value_str(id, &combined)
        .map_err(|e| DocumentError::ParseError(e.to_string()))
}

/// Serialize `id` and its subtree
pub fn write_string(tree: &ElementTree, id: ElementId, indent: usize) -> Result<String, DocumentError> {
    let mut writer = if indent > 0 {
        Writer::new_with_indent(Vec::new(), b' ', indent)
    } else {
        Writer::new(Vec::new())
    };
    write_element(&mut writer, tree, id)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| DocumentError::SerializeError(e.to_string()))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    tree: &ElementTree,
    id: ElementId,
) -> Result<(), DocumentError> {
    let name = tree.name(id);
    let mut start = BytesStart::new(name);
    for attr in tree.attributes(id) {
        if attr.is_set() || attr.is_required() {
            let value = attr.as_string();
            start.push_attribute((attr.key(), value.as_str()));
        }
    }

    let text = tree.value(id).map(|v| v.as_string());
    let children = tree.elements(id);
    if children.is_empty() && text.as_deref().map_or(true, str::is_empty) {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| DocumentError::SerializeError(e.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| DocumentError::SerializeError(e.to_string()))?;
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(|e| DocumentError::SerializeError(e.to_string()))?;
    }
    for child in children {
        write_element(writer, tree, *child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| DocumentError::SerializeError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_tree() {
        let xml = r#"<?xml version="1.0"?>
<!-- comment -->
<robot name="r2">
    <link name="base"/>
    <gazebo reference="base">
        <mu1>0.5</mu1>
        <sensor name="bumper" type="contact"><update_rate> 10 </update_rate></sensor>
    </gazebo>
</robot>"#;
        let (tree, root) = parse_str(xml).unwrap();
        assert_eq!(tree.name(root), "robot");
        assert_eq!(tree.get::<String>(root, "name"), "r2");
        assert_eq!(tree.elements(root).len(), 2);

        let gazebo = tree.element(root, "gazebo").unwrap();
        assert_eq!(tree.get::<f64>(gazebo, "mu1"), 0.5);
        let sensor = tree.element(gazebo, "sensor").unwrap();
        assert_eq!(tree.get::<f64>(sensor, "update_rate"), 10.0);
        assert!(tree.value(tree.element(root, "link").unwrap()).is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_str("").is_err());
        assert!(parse_str("<a><b></a>").is_err());
        assert!(parse_str("<a/><b/>").is_err());
        assert!(parse_str("<a><b/>").is_err());
    }

    #[test]
    fn test_unescape_and_cdata() {
        let (tree, root) = parse_str(r#"<a note="x &amp; y">1 &lt; 2<![CDATA[ & more]]></a>"#).unwrap();
        assert_eq!(tree.get::<String>(root, "note"), "x & y");
        assert_eq!(tree.get::<String>(root, ""), "1 < 2 & more");
    }

    #[test]
    fn test_write_round_trip() {
        let xml = r#"<model name="m"><link name="a"><pose>0 0 1 0 0 0</pose></link><static/></model>"#;
        let (tree, root) = parse_str(xml).unwrap();
        let out = write_string(&tree, root, 0).unwrap();
        assert_eq!(out, xml);

        let pretty = write_string(&tree, root, 2).unwrap();
        assert!(pretty.contains("\n  <link name=\"a\">"));
        assert!(pretty.contains("<pose>0 0 1 0 0 0</pose>"));

        let (again, again_root) = parse_str(&pretty).unwrap();
        assert!(again.deep_eq(again_root, &tree, root));
    }
}
