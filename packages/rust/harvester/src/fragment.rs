//! Parsed document fragments and the composite-record tree model.
//!
//! A [`Fragment`] is one parsed document (XML or JSON) fetched for one stage
//! of one record. It supports the three things the pipeline needs from a
//! content parser: path-based field lookup (identifier extraction, next-stage
//! URI derivation), entry-list extraction (page walking), and child-node
//! attachment (embedding optional fragments into the primary document).
//!
//! Serialization is deterministic: JSON objects serialize in key order and
//! XML attribute order is preserved, so repeated runs over identical inputs
//! produce byte-identical composite payloads.

use std::io::Cursor;

use serde_json::Value;
use xmltree::{Element, EmitterConfig, XMLNode};

use gatherer_shared::{ContentFormat, HarvestError, Result};

/// One parsed document tree, tagged by its source format.
#[derive(Debug, Clone)]
pub enum Fragment {
    Xml(Element),
    Json(Value),
}

impl Fragment {
    /// Parse a response body in the given format.
    pub fn parse(body: &str, format: ContentFormat) -> Result<Self> {
        match format {
            ContentFormat::Xml => {
                let root = Element::parse(Cursor::new(body.as_bytes()))
                    .map_err(|e| HarvestError::parse(format!("malformed XML: {e}")))?;
                Ok(Self::Xml(root))
            }
            ContentFormat::Json => {
                let value: Value = serde_json::from_str(body)
                    .map_err(|e| HarvestError::parse(format!("malformed JSON: {e}")))?;
                Ok(Self::Json(value))
            }
        }
    }

    /// Source format of this fragment.
    pub fn format(&self) -> ContentFormat {
        match self {
            Self::Xml(_) => ContentFormat::Xml,
            Self::Json(_) => ContentFormat::Json,
        }
    }

    // -----------------------------------------------------------------------
    // Path lookup
    // -----------------------------------------------------------------------

    /// First scalar value at a `/`-separated path, if any.
    ///
    /// XML paths descend element names and may end in `@attr` to read an
    /// attribute; JSON paths descend object keys and flatten over arrays.
    /// The root element's own name is not part of the path.
    pub fn text_at(&self, path: &str) -> Option<String> {
        self.texts_at(path).into_iter().next()
    }

    /// All scalar values at a `/`-separated path, in document order.
    pub fn texts_at(&self, path: &str) -> Vec<String> {
        match self {
            Self::Xml(root) => {
                let (element_path, attr) = split_attr(path);
                let nodes = xml_descend(root, element_path);
                nodes
                    .into_iter()
                    .filter_map(|el| match attr {
                        Some(name) => el.attributes.get(name).cloned(),
                        None => el.get_text().map(|t| t.trim().to_string()),
                    })
                    .filter(|t| !t.is_empty())
                    .collect()
            }
            Self::Json(value) => {
                let mut out = Vec::new();
                for v in json_descend(value, path) {
                    if let Some(s) = json_scalar(v) {
                        out.push(s);
                    }
                }
                out
            }
        }
    }

    /// All subtrees at a `/`-separated path, cloned out as fragments.
    /// Used to pull per-item entries out of a page document.
    pub fn entries_at(&self, path: &str) -> Vec<Fragment> {
        match self {
            Self::Xml(root) => xml_descend(root, path)
                .into_iter()
                .map(|el| Fragment::Xml(el.clone()))
                .collect(),
            Self::Json(value) => json_descend(value, path)
                .into_iter()
                .map(|v| Fragment::Json(v.clone()))
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Attachment
    // -----------------------------------------------------------------------

    /// Embed another fragment into this one under a named wrapper node,
    /// appended after existing children. Attachment order is the caller's
    /// stage order, which keeps merged output deterministic.
    pub fn attach(&mut self, wrapper: &str, other: &Fragment) -> Result<()> {
        match (self, other) {
            (Self::Xml(root), Self::Xml(child)) => {
                let mut wrapper_el = Element::new(wrapper);
                wrapper_el.children.push(XMLNode::Element(child.clone()));
                root.children.push(XMLNode::Element(wrapper_el));
                Ok(())
            }
            (Self::Json(root), Self::Json(child)) => {
                let map = root.as_object_mut().ok_or_else(|| {
                    HarvestError::parse("cannot attach to a non-object JSON root")
                })?;
                match map.get_mut(wrapper) {
                    // Repeated attachments under one wrapper collect into an array.
                    Some(Value::Array(items)) => items.push(child.clone()),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, child.clone()]);
                    }
                    None => {
                        map.insert(wrapper.to_string(), child.clone());
                    }
                }
                Ok(())
            }
            _ => Err(HarvestError::parse(
                "cannot attach a fragment across formats",
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize the tree in its native format.
    pub fn serialize(&self) -> Result<String> {
        match self {
            Self::Xml(root) => {
                let config = EmitterConfig::new().write_document_declaration(false);
                let mut out = Vec::new();
                root.write_with_config(&mut out, config)
                    .map_err(|e| HarvestError::parse(format!("XML serialization failed: {e}")))?;
                String::from_utf8(out)
                    .map_err(|e| HarvestError::parse(format!("non-UTF-8 XML output: {e}")))
            }
            Self::Json(value) => serde_json::to_string(value)
                .map_err(|e| HarvestError::parse(format!("JSON serialization failed: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Path walking helpers
// ---------------------------------------------------------------------------

/// Split a trailing `@attr` segment off an XML path.
fn split_attr(path: &str) -> (&str, Option<&str>) {
    match path.rsplit_once('/') {
        Some((init, last)) if last.starts_with('@') => (init, Some(&last[1..])),
        None if path.starts_with('@') => ("", Some(&path[1..])),
        _ => (path, None),
    }
}

/// Walk an element path, expanding to every matching child at each step.
/// An empty path addresses the root itself. Element name matching ignores
/// namespace prefixes, as providers mix prefixed and bare serializations.
fn xml_descend<'a>(root: &'a Element, path: &str) -> Vec<&'a Element> {
    let mut frontier = vec![root];
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for el in frontier {
            for child in &el.children {
                if let XMLNode::Element(child_el) = child {
                    if child_el.name == segment {
                        next.push(child_el);
                    }
                }
            }
        }
        frontier = next;
    }
    frontier
}

/// Walk a JSON path, flattening over arrays at each step.
fn json_descend<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut frontier = vec![root];
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for value in frontier {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        flatten_into(v, &mut next);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment) {
                            flatten_into(v, &mut next);
                        }
                    }
                }
                _ => {}
            }
        }
        frontier = next;
    }
    frontier
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        other => out.push(other),
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_XML: &str = r#"<metadata>
  <identifier>sim-item-01</identifier>
  <title>A title</title>
  <subject>maps</subject>
  <subject>surveys</subject>
  <files>
    <file name="item.pdf" source="original"/>
    <file name="item_marc.xml" source="metadata"/>
  </files>
</metadata>"#;

    #[test]
    fn xml_path_lookup() {
        let frag = Fragment::parse(ITEM_XML, ContentFormat::Xml).unwrap();
        assert_eq!(frag.text_at("identifier").as_deref(), Some("sim-item-01"));
        assert_eq!(
            frag.texts_at("subject"),
            vec!["maps".to_string(), "surveys".to_string()]
        );
        assert_eq!(frag.text_at("nope"), None);
    }

    #[test]
    fn xml_attribute_lookup() {
        let frag = Fragment::parse(ITEM_XML, ContentFormat::Xml).unwrap();
        assert_eq!(
            frag.texts_at("files/file/@name"),
            vec!["item.pdf".to_string(), "item_marc.xml".to_string()]
        );
        assert_eq!(frag.entries_at("files/file").len(), 2);
    }

    #[test]
    fn json_path_lookup_flattens_arrays() {
        let body = r#"{
            "results": [
                {"id": "a1", "aka": ["http://x.org/item/a1/", "http://x.org/resource/a1/"]},
                {"id": "b2"}
            ],
            "pagination": {"of": 2, "next": null}
        }"#;
        let frag = Fragment::parse(body, ContentFormat::Json).unwrap();
        assert_eq!(
            frag.texts_at("results/id"),
            vec!["a1".to_string(), "b2".to_string()]
        );
        assert_eq!(frag.text_at("pagination/of").as_deref(), Some("2"));
        // null is not a scalar
        assert_eq!(frag.text_at("pagination/next"), None);
        assert_eq!(frag.entries_at("results").len(), 2);
        assert_eq!(
            frag.entries_at("results")[0].texts_at("aka").len(),
            2
        );
    }

    #[test]
    fn parse_failures_are_parse_errors() {
        let err = Fragment::parse("<unclosed>", ContentFormat::Xml).unwrap_err();
        assert!(matches!(err, HarvestError::Parse { .. }));
        let err = Fragment::parse("{not json", ContentFormat::Json).unwrap_err();
        assert!(matches!(err, HarvestError::Parse { .. }));
    }

    #[test]
    fn xml_attach_embeds_wrapped_child() {
        let mut primary = Fragment::parse(ITEM_XML, ContentFormat::Xml).unwrap();
        let marc =
            Fragment::parse("<record><leader>00000cam</leader></record>", ContentFormat::Xml)
                .unwrap();
        primary.attach("marc", &marc).unwrap();

        let out = primary.serialize().unwrap();
        assert!(out.contains("<marc><record>"));
        // Original children are untouched and precede the attachment.
        assert!(out.find("<identifier>").unwrap() < out.find("<marc>").unwrap());
    }

    #[test]
    fn json_attach_collects_repeats_into_array() {
        let mut primary =
            Fragment::parse(r#"{"id":"a1","title":"t"}"#, ContentFormat::Json).unwrap();
        let one = Fragment::parse(r#"{"n":1}"#, ContentFormat::Json).unwrap();
        let two = Fragment::parse(r#"{"n":2}"#, ContentFormat::Json).unwrap();

        primary.attach("extension", &one).unwrap();
        let single = primary.serialize().unwrap();
        assert!(single.contains(r#""extension":{"n":1}"#));

        primary.attach("extension", &two).unwrap();
        let doubled = primary.serialize().unwrap();
        assert!(doubled.contains(r#""extension":[{"n":1},{"n":2}]"#));
    }

    #[test]
    fn attach_across_formats_is_rejected() {
        let mut primary = Fragment::parse(r#"{"id":"a1"}"#, ContentFormat::Json).unwrap();
        let xml = Fragment::parse("<doc/>", ContentFormat::Xml).unwrap();
        assert!(primary.attach("extension", &xml).is_err());
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut a = Fragment::parse(ITEM_XML, ContentFormat::Xml).unwrap();
        let mut b = Fragment::parse(ITEM_XML, ContentFormat::Xml).unwrap();
        let files = Fragment::parse("<files><file/></files>", ContentFormat::Xml).unwrap();
        a.attach("extension", &files).unwrap();
        b.attach("extension", &files).unwrap();
        assert_eq!(a.serialize().unwrap(), b.serialize().unwrap());

        let j = Fragment::parse(r#"{"z":1,"a":{"m":[1,2]}}"#, ContentFormat::Json).unwrap();
        assert_eq!(j.serialize().unwrap(), j.serialize().unwrap());
    }
}
