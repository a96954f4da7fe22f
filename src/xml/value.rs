use super::{attr_qname, ns, qname, XmlError};

/// Key under which mixed-content text is stored next to attributes/children.
pub const TEXT_KEY: &str = "#text";

/// A parsed XML element.
///
/// Leaf elements without attributes become `Text`; anything with attributes
/// or child elements becomes a `Map`. A tag repeated under the same parent
/// collapses into a `List`.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(String),
    Map(XmlMap),
    List(Vec<XmlValue>),
}

/// Insertion-ordered mapping from qualified names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlMap {
    entries: Vec<(String, XmlValue)>,
}

impl XmlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert `value` under `key`. A second value under the same key turns
    /// the entry into a list, preserving order.
    pub fn insert(&mut self, key: String, value: XmlValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, XmlValue::List(items))) => items.push(value),
            Some((_, existing)) => {
                let first = std::mem::replace(existing, XmlValue::List(Vec::new()));
                *existing = XmlValue::List(vec![first, value]);
            }
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &XmlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &XmlValue> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl FromIterator<(String, XmlValue)> for XmlMap {
    fn from_iter<T: IntoIterator<Item = (String, XmlValue)>>(iter: T) -> Self {
        let mut map = XmlMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl XmlValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Text content: a `Text` value, or the `#text` entry of a `Map`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Map(m) => m.get(TEXT_KEY).and_then(XmlValue::as_text),
            Self::List(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&XmlMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[XmlValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.as_map()?.get(key)
    }

    /// Walk nested maps along `keys`.
    pub fn path<S: AsRef<str>>(&self, keys: &[S]) -> Option<&XmlValue> {
        keys.iter()
            .try_fold(self, |value, key| value.get(key.as_ref()))
    }

    /// The `rdf:resource` attribute of this element.
    pub fn resource(&self) -> Option<&str> {
        self.get(&attr_qname(ns::RDF, "resource"))?.as_text()
    }

    /// The element itself, or each element of a repeated tag.
    pub fn items(&self) -> Vec<&XmlValue> {
        match self {
            Self::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

/// Parse a document into `{ root_key: root_value }`.
pub fn parse_document(xml: &str) -> Result<XmlValue, XmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let mut top = XmlMap::new();
    top.insert(element_key(root), element_value(root));
    Ok(XmlValue::Map(top))
}

/// Text of every `{namespace}local` element in document order.
pub fn descendant_texts(xml: &str, namespace: &str, local: &str) -> Result<Vec<String>, XmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.has_tag_name((namespace, local)))
        .filter_map(|n| n.text())
        .map(|t| t.trim().to_string())
        .collect())
}

fn element_key(node: roxmltree::Node<'_, '_>) -> String {
    let tag = node.tag_name();
    match tag.namespace() {
        Some(namespace) => qname(namespace, tag.name()),
        None => tag.name().to_string(),
    }
}

fn element_value(node: roxmltree::Node<'_, '_>) -> XmlValue {
    let mut map = XmlMap::new();

    for attr in node.attributes() {
        let key = match attr.namespace() {
            Some(namespace) => attr_qname(namespace, attr.name()),
            None => format!("@{}", attr.name()),
        };
        map.insert(key, XmlValue::text(attr.value()));
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            map.insert(element_key(child), element_value(child));
        } else if child.is_text() {
            if let Some(t) = child.text() {
                text.push_str(t);
            }
        }
    }

    let text = text.trim();
    if map.is_empty() {
        return XmlValue::text(text);
    }
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), XmlValue::text(text));
    }
    XmlValue::Map(map)
}
