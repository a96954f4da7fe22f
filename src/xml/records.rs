use super::{XmlMap, XmlValue};

/// A parsed element viewed as one record or a run of records.
///
/// The QM server emits a single element when a relation has one target and
/// a repeated element when it has several. The shape is decided once here so
/// callers never have to probe for it.
#[derive(Debug, Clone, PartialEq)]
pub enum Records<'a> {
    Single(&'a XmlMap),
    Many(Vec<&'a XmlMap>),
}

impl<'a> Records<'a> {
    /// Classify `value`. Bare text carries no record and yields `None`;
    /// non-map members of a list are skipped.
    pub fn from_value(value: &'a XmlValue) -> Option<Self> {
        match value {
            XmlValue::Map(map) => Some(Self::Single(map)),
            XmlValue::List(items) => Some(Self::Many(
                items.iter().filter_map(XmlValue::as_map).collect(),
            )),
            XmlValue::Text(_) => None,
        }
    }

    /// Values of every record, flattened in order.
    pub fn values(&self) -> Vec<&'a XmlValue> {
        match self {
            Self::Single(map) => (*map).values().collect(),
            Self::Many(maps) => maps.iter().copied().flat_map(XmlMap::values).collect(),
        }
    }

    /// Text values of every record, flattened in order.
    pub fn text_values(&self) -> Vec<String> {
        self.values()
            .into_iter()
            .filter_map(XmlValue::as_text)
            .map(str::to_string)
            .collect()
    }
}
