use std::collections::HashMap;

/// Path variables captured by a successful lookup, in binding order.
///
/// A name bound more than once keeps every value; [`Params::get`] returns
/// the most recent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value most recently bound to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse into a map; later bindings overwrite earlier ones.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.0.iter().cloned().collect()
    }

    pub(crate) fn extend(&mut self, bindings: Vec<(String, String)>) {
        self.0.extend(bindings);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl From<Vec<(String, String)>> for Params {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn get_returns_latest_binding() {
        let p = params(&[("id", "1"), ("name", "dog"), ("id", "2")]);
        assert_eq!(p.get("id"), Some("2"));
        assert_eq!(p.get("name"), Some("dog"));
        assert_eq!(p.get("missing"), None);
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn to_map_last_write_wins() {
        let p = params(&[("id", "1"), ("id", "2")]);
        let map = p.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["id"], "2");
    }

    #[test]
    fn iter_preserves_order() {
        let p = params(&[("a", "1"), ("b", "2")]);
        assert_eq!(p.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
    }
}
