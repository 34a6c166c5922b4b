use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A fully expanded event: a string-keyed map whose values are strings,
/// numbers, booleans, null, nested maps, or sequences thereof.
///
/// Nested entries are addressed with `/`-separated paths, e.g.
/// `Event/System/EventID`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvtxMap(Map<String, Value>);

const EVENT_ID_PATH: &str = "Event/System/EventID";
const XMLNS_PATH: &str = "Event/xmlns";

impl EvtxMap {
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut components = split_path(path);

        let first = components.next()?;
        let mut current = self.0.get(first)?;

        for component in components {
            current = current.as_object()?.get(component)?;
        }

        Some(current)
    }

    pub fn del_path(&mut self, path: &str) {
        let components: Vec<&str> = split_path(path).collect();

        let Some((leaf, parents)) = components.split_last() else {
            return;
        };

        let mut current = &mut self.0;
        for component in parents {
            match current.get_mut(*component).and_then(Value::as_object_mut) {
                Some(map) => current = map,
                None => return,
            }
        }

        current.remove(*leaf);
    }

    /// The `xmlns` attribute on the outermost `/Event` entry is declarative,
    /// not data.
    pub fn prune_xmlns(&mut self) {
        self.del_path(XMLNS_PATH);
    }

    pub fn event_id(&self) -> Option<&Value> {
        self.get_path(EVENT_ID_PATH)
    }

    /// True when the event id at `/Event/System/EventID` equals any of the
    /// given values.
    pub fn is_event_id(&self, ids: &[Value]) -> bool {
        self.event_id()
            .map(|value| ids.contains(value))
            .unwrap_or(false)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|c| !c.is_empty())
}

impl From<Map<String, Value>> for EvtxMap {
    fn from(map: Map<String, Value>) -> Self {
        EvtxMap(map)
    }
}

impl Serialize for EvtxMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl fmt::Display for EvtxMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        write!(f, "{repr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> EvtxMap {
        let value = json!({
            "Event": {
                "xmlns": "http://schemas.microsoft.com/win/2004/08/events/event",
                "System": {
                    "EventID": "4624",
                    "Channel": "Security"
                }
            }
        });

        match value {
            Value::Object(map) => EvtxMap::from(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_gets_nested_paths() {
        let map = sample();

        assert_eq!(
            map.get_path("/Event/System/EventID"),
            Some(&json!("4624"))
        );
        assert_eq!(map.get_path("Event/System/Channel"), Some(&json!("Security")));
        assert_eq!(map.get_path("Event/Missing"), None);
    }

    #[test]
    fn test_prunes_xmlns_from_the_event_root() {
        let mut map = sample();
        map.prune_xmlns();

        assert_eq!(map.get_path("Event/xmlns"), None);
        assert_eq!(
            map.get_path("Event/System/EventID"),
            Some(&json!("4624"))
        );
    }

    #[test]
    fn test_matches_event_ids() {
        let map = sample();

        assert!(map.is_event_id(&[json!("4624"), json!(4624)]));
        assert!(!map.is_event_id(&[json!("4625")]));
        assert!(!map.is_event_id(&[]));
    }
}
