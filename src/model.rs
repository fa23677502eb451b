//! View Models
//!
//! Templates never reflect over caller types. The model is a JSON value
//! addressed by dotted keys; the view bag is the per-render scratch map
//! that layouts and leaves share.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModel {
    data: Value,
}

impl ViewModel {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Serialize any caller type into a model.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn lookup(&self, path: &[String]) -> Option<&Value> {
        lookup(&self.data, path)
    }
}

/// Key-value state shared by every page of one render.
#[derive(Debug, Clone, Default)]
pub struct ViewBag {
    values: Map<String, Value>,
}

impl ViewBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn lookup(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        lookup(self.values.get(first)?, rest)
    }
}

/// Walk `path` through nested objects; numeric segments index arrays.
pub fn lookup<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Template truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn test_lookup_nested_and_index() {
        let model = ViewModel::new(json!({"user": {"name": "ada", "tags": ["x", "y"]}}));
        assert_eq!(model.lookup(&path("user.name")), Some(&json!("ada")));
        assert_eq!(model.lookup(&path("user.tags.1")), Some(&json!("y")));
        assert_eq!(model.lookup(&path("user.missing")), None);
        assert_eq!(model.lookup(&[]), Some(model.data()));
    }

    #[test]
    fn test_from_serialize() {
        #[derive(Serialize)]
        struct Product {
            name: &'static str,
            price: u32,
        }

        let model = ViewModel::from_serialize(&Product { name: "lamp", price: 40 }).unwrap();
        assert_eq!(model.lookup(&path("name")), Some(&json!("lamp")));
        assert_eq!(model.lookup(&path("price")), Some(&json!(40)));
    }

    #[test]
    fn test_view_bag() {
        let mut bag = ViewBag::new();
        bag.set("title", json!("Home"));
        assert_eq!(bag.lookup(&path("title")), Some(&json!("Home")));
        assert_eq!(bag.lookup(&path("other")), None);
        assert_eq!(bag.lookup(&[]), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({"a": 1})));
        assert!(is_truthy(&json!("no")));
    }
}
