//! Typed-JSON factory registry
//!
//! Every polymorphic family in the engine (Actions, Builders, AdviseRequests, Advisors)
//! is persisted as a tagged JSON object carrying a `__type__` discriminator. A
//! [`Registry`] maps that tag to a factory closure that knows how to rebuild the
//! concrete Rust value from the JSON payload. Plugins participate by registering
//! their own tag during their load hook; the registry never needs to know the full
//! set of variants at compile time.

use crate::errors::{Result, WebinizerError};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// A factory function that rebuilds a `T` from its JSON representation.
///
/// `index` is the position of this element within whatever array it was
/// deserialized from, purely for error reporting (see [`Registry::from_json_array`]).
pub type FromJsonFn<T> = Box<dyn Fn(&Value, usize) -> Option<T> + Send + Sync>;

/// A registry for one polymorphic family, keyed by `__type__` tag.
///
/// `T` is typically an `Arc<dyn SomeTrait>` or a boxed trait object; the registry
/// itself is agnostic to what `T` is, it just dispatches JSON -> factory -> `T`.
pub struct Registry<T> {
    name: &'static str,
    factories: Mutex<HashMap<String, FromJsonFn<T>>>,
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self
            .factories
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("tags", &tags)
            .finish()
    }
}

impl<T> Registry<T> {
    /// Create a new, empty registry for the given family name (used in error messages).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            factories: Mutex::new(HashMap::new()),
        }
    }

    /// Register a factory under `tag`.
    ///
    /// Fails with `JSONFACTORY_DUP_REG` if `tag` is already registered: duplicate
    /// registration is a programmer error in an extension's load hook, not a
    /// recoverable runtime condition.
    pub fn register<F>(&self, tag: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Value, usize) -> Option<T> + Send + Sync + 'static,
    {
        let tag = tag.into();
        let mut factories = self.factories.lock().unwrap();
        if factories.contains_key(&tag) {
            return Err(WebinizerError::JsonFactoryDupReg {
                registry: self.name.to_string(),
                tag,
            });
        }
        factories.insert(tag, Box::new(factory));
        Ok(())
    }

    /// Whether `tag` currently has a registered factory.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.lock().unwrap().contains_key(tag)
    }

    /// All currently-registered tags, in no particular order.
    pub fn tags(&self) -> Vec<String> {
        self.factories.lock().unwrap().keys().cloned().collect()
    }

    /// Deserialize one JSON object by dispatching on its `__type__` field.
    ///
    /// Returns `None` if `__type__` is missing, not a string, or unregistered —
    /// the caller decides whether that is fatal.
    pub fn from_json(&self, obj: &Value, index: usize) -> Option<T> {
        let tag = obj.get("__type__")?.as_str()?;
        let factories = self.factories.lock().unwrap();
        let factory = factories.get(tag)?;
        factory(obj, index)
    }

    /// Deserialize every element of a JSON array, failing fast on the first
    /// element that [`Registry::from_json`] cannot resolve.
    pub fn from_json_array(&self, arr: &[Value]) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(arr.len());
        for (index, obj) in arr.iter().enumerate() {
            match self.from_json(obj, index) {
                Some(value) => out.push(value),
                None => {
                    let tag = obj
                        .get("__type__")
                        .and_then(|v| v.as_str())
                        .unwrap_or("<missing>");
                    return Err(WebinizerError::JsonFactoryDeserializeFail {
                        registry: self.name.to_string(),
                        index,
                        message: format!("unrecognized __type__ '{tag}'"),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Remove all registered factories. Only intended for test isolation, since
    /// production registries are populated once at process init and never cleared.
    #[cfg(test)]
    pub fn clear(&self) {
        self.factories.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Widget {
        size: i64,
    }

    #[test]
    fn register_and_dispatch_by_tag() {
        let registry: Registry<Widget> = Registry::new("widget");
        registry
            .register("BigWidget", |obj, _index| {
                obj.get("size").and_then(|v| v.as_i64()).map(|size| Widget { size })
            })
            .unwrap();

        let value = json!({"__type__": "BigWidget", "size": 42});
        let widget = registry.from_json(&value, 0).unwrap();
        assert_eq!(widget, Widget { size: 42 });
    }

    #[test]
    fn unknown_tag_returns_none() {
        let registry: Registry<Widget> = Registry::new("widget");
        let value = json!({"__type__": "Unknown"});
        assert!(registry.from_json(&value, 0).is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry: Registry<Widget> = Registry::new("widget");
        registry
            .register("X", |_obj, _index| Some(Widget { size: 1 }))
            .unwrap();
        let err = registry
            .register("X", |_obj, _index| Some(Widget { size: 2 }))
            .unwrap_err();
        assert_eq!(err.kind(), "JSONFACTORY_DUP_REG");
    }

    #[test]
    fn from_json_array_fails_fast_on_first_bad_element() {
        let registry: Registry<Widget> = Registry::new("widget");
        registry
            .register("X", |obj, _index| {
                obj.get("size").and_then(|v| v.as_i64()).map(|size| Widget { size })
            })
            .unwrap();

        let arr = vec![
            json!({"__type__": "X", "size": 1}),
            json!({"__type__": "Y", "size": 2}),
            json!({"__type__": "X", "size": 3}),
        ];
        let err = registry.from_json_array(&arr).unwrap_err();
        assert_eq!(err.kind(), "JSONFACTORY_DESERIALIZE_FAIL");
    }

    #[test]
    fn from_json_array_round_trips_all_elements() {
        let registry: Registry<Widget> = Registry::new("widget");
        registry
            .register("X", |obj, _index| {
                obj.get("size").and_then(|v| v.as_i64()).map(|size| Widget { size })
            })
            .unwrap();

        let arr = vec![
            json!({"__type__": "X", "size": 1}),
            json!({"__type__": "X", "size": 2}),
        ];
        let widgets = registry.from_json_array(&arr).unwrap();
        assert_eq!(widgets, vec![Widget { size: 1 }, Widget { size: 2 }]);
    }
}
