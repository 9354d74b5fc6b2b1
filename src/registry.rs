use std::collections::BTreeMap;

use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineErr, Result};

/// A configuration record, `{"type": <registered name>, ...constructor params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ObjectSpec {
    /// Creates a new `ObjectSpec` without parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Adds a constructor parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Deserializes the record's parameters into the constructor's config.
    ///
    /// # Errors
    /// `InvalidParams` if a field is missing or has the wrong type.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|source| {
            EngineErr::InvalidParams {
                kind: self.kind.clone(),
                source,
            }
        })
    }
}

impl TryFrom<Value> for ObjectSpec {
    type Error = EngineErr;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Object(mut params) = value else {
            return Err(EngineErr::InvalidSpec(format!(
                "expected an object, got {value}"
            )));
        };

        match params.remove("type") {
            Some(Value::String(kind)) => Ok(Self { kind, params }),
            Some(other) => Err(EngineErr::InvalidSpec(format!(
                "'type' must be a string, got {other}"
            ))),
            None => Err(EngineErr::InvalidSpec("missing 'type' field".into())),
        }
    }
}

/// Either an already built object or the record to build it from.
pub enum Source<T: ?Sized> {
    Built(Box<T>),
    Spec(ObjectSpec),
}

impl<T: ?Sized> From<ObjectSpec> for Source<T> {
    fn from(spec: ObjectSpec) -> Self {
        Self::Spec(spec)
    }
}

/// Builds a `T` out of a spec and whatever context the factories need.
pub type Factory<T, C> = Box<dyn Fn(&ObjectSpec, &C) -> Result<Box<T>> + Send + Sync>;

/// Maps names to typed factories.
pub struct Registry<T: ?Sized, C: ?Sized = ()> {
    name: &'static str,
    factories: BTreeMap<String, Factory<T, C>>,
}

impl<T: ?Sized, C: ?Sized> Registry<T, C> {
    /// Creates a new empty `Registry`.
    ///
    /// # Args
    /// * `name` - What the registry builds, used in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            factories: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers `factory` under `kind`.
    ///
    /// # Errors
    /// `DuplicateRegistration` if `kind` is already taken.
    pub fn register<F>(&mut self, kind: &str, factory: F) -> Result<()>
    where
        F: Fn(&ObjectSpec, &C) -> Result<Box<T>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(kind) {
            return Err(EngineErr::DuplicateRegistration {
                registry: self.name,
                name: kind.to_string(),
            });
        }

        debug!(registry = self.name; "registered '{kind}'");
        self.factories.insert(kind.to_string(), Box::new(factory));
        Ok(())
    }

    /// Registers a factory whose name is known not to clash, replacing any previous one.
    pub(crate) fn insert<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ObjectSpec, &C) -> Result<Box<T>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(String::as_str)
    }

    /// Builds an object from its record.
    ///
    /// # Errors
    /// `UnknownType` if the record's type isn't registered, or whatever the factory fails with.
    pub fn build(&self, spec: &ObjectSpec, ctx: &C) -> Result<Box<T>> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| EngineErr::UnknownType {
                registry: self.name,
                name: spec.kind.clone(),
            })?;

        factory(spec, ctx)
    }
}

/// Resolves `source` into a built object, going through `registry` when needed.
pub fn build_object<T, C>(source: Source<T>, registry: &Registry<T, C>, ctx: &C) -> Result<Box<T>>
where
    T: ?Sized,
    C: ?Sized,
{
    match source {
        Source::Built(object) => Ok(object),
        Source::Spec(spec) => registry.build(&spec, ctx),
    }
}
