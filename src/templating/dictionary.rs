//! The run-scoped substitution dictionary and placeholder resolution.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::placeholder::{Located, scan};
use super::transforms::value_to_string;
use crate::core::DeployError;

/// What to do with a placeholder whose path is absent from the dictionary.
///
/// Every call site picks its policy explicitly:
/// - [`ResolvePolicy::strict`] fails on any missing path.
/// - [`ResolvePolicy::lenient`] leaves missing tokens in place.
/// - [`requiring`](ResolvePolicy::requiring) makes tokens under specific roots
///   mandatory even when lenient.
/// - [`deferring`](ResolvePolicy::deferring) leaves tokens under specific roots in
///   place even when a value is known (used for circular partners).
///
/// A token with a `||default` never fails; the default is used instead.
#[derive(Debug, Clone, Default)]
pub struct ResolvePolicy {
    strict: bool,
    required_roots: HashSet<String>,
    deferred_roots: HashSet<String>,
}

impl ResolvePolicy {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn lenient() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requiring<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn deferring<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deferred_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    fn defers(&self, root: &str) -> bool {
        self.deferred_roots.contains(root)
    }

    fn requires(&self, root: &str) -> bool {
        self.strict || self.required_roots.contains(root)
    }
}

/// Nested key/value store addressed by dotted paths.
///
/// Created once per deployment and dropped when the run ends. Writes go through
/// [`set`](Self::set), which refuses to change a value that is already present:
/// once an item's destination id is recorded it stays fixed for the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstitutionDictionary {
    root: Map<String, Value>,
}

impl SubstitutionDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary pre-populated with caller-supplied seed values.
    pub fn from_seed(seed: Map<String, Value>) -> Self {
        Self { root: seed }
    }

    /// Look up the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Insert or merge a value at a dotted path.
    ///
    /// - Missing intermediate objects are created.
    /// - Two objects at the same path merge shallowly; keys from `value` win.
    /// - Writing an equal value again is a no-op.
    ///
    /// # Errors
    ///
    /// [`DeployError::SubstitutionConflict`] when a different non-object value is
    /// already present at `path`, or when an intermediate segment holds a
    /// non-object value.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), DeployError> {
        let conflict = || DeployError::SubstitutionConflict {
            path: path.to_string(),
        };

        let segments: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = segments.split_last().ok_or_else(conflict)?;

        let mut current = &mut self.root;
        for segment in parents {
            let entry =
                current.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
            current = entry.as_object_mut().ok_or_else(conflict)?;
        }

        match current.get_mut(*leaf) {
            None => {
                current.insert(leaf.to_string(), value);
                Ok(())
            }
            Some(Value::Object(existing)) if value.is_object() => {
                if let Value::Object(incoming) = value {
                    existing.extend(incoming);
                }
                Ok(())
            }
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(conflict()),
        }
    }

    /// Record the destination id of a source item under `<source_id>.itemId`.
    pub fn record_item_id(&mut self, source_id: &str, destination_id: &str) -> Result<(), DeployError> {
        self.set(&format!("{source_id}.itemId"), Value::String(destination_id.to_string()))
    }

    /// Destination id recorded for a source item, if it has been created.
    pub fn item_id(&self, source_id: &str) -> Option<&str> {
        self.get(&format!("{source_id}.itemId")).and_then(Value::as_str)
    }

    /// The dictionary as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Deep copy of `template` with every placeholder substituted.
    ///
    /// Strings inside arrays and objects are resolved recursively; object keys and
    /// non-string scalars are copied unchanged. Resolution is a pure function of
    /// the dictionary state and the input.
    ///
    /// # Errors
    ///
    /// - [`DeployError::MissingSubstitution`] for a missing path the policy requires
    /// - [`DeployError::UnknownTransform`] for a resolved token naming an unknown transform
    pub fn resolve(&self, template: &Value, policy: &ResolvePolicy) -> Result<Value, DeployError> {
        match template {
            Value::String(text) => self.resolve_str(text, policy),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, policy))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value, policy)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve the placeholders in one string.
    ///
    /// When the whole string is a single placeholder, the resolved value replaces it
    /// with its own type (a number stays a number, an object stays an object).
    /// Otherwise each token is replaced by the value's string form.
    pub fn resolve_str(&self, text: &str, policy: &ResolvePolicy) -> Result<Value, DeployError> {
        let tokens = scan(text);
        if tokens.is_empty() {
            return Ok(Value::String(text.to_string()));
        }

        if let [only] = tokens.as_slice()
            && only.start == 0
            && only.end == text.len()
        {
            return Ok(self
                .lookup(only, policy)?
                .unwrap_or_else(|| Value::String(text.to_string())));
        }

        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;
        for located in &tokens {
            output.push_str(&text[cursor..located.start]);
            match self.lookup(located, policy)? {
                Some(value) => output.push_str(&value_to_string(&value)),
                None => output.push_str(located.placeholder.token),
            }
            cursor = located.end;
        }
        output.push_str(&text[cursor..]);
        Ok(Value::String(output))
    }

    /// `Ok(None)` means "leave the token as written".
    fn lookup(&self, located: &Located<'_>, policy: &ResolvePolicy) -> Result<Option<Value>, DeployError> {
        let placeholder = &located.placeholder;
        let root = placeholder.root();
        if policy.defers(root) {
            return Ok(None);
        }

        match self.get(placeholder.path) {
            Some(value) => Ok(Some(placeholder.transform()?.apply(value))),
            None => match placeholder.default {
                Some(default) => Ok(Some(Value::String(default.to_string()))),
                None if policy.requires(root) => Err(DeployError::MissingSubstitution {
                    path: placeholder.path.to_string(),
                }),
                None => Ok(None),
            },
        }
    }

    /// Placeholders in `template` still rooted at one of `roots` after resolution.
    pub fn unresolved_roots<'a>(template: &Value, roots: &'a [String]) -> Vec<&'a str> {
        let mut found: Vec<&str> = Vec::new();
        collect_roots(template, roots, &mut found);
        found
    }
}

fn collect_roots<'a>(value: &Value, roots: &'a [String], found: &mut Vec<&'a str>) {
    match value {
        Value::String(text) => {
            for located in scan(text) {
                if let Some(root) = roots.iter().find(|r| r.as_str() == located.placeholder.root())
                    && !found.contains(&root.as_str())
                {
                    found.push(root.as_str());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_roots(item, roots, found)),
        Value::Object(map) => map.values().for_each(|item| collect_roots(item, roots, found)),
        _ => {}
    }
}
