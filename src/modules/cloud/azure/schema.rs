//! Attribute schema, flat resource data and plan diffs.
//!
//! A [`ResourceSchema`] describes every attribute a resource accepts. The
//! configuration for a resource is a JSON object whose nested blocks are
//! arrays of objects, so `os_profile.0.linux_configuration.0.admin_username`
//! addresses a single leaf value.
//!
//! [`ResourceData`] layers three views of that object (prior state, desired
//! configuration and values written back by a read) and answers the
//! questions a resource operation asks: what is the value of this attribute,
//! and has it changed?

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use super::validate::{Diagnostics, ValidateFn};
use crate::config::TimeoutsConfig;

/// Returns `true` when `old` and `new` should be treated as equal
pub type DiffSuppressFn = Arc<dyn Fn(&str, &Value, &Value) -> bool + Send + Sync>;

/// A set of attribute schemas keyed by attribute name
pub type Attributes = IndexMap<String, Schema>;

// ============================================================================
// Schema
// ============================================================================

/// The value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Bool,
    Int,
    Float,
    List,
    Set,
    Map,
}

impl AttributeType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            AttributeType::String => value.is_string(),
            AttributeType::Bool => value.is_boolean(),
            AttributeType::Int => value.is_i64() || value.is_u64(),
            AttributeType::Float => value.is_number(),
            AttributeType::List | AttributeType::Set => value.is_array(),
            AttributeType::Map => value.is_object(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::String => "string",
            AttributeType::Bool => "bool",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::List => "list",
            AttributeType::Set => "set",
            AttributeType::Map => "map",
        };
        write!(f, "{}", name)
    }
}

/// The contents of a list, set or map attribute
#[derive(Debug, Clone)]
pub enum Elem {
    /// Every element has the same primitive schema
    Element(Box<Schema>),
    /// Every element is a nested block of attributes
    Block(Attributes),
}

/// Schema of a single attribute
#[derive(Clone)]
pub struct Schema {
    pub ty: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    pub validate: Option<ValidateFn>,
    pub diff_suppress: Option<DiffSuppressFn>,
    pub conflicts_with: Vec<&'static str>,
    pub elem: Option<Elem>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("ty", &self.ty)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("default", &self.default)
            .field("max_items", &self.max_items)
            .field("elem", &self.elem)
            .finish_non_exhaustive()
    }
}

impl Schema {
    pub fn new(ty: AttributeType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            max_items: None,
            min_items: None,
            validate: None,
            diff_suppress: None,
            conflicts_with: Vec::new(),
            elem: None,
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeType::String)
    }

    pub fn bool() -> Self {
        Self::new(AttributeType::Bool)
    }

    pub fn int() -> Self {
        Self::new(AttributeType::Int)
    }

    pub fn float() -> Self {
        Self::new(AttributeType::Float)
    }

    /// A map of strings
    pub fn string_map() -> Self {
        Self::new(AttributeType::Map).elem(Elem::Element(Box::new(Self::string())))
    }

    pub fn list_of(element: Schema) -> Self {
        Self::new(AttributeType::List).elem(Elem::Element(Box::new(element)))
    }

    pub fn set_of(element: Schema) -> Self {
        Self::new(AttributeType::Set).elem(Elem::Element(Box::new(element)))
    }

    /// An ordered list of nested blocks
    pub fn block_list(attributes: Attributes) -> Self {
        Self::new(AttributeType::List).elem(Elem::Block(attributes))
    }

    /// An unordered set of nested blocks
    pub fn block_set(attributes: Attributes) -> Self {
        Self::new(AttributeType::Set).elem(Elem::Block(attributes))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn validate<F>(self, f: F) -> Self
    where
        F: Fn(&Value, &str) -> Diagnostics + Send + Sync + 'static,
    {
        self.with_validator(Arc::new(f))
    }

    pub fn with_validator(mut self, f: ValidateFn) -> Self {
        self.validate = Some(f);
        self
    }

    pub fn diff_suppress<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.diff_suppress = Some(Arc::new(f));
        self
    }

    pub fn conflicts_with(mut self, others: &[&'static str]) -> Self {
        self.conflicts_with.extend_from_slice(others);
        self
    }

    pub fn elem(mut self, elem: Elem) -> Self {
        self.elem = Some(elem);
        self
    }

    /// Computed attributes that cannot be configured
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    fn block(&self) -> Option<&Attributes> {
        match &self.elem {
            Some(Elem::Block(attrs)) => Some(attrs),
            _ => None,
        }
    }
}

/// Build an [`Attributes`] map from `(name, schema)` pairs
pub fn block<const N: usize>(attributes: [(&str, Schema); N]) -> Attributes {
    attributes
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect()
}

/// Suppress diffs that differ only in letter case
pub fn suppress_case_difference(_key: &str, old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(old), Some(new)) => old.eq_ignore_ascii_case(new),
        _ => false,
    }
}

/// Suppress diffs between equivalent spellings of an Azure location
pub fn suppress_location_difference(_key: &str, old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(old), Some(new)) => {
            super::helpers::normalize_location(old) == super::helpers::normalize_location(new)
        }
        _ => false,
    }
}

// ============================================================================
// Resource schema
// ============================================================================

/// Schema of a whole resource
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub name: &'static str,
    pub attributes: Attributes,
    pub timeouts: TimeoutsConfig,
}

impl ResourceSchema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Attributes::new(),
            timeouts: TimeoutsConfig::default(),
        }
    }

    pub fn attribute(mut self, name: &str, schema: Schema) -> Self {
        self.attributes.insert(name.to_string(), schema);
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutsConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check a configuration object against this schema
    pub fn validate(&self, config: &Map<String, Value>) -> Diagnostics {
        let mut diags = Diagnostics::new();
        validate_block(&self.attributes, config, "", &mut diags);
        diags
    }

    /// Fill in default values, including inside nested blocks
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        apply_block_defaults(&self.attributes, config);
    }

    /// Compare prior state with desired configuration
    pub fn diff(&self, state: &Map<String, Value>, config: &Map<String, Value>) -> ResourceDiff {
        let mut changes = Vec::new();

        for (key, schema) in &self.attributes {
            if schema.is_computed_only() {
                continue;
            }

            let old = state.get(key).unwrap_or(&Value::Null);
            let new = config.get(key).unwrap_or(&Value::Null);
            if schema.computed && new.is_null() {
                continue;
            }

            diff_attribute(key, schema, old, new, false, &mut changes);
        }

        ResourceDiff { changes }
    }

    /// Find the schema for a dotted attribute path; list indices are skipped
    pub fn attribute_at(&self, path: &str) -> Option<&Schema> {
        let mut attrs = Some(&self.attributes);
        let mut found = None;

        for segment in path.split('.') {
            if segment.parse::<usize>().is_ok() {
                continue;
            }
            let schema = attrs?.get(segment)?;
            found = Some(schema);
            attrs = schema.block();
        }

        found
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn validate_block(attrs: &Attributes, obj: &Map<String, Value>, prefix: &str, diags: &mut Diagnostics) {
    for key in obj.keys() {
        if !attrs.contains_key(key) {
            diags.push_error(format!("{:?}: unsupported argument", join_path(prefix, key)));
        }
    }

    for (key, schema) in attrs {
        let path = join_path(prefix, key);
        let value = match obj.get(key) {
            Some(Value::Null) | None => None,
            Some(Value::Array(items)) if items.is_empty() && schema.required => None,
            Some(v) => Some(v),
        };

        let value = match value {
            Some(v) => v,
            None => {
                if schema.required {
                    diags.push_error(format!("{:?}: required field is not set", path));
                }
                continue;
            }
        };

        if schema.is_computed_only() {
            diags.push_error(format!("{:?}: computed attributes cannot be set", path));
            continue;
        }

        if !schema.ty.matches(value) {
            diags.push_error(format!("{:?}: expected type {}", path, schema.ty));
            continue;
        }

        for other in &schema.conflicts_with {
            if obj.get(*other).map_or(false, |v| !is_unset(v)) {
                diags.push_error(format!("{:?}: conflicts with {}", path, other));
            }
        }

        if let Value::Array(items) = value {
            if let Some(max) = schema.max_items {
                if items.len() > max {
                    diags.push_error(format!(
                        "{:?}: attribute supports {} item maximum, config has {} declared",
                        path,
                        max,
                        items.len()
                    ));
                }
            }
            if let Some(min) = schema.min_items {
                if items.len() < min {
                    diags.push_error(format!(
                        "{:?}: attribute supports {} item minimum, config has {} declared",
                        path,
                        min,
                        items.len()
                    ));
                }
            }

            for (idx, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}", path, idx);
                match &schema.elem {
                    Some(Elem::Block(sub)) => match item.as_object() {
                        Some(block) => validate_block(sub, block, &item_path, diags),
                        None => diags.push_error(format!("{:?}: expected a block", item_path)),
                    },
                    Some(Elem::Element(inner)) => validate_element(inner, item, &item_path, diags),
                    None => {}
                }
            }
        }

        if let (Value::Object(entries), Some(Elem::Element(inner))) = (value, &schema.elem) {
            for (k, v) in entries {
                validate_element(inner, v, &format!("{}.{}", path, k), diags);
            }
        }

        if let Some(f) = &schema.validate {
            diags.extend(f(value, &path));
        }
    }
}

fn validate_element(schema: &Schema, value: &Value, path: &str, diags: &mut Diagnostics) {
    if !schema.ty.matches(value) {
        diags.push_error(format!("{:?}: expected type {}", path, schema.ty));
        return;
    }
    if let Some(f) = &schema.validate {
        diags.extend(f(value, path));
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn apply_block_defaults(attrs: &Attributes, obj: &mut Map<String, Value>) {
    for (key, schema) in attrs {
        match obj.get_mut(key) {
            Some(Value::Array(items)) => {
                if let Some(sub) = schema.block() {
                    for item in items.iter_mut() {
                        if let Value::Object(block) = item {
                            apply_block_defaults(sub, block);
                        }
                    }
                }
            }
            Some(Value::Null) | None => {
                if let Some(default) = &schema.default {
                    obj.insert(key.clone(), default.clone());
                }
            }
            Some(_) => {}
        }
    }
}

// ============================================================================
// Equality
// ============================================================================

/// The zero value of every type: null, false, 0, "", [] and {}
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Compare two values under `schema`, honouring diff suppression and
/// treating a missing value as its zero value
pub fn values_equal(schema: Option<&Schema>, key: &str, old: &Value, new: &Value) -> bool {
    if let Some(suppress) = schema.and_then(|s| s.diff_suppress.as_ref()) {
        if suppress(key, old, new) {
            return true;
        }
    }

    if is_zero(old) && is_zero(new) {
        return true;
    }

    let schema = match schema {
        Some(s) => s,
        None => return old == new,
    };

    match (schema.ty, &schema.elem) {
        (AttributeType::Set, elem) => set_equal(elem.as_ref(), old, new),
        (AttributeType::List, Some(elem)) => {
            let (old, new) = (as_slice(old), as_slice(new));
            old.len() == new.len()
                && old
                    .iter()
                    .zip(new)
                    .all(|(o, n)| element_equal(elem, key, o, n))
        }
        (AttributeType::Float, _) | (AttributeType::Int, _) => match (old.as_f64(), new.as_f64()) {
            (Some(o), Some(n)) => o == n,
            _ => false,
        },
        (AttributeType::Map, _) => {
            let (old, new) = (as_object(old), as_object(new));
            let keys: HashSet<&String> = old.keys().chain(new.keys()).collect();
            keys.into_iter().all(|k| {
                let o = old.get(k).unwrap_or(&Value::Null);
                let n = new.get(k).unwrap_or(&Value::Null);
                (is_zero(o) && is_zero(n)) || o == n
            })
        }
        _ => old == new,
    }
}

fn element_equal(elem: &Elem, key: &str, old: &Value, new: &Value) -> bool {
    match elem {
        Elem::Element(inner) => values_equal(Some(inner), key, old, new),
        Elem::Block(attrs) => blocks_equal(attrs, old, new),
    }
}

fn blocks_equal(attrs: &Attributes, old: &Value, new: &Value) -> bool {
    let (old, new) = (as_object(old), as_object(new));
    attrs.iter().all(|(key, schema)| {
        let o = old.get(key).unwrap_or(&Value::Null);
        let n = new.get(key).unwrap_or(&Value::Null);
        (schema.computed && n.is_null()) || values_equal(Some(schema), key, o, n)
    })
}

fn set_equal(elem: Option<&Elem>, old: &Value, new: &Value) -> bool {
    let mut old: Vec<String> = as_slice(old).iter().map(|v| canonical(elem, v)).collect();
    let mut new: Vec<String> = as_slice(new).iter().map(|v| canonical(elem, v)).collect();
    old.sort();
    new.sort();
    old == new
}

/// Render a set element in a form that ignores ordering and zero values
fn canonical(elem: Option<&Elem>, value: &Value) -> String {
    normalize(elem, value).to_string()
}

fn normalize(elem: Option<&Elem>, value: &Value) -> Value {
    match (elem, value) {
        (Some(Elem::Block(attrs)), Value::Object(map)) => {
            let mut out = Map::new();
            for (key, v) in map {
                if is_zero(v) {
                    continue;
                }
                let schema = attrs.get(key);
                let normalized = match schema {
                    Some(s) if s.ty == AttributeType::Set => {
                        let mut items: Vec<Value> =
                            as_slice(v).iter().map(|i| normalize(s.elem.as_ref(), i)).collect();
                        items.sort_by_key(|i| i.to_string());
                        Value::Array(items)
                    }
                    Some(s) => normalize(s.elem.as_ref(), v),
                    None => v.clone(),
                };
                out.insert(key.clone(), normalized);
            }
            Value::Object(out)
        }
        (Some(Elem::Block(_)), Value::Array(items)) | (Some(Elem::Element(_)), Value::Array(items)) => {
            Value::Array(items.iter().map(|i| normalize(elem, i)).collect())
        }
        _ => value.clone(),
    }
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

// ============================================================================
// Diff
// ============================================================================

/// One attribute whose value will change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub path: String,
    pub old: Value,
    pub new: Value,
    pub force_new: bool,
    pub sensitive: bool,
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.force_new { " (forces replacement)" } else { "" };
        if self.sensitive {
            write!(f, "~ {}: (sensitive value){}", self.path, marker)
        } else {
            write!(f, "~ {}: {} => {}{}", self.path, self.old, self.new, marker)
        }
    }
}

/// Every attribute change between state and config
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceDiff {
    pub changes: Vec<AttributeChange>,
}

impl ResourceDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when any changed attribute cannot be updated in place
    pub fn requires_replace(&self) -> bool {
        self.changes.iter().any(|c| c.force_new)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }

    pub fn replace_paths(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.force_new)
            .map(|c| c.path.as_str())
            .collect()
    }
}

impl fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{}", change)?;
        }
        Ok(())
    }
}

fn diff_attribute(
    path: &str,
    schema: &Schema,
    old: &Value,
    new: &Value,
    parent_force_new: bool,
    changes: &mut Vec<AttributeChange>,
) {
    if values_equal(Some(schema), path, old, new) {
        return;
    }

    let force_new = parent_force_new || schema.force_new;
    let before = changes.len();

    if let (AttributeType::List, Some(attrs)) = (schema.ty, schema.block()) {
        let (old_items, new_items) = (as_slice(old), as_slice(new));
        let empty = Value::Object(Map::new());
        for idx in 0..old_items.len().max(new_items.len()) {
            let o = as_object(old_items.get(idx).unwrap_or(&empty));
            let n = as_object(new_items.get(idx).unwrap_or(&empty));
            for (key, sub) in attrs {
                let ov = o.get(key).unwrap_or(&Value::Null);
                let nv = n.get(key).unwrap_or(&Value::Null);
                if sub.is_computed_only() || (sub.computed && nv.is_null()) {
                    continue;
                }
                let sub_path = format!("{}.{}.{}", path, idx, key);
                diff_attribute(&sub_path, sub, ov, nv, force_new, changes);
            }
        }
    }

    if changes.len() == before {
        changes.push(AttributeChange {
            path: path.to_string(),
            old: old.clone(),
            new: new.clone(),
            force_new,
            sensitive: schema.sensitive,
        });
    }
}

// ============================================================================
// Resource data
// ============================================================================

/// Look up a dotted path such as `os_disk.0.caching` in an object
pub fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Flat view of a resource during one operation
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<ResourceSchema>,
    id: String,
    state: Map<String, Value>,
    config: Option<Map<String, Value>>,
    set: Map<String, Value>,
    new_resource: bool,
}

impl ResourceData {
    /// Data for a resource that does not exist yet
    pub fn new(schema: Arc<ResourceSchema>, mut config: Map<String, Value>) -> Self {
        schema.apply_defaults(&mut config);
        Self {
            schema,
            id: String::new(),
            state: Map::new(),
            config: Some(config),
            set: Map::new(),
            new_resource: true,
        }
    }

    /// Data for an existing resource with only its recorded state
    pub fn from_state(
        schema: Arc<ResourceSchema>,
        id: impl Into<String>,
        state: Map<String, Value>,
    ) -> Self {
        Self {
            schema,
            id: id.into(),
            state,
            config: None,
            set: Map::new(),
            new_resource: false,
        }
    }

    /// Attach the desired configuration; defaults are filled in
    pub fn with_config(mut self, mut config: Map<String, Value>) -> Self {
        self.schema.apply_defaults(&mut config);
        self.config = Some(config);
        self
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    /// The raw configured value at `path`, ignoring state and read results
    pub fn config_value(&self, path: &str) -> Option<&Value> {
        self.config.as_ref().and_then(|c| lookup(c, path))
    }

    /// The raw prior-state value at `path`
    pub fn state_value(&self, path: &str) -> Option<&Value> {
        lookup(&self.state, path)
    }

    /// Value at `path`; values set by read win over config, which wins over state.
    ///
    /// With a config attached, an attribute missing from it reads as null, so
    /// removing an attribute is never answered with its prior value. Only
    /// computed attributes fall back to state.
    pub fn get(&self, path: &str) -> Value {
        let top = path.split('.').next().unwrap_or_default();

        let layer = if self.set.contains_key(top) {
            &self.set
        } else if let Some(config) = &self.config {
            if config.get(top).map_or(false, |v| !v.is_null()) {
                config
            } else if self.schema.attribute_at(top).map_or(false, |s| s.computed) {
                &self.state
            } else {
                return Value::Null;
            }
        } else {
            &self.state
        };

        lookup(layer, path).cloned().unwrap_or(Value::Null)
    }

    /// Value at `path` when it is set to something other than its zero value
    pub fn get_ok(&self, path: &str) -> Option<Value> {
        let value = self.get(path);
        if is_zero(&value) {
            None
        } else {
            Some(value)
        }
    }

    pub fn get_str(&self, path: &str) -> String {
        self.get(path).as_str().unwrap_or_default().to_string()
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).as_bool().unwrap_or(false)
    }

    pub fn get_i64(&self, path: &str) -> i64 {
        self.get(path).as_i64().unwrap_or(0)
    }

    pub fn get_f64(&self, path: &str) -> f64 {
        self.get(path).as_f64().unwrap_or(0.0)
    }

    pub fn get_list(&self, path: &str) -> Vec<Value> {
        match self.get(path) {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    pub fn get_map(&self, path: &str) -> Map<String, Value> {
        match self.get(path) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Whether the configured value at `path` differs from prior state
    pub fn has_change(&self, path: &str) -> bool {
        let config = match &self.config {
            Some(c) => c,
            None => return false,
        };

        let schema = self.schema.attribute_at(path);
        let old = lookup(&self.state, path).unwrap_or(&Value::Null);
        let new = lookup(config, path).unwrap_or(&Value::Null);

        if schema.map_or(false, |s| s.computed && new.is_null()) {
            return false;
        }

        !values_equal(schema, path, old, new)
    }

    pub fn has_changes(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.has_change(p))
    }

    /// Record a value read from the remote resource
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.set.insert(key.to_string(), value.into());
    }

    /// Snapshot of every attribute as it stands now
    pub fn attributes(&self) -> Map<String, Value> {
        let mut merged = self.state.clone();
        if let Some(config) = &self.config {
            for (k, v) in config {
                merged.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &self.set {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Final state after the operation; empty once the ID has been cleared
    pub fn into_state(self) -> Map<String, Value> {
        if self.id.is_empty() {
            return Map::new();
        }
        let mut attributes = self.attributes();
        attributes.insert("id".to_string(), Value::String(self.id));
        attributes
    }
}

// ============================================================================
// Raw block access
// ============================================================================

/// Typed accessors over one nested block of a configuration
pub trait BlockExt {
    fn get_str(&self, key: &str) -> String;
    fn get_bool(&self, key: &str) -> bool;
    fn get_i64(&self, key: &str) -> i64;
    fn get_f64(&self, key: &str) -> f64;
    fn get_list(&self, key: &str) -> Vec<Value>;
    fn get_string_list(&self, key: &str) -> Vec<String>;
    fn get_object(&self, key: &str) -> Map<String, Value>;
}

impl BlockExt for Map<String, Value> {
    fn get_str(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    fn get_f64(&self, key: &str) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn get_list(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    fn get_object(&self, key: &str) -> Map<String, Value> {
        match self.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// The first element of a single-item block list
pub fn first_block(items: &[Value]) -> Option<&Map<String, Value>> {
    items.first().and_then(Value::as_object)
}
