//! Tool descriptor translation.
//!
//! Tool hosts advertise their tools in several shapes. Every shape is
//! classified once, at ingestion, into a [`RawToolRecord`]; [`Catalog::translate`]
//! then turns the records into canonical [`ToolDescriptor`]s whose
//! `parameters` are always an object schema with a `required` list.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Keys under which a record may carry its input schema, in lookup order.
const SCHEMA_KEYS: [&str; 3] = ["inputSchema", "input_schema", "parameters"];

/// JSON Schema primitive type names, used to recognize shorthand schemas.
const TYPE_NAMES: [&str; 7] = [
    "string", "number", "integer", "boolean", "object", "array", "null",
];

/// Advertised name, description and schema for one callable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One tool record as received from a host, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawToolRecord {
    /// `{"name": ..., "description": ..., "inputSchema": ...}`
    Mapping(Map<String, Value>),
    /// `[name, record]`, or one entry of a catalog keyed by name.
    Pair(String, Value),
    /// A record already decoded into the MCP tool type.
    Typed(mcp::Tool),
    /// Anything else. Skipped during translation.
    Unrecognized(Value),
}

impl RawToolRecord {
    /// Classify a single record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_object(map),
            Value::Array(mut items) if items.len() == 2 && items[0].is_string() => {
                let record = items.pop().unwrap_or_default();
                match items.pop() {
                    Some(Value::String(name)) => Self::Pair(name, record),
                    _ => Self::Unrecognized(Value::Array(vec![record])),
                }
            }
            other => Self::Unrecognized(other),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Self {
        // OpenAI-style `{"type": "function", "function": {...}}` wrapper.
        if !map.contains_key("name") {
            if let Some(Value::Object(inner)) = map.remove("function") {
                return Self::from_object(inner);
            }
        }

        if !map.get("name").is_some_and(Value::is_string) {
            return Self::Unrecognized(Value::Object(map));
        }

        if map.contains_key("inputSchema") {
            let value = Value::Object(map);
            return match serde_json::from_value::<mcp::Tool>(value.clone()) {
                Ok(tool) => Self::Typed(tool),
                Err(_) => match value {
                    Value::Object(map) => Self::Mapping(map),
                    other => Self::Unrecognized(other),
                },
            };
        }

        Self::Mapping(map)
    }

    /// Classify every record of a whole catalog document.
    ///
    /// Accepts an array of records, a `{"tools": ...}` envelope holding
    /// either of the other shapes, or a mapping keyed by tool name.
    pub fn from_catalog(catalog: Value) -> Vec<Self> {
        match catalog {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            Value::Object(mut map) => match map.remove("tools") {
                Some(Value::Array(items)) => items.into_iter().map(Self::from_value).collect(),
                Some(Value::Object(keyed)) => {
                    if !map.is_empty() {
                        debug!(keys = ?map.keys().collect::<Vec<_>>(), "ignoring envelope fields");
                    }
                    keyed.into_iter().map(|(name, record)| Self::Pair(name, record)).collect()
                }
                Some(tools) => {
                    map.insert("tools".to_string(), tools);
                    map.into_iter().map(|(name, record)| Self::Pair(name, record)).collect()
                }
                None if map.get("name").is_some_and(Value::is_string) => {
                    vec![Self::from_object(map)]
                }
                None => map.into_iter().map(|(name, record)| Self::Pair(name, record)).collect(),
            },
            other => vec![Self::Unrecognized(other)],
        }
    }

    fn into_descriptor(self) -> Option<ToolDescriptor> {
        let (name, description, schema) = match self {
            Self::Mapping(map) => {
                let name = map.get("name").and_then(Value::as_str)?.to_string();
                (name, description_of(&map), schema_of(&map))
            }
            Self::Pair(name, record) => match record {
                Value::Object(map) => (name, description_of(&map), schema_of(&map)),
                Value::String(description) => (name, description, None),
                _ => (name, String::new(), None),
            },
            Self::Typed(tool) => (
                tool.name,
                tool.description.unwrap_or_default(),
                Some(tool.input_schema),
            ),
            Self::Unrecognized(value) => {
                warn!("skipping unrecognized tool record: {value}");
                return None;
            }
        };

        if name.trim().is_empty() {
            warn!("skipping tool record without a name");
            return None;
        }

        let parameters = normalize_schema(&name, schema);
        Some(ToolDescriptor {
            name,
            description,
            parameters,
        })
    }
}

impl From<Value> for RawToolRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<mcp::Tool> for RawToolRecord {
    fn from(tool: mcp::Tool) -> Self {
        Self::Typed(tool)
    }
}

fn description_of(map: &Map<String, Value>) -> String {
    map.get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn schema_of(map: &Map<String, Value>) -> Option<Value> {
    SCHEMA_KEYS.iter().find_map(|key| map.get(*key)).cloned()
}

/// The schema used when a tool declares none.
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// `{"a": "number", "b": "number"}` style parameter lists.
fn is_shorthand(map: &Map<String, Value>) -> bool {
    !map.contains_key("type")
        && !map.contains_key("properties")
        && map
            .values()
            .all(|v| v.as_str().is_some_and(|t| TYPE_NAMES.contains(&t)))
}

/// Resolve any advertised schema to an object schema with `properties` and
/// `required`.
fn normalize_schema(tool: &str, schema: Option<Value>) -> Value {
    let mut map = match schema {
        Some(Value::Object(map)) if !map.is_empty() => map,
        Some(other) if !is_falsy(&other) => {
            warn!(tool, "replacing non-object input schema: {other}");
            return empty_object_schema();
        }
        _ => return empty_object_schema(),
    };

    if is_shorthand(&map) {
        let properties: Map<String, Value> = map
            .into_iter()
            .map(|(field, kind)| (field, json!({ "type": kind })))
            .collect();
        map = Map::new();
        map.insert("properties".to_string(), Value::Object(properties));
    }

    match map.get("type") {
        None => {
            map.insert("type".to_string(), json!("object"));
        }
        Some(Value::String(kind)) if kind == "object" => {}
        Some(other) => {
            warn!(tool, "replacing input schema of type {other}");
            return empty_object_schema();
        }
    }

    if !map.get("properties").is_some_and(Value::is_object) {
        map.insert("properties".to_string(), json!({}));
    }
    if !map.get("required").is_some_and(Value::is_array) {
        map.insert("required".to_string(), json!([]));
    }

    Value::Object(map)
}

/// The descriptor set of one session, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
}

impl Catalog {
    /// Translate raw records. Unrecognized records are skipped; on
    /// duplicate names the later record wins.
    pub fn translate(records: impl IntoIterator<Item = RawToolRecord>) -> Self {
        let mut by_name = BTreeMap::new();
        for descriptor in records.into_iter().filter_map(RawToolRecord::into_descriptor) {
            if let Some(previous) = by_name.insert(descriptor.name.clone(), descriptor) {
                debug!(name = %previous.name, "duplicate tool name, later record replaces earlier");
            }
        }
        Self {
            tools: by_name.into_values().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
