//! Provider-neutral tool schemas.
//!
//! A [`ToolSchema`] is built once, either by hand or derived from a
//! `schemars::JsonSchema` argument struct, and then rendered per provider by
//! [`crate::tools::format`]. Field names, field types, `#[serde(default)]`
//! defaults and doc comments of the argument struct become the parameter
//! list; the struct's own doc comment becomes the tool description.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::SchemaError;

/// Nesting limit when walking a JSON schema; guards recursive types.
const MAX_SCHEMA_DEPTH: usize = 32;

/// Semantic type of a tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// Array with its element type, when known.
    Array(Option<Box<ParamType>>),
    /// Structured value with its own named fields (empty for free-form maps).
    Object(Vec<ToolParameter>),
}

impl ParamType {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array(_) => "array",
            ParamType::Object(_) => "object",
        }
    }

    /// Render as a JSON-schema fragment.
    pub fn to_json(&self) -> Value {
        match self {
            ParamType::Array(Some(items)) => json!({ "type": "array", "items": items.to_json() }),
            ParamType::Object(fields) => object_json(fields),
            other => json!({ "type": other.type_name() }),
        }
    }

    /// Whether this type (or an array element type) carries nested named fields.
    pub fn has_nested_fields(&self) -> bool {
        match self {
            ParamType::Object(fields) => !fields.is_empty(),
            ParamType::Array(Some(items)) => items.has_nested_fields(),
            _ => false,
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            description: None,
            allowed_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a default value. A parameter with a default is never required.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    fn to_json(&self) -> Value {
        let mut value = self.ty.to_json();
        if let Value::Object(map) = &mut value {
            if let Some(description) = &self.description {
                map.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(values) = &self.allowed_values {
                map.insert("enum".into(), Value::Array(values.clone()));
            }
            if let Some(default) = &self.default {
                map.insert("default".into(), default.clone());
            }
        }
        value
    }
}

/// A tool's name, description and ordered parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Derive a schema from an argument struct.
    ///
    /// ```
    /// use schemars::JsonSchema;
    /// use serde::Deserialize;
    /// use unified_llm::tools::ToolSchema;
    ///
    /// /// Get the current weather for a location.
    /// #[derive(Deserialize, JsonSchema)]
    /// struct WeatherArgs {
    ///     /// City name
    ///     location: String,
    ///     #[serde(default = "celsius")]
    ///     unit: String,
    /// }
    ///
    /// fn celsius() -> String {
    ///     "celsius".to_string()
    /// }
    ///
    /// let schema = ToolSchema::derive::<WeatherArgs>("get_weather").unwrap();
    /// assert_eq!(schema.description, "Get the current weather for a location.");
    /// assert!(schema.parameters[0].required);
    /// assert!(!schema.parameters[1].required);
    /// ```
    pub fn derive<Args: JsonSchema>(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        let root = serde_json::to_value(schemars::schema_for!(Args)).map_err(|e| {
            SchemaError::Invalid {
                tool: name.clone(),
                message: e.to_string(),
            }
        })?;
        let description = root
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self::from_json_schema(name, description, &root)
    }

    /// Build a schema from a raw JSON schema describing the argument object.
    pub fn from_json_schema(
        name: impl Into<String>,
        description: Option<String>,
        schema: &Value,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let walker = SchemaWalker {
            tool: &name,
            defs: schema
                .get("$defs")
                .or_else(|| schema.get("definitions"))
                .and_then(Value::as_object),
        };

        let root = walker.resolve(schema, 0)?;
        let parameters = match root.get("type").and_then(Value::as_str) {
            Some("object") | None => walker.properties(root, 0)?,
            // `()` arguments
            Some("null") => Vec::new(),
            Some(other) => {
                return Err(SchemaError::Invalid {
                    tool: name.clone(),
                    message: format!("arguments must be an object, found '{other}'"),
                })
            }
        };

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("Function {name}"));

        let schema = Self {
            name,
            description,
            parameters,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Check structural invariants: a usable name, unique parameter names,
    /// and no default on a required parameter.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let valid_name = !self.name.is_empty()
            && self.name.len() <= 64
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(self.invalid(format!(
                "name must be 1-64 characters of [a-zA-Z0-9_-], got '{}'",
                self.name
            )));
        }
        validate_fields(self, &self.parameters)
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// The neutral JSON-schema object for the argument list.
    pub fn parameters_json(&self) -> Value {
        object_json(&self.parameters)
    }

    fn invalid(&self, message: String) -> SchemaError {
        SchemaError::Invalid {
            tool: self.name.clone(),
            message,
        }
    }
}

fn validate_fields(schema: &ToolSchema, fields: &[ToolParameter]) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(schema.invalid(format!("duplicate parameter '{}'", field.name)));
        }
        if field.required && field.default.is_some() {
            return Err(schema.invalid(format!(
                "required parameter '{}' cannot have a default",
                field.name
            )));
        }
        if let ParamType::Object(nested) = &field.ty {
            validate_fields(schema, nested)?;
        }
    }
    Ok(())
}

fn object_json(fields: &[ToolParameter]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|p| (p.name.clone(), p.to_json()))
        .collect();
    let required: Vec<Value> = fields
        .iter()
        .filter(|p| p.required)
        .map(|p| Value::String(p.name.clone()))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// A parameter type as read from JSON schema, before it gets a name.
struct Shape {
    ty: ParamType,
    nullable: bool,
    allowed_values: Option<Vec<Value>>,
    description: Option<String>,
}

struct SchemaWalker<'a> {
    tool: &'a str,
    defs: Option<&'a Map<String, Value>>,
}

impl<'a> SchemaWalker<'a> {
    fn resolve(&self, schema: &'a Value, depth: usize) -> Result<&'a Value, SchemaError> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(self.invalid("schema nesting is too deep (recursive type?)"));
        }
        let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
            return Ok(schema);
        };
        let key = reference
            .strip_prefix("#/$defs/")
            .or_else(|| reference.strip_prefix("#/definitions/"))
            .ok_or_else(|| self.invalid(&format!("unsupported reference '{reference}'")))?;
        let target = self
            .defs
            .and_then(|defs| defs.get(key))
            .ok_or_else(|| self.invalid(&format!("unresolved reference '{reference}'")))?;
        self.resolve(target, depth + 1)
    }

    fn properties(&self, object: &'a Value, depth: usize) -> Result<Vec<ToolParameter>, SchemaError> {
        let Some(properties) = object.get("properties").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        let required: Vec<&str> = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        properties
            .iter()
            .map(|(name, property)| {
                let shape = self.shape(name, property, depth + 1)?;
                let default = property.get("default").cloned().filter(|d| !d.is_null());
                Ok(ToolParameter {
                    name: name.clone(),
                    required: required.contains(&name.as_str())
                        && !shape.nullable
                        && default.is_none(),
                    ty: shape.ty,
                    default,
                    description: shape.description,
                    allowed_values: shape.allowed_values,
                })
            })
            .collect()
    }

    fn shape(&self, param: &str, schema: &'a Value, depth: usize) -> Result<Shape, SchemaError> {
        let own_description = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let resolved = self.resolve(schema, depth)?;
        let mut shape = self.resolved_shape(param, resolved, depth)?;
        if own_description.is_some() {
            shape.description = own_description;
        }
        Ok(shape)
    }

    fn resolved_shape(&self, param: &str, schema: &'a Value, depth: usize) -> Result<Shape, SchemaError> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(self.invalid("schema nesting is too deep (recursive type?)"));
        }
        let object = match schema {
            Value::Object(map) if !map.is_empty() => map,
            // `true`, `{}`: any value, i.e. no type information
            _ => return Err(self.missing_type(param)),
        };
        let description = object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        for key in ["anyOf", "oneOf"] {
            if let Some(variants) = object.get(key).and_then(Value::as_array) {
                let mut shape = self.union_shape(param, variants, depth)?;
                shape.description = shape.description.or(description);
                return Ok(shape);
            }
        }
        if let Some([single]) = object.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            let mut shape = self.shape(param, single, depth + 1)?;
            shape.description = description.or(shape.description);
            return Ok(shape);
        }

        let (type_name, mut nullable) = match object.get("type") {
            Some(Value::String(name)) => (Some(name.as_str()), false),
            Some(Value::Array(names)) => {
                let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
                let concrete: Vec<&str> = names.iter().copied().filter(|n| *n != "null").collect();
                match concrete.as_slice() {
                    [single] => (Some(*single), names.contains(&"null")),
                    _ => return Err(self.invalid(&format!("parameter '{param}' mixes types {names:?}"))),
                }
            }
            _ => (None, false),
        };

        let mut allowed_values = None;
        if let Some(values) = object.get("enum").and_then(Value::as_array) {
            nullable |= values.iter().any(Value::is_null);
            allowed_values = Some(values.iter().filter(|v| !v.is_null()).cloned().collect::<Vec<_>>());
        } else if let Some(value) = object.get("const") {
            allowed_values = Some(vec![value.clone()]);
        }

        let type_name = match type_name {
            Some(name) => name,
            None => match (&allowed_values, object.contains_key("properties")) {
                (Some(values), _) => values.first().map(json_type_name).unwrap_or("string"),
                (None, true) => "object",
                (None, false) => return Err(self.missing_type(param)),
            },
        };

        let ty = match type_name {
            "string" => ParamType::String,
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => {
                let items = match object.get("items") {
                    Some(items) if items.as_object().is_some_and(|m| !m.is_empty()) => {
                        Some(Box::new(self.shape(param, items, depth + 1)?.ty))
                    }
                    _ => None,
                };
                ParamType::Array(items)
            }
            "object" => ParamType::Object(self.properties(schema, depth)?),
            "null" => return Err(self.missing_type(param)),
            other => return Err(self.invalid(&format!("parameter '{param}' has unknown type '{other}'"))),
        };

        Ok(Shape {
            ty,
            nullable,
            allowed_values,
            description,
        })
    }

    /// `anyOf`/`oneOf`: `Option<T>` (T plus null) or an enum of string constants.
    fn union_shape(&self, param: &str, variants: &'a [Value], depth: usize) -> Result<Shape, SchemaError> {
        let is_null = |v: &Value| v.get("type").and_then(Value::as_str) == Some("null");
        let nullable = variants.iter().any(is_null);
        let concrete: Vec<&Value> = variants.iter().filter(|v| !is_null(*v)).collect();

        if let [single] = concrete.as_slice() {
            let mut shape = self.shape(param, single, depth + 1)?;
            shape.nullable |= nullable;
            return Ok(shape);
        }

        let constants: Option<Vec<Value>> = concrete
            .iter()
            .map(|variant| {
                let variant = self.resolve(variant, depth + 1).ok()?;
                if let Some(value) = variant.get("const") {
                    return Some(vec![value.clone()]);
                }
                variant.get("enum").and_then(Value::as_array).cloned()
            })
            .collect::<Option<Vec<_>>>()
            .map(|groups| groups.into_iter().flatten().collect());

        match constants {
            Some(values) if !values.is_empty() && values.iter().all(Value::is_string) => Ok(Shape {
                ty: ParamType::String,
                nullable,
                allowed_values: Some(values),
                description: None,
            }),
            _ => Err(self.invalid(&format!(
                "parameter '{param}' is a union of several types, which tools cannot declare"
            ))),
        }
    }

    fn missing_type(&self, param: &str) -> SchemaError {
        SchemaError::MissingTypeAnnotation {
            tool: self.tool.to_string(),
            parameter: param.to_string(),
        }
    }

    fn invalid(&self, message: &str) -> SchemaError {
        SchemaError::Invalid {
            tool: self.tool.to_string(),
            message: message.to_string(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        _ => "string",
    }
}
