//! Tool descriptors and their typed parameter schemas.
//!
//! A [`ToolDescriptor`] is what a provider declares and what the model is
//! offered. Its [`ParameterSchema`] is a flat, typed field list: it is
//! converted to and from JSON Schema at the provider and model boundaries,
//! and it is the single source of truth for argument validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// Arguments of a tool call: a mapping of parameter name to value.
pub type Arguments = Map<String, Value>;

/// The JSON type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No type constraint was declared.
    Any,
}

impl ParameterType {
    /// Returns whether `value` is acceptable for this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn from_json_schema_type(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => name.parse().ok().filter(|ty| *ty != Self::Any),
            // `["string", "null"]` style nullable declarations.
            Value::Array(names) => {
                let mut types = names
                    .iter()
                    .filter(|name| name.as_str() != Some("null"))
                    .map(Self::from_json_schema_type);
                match (types.next(), types.next()) {
                    (Some(ty), None) => ty,
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ParameterField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Accepted values; empty means unrestricted.
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    /// JSON Schema of array elements, passed through to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterField {
    /// Creates a required field.
    pub fn required(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
            allowed_values: Vec::new(),
            items: None,
            default: None,
        }
    }

    /// Creates an optional field.
    pub fn optional(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Sets the field description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Restricts the field to the given values.
    pub fn with_allowed_values(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed_values = values.into_iter().collect();
        self
    }

    /// Sets the element schema of an array field.
    pub fn with_items(mut self, items: Value) -> Self {
        self.items = Some(items);
        self
    }

    /// Sets the value assumed when the argument is omitted.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn from_json_schema_property(name: &str, property: &Map<String, Value>, required: bool) -> Result<Self> {
        let kind = property
            .get("type")
            .and_then(ParameterType::from_json_schema_type)
            .unwrap_or(ParameterType::Any);

        let allowed_values = match property.get("enum") {
            None => Vec::new(),
            Some(Value::Array(values)) => values.clone(),
            Some(_) => {
                return Err(Error::malformed_response()
                    .with_message(format!("`enum` of property `{name}` must be an array")));
            }
        };

        Ok(Self {
            name: name.to_owned(),
            kind,
            required,
            description: property
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            allowed_values,
            items: property.get("items").cloned(),
            default: property.get("default").cloned(),
        })
    }

    fn to_json_schema_property(&self) -> Value {
        let mut property = Map::new();
        if self.kind != ParameterType::Any {
            property.insert("type".into(), json!(self.kind.as_ref()));
        }
        if !self.description.is_empty() {
            property.insert("description".into(), json!(self.description));
        }
        if !self.allowed_values.is_empty() {
            property.insert("enum".into(), Value::Array(self.allowed_values.clone()));
        }
        if let Some(items) = &self.items {
            property.insert("items".into(), items.clone());
        }
        if let Some(default) = &self.default {
            property.insert("default".into(), default.clone());
        }
        Value::Object(property)
    }
}

/// Typed field list describing the arguments of a tool.
///
/// Undeclared arguments are allowed unless the schema is closed, matching
/// JSON Schema's `additionalProperties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    fields: Vec<ParameterField>,
    #[serde(default = "allowed", skip_serializing_if = "is_allowed")]
    additional_properties: bool,
}

fn allowed() -> bool {
    true
}

fn is_allowed(additional_properties: &bool) -> bool {
    *additional_properties
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ParameterSchema {
    /// Creates a schema from a list of fields.
    pub fn new(fields: Vec<ParameterField>) -> Self {
        Self {
            fields,
            additional_properties: true,
        }
    }

    /// Rejects arguments that are not declared.
    pub fn closed(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Returns whether undeclared arguments are accepted.
    pub fn allows_additional(&self) -> bool {
        self.additional_properties
    }

    /// Adds a field to the schema.
    pub fn with_field(mut self, field: ParameterField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the declared fields in declaration order.
    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    /// Returns the field with the given name.
    pub fn field(&self, name: &str) -> Option<&ParameterField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks `arguments` against the declared fields.
    ///
    /// Required fields must be present and non-null, and declared values
    /// must match their type and allowed values. Optional fields may be
    /// `null`. Undeclared arguments pass through unless the schema is closed.
    pub fn validate(&self, arguments: &Arguments) -> Result<()> {
        for field in self.fields.iter().filter(|field| field.required) {
            match arguments.get(&field.name) {
                None | Some(Value::Null) => {
                    return Err(Error::validation()
                        .with_message(format!("missing required argument `{}`", field.name)));
                }
                Some(_) => {}
            }
        }

        for (name, value) in arguments {
            let Some(field) = self.field(name) else {
                if self.additional_properties {
                    continue;
                }
                return Err(
                    Error::validation().with_message(format!("unexpected argument `{name}`"))
                );
            };

            if value.is_null() && !field.required {
                continue;
            }

            if !field.kind.accepts(value) {
                return Err(Error::validation().with_message(format!(
                    "argument `{name}` must be of type {}",
                    field.kind
                )));
            }

            if !field.allowed_values.is_empty() && !field.allowed_values.contains(value) {
                return Err(Error::validation().with_message(format!(
                    "argument `{name}` must be one of {}",
                    Value::Array(field.allowed_values.clone())
                )));
            }
        }

        Ok(())
    }

    /// Parses a JSON Schema object (`type: object` with `properties` and
    /// `required`) into a typed field list.
    ///
    /// Properties without a single concrete `type` are accepted as
    /// [`ParameterType::Any`]; anything that is not an object schema is
    /// rejected as a malformed response.
    pub fn from_json_schema(schema: &Value) -> Result<Self> {
        let Some(schema) = schema.as_object() else {
            return Err(Error::malformed_response().with_message("input schema is not an object"));
        };

        if let Some(ty) = schema.get("type")
            && ty.as_str() != Some("object")
        {
            return Err(Error::malformed_response()
                .with_message(format!("input schema must have type `object`, got {ty}")));
        }

        let required: Vec<&str> = match schema.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|name| {
                    name.as_str().ok_or_else(|| {
                        Error::malformed_response()
                            .with_message("`required` must list property names")
                    })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(Error::malformed_response().with_message("`required` must be an array"));
            }
        };

        let properties = match schema.get("properties") {
            None => Map::new(),
            Some(Value::Object(properties)) => properties.clone(),
            Some(_) => {
                return Err(
                    Error::malformed_response().with_message("`properties` must be an object")
                );
            }
        };

        let mut fields = Vec::with_capacity(properties.len());
        for (name, property) in &properties {
            let Some(property) = property.as_object() else {
                return Err(Error::malformed_response()
                    .with_message(format!("property `{name}` is not an object")));
            };

            let required = required.contains(&name.as_str());
            fields.push(ParameterField::from_json_schema_property(name, property, required)?);
        }

        if let Some(missing) = required.iter().find(|name| !properties.contains_key(**name)) {
            return Err(Error::malformed_response()
                .with_message(format!("required property `{missing}` is not declared")));
        }

        let additional_properties = schema.get("additionalProperties") != Some(&Value::Bool(false));

        Ok(Self {
            fields,
            additional_properties,
        })
    }

    /// Renders the field list as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.to_json_schema_property()))
            .collect();

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if !self.additional_properties {
            schema["additionalProperties"] = Value::Bool(false);
        }
        schema
    }
}

/// A named, schema-typed operation exposed by a provider.
///
/// Immutable once registered; the registry owns every descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique across all registered providers.
    pub name: String,
    pub description: String,
    pub parameter_schema: ParameterSchema,
}

impl ToolDescriptor {
    /// Creates a descriptor with an empty parameter list.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: ParameterSchema::default(),
        }
    }

    /// Sets the parameter schema.
    pub fn with_parameters(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    /// Validates arguments against the declared parameters.
    pub fn validate(&self, arguments: &Arguments) -> Result<()> {
        self.parameter_schema.validate(arguments).map_err(|error| {
            let message = format!("{}: {}", self.name, error.message_or_kind());
            error.with_message(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ErrorKind;

    fn search_schema() -> ParameterSchema {
        ParameterSchema::default()
            .with_field(ParameterField::required("query", ParameterType::String))
            .with_field(ParameterField::optional("top_k", ParameterType::Integer))
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_valid_arguments() {
        let schema = search_schema();
        assert!(schema.validate(&args(json!({"query": "revenue"}))).is_ok());
        assert!(
            schema
                .validate(&args(json!({"query": "revenue", "top_k": 3})))
                .is_ok()
        );
        assert!(
            schema
                .validate(&args(json!({"query": "revenue", "top_k": null})))
                .is_ok()
        );
    }

    #[test]
    fn rejects_missing_required_argument() {
        let error = search_schema().validate(&args(json!({"top_k": 3}))).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValidationError);
        assert!(error.message_or_kind().contains("query"));
    }

    #[test]
    fn rejects_wrong_type() {
        let error = search_schema()
            .validate(&args(json!({"query": "x", "top_k": 1.5})))
            .unwrap_err();
        assert!(error.message_or_kind().contains("integer"));
    }

    #[test]
    fn undeclared_arguments_pass_unless_closed() {
        let open = ParameterSchema::default()
            .with_field(ParameterField::required("query", ParameterType::String));
        assert!(open.validate(&args(json!({"query": "x", "top_k": 5}))).is_ok());

        let error = open
            .closed()
            .validate(&args(json!({"query": "x", "top_k": 5})))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValidationError);
        assert!(error.message_or_kind().contains("top_k"));
    }

    #[test]
    fn json_schema_without_additional_properties_is_open() {
        let schema = ParameterSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        }))
        .unwrap();
        assert!(schema.allows_additional());
        assert!(schema.validate(&args(json!({"query": "x", "top_k": 5}))).is_ok());

        let closed = ParameterSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "additionalProperties": false
        }))
        .unwrap();
        assert!(!closed.allows_additional());
        assert_eq!(closed.to_json_schema()["additionalProperties"], false);
    }

    #[test]
    fn keeps_property_order_and_constraints() {
        let schema = ParameterSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "filename": {"type": "string", "default": "upload.txt"},
                "documents": {"type": "array", "items": {"type": "object"}},
                "mode": {"type": "string", "enum": ["append", "replace"]}
            },
            "required": ["session_id", "documents"]
        }))
        .unwrap();

        let names: Vec<_> = schema.fields().iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, ["session_id", "filename", "documents", "mode"]);
        assert_eq!(schema.field("filename").unwrap().default, Some(json!("upload.txt")));

        let rendered = schema.to_json_schema();
        assert_eq!(rendered["properties"]["documents"]["items"], json!({"type": "object"}));
        assert_eq!(rendered["properties"]["mode"]["enum"], json!(["append", "replace"]));
        let rendered_names: Vec<_> = rendered["properties"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(rendered_names, names);

        let arguments = json!({"session_id": "s", "documents": [], "mode": "merge"});
        let error = schema.validate(&args(arguments)).unwrap_err();
        assert!(error.message_or_kind().contains("mode"));
    }

    #[test]
    fn parses_json_schema() {
        let schema = ParameterSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "top_k": {"type": ["integer", "null"]},
                "filters": {"anyOf": [{"type": "object"}, {"type": "string"}]}
            },
            "required": ["query"]
        }))
        .unwrap();

        let query = schema.field("query").unwrap();
        assert!(query.required);
        assert_eq!(query.kind, ParameterType::String);
        assert_eq!(query.description, "Search query");
        assert_eq!(schema.field("top_k").unwrap().kind, ParameterType::Integer);
        assert_eq!(schema.field("filters").unwrap().kind, ParameterType::Any);
    }

    #[test]
    fn rejects_malformed_json_schema() {
        for malformed in [
            json!("string"),
            json!({"type": "array"}),
            json!({"properties": []}),
            json!({"properties": {"a": {"type": "string"}}, "required": ["b"]}),
            json!({"required": "a"}),
        ] {
            let error = ParameterSchema::from_json_schema(&malformed).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::MalformedResponse, "{malformed}");
        }
    }

    #[test]
    fn renders_json_schema() {
        let rendered = search_schema().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["query"]["type"], "string");
        assert_eq!(rendered["required"], json!(["query"]));

        let parsed = ParameterSchema::from_json_schema(&rendered).unwrap();
        assert_eq!(parsed.fields().len(), 2);
    }

    #[test]
    fn descriptor_validation_names_the_tool() {
        let tool = ToolDescriptor::new("search_documents", "Search").with_parameters(search_schema());
        let error = tool.validate(&Arguments::new()).unwrap_err();
        assert!(error.message_or_kind().starts_with("search_documents"));
    }
}
