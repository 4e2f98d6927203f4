//! Declarative tool descriptions.
//!
//! A [`ToolDescriptor`] is what the registry stores and what the reasoning
//! backend sees: a name, a one-paragraph description, and an ordered list of
//! [`ParamSpec`]s. Descriptors render to JSON Schema for argument validation
//! and to a plain-text listing for the system prompt, so both views are
//! always derived from the same source.

use crate::api::retry::RetryConfig;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// The JSON Schema `type` keyword for this parameter type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Parse a JSON Schema `type` keyword. Returns `None` for `"null"` and
    /// anything unrecognised.
    pub fn from_schema_type(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    /// Value filled in by the dispatcher when the caller omits an optional
    /// parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Everything the agent knows about a tool without invoking it.
///
/// Immutable once registered: the registry clones the descriptor at
/// registration time and never hands out a mutable reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Unique name within a registry.
    pub name: String,
    pub description: String,
    /// Declared parameters, in the order they are presented to the model.
    pub parameters: Vec<ParamSpec>,
    /// Per-tool execution timeout. `None` uses the dispatcher default.
    pub timeout: Option<Duration>,
    /// Repeated calls with identical arguments yield identical results, so a
    /// run may reuse an earlier successful result.
    pub idempotent: bool,
    /// Retries applied by the dispatcher on execution errors and timeouts.
    /// The default performs no retries and surfaces the first failure.
    pub retry: RetryConfig,
}

impl ToolDescriptor {
    /// Start building a descriptor.
    pub fn builder(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            descriptor: ToolDescriptor {
                name: name.into(),
                description: description.into(),
                parameters: Vec::new(),
                timeout: None,
                idempotent: false,
                retry: RetryConfig::default(),
            },
        }
    }

    /// Look up a declared parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Names of the required parameters, in declaration order.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    /// Render the parameters as a JSON Schema object.
    ///
    /// Undeclared properties are rejected.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.parameters {
            let mut prop = json!({
                "type": p.param_type.as_str(),
                "description": p.description,
            });
            if let Some(default) = &p.default {
                prop["default"] = default.clone();
            }
            properties.insert(p.name.clone(), prop);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_params().collect::<Vec<_>>(),
            "additionalProperties": false,
        })
    }

    /// Render the descriptor as a prompt listing entry:
    ///
    /// ```text
    /// - search: Search the web for up-to-date information.
    ///   - query (string, required): The search query.
    ///   - num_results (integer, optional, default 5): How many results to return.
    /// ```
    pub fn prompt_listing(&self) -> String {
        let mut out = format!("- {}: {}", self.name, self.description);
        for p in &self.parameters {
            let requirement = if p.required { "required" } else { "optional" };
            let default = p
                .default
                .as_ref()
                .map(|d| format!(", default {d}"))
                .unwrap_or_default();
            out.push_str(&format!(
                "\n  - {} ({}, {requirement}{default}): {}",
                p.name,
                p.param_type.as_str(),
                p.description
            ));
        }
        out
    }
}

/// Builder for [`ToolDescriptor`].
pub struct ToolDescriptorBuilder {
    descriptor: ToolDescriptor,
}

impl ToolDescriptorBuilder {
    /// Declare a required parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.descriptor.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        });
        self
    }

    /// Declare an optional parameter without a default.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.descriptor.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: None,
        });
        self
    }

    /// Declare an optional parameter that the dispatcher fills in with
    /// `default` when omitted.
    pub fn optional_with_default(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        self.descriptor.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: Some(default.into()),
        });
        self
    }

    /// Derive the parameter list from a type implementing
    /// `schemars::JsonSchema`, so the declared parameters and the tool's
    /// deserialization target cannot drift apart.
    pub fn parameters_for<T: schemars::JsonSchema>(mut self) -> Self {
        self.descriptor
            .parameters
            .extend(params_from_schema(&crate::json_schema_for::<T>()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout);
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.descriptor.idempotent = idempotent;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.descriptor.retry = retry;
        self
    }

    pub fn build(self) -> ToolDescriptor {
        self.descriptor
    }
}

/// Flatten the top-level `properties` of an object schema into
/// [`ParamSpec`]s. Nullable types (`["integer", "null"]`, as generated for
/// `Option<T>`) use their non-null member; properties with no recognisable
/// type fall back to `object`. A `null` default (as generated for
/// `#[serde(default)] Option<T>`) is treated as no default.
pub fn params_from_schema(schema: &Value) -> Vec<ParamSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| ParamSpec {
            name: name.clone(),
            param_type: schema_type(prop).unwrap_or(ParamType::Object),
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            required: required.contains(&name.as_str()),
            default: prop.get("default").filter(|d| !d.is_null()).cloned(),
        })
        .collect()
}

fn schema_type(prop: &Value) -> Option<ParamType> {
    match prop.get("type")? {
        Value::String(t) => ParamType::from_schema_type(t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find_map(ParamType::from_schema_type),
        _ => None,
    }
}
