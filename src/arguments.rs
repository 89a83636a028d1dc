//! Declarative argument binding.
//!
//! Every endpoint lists the arguments it expects. Binding walks that list
//! against the request and produces one flat JSON map, or fails as a whole
//! when a required argument cannot be resolved.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ArgumentError, ServiceError};
use crate::request::Request;
use crate::response::ResponseParts;
use crate::url_info::UrlInfo;

/// Where an argument's value comes from.
///
/// In JSON configuration: `"data"`, `{"path": 0}`, `{"param": "limit"}`,
/// `{"field": "email"}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentSource {
    /// The whole parsed request body.
    Data,
    /// Path segment at this offset after the resource id; `0` is the
    /// identifier slot.
    Path(usize),
    /// Query string parameter.
    Param(String),
    /// Top-level field of an object body.
    Field(String),
}

/// Type coercion applied after the required-value check.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    #[default]
    None,
    Int,
}

/// One argument an endpoint expects.
///
/// `name` and `source` are optional so that a malformed definition loaded
/// from configuration can still be represented; binding skips it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentDef {
    pub name: Option<String>,
    pub source: Option<ArgumentSource>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, rename = "type")]
    pub coercion: Coercion,
    #[serde(default)]
    pub default_value: Option<Value>,
}

impl ArgumentDef {
    pub fn new(name: impl Into<String>, source: ArgumentSource) -> Self {
        Self { name: Some(name.into()), source: Some(source), ..Self::default() }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn int(mut self) -> Self {
        self.coercion = Coercion::Int;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Resolves every definition against the request.
///
/// Resolution order per argument: the source rule, then `default_value`,
/// then null. A null value for a non-optional argument fails the whole
/// binding. Binding has no side effects, so the same request always binds to
/// the same map.
pub fn bind_arguments(
    req: &Request,
    info: &UrlInfo,
    defs: &[ArgumentDef],
) -> Result<Map<String, Value>, ArgumentError> {
    let mut args = Map::new();

    for def in defs {
        let (Some(name), Some(source)) = (&def.name, &def.source) else {
            warn!(?def, "unable to fetch name or source for resource argument");
            continue;
        };

        let value = resolve(req, info, source)
            .or_else(|| def.default_value.clone())
            .unwrap_or(Value::Null);

        if value.is_null() && !def.optional {
            return Err(ArgumentError::Missing(name.clone()));
        }

        let value = match def.coercion {
            Coercion::None => value,
            Coercion::Int  => coerce_int(&value),
        };
        args.insert(name.clone(), value);
    }

    Ok(args)
}

fn resolve(req: &Request, info: &UrlInfo, source: &ArgumentSource) -> Option<Value> {
    match source {
        ArgumentSource::Data => req.body().cloned(),
        ArgumentSource::Path(offset) => {
            info.path_argument(*offset).map(|s| Value::String(s.to_owned()))
        }
        ArgumentSource::Param(name) => req.query(name).map(|s| Value::String(s.to_owned())),
        ArgumentSource::Field(name) => req
            .body()
            .and_then(|body| body.get(name))
            .filter(|v| !v.is_null())
            .cloned(),
    }
}

/// Integer coercion. Strings parse their leading integer (`"12abc"` is 12);
/// numbers truncate; anything unparsable becomes null.
fn coerce_int(value: &Value) -> Value {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
        }),
        Value::String(s) => leading_int(s),
        _ => None,
    };
    parsed.map_or(Value::Null, Value::from)
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

// ── Arguments ─────────────────────────────────────────────────────────────────

/// The bound arguments handed to an endpoint callback.
///
/// Besides the named values, the raw transport handles are reachable:
/// [`request`](Arguments::request) for the incoming request and
/// [`response`](Arguments::response) for headers the final response carries.
#[derive(Clone, Debug)]
pub struct Arguments {
    values: Map<String, Value>,
    request: Arc<Request>,
    response: ResponseParts,
}

impl Arguments {
    pub(crate) fn new(values: Map<String, Value>, request: Arc<Request>, response: ResponseParts) -> Self {
        Self { values, request, response }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Adds or replaces a value. Used by
    /// [`ServiceHooks::lookup_alter`](crate::ServiceHooks::lookup_alter).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Deserializes the whole argument map into a typed struct. Failures are
    /// `400` errors.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        Ok(serde_json::from_value(Value::Object(self.values.clone()))?)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &ResponseParts {
        &self.response
    }
}
