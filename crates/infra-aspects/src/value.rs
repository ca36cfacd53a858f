//! opaque property values
//!
//! Node properties are carried through the engine without being interpreted. Only compliance
//! checks look inside them, by handing them to the hcl evaluator as the `self` variable.
//!
//! The model contains
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map", where the key is of type string)
//!
//! Integers that do not fit into an i64 are kept as decimals.
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(indexmap::IndexMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Object(Default::default())
    }
}

impl Value {
    pub fn as_object(&self) -> Option<&indexmap::IndexMap<String, Value>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Lookup of a direct member when this value is an object
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        // every hcl number is representable as f64, possibly with precision loss
        value.as_f64().map(Value::Decimal).unwrap_or(Value::Null)
    }
}

/// An expression that still contains unresolved parts (variables, function calls, ...)
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("expression is not a literal value")]
pub struct UnresolvedExpression;

impl TryFrom<hcl::Expression> for Value {
    type Error = UnresolvedExpression;

    fn try_from(value: hcl::Expression) -> Result<Self, Self::Error> {
        use hcl::Expression;

        Ok(match value {
            Expression::Null => Value::Null,
            Expression::Bool(bool) => bool.into(),
            Expression::Number(num) => num.into(),
            Expression::String(s) => s.into(),
            Expression::Array(array) => Value::Array(
                array
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Expression::Object(object) => Value::Object(
                object
                    .into_iter()
                    .map(|(k, v)| Ok((object_key(k)?, Value::try_from(v)?)))
                    .collect::<Result<_, _>>()?,
            ),
            _ => return Err(UnresolvedExpression),
        })
    }
}

/// Quoted keys (`"cost-center" = ...`) are taken verbatim, without their quotes
fn object_key(key: hcl::ObjectKey) -> Result<String, UnresolvedExpression> {
    match key {
        hcl::ObjectKey::Identifier(ident) => Ok(ident.as_str().to_string()),
        hcl::ObjectKey::Expression(hcl::Expression::String(s)) => Ok(s),
        hcl::ObjectKey::Expression(hcl::Expression::Variable(var)) => {
            Ok(var.as_str().to_string())
        }
        _ => Err(UnresolvedExpression),
    }
}

impl From<&Value> for hcl::Value {
    fn from(value: &Value) -> hcl::Value {
        match value {
            Value::Null => hcl::Value::Null,
            Value::Boolean(b) => hcl::Value::Bool(*b),
            Value::Integer(i) => hcl::Value::Number((*i).into()),
            Value::Decimal(d) => hcl::Number::from_f64(*d)
                .map(hcl::Value::Number)
                .unwrap_or(hcl::Value::Null),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::Array(a) => hcl::Value::Array(a.iter().map(Into::into).collect()),
            Value::Object(o) => {
                hcl::Value::Object(o.iter().map(|(k, v)| (k.clone(), v.into())).collect())
            }
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn literal_expressions_convert() {
        let expr: hcl_edit::expr::Expression = r#"{ encrypted = true, retention = [7, 1.5, "x"] }"#
            .parse()
            .expect("valid expression");
        let value = Value::try_from(hcl::Expression::from(expr)).expect("literal");

        assert_eq!(value.get("encrypted"), Some(&Value::Boolean(true)));
        assert_eq!(
            value.get("retention"),
            Some(&Value::Array(vec![
                Value::Integer(7),
                Value::Decimal(1.5),
                Value::String("x".into())
            ]))
        );
    }

    #[test]
    fn variables_are_unresolved() {
        let expr = hcl::Expression::Variable(hcl::Variable::unchecked("foo"));
        assert_eq!(Value::try_from(expr), Err(UnresolvedExpression));
    }
}
