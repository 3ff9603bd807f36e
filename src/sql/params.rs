//! Convert serde_json::Value to values that sqlx can bind.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A query parameter. Every parameter goes over the wire as text and the `$n::type` cast on its
/// placeholder converts it, so a cached statement sees the same parameter types on every execution.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    /// Text form of a JSON value: strings as-is, numbers and booleans as literals, arrays and objects serialized.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            other => PgBindValue::Text(other.to_string()),
        }
    }

    /// Text form for a column of `pg_type`. json and jsonb columns store the value itself,
    /// so a JSON string stays a string instead of being parsed as a document.
    pub fn for_column(v: &Value, pg_type: Option<&str>) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            _ if pg_type.is_some_and(is_json_type) => PgBindValue::Text(v.to_string()),
            _ => Self::from_json(v),
        }
    }
}

pub(crate) fn is_json_type(pg_type: &str) -> bool {
    matches!(pg_type, "json" | "jsonb")
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
        }
    }
}

impl Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        <str as Type<Postgres>>::type_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> PgBindValue {
        PgBindValue::Text(s.into())
    }

    #[test]
    fn scalars_bind_as_their_literal_text() {
        assert_eq!(PgBindValue::from_json(&json!(null)), PgBindValue::Null);
        assert_eq!(PgBindValue::from_json(&json!(true)), text("true"));
        assert_eq!(PgBindValue::from_json(&json!(42)), text("42"));
        assert_eq!(PgBindValue::from_json(&json!(91.5)), text("91.5"));
        assert_eq!(PgBindValue::from_json(&json!("88.25")), text("88.25"));
        assert_eq!(PgBindValue::from_json(&json!("beginner")), text("beginner"));
    }

    #[test]
    fn integer_and_float_share_one_wire_type() {
        let a = PgBindValue::from_json(&json!(90));
        let b = PgBindValue::from_json(&json!(91.5));
        assert_eq!(a.produces(), b.produces());
        assert_eq!(<PgBindValue as Type<Postgres>>::type_info(), <str as Type<Postgres>>::type_info());
    }

    #[test]
    fn json_columns_keep_strings_as_strings() {
        assert_eq!(PgBindValue::for_column(&json!("[1,2]"), Some("jsonb")), text("\"[1,2]\""));
        assert_eq!(PgBindValue::for_column(&json!(["3", "4"]), Some("jsonb")), text("[\"3\",\"4\"]"));
        assert_eq!(PgBindValue::for_column(&json!(5), Some("json")), text("5"));
        assert_eq!(PgBindValue::for_column(&json!(null), Some("jsonb")), PgBindValue::Null);
        assert_eq!(PgBindValue::for_column(&json!("[1,2]"), Some("text")), text("[1,2]"));
    }
}
