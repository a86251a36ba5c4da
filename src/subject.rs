//! Named field access over domain objects.
//!
//! The projection engine never inspects objects directly; it asks a [`Subject`] for fields by
//! name. JSON documents implement it out of the box, and domain types implement it with a
//! `match` over their field names.

use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared handle to a projectable object.
pub type SubjectRef = Arc<dyn Subject>;

/// One resolved field.
#[derive(Clone)]
pub enum Field {
    /// Plain JSON value.
    Value(Value),
    /// Nested object, projectable through a sub-entity.
    Subject(SubjectRef),
    /// Sequence of nested objects.
    Subjects(Vec<SubjectRef>),
}

impl Field {
    /// Flatten into JSON without any entity applied.
    pub fn into_value(self) -> Value {
        match self {
            Field::Value(v) => v,
            Field::Subject(s) => s.to_value(),
            Field::Subjects(list) => Value::Array(list.iter().map(|s| s.to_value()).collect()),
        }
    }

    /// Borrow the plain value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Value(value)
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Field::Subject(_) => f.write_str("Subject(<subject>)"),
            Field::Subjects(list) => write!(f, "Subjects(len={})", list.len()),
        }
    }
}

/// An object the projection engine can read fields from.
pub trait Subject: Send + Sync {
    /// Resolve a field by name; `None` when the object has no such field.
    fn field(&self, name: &str) -> Option<Field>;

    /// Raw JSON form, used when a nested subject is emitted without an entity.
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl Subject for Value {
    fn field(&self, name: &str) -> Option<Field> {
        self.as_object()?.get(name).cloned().map(Field::Value)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl Subject for Map<String, Value> {
    fn field(&self, name: &str) -> Option<Field> {
        self.get(name).cloned().map(Field::Value)
    }

    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }
}

/// Wrap any subject in a shared handle.
pub fn subject<S>(value: S) -> SubjectRef
where
    S: Subject + 'static,
{
    Arc::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Account {
        id: u64,
        owner: Value,
    }

    impl Subject for Account {
        fn field(&self, name: &str) -> Option<Field> {
            match name {
                "id" => Some(json!(self.id).into()),
                "owner" => Some(Field::Subject(subject(self.owner.clone()))),
                _ => None,
            }
        }
    }

    #[test]
    fn json_subject_reads_object_keys() {
        let doc = json!({"id": 1, "tags": ["a"]});
        assert_eq!(doc.field("id").and_then(|f| f.as_value().cloned()), Some(json!(1)));
        assert!(doc.field("missing").is_none());
        assert!(json!(5).field("id").is_none());
    }

    #[test]
    fn custom_subject_flattens_nested_values() {
        let account = Account { id: 9, owner: json!({"name": "ada"}) };
        let owner = account.field("owner").expect("owner field");
        assert_eq!(owner.into_value(), json!({"name": "ada"}));
        assert!(account.to_value().is_null());
    }
}
