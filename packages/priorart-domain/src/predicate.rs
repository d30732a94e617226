use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
	TextAny,
	TextAll,
	TextPhrase,
	Eq,
	Neq,
	Gt,
	Gte,
	Lt,
	Lte,
}
impl FieldOp {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::TextAny => "_text_any",
			Self::TextAll => "_text_all",
			Self::TextPhrase => "_text_phrase",
			Self::Eq => "_eq",
			Self::Neq => "_neq",
			Self::Gt => "_gt",
			Self::Gte => "_gte",
			Self::Lt => "_lt",
			Self::Lte => "_lte",
		}
	}
}

/// Boolean operator tree over named fields for the structured backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
	Field { op: FieldOp, field: String, value: Value },
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
	Not(Box<Predicate>),
}
impl Predicate {
	pub fn field(op: FieldOp, field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Field { op, field: field.into(), value: value.into() }
	}

	/// Renders the tree as `{"_op": {"field": value}}` / `{"_and": [...]}` JSON.
	pub fn to_json(&self) -> Value {
		match self {
			Self::Field { op, field, value } => {
				let mut inner = Map::new();

				inner.insert(field.clone(), value.clone());

				let mut outer = Map::new();

				outer.insert(op.as_str().to_string(), Value::Object(inner));

				Value::Object(outer)
			},
			Self::And(items) => serde_json::json!({
				"_and": items.iter().map(Self::to_json).collect::<Vec<_>>()
			}),
			Self::Or(items) => serde_json::json!({
				"_or": items.iter().map(Self::to_json).collect::<Vec<_>>()
			}),
			Self::Not(inner) => serde_json::json!({ "_not": inner.to_json() }),
		}
	}
}
