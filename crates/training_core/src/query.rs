//! crates/training_core/src/query.rs
//!
//! A small, parameterized query language for list calls. Filters are built as
//! (field, operator, value) trees and only turned into the store's textual filter
//! syntax at the very edge, with every value quoted and escaped. The same tree can
//! be evaluated in-process, which is what the in-memory store does.

use serde_json::{Map, Value};

/// A typed literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Int(i64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        FilterValue::Text(value.clone())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Int(i64::from(value))
    }
}

impl FilterValue {
    fn render(&self) -> String {
        match self {
            FilterValue::Text(text) => {
                let mut out = String::with_capacity(text.len() + 2);
                out.push('\'');
                for c in text.chars() {
                    if c == '\'' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('\'');
                out
            }
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Int(n) => n.to_string(),
        }
    }

    fn equals(&self, value: &Value) -> bool {
        match (self, value) {
            (FilterValue::Text(t), Value::String(s)) => t == s,
            (FilterValue::Text(t), Value::Null) => t.is_empty(),
            (FilterValue::Bool(b), Value::Bool(v)) => b == v,
            (FilterValue::Bool(b), Value::Null) => !b,
            (FilterValue::Int(n), Value::Number(v)) => v.as_i64() == Some(*n),
            _ => false,
        }
    }
}

/// Comparison operators understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `~`, case-insensitive "contains".
    Like,
    /// `?=`, any element of a multi-valued field equals.
    AnyEq,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Like => "~",
            Op::AnyEq => "?=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: Op,
        value: FilterValue,
    },
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: Op, value: impl Into<FilterValue>) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, Op::Eq, value)
    }

    pub fn not_eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, Op::NotEq, value)
    }

    pub fn like(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, Op::Like, value)
    }

    pub fn any_eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, Op::AnyEq, value)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All(mut parts) => {
                parts.push(other);
                Filter::All(parts)
            }
            first => Filter::All(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Any(mut parts) => {
                parts.push(other);
                Filter::Any(parts)
            }
            first => Filter::Any(vec![first, other]),
        }
    }

    /// The store's textual form of this filter.
    pub fn render(&self) -> String {
        self.render_nested(false)
    }

    fn render_nested(&self, nested: bool) -> String {
        let (parts, joiner) = match self {
            Filter::Compare { field, op, value } => {
                return format!("{} {} {}", field, op.symbol(), value.render());
            }
            Filter::All(parts) => (parts, " && "),
            Filter::Any(parts) => (parts, " || "),
        };
        let body = parts
            .iter()
            .map(|p| p.render_nested(true))
            .collect::<Vec<_>>()
            .join(joiner);
        if nested && parts.len() > 1 {
            format!("({})", body)
        } else {
            body
        }
    }

    /// Evaluates the filter against a record's fields.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Filter::Compare { field, op, value } => {
                let actual = fields.get(field).unwrap_or(&Value::Null);
                match op {
                    Op::Eq => value.equals(actual),
                    Op::NotEq => !value.equals(actual),
                    Op::Like => match (value, actual) {
                        (FilterValue::Text(needle), Value::String(hay)) => {
                            hay.to_lowercase().contains(&needle.to_lowercase())
                        }
                        _ => false,
                    },
                    Op::AnyEq => match actual {
                        Value::Array(items) => items.iter().any(|item| value.equals(item)),
                        single => value.equals(single),
                    },
                }
            }
            Filter::All(parts) => parts.iter().all(|p| p.matches(fields)),
            Filter::Any(parts) => parts.iter().any(|p| p.matches(fields)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Parameters of a paged list call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub expand: Vec<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
            filter: None,
            sort: Vec::new(),
            expand: Vec::new(),
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            descending: false,
        });
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            descending: true,
        });
        self
    }

    /// Asks the store to inline-resolve a relation. Back-relations use the
    /// `collection(field)` form.
    pub fn expand(mut self, relation: impl Into<String>) -> Self {
        self.expand.push(relation.into());
        self
    }

    pub fn render_filter(&self) -> Option<String> {
        self.filter.as_ref().map(Filter::render)
    }

    pub fn render_sort(&self) -> Option<String> {
        if self.sort.is_empty() {
            return None;
        }
        Some(
            self.sort
                .iter()
                .map(|k| {
                    if k.descending {
                        format!("-{}", k.field)
                    } else {
                        k.field.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    pub fn render_expand(&self) -> Option<String> {
        if self.expand.is_empty() {
            None
        } else {
            Some(self.expand.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn quotes_in_values_cannot_escape_the_literal() {
        let filter = Filter::eq("session", "x' || id != '");
        assert_eq!(filter.render(), r"session = 'x\' || id != \''");

        let filter = Filter::eq("name", r"back\slash");
        assert_eq!(filter.render(), r"name = 'back\\slash'");
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let filter = Filter::eq("club", "c1").and(
            Filter::like("name", "squat").or(Filter::like("nameNO", "squat")),
        );
        assert_eq!(
            filter.render(),
            "club = 'c1' && (name ~ 'squat' || nameNO ~ 'squat')"
        );
    }

    #[test]
    fn like_is_case_insensitive_substring() {
        let record = fields(json!({ "name": "Barbell Squat", "nameNO": "Knebøy" }));
        assert!(Filter::like("name", "SQU").matches(&record));
        assert!(Filter::like("name", "x")
            .or(Filter::like("nameNO", "BØY"))
            .matches(&record));
        assert!(!Filter::like("name", "bench").matches(&record));
    }

    #[test]
    fn any_eq_checks_array_membership() {
        let record = fields(json!({ "members": ["u1", "u2"], "completed": false }));
        assert!(Filter::any_eq("members", "u2").matches(&record));
        assert!(!Filter::any_eq("members", "u3").matches(&record));
        assert!(Filter::eq("completed", false).matches(&record));
        assert!(Filter::not_eq("completed", true).matches(&record));
    }

    #[test]
    fn list_query_renders_sort_and_expand() {
        let query = ListQuery::new()
            .sort_desc("created")
            .sort_asc("name")
            .expand("exercises")
            .expand("user_sessions(session)");
        assert_eq!(query.render_sort().as_deref(), Some("-created,name"));
        assert_eq!(
            query.render_expand().as_deref(),
            Some("exercises,user_sessions(session)")
        );
        assert_eq!(query.render_filter(), None);
    }
}
