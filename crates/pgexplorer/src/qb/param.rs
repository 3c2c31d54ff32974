//! Bind parameter storage with placeholder numbering.

use crate::value::BindValue;
use tokio_postgres::types::ToSql;

/// How a bound parameter is written into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// PostgreSQL positional placeholders: `$1, $2, ...`
    #[default]
    Dollar,
    /// Anonymous `?` placeholders, used for canonical and human-readable SQL.
    Question,
}

/// A collection of parameters collected while rendering a statement.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    params: Vec<BindValue>,
    style: Placeholder,
}

impl ParamList {
    /// Create a new empty parameter list using `$n` placeholders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(style: Placeholder) -> Self {
        Self {
            params: Vec::new(),
            style,
        }
    }

    pub fn style(&self) -> Placeholder {
        self.style
    }

    /// Add a parameter and return its 1-based index.
    pub fn push(&mut self, value: impl Into<BindValue>) -> usize {
        self.params.push(value.into());
        self.params.len()
    }

    /// Add a parameter and return the placeholder text that refers to it.
    pub fn bind(&mut self, value: impl Into<BindValue>) -> String {
        let idx = self.push(value);
        match self.style {
            Placeholder::Dollar => format!("${idx}"),
            Placeholder::Question => "?".to_string(),
        }
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn values(&self) -> &[BindValue] {
        &self.params
    }

    pub fn into_values(self) -> Vec<BindValue> {
        self.params
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_placeholders_are_numbered() {
        let mut params = ParamList::new();
        assert_eq!(params.bind("a"), "$1");
        assert_eq!(params.bind(BindValue::Null), "$2");
        assert_eq!(params.len(), 2);
        assert_eq!(params.as_refs().len(), 2);
    }

    #[test]
    fn question_placeholders_are_anonymous() {
        let mut params = ParamList::with_style(Placeholder::Question);
        assert_eq!(params.bind("a"), "?");
        assert_eq!(params.bind("b"), "?");
        assert_eq!(
            params.into_values(),
            vec![BindValue::text("a"), BindValue::text("b")]
        );
    }
}
