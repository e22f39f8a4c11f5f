use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use super::scalar::Scalar;

/// SQL text plus its positional (`$n`) parameters.
///
/// The text is forwarded to the server untouched; values only ever travel as
/// bound parameters. `push`/`push_bind` compose a statement piece by piece,
/// numbering placeholders as they go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    text: String,
    params: Vec<Option<Scalar>>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[Option<Scalar>] {
        &self.params
    }

    /// Adds a value for a placeholder already present in the text.
    pub fn bind(mut self, value: impl Into<Scalar>) -> Self {
        self.params.push(Some(value.into()));
        self
    }

    pub fn bind_null(mut self) -> Self {
        self.params.push(None);
        self
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.text.push_str(sql);
        self
    }

    /// Appends the next `$n` placeholder and binds `value` to it.
    pub fn push_bind(&mut self, value: impl Into<Scalar>) -> &mut Self {
        self.params.push(Some(value.into()));
        self.text.push('$');
        self.text.push_str(&self.params.len().to_string());
        self
    }

    pub fn push_identifier(&mut self, identifier: &str) -> &mut Self {
        self.text.push_str(&escape_identifier(identifier));
        self
    }

    pub(crate) fn to_query(&self) -> Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.text);
        for param in &self.params {
            query = match param {
                Some(Scalar::Text(s)) => query.bind(s.as_str()),
                Some(Scalar::Int(i)) => query.bind(*i),
                Some(Scalar::Float(f)) => query.bind(*f),
                Some(Scalar::Bool(b)) => query.bind(*b),
                None => query.bind(None::<String>),
            };
        }
        query
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Statement::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Statement::new(text)
    }
}

/// Quotes `identifier` as a single SQL identifier token by doubling embedded
/// double quotes. Nothing else is altered; callers that cannot accept a NUL
/// byte check for it first (see [`has_nul`]).
pub fn escape_identifier(identifier: &str) -> String {
    let mut escaped = String::with_capacity(identifier.len() + 2);
    escaped.push('"');
    for c in identifier.chars() {
        match c {
            '"' => escaped.push_str("\"\""),
            c => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

/// Postgres rejects NUL anywhere in statement text.
pub fn has_nul(identifier: &str) -> bool {
    identifier.contains('\0')
}
