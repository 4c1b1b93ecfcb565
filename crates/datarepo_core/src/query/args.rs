//! Query arguments: positional values and `:name` bindings.

use rusqlite::types::Value;

/// One bound argument. Lists expand to one placeholder per element.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    List(Vec<Value>),
}

impl Arg {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn text(value: &str) -> Self {
        Self::Value(Value::Text(value.to_string()))
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Elements as a list; a single value becomes a one-element list.
    pub fn as_list(&self) -> Vec<Value> {
        match self {
            Self::Value(value) => vec![value.clone()],
            Self::List(values) => values.clone(),
        }
    }
}

/// Arguments for one invocation, in declaration order and/or by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Arg>,
    named: Vec<(String, Arg)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn push(mut self, arg: Arg) -> Self {
        self.positional.push(arg);
        self
    }

    /// Appends a positional text argument.
    pub fn text(self, value: &str) -> Self {
        self.push(Arg::text(value))
    }

    /// Appends a positional scalar argument.
    pub fn value(self, value: impl Into<Value>) -> Self {
        self.push(Arg::value(value))
    }

    /// Binds `:name`, replacing an earlier binding with the same name.
    pub fn bind(mut self, name: &str, arg: Arg) -> Self {
        self.named.retain(|(existing, _)| existing != name);
        self.named.push((name.to_string(), arg));
        self
    }

    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    pub fn named(&self, name: &str) -> Option<&Arg> {
        self.named
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, arg)| arg)
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
