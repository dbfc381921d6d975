//! FILENAME: core/engine/src/cursor.rs
//! PURPOSE: The addressing context of every value access.
//! CONTEXT: A `Cursor` names the current entity (`index`), the current
//! sub-row of that entity (`subindex`, a selector value of `write_series`),
//! the selector column and the current column. It is a plain value: engine
//! operations receive it explicitly and nested resolution works on copies,
//! so no operation can leave another caller's position changed.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub index: Option<String>,
    pub subindex: Option<String>,
    pub selector: Option<String>,
    pub column: Option<String>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor on one entity.
    pub fn at(index: impl Into<String>) -> Self {
        Cursor {
            index: Some(index.into()),
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_subindex(mut self, subindex: Option<String>) -> Self {
        self.subindex = subindex;
        self
    }

    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn subindex(&self) -> Option<&str> {
        self.subindex.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Whether the cursor addresses a sub-row of `write_series`.
    pub fn on_subrow(&self) -> bool {
        self.selector.is_some() && self.subindex.is_some()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}:{}]",
            self.index.as_deref().unwrap_or("-"),
            self.subindex.as_deref().unwrap_or("-"),
            self.column.as_deref().unwrap_or("-")
        )
    }
}
