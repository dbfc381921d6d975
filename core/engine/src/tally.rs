//! FILENAME: core/engine/src/tally.rs
//! PURPOSE: Navigation over the sub-rows of one entity.
//! CONTEXT: A tally picks a subset of the entity's `write_series` rows
//! relative to the current one and renders a view once per picked row.
//! Out-of-range moves are not errors: they fall back to the current
//! position and log a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::TallySpec;
use crate::cursor::Cursor;
use crate::error::{EngineError, EngineResult};
use crate::flows::Flows;
use crate::value::Value;
use crate::{log_debug, log_warn};

/// Separator between the rendered fragments of a tally.
pub const TALLY_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyWhich {
    /// First sub-row.
    Pop,
    /// Last sub-row.
    Bottom,
    Previous,
    Next,
    /// Every sub-row before the current one.
    Earlier,
    /// Every sub-row after the current one.
    Later,
    Others,
    All,
}

impl TallyWhich {
    pub fn keyword(&self) -> &'static str {
        match self {
            TallyWhich::Pop => "pop",
            TallyWhich::Bottom => "bottom",
            TallyWhich::Previous => "previous",
            TallyWhich::Next => "next",
            TallyWhich::Earlier => "earlier",
            TallyWhich::Later => "later",
            TallyWhich::Others => "others",
            TallyWhich::All => "all",
        }
    }

    fn is_relative(&self) -> bool {
        matches!(
            self,
            TallyWhich::Previous | TallyWhich::Next | TallyWhich::Earlier | TallyWhich::Later
        )
    }
}

impl FromStr for TallyWhich {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pop" => Ok(TallyWhich::Pop),
            "bottom" => Ok(TallyWhich::Bottom),
            "previous" => Ok(TallyWhich::Previous),
            "next" => Ok(TallyWhich::Next),
            "earlier" => Ok(TallyWhich::Earlier),
            "later" => Ok(TallyWhich::Later),
            "others" => Ok(TallyWhich::Others),
            "all" => Ok(TallyWhich::All),
            other => Err(EngineError::config(format!(
                "Unknown tally keyword '{}'; expected one of pop, bottom, previous, next, earlier, later, others, all",
                other
            ))),
        }
    }
}

impl fmt::Display for TallyWhich {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Picks sub-rows relative to `current`.
///
/// `earlier` and `later` exclude the current sub-row. Without a current
/// sub-row the relative keywords pick nothing and `others` picks everything.
pub fn select(
    subindices: &[String],
    current: Option<&str>,
    which: TallyWhich,
    reverse: bool,
) -> Vec<String> {
    let position = current.and_then(|c| subindices.iter().position(|s| s == c));
    let last = subindices.len().checked_sub(1);

    let picked: Vec<String> = match (which, position) {
        (TallyWhich::Pop, _) => subindices.first().cloned().into_iter().collect(),
        (TallyWhich::Bottom, _) => subindices.last().cloned().into_iter().collect(),
        (TallyWhich::All, _) | (TallyWhich::Others, None) => subindices.to_vec(),
        (which, None) => {
            debug_assert!(which.is_relative());
            log_warn!("TALLY", "'{}' needs a current sub-row; nothing selected", which);
            Vec::new()
        }
        (TallyWhich::Previous, Some(pos)) => {
            if pos == 0 {
                log_warn!("TALLY", "'previous' before the first sub-row; staying on current");
                vec![subindices[pos].clone()]
            } else {
                vec![subindices[pos - 1].clone()]
            }
        }
        (TallyWhich::Next, Some(pos)) => {
            if Some(pos) == last {
                log_warn!("TALLY", "'next' past the last sub-row; staying on current");
                vec![subindices[pos].clone()]
            } else {
                vec![subindices[pos + 1].clone()]
            }
        }
        (TallyWhich::Earlier, Some(pos)) => subindices[..pos].to_vec(),
        (TallyWhich::Later, Some(pos)) => subindices[pos + 1..].to_vec(),
        (TallyWhich::Others, Some(pos)) => subindices
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, s)| s.clone())
            .collect(),
    };

    if reverse {
        picked.into_iter().rev().collect()
    } else {
        picked
    }
}

impl Flows {
    /// Renders `spec.view` once per selected sub-row, framed by the optional
    /// `begin` and `end` literals. Empty fragments are dropped.
    ///
    /// Each sub-row is resolved on a copy of `cursor`, so the caller's
    /// subindex is unchanged whatever the outcome. `overrides` reach the
    /// templates of every fragment.
    pub fn tally_values(
        &mut self,
        spec: &TallySpec,
        cursor: &Cursor,
        overrides: Option<&BTreeMap<String, Value>>,
    ) -> EngineResult<Value> {
        let Some(index) = cursor.index() else {
            log_warn!("TALLY", "tally without a current entity");
            return Ok(Value::Empty);
        };
        let subindices = self.store.get_subindices(index);
        let picked = select(&subindices, cursor.subindex(), spec.which, spec.reverse);
        log_debug!(
            "TALLY",
            "{} of {} sub-rows selected by '{}'",
            picked.len(),
            subindices.len(),
            spec.which
        );

        let mut fragments = Vec::new();
        if let Some(begin) = spec.begin.as_deref() {
            fragments.push(begin.to_string());
        }
        for subindex in picked {
            let moved = cursor
                .clone()
                .with_selector(self.store.selector().map(str::to_string))
                .with_subindex(Some(subindex));
            let value = self.resolve_view(&spec.view, &moved, overrides)?;
            fragments.push(value.display_value());
        }
        if let Some(end) = spec.end.as_deref() {
            fragments.push(end.to_string());
        }

        let text = fragments
            .into_iter()
            .filter(|f| !f.trim().is_empty())
            .collect::<Vec<_>>()
            .join(TALLY_SEPARATOR);
        Ok(Value::Text(text))
    }
}
