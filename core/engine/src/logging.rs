//! FILENAME: core/engine/src/logging.rs
// PURPOSE: Category-tagged logging for the engine.
// FORMAT: `seq|level|category|message`, routed through the `log` facade with
// the category as target. Categories in use: STORE, MAP, VIEW, TALLY,
// COMPUTE, LOAD, FLOWS, STORAGE.

use std::sync::atomic::{AtomicU64, Ordering};

/// Line counter shared by every engine instance in the process.
static LINE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
        }
    }

    fn to_log(self) -> log::Level {
        match self {
            Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Info => log::Level::Info,
            Level::Debug => log::Level::Debug,
        }
    }
}

/// Entry or exit marker of a traced engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter,
    Exit,
}

pub fn sequence() -> u64 {
    LINE_SEQ.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn emit(level: Level, category: &str, message: &str) {
    let seq = sequence();
    log::log!(
        target: category,
        level.to_log(),
        "{}|{}|{}|{}",
        seq,
        level.tag(),
        category,
        message
    );
}

/// Traces the start or end of an engine step, with optional detail.
pub fn emit_step(category: &str, step: Step, name: &str, detail: &str) {
    let marker = match step {
        Step::Enter => "ENTER",
        Step::Exit => "EXIT",
    };
    if detail.is_empty() {
        emit(Level::Debug, category, &format!("{} {}", marker, name));
    } else {
        emit(Level::Debug, category, &format!("{} {} {}", marker, name, detail));
    }
}

// ============================================================================
// MACROS
// ============================================================================

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Debug, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Info, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warn, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_enter {
    ($cat:expr, $name:expr) => {
        $crate::logging::emit_step($cat, $crate::logging::Step::Enter, $name, "")
    };
    ($cat:expr, $name:expr, $($arg:tt)*) => {
        $crate::logging::emit_step($cat, $crate::logging::Step::Enter, $name, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_exit {
    ($cat:expr, $name:expr) => {
        $crate::logging::emit_step($cat, $crate::logging::Step::Exit, $name, "")
    };
    ($cat:expr, $name:expr, $($arg:tt)*) => {
        $crate::logging::emit_step($cat, $crate::logging::Step::Exit, $name, &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = sequence();
        let b = sequence();
        assert!(b > a);
    }

    #[test]
    fn macros_expand_without_logger() {
        crate::log_warn!("TEST", "value={}", 3);
        crate::log_enter!("TEST", "fn_name");
        crate::log_exit!("TEST", "fn_name", "ok {}", 1);
        crate::log_error!("TEST", "failed");
    }
}
