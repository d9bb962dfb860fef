// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log helpers on top of the `log` facade.
//!
//! Malformed traffic tends to repeat at frame rate, so per-key errors are
//! emitted once through [`LogOnce`] instead of flooding the log.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;

/// Remembers which keys have already been logged.
#[derive(Debug, Default)]
pub struct LogOnce {
    seen: Mutex<HashSet<String>>,
}

impl LogOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `key` is seen.
    pub fn first(&self, key: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(key) {
            false
        } else {
            seen.insert(key.to_string());
            true
        }
    }

    /// Log at error level once per key.
    pub fn error(&self, key: &str, args: fmt::Arguments<'_>) {
        if self.first(key) {
            log::error!("{}", args);
        }
    }

    /// Log at warn level once per key.
    pub fn warn(&self, key: &str, args: fmt::Arguments<'_>) {
        if self.first(key) {
            log::warn!("{}", args);
        }
    }

    /// Forget every key so the next occurrence logs again.
    pub fn reset(&self) {
        self.seen.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_only_once() {
        let once = LogOnce::new();
        assert!(once.first("missing-subject"));
        assert!(!once.first("missing-subject"));
        assert!(once.first("unknown-role:Foo"));
    }

    #[test]
    fn test_reset() {
        let once = LogOnce::new();
        once.error("k", format_args!("boom {}", 1));
        assert!(!once.first("k"));
        once.reset();
        assert!(once.first("k"));
    }
}
