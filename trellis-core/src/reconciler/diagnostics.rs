//! Development-time checks on child lists.

use std::collections::HashSet;
use std::fmt;

use crate::view::{Key, View};

/// A problem with the keys of a child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDiagnostic {
    /// Some elements are keyed and some are not.
    MixedKeys { keyed: usize, unkeyed: usize },
    /// Two siblings share a key; only the last one keeps its identity.
    DuplicateKey(Key),
}

impl fmt::Display for KeyDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDiagnostic::MixedKeys { keyed, unkeyed } => write!(
                f,
                "child list mixes {keyed} keyed and {unkeyed} unkeyed elements"
            ),
            KeyDiagnostic::DuplicateKey(key) => write!(f, "duplicate key {key} in child list"),
        }
    }
}

/// Check the element keys of one child list.
pub fn check_keys(items: &[View]) -> Vec<KeyDiagnostic> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let (mut keyed, mut unkeyed) = (0, 0);

    for item in items {
        let View::Element(el) = item else {
            continue;
        };
        match &el.key {
            Some(key) => {
                keyed += 1;
                if !seen.insert(key) {
                    out.push(KeyDiagnostic::DuplicateKey(key.clone()));
                }
            }
            None => unkeyed += 1,
        }
    }

    if keyed > 0 && unkeyed > 0 {
        out.insert(0, KeyDiagnostic::MixedKeys { keyed, unkeyed });
    }
    out
}
