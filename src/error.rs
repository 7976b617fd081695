//! Fatal packing errors.

use thiserror::Error;

/// Result type alias for packing operations.
pub type PackResult<T> = std::result::Result<T, PackError>;

/// Conditions that abort a whole pack run.
///
/// Everything else (unresolved references, class mismatches, colliding
/// non-releasable files) is logged and skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
    /// An explicit pack id is already used by a bundle with another target.
    #[error("duplicate pack id '{id}': already targets '{existing}', requested '{requested}'")]
    DuplicatePackId {
        /// The conflicting id.
        id: String,
        /// Target of the bundle that owns the id.
        existing: String,
        /// Target of the rejected request.
        requested: String,
    },

    /// A pack rule did not provide a target path.
    #[error("missing pack target for {context}")]
    MissingTarget {
        /// Description of the rule lacking a target.
        context: String,
    },

    /// Bundles reference each other through `::id` rules in a cycle.
    #[error("pack dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

impl PackError {
    /// Helper to create a missing target error for the given rule description.
    pub fn missing_target(context: impl Into<String>) -> Self {
        Self::MissingTarget {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_the_chain() {
        let error = PackError::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(error.to_string(), "pack dependency cycle: a -> b -> a");
    }
}
