//! Grammar for the free-text selection sub-menus.
//!
//! Recognized inputs: a 1-based number, a comma-separated list of numbers,
//! the `all` keyword, and `q` to cancel. Parsed indices come back 0-based.

use thiserror::Error;

/// Parsed user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Leave the sub-menu.
    Cancel,
    /// Take every entry.
    All,
    /// Take exactly these 0-based indices.
    Indices(Vec<usize>),
}

/// Rejected selection input. Handled by re-prompting, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Input matched none of the recognized forms.
    #[error("enter a number, a comma-separated list, 'all', or 'q'")]
    Unrecognized,

    /// A list element was not a number.
    #[error("'{value}' is not an entry number")]
    NotANumber {
        /// The offending element.
        value: String,
    },

    /// A number fell outside the menu.
    #[error("entry {index} is out of range (1-{len})")]
    OutOfRange {
        /// The 1-based number the user typed.
        index: usize,
        /// The number of entries in the menu.
        len: usize,
    },
}

/// Parses one selection line against a menu of `len` entries.
///
/// # Errors
///
/// Returns [`SelectionError`] describing what to tell the user before
/// re-prompting.
pub fn parse_selection(input: &str, len: usize) -> Result<Selection, SelectionError> {
    let trimmed = input.trim().to_ascii_lowercase();
    match trimmed.as_str() {
        "" => Err(SelectionError::Unrecognized),
        "q" => Ok(Selection::Cancel),
        "all" => Ok(Selection::All),
        _ => {
            let mut indices = Vec::new();
            for part in trimmed.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    return Err(SelectionError::Unrecognized);
                }
                let index: usize = part.parse().map_err(|_| SelectionError::NotANumber {
                    value: part.to_string(),
                })?;
                if index == 0 || index > len {
                    return Err(SelectionError::OutOfRange { index, len });
                }
                indices.push(index - 1);
            }
            Ok(Selection::Indices(indices))
        }
    }
}
