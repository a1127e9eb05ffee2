//! # Shared Error Plumbing
//!
//! Every subsystem in this crate defines its own `thiserror` enum, but two building
//! blocks are shared by all of them:
//!
//! - [`BoxError`]: the opaque cause carried by parsers, lifecycle hooks and jobs.
//! - [`MultiError`]: an aggregate of zero or more errors. Decoding, lifecycle phases
//!   and the job scheduler all report *every* failure at once instead of stopping
//!   at the first one, and this is the type they report it with.

use std::fmt;

/// Opaque, thread-safe error used wherever the concrete failure type belongs to the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An aggregate error holding zero or more causes.
///
/// Displays one cause per line. Use [`MultiError::iter`] to classify the causes
/// individually.
#[derive(Debug)]
pub struct MultiError<E = BoxError> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Appends a cause.
    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates over the collected causes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.errors
    }

    pub fn into_vec(self) -> Vec<E> {
        self.errors
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate itself.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> Default for MultiError<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<Vec<E>> for MultiError<E> {
    fn from(errors: Vec<E>) -> Self {
        Self { errors }
    }
}

impl<E> FromIterator<E> for MultiError<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<E> Extend<E> for MultiError<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl<E> IntoIterator for MultiError<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a MultiError<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MultiError<E> {}
