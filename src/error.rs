use thiserror::Error;

/// The error returned by lookups that require the key to be present, such as
/// [`AvlMap::at`](crate::map::AvlMap::at).
///
/// Plain lookups and removals report a missing key with `None` instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[error("key not found")]
pub struct KeyError;
