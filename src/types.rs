//! Basic type definitions for the chat server
//!
//! Provides the `SessionId` newtype used as the registry key.

/// Session identifier (newtype pattern)
///
/// Small non-negative integer handed out by the registry. Ids are reused:
/// a new session always gets the smallest id not currently registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl SessionId {
    /// The id after this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
