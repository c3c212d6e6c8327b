//! Token generation utilities.

use uuid::Uuid;

/// Generator for opaque tokens handed out to users.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Create a new generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generate a random UUID v4 in hyphenated form.
    ///
    /// Used for password reset tokens issued at registration.
    #[must_use]
    pub fn generate_token(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
