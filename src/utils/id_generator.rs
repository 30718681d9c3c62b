//! Run and call id generation.

use chrono::Utc;

/// Generates identifiers safe for use as [`Runtime`](crate::runtime::Runtime)
/// keys (alphanumerics, `-`, `_` only).
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh run id: timestamp-sortable with a random suffix.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!(
            "run-{}-{:04x}",
            Utc::now().format("%Y%m%d%H%M%S"),
            rand::random::<u16>()
        )
    }

    /// A fresh internal call id, for synthesized tool interactions.
    #[must_use]
    pub fn generate_call_id(&self) -> String {
        format!("call-{}", uuid::Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Generated run ids satisfy the runtime's key charset and are unique
    /// in practice.
    fn test_run_id_shape() {
        let generator = IdGenerator::new();
        let id = generator.generate_run_id();
        assert!(id.starts_with("run-"));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(generator.generate_run_id(), generator.generate_run_id());
    }
}
