/// Error codes used across the session layer and surfaced to callers.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const ALREADY_COMMITTED: &str = "already_committed";
    pub const NOT_ACTIONABLE: &str = "not_actionable";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const ASSISTANT_FAILED: &str = "assistant_failed";
    pub const CERTIFIER_FAILED: &str = "certifier_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
