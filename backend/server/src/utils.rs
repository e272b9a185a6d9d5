use tokio::task::spawn_blocking;

use crate::error::AppError;

/// Runs CPU-bound work (password hashing, token checks) off the request threads.
pub async fn offload<F, T>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(work)
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))
}

/// A present, non-blank text field, trimmed.
pub fn required_text(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation(format!("Incomplete data: {field} is required")))
}

/// Like [`required_text`] but keeps surrounding whitespace, for passwords.
pub fn required_secret(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("Incomplete data: {field} is required")))
}

#[cfg(test)]
mod tests {
    use super::{offload, required_secret, required_text};

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(Some("  Ana ".into()), "name").unwrap(), "Ana");
        assert!(required_text(Some("   ".into()), "name").is_err());
        assert!(required_text(None, "name").is_err());
    }

    #[test]
    fn test_required_secret_keeps_spaces() {
        assert_eq!(required_secret(Some(" pw ".into()), "password").unwrap(), " pw ");
        assert!(required_secret(Some("".into()), "password").is_err());
    }

    #[tokio::test]
    async fn test_offload() {
        assert_eq!(offload(|| 2 + 2).await.unwrap(), 4);
    }
}
