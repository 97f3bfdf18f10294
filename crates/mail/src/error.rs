//! Structured error taxonomy
//!
//! Internal plumbing returns `anyhow::Result`. Components that know what
//! went wrong raise a [`MailError`] inside the `anyhow::Error`; the service
//! facade recovers it with [`MailError::from`] before anything crosses into
//! the HTTP layer.

/// Error kinds exposed to callers of the service facade
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    #[error("Authentication required")]
    AuthRequired { auth_url: Option<String> },

    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Malformed content: {message}")]
    MalformedContent { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl MailError {
    pub fn upstream(message: impl Into<String>) -> Self {
        MailError::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        MailError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        MailError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the kind
    pub fn kind(&self) -> &'static str {
        match self {
            MailError::AuthRequired { .. } => "auth_required",
            MailError::UpstreamUnavailable { .. } => "upstream_unavailable",
            MailError::NotFound { .. } => "not_found",
            MailError::MalformedContent { .. } => "malformed_content",
            MailError::InvalidArgument { .. } => "validation_error",
        }
    }
}

impl From<anyhow::Error> for MailError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<MailError>() {
            Ok(typed) => typed,
            // Anything untyped is an I/O or remote failure we could not classify
            Err(other) => MailError::UpstreamUnavailable {
                message: format!("{:#}", other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_typed_error_survives_anyhow() {
        let err = anyhow::Error::from(MailError::not_found("message m1"));
        assert_eq!(MailError::from(err), MailError::not_found("message m1"));
    }

    #[test]
    fn test_typed_error_survives_context() {
        let result: anyhow::Result<()> = Err(MailError::AuthRequired { auth_url: None }.into());
        let err = result.context("Failed to list labels").unwrap_err();
        assert_eq!(MailError::from(err), MailError::AuthRequired { auth_url: None });
    }

    #[test]
    fn test_untyped_error_is_upstream() {
        let err = anyhow::anyhow!("connection reset");
        match MailError::from(err) {
            MailError::UpstreamUnavailable { message } => assert!(message.contains("connection reset")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
