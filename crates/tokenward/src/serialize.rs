//! The resource ↔ subject-identifier boundary.
//!
//! The engine never interprets resources itself; an application-supplied
//! [`SubjectSerializer`] maps a resource to the string stored in `sub` and
//! back. Failures propagate verbatim through the lifecycle operations.

use async_trait::async_trait;

use crate::error::Result;

/// Maps resources to subject identifiers and back.
#[async_trait]
pub trait SubjectSerializer: Send + Sync {
    /// The application resource type (a user, an API client, ...).
    type Resource: Send + Sync;

    /// Produce the subject identifier stored in the token's `sub` claim.
    async fn for_token(&self, resource: &Self::Resource) -> Result<String>;

    /// Recover the resource behind a verified token's `sub` claim.
    async fn from_token(&self, subject: &str) -> Result<Self::Resource>;
}

/// Serializer for applications whose resources already are their subject
/// strings. Useful in tests and simple deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySerializer;

#[async_trait]
impl SubjectSerializer for IdentitySerializer {
    type Resource = String;

    async fn for_token(&self, resource: &String) -> Result<String> {
        Ok(resource.clone())
    }

    async fn from_token(&self, subject: &str) -> Result<String> {
        Ok(subject.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_serializer_round_trips() {
        let subject = IdentitySerializer
            .for_token(&"user:42".to_string())
            .await
            .unwrap();
        assert_eq!(subject, "user:42");
        assert_eq!(
            IdentitySerializer.from_token(&subject).await.unwrap(),
            "user:42"
        );
    }
}
