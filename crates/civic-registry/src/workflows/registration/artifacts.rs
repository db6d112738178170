use super::domain::ArtifactRef;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactStoreError {
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
    #[error("empty artifact payload")]
    Empty,
}

/// External blob store. The engine hands over bytes and keeps only the opaque
/// reference that comes back; contents are never inspected.
pub trait ArtifactStore: Send + Sync {
    fn store(&self, kind: &str, bytes: &[u8]) -> Result<ArtifactRef, ArtifactStoreError>;
}
