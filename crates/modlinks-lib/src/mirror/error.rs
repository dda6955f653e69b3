use thiserror::Error;

/// Failures with a defined meaning for a mirror run. Transport and
/// filesystem problems flow through as plain `anyhow` chains instead.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("display name {display:?} normalizes to an empty canonical name")]
    EmptyCanonicalName { display: String },

    #[error("mods {first:?} and {second:?} both normalize to canonical name {canonical:?}")]
    NamingCollision {
        canonical: String,
        first: String,
        second: String,
    },

    #[error("manifest does not have the expected shape: {0}")]
    ManifestShape(String),

    #[error("rebase source is not a valid mirror: {0}")]
    RebaseSourceInvalid(String),

    #[error("mirror run cancelled")]
    Cancelled,
}
