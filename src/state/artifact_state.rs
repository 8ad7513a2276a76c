/// Artifact lifecycle states
///
/// An artifact is staged by the fetcher, then owned by the compression
/// pipeline until it reaches one of the terminal states.
use std::fmt;

/// Represents where an artifact is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactState {
    // ===== Active States =====
    /// Raw page body written to the staging directory
    Staged,

    /// A background compression job is running on it
    Compressing,

    // ===== Terminal States =====
    /// Compressed output written and staging copy removed
    Compressed,

    /// Compression failed; the staging copy is kept for manual recovery
    CompressFailed,
}

impl ArtifactState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Compressed | Self::CompressFailed)
    }

    /// Returns true if the lifecycle allows moving to `next`
    pub fn can_transition_to(&self, next: ArtifactState) -> bool {
        matches!(
            (self, next),
            (Self::Staged, Self::Compressing)
                | (Self::Compressing, Self::Compressed)
                | (Self::Compressing, Self::CompressFailed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Compressing => "compressing",
            Self::Compressed => "compressed",
            Self::CompressFailed => "compress_failed",
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
