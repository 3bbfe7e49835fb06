//! Error types for surface configuration and tile loading.

use thiserror::Error;

use crate::imagery::LayerId;

/// A caller-side mistake detected while configuring the surface.
///
/// These are returned at the call site and leave the surface unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A collaborator the surface cannot work without was not supplied.
    #[error("missing required dependency: {0}")]
    MissingDependency(&'static str),

    /// Rendering requires a base color but none was configured.
    #[error("base color must be defined")]
    UndefinedBaseColor,

    /// The clipping collection is already attached to another surface.
    #[error("clipping collection is already attached to another surface")]
    ClippingCollectionAlreadyAttached,

    /// The clipping collection cannot be used with this surface.
    #[error("clipping collection is incompatible with this surface: {0}")]
    IncompatibleClippingTarget(String),

    /// The referenced imagery layer is not part of the surface's stack.
    #[error("imagery layer {0:?} is not in the layer collection")]
    UnknownImageryLayer(LayerId),

    /// An option is outside its valid range.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

/// Why a terrain or imagery request did not produce data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadFailureKind {
    /// The provider has no data for the requested tile.
    NotFound,
    /// Transport failed while fetching the data.
    Network,
    /// The data arrived but could not be decoded.
    Decode,
    /// The provider dropped the request without answering it.
    Cancelled,
}

/// A failed terrain or imagery load, reported by a provider.
///
/// Failures are terminal for the tile or imagery that requested them; the
/// tile stays a leaf and the imagery falls back to its ancestors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct LoadFailure {
    pub kind: LoadFailureKind,
    pub message: String,
}

impl LoadFailure {
    pub fn new(kind: LoadFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(LoadFailureKind::NotFound, message)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(LoadFailureKind::Cancelled, "request dropped without a response")
    }
}
