//! Error types for the render pipeline.
//!
//! Construction-time failures ([`RenderError::MissingAttribute`],
//! [`RenderError::DecodeFailed`]) are recorded on the offending display unit
//! — the unit becomes a permanent no-op — and mirrored into the engine's
//! error log. They never abort the render loop. A
//! [`RenderError::SurfaceFault`] during painting abandons the region being
//! painted; the loop proceeds with the next queued region.

/// The style attribute kinds a drawable can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Coordinates,
    Font,
    Fill,
    Outline,
    Shadow,
    Alignment,
    LineWidth,
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttributeKind::Coordinates => "coordinates",
            AttributeKind::Font => "font",
            AttributeKind::Fill => "fill",
            AttributeKind::Outline => "outline",
            AttributeKind::Shadow => "shadow",
            AttributeKind::Alignment => "alignment",
            AttributeKind::LineWidth => "line width",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// A drawable was constructed without a mandatory style dependency.
    #[error("missing mandatory style attribute: {0}")]
    MissingAttribute(AttributeKind),

    /// The drawing engine failed to allocate a surface, pattern, or layout.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Image data could not be decoded.
    #[error("image decode failed: {0}")]
    DecodeFailed(String),

    /// The drawing engine reported a non-success status after an operation.
    #[error("surface fault: {0}")]
    SurfaceFault(String),
}

impl RenderError {
    /// Maps a collaborator-boundary error into a surface fault.
    pub fn surface(err: impl std::fmt::Display) -> Self {
        RenderError::SurfaceFault(err.to_string())
    }

    /// Maps a collaborator-boundary error into a resource failure.
    pub fn resource(err: impl std::fmt::Display) -> Self {
        RenderError::ResourceCreationFailed(err.to_string())
    }
}
