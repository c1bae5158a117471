pub mod backend;

/// Built-in drawing backends.
pub mod backends {
    /// Cairo drawing backend
    #[cfg(feature = "backend_cairo")]
    pub mod cairo;
    pub mod null;
    /// CPU raster backend, the default for tests and headless use
    pub mod raster;
}
