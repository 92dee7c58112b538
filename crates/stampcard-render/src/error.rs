//! Render pipeline errors.
//!
//! These never escape [`crate::StampRenderer::render`]; they select the
//! fallback path and end up in the logs.

/// Errors raised inside the render pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A pixmap could not be allocated for the requested size.
    #[error("Canvas allocation failed: {0}")]
    Canvas(String),

    /// Icon artwork could not be parsed.
    #[error("SVG error: {0}")]
    Svg(String),

    /// A raster (background or logo) could not be decoded.
    #[error("Image decode error: {0}")]
    Image(String),

    /// The final PNG could not be produced.
    #[error("PNG encode error: {0}")]
    Encode(String),
}

impl From<image::ImageError> for RenderError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

impl From<resvg::usvg::Error> for RenderError {
    fn from(e: resvg::usvg::Error) -> Self {
        Self::Svg(e.to_string())
    }
}
