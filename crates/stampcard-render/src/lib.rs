//! Stamp-progress renderer.
//!
//! Turns earned/required stamp counts into a raster image that fits a wallet
//! canvas exactly:
//! - [`canvas`] fixed canvas profiles (strip, thumbnail)
//! - [`layout`] deterministic grid / bar layout under the canvas budget
//! - [`icons`] bounded cache of parsed stamp artwork
//! - [`compositor`] background + glyph compositing with solid fallback
//! - [`fetch`] bounded download of business background/logo images
//! - [`renderer`] the render entry point producing PNG bytes and a content tag

pub mod canvas;
pub mod color;
pub mod compositor;
pub mod error;
pub mod fetch;
pub mod icons;
pub mod layout;
pub mod renderer;

pub use canvas::{CanvasKind, CanvasProfile};
pub use color::Rgb;
pub use error::RenderError;
pub use fetch::{BackgroundFetcher, FetchError};
pub use icons::{IconArtwork, IconCache};
pub use layout::{LayoutPlan, LayoutStyle, compute_layout};
pub use renderer::{RenderedImage, StampRenderer, StampVisual, content_tag};
pub use stampcard_core::config::DisplayMode;
