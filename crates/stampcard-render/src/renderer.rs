//! Render entry point: stamp counts in, PNG bytes and a content tag out.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use stampcard_core::config::{DisplayMode, RenderConfig};
use tracing::{error, instrument, warn};

use crate::canvas::{CanvasKind, CanvasProfile};
use crate::color::Rgb;
use crate::compositor::{self, Background, GlyphArt, GlyphSource};
use crate::fetch::{BackgroundFetcher, FetchError};
use crate::icons::IconCache;
use crate::icons::DEFAULT_ICON;
use crate::layout::compute_layout;

/// Length of a content tag in hex characters.
pub const CONTENT_TAG_LEN: usize = 16;

/// Everything needed to draw one progress image. Built per render.
#[derive(Debug, Clone, PartialEq)]
pub struct StampVisual {
    pub icon_id: String,
    pub display_mode: DisplayMode,
    pub earned_count: u32,
    pub required_count: u32,
    pub background_color: Rgb,
    pub foreground_color: Rgb,
    pub profile: CanvasProfile,
    pub background_url: Option<String>,
    pub logo_url: Option<String>,
}

impl StampVisual {
    /// Counts are clamped: `required ≥ 1` and `earned ≤ required`.
    pub fn new(
        icon_id: impl Into<String>,
        earned: u32,
        required: u32,
        profile: CanvasProfile,
    ) -> Self {
        let required_count = required.max(1);
        Self {
            icon_id: icon_id.into(),
            display_mode: DisplayMode::Svg,
            earned_count: earned.min(required_count),
            required_count,
            background_color: Rgb::new(0x1F, 0x29, 0x37),
            foreground_color: Rgb::new(0xF5, 0x9E, 0x0B),
            profile,
            background_url: None,
            logo_url: None,
        }
    }

    #[must_use]
    pub const fn with_colors(mut self, background: Rgb, foreground: Rgb) -> Self {
        self.background_color = background;
        self.foreground_color = foreground;
        self
    }

    #[must_use]
    pub const fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    #[must_use]
    pub fn with_background_url(mut self, url: Option<String>) -> Self {
        self.background_url = url.filter(|u| !u.is_empty());
        self
    }

    #[must_use]
    pub fn with_logo_url(mut self, url: Option<String>) -> Self {
        self.logo_url = url.filter(|u| !u.is_empty());
        self
    }
}

/// An encoded progress image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub png: Vec<u8>,
    /// First 16 hex chars of SHA-256 over `png`.
    pub content_tag: String,
    pub width: u32,
    pub height: u32,
}

/// Content-derived tag for a byte payload.
pub fn content_tag(bytes: &[u8]) -> String {
    let mut tag = hex::encode(Sha256::digest(bytes));
    tag.truncate(CONTENT_TAG_LEN);
    tag
}

/// Shared renderer: memoized icon artwork plus an optional image fetcher.
#[derive(Clone)]
pub struct StampRenderer {
    icons: Arc<IconCache>,
    fetcher: Option<BackgroundFetcher>,
    bar_threshold: u32,
}

impl std::fmt::Debug for StampRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampRenderer")
            .field("cached_icons", &self.icons.len())
            .field("remote_images", &self.fetcher.is_some())
            .field("bar_threshold", &self.bar_threshold)
            .finish()
    }
}

impl Default for StampRenderer {
    fn default() -> Self {
        Self::new(Arc::new(IconCache::default()), None)
    }
}

impl StampRenderer {
    pub const fn new(icons: Arc<IconCache>, fetcher: Option<BackgroundFetcher>) -> Self {
        Self {
            icons,
            fetcher,
            bar_threshold: CanvasProfile::DEFAULT_BAR_THRESHOLD,
        }
    }

    /// Build a renderer with a remote fetcher and icon cache sized from
    /// configuration.
    pub fn from_config(config: &RenderConfig) -> Result<Self, FetchError> {
        let fetcher = BackgroundFetcher::new(
            Duration::from_millis(config.fetch_timeout_ms),
            config.max_background_bytes,
        )?;
        Ok(Self {
            icons: Arc::new(IconCache::new(config.icon_cache_capacity)),
            fetcher: Some(fetcher),
            bar_threshold: config.bar_threshold,
        })
    }

    pub const fn icons(&self) -> &Arc<IconCache> {
        &self.icons
    }

    /// Canvas profile for `kind` with the configured bar threshold applied.
    pub const fn profile(&self, kind: CanvasKind) -> CanvasProfile {
        CanvasProfile::for_kind(kind).with_bar_threshold(self.bar_threshold)
    }

    /// Render `visual` from already-loaded image bytes. Never fails; asset
    /// problems degrade to the default icon or a solid background.
    #[instrument(skip_all, fields(
        icon = %visual.icon_id,
        earned = visual.earned_count,
        required = visual.required_count,
        profile = %visual.profile.kind,
    ))]
    pub fn render(
        &self,
        visual: &StampVisual,
        background: Option<&[u8]>,
        logo: Option<&[u8]>,
    ) -> RenderedImage {
        let plan = compute_layout(visual.required_count, &visual.profile);
        let background = background.map_or(Background::Solid(visual.background_color), |bytes| {
            Background::Image {
                bytes,
                fallback: visual.background_color,
            }
        });

        let logo_image = match (visual.display_mode, logo) {
            (DisplayMode::Logo, Some(bytes)) => compositor::decode_image(bytes)
                .inspect_err(|e| warn!(error = %e, "Logo undecodable, using icon artwork"))
                .ok(),
            (DisplayMode::Logo, None) => {
                warn!("Logo display requested without a logo, using icon artwork");
                None
            }
            (DisplayMode::Svg, _) => None,
        };

        let art = if let Some(image) = logo_image.as_ref() {
            GlyphArt::Logo(image)
        } else {
            match self.icons.get(&visual.icon_id).or_else(|e| {
                warn!(error = %e, "Icon artwork unusable, trying default");
                self.icons.get(DEFAULT_ICON)
            }) {
                Ok(icon) => GlyphArt::Icon(icon),
                Err(e) => {
                    warn!(error = %e, "No icon artwork available");
                    return self.fallback(visual);
                }
            }
        };

        let glyphs = GlyphSource {
            art,
            tint: visual.foreground_color,
        };
        let pixmap = compositor::render(&background, &plan, &glyphs, visual.earned_count);
        match compositor::encode_png(&pixmap) {
            Ok(png) => Self::finish(png, pixmap.width(), pixmap.height()),
            Err(e) => {
                warn!(error = %e, "PNG encode failed, using solid fallback");
                self.fallback(visual)
            }
        }
    }

    /// Fetch the visual's background and logo (if any), then render on the
    /// blocking pool.
    pub async fn render_remote(&self, visual: StampVisual) -> RenderedImage {
        let logo_url = match visual.display_mode {
            DisplayMode::Logo => visual.logo_url.as_deref(),
            DisplayMode::Svg => None,
        };
        let (background, logo) = tokio::join!(
            self.fetch_optional(visual.background_url.as_deref()),
            self.fetch_optional(logo_url),
        );

        let renderer = self.clone();
        let job_visual = visual.clone();
        tokio::task::spawn_blocking(move || {
            renderer.render(&job_visual, background.as_deref(), logo.as_deref())
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Render task failed, using solid fallback");
            self.fallback(&visual)
        })
    }

    async fn fetch_optional(&self, url: Option<&str>) -> Option<Vec<u8>> {
        let url = url?;
        match &self.fetcher {
            Some(fetcher) => fetcher.fetch_or_none(url).await,
            None => {
                warn!(url, "Remote images disabled, skipping fetch");
                None
            }
        }
    }

    /// Solid background of the visual's canvas size.
    pub fn fallback(&self, visual: &StampVisual) -> RenderedImage {
        let pixmap = compositor::solid_fallback(
            visual.profile.width,
            visual.profile.height,
            visual.background_color,
        );
        let png = compositor::encode_png(&pixmap).unwrap_or_else(|e| {
            error!(error = %e, "Fallback PNG encode failed");
            Vec::new()
        });
        Self::finish(png, pixmap.width(), pixmap.height())
    }

    fn finish(png: Vec<u8>, width: u32, height: u32) -> RenderedImage {
        RenderedImage {
            content_tag: content_tag(&png),
            png,
            width,
            height,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(png: &[u8]) -> image::RgbaImage {
        compositor::decode_image(png).unwrap().to_rgba8()
    }

    #[test]
    fn content_tag_is_short_and_pure() {
        let a = content_tag(b"pass.json");
        assert_eq!(a.len(), CONTENT_TAG_LEN);
        assert_eq!(a, content_tag(b"pass.json"));
        assert_ne!(a, content_tag(b"pass.json "));
    }

    #[test]
    fn counts_are_clamped() {
        let visual = StampVisual::new("stamp", 99, 0, CanvasProfile::strip());
        assert_eq!((visual.earned_count, visual.required_count), (1, 1));
    }

    #[test]
    fn renders_exact_canvas_size() {
        let renderer = StampRenderer::default();
        for kind in [CanvasKind::Strip, CanvasKind::Thumbnail] {
            let visual = StampVisual::new("coffee", 3, 8, renderer.profile(kind));
            let image = renderer.render(&visual, None, None);
            let decoded = decode(&image.png);
            assert_eq!(decoded.dimensions(), (image.width, image.height));
            assert_eq!(image.width, visual.profile.width);
            assert_eq!(image.height, visual.profile.height);
        }
    }

    #[test]
    fn identical_visuals_share_a_tag() {
        let renderer = StampRenderer::default();
        let visual = StampVisual::new("star", 2, 6, CanvasProfile::strip());
        let first = renderer.render(&visual, None, None);
        let second = renderer.render(&visual, None, None);
        assert_eq!(first.content_tag, second.content_tag);

        let more = StampVisual { earned_count: 3, ..visual };
        assert_ne!(renderer.render(&more, None, None).content_tag, first.content_tag);
    }

    #[test]
    fn broken_logo_falls_back_to_icon() {
        let renderer = StampRenderer::default();
        let visual = StampVisual::new("stamp", 1, 1, CanvasProfile::strip())
            .with_display_mode(DisplayMode::Logo);
        let with_broken_logo = renderer.render(&visual, None, Some(b"nope"));
        let as_icon = renderer.render(&visual.with_display_mode(DisplayMode::Svg), None, None);
        assert_eq!(with_broken_logo.png, as_icon.png);
    }

    #[test]
    fn broken_background_is_solid() {
        let renderer = StampRenderer::default();
        let visual = StampVisual::new("stamp", 0, 4, CanvasProfile::thumbnail());
        let image = renderer.render(&visual, Some(b"\x89PNG garbage"), None);
        let expected = renderer.fallback(&visual);
        assert_eq!(image.png, expected.png);
    }
}
