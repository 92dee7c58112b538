//! Background + glyph compositing.
//!
//! [`render`] never fails: any error inside the pipeline is logged and a
//! solid-color canvas of the plan's exact dimensions is returned instead.

use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits, RgbaImage};
use resvg::tiny_skia::{ColorU8, Paint, Pixmap, PixmapPaint, Rect, Transform};
use resvg::usvg;
use tracing::warn;

use crate::color::Rgb;
use crate::error::RenderError;
use crate::icons::IconArtwork;
use crate::layout::{LayoutPlan, LayoutStyle};

/// Glyph size as a fraction of the cell.
pub const GLYPH_SCALE: f32 = 0.9;
/// Opacity of unearned cells when the icon has no distinct unearned artwork.
pub const UNEARNED_OPACITY: f32 = 0.35;
/// Largest canvas the fallback path will allocate.
const MAX_CANVAS_DIM: u32 = 4096;
/// Decoder limits for business-supplied rasters.
const MAX_SOURCE_DIM: u32 = 8192;
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// What is painted beneath the glyphs.
#[derive(Debug, Clone, Copy)]
pub enum Background<'a> {
    Solid(Rgb),
    /// Encoded business image, resampled cover-fit. `fallback` is painted
    /// first and shows through transparent regions.
    Image { bytes: &'a [u8], fallback: Rgb },
}

impl Background<'_> {
    const fn base_color(&self) -> Rgb {
        match *self {
            Self::Solid(color) | Self::Image { fallback: color, .. } => color,
        }
    }
}

/// Artwork placed in each cell.
#[derive(Debug, Clone)]
pub enum GlyphArt<'a> {
    /// Vector icon, tinted with the glyph color.
    Icon(Arc<IconArtwork>),
    /// Business logo raster, drawn untinted.
    Logo(&'a DynamicImage),
}

#[derive(Debug, Clone)]
pub struct GlyphSource<'a> {
    pub art: GlyphArt<'a>,
    /// Foreground color for icons and bar segments.
    pub tint: Rgb,
}

/// Composite one stamp visual. Always returns a pixmap of exactly
/// `plan.canvas_width × plan.canvas_height`.
pub fn render(
    background: &Background<'_>,
    plan: &LayoutPlan,
    glyphs: &GlyphSource<'_>,
    earned_count: u32,
) -> Pixmap {
    match try_render(background, plan, glyphs, earned_count) {
        Ok(pixmap) => pixmap,
        Err(e) => {
            warn!(error = %e, "Composite failed, using solid fallback");
            solid_fallback(plan.canvas_width, plan.canvas_height, background.base_color())
        }
    }
}

/// A canvas filled with `color`. Dimensions are clamped to `1..=4096`.
#[allow(clippy::expect_used)]
pub fn solid_fallback(width: u32, height: u32, color: Rgb) -> Pixmap {
    let width = width.clamp(1, MAX_CANVAS_DIM);
    let height = height.clamp(1, MAX_CANVAS_DIM);
    let mut pixmap =
        Pixmap::new(width, height).expect("clamped dimensions are non-zero and bounded");
    pixmap.fill(color.to_skia(255));
    pixmap
}

fn try_render(
    background: &Background<'_>,
    plan: &LayoutPlan,
    glyphs: &GlyphSource<'_>,
    earned_count: u32,
) -> Result<Pixmap, RenderError> {
    let mut canvas = Pixmap::new(plan.canvas_width, plan.canvas_height).ok_or_else(|| {
        RenderError::Canvas(format!("{}x{}", plan.canvas_width, plan.canvas_height))
    })?;
    canvas.fill(background.base_color().to_skia(255));

    if let Background::Image { bytes, .. } = background {
        let image = decode_cover(bytes, plan.canvas_width, plan.canvas_height)?;
        canvas.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    let earned = earned_count.min(plan.stamp_count);
    match plan.style {
        LayoutStyle::Glyphs => draw_glyphs(&mut canvas, plan, glyphs, earned)?,
        LayoutStyle::Segments { height } => {
            draw_segments(&mut canvas, plan, glyphs.tint, earned, height);
        }
        LayoutStyle::Continuous { width, height } => {
            draw_continuous(&mut canvas, plan, glyphs.tint, earned, width, height);
        }
    }
    Ok(canvas)
}

fn draw_glyphs(
    canvas: &mut Pixmap,
    plan: &LayoutPlan,
    glyphs: &GlyphSource<'_>,
    earned: u32,
) -> Result<(), RenderError> {
    let glyph_px = glyph_size(plan.cell_size);
    if glyph_px == 0 {
        return Ok(());
    }

    let (earned_art, unearned_art, unearned_opacity) = match &glyphs.art {
        GlyphArt::Icon(art) => {
            let on = rasterize_tree(&art.earned, glyph_px, glyphs.tint)?;
            match &art.unearned {
                Some(tree) => (on, rasterize_tree(tree, glyph_px, glyphs.tint)?, 1.0),
                None => (on.clone(), on, UNEARNED_OPACITY),
            }
        }
        GlyphArt::Logo(logo) => {
            let on = rasterize_logo(logo, glyph_px)?;
            (on.clone(), on, UNEARNED_OPACITY)
        }
    };

    let inset = plan.cell_size.saturating_sub(glyph_px) / 2;
    for index in 0..plan.stamp_count {
        let (glyph, opacity) = if index < earned {
            (&earned_art, 1.0)
        } else {
            (&unearned_art, unearned_opacity)
        };
        let (cell_x, cell_y) = plan.cell_origin(index);
        // Glyphs are square; centre non-square logos inside the glyph box.
        let x = cell_x + inset + (glyph_px - glyph.width().min(glyph_px)) / 2;
        let y = cell_y + inset + (glyph_px - glyph.height().min(glyph_px)) / 2;
        canvas.draw_pixmap(
            to_i32(x),
            to_i32(y),
            glyph.as_ref(),
            &PixmapPaint {
                opacity,
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
    }
    Ok(())
}

fn draw_segments(canvas: &mut Pixmap, plan: &LayoutPlan, tint: Rgb, earned: u32, height: u32) {
    for index in 0..plan.stamp_count {
        let (x, y) = plan.cell_origin(index);
        let alpha = if index < earned { 255 } else { unearned_alpha() };
        fill_rect(canvas, x, y, plan.cell_size, height, tint, alpha);
    }
}

fn draw_continuous(
    canvas: &mut Pixmap,
    plan: &LayoutPlan,
    tint: Rgb,
    earned: u32,
    width: u32,
    height: u32,
) {
    let (x, y) = (plan.origin_x, plan.origin_y);
    fill_rect(canvas, x, y, width, height, tint, unearned_alpha());
    let filled = u64::from(width) * u64::from(earned) / u64::from(plan.stamp_count.max(1));
    let filled = u32::try_from(filled).unwrap_or(width);
    fill_rect(canvas, x, y, filled, height, tint, 255);
}

#[allow(clippy::cast_precision_loss)]
fn fill_rect(canvas: &mut Pixmap, x: u32, y: u32, width: u32, height: u32, tint: Rgb, alpha: u8) {
    let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(tint.to_skia(alpha));
    paint.anti_alias = false;
    canvas.fill_rect(rect, &paint, Transform::identity(), None);
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unearned_alpha() -> u8 {
    (UNEARNED_OPACITY * 255.0).round() as u8
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn glyph_size(cell: u32) -> u32 {
    (cell as f32 * GLYPH_SCALE).floor() as u32
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Rasterize `tree` into a `size × size` pixmap, scaled to fit and centred,
/// with every painted pixel recolored to `tint`.
#[allow(clippy::cast_precision_loss)]
fn rasterize_tree(tree: &usvg::Tree, size: u32, tint: Rgb) -> Result<Pixmap, RenderError> {
    let mut pixmap =
        Pixmap::new(size, size).ok_or_else(|| RenderError::Canvas(format!("glyph {size}px")))?;
    let natural = tree.size();
    let longest = natural.width().max(natural.height());
    if longest <= 0.0 {
        return Err(RenderError::Svg("icon has empty size".into()));
    }
    let scale = size as f32 / longest;
    let dx = natural.width().mul_add(-scale, size as f32) / 2.0;
    let dy = natural.height().mul_add(-scale, size as f32) / 2.0;
    resvg::render(
        tree,
        Transform::from_row(scale, 0.0, 0.0, scale, dx, dy),
        &mut pixmap.as_mut(),
    );
    tint_pixels(&mut pixmap, tint);
    Ok(pixmap)
}

/// Replace color while keeping coverage. Pixels are premultiplied.
fn tint_pixels(pixmap: &mut Pixmap, tint: Rgb) {
    for px in pixmap.data_mut().chunks_exact_mut(4) {
        let alpha = u16::from(px[3]);
        if alpha == 0 {
            continue;
        }
        px[0] = premultiply(tint.r, alpha);
        px[1] = premultiply(tint.g, alpha);
        px[2] = premultiply(tint.b, alpha);
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn premultiply(channel: u8, alpha: u16) -> u8 {
    ((channel as u16 * alpha + 127) / 255) as u8
}

fn rasterize_logo(logo: &DynamicImage, size: u32) -> Result<Pixmap, RenderError> {
    let fitted = logo.resize(size, size, FilterType::Triangle).to_rgba8();
    rgba_to_pixmap(&fitted)
}

/// Decode an encoded raster (PNG/JPEG) under fixed decoder limits.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, RenderError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RenderError::Image(e.to_string()))?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIM);
    limits.max_image_height = Some(MAX_SOURCE_DIM);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);
    Ok(reader.decode()?)
}

fn decode_cover(bytes: &[u8], width: u32, height: u32) -> Result<Pixmap, RenderError> {
    let image = decode_image(bytes)?;
    let filled = image.resize_to_fill(width, height, FilterType::Triangle).to_rgba8();
    rgba_to_pixmap(&filled)
}

fn rgba_to_pixmap(image: &RgbaImage) -> Result<Pixmap, RenderError> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Canvas(format!("{width}x{height}")))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Encode a pixmap as PNG.
pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
    let straight: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    let image = RgbaImage::from_raw(pixmap.width(), pixmap.height(), straight)
        .ok_or_else(|| RenderError::Encode("pixel buffer size mismatch".into()))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(png.into_inner())
}

/// Straight (non-premultiplied) RGBA of one pixel, for inspection.
pub fn pixel_rgba(pixmap: &Pixmap, x: u32, y: u32) -> Option<[u8; 4]> {
    let px = pixmap.pixel(x, y)?.demultiply();
    Some([px.red(), px.green(), px.blue(), px.alpha()])
}
