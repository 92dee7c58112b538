//! Layout engine: places `required_count` stamp cells on a canvas.
//!
//! The plan is a pure function of the stamp count and the canvas profile.
//! Shapes come from ordered per-profile tables ([`ShapeRule`]); cell size is
//! derived from the limiting dimension and then validated against the
//! canvas. A grid that overflows is shrunk in bounded steps and, if it still
//! does not fit, replaced by a single-row layout that always does.

use tracing::{trace, warn};

use crate::canvas::CanvasProfile;

/// Spacing between cells as a fraction of the cell size.
pub const SPACING_RATIO: f32 = 0.15;
/// Factor applied to the cell size on each failed bounds check.
pub const SHRINK_FACTOR: f32 = 0.9;
/// Shrink attempts before falling back to a single row.
pub const MAX_SHRINK_ITERATIONS: usize = 3;

/// Bar height as a fraction of the padded canvas height.
const BAR_HEIGHT_RATIO: f32 = 0.22;
/// Gap between bar segments as a fraction of the segment width.
const BAR_GAP_RATIO: f32 = 0.25;
/// Narrower segments cannot show a gap; draw a continuous bar instead.
const MIN_SEGMENT_WIDTH: u32 = 4;

/// How the number of rows is chosen for a count bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStrategy {
    /// Exactly this many rows.
    Fixed(u32),
    /// Rows ≈ √(count / aspect), so the grid follows the canvas shape.
    AspectFit { max_rows: u32 },
}

/// One bucket of the shape table: applies to counts up to `max_count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRule {
    pub max_count: u32,
    pub rows: RowStrategy,
    /// Target fraction of the padded canvas the grid should cover.
    pub fill_ratio: f32,
}

impl ShapeRule {
    pub const fn new(max_count: u32, rows: RowStrategy, fill_ratio: f32) -> Self {
        Self {
            max_count,
            rows,
            fill_ratio,
        }
    }
}

/// Used if a table is ever missing its catch-all bucket.
const CATCH_ALL: ShapeRule = ShapeRule::new(u32::MAX, RowStrategy::AspectFit { max_rows: 10 }, 0.8);

/// Visualization the plan describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStyle {
    /// One glyph per square cell.
    Glyphs,
    /// One filled segment per stamp, `cell_size` wide and `height` tall.
    Segments { height: u32 },
    /// A single progress bar; used when segments would be too thin.
    Continuous { width: u32, height: u32 },
}

/// Grid geometry for one render. Never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPlan {
    pub stamp_count: u32,
    pub rows: u32,
    pub cols: u32,
    pub cell_size: u32,
    pub spacing: u32,
    pub origin_x: u32,
    pub origin_y: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub style: LayoutStyle,
}

impl LayoutPlan {
    /// Horizontal extent of the drawn area, spacing included.
    pub const fn grid_width(&self) -> u32 {
        match self.style {
            LayoutStyle::Continuous { width, .. } => width,
            LayoutStyle::Glyphs | LayoutStyle::Segments { .. } => {
                extent(self.cols, self.cell_size, self.spacing)
            }
        }
    }

    /// Vertical extent of the drawn area, spacing included.
    pub const fn grid_height(&self) -> u32 {
        match self.style {
            LayoutStyle::Glyphs => extent(self.rows, self.cell_size, self.spacing),
            LayoutStyle::Segments { height } | LayoutStyle::Continuous { height, .. } => height,
        }
    }

    /// Top-left corner of cell `index` in row-major order.
    pub const fn cell_origin(&self, index: u32) -> (u32, u32) {
        let cols = if self.cols == 0 { 1 } else { self.cols };
        let pitch = self.cell_size + self.spacing;
        (
            self.origin_x + (index % cols) * pitch,
            self.origin_y + (index / cols) * pitch,
        )
    }

    /// Center pixel of cell `index`.
    pub const fn cell_center(&self, index: u32) -> (u32, u32) {
        let (x, y) = self.cell_origin(index);
        let half_height = match self.style {
            LayoutStyle::Glyphs => self.cell_size / 2,
            LayoutStyle::Segments { height } | LayoutStyle::Continuous { height, .. } => height / 2,
        };
        (x + self.cell_size / 2, y + half_height)
    }

    /// The bounds invariant: the drawn area starts at least `margin` pixels
    /// from the top-left edges and ends at least `margin` pixels before the
    /// bottom-right edges.
    pub fn fits_within(&self, margin: u32) -> bool {
        let right = u64::from(self.origin_x) + u64::from(self.grid_width()) + u64::from(margin);
        let bottom = u64::from(self.origin_y) + u64::from(self.grid_height()) + u64::from(margin);
        self.origin_x >= margin
            && self.origin_y >= margin
            && right <= u64::from(self.canvas_width)
            && bottom <= u64::from(self.canvas_height)
    }
}

const fn extent(n: u32, cell: u32, spacing: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    n.saturating_mul(cell)
        .saturating_add((n - 1).saturating_mul(spacing))
}

/// Compute the layout for `required_count` stamps on `profile`.
///
/// Counts below 1 are treated as 1. The returned plan always satisfies
/// [`LayoutPlan::fits_within`] for the profile padding.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn compute_layout(required_count: u32, profile: &CanvasProfile) -> LayoutPlan {
    let count = required_count.max(1);
    if profile.uses_bar(count) {
        return bar_layout(count, profile);
    }

    let rule = select_rule(count, profile.shape_rules());
    let rows = choose_rows(count, rule.rows, profile.aspect_ratio());
    let cols = count.div_ceil(rows);

    let inner_w = profile.inner_width();
    let inner_h = profile.inner_height();
    let by_width = inner_w as f32 * rule.fill_ratio / cols as f32;
    let by_height = inner_h as f32 * rule.fill_ratio / rows as f32;
    let mut cell = by_width.min(by_height).min(profile.max_cell as f32).floor() as u32;

    for attempt in 0..=MAX_SHRINK_ITERATIONS {
        let spacing = spacing_for(cell);
        if cell > 0
            && extent(cols, cell, spacing) <= inner_w
            && extent(rows, cell, spacing) <= inner_h
        {
            return centered(count, rows, cols, cell, spacing, LayoutStyle::Glyphs, profile);
        }
        trace!(attempt, cell, rows, cols, "Grid exceeds canvas, shrinking cells");
        cell = (cell as f32 * SHRINK_FACTOR).floor() as u32;
    }

    warn!(
        count,
        profile = %profile.kind,
        "Grid layout did not converge, using single-row fallback"
    );
    single_row_fallback(count, profile)
}

fn select_rule(count: u32, rules: &[ShapeRule]) -> ShapeRule {
    rules
        .iter()
        .copied()
        .find(|rule| count <= rule.max_count)
        .unwrap_or(CATCH_ALL)
}

/// Rows are clamped to `⌊√count⌋` so that `cols = ⌈count/rows⌉ ≥ rows`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn choose_rows(count: u32, strategy: RowStrategy, aspect: f32) -> u32 {
    let (wanted, cap) = match strategy {
        RowStrategy::Fixed(rows) => (rows, rows),
        RowStrategy::AspectFit { max_rows } => {
            let ideal = (count as f32 / aspect.max(f32::EPSILON)).sqrt().round() as u32;
            (ideal, max_rows)
        }
    };
    let upper = cap.min(count.isqrt()).max(1);
    wanted.clamp(1, upper)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn spacing_for(cell: u32) -> u32 {
    (cell as f32 * SPACING_RATIO).floor() as u32
}

fn centered(
    count: u32,
    rows: u32,
    cols: u32,
    cell: u32,
    spacing: u32,
    style: LayoutStyle,
    profile: &CanvasProfile,
) -> LayoutPlan {
    let mut plan = LayoutPlan {
        stamp_count: count,
        rows,
        cols,
        cell_size: cell,
        spacing,
        origin_x: 0,
        origin_y: 0,
        canvas_width: profile.width,
        canvas_height: profile.height,
        style,
    };
    plan.origin_x = profile.width.saturating_sub(plan.grid_width()) / 2;
    plan.origin_y = profile.height.saturating_sub(plan.grid_height()) / 2;
    plan
}

/// A single row of cells, no spacing, sized to the narrower constraint.
fn single_row_fallback(count: u32, profile: &CanvasProfile) -> LayoutPlan {
    let cell = (profile.inner_width() / count)
        .min(profile.inner_height())
        .min(profile.max_cell);
    centered(count, 1, count, cell, 0, LayoutStyle::Glyphs, profile)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bar_layout(count: u32, profile: &CanvasProfile) -> LayoutPlan {
    let inner_w = profile.inner_width();
    let inner_h = profile.inner_height();
    let height = ((inner_h as f32 * BAR_HEIGHT_RATIO).floor() as u32).clamp(1, inner_h.max(1));

    let n = count as f32;
    let segment = (inner_w as f32 / BAR_GAP_RATIO.mul_add(n - 1.0, n)).floor() as u32;
    let gap = (segment as f32 * BAR_GAP_RATIO).floor() as u32;

    if segment >= MIN_SEGMENT_WIDTH && extent(count, segment, gap) <= inner_w {
        return centered(count, 1, count, segment, gap, LayoutStyle::Segments { height }, profile);
    }

    let style = LayoutStyle::Continuous {
        width: inner_w,
        height,
    };
    centered(count, 1, count, 0, 0, style, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_stamps_on_strip_is_two_by_five_centered() {
        let plan = compute_layout(10, &CanvasProfile::strip());
        assert_eq!((plan.rows, plan.cols), (2, 5));
        assert_eq!(plan.cell_size, 156);
        assert_eq!(plan.spacing, 23);
        assert_eq!((plan.origin_x, plan.origin_y), (126, 48));
        assert_eq!(plan.style, LayoutStyle::Glyphs);
        assert!(plan.cell_size <= CanvasProfile::strip().max_cell);
    }

    #[test]
    fn single_stamp_is_capped_at_max_cell() {
        let profile = CanvasProfile::strip();
        let plan = compute_layout(1, &profile);
        assert_eq!((plan.rows, plan.cols), (1, 1));
        assert_eq!(plan.cell_size, profile.max_cell);
        assert_eq!(plan.origin_x, (profile.width - profile.max_cell) / 2);
    }

    #[test]
    fn zero_is_clamped_to_one() {
        let profile = CanvasProfile::strip();
        assert_eq!(compute_layout(0, &profile), compute_layout(1, &profile));
    }

    #[test]
    fn forty_stamps_needs_a_shrink_step() {
        // 4 rows of 84px cells with 12px spacing is 372px, taller than the
        // 368px the padded strip allows; one 10% shrink fixes it.
        let plan = compute_layout(40, &CanvasProfile::strip());
        assert_eq!((plan.rows, plan.cols), (4, 10));
        assert_eq!(plan.cell_size, 75);
        assert!(plan.fits_within(CanvasProfile::strip().padding));
    }

    #[test]
    fn thumbnail_switches_to_segments_above_threshold() {
        let profile = CanvasProfile::thumbnail();
        assert_eq!(compute_layout(20, &profile).style, LayoutStyle::Glyphs);
        let bar = compute_layout(21, &profile);
        assert!(matches!(bar.style, LayoutStyle::Segments { .. }));
        assert_eq!(bar.cols, 21);
        assert!(bar.fits_within(profile.padding));
    }

    #[test]
    fn thin_segments_become_continuous_bar() {
        let profile = CanvasProfile::thumbnail();
        let plan = compute_layout(400, &profile);
        assert!(matches!(plan.style, LayoutStyle::Continuous { .. }));
        assert!(plan.fits_within(profile.padding));
        assert!(plan.rows * plan.cols >= 400);
    }

    #[test]
    fn huge_counts_stay_in_bounds() {
        for count in [500, 2_000, 50_000] {
            for profile in [
                CanvasProfile::strip(),
                CanvasProfile::thumbnail().with_bar_threshold(u32::MAX),
            ] {
                let plan = compute_layout(count, &profile);
                assert!(plan.fits_within(profile.padding), "{count} on {}", profile.kind);
                assert!(u64::from(plan.rows) * u64::from(plan.cols) >= u64::from(count));
                assert!(plan.rows <= 10);
            }
        }
    }

    #[test]
    fn choose_rows_never_exceeds_isqrt() {
        assert_eq!(choose_rows(3, RowStrategy::Fixed(2), 1.0), 1);
        assert_eq!(choose_rows(4, RowStrategy::AspectFit { max_rows: 6 }, 1.0), 2);
        assert_eq!(choose_rows(1_000, RowStrategy::AspectFit { max_rows: 10 }, 1.0), 10);
    }

    #[test]
    fn cell_origins_are_row_major() {
        let plan = compute_layout(10, &CanvasProfile::strip());
        let pitch = plan.cell_size + plan.spacing;
        assert_eq!(plan.cell_origin(0), (plan.origin_x, plan.origin_y));
        assert_eq!(plan.cell_origin(4), (plan.origin_x + 4 * pitch, plan.origin_y));
        assert_eq!(plan.cell_origin(5), (plan.origin_x, plan.origin_y + pitch));
    }
}
