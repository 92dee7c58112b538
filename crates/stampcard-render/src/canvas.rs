//! Canvas profiles: fixed target pixel sizes and padding rules.

use std::fmt;
use std::str::FromStr;

use crate::layout::{RowStrategy, ShapeRule};

/// Which canvas a visual is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanvasKind {
    /// Wide card strip (Apple Wallet store card, @3x).
    Strip,
    /// Square thumbnail (second delivery target).
    Thumbnail,
}

impl CanvasKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strip => "strip",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for CanvasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanvasKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strip" => Ok(Self::Strip),
            "thumbnail" => Ok(Self::Thumbnail),
            other => Err(format!("unknown canvas profile: {other}")),
        }
    }
}

/// Strip shapes: few rows, wide grids.
const STRIP_RULES: &[ShapeRule] = &[
    ShapeRule::new(5, RowStrategy::Fixed(1), 0.70),
    ShapeRule::new(12, RowStrategy::Fixed(2), 0.85),
    ShapeRule::new(24, RowStrategy::Fixed(3), 0.90),
    ShapeRule::new(40, RowStrategy::Fixed(4), 0.92),
    ShapeRule::new(60, RowStrategy::Fixed(5), 0.88),
    ShapeRule::new(u32::MAX, RowStrategy::AspectFit { max_rows: 10 }, 0.80),
];

/// Thumbnail shapes: square canvas, grid follows the aspect ratio.
const THUMBNAIL_RULES: &[ShapeRule] = &[
    ShapeRule::new(4, RowStrategy::AspectFit { max_rows: 2 }, 0.65),
    ShapeRule::new(9, RowStrategy::AspectFit { max_rows: 3 }, 0.80),
    ShapeRule::new(16, RowStrategy::AspectFit { max_rows: 4 }, 0.88),
    ShapeRule::new(36, RowStrategy::AspectFit { max_rows: 6 }, 0.92),
    ShapeRule::new(u32::MAX, RowStrategy::AspectFit { max_rows: 10 }, 0.85),
];

/// A fixed pixel canvas plus the layout rules that apply to it.
///
/// `padding` doubles as the safety margin: the layout never places anything
/// closer than `padding` pixels to a canvas edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasProfile {
    pub kind: CanvasKind,
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    /// Absolute upper bound for a glyph cell.
    pub max_cell: u32,
    /// Stamp count above which a segmented bar replaces glyphs.
    pub bar_threshold: Option<u32>,
}

impl CanvasProfile {
    pub const STRIP_WIDTH: u32 = 1125;
    pub const STRIP_HEIGHT: u32 = 432;
    pub const THUMBNAIL_SIZE: u32 = 450;
    pub const DEFAULT_BAR_THRESHOLD: u32 = 20;

    pub const fn strip() -> Self {
        Self {
            kind: CanvasKind::Strip,
            width: Self::STRIP_WIDTH,
            height: Self::STRIP_HEIGHT,
            padding: 32,
            max_cell: 180,
            bar_threshold: None,
        }
    }

    pub const fn thumbnail() -> Self {
        Self {
            kind: CanvasKind::Thumbnail,
            width: Self::THUMBNAIL_SIZE,
            height: Self::THUMBNAIL_SIZE,
            padding: 24,
            max_cell: 140,
            bar_threshold: Some(Self::DEFAULT_BAR_THRESHOLD),
        }
    }

    pub const fn for_kind(kind: CanvasKind) -> Self {
        match kind {
            CanvasKind::Strip => Self::strip(),
            CanvasKind::Thumbnail => Self::thumbnail(),
        }
    }

    /// Override the segmented-bar threshold. Only profiles that support the
    /// bar visualization honour it; a threshold of 0 is treated as 1.
    #[must_use]
    pub const fn with_bar_threshold(mut self, threshold: u32) -> Self {
        if self.bar_threshold.is_some() {
            self.bar_threshold = Some(if threshold == 0 { 1 } else { threshold });
        }
        self
    }

    /// Width available to the layout once the margin is removed.
    pub const fn inner_width(&self) -> u32 {
        self.width.saturating_sub(2 * self.padding)
    }

    /// Height available to the layout once the margin is removed.
    pub const fn inner_height(&self) -> u32 {
        self.height.saturating_sub(2 * self.padding)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        self.inner_width() as f32 / self.inner_height().max(1) as f32
    }

    /// Whether `count` stamps should be drawn as a segmented bar.
    pub fn uses_bar(&self, count: u32) -> bool {
        self.bar_threshold.is_some_and(|t| count > t)
    }

    pub(crate) const fn shape_rules(&self) -> &'static [ShapeRule] {
        match self.kind {
            CanvasKind::Strip => STRIP_RULES,
            CanvasKind::Thumbnail => THUMBNAIL_RULES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_tables_are_ordered_and_exhaustive() {
        for profile in [CanvasProfile::strip(), CanvasProfile::thumbnail()] {
            let rules = profile.shape_rules();
            assert!(rules.windows(2).all(|w| w[0].max_count < w[1].max_count));
            assert_eq!(rules.last().map(|r| r.max_count), Some(u32::MAX));
            assert!(rules.iter().all(|r| (0.65..=0.95).contains(&r.fill_ratio)));
        }
    }

    #[test]
    fn bar_threshold_only_on_thumbnail() {
        assert!(!CanvasProfile::strip().with_bar_threshold(3).uses_bar(50));
        let thumb = CanvasProfile::thumbnail().with_bar_threshold(12);
        assert!(!thumb.uses_bar(12));
        assert!(thumb.uses_bar(13));
    }

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!("strip".parse::<CanvasKind>(), Ok(CanvasKind::Strip));
        assert_eq!(CanvasKind::Thumbnail.to_string(), "thumbnail");
        assert!("poster".parse::<CanvasKind>().is_err());
    }
}
