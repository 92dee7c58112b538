//! Stamp icon artwork and the bounded cache of parsed trees.
//!
//! Artwork is monochrome black on a 100×100 view box; the compositor tints
//! it at draw time, so one parsed tree serves every offer color.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use resvg::usvg;
use tracing::{debug, warn};

use crate::error::RenderError;

/// Icon used when an offer names an id the loader does not know.
pub const DEFAULT_ICON: &str = "stamp";

/// Default number of parsed icons kept in memory.
pub const DEFAULT_CAPACITY: usize = 64;

const STAMP: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><circle cx="50" cy="50" r="46" fill="#000"/></svg>"##;
const STAMP_EMPTY: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><circle cx="50" cy="50" r="42" fill="none" stroke="#000" stroke-width="8"/></svg>"##;

const STAR: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><polygon fill="#000" points="50,4 61.2,34.6 93.8,35.8 68.1,55.9 77,87.2 50,69 23,87.2 31.9,55.9 6.2,35.8 38.8,34.6"/></svg>"##;
const STAR_EMPTY: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><polygon fill="none" stroke="#000" stroke-width="6" stroke-linejoin="round" points="50,4 61.2,34.6 93.8,35.8 68.1,55.9 77,87.2 50,69 23,87.2 31.9,55.9 6.2,35.8 38.8,34.6"/></svg>"##;

const HEART: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><path fill="#000" d="M50 88 C20 66 6 50 6 32 C6 18 17 8 30 8 C39 8 46 13 50 20 C54 13 61 8 70 8 C83 8 94 18 94 32 C94 50 80 66 50 88 Z"/></svg>"##;

const COFFEE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><path fill="#000" d="M10 34 H72 V62 C72 78 60 90 41 90 C22 90 10 78 10 62 Z"/><path fill="#000" d="M72 40 H80 C89 40 94 46 94 54 C94 62 89 68 80 68 H72 V60 H80 C84 60 86 58 86 54 C86 50 84 48 80 48 H72 Z"/><rect fill="#000" x="24" y="8" width="6" height="18" rx="3"/><rect fill="#000" x="38" y="6" width="6" height="20" rx="3"/><rect fill="#000" x="52" y="8" width="6" height="18" rx="3"/></svg>"##;

const GIFT: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100" viewBox="0 0 100 100"><rect fill="#000" x="8" y="32" width="38" height="18"/><rect fill="#000" x="54" y="32" width="38" height="18"/><rect fill="#000" x="14" y="54" width="32" height="38"/><rect fill="#000" x="54" y="54" width="32" height="38"/><circle fill="#000" cx="38" cy="20" r="10"/><circle fill="#000" cx="62" cy="20" r="10"/></svg>"##;

/// Built-in artwork: `(id, earned, unearned)`.
const BUILTIN: &[(&str, &str, Option<&str>)] = &[
    ("stamp", STAMP, Some(STAMP_EMPTY)),
    ("default", STAMP, Some(STAMP_EMPTY)),
    ("star", STAR, Some(STAR_EMPTY)),
    ("heart", HEART, None),
    ("coffee", COFFEE, None),
    ("gift", GIFT, None),
];

/// Parsed artwork for one icon id.
pub struct IconArtwork {
    pub earned: usvg::Tree,
    /// Distinct artwork for unearned cells. `None` means the earned
    /// artwork is drawn at reduced opacity.
    pub unearned: Option<usvg::Tree>,
}

impl std::fmt::Debug for IconArtwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconArtwork")
            .field("size", &self.earned.size())
            .field("has_unearned", &self.unearned.is_some())
            .finish()
    }
}

impl IconArtwork {
    fn parse(earned: &str, unearned: Option<&str>) -> Result<Self, RenderError> {
        let options = usvg::Options::default();
        let earned = usvg::Tree::from_str(earned, &options)?;
        let unearned = unearned
            .map(|svg| usvg::Tree::from_str(svg, &options))
            .transpose()?;
        Ok(Self { earned, unearned })
    }
}

#[derive(Debug, Clone)]
struct SvgSource {
    earned: String,
    unearned: Option<String>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<IconArtwork>>,
    /// Use order, least recently used first.
    order: VecDeque<String>,
}

impl CacheState {
    /// Move `key` to the most recently used end.
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|cached| cached == key) {
            if let Some(entry) = self.order.remove(pos) {
                self.order.push_back(entry);
            }
        }
    }
}

/// Bounded, thread-safe cache of parsed icon artwork.
///
/// Readers share parsed trees through `Arc`; once `capacity` ids are cached
/// the least recently used entry is evicted.
pub struct IconCache {
    capacity: usize,
    state: RwLock<CacheState>,
    custom: RwLock<HashMap<String, SvgSource>>,
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl IconCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(CacheState::default()),
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the loader has artwork for `id` (built-in or registered).
    pub fn contains(&self, id: &str) -> bool {
        BUILTIN.iter().any(|(name, _, _)| *name == id)
            || self
                .custom
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(id)
    }

    /// Number of parsed icons currently held.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `id` to parsed artwork, falling back to [`DEFAULT_ICON`] for
    /// unknown ids.
    pub fn get(&self, id: &str) -> Result<Arc<IconArtwork>, RenderError> {
        let key = if self.contains(id) {
            id
        } else {
            debug!(icon_id = id, "Unknown icon, using default");
            DEFAULT_ICON
        };

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = state.entries.get(key).cloned() {
                state.touch(key);
                return Ok(hit);
            }
        }

        let artwork = Arc::new(self.load(key)?);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = state.entries.get(key).cloned() {
            state.touch(key);
            return Ok(existing);
        }
        while state.entries.len() >= self.capacity {
            let Some(stale) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&stale);
        }
        state.entries.insert(key.to_string(), Arc::clone(&artwork));
        state.order.push_back(key.to_string());
        Ok(artwork)
    }

    /// Register custom artwork under `id`, replacing any cached version.
    ///
    /// The SVG is parsed up front so broken artwork is rejected here rather
    /// than at render time.
    pub fn register_svg(
        &self,
        id: &str,
        earned: &str,
        unearned: Option<&str>,
    ) -> Result<(), RenderError> {
        IconArtwork::parse(earned, unearned).inspect_err(|e| {
            warn!(icon_id = id, error = %e, "Rejected custom icon");
        })?;

        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.to_string(),
                SvgSource {
                    earned: earned.to_string(),
                    unearned: unearned.map(str::to_string),
                },
            );

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.entries.remove(id).is_some() {
            state.order.retain(|cached| cached != id);
        }
        Ok(())
    }

    fn load(&self, id: &str) -> Result<IconArtwork, RenderError> {
        let custom = self
            .custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        if let Some(source) = custom {
            return IconArtwork::parse(&source.earned, source.unearned.as_deref());
        }

        let (_, earned, unearned) = BUILTIN
            .iter()
            .find(|(name, _, _)| *name == id)
            .or_else(|| BUILTIN.first())
            .ok_or_else(|| RenderError::Svg("no built-in icons".into()))?;
        debug!(icon_id = id, "Parsing built-in icon");
        IconArtwork::parse(earned, *unearned)
    }
}
