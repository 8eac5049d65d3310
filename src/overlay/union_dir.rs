use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::vfs::{DirEntry, Metadata};

/// Decides whether a child name of the viewed directory is hidden.
pub type HideFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A directory as seen through the composite.
///
/// Layer listings are captured when the directory is opened; the hide
/// predicate is evaluated on every read, so tombstones placed after the open
/// take effect on the next page.
pub enum DirectoryView {
    BaseOnly {
        entries: Vec<DirEntry>,
        hide: HideFn,
    },
    /// The overlay is authoritative for itself: nothing is filtered.
    OverlayOnly { entries: Vec<DirEntry> },
    Union {
        base: Vec<DirEntry>,
        overlay: Vec<DirEntry>,
        hide: HideFn,
    },
}

fn sorted(mut entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

impl DirectoryView {
    /// Listing of a directory that exists only in the base; `hide` filters tombstoned names.
    pub fn base_only(entries: Vec<DirEntry>, hide: HideFn) -> Self {
        DirectoryView::BaseOnly {
            entries: sorted(entries),
            hide,
        }
    }

    pub fn overlay_only(entries: Vec<DirEntry>) -> Self {
        DirectoryView::OverlayOnly {
            entries: sorted(entries),
        }
    }

    /// Merge of both layers. Overlay entries shadow base entries of the same
    /// name, and `hide` is applied to base entries only.
    ///
    /// # Arguments
    /// * `base` - Raw base listing, any order
    /// * `overlay` - Raw overlay listing, any order
    /// * `hide` - Consulted on every read, so tombstones placed after the
    ///   view was built still take effect
    pub fn union(base: Vec<DirEntry>, overlay: Vec<DirEntry>, hide: HideFn) -> Self {
        DirectoryView::Union {
            base: sorted(base),
            overlay: sorted(overlay),
            hide,
        }
    }

    /// Up to `count` visible entries whose names sort strictly after `cursor`.
    pub fn read_entries(&self, cursor: Option<&str>, count: Option<usize>) -> Vec<DirEntry> {
        let past_cursor = |entry: &DirEntry| cursor.map_or(true, |c| entry.name.as_str() > c);
        let limit = count.unwrap_or(usize::MAX);

        match self {
            DirectoryView::OverlayOnly { entries } => entries
                .iter()
                .filter(|e| past_cursor(*e))
                .take(limit)
                .cloned()
                .collect(),
            DirectoryView::BaseOnly { entries, hide } => entries
                .iter()
                .filter(|e| past_cursor(*e) && !hide(e.name.as_str()))
                .take(limit)
                .cloned()
                .collect(),
            DirectoryView::Union { base, overlay, hide } => {
                // overlay entries shadow base entries of the same name
                let mut merged: BTreeMap<&str, &DirEntry> = BTreeMap::new();
                for entry in base.iter().chain(overlay.iter()) {
                    merged.insert(entry.name.as_str(), entry);
                }
                merged
                    .into_values()
                    .filter(|e| past_cursor(*e) && !hide(e.name.as_str()))
                    .take(limit)
                    .cloned()
                    .collect()
            }
        }
    }

    /// Every visible entry, sorted by name.
    pub fn entries(&self) -> Vec<DirEntry> {
        self.read_entries(None, None)
    }
}

impl fmt::Debug for DirectoryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryView::BaseOnly { entries, .. } => f
                .debug_struct("BaseOnly")
                .field("entries", &entries.len())
                .finish_non_exhaustive(),
            DirectoryView::OverlayOnly { entries } => f
                .debug_struct("OverlayOnly")
                .field("entries", &entries.len())
                .finish(),
            DirectoryView::Union { base, overlay, .. } => f
                .debug_struct("Union")
                .field("base", &base.len())
                .field("overlay", &overlay.len())
                .finish_non_exhaustive(),
        }
    }
}

/// An open directory: a [`DirectoryView`] plus a name cursor for paged reads.
#[derive(Debug)]
pub struct DirHandle {
    path: String,
    meta: Metadata,
    view: DirectoryView,
    cursor: Option<String>,
}

impl DirHandle {
    pub fn new(path: impl Into<String>, meta: Metadata, view: DirectoryView) -> Self {
        DirHandle {
            path: path.into(),
            meta,
            view,
            cursor: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// The merged listing behind this handle.
    pub fn view(&self) -> &DirectoryView {
        &self.view
    }

    /// Next page of entries; `None` or `Some(0)` reads everything left.
    /// Returns an empty vector once the listing is exhausted.
    pub fn read_dir(&mut self, count: Option<usize>) -> Vec<DirEntry> {
        let count = count.filter(|&n| n > 0);
        let page = self.view.read_entries(self.cursor.as_deref(), count);
        if let Some(last) = page.last() {
            self.cursor = Some(last.name.clone());
        }
        page
    }

    /// Restart paged reads from the first entry. Entries hidden since the
    /// last pass stay hidden.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }
}
