use crate::catalog::{Catalog, Wallpaper};

/// Selector value that disables the category or resolution predicate
pub const ALL: &str = "all";

/// Current selection. Mutations return a new state; the gallery and export set
/// are always computed from exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub category: String,
    pub resolution: String,
    pub query: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            category: ALL.to_string(),
            resolution: ALL.to_string(),
            query: String::new(),
        }
    }
}

impl FilterState {
    pub fn with_category(&self, category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..self.clone()
        }
    }

    pub fn with_resolution(&self, resolution: impl Into<String>) -> Self {
        Self {
            resolution: resolution.into(),
            ..self.clone()
        }
    }

    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches_category(&self, wp: &Wallpaper) -> bool {
        self.category == ALL || wp.has_category(&self.category)
    }

    pub fn matches_resolution(&self, wp: &Wallpaper) -> bool {
        if self.resolution == ALL {
            return true;
        }
        wp.resolution_label()
            .map(|r| r.to_lowercase() == self.resolution.to_lowercase())
            .unwrap_or(false)
    }

    pub fn matches_query(&self, wp: &Wallpaper) -> bool {
        let query = self.query.trim();
        if query.is_empty() {
            return true;
        }
        wp.display_title()
            .to_lowercase()
            .contains(&query.to_lowercase())
    }

    /// All three predicates ANDed
    pub fn matches(&self, wp: &Wallpaper) -> bool {
        self.matches_category(wp) && self.matches_resolution(wp) && self.matches_query(wp)
    }

    /// Matching catalog indices, in catalog order
    pub fn apply(&self, catalog: &Catalog) -> Vec<usize> {
        catalog
            .wallpapers
            .iter()
            .enumerate()
            .filter(|(_, wp)| self.matches(wp))
            .map(|(i, _)| i)
            .collect()
    }

    /// Short human readable summary for headers and CLI output
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.category != ALL {
            parts.push(format!("category={}", self.category));
        }
        if self.resolution != ALL {
            parts.push(format!("resolution={}", self.resolution));
        }
        if !self.query.trim().is_empty() {
            parts.push(format!("query=\"{}\"", self.query.trim()));
        }
        if parts.is_empty() {
            "all wallpapers".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Category tabs: "all" followed by every distinct category
pub fn category_tabs(catalog: &Catalog) -> Vec<String> {
    let mut tabs = vec![ALL.to_string()];
    tabs.extend(catalog.all_categories());
    tabs
}

/// Resolution selector options: "all" followed by every distinct resolution
pub fn resolution_options(catalog: &Catalog) -> Vec<String> {
    let mut options = vec![ALL.to_string()];
    options.extend(catalog.all_resolutions());
    options
}

/// Option after `current`, wrapping around. Unknown values restart at the first option.
pub fn next_in(options: &[String], current: &str) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let next = match options.iter().position(|o| o == current) {
        Some(pos) => (pos + 1) % options.len(),
        None => 0,
    };
    Some(options[next].clone())
}

/// Option before `current`, wrapping around
pub fn prev_in(options: &[String], current: &str) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let prev = match options.iter().position(|o| o == current) {
        Some(0) | None => options.len() - 1,
        Some(pos) => pos - 1,
    };
    Some(options[prev].clone())
}
