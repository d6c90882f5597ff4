use crate::catalog::Catalog;
use crate::utils::capitalize;

/// Searchable category picker. Its filter text is local and never touches `FilterState`.
#[derive(Debug, Clone, Default)]
pub struct CategoryMenu {
    items: Vec<String>,
    filter_text: String,
    cursor: usize,
    open: bool,
}

impl CategoryMenu {
    /// Distinct categories across the catalog, sorted alphabetically
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            items: catalog.all_categories(),
            ..Self::default()
        }
    }

    /// Capitalized label for an item
    pub fn display_label(item: &str) -> String {
        capitalize(item)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn open(&mut self) {
        self.open = true;
        self.cursor = 0;
    }

    /// Close on any outside interaction; clears the local filter text
    pub fn close(&mut self) {
        self.open = false;
        self.filter_text.clear();
        self.cursor = 0;
    }

    /// Items containing the filter text (case-insensitive)
    pub fn visible_items(&self) -> Vec<&str> {
        let needle = self.filter_text.trim().to_lowercase();
        self.items
            .iter()
            .filter(|item| needle.is_empty() || item.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn push_char(&mut self, c: char) {
        self.filter_text.push(c);
        self.cursor = 0;
    }

    pub fn backspace(&mut self) {
        self.filter_text.pop();
        self.cursor = 0;
    }

    pub fn next(&mut self) {
        let len = self.visible_items().len();
        if len > 0 {
            self.cursor = (self.cursor + 1) % len;
        }
    }

    pub fn prev(&mut self) {
        let len = self.visible_items().len();
        if len > 0 {
            self.cursor = if self.cursor == 0 { len - 1 } else { self.cursor - 1 };
        }
    }

    /// Pick the highlighted item and close the menu.
    /// The caller applies the returned category to the filter state and re-renders.
    pub fn select(&mut self) -> Option<String> {
        let picked = self
            .visible_items()
            .get(self.cursor)
            .map(|item| item.to_string());
        if picked.is_some() {
            self.close();
        }
        picked
    }
}
