use crate::catalog::Catalog;
use crate::filter::FilterState;

/// Placeholder text when the filters match nothing
pub const NO_RESULTS: &str = "No results";
/// Placeholder text when the catalog could not be loaded
pub const LOAD_FAILED: &str = "Failed to load wallpapers";

/// Display-ready descriptor for one wallpaper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Index into `Catalog::wallpapers`
    pub index: usize,
    pub title: String,
    /// Resolution badge appended to the title
    pub badge: Option<String>,
    /// Preview image reference (thumb, else src), loaded lazily
    pub thumbnail: String,
    /// Full image reference behind the card's download control
    pub download: String,
    pub download_name: String,
}

impl Card {
    /// Title with the resolution badge appended
    pub fn label(&self) -> String {
        match &self.badge {
            Some(badge) => format!("{} [{}]", self.title, badge),
            None => self.title.clone(),
        }
    }
}

/// Everything a drawing surface needs to show the gallery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryView {
    Cards(Vec<Card>),
    NoResults,
    LoadFailed(String),
}

impl GalleryView {
    pub fn cards(&self) -> &[Card] {
        match self {
            GalleryView::Cards(cards) => cards,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.cards().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards().is_empty()
    }

    /// Text to show instead of cards, if any
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            GalleryView::Cards(_) => None,
            GalleryView::NoResults => Some(NO_RESULTS),
            GalleryView::LoadFailed(_) => Some(LOAD_FAILED),
        }
    }
}

/// Project catalog + filter into a fresh view. Pure; the previous view is simply replaced.
pub fn render(catalog: &Catalog, filter: &FilterState) -> GalleryView {
    let cards: Vec<Card> = filter
        .apply(catalog)
        .into_iter()
        .filter_map(|index| {
            let wp = catalog.get(index)?;
            Some(Card {
                index,
                title: wp.display_title().to_string(),
                badge: wp.resolution_label().map(str::to_string),
                thumbnail: wp.thumbnail_ref().to_string(),
                download: wp.src.clone(),
                download_name: wp.entry_name(),
            })
        })
        .collect();

    if cards.is_empty() {
        GalleryView::NoResults
    } else {
        GalleryView::Cards(cards)
    }
}

/// View for a catalog that failed to load
pub fn render_failure(message: impl Into<String>) -> GalleryView {
    GalleryView::LoadFailed(message.into())
}
