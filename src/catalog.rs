use crate::fetch::{FetchError, ImageFetcher, ResourceLocation};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;

/// One wallpaper entry from the catalog data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawWallpaper")]
pub struct Wallpaper {
    /// File identifier, used as the archive entry name
    #[serde(default)]
    pub file: Option<String>,
    /// Display title (falls back to the file identifier)
    #[serde(default)]
    pub title: Option<String>,
    /// Full size image, absolute URL or relative to the catalog
    pub src: String,
    /// Smaller preview image
    #[serde(default)]
    pub thumb: Option<String>,
    /// Resolution label such as "4k" or "hd"
    #[serde(default)]
    pub resolution: Option<String>,
    /// Category set; a single string in the data file becomes a one-element set
    pub categories: Vec<String>,
}

/// On-disk record. Older catalogs use `category`, newer ones `categories`; both are merged.
#[derive(Deserialize)]
struct RawWallpaper {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    title: Option<String>,
    src: String,
    #[serde(default)]
    thumb: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    category: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    categories: Vec<String>,
}

impl From<RawWallpaper> for Wallpaper {
    fn from(raw: RawWallpaper) -> Self {
        let mut categories = raw.category;
        categories.extend(raw.categories);
        Self {
            file: raw.file,
            title: raw.title,
            src: raw.src,
            thumb: raw.thumb,
            resolution: raw.resolution,
            categories: normalize_categories(categories),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub wallpapers: Vec<Wallpaper>,
    /// Location the catalog was loaded from; relative image references resolve against it
    pub base: ResourceLocation,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to fetch catalog from {location}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },

    #[error("malformed catalog at {location}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(category)) => vec![category],
        Some(OneOrMany::Many(categories)) => categories,
    })
}

/// Trim, drop empties and dedup, keeping first-seen order
fn normalize_categories(raw: Vec<String>) -> Vec<String> {
    let mut categories: Vec<String> = Vec::with_capacity(raw.len());
    for category in raw {
        let category = category.trim();
        if !category.is_empty() && !categories.iter().any(|c| c == category) {
            categories.push(category.to_string());
        }
    }
    categories
}

/// Final path segment of a reference, unless it is empty, `.` or `..`
fn safe_segment(reference: &str) -> Option<&str> {
    crate::utils::last_path_segment(reference)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Wallpaper {
    /// Title shown on the card and used by text search: title, then file, then the src file name
    pub fn display_title(&self) -> &str {
        non_empty(&self.title)
            .or_else(|| non_empty(&self.file))
            .or_else(|| crate::utils::last_path_segment(&self.src))
            .unwrap_or(&self.src)
    }

    /// Name of this wallpaper inside an archive or download directory.
    ///
    /// Always a bare file name: directory parts of `file` or `src` are dropped.
    pub fn entry_name(&self) -> String {
        non_empty(&self.file)
            .and_then(safe_segment)
            .or_else(|| safe_segment(&self.src))
            .unwrap_or("wallpaper")
            .to_string()
    }

    /// Image used for the card preview
    pub fn thumbnail_ref(&self) -> &str {
        non_empty(&self.thumb).unwrap_or(&self.src)
    }

    pub fn resolution_label(&self) -> Option<&str> {
        non_empty(&self.resolution)
    }

    /// Exact, case-sensitive category membership
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

impl Catalog {
    pub fn new(wallpapers: Vec<Wallpaper>, base: ResourceLocation) -> Self {
        Self { wallpapers, base }
    }

    /// Parse a JSON array of wallpaper records
    pub fn from_json(data: &[u8], base: ResourceLocation) -> Result<Self, CatalogError> {
        let wallpapers: Vec<Wallpaper> =
            serde_json::from_slice(data).map_err(|source| CatalogError::Parse {
                location: base.to_string(),
                source,
            })?;

        let unrecognized = wallpapers
            .iter()
            .filter(|wp| !crate::utils::is_image_file(Path::new(&wp.entry_name())))
            .count();
        if unrecognized > 0 {
            tracing::debug!(
                count = unrecognized,
                "catalog entries without a known image extension"
            );
        }

        Ok(Self::new(wallpapers, base))
    }

    /// Fetch and parse the catalog once. No retry on failure.
    pub async fn load(
        location: &ResourceLocation,
        fetcher: &dyn ImageFetcher,
    ) -> Result<Self, CatalogError> {
        let data = fetcher
            .fetch(location)
            .await
            .map_err(|source| CatalogError::Fetch {
                location: location.to_string(),
                source,
            })?;

        let catalog = Self::from_json(&data, location.clone())?;
        tracing::info!(
            location = %location,
            wallpapers = catalog.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Resolve a record's `src`/`thumb` reference against the catalog location
    pub fn resolve(&self, reference: &str) -> Result<ResourceLocation, FetchError> {
        self.base.resolve(reference)
    }

    pub fn len(&self) -> usize {
        self.wallpapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallpapers.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Wallpaper> {
        self.wallpapers.get(idx)
    }

    /// Distinct categories across all wallpapers, sorted
    pub fn all_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .wallpapers
            .iter()
            .flat_map(|wp| wp.categories.iter().cloned())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Distinct resolution labels (lowercased), sorted
    pub fn all_resolutions(&self) -> Vec<String> {
        let mut resolutions: Vec<String> = self
            .wallpapers
            .iter()
            .filter_map(|wp| wp.resolution_label())
            .map(|r| r.to_lowercase())
            .collect();
        resolutions.sort();
        resolutions.dedup();
        resolutions
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::path::PathBuf;

    pub fn wallpaper(file: &str, categories: &[&str], resolution: Option<&str>, title: Option<&str>) -> Wallpaper {
        Wallpaper {
            file: Some(file.to_string()),
            title: title.map(str::to_string),
            src: format!("images/{}", file),
            thumb: None,
            resolution: resolution.map(str::to_string),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Catalog rooted at /gallery/wallpapers.json
    pub fn catalog(wallpapers: Vec<Wallpaper>) -> Catalog {
        Catalog::new(
            wallpapers,
            ResourceLocation::Local(PathBuf::from("/gallery/wallpapers.json")),
        )
    }

    /// The two-record catalog used throughout the tests
    pub fn sample() -> Catalog {
        catalog(vec![
            wallpaper("a.jpg", &["nature"], Some("4k"), Some("Forest")),
            wallpaper("b.jpg", &["city"], Some("hd"), None),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MemoryFetcher;
    use std::path::PathBuf;

    fn base() -> ResourceLocation {
        ResourceLocation::Local(PathBuf::from("/gallery/wallpapers.json"))
    }

    #[test]
    fn test_single_category_becomes_set() {
        let json = br#"[{"file":"a.jpg","src":"a.jpg","category":"nature"}]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();
        assert_eq!(catalog.wallpapers[0].categories, vec!["nature"]);
    }

    #[test]
    fn test_category_list_and_alias() {
        let json = br#"[
            {"file":"a.jpg","src":"a.jpg","category":["nature","dark","nature"]},
            {"file":"b.jpg","src":"b.jpg","categories":["city"]},
            {"file":"c.jpg","src":"c.jpg"}
        ]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();
        assert_eq!(catalog.wallpapers[0].categories, vec!["nature", "dark"]);
        assert_eq!(catalog.wallpapers[1].categories, vec!["city"]);
        assert!(catalog.wallpapers[2].categories.is_empty());
    }

    #[test]
    fn test_both_category_keys_are_merged() {
        let json = br#"[{"file":"a.jpg","src":"a.jpg","category":"nature","categories":["dark","nature"]}]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();
        assert_eq!(catalog.wallpapers[0].categories, vec!["nature", "dark"]);
    }

    #[test]
    fn test_entry_name_is_a_bare_file_name() {
        let json = br#"[
            {"file":"sub/a.jpg","src":"a.jpg"},
            {"file":"../../evil.jpg","src":"evil.jpg"},
            {"file":"..","src":"img/real.png"},
            {"file":"dir\\win.png","src":"win.png"},
            {"file":"../","src":"../"}
        ]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();
        let names: Vec<String> = catalog.wallpapers.iter().map(|wp| wp.entry_name()).collect();
        assert_eq!(names, vec!["a.jpg", "evil.jpg", "real.png", "win.png", "wallpaper"]);
    }

    #[test]
    fn test_optional_fields_fallbacks() {
        let json = br#"[
            {"src":"https://cdn.example.com/walls/dusk.png?size=full"},
            {"file":"b.jpg","title":"","src":"b.jpg","thumb":"thumbs/b.jpg"}
        ]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();

        let dusk = &catalog.wallpapers[0];
        assert_eq!(dusk.display_title(), "dusk.png");
        assert_eq!(dusk.entry_name(), "dusk.png");
        assert_eq!(dusk.thumbnail_ref(), dusk.src);
        assert_eq!(dusk.resolution_label(), None);

        let b = &catalog.wallpapers[1];
        assert_eq!(b.display_title(), "b.jpg");
        assert_eq!(b.thumbnail_ref(), "thumbs/b.jpg");
    }

    #[test]
    fn test_malformed_catalog_is_parse_error() {
        let result = Catalog::from_json(b"{not json", base());
        assert!(matches!(result, Err(CatalogError::Parse { .. })));

        let missing_src = Catalog::from_json(br#"[{"file":"a.jpg"}]"#, base());
        assert!(matches!(missing_src, Err(CatalogError::Parse { .. })));
    }

    #[test]
    fn test_categories_and_resolutions() {
        let json = br#"[
            {"file":"a.jpg","src":"a.jpg","category":["nature","dark"],"resolution":"4K"},
            {"file":"b.jpg","src":"b.jpg","category":"city","resolution":"hd"},
            {"file":"c.jpg","src":"c.jpg","category":"dark","resolution":"4k"}
        ]"#;
        let catalog = Catalog::from_json(json, base()).unwrap();
        assert_eq!(catalog.all_categories(), vec!["city", "dark", "nature"]);
        assert_eq!(catalog.all_resolutions(), vec!["4k", "hd"]);
    }

    #[tokio::test]
    async fn test_load_via_fetcher() {
        let fetcher = MemoryFetcher::new().with(
            "/gallery/wallpapers.json",
            br#"[{"file":"a.jpg","src":"images/a.jpg","category":"nature"}]"#,
        );
        let catalog = Catalog::load(&base(), &fetcher).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.resolve(&catalog.wallpapers[0].src).unwrap(),
            ResourceLocation::Local(PathBuf::from("/gallery/images/a.jpg"))
        );
    }

    #[tokio::test]
    async fn test_load_failure_is_fetch_error() {
        let fetcher = MemoryFetcher::new().failing("/gallery/wallpapers.json");
        let result = Catalog::load(&base(), &fetcher).await;
        assert!(matches!(result, Err(CatalogError::Fetch { .. })));
    }
}
