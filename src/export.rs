use crate::catalog::{Catalog, Wallpaper};
use crate::fetch::{FetchError, ImageFetcher, ResourceLocation};
use crate::filter::{FilterState, ALL};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Trigger label while idle
pub const IDLE_LABEL: &str = "Download All (.zip)";
/// Trigger label while an export is running
pub const BUSY_LABEL: &str = "Preparing...";
/// Notice shown when the filters leave nothing to export
pub const NOTHING_TO_EXPORT: &str = "No wallpapers found for the current filters.";
/// Generic notice for any failed export; details go to the log
pub const EXPORT_FAILED: &str = "Export failed. See log for details.";

/// Folder name used inside the archive before filter segments are appended
const FOLDER_BASE: &str = "wallpapers";

/// Optional re-encoding applied to each image before it goes into the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transcode {
    /// Keep the original bytes
    #[default]
    None,
    Png,
    Jpeg,
}

impl Transcode {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Transcode::None => None,
            Transcode::Png => Some("png"),
            Transcode::Jpeg => Some("jpg"),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Transcode::None => "original",
            Transcode::Png => "PNG",
            Transcode::Jpeg => "JPEG",
        }
    }
}

impl std::str::FromStr for Transcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "original" => Ok(Transcode::None),
            "png" => Ok(Transcode::Png),
            "jpeg" | "jpg" => Ok(Transcode::Jpeg),
            other => Err(format!("unknown format '{}' (expected none, png or jpeg)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub archive_prefix: String,
    pub transcode: Transcode,
    pub jpeg_quality: u8,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            archive_prefix: "frostgallery".to_string(),
            transcode: Transcode::None,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already running")]
    Busy,

    #[error("failed to retrieve {name}")]
    Fetch {
        name: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to transcode {name}")]
    Transcode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to build archive")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to write archive entry")]
    ArchiveIo(#[source] std::io::Error),

    #[error("failed to save {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The export button. Disabled (and relabelled) while a `BusyGuard` is alive.
#[derive(Debug, Clone, Default)]
pub struct ExportTrigger {
    busy: Arc<AtomicBool>,
}

/// Restores the trigger when dropped, whichever way the export ends
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl ExportTrigger {
    pub fn is_enabled(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &'static str {
        if self.is_enabled() {
            IDLE_LABEL
        } else {
            BUSY_LABEL
        }
    }

    /// Disable the trigger. Returns `None` if it is already disabled.
    pub fn begin(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Receives finished files; the host decides where they end up
pub trait SaveTarget: Send + Sync {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Saves into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveTarget for DirectorySaver {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        // Never let a catalog-provided name escape the output directory
        let name = crate::utils::last_path_segment(file_name)
            .filter(|n| *n != "." && *n != "..")
            .unwrap_or("download");
        let path = self.dir.join(name);

        fs::create_dir_all(&self.dir).map_err(|source| ExportError::Save {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, bytes).map_err(|source| ExportError::Save {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// Zip archive with a single top-level folder, built in memory
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    folder: String,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new(folder: &str) -> Result<Self, ExportError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.add_directory(format!("{}/", folder), Self::options())?;
        Ok(Self {
            writer,
            folder: folder.to_string(),
            entries: 0,
        })
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    pub fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), ExportError> {
        self.writer
            .start_file(format!("{}/{}", self.folder, name), Self::options())?;
        self.writer.write_all(bytes).map_err(ExportError::ArchiveIo)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Finalize into a single blob
    pub fn finish(self) -> Result<Vec<u8>, ExportError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

/// One record scheduled for export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// `src` reference, resolved against the catalog location at fetch time
    pub reference: String,
    /// Name inside the archive folder
    pub name: String,
}

/// Export set plus everything needed to build and name the archive
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub entries: Vec<ExportEntry>,
    pub folder: String,
    pub archive_name: String,
    pub transcode: Transcode,
    pub jpeg_quality: u8,
    base: ResourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub archive_name: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The filters matched nothing; no archive work was done
    NothingToExport,
    Saved(ExportSummary),
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

/// Category and resolution segments, skipping "all"
fn filter_segments(filter: &FilterState) -> Vec<String> {
    [filter.category.as_str(), filter.resolution.as_str()]
        .into_iter()
        .filter(|s| *s != ALL && !s.trim().is_empty())
        .map(sanitize_segment)
        .collect()
}

/// `wallpapers`, `wallpapers_nature`, `wallpapers_nature_4k`, ...
pub fn folder_name(filter: &FilterState) -> String {
    let mut parts = vec![FOLDER_BASE.to_string()];
    parts.extend(filter_segments(filter));
    parts.join("_")
}

/// `<prefix>_wallpapers_all.zip` when unfiltered, else `<prefix>_<category>_<resolution>.zip`
pub fn archive_file_name(prefix: &str, filter: &FilterState) -> String {
    let segments = filter_segments(filter);
    if segments.is_empty() {
        format!("{}_{}_all.zip", prefix, FOLDER_BASE)
    } else {
        format!("{}_{}.zip", prefix, segments.join("_"))
    }
}

/// Append `-2`, `-3`, ... before the extension until the name is free
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }

    let path = Path::new(&name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(&name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn entry_name_for(wp: &Wallpaper, transcode: Transcode) -> String {
    let name = wp.entry_name();
    match transcode.extension() {
        Some(ext) => crate::utils::with_extension(&name, ext),
        None => name,
    }
}

impl ExportPlan {
    /// Compute the export set from the current filter state
    pub fn from_filter(catalog: &Catalog, filter: &FilterState, settings: &ExportSettings) -> Self {
        let mut taken = HashSet::new();
        let entries = filter
            .apply(catalog)
            .into_iter()
            .filter_map(|idx| catalog.get(idx))
            .map(|wp| ExportEntry {
                reference: wp.src.clone(),
                name: unique_name(entry_name_for(wp, settings.transcode), &mut taken),
            })
            .collect();

        Self {
            entries,
            folder: folder_name(filter),
            archive_name: archive_file_name(&settings.archive_prefix, filter),
            transcode: settings.transcode,
            jpeg_quality: settings.jpeg_quality,
            base: catalog.base.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Decode and re-encode to the target format, or pass through untouched
pub fn transcode_image(bytes: Vec<u8>, target: Transcode, jpeg_quality: u8) -> Result<Vec<u8>, image::ImageError> {
    match target {
        Transcode::None => Ok(bytes),
        Transcode::Png => {
            let img = image::load_from_memory(&bytes)?;
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, ImageFormat::Png)?;
            Ok(out.into_inner())
        }
        Transcode::Jpeg => {
            // JPEG has no alpha channel
            let img = DynamicImage::ImageRgb8(image::load_from_memory(&bytes)?.to_rgb8());
            let mut out = Vec::new();
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, jpeg_quality))?;
            Ok(out)
        }
    }
}

/// Fetch every entry in order, pack and save. Holding `_guard` keeps the trigger
/// disabled until this returns.
pub async fn run_plan(
    plan: &ExportPlan,
    fetcher: &dyn ImageFetcher,
    saver: &dyn SaveTarget,
    _guard: BusyGuard,
) -> Result<ExportSummary, ExportError> {
    let result = build_and_save(plan, fetcher, saver).await;
    match &result {
        Ok(summary) => tracing::info!(
            path = %summary.path.display(),
            entries = summary.entries,
            "export saved"
        ),
        Err(e) => tracing::error!(
            archive = %plan.archive_name,
            error = ?e,
            "export aborted"
        ),
    }
    result
}

async fn build_and_save(
    plan: &ExportPlan,
    fetcher: &dyn ImageFetcher,
    saver: &dyn SaveTarget,
) -> Result<ExportSummary, ExportError> {
    tracing::info!(
        folder = %plan.folder,
        entries = plan.len(),
        transcode = plan.transcode.display_name(),
        "starting export"
    );

    let mut archive = ArchiveBuilder::new(&plan.folder)?;

    for entry in &plan.entries {
        let location = plan
            .base
            .resolve(&entry.reference)
            .map_err(|source| ExportError::Fetch {
                name: entry.name.clone(),
                source,
            })?;

        let bytes = fetcher
            .fetch(&location)
            .await
            .map_err(|source| ExportError::Fetch {
                name: entry.name.clone(),
                source,
            })?;

        let bytes = transcode_image(bytes, plan.transcode, plan.jpeg_quality).map_err(|source| {
            ExportError::Transcode {
                name: entry.name.clone(),
                source,
            }
        })?;

        archive.add_file(&entry.name, &bytes)?;
        tracing::debug!(entry = %entry.name, size = bytes.len(), "added to archive");
    }

    let entries = archive.entries();
    let blob = archive.finish()?;
    let path = saver.save(&plan.archive_name, &blob)?;

    Ok(ExportSummary {
        path,
        archive_name: plan.archive_name.clone(),
        entries,
    })
}

/// Export the records matching `filter` as one archive.
///
/// An empty export set short-circuits before the trigger is touched or anything is fetched.
pub async fn export(
    catalog: &Catalog,
    filter: &FilterState,
    settings: &ExportSettings,
    fetcher: &dyn ImageFetcher,
    saver: &dyn SaveTarget,
    trigger: &ExportTrigger,
) -> Result<ExportOutcome, ExportError> {
    let plan = ExportPlan::from_filter(catalog, filter, settings);
    if plan.is_empty() {
        tracing::info!(filter = %filter.describe(), "nothing to export");
        return Ok(ExportOutcome::NothingToExport);
    }

    let guard = trigger.begin().ok_or(ExportError::Busy)?;
    run_plan(&plan, fetcher, saver, guard)
        .await
        .map(ExportOutcome::Saved)
}

/// Save a single wallpaper's original image (the card's download control)
pub async fn download_one(
    catalog: &Catalog,
    wp: &Wallpaper,
    fetcher: &dyn ImageFetcher,
    saver: &dyn SaveTarget,
) -> Result<PathBuf, ExportError> {
    let name = wp.entry_name();
    let location = catalog.resolve(&wp.src).map_err(|source| ExportError::Fetch {
        name: name.clone(),
        source,
    })?;
    let bytes = fetcher
        .fetch(&location)
        .await
        .map_err(|source| ExportError::Fetch {
            name: name.clone(),
            source,
        })?;
    saver.save(&name, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{catalog, sample, wallpaper};
    use crate::fetch::testing::MemoryFetcher;
    use std::io::Read;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySaver {
        saved: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MemorySaver {
        fn saved(&self) -> Vec<(String, Vec<u8>)> {
            self.saved.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    impl SaveTarget for MemorySaver {
        fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
            self.saved
                .lock()
                .unwrap()
                .push((file_name.to_string(), bytes.to_vec()));
            Ok(PathBuf::from("/downloads").join(file_name))
        }
    }

    fn sample_fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with("/gallery/images/a.jpg", b"aaaa")
            .with("/gallery/images/b.jpg", b"bbbb")
            .with("/gallery/images/c.jpg", b"cccc")
    }

    /// (name, contents) of every file entry, in archive order
    fn archive_files(blob: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(blob.to_vec())).unwrap();
        let mut files = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            if file.is_dir() {
                continue;
            }
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            files.push((file.name().to_string(), contents));
        }
        files
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_folder_and_archive_names() {
        let filter = FilterState::default().with_category("nature");
        assert_eq!(folder_name(&filter), "wallpapers_nature");
        assert_eq!(archive_file_name("frostgallery", &filter), "frostgallery_nature.zip");

        let filter = filter.with_resolution("4k");
        assert_eq!(folder_name(&filter), "wallpapers_nature_4k");
        assert_eq!(archive_file_name("frostgallery", &filter), "frostgallery_nature_4k.zip");

        let filter = FilterState::default().with_resolution("hd");
        assert_eq!(folder_name(&filter), "wallpapers_hd");

        let filter = FilterState::default();
        assert_eq!(folder_name(&filter), "wallpapers");
        assert_eq!(archive_file_name("frostgallery", &filter), "frostgallery_wallpapers_all.zip");
    }

    #[test]
    fn test_example_plan() {
        let plan = ExportPlan::from_filter(
            &sample(),
            &FilterState::default().with_category("nature"),
            &ExportSettings::default(),
        );
        assert_eq!(plan.folder, "wallpapers_nature");
        assert_eq!(
            plan.entries,
            vec![ExportEntry {
                reference: "images/a.jpg".to_string(),
                name: "a.jpg".to_string()
            }]
        );

        let plan = ExportPlan::from_filter(
            &sample(),
            &FilterState::default().with_category("nature").with_resolution("4k"),
            &ExportSettings::default(),
        );
        assert_eq!(plan.folder, "wallpapers_nature_4k");
    }

    #[test]
    fn test_duplicate_entry_names_are_made_unique() {
        let catalog = catalog(vec![
            wallpaper("a.jpg", &["x"], None, None),
            wallpaper("a.jpg", &["x"], None, None),
            wallpaper("a.jpg", &["x"], None, None),
        ]);
        let plan = ExportPlan::from_filter(&catalog, &FilterState::default(), &ExportSettings::default());
        let names: Vec<&str> = plan.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "a-2.jpg", "a-3.jpg"]);
    }

    fn nested_catalog() -> Catalog {
        let mut records = vec![
            wallpaper("sub/a.jpg", &["x"], None, None),
            wallpaper("sub/a.jpg", &["x"], None, None),
            wallpaper("../../evil.jpg", &["x"], None, None),
        ];
        for wp in &mut records {
            wp.src = "images/a.jpg".to_string();
        }
        catalog(records)
    }

    #[test]
    fn test_entry_names_never_leave_the_folder() {
        let names = |settings: &ExportSettings| -> Vec<String> {
            ExportPlan::from_filter(&nested_catalog(), &FilterState::default(), settings)
                .entries
                .into_iter()
                .map(|e| e.name)
                .collect()
        };

        assert_eq!(names(&ExportSettings::default()), vec!["a.jpg", "a-2.jpg", "evil.jpg"]);

        let png = ExportSettings {
            transcode: Transcode::Png,
            ..ExportSettings::default()
        };
        assert_eq!(names(&png), vec!["a.png", "a-2.png", "evil.png"]);
    }

    #[tokio::test]
    async fn test_archive_entries_are_enclosed() {
        let fetcher = MemoryFetcher::new().with("/gallery/images/a.jpg", b"aaaa");
        let saver = MemorySaver::default();

        export(
            &nested_catalog(),
            &FilterState::default(),
            &ExportSettings::default(),
            &fetcher,
            &saver,
            &ExportTrigger::default(),
        )
        .await
        .unwrap();

        let saved = saver.saved();
        let mut archive = zip::ZipArchive::new(Cursor::new(saved[0].1.clone())).unwrap();
        let mut names = Vec::new();
        for i in 0..archive.len() {
            let file = archive.by_index(i).unwrap();
            assert!(file.enclosed_name().is_some(), "{} escapes the archive", file.name());
            if !file.is_dir() {
                names.push(file.name().to_string());
            }
        }
        assert_eq!(
            names,
            vec!["wallpapers/a.jpg", "wallpapers/a-2.jpg", "wallpapers/evil.jpg"]
        );
    }

    #[tokio::test]
    async fn test_empty_export_set_does_nothing() {
        let fetcher = sample_fetcher();
        let saver = MemorySaver::default();
        let trigger = ExportTrigger::default();

        let outcome = export(
            &sample(),
            &FilterState::default().with_category("space"),
            &ExportSettings::default(),
            &fetcher,
            &saver,
            &trigger,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ExportOutcome::NothingToExport);
        assert!(fetcher.calls().is_empty());
        assert!(saver.saved().is_empty());
        assert!(trigger.is_enabled());
        assert_eq!(trigger.label(), IDLE_LABEL);
    }

    #[tokio::test]
    async fn test_successful_export_contains_one_entry_per_record() {
        let catalog = catalog(vec![
            wallpaper("a.jpg", &["nature"], Some("4k"), Some("Forest")),
            wallpaper("b.jpg", &["city"], Some("hd"), None),
            wallpaper("c.jpg", &["nature", "dark"], Some("4K"), None),
        ]);
        let fetcher = sample_fetcher();
        let saver = MemorySaver::default();
        let trigger = ExportTrigger::default();
        let filter = FilterState::default().with_category("nature").with_resolution("4k");

        let outcome = export(&catalog, &filter, &ExportSettings::default(), &fetcher, &saver, &trigger)
            .await
            .unwrap();

        let summary = match outcome {
            ExportOutcome::Saved(summary) => summary,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.archive_name, "frostgallery_nature_4k.zip");

        // Sequential, in export-set order
        assert_eq!(
            fetcher.calls(),
            vec!["/gallery/images/a.jpg", "/gallery/images/c.jpg"]
        );

        let saved = saver.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "frostgallery_nature_4k.zip");
        assert_eq!(
            archive_files(&saved[0].1),
            vec![
                ("wallpapers_nature_4k/a.jpg".to_string(), b"aaaa".to_vec()),
                ("wallpapers_nature_4k/c.jpg".to_string(), b"cccc".to_vec()),
            ]
        );
        assert!(trigger.is_enabled());
    }

    #[tokio::test]
    async fn test_entry_name_falls_back_to_src_segment() {
        let catalog = catalog(vec![Wallpaper {
            file: None,
            title: Some("Dusk".to_string()),
            src: "images/dusk.jpg?v=2".to_string(),
            thumb: None,
            resolution: None,
            categories: vec!["sky".to_string()],
        }]);
        let fetcher = MemoryFetcher::new().with("/gallery/images/dusk.jpg?v=2", b"dusk");
        let saver = MemorySaver::default();

        export(
            &catalog,
            &FilterState::default(),
            &ExportSettings::default(),
            &fetcher,
            &saver,
            &ExportTrigger::default(),
        )
        .await
        .unwrap();

        let saved = saver.saved();
        assert_eq!(
            archive_files(&saved[0].1),
            vec![("wallpapers/dusk.jpg".to_string(), b"dusk".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_without_archive_and_restores_trigger() {
        let catalog = catalog(vec![
            wallpaper("a.jpg", &["x"], None, None),
            wallpaper("b.jpg", &["x"], None, None),
            wallpaper("c.jpg", &["x"], None, None),
        ]);
        let fetcher = sample_fetcher().failing("/gallery/images/b.jpg");
        let saver = MemorySaver::default();
        let trigger = ExportTrigger::default();

        let result = export(
            &catalog,
            &FilterState::default(),
            &ExportSettings::default(),
            &fetcher,
            &saver,
            &trigger,
        )
        .await;

        assert!(matches!(result, Err(ExportError::Fetch { ref name, .. }) if name == "b.jpg"));
        assert!(saver.saved().is_empty());
        assert_eq!(
            fetcher.calls(),
            vec!["/gallery/images/a.jpg", "/gallery/images/b.jpg"]
        );
        assert!(trigger.is_enabled());
        assert_eq!(trigger.label(), IDLE_LABEL);
    }

    #[tokio::test]
    async fn test_busy_trigger_refuses_second_export() {
        let fetcher = sample_fetcher();
        let saver = MemorySaver::default();
        let trigger = ExportTrigger::default();

        let guard = trigger.begin().unwrap();
        assert!(!trigger.is_enabled());
        assert_eq!(trigger.label(), BUSY_LABEL);
        assert!(trigger.begin().is_none());

        let result = export(
            &sample(),
            &FilterState::default(),
            &ExportSettings::default(),
            &fetcher,
            &saver,
            &trigger,
        )
        .await;
        assert!(matches!(result, Err(ExportError::Busy)));
        assert!(fetcher.calls().is_empty());

        drop(guard);
        assert!(trigger.is_enabled());
    }

    #[tokio::test]
    async fn test_transcode_to_jpeg_renames_entries() {
        let catalog = catalog(vec![wallpaper("a.png", &["x"], None, None)]);
        let fetcher = MemoryFetcher::new().with("/gallery/images/a.png", &png_bytes());
        let saver = MemorySaver::default();
        let settings = ExportSettings {
            transcode: Transcode::Jpeg,
            ..ExportSettings::default()
        };

        export(&catalog, &FilterState::default(), &settings, &fetcher, &saver, &ExportTrigger::default())
            .await
            .unwrap();

        let files = archive_files(&saver.saved()[0].1);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "wallpapers/a.jpg");
        assert_eq!(image::guess_format(&files[0].1).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_transcode_failure_aborts() {
        let fetcher = sample_fetcher();
        let saver = MemorySaver::default();
        let trigger = ExportTrigger::default();
        let settings = ExportSettings {
            transcode: Transcode::Png,
            ..ExportSettings::default()
        };

        let result = export(&sample(), &FilterState::default(), &settings, &fetcher, &saver, &trigger).await;

        assert!(matches!(result, Err(ExportError::Transcode { .. })));
        assert!(saver.saved().is_empty());
        assert!(trigger.is_enabled());
    }

    #[test]
    fn test_transcode_png_roundtrip_format() {
        let out = transcode_image(png_bytes(), Transcode::Png, 90).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);

        let untouched = transcode_image(b"raw".to_vec(), Transcode::None, 90).unwrap();
        assert_eq!(untouched, b"raw");
    }

    #[test]
    fn test_transcode_from_str() {
        assert_eq!("PNG".parse::<Transcode>().unwrap(), Transcode::Png);
        assert_eq!("jpg".parse::<Transcode>().unwrap(), Transcode::Jpeg);
        assert_eq!("none".parse::<Transcode>().unwrap(), Transcode::None);
        assert!("tiff".parse::<Transcode>().is_err());
    }

    #[test]
    fn test_directory_saver_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path().join("out"));

        let path = saver.save("archive.zip", b"zipdata").unwrap();
        assert_eq!(path, dir.path().join("out").join("archive.zip"));
        assert_eq!(fs::read(&path).unwrap(), b"zipdata");

        // Path components in the name are dropped
        let path = saver.save("../../escape.jpg", b"x").unwrap();
        assert_eq!(path, dir.path().join("out").join("escape.jpg"));
    }

    #[tokio::test]
    async fn test_download_one_saves_original() {
        let catalog = sample();
        let fetcher = sample_fetcher();
        let saver = MemorySaver::default();

        let path = download_one(&catalog, &catalog.wallpapers[1], &fetcher, &saver)
            .await
            .unwrap();

        assert_eq!(path, PathBuf::from("/downloads/b.jpg"));
        assert_eq!(saver.saved(), vec![("b.jpg".to_string(), b"bbbb".to_vec())]);
    }
}
