use crate::catalog::Catalog;
use crate::export::{self, DirectorySaver, ExportPlan, ExportSettings, ExportSummary, ExportTrigger, Transcode};
use crate::fetch::{HttpFetcher, ImageFetcher, ResourceLocation};
use crate::filter::{self, FilterState};
use crate::gallery::{self, Card, GalleryView};
use crate::menu::CategoryMenu;
use crate::ui;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Upper bound for `[thumbnails] grid_columns`
pub const MAX_GRID_COLUMNS: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub keybindings: KeybindingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path or http(s) URL of the catalog data file
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub archive_prefix: String,
    pub transcode: Transcode,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub grid_columns: usize,
    /// Card height in terminal rows, including border and label
    pub card_height: u16,
    /// Maximum number of decoded thumbnails kept in memory
    pub max_cached: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindingsConfig {
    pub next: String,
    pub prev: String,
    pub up: String,
    pub down: String,
    pub download: String,
    pub export: String,
    pub quit: String,
    pub search: String,
    pub category_menu: String,
    pub resolution: String,
    pub next_tab: String,
    pub prev_tab: String,
    pub reset_filters: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            location: "data/wallpapers.json".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::download_dir()
                .map(|p| p.join("frostgallery"))
                .unwrap_or_else(|| PathBuf::from("~/Downloads/frostgallery")),
            archive_prefix: "frostgallery".to_string(),
            transcode: Transcode::None,
            jpeg_quality: 90,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 270,
            grid_columns: 4,
            card_height: 14,
            max_cached: 24,
        }
    }
}

impl Default for KeybindingsConfig {
    fn default() -> Self {
        Self {
            next: "l".to_string(),
            prev: "h".to_string(),
            up: "k".to_string(),
            down: "j".to_string(),
            download: "Enter".to_string(),
            export: "d".to_string(),
            quit: "q".to_string(),
            search: "/".to_string(),
            category_menu: "c".to_string(),
            resolution: "r".to_string(),
            next_tab: "Tab".to_string(),
            prev_tab: "BackTab".to_string(),
            reset_filters: "x".to_string(),
        }
    }
}

impl KeybindingsConfig {
    /// Parse a keybinding string into a KeyCode
    pub fn parse_key(s: &str) -> Option<KeyCode> {
        let s = s.trim();

        // Single character
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(KeyCode::Char(c));
        }

        // Named keys (case insensitive)
        match s.to_lowercase().as_str() {
            "enter" | "return" => Some(KeyCode::Enter),
            "esc" | "escape" => Some(KeyCode::Esc),
            "tab" => Some(KeyCode::Tab),
            "backtab" | "shift+tab" | "s-tab" => Some(KeyCode::BackTab),
            "space" => Some(KeyCode::Char(' ')),
            "backspace" => Some(KeyCode::Backspace),
            "delete" | "del" => Some(KeyCode::Delete),
            "home" => Some(KeyCode::Home),
            "end" => Some(KeyCode::End),
            "pageup" | "pgup" => Some(KeyCode::PageUp),
            "pagedown" | "pgdn" => Some(KeyCode::PageDown),
            "up" | "arrow_up" => Some(KeyCode::Up),
            "down" | "arrow_down" => Some(KeyCode::Down),
            "left" | "arrow_left" => Some(KeyCode::Left),
            "right" | "arrow_right" => Some(KeyCode::Right),
            f if f.starts_with('f') => f[1..].parse::<u8>().ok().filter(|n| (1..=12).contains(n)).map(KeyCode::F),
            _ => None,
        }
    }

    /// Check if a KeyCode matches a keybinding
    pub fn matches(&self, key: KeyCode, binding: &str) -> bool {
        Self::parse_key(binding) == Some(key)
    }
}

impl Config {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "mrmattias", "frostgallery")
    }

    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Directory for the log file written while the TUI owns the terminal
    pub fn log_dir() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Config = toml::from_str(&data)
                .with_context(|| format!("Invalid config: {}", path.display()))?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = toml::to_string_pretty(self)?;
        fs::write(&path, data)?;

        Ok(())
    }

    /// Output directory, expanding ~ if needed
    pub fn output_dir(&self) -> PathBuf {
        crate::utils::expand_tilde(&self.export.output_dir.to_string_lossy())
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            archive_prefix: self.export.archive_prefix.clone(),
            transcode: self.export.transcode,
            jpeg_quality: self.export.jpeg_quality.clamp(1, 100),
        }
    }
}

/// Request to load a thumbnail in background
pub struct ThumbnailRequest {
    pub index: usize,
    pub location: ResourceLocation,
}

/// Response from thumbnail loading
pub struct ThumbnailResponse {
    pub index: usize,
    pub image: image::DynamicImage,
}

/// Events from background threads and tasks
pub enum AppEvent {
    Key(event::KeyEvent),
    ThumbnailReady(ThumbnailResponse),
    ThumbnailFailed(usize),
    ExportFinished(Result<ExportSummary, String>),
    DownloadFinished(Result<PathBuf, String>),
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// One-line status message under the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Info, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, text: text.into() }
    }
}

pub struct App {
    pub config: Config,
    /// `None` when the catalog failed to load; gallery and export stay disabled
    pub catalog: Option<Catalog>,
    pub filter: FilterState,
    pub view: GalleryView,
    pub selected: usize,
    pub should_quit: bool,
    pub image_picker: Option<Picker>,
    pub thumbnail_cache: HashMap<usize, Box<dyn StatefulProtocol>>,
    /// Order of cache entries for LRU eviction
    thumbnail_cache_order: Vec<usize>,
    /// Tracks which thumbnails are currently being loaded
    pub loading_thumbnails: HashSet<usize>,
    failed_thumbnails: HashSet<usize>,
    thumb_request_tx: Option<UnboundedSender<ThumbnailRequest>>,
    event_tx: Option<Sender<AppEvent>>,
    pub show_help: bool,
    pub search_mode: bool,
    pub menu: CategoryMenu,
    pub trigger: ExportTrigger,
    pub notice: Option<Notice>,
    tabs: Vec<String>,
    resolutions: Vec<String>,
    fetcher: Arc<HttpFetcher>,
    saver: Arc<DirectorySaver>,
}

impl App {
    /// Load the catalog once and build the first view. A load failure is kept as state, not returned.
    pub async fn new(config: Config, catalog_location: &str) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new()?);
        let saver = Arc::new(DirectorySaver::new(config.output_dir()));

        let catalog = match ResourceLocation::parse(catalog_location) {
            Ok(location) => Catalog::load(&location, fetcher.as_ref())
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };

        // Try to create image picker for thumbnail rendering
        let image_picker = Picker::from_termios()
            .ok()
            .map(|mut p| {
                p.guess_protocol();
                p
            })
            .or_else(|| Some(Picker::new((8, 16))));

        let mut app = Self {
            config,
            catalog: None,
            filter: FilterState::default(),
            view: GalleryView::NoResults,
            selected: 0,
            should_quit: false,
            image_picker,
            thumbnail_cache: HashMap::new(),
            thumbnail_cache_order: Vec::new(),
            loading_thumbnails: HashSet::new(),
            failed_thumbnails: HashSet::new(),
            thumb_request_tx: None,
            event_tx: None,
            show_help: false,
            search_mode: false,
            menu: CategoryMenu::default(),
            trigger: ExportTrigger::default(),
            notice: None,
            tabs: Vec::new(),
            resolutions: Vec::new(),
            fetcher,
            saver,
        };

        match catalog {
            Ok(catalog) => app.set_catalog(catalog),
            Err(e) => app.set_load_failure(&e),
        }

        Ok(app)
    }

    pub fn set_catalog(&mut self, catalog: Catalog) {
        self.menu = CategoryMenu::from_catalog(&catalog);
        self.tabs = filter::category_tabs(&catalog);
        self.resolutions = filter::resolution_options(&catalog);
        self.catalog = Some(catalog);
        self.refresh();
    }

    pub fn set_load_failure(&mut self, error: &anyhow::Error) {
        tracing::error!(error = %format!("{:#}", error), "catalog load failed");
        self.catalog = None;
        self.view = gallery::render_failure(format!("{:#}", error));
    }

    /// Re-render the gallery from the current filter state
    pub fn refresh(&mut self) {
        if let Some(catalog) = &self.catalog {
            self.view = gallery::render(catalog, &self.filter);
        }

        if self.selected >= self.view.len() {
            self.selected = 0;
        }
    }

    /// Replace the filter state and re-render synchronously
    pub fn set_filter(&mut self, filter: FilterState) {
        if filter != self.filter {
            self.filter = filter;
            self.selected = 0;
        }
        self.refresh();
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.is_some()
    }

    pub fn selected_card(&self) -> Option<&Card> {
        self.view.cards().get(self.selected)
    }

    pub fn grid_columns(&self) -> usize {
        self.config.thumbnails.grid_columns.clamp(1, MAX_GRID_COLUMNS)
    }

    pub fn next_card(&mut self) {
        let len = self.view.len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn prev_card(&mut self) {
        let len = self.view.len();
        if len > 0 {
            self.selected = if self.selected == 0 { len - 1 } else { self.selected - 1 };
        }
    }

    pub fn card_down(&mut self) {
        let target = self.selected + self.grid_columns();
        if target < self.view.len() {
            self.selected = target;
        }
    }

    pub fn card_up(&mut self) {
        if let Some(target) = self.selected.checked_sub(self.grid_columns()) {
            self.selected = target;
        }
    }

    pub fn next_tab(&mut self) {
        if let Some(category) = filter::next_in(&self.tabs, &self.filter.category) {
            self.set_filter(self.filter.with_category(category));
        }
    }

    pub fn prev_tab(&mut self) {
        if let Some(category) = filter::prev_in(&self.tabs, &self.filter.category) {
            self.set_filter(self.filter.with_category(category));
        }
    }

    pub fn cycle_resolution(&mut self) {
        if let Some(resolution) = filter::next_in(&self.resolutions, &self.filter.resolution) {
            self.set_filter(self.filter.with_resolution(resolution));
        }
    }

    pub fn tabs(&self) -> &[String] {
        &self.tabs
    }

    pub fn reset_filters(&mut self) {
        self.set_filter(FilterState::default());
    }

    // ===== Search mode =====

    pub fn enter_search_mode(&mut self) {
        self.search_mode = true;
    }

    /// Leave search mode; `keep` false also clears the query
    pub fn exit_search_mode(&mut self, keep: bool) {
        self.search_mode = false;
        if !keep {
            self.set_filter(self.filter.with_query(""));
        }
    }

    pub fn search_input(&mut self, c: char) {
        let mut query = self.filter.query.clone();
        query.push(c);
        self.set_filter(self.filter.with_query(query));
    }

    pub fn search_backspace(&mut self) {
        let mut query = self.filter.query.clone();
        query.pop();
        self.set_filter(self.filter.with_query(query));
    }

    // ===== Category menu =====

    pub fn open_category_menu(&mut self) {
        if self.menu.items().is_empty() {
            self.notice = Some(Notice::info("No categories in this catalog"));
            return;
        }
        self.menu.open();
    }

    pub fn select_menu_category(&mut self) {
        if let Some(category) = self.menu.select() {
            self.set_filter(self.filter.with_category(category));
        }
    }

    // ===== Downloads =====

    /// Bulk export the current filtered set in the background
    pub fn start_export(&mut self) {
        let Some(catalog) = &self.catalog else {
            self.notice = Some(Notice::error("Catalog not loaded, export unavailable"));
            return;
        };

        let plan = ExportPlan::from_filter(catalog, &self.filter, &self.config.export_settings());
        if plan.is_empty() {
            self.notice = Some(Notice::info(export::NOTHING_TO_EXPORT));
            return;
        }

        // Disabled while an export is running
        let Some(guard) = self.trigger.begin() else {
            return;
        };

        self.notice = Some(Notice::info(format!(
            "Exporting {} wallpapers to {}...",
            plan.len(),
            plan.archive_name
        )));

        let fetcher = Arc::clone(&self.fetcher);
        let saver = Arc::clone(&self.saver);
        let tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            export::run_plan(&plan, fetcher.as_ref(), saver.as_ref(), guard).await
        });
        tokio::spawn(async move {
            let result = join_task(task, "export").await;
            if let Some(tx) = tx {
                let _ = tx.send(AppEvent::ExportFinished(result));
            }
        });
    }

    /// Save the selected card's full image in the background
    pub fn download_selected(&mut self) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        let Some(wp) = self
            .selected_card()
            .and_then(|card| catalog.get(card.index))
            .cloned()
        else {
            return;
        };

        let catalog = catalog.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let saver = Arc::clone(&self.saver);
        let tx = self.event_tx.clone();
        self.notice = Some(Notice::info(format!("Downloading {}...", wp.entry_name())));

        let task = tokio::spawn(async move {
            let result = export::download_one(&catalog, &wp, fetcher.as_ref(), saver.as_ref()).await;
            if let Err(e) = &result {
                tracing::error!(file = %wp.entry_name(), error = ?e, "download failed");
            }
            result
        });
        tokio::spawn(async move {
            let result = join_task(task, "download").await;
            if let Some(tx) = tx {
                let _ = tx.send(AppEvent::DownloadFinished(result));
            }
        });
    }

    pub fn handle_export_finished(&mut self, result: Result<ExportSummary, String>) {
        self.notice = Some(match result {
            Ok(summary) => Notice::info(format!(
                "Saved {} wallpapers to {}",
                summary.entries,
                summary.path.display()
            )),
            Err(_) => Notice::error(export::EXPORT_FAILED),
        });
    }

    pub fn handle_download_finished(&mut self, result: Result<PathBuf, String>) {
        self.notice = Some(match result {
            Ok(path) => Notice::info(format!("Saved {}", path.display())),
            Err(_) => Notice::error("Download failed. See log for details."),
        });
    }

    // ===== Thumbnails =====

    /// Request a thumbnail to be loaded in background
    pub fn request_thumbnail(&mut self, index: usize, reference: &str) {
        // Skip if already loaded, loading or known bad
        if self.thumbnail_cache.contains_key(&index)
            || self.loading_thumbnails.contains(&index)
            || self.failed_thumbnails.contains(&index)
        {
            return;
        }

        let Some(catalog) = &self.catalog else {
            return;
        };

        match catalog.resolve(reference) {
            Ok(location) => {
                if let Some(tx) = &self.thumb_request_tx {
                    if tx.send(ThumbnailRequest { index, location }).is_ok() {
                        self.loading_thumbnails.insert(index);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(reference, error = %e, "unresolvable thumbnail reference");
                self.failed_thumbnails.insert(index);
            }
        }
    }

    /// Handle a loaded thumbnail from the background worker
    pub fn handle_thumbnail_ready(&mut self, response: ThumbnailResponse) {
        self.loading_thumbnails.remove(&response.index);

        if let Some(picker) = &mut self.image_picker {
            // Evict oldest entries if cache is full
            while self.thumbnail_cache.len() >= self.config.thumbnails.max_cached.max(1) {
                if self.thumbnail_cache_order.is_empty() {
                    break;
                }
                let oldest = self.thumbnail_cache_order.remove(0);
                self.thumbnail_cache.remove(&oldest);
            }

            let protocol = picker.new_resize_protocol(response.image);
            self.thumbnail_cache.insert(response.index, protocol);
            self.thumbnail_cache_order.push(response.index);
        }
    }

    pub fn handle_thumbnail_failed(&mut self, index: usize) {
        self.loading_thumbnails.remove(&index);
        self.failed_thumbnails.insert(index);
    }

    /// Check if a thumbnail is ready (also updates LRU order)
    pub fn get_thumbnail(&mut self, index: usize) -> Option<&mut Box<dyn StatefulProtocol>> {
        if self.thumbnail_cache.contains_key(&index) {
            if let Some(pos) = self.thumbnail_cache_order.iter().position(|&i| i == index) {
                self.thumbnail_cache_order.remove(pos);
                self.thumbnail_cache_order.push(index);
            }
        }
        self.thumbnail_cache.get_mut(&index)
    }

    pub fn is_loading(&self, index: usize) -> bool {
        self.loading_thumbnails.contains(&index)
    }

    pub fn set_channels(&mut self, thumb_tx: UnboundedSender<ThumbnailRequest>, event_tx: Sender<AppEvent>) {
        self.thumb_request_tx = Some(thumb_tx);
        self.event_tx = Some(event_tx);
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Any popup that must hide terminal images (they ignore widget z-order)
    pub fn popup_active(&self) -> bool {
        self.show_help || self.menu.is_open()
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        // Help popup blocks other input
        if self.show_help {
            if matches!(code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter) {
                self.show_help = false;
            }
            return;
        }

        if self.menu.is_open() {
            match code {
                KeyCode::Esc => self.menu.close(),
                KeyCode::Enter => self.select_menu_category(),
                KeyCode::Down | KeyCode::Tab => self.menu.next(),
                KeyCode::Up | KeyCode::BackTab => self.menu.prev(),
                KeyCode::Backspace => self.menu.backspace(),
                KeyCode::Char(c) => self.menu.push_char(c),
                _ => {}
            }
            return;
        }

        if self.search_mode {
            match code {
                KeyCode::Esc => self.exit_search_mode(false),
                KeyCode::Enter => self.exit_search_mode(true),
                KeyCode::Backspace => self.search_backspace(),
                KeyCode::Char(c) => self.search_input(c),
                _ => {}
            }
            return;
        }

        let kb = self.config.keybindings.clone();

        if kb.matches(code, &kb.quit) || code == KeyCode::Esc {
            self.should_quit = true;
        } else if kb.matches(code, &kb.next) || code == KeyCode::Right {
            self.next_card();
        } else if kb.matches(code, &kb.prev) || code == KeyCode::Left {
            self.prev_card();
        } else if kb.matches(code, &kb.down) || code == KeyCode::Down {
            self.card_down();
        } else if kb.matches(code, &kb.up) || code == KeyCode::Up {
            self.card_up();
        } else if kb.matches(code, &kb.next_tab) {
            self.next_tab();
        } else if kb.matches(code, &kb.prev_tab) {
            self.prev_tab();
        } else if kb.matches(code, &kb.resolution) {
            self.cycle_resolution();
        } else if kb.matches(code, &kb.search) {
            self.enter_search_mode();
        } else if kb.matches(code, &kb.category_menu) {
            self.open_category_menu();
        } else if kb.matches(code, &kb.reset_filters) {
            self.reset_filters();
        } else if kb.matches(code, &kb.download) {
            self.download_selected();
        } else if kb.matches(code, &kb.export) {
            self.start_export();
        } else if code == KeyCode::Char('?') {
            self.toggle_help();
        }
    }
}

/// Wait for a background task. A panic or cancellation becomes an error like any other failure.
async fn join_task<T, E: std::fmt::Display>(
    task: JoinHandle<std::result::Result<T, E>>,
    what: &str,
) -> std::result::Result<T, String> {
    match task.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => {
            tracing::error!(task = what, error = %e, "background task did not finish");
            Err(e.to_string())
        }
    }
}

pub async fn run_tui(config: Config, catalog_location: String) -> Result<()> {
    let mut app = App::new(config, &catalog_location).await?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Set up channels for background work
    let (thumb_tx, thumb_rx) = unbounded_channel::<ThumbnailRequest>();
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();

    app.set_channels(thumb_tx, event_tx.clone());

    // Spawn thumbnail worker task
    let thumb_size = (app.config.thumbnails.width, app.config.thumbnails.height);
    tokio::spawn(thumbnail_worker(
        thumb_rx,
        event_tx.clone(),
        Arc::clone(&app.fetcher),
        thumb_size,
    ));

    // Spawn event polling thread
    let event_tx_input = event_tx.clone();
    thread::spawn(move || {
        input_worker(event_tx_input);
    });

    let res = run_app(&mut terminal, &mut app, event_rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn load_thumbnail(
    fetcher: &dyn ImageFetcher,
    location: &ResourceLocation,
    (width, height): (u32, u32),
) -> Result<image::DynamicImage> {
    let bytes = fetcher.fetch(location).await?;
    let image = image::load_from_memory(&bytes)
        .with_context(|| format!("Failed to decode {}", location))?;
    Ok(image.thumbnail(width, height))
}

/// Background task that fetches and decodes thumbnails, one at a time
async fn thumbnail_worker(
    mut rx: UnboundedReceiver<ThumbnailRequest>,
    tx: Sender<AppEvent>,
    fetcher: Arc<HttpFetcher>,
    size: (u32, u32),
) {
    while let Some(request) = rx.recv().await {
        let event = match load_thumbnail(fetcher.as_ref(), &request.location, size).await {
            Ok(image) => AppEvent::ThumbnailReady(ThumbnailResponse {
                index: request.index,
                image,
            }),
            Err(e) => {
                tracing::warn!(
                    location = %request.location,
                    error = %format!("{:#}", e),
                    "thumbnail failed"
                );
                AppEvent::ThumbnailFailed(request.index)
            }
        };

        if tx.send(event).is_err() {
            break;
        }
    }
}

/// Background thread that polls for input events
fn input_worker(tx: Sender<AppEvent>) {
    loop {
        if event::poll(std::time::Duration::from_millis(50)).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                if tx.send(AppEvent::Key(key)).is_err() {
                    break;
                }
            }
        } else if tx.send(AppEvent::Tick).is_err() {
            break;
        }
    }
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_rx: Receiver<AppEvent>,
) -> Result<()> {
    let mut needs_redraw = true;

    loop {
        // Only redraw when needed (event received or state changed)
        if needs_redraw {
            terminal.draw(|f| ui::draw(f, app))?;
            needs_redraw = false;
        }

        let events: Vec<AppEvent> = match event_rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(event) => {
                let mut events = vec![event];
                while let Ok(e) = event_rx.try_recv() {
                    events.push(e);
                }
                events
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        };

        for event in events {
            match event {
                AppEvent::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    app.handle_key(key.code);
                    needs_redraw = true;
                }
                AppEvent::ThumbnailReady(response) => {
                    app.handle_thumbnail_ready(response);
                    needs_redraw = true;
                }
                AppEvent::ThumbnailFailed(index) => {
                    app.handle_thumbnail_failed(index);
                    needs_redraw = true;
                }
                AppEvent::ExportFinished(result) => {
                    app.handle_export_finished(result);
                    needs_redraw = true;
                }
                AppEvent::DownloadFinished(result) => {
                    app.handle_download_finished(result);
                    needs_redraw = true;
                }
                AppEvent::Tick => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
