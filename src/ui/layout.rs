use crate::app::{App, NoticeKind};
use crate::filter::ALL;
use crate::gallery::GalleryView;
use crate::menu::CategoryMenu;
use crate::ui::theme::{frost_theme, FrostTheme};
use crate::utils::{capitalize, truncate_label};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use ratatui_image::StatefulImage;

const MIN_CARD_HEIGHT: u16 = 5;

pub fn draw(f: &mut Frame, app: &mut App) {
    let theme = frost_theme();
    let area = f.area();

    // ratatui-image renders directly to terminal, bypassing widget z-order
    let popup_active = app.popup_active();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused))
        .style(Style::default().bg(theme.bg_dark));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let has_notice = app.notice.is_some();
    let constraints = if has_notice {
        vec![
            Constraint::Length(2), // Header
            Constraint::Length(1), // Notice
            Constraint::Min(MIN_CARD_HEIGHT),
            Constraint::Length(1), // Footer
        ]
    } else {
        vec![
            Constraint::Length(2), // Header
            Constraint::Min(MIN_CARD_HEIGHT),
            Constraint::Length(1), // Footer
        ]
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    let mut chunk_idx = 0;

    draw_header(f, app, chunks[chunk_idx], &theme);
    chunk_idx += 1;

    if has_notice {
        draw_notice(f, app, chunks[chunk_idx], &theme);
        chunk_idx += 1;
    }

    draw_gallery(f, app, chunks[chunk_idx], &theme, popup_active);
    chunk_idx += 1;

    draw_footer(f, app, chunks[chunk_idx], &theme);

    if app.menu.is_open() {
        draw_category_menu(f, &app.menu, area, &theme);
    } else if app.show_help {
        draw_help_popup(f, area, &theme);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect, theme: &FrostTheme) {
    let sep = || Span::styled(" │ ", Style::default().fg(theme.fg_muted));

    let mut tabs = vec![Span::styled(
        " FrostGallery ",
        Style::default()
            .fg(theme.accent_highlight)
            .add_modifier(Modifier::BOLD),
    )];

    if app.is_loaded() {
        tabs.push(sep());
        for (i, tab) in app.tabs().iter().enumerate() {
            if i > 0 {
                tabs.push(Span::raw(" "));
            }
            let style = if *tab == app.filter.category {
                Style::default()
                    .fg(theme.bg_dark)
                    .bg(theme.accent_primary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.fg_secondary)
            };
            tabs.push(Span::styled(format!(" {} ", capitalize(tab)), style));
        }
    }

    let count = format!("{} shown", app.view.len());
    let trigger_style = if app.trigger.is_enabled() {
        Style::default().fg(theme.success)
    } else {
        Style::default().fg(theme.warning).add_modifier(Modifier::ITALIC)
    };

    let mut status = vec![
        Span::styled(" ", Style::default()),
        Span::styled(
            format!("[{}]", app.filter.resolution),
            Style::default().fg(theme.accent_secondary),
        ),
    ];

    if !app.filter.query.trim().is_empty() {
        status.push(Span::styled(" ", Style::default()));
        status.push(Span::styled(
            format!("[/{}]", app.filter.query.trim()),
            Style::default().fg(theme.accent_highlight),
        ));
    }

    status.extend(vec![
        sep(),
        Span::styled(count, Style::default().fg(theme.accent_primary)),
        sep(),
        Span::styled(format!("[d] {}", app.trigger.label()), trigger_style),
    ]);

    let paragraph = Paragraph::new(vec![Line::from(tabs), Line::from(status)]);
    f.render_widget(paragraph, area);
}

fn draw_notice(f: &mut Frame, app: &App, area: Rect, theme: &FrostTheme) {
    if let Some(notice) = &app.notice {
        let (icon, color) = match notice.kind {
            NoticeKind::Info => ("ℹ ", theme.accent_primary),
            NoticeKind::Error => ("⚠ ", theme.warning),
        };
        let line = Line::from(vec![
            Span::styled(icon, Style::default().fg(color)),
            Span::styled(notice.text.as_str(), Style::default().fg(color)),
        ]);
        let paragraph = Paragraph::new(line).alignment(Alignment::Center);
        f.render_widget(paragraph, area);
    }
}

fn draw_gallery(f: &mut Frame, app: &mut App, area: Rect, theme: &FrostTheme, popup_active: bool) {
    let detail = match &app.view {
        GalleryView::Cards(_) => None,
        GalleryView::NoResults if app.filter.category != ALL || app.filter.resolution != ALL => {
            Some("x to reset filters".to_string())
        }
        GalleryView::NoResults => Some("Esc in search to clear the query".to_string()),
        GalleryView::LoadFailed(reason) => Some(reason.clone()),
    };

    match detail {
        Some(detail) => {
            let message = app.view.placeholder().unwrap_or_default();
            draw_placeholder(f, area, message, &detail, theme);
        }
        None => draw_cards(f, app, area, theme, popup_active),
    }
}

fn draw_placeholder(f: &mut Frame, area: Rect, message: &str, detail: &str, theme: &FrostTheme) {
    let text = vec![
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(theme.fg_secondary).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(detail.to_string(), Style::default().fg(theme.fg_muted))),
    ];
    let paragraph = Paragraph::new(text).alignment(Alignment::Center);
    f.render_widget(paragraph, center_vertically(area, 2));
}

/// First grid row to draw so the selected row stays on screen
fn first_visible_row(selected_row: usize, visible_rows: usize) -> usize {
    if selected_row >= visible_rows {
        selected_row + 1 - visible_rows
    } else {
        0
    }
}

fn draw_cards(f: &mut Frame, app: &mut App, area: Rect, theme: &FrostTheme, popup_active: bool) {
    let columns = app.grid_columns();
    let card_height = app.config.thumbnails.card_height.max(MIN_CARD_HEIGHT).min(area.height.max(1));
    let card_width = area.width / u16::try_from(columns).unwrap_or(u16::MAX).max(1);
    if card_width < 4 || area.height < MIN_CARD_HEIGHT {
        return;
    }

    let visible_rows = ((area.height / card_height) as usize).max(1);
    let total = app.view.len();
    let start_row = first_visible_row(app.selected / columns, visible_rows);
    let start = start_row * columns;
    let end = (start + visible_rows * columns).min(total);

    // Snapshot what we need before borrowing the thumbnail cache mutably
    let cards: Vec<(usize, usize, String, String)> = app.view.cards()[start..end]
        .iter()
        .enumerate()
        .map(|(i, card)| (start + i, card.index, card.label(), card.download_name.clone()))
        .collect();
    let thumbnails: Vec<(usize, String)> = app.view.cards()[start..end]
        .iter()
        .map(|card| (card.index, card.thumbnail.clone()))
        .collect();

    // Request thumbnails for visible cards only (non-blocking)
    for (index, reference) in &thumbnails {
        app.request_thumbnail(*index, reference);
    }

    for (pos, index, label, download_name) in cards {
        let slot = pos - start;
        let x = area.x + (slot % columns) as u16 * card_width;
        let y = area.y + (slot / columns) as u16 * card_height;
        if y + card_height > area.y + area.height {
            continue;
        }

        let card_area = Rect::new(x, y, card_width, card_height);
        let is_selected = pos == app.selected;

        let border_style = if is_selected {
            Style::default()
                .fg(theme.accent_highlight)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.border)
        };

        let title = truncate_label(&label, card_width.saturating_sub(4) as usize);
        let block = Block::default()
            .title(format!(" {} ", title))
            .title_style(Style::default().fg(if is_selected { theme.fg_primary } else { theme.fg_secondary }))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(theme.bg_medium));

        let inner = block.inner(card_area);
        f.render_widget(block, card_area);

        if inner.height < 2 {
            continue;
        }

        let image_area = Rect::new(inner.x, inner.y, inner.width, inner.height - 1);
        let action_area = Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1);

        let is_loading = app.is_loading(index);
        if popup_active {
            // Images would render over the popup
            draw_centered_text(f, image_area, &truncate_label(&label, image_area.width as usize), theme);
        } else if let Some(protocol) = app.get_thumbnail(index) {
            let image = StatefulImage::new(None);
            f.render_stateful_widget(image, image_area, protocol);
        } else if is_loading {
            let loading = Paragraph::new("...")
                .style(Style::default().fg(theme.accent_primary))
                .alignment(Alignment::Center);
            f.render_widget(loading, center_vertically(image_area, 1));
        } else {
            draw_centered_text(f, image_area, &truncate_label(&label, image_area.width as usize), theme);
        }

        let action = if is_selected {
            Paragraph::new("⤓ Enter download").style(Style::default().fg(theme.accent_highlight))
        } else {
            Paragraph::new(truncate_label(&download_name, action_area.width as usize))
                .style(Style::default().fg(theme.fg_muted))
        };
        f.render_widget(action.alignment(Alignment::Center), action_area);
    }
}

fn draw_centered_text(f: &mut Frame, area: Rect, text: &str, theme: &FrostTheme) {
    let label = Paragraph::new(text.to_string())
        .style(Style::default().fg(theme.fg_secondary))
        .alignment(Alignment::Center);
    f.render_widget(label, center_vertically(area, 1));
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect, theme: &FrostTheme) {
    // Search mode - show query input line
    if app.search_mode {
        let line = Line::from(vec![
            Span::styled("/", Style::default().fg(theme.accent_primary).add_modifier(Modifier::BOLD)),
            Span::styled(app.filter.query.as_str(), Style::default().fg(theme.fg_primary)),
            Span::styled("█", Style::default().fg(theme.accent_primary)), // Cursor
            Span::styled("  Enter keep · Esc clear", Style::default().fg(theme.fg_muted)),
        ]);
        f.render_widget(Paragraph::new(line), area);
        return;
    }

    let sep = Span::styled(" │ ", Style::default().fg(theme.fg_muted));

    let help = Line::from(vec![
        Span::styled("←↑↓→", Style::default().fg(theme.accent_primary)),
        Span::styled(" nav", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("Tab", Style::default().fg(theme.accent_primary)),
        Span::styled(" category", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("c", Style::default().fg(theme.accent_primary)),
        Span::styled(" menu", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("r", Style::default().fg(theme.accent_primary)),
        Span::styled(" res", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("/", Style::default().fg(theme.accent_primary)),
        Span::styled(" search", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("d", Style::default().fg(theme.accent_primary)),
        Span::styled(" zip", Style::default().fg(theme.fg_muted)),
        sep.clone(),
        Span::styled("?", Style::default().fg(theme.accent_primary)),
        Span::styled(" help", Style::default().fg(theme.fg_muted)),
        sep,
        Span::styled("q", Style::default().fg(theme.accent_primary)),
        Span::styled(" quit", Style::default().fg(theme.fg_muted)),
    ]);

    let paragraph = Paragraph::new(help).alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn center_vertically(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(area.x, y, area.width, height)
}

fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn draw_category_menu(f: &mut Frame, menu: &CategoryMenu, area: Rect, theme: &FrostTheme) {
    let visible = menu.visible_items();
    let popup_area = popup_rect(area, 36, visible.len().max(1) as u16 + 4);

    let clear = Block::default().style(Style::default().bg(theme.bg_dark));
    f.render_widget(clear, popup_area);

    let block = Block::default()
        .title(" Categories ")
        .title_style(Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent_primary))
        .style(Style::default().bg(theme.bg_dark));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(theme.fg_muted)),
            Span::styled(menu.filter_text(), Style::default().fg(theme.fg_primary)),
            Span::styled("█", Style::default().fg(theme.accent_primary)),
        ]),
        Line::from(""),
    ];

    if visible.is_empty() {
        lines.push(Line::from(Span::styled(
            "  no match",
            Style::default().fg(theme.fg_muted),
        )));
    }

    // Keep the cursor row in view when the list is taller than the popup
    let rows = inner.height.saturating_sub(2).max(1) as usize;
    let skip = first_visible_row(menu.cursor(), rows);

    for (i, item) in visible.iter().enumerate().skip(skip).take(rows) {
        let label = CategoryMenu::display_label(item);
        if i == menu.cursor() {
            lines.push(Line::from(vec![
                Span::styled("▸ ", Style::default().fg(theme.accent_highlight)),
                Span::styled(
                    label,
                    Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD),
                ),
            ]));
        } else {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(label, Style::default().fg(theme.fg_secondary)),
            ]));
        }
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_help_popup(f: &mut Frame, area: Rect, theme: &FrostTheme) {
    let popup_area = popup_rect(area, 46, 22);

    let clear = Block::default().style(Style::default().bg(theme.bg_dark));
    f.render_widget(clear, popup_area);

    let block = Block::default()
        .title(" ❄️ FrostGallery Help ")
        .title_style(Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent_primary))
        .style(Style::default().bg(theme.bg_dark));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default().fg(theme.accent_highlight).add_modifier(Modifier::BOLD),
        ))
    };
    let entry = |key: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<9}", key), Style::default().fg(theme.accent_primary)),
            Span::styled(what, Style::default().fg(theme.fg_secondary)),
        ])
    };

    let help_text = vec![
        heading("Navigation"),
        entry("h/l ←/→", "Previous / next card"),
        entry("k/j ↑/↓", "Row up / down"),
        Line::from(""),
        heading("Filters"),
        entry("Tab", "Next category"),
        entry("S-Tab", "Previous category"),
        entry("c", "Category menu"),
        entry("r", "Cycle resolution"),
        entry("/", "Search titles"),
        entry("x", "Reset filters"),
        Line::from(""),
        heading("Downloads"),
        entry("Enter", "Save selected wallpaper"),
        entry("d", "Export shown set as .zip"),
        Line::from(""),
        entry("?", "Toggle help"),
        entry("q/Esc", "Quit"),
    ];

    f.render_widget(Paragraph::new(help_text), inner);
}
