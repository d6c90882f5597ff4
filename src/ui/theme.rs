use ratatui::style::Color;

/// Colors used across the gallery UI
#[derive(Debug, Clone, Copy)]
pub struct FrostTheme {
    pub bg_dark: Color,
    pub bg_medium: Color,
    pub border: Color,
    pub border_focused: Color,
    pub fg_primary: Color,
    pub fg_secondary: Color,
    pub fg_muted: Color,
    pub accent_primary: Color,
    pub accent_secondary: Color,
    pub accent_highlight: Color,
    pub success: Color,
    pub warning: Color,
}

/// Nord-ish frost palette
pub fn frost_theme() -> FrostTheme {
    FrostTheme {
        bg_dark: Color::Rgb(46, 52, 64),
        bg_medium: Color::Rgb(59, 66, 82),
        border: Color::Rgb(76, 86, 106),
        border_focused: Color::Rgb(129, 161, 193),
        fg_primary: Color::Rgb(236, 239, 244),
        fg_secondary: Color::Rgb(216, 222, 233),
        fg_muted: Color::Rgb(120, 130, 150),
        accent_primary: Color::Rgb(136, 192, 208),
        accent_secondary: Color::Rgb(143, 188, 187),
        accent_highlight: Color::Rgb(235, 203, 139),
        success: Color::Rgb(163, 190, 140),
        warning: Color::Rgb(208, 135, 112),
    }
}
