use std::path::{Path, PathBuf};

/// Supported image file extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

/// Check if a path or URL segment names a supported image file
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|&supported| supported == ext)
        })
        .unwrap_or(false)
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Last path segment of a URL or path, with query string and fragment removed.
///
/// Returns `None` when the reference ends in a separator or is empty.
pub fn last_path_segment(reference: &str) -> Option<&str> {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let path = &reference[..end];
    path.rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Uppercase the first character, leave the rest untouched
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate to `max_chars` characters, appending an ellipsis when cut
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        String::new()
    } else if label.chars().count() <= max_chars {
        label.to_string()
    } else {
        // Safe truncation using char boundaries
        let truncated: String = label.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

/// Replace (or add) the extension of a file name
pub fn with_extension(name: &str, ext: &str) -> String {
    match Path::new(name).file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => format!("{}.{}", stem, ext),
        _ => format!("{}.{}", name, ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_path_segment_strips_query() {
        assert_eq!(
            last_path_segment("https://cdn.example.com/img/forest.jpg?w=200#x"),
            Some("forest.jpg")
        );
        assert_eq!(last_path_segment("images/city.png"), Some("city.png"));
        assert_eq!(last_path_segment("https://example.com/dir/"), None);
        assert_eq!(last_path_segment(""), None);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("nature"), "Nature");
        assert_eq!(capitalize("Ökologie"), "Ökologie");
        assert_eq!(capitalize("élan"), "Élan");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("forest", 10), "forest");
        assert_eq!(truncate_label("forest", 4), "for…");
        assert_eq!(truncate_label("forest", 0), "");
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("a.jpg", "png"), "a.png");
        assert_eq!(with_extension("archive.tar.gz", "png"), "archive.tar.png");
        assert_eq!(with_extension("noext", "jpg"), "noext.jpg");
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("dir/b.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
