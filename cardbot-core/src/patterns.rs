/// File patterns used when ingesting documents into the knowledge base.

/// Path components that are never ingested.
pub fn default_exclude_patterns() -> Vec<String> {
    [
        // Version control
        ".git",
        ".svn",
        ".hg",
        // Build outputs and dependencies
        "target",
        "dist",
        "build",
        "node_modules",
        "__pycache__",
        ".venv",
        // Editors / OS
        ".vscode",
        ".idea",
        ".DS_Store",
        "Thumbs.db",
        // Caches
        ".cache",
        ".qdrant",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Extensions of files that cannot be read as text.
const BINARY_EXTENSIONS: &[&str] = &[
    // Images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp",
    // Office documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // Archives
    "zip", "tar", "gz", "bz2", "7z", "rar",
    // Executables/Libraries
    "exe", "dll", "so", "dylib", "a", "lib",
    // Media
    "mp3", "mp4", "avi", "mov", "mkv", "wav", "flac",
    // Binary data
    "wasm", "bin", "dat", "db", "sqlite", "sqlite3",
];

/// Whether `path` has a known binary extension (case-insensitive).
pub fn is_binary(path: &std::path::Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether any component of `path` matches one of `exclude_patterns`.
pub fn should_exclude(path: &std::path::Path, exclude_patterns: &[String]) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        exclude_patterns.iter().any(|pattern| name == pattern.as_str())
    })
}
