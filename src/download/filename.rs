//! Local destination paths for queue items.
//!
//! Paths are a pure function of the item and the naming settings; the only
//! side effect is creating the destination directory in
//! [`resolve_local_path`].

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::DownloadError;
use crate::queue::QueueItem;
use crate::settings::{DownloadSettings, FileMode};

/// Extension written by the streaming engine.
pub const STREAM_EXTENSION: &str = "ts";

/// Title rendered when a video has none.
const UNTITLED: &str = "untitled";

/// Basenames that manifest-per-directory hosts give every stream.
const GENERIC_PLAYLIST_NAMES: [&str; 2] = ["playlist.ts", "playlist_eof.ts"];

/// Fallback basename when the URL has no usable last segment.
const FALLBACK_BASENAME: &str = "download.ts";

/// Computes the destination path for `item` and makes sure its directory exists.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the destination directory cannot be created.
pub fn resolve_local_path(
    item: &QueueItem,
    settings: &DownloadSettings,
) -> Result<PathBuf, DownloadError> {
    let path = render_local_path(
        item,
        &settings.filetemplate,
        settings.filemode,
        &settings.directory,
    );
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DownloadError::io(parent, e))?;
    }
    Ok(path)
}

/// Computes the destination path without touching the filesystem.
///
/// - [`FileMode::Simple`]: `base_dir` + URL basename with `.m3u8` rewritten to `.ts`.
/// - [`FileMode::Templated`]: placeholders substituted, illegal characters
///   replaced by `_`, `.ts` appended; an empty rendering falls back to simple mode.
///
/// A generic `playlist.ts`/`playlist_eof.ts` result is renamed after the
/// URL's parent directory so sibling streams do not collide.
#[must_use]
pub fn render_local_path(
    item: &QueueItem,
    template: &str,
    mode: FileMode,
    base_dir: &Path,
) -> PathBuf {
    let url = &item.video.url;
    let default_path = base_dir.join(stream_basename(url));

    let path = match mode {
        FileMode::Simple => default_path,
        FileMode::Templated => {
            let rendered = render_template(template, item);
            if rendered.is_empty() {
                default_path
            } else {
                let name = sanitize_template_name(&rendered);
                let relative = confine_relative(&format!("{name}.{STREAM_EXTENSION}"));
                if relative.as_os_str().is_empty() {
                    default_path
                } else {
                    base_dir.join(relative)
                }
            }
        }
    };

    rename_generic_playlist(path, url)
}

/// Substitutes the `%%...%%` placeholders of `template` with the item's fields.
#[must_use]
pub fn render_template(template: &str, item: &QueueItem) -> String {
    let title = item.video.title.as_deref().unwrap_or(UNTITLED);
    template
        .replace("%%username%%", &item.user.name)
        .replace("%%userid%%", &item.user.id.to_string())
        .replace("%%videoid%%", &item.video.id.to_string())
        .replace("%%videotitle%%", title)
        .replace("%%videotime%%", &item.video.time.to_string())
}

/// Replaces characters that are illegal in filenames on common filesystems.
///
/// Path separators are kept so templates may place files in subdirectories.
pub(crate) fn sanitize_template_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Keeps only normal components so a template cannot escape the base directory.
fn confine_relative(rendered: &str) -> PathBuf {
    Path::new(rendered)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// URL basename with the playlist suffix swapped for the stream extension.
pub(crate) fn stream_basename(url: &str) -> String {
    let basename = url_segments(url).pop().unwrap_or_default();
    if basename.is_empty() {
        return FALLBACK_BASENAME.to_string();
    }
    match basename.strip_suffix(".m3u8") {
        Some(stem) => format!("{stem}.{STREAM_EXTENSION}"),
        None => basename,
    }
}

fn rename_generic_playlist(path: PathBuf, url: &str) -> PathBuf {
    let is_generic = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| GENERIC_PLAYLIST_NAMES.contains(&name));
    if !is_generic {
        return path;
    }
    match url_parent_name(url) {
        Some(parent) => path.with_file_name(format!("{parent}.{STREAM_EXTENSION}")),
        None => path,
    }
}

/// Name of the directory holding the playlist: the second-to-last path
/// segment, or the host when the playlist sits at the root.
pub(crate) fn url_parent_name(url: &str) -> Option<String> {
    let mut segments = url_segments(url);
    segments.pop();
    if let Some(parent) = segments.pop().filter(|s| !s.is_empty()) {
        return Some(sanitize_template_name(&parent));
    }
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}

/// Non-empty path segments of `url`; query and fragment are ignored.
fn url_segments(url: &str) -> Vec<String> {
    if let Ok(parsed) = Url::parse(url)
        && let Some(segments) = parsed.path_segments()
    {
        return segments
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::MediaId;
    use tempfile::TempDir;

    fn item(url: &str) -> QueueItem {
        QueueItem::new(42_i64, url).with_user(7_i64, "Bob")
    }

    fn basename(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_simple_mode_rewrites_m3u8_suffix() {
        let path = render_local_path(
            &item("http://cdn.example.com/vod/abc123.m3u8"),
            "",
            FileMode::Simple,
            Path::new("/downloads"),
        );
        assert_eq!(path, PathBuf::from("/downloads/abc123.ts"));
    }

    #[test]
    fn test_simple_mode_ignores_query_string() {
        let path = render_local_path(
            &item("http://cdn.example.com/vod/abc123.m3u8?token=xyz"),
            "",
            FileMode::Simple,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "abc123.ts");
    }

    #[test]
    fn test_templated_mode_substitutes_placeholders() {
        let path = render_local_path(
            &item("http://x/a.m3u8"),
            "%%username%%_%%videoid%%",
            FileMode::Templated,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "Bob_42.ts");
        assert_eq!(path.parent().unwrap(), Path::new("/downloads"));
    }

    #[test]
    fn test_templated_mode_renders_every_placeholder() {
        let item = item("http://x/a.m3u8")
            .with_title("Evening show")
            .with_time(1_500_000.0);
        let rendered = render_template(
            "%%username%%-%%userid%%-%%videoid%%-%%videotitle%%-%%videotime%%",
            &item,
        );
        assert_eq!(rendered, "Bob-7-42-Evening show-1500000");
    }

    #[test]
    fn test_templated_mode_defaults_title_to_untitled() {
        let rendered = render_template("%%videotitle%%", &item("http://x/a.m3u8"));
        assert_eq!(rendered, "untitled");
    }

    #[test]
    fn test_templated_mode_sanitizes_illegal_characters() {
        let mut item = item("http://x/a.m3u8");
        item.user.name = "a:b?c".to_string();
        let path = render_local_path(
            &item,
            "%%username%%",
            FileMode::Templated,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "a_b_c.ts");
    }

    #[test]
    fn test_templated_mode_empty_rendering_falls_back_to_simple() {
        let mut item = item("http://x/stream9.m3u8");
        item.user.name = String::new();
        let path = render_local_path(
            &item,
            "%%username%%",
            FileMode::Templated,
            Path::new("/downloads"),
        );
        assert_eq!(path, PathBuf::from("/downloads/stream9.ts"));
    }

    #[test]
    fn test_templated_mode_allows_subdirectories_but_not_escape() {
        let path = render_local_path(
            &item("http://x/a.m3u8"),
            "../%%username%%/%%videoid%%",
            FileMode::Templated,
            Path::new("/downloads"),
        );
        assert_eq!(path, PathBuf::from("/downloads/Bob/42.ts"));
    }

    #[test]
    fn test_generic_playlist_name_uses_parent_directory() {
        let path = render_local_path(
            &item("http://cdn.example.com/streams/showXYZ/playlist.m3u8"),
            "",
            FileMode::Simple,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "showXYZ.ts");

        let path = render_local_path(
            &item("http://cdn.example.com/streams/showXYZ/playlist_eof.m3u8"),
            "",
            FileMode::Simple,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "showXYZ.ts");
    }

    #[test]
    fn test_generic_playlist_at_root_uses_host() {
        let path = render_local_path(
            &item("http://cdn.example.com/playlist.m3u8"),
            "",
            FileMode::Simple,
            Path::new("/downloads"),
        );
        assert_eq!(basename(&path), "cdn.example.com.ts");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let item = item("http://x/showA/playlist.m3u8");
        let first = render_local_path(&item, "", FileMode::Simple, Path::new("/d"));
        let second = render_local_path(&item, "", FileMode::Simple, Path::new("/d"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_string_ids_render_verbatim() {
        let mut item = item("http://x/a.m3u8");
        item.video.id = MediaId::from("v-001");
        assert_eq!(render_template("%%videoid%%", &item), "v-001");
    }

    #[test]
    fn test_resolve_local_path_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let settings = DownloadSettings {
            directory: temp.path().to_path_buf(),
            filemode: FileMode::Templated,
            filetemplate: "%%username%%/%%videoid%%".to_string(),
            ..DownloadSettings::default()
        };
        let path = resolve_local_path(&item("http://x/a.m3u8"), &settings).unwrap();
        assert_eq!(path, temp.path().join("Bob").join("42.ts"));
        assert!(temp.path().join("Bob").is_dir());
        assert!(!path.exists());
    }
}
