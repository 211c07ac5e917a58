//! YouTube URL parsing and classification (spec §6.1).

/// Errors that can occur during YouTube ID extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YoutubeIdError {
    InvalidYoutubeUrl,
    InvalidVideoId,
    VideoIdNotFound,
}

impl std::fmt::Display for YoutubeIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YoutubeIdError::InvalidYoutubeUrl => write!(f, "URL is not a valid YouTube URL"),
            YoutubeIdError::InvalidVideoId => write!(f, "Video ID has invalid format"),
            YoutubeIdError::VideoIdNotFound => write!(f, "Video ID not found in URL"),
        }
    }
}

impl std::error::Error for YoutubeIdError {}

/// What kind of resource a URL points to, as distinguished by the URL
/// resolver adapter (spec §6.1): a single video, a channel (to be expanded
/// into many videos), a playlist, or something the resolver does not
/// recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    Video { video_id: String },
    Channel { identifier: String },
    Playlist { playlist_id: String },
    Unknown,
}

/// Extract an 11-character YouTube video id from a URL, trying each known
/// URL shape in turn.
pub fn extract_youtube_id(url: &str) -> Result<String, YoutubeIdError> {
    let url = url.trim();

    if !is_youtube_domain(url) {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    }

    if let Some(id) = extract_from_watch_url(url) {
        return validate_youtube_id(id);
    }
    if let Some(id) = extract_from_marker(url, "youtu.be/") {
        return validate_youtube_id(id);
    }
    if let Some(id) = extract_from_marker(url, "/embed/") {
        return validate_youtube_id(id);
    }
    if let Some(id) = extract_from_marker(url, "/v/") {
        return validate_youtube_id(id);
    }
    if let Some(id) = extract_from_marker(url, "/shorts/") {
        return validate_youtube_id(id);
    }

    Err(YoutubeIdError::VideoIdNotFound)
}

fn is_youtube_domain(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains("youtube.com") || url.contains("youtu.be")
}

fn extract_from_watch_url(url: &str) -> Option<String> {
    if let Some(pos) = url.find("?v=") {
        extract_id_from_segment(&url[pos + 3..])
    } else if let Some(pos) = url.find("&v=") {
        extract_id_from_segment(&url[pos + 3..])
    } else {
        None
    }
}

fn extract_from_marker(url: &str, marker: &str) -> Option<String> {
    let pos = url.find(marker)?;
    let start = pos + marker.len();
    if start >= url.len() {
        return None;
    }
    extract_id_from_segment(&url[start..])
}

fn extract_id_from_segment(segment: &str) -> Option<String> {
    let delimiters = ['&', '#', '?', '/'];
    let end = segment.find(|c| delimiters.contains(&c)).unwrap_or(segment.len());
    Some(segment[..end].trim().to_string())
}

fn is_valid_youtube_id_chars(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_youtube_id(id: String) -> Result<String, YoutubeIdError> {
    if id.len() != 11 {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    if !is_valid_youtube_id_chars(&id) {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    Ok(id)
}

/// Classify a URL into a `UrlKind` without resolving it (no network call):
/// video ids via `extract_youtube_id`, playlists via `list=`, channels via
/// `@handle` / `channel/UC…` / `c/…` / `user/…`.
pub fn identify_url(url: &str) -> UrlKind {
    if let Ok(video_id) = extract_youtube_id(url) {
        return UrlKind::Video { video_id };
    }

    if let Some(pos) = url.find("list=") {
        if let Some(id) = extract_id_from_segment(&url[pos + 5..]) {
            if !id.is_empty() {
                return UrlKind::Playlist { playlist_id: id };
            }
        }
    }

    for marker in ["/channel/", "/c/", "/user/"] {
        if let Some(pos) = url.find(marker) {
            if let Some(id) = extract_id_from_segment(&url[pos + marker.len()..]) {
                if !id.is_empty() {
                    return UrlKind::Channel { identifier: id };
                }
            }
        }
    }

    if let Some(pos) = url.find('@') {
        // Only treat '@' as a handle marker when it follows a path
        // separator, so mailto-like fragments or query values don't match.
        if pos == 0 || url.as_bytes()[pos - 1] == b'/' {
            if let Some(id) = extract_id_from_segment(&url[pos..]) {
                if id.len() > 1 {
                    return UrlKind::Channel { identifier: id };
                }
            }
        }
    }

    UrlKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_every_known_shape() {
        let cases = [
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/v/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&list=PLxyz",
            "https://youtu.be/dQw4w9WgXcQ?t=30",
        ];
        for url in cases {
            assert_eq!(extract_youtube_id(url).unwrap(), "dQw4w9WgXcQ", "failed for {url}");
        }
    }

    #[test]
    fn rejects_non_youtube_domains() {
        assert_eq!(extract_youtube_id("https://vimeo.com/123"), Err(YoutubeIdError::InvalidYoutubeUrl));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(
            extract_youtube_id("https://youtube.com/watch?v=abc123"),
            Err(YoutubeIdError::InvalidVideoId)
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/watch?v=abc123def!!"),
            Err(YoutubeIdError::InvalidVideoId)
        );
    }

    #[test]
    fn missing_id_is_not_found() {
        assert_eq!(extract_youtube_id("https://youtube.com"), Err(YoutubeIdError::VideoIdNotFound));
    }

    #[test]
    fn identifies_playlists() {
        assert_eq!(
            identify_url("https://youtube.com/playlist?list=PLabc123"),
            UrlKind::Playlist { playlist_id: "PLabc123".to_string() }
        );
    }

    #[test]
    fn identifies_channels_by_handle_and_legacy_paths() {
        assert_eq!(
            identify_url("https://youtube.com/@somecreator"),
            UrlKind::Channel { identifier: "@somecreator".to_string() }
        );
        assert_eq!(
            identify_url("https://youtube.com/channel/UCabcdefghij"),
            UrlKind::Channel { identifier: "UCabcdefghij".to_string() }
        );
        assert_eq!(
            identify_url("https://youtube.com/c/somecreator"),
            UrlKind::Channel { identifier: "somecreator".to_string() }
        );
        assert_eq!(
            identify_url("https://youtube.com/user/somecreator"),
            UrlKind::Channel { identifier: "somecreator".to_string() }
        );
    }

    #[test]
    fn identifies_video_before_channel_markers() {
        assert_eq!(
            identify_url("https://youtube.com/watch?v=dQw4w9WgXcQ"),
            UrlKind::Video { video_id: "dQw4w9WgXcQ".to_string() }
        );
    }

    #[test]
    fn unknown_for_unrelated_urls() {
        assert_eq!(identify_url("https://example.com/"), UrlKind::Unknown);
    }
}
