//! Media paths in the storage bucket
//!
//! Post media lives under `postImages/` or `postVideos/`; the folder is the only record of
//! whether a post carries an image or a video.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const IMAGE_FOLDER: &str = "postImages";
pub const VIDEO_FOLDER: &str = "postVideos";
pub const PROFILE_FOLDER: &str = "profiles";

static HTML_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid html tag regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn folder(&self) -> &'static str {
        match self {
            MediaKind::Image => IMAGE_FOLDER,
            MediaKind::Video => VIDEO_FOLDER,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Video => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/*",
            MediaKind::Video => "video/*",
        }
    }

    /// Classify a stored path by its folder prefix
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        let folder = path.split('/').next()?;
        match folder {
            IMAGE_FOLDER => Some(MediaKind::Image),
            VIDEO_FOLDER => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Storage path for a new upload, named by upload time in milliseconds
pub fn storage_path(folder: &str, kind: MediaKind, millis: i64) -> String {
    format!("{}/{}.{}", folder.trim_matches('/'), millis, kind.extension())
}

/// Storage path for new post media
pub fn post_media_path(kind: MediaKind, millis: i64) -> String {
    storage_path(kind.folder(), kind, millis)
}

/// Public URL of an object in a public bucket
pub fn public_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{}/{}",
        base_url.trim_end_matches('/'),
        bucket,
        path.trim_start_matches('/')
    )
}

/// Plain-text preview of a rich-text post body
pub fn strip_html_tags(html: &str) -> String {
    HTML_TAG_REGEX.replace_all(html, "").into_owned()
}
