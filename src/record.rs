#![forbid(unsafe_code)]

//! Normalized video metadata.
//!
//! The upstream resolver speaks loosely shaped JSON. Everything in here turns
//! that envelope into a [`VideoRecord`] exactly once, right after it crosses
//! the trust boundary, so the rest of the crate never inspects raw fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub nickname: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Media links. Any of them may be missing when the upstream only knows a
/// subset; callers must treat absence as "nothing to open".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub play_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub title: String,
    pub author: Author,
    pub media: Media,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_epoch_seconds: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("expected a JSON object for the video result, got {0}")]
    NotAnObject(&'static str),
}

// Field aliases seen across resolver revisions. First match wins.
const TITLE_KEYS: &[&str] = &["title", "desc", "description"];
const NICKNAME_KEYS: &[&str] = &["nickname", "name"];
const USERNAME_KEYS: &[&str] = &["username", "unique_id", "uniqueId"];
const AVATAR_KEYS: &[&str] = &["avatar", "avatarUrl", "avatar_url"];
const VIDEO_KEYS: &[&str] = &["video", "play", "nowm", "video_url", "videoUrl"];
const THUMBNAIL_KEYS: &[&str] = &["thumbnail", "cover", "origin_cover", "thumbnailUrl"];
const MUSIC_KEYS: &[&str] = &["music", "audio"];
const STATS_KEYS: &[&str] = &["stats", "statistics", "counters"];
const PLAY_KEYS: &[&str] = &["play", "play_count", "playCount", "views"];
const LIKE_KEYS: &[&str] = &["like", "like_count", "likeCount", "digg_count", "likes"];
const COMMENT_KEYS: &[&str] = &["comment", "comment_count", "commentCount", "comments"];
const SHARE_KEYS: &[&str] = &["share", "share_count", "shareCount", "shares"];
const CREATED_KEYS: &[&str] = &["create_time", "createTime", "created_at", "createdAt"];
const SIZE_KEYS: &[&str] = &["size", "size_bytes", "sizeBytes"];

/// Converts the `result` object of an upstream envelope into a
/// [`VideoRecord`]. Missing fields become defaults or `None`; only a
/// non-object result is rejected.
pub fn normalize(raw: &Value) -> Result<VideoRecord, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject(json_kind(raw)));
    }

    let author = raw.get("author").unwrap_or(&Value::Null);
    let stats = first_present(raw, STATS_KEYS).unwrap_or(&Value::Null);
    let (audio_url, audio_title) = music_fields(first_present(raw, MUSIC_KEYS));

    // Some revisions put create_time next to the counters, others at the top.
    let created_at_epoch_seconds =
        first_signed(stats, CREATED_KEYS).or_else(|| first_signed(raw, CREATED_KEYS));

    Ok(VideoRecord {
        title: first_text(raw, TITLE_KEYS).unwrap_or_default(),
        author: Author {
            nickname: first_text(author, NICKNAME_KEYS).unwrap_or_default(),
            username: first_text(author, USERNAME_KEYS).unwrap_or_default(),
            avatar_url: first_text(author, AVATAR_KEYS),
        },
        media: Media {
            video_url: media_link(raw, VIDEO_KEYS),
            audio_url,
            audio_title,
            thumbnail_url: media_link(raw, THUMBNAIL_KEYS),
        },
        counters: Counters {
            play_count: first_count(stats, PLAY_KEYS).unwrap_or(0),
            like_count: first_count(stats, LIKE_KEYS).unwrap_or(0),
            comment_count: first_count(stats, COMMENT_KEYS).unwrap_or(0),
            share_count: first_count(stats, SHARE_KEYS).unwrap_or(0),
        },
        region: first_text(raw, &["region"]),
        size_bytes: first_count(raw, SIZE_KEYS),
        created_at_epoch_seconds,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|candidate| !candidate.is_null())
}

fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Media fields are either a bare URL string or an object carrying `url`.
fn media_link(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|candidate| match candidate {
            Value::Object(_) => first_text(candidate, &["url", "noWatermark", "play"]),
            other => as_text(other),
        })
}

fn music_fields(music: Option<&Value>) -> (Option<String>, Option<String>) {
    match music {
        Some(url @ Value::String(_)) => (as_text(url), None),
        Some(music @ Value::Object(_)) => (
            first_text(music, &["url", "play", "play_url"]),
            first_text(music, &["title", "name"]),
        ),
        _ => (None, None),
    }
}

fn first_count(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(coerce_count)
}

fn first_signed(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(coerce_signed)
}

/// Counters are non-negative. Negative input clamps to zero, numeric strings
/// are parsed, anything else is treated as missing.
fn coerce_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_i64().map(|signed| signed.max(0) as u64))
            .or_else(|| number.as_f64().and_then(float_to_count)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(float_to_count))
        }
        _ => None,
    }
}

fn float_to_count(value: f64) -> Option<u64> {
    if !value.is_finite() {
        return None;
    }
    Some(value.max(0.0).trunc() as u64)
}

fn coerce_signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
