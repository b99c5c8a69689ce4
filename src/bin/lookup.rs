#![forbid(unsafe_code)]

//! Command-line front end for the proxy. Submits one URL through a
//! [`RequestController`], prints whatever it ends up holding and optionally
//! opens the video or audio link.

use std::{fmt::Write as _, path::PathBuf};

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::Parser;
use url::Url;
use vidgrab_tools::{
    config::{ClientOverrides, resolve_client_settings},
    controller::{HttpProxyTransport, Notice, RequestController, SystemOpener},
    logging::init_logging,
    record::VideoRecord,
};

#[derive(Debug, Parser)]
#[command(name = "lookup", about = "Resolve a public video URL through the proxy")]
struct LookupArgs {
    /// Public video URL, e.g. https://www.tiktok.com/@user/video/123
    url: String,
    /// Proxy base URL (defaults to PROXY_BASE_URL or http://127.0.0.1:5000).
    #[arg(long)]
    proxy: Option<String>,
    /// Open the un-watermarked video once resolved.
    #[arg(long)]
    open_video: bool,
    /// Open the audio track once resolved.
    #[arg(long)]
    open_audio: bool,
    /// Print the normalized record as JSON.
    #[arg(long)]
    json: bool,
    /// Alternate `.env` file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = LookupArgs::parse();

    let settings = resolve_client_settings(ClientOverrides {
        proxy_base_url: args.proxy.clone(),
        env_path: args.env_file.clone(),
    })?;
    let base = Url::parse(&settings.proxy_base_url)
        .with_context(|| format!("parsing proxy URL {}", settings.proxy_base_url))?;
    let transport = HttpProxyTransport::new(&base).context("building download endpoint")?;
    let controller = RequestController::new(transport);

    let settled = match controller.submit(&args.url).await {
        Ok(settled) => settled,
        Err(err) => {
            print_notice(&err.notice());
            bail!(err);
        }
    };
    if let Some(notice) = settled.notice() {
        print_notice(&notice);
    }

    let Some(record) = controller.current_record() else {
        bail!("lookup did not resolve");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", render_record(&record));
    }

    if args.open_video && !controller.open_video(&SystemOpener).context("opening video")? {
        eprintln!("No video link available for this post");
    }
    if args.open_audio && !controller.open_audio(&SystemOpener).context("opening audio")? {
        eprintln!("No audio track available for this post");
    }

    Ok(())
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::Success(message) => eprintln!("{message}"),
        Notice::Failure(message) => eprintln!("Error: {message}"),
        Notice::Validation(message) => eprintln!("{message}"),
    }
}

fn render_record(record: &VideoRecord) -> String {
    let mut out = String::new();
    let title = if record.title.is_empty() {
        "(untitled)"
    } else {
        record.title.as_str()
    };
    let _ = writeln!(out, "{title}");
    let _ = writeln!(
        out,
        "by {} (@{})",
        record.author.nickname, record.author.username
    );
    let counters = &record.counters;
    let _ = writeln!(
        out,
        "{} plays · {} likes · {} comments · {} shares",
        compact_count(counters.play_count),
        compact_count(counters.like_count),
        compact_count(counters.comment_count),
        compact_count(counters.share_count),
    );
    if let Some(region) = &record.region {
        let _ = writeln!(out, "Region: {region}");
    }
    if let Some(size) = record.size_bytes {
        let _ = writeln!(out, "Size: {}", format_bytes(size));
    }
    if let Some(created) = record.created_at_epoch_seconds.and_then(format_created) {
        let _ = writeln!(out, "Posted: {created}");
    }
    let media = &record.media;
    let _ = writeln!(
        out,
        "Video: {}",
        media.video_url.as_deref().unwrap_or("unavailable")
    );
    match (&media.audio_url, &media.audio_title) {
        (Some(url), Some(title)) => {
            let _ = writeln!(out, "Audio: {url} ({title})");
        }
        (Some(url), None) => {
            let _ = writeln!(out, "Audio: {url}");
        }
        (None, _) => {
            let _ = writeln!(out, "Audio: unavailable");
        }
    }
    if let Some(thumbnail) = &media.thumbnail_url {
        let _ = writeln!(out, "Thumbnail: {thumbnail}");
    }
    out
}

/// 1234 -> "1.2K", 1500000 -> "1.5M". A value that rounds up to 1000 of one
/// unit moves to the next, so 999950 is "1M".
fn compact_count(value: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1_000, "K"), (1_000_000, "M"), (1_000_000_000, "B")];
    if value < UNITS[0].0 {
        return value.to_string();
    }
    for (index, (scale, suffix)) in UNITS.iter().enumerate() {
        // Tenths of the unit, rounded half up.
        let tenths = (u128::from(value) * 10 + u128::from(*scale) / 2) / u128::from(*scale);
        if tenths < 10_000 || index + 1 == UNITS.len() {
            return match tenths % 10 {
                0 => format!("{}{suffix}", tenths / 10),
                fraction => format!("{}.{fraction}{suffix}", tenths / 10),
            };
        }
    }
    value.to_string()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_created(epoch_seconds: i64) -> Option<String> {
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|created| created.format("%Y-%m-%d %H:%M UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgrab_tools::record::{Author, Counters, Media};

    fn sample_record() -> VideoRecord {
        VideoRecord {
            title: "Sunset run".into(),
            author: Author {
                nickname: "Alice".into(),
                username: "alice".into(),
                avatar_url: None,
            },
            media: Media {
                video_url: Some("https://cdn.test/v.mp4".into()),
                audio_url: None,
                audio_title: None,
                thumbnail_url: Some("https://cdn.test/t.jpg".into()),
            },
            counters: Counters {
                play_count: 1_500_000,
                like_count: 2300,
                comment_count: 12,
                share_count: 4,
            },
            region: Some("ID".into()),
            size_bytes: Some(2 * 1024 * 1024),
            created_at_epoch_seconds: Some(1_700_000_000),
        }
    }

    #[test]
    fn compact_count_scales_units() {
        assert_eq!(compact_count(12), "12");
        assert_eq!(compact_count(2300), "2.3K");
        assert_eq!(compact_count(1_000), "1K");
        assert_eq!(compact_count(1_500_000), "1.5M");
        assert_eq!(compact_count(3_000_000_000), "3B");
        assert_eq!(compact_count(999_950), "1M");
        assert_eq!(compact_count(999_949), "999.9K");
        assert_eq!(compact_count(999_999_999), "1B");
    }

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn format_created_renders_utc() {
        assert_eq!(
            format_created(1_700_000_000).as_deref(),
            Some("2023-11-14 22:13 UTC")
        );
    }

    #[test]
    fn render_record_degrades_without_audio() {
        let text = render_record(&sample_record());
        assert!(text.starts_with("Sunset run\n"));
        assert!(text.contains("by Alice (@alice)"));
        assert!(text.contains("1.5M plays · 2.3K likes · 12 comments · 4 shares"));
        assert!(text.contains("Audio: unavailable"));
        assert!(text.contains("Size: 2.00 MB"));
    }

    #[test]
    fn render_record_without_video_link() {
        let mut record = sample_record();
        record.media.video_url = None;
        record.title.clear();
        let text = render_record(&record);
        assert!(text.starts_with("(untitled)"));
        assert!(text.contains("Video: unavailable"));
    }

    #[test]
    fn lookup_args_parse_flags() {
        let args = LookupArgs::try_parse_from([
            "lookup",
            "https://tiktok.com/@a/video/1",
            "--proxy",
            "http://10.0.0.2:5000",
            "--open-video",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.url, "https://tiktok.com/@a/video/1");
        assert_eq!(args.proxy.as_deref(), Some("http://10.0.0.2:5000"));
        assert!(args.open_video);
        assert!(!args.open_audio);
        assert!(args.json);
    }
}
