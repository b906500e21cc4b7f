use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::store::Store;

/// Downloads every archived attachment that is not yet on disk.
///
/// The media directory is an append-only cache keyed by media identifier:
/// a file at the canonical path is never re-downloaded or verified. Any
/// download failure aborts the run; a re-run resumes from whatever is
/// already on disk.
pub fn sync_media(store: &Store, media_dir: &Path) -> Result<()> {
    ensure_dir_exists(media_dir)?;

    let rows = store.all_media()?;
    info!(
        "Syncing {} media attachment(s) into {}",
        rows.len(),
        media_dir.display()
    );

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("post-archiver/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client for media downloads")?;

    let pb = create_progress_bar(rows.len());
    let mut downloaded = 0usize;

    for row in &rows {
        let Some(kind) = row.media_kind() else {
            debug!(
                "Skipping media {} with unknown kind '{}'",
                row.media_identifier, row.kind
            );
            pb.inc(1);
            continue;
        };

        let target = media_dir.join(format!("{}.{}", row.media_identifier, kind.extension()));
        if target.exists() {
            debug!("Media {} already downloaded", row.media_identifier);
            pb.inc(1);
            continue;
        }

        pb.set_message(format!("Downloading {}", row.media_identifier));
        download_media(&client, &row.source_url, &target)?;
        downloaded += 1;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Media sync complete: {} file(s) downloaded", downloaded);
    Ok(())
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.is_dir() {
        debug!("Directory {:?} does not exist, creating...", path);
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

fn download_media(client: &reqwest::blocking::Client, url: &str, file_path: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to download media from {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Failed to download media from {}: {}",
            url,
            response.status()
        ));
    }

    let content = response.bytes()?;
    let mut file = fs::File::create(file_path)
        .with_context(|| format!("Failed to create file: {}", file_path.display()))?;
    file.write_all(&content)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    debug!(
        "Downloaded {} ({} bytes)",
        file_path.display(),
        content.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewMediaAttachment, NewPost};
    use tempfile::tempdir;

    fn store_with_media(dir: &tempfile::TempDir, media: &[NewMediaAttachment]) -> Store {
        let mut store = Store::open(&dir.path().join("archive.db")).unwrap();
        let post = NewPost {
            id: 1,
            text: "post with media".to_string(),
        };
        store.insert_post_with_media(&post, media).unwrap();
        store
    }

    fn attachment(identifier: &str, kind: &str, url: &str) -> NewMediaAttachment {
        NewMediaAttachment {
            media_identifier: identifier.to_string(),
            source_url: url.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_downloads_all_three_kinds_with_extensions() {
        let dir = tempdir().unwrap();
        let mut server = mockito::Server::new();

        let photo = server
            .mock("GET", "/p.jpg")
            .with_body("jpeg-bytes")
            .expect(1)
            .create();
        let video = server
            .mock("GET", "/v.mp4")
            .with_body("mp4-bytes")
            .expect(1)
            .create();
        let gif = server
            .mock("GET", "/g.gif")
            .with_body("gif-bytes")
            .expect(1)
            .create();

        let store = store_with_media(
            &dir,
            &[
                attachment("3_p", "photo", &format!("{}/p.jpg", server.url())),
                attachment("7_v", "video", &format!("{}/v.mp4", server.url())),
                attachment("16_g", "animated_gif", &format!("{}/g.gif", server.url())),
            ],
        );

        let media_dir = dir.path().join("media");
        sync_media(&store, &media_dir).unwrap();

        photo.assert();
        video.assert();
        gif.assert();
        assert_eq!(
            fs::read(media_dir.join("3_p.jpg")).unwrap(),
            b"jpeg-bytes"
        );
        assert_eq!(fs::read(media_dir.join("7_v.mp4")).unwrap(), b"mp4-bytes");
        assert_eq!(fs::read(media_dir.join("16_g.gif")).unwrap(), b"gif-bytes");
    }

    #[test]
    fn test_second_pass_makes_no_requests() {
        let dir = tempdir().unwrap();
        let mut server = mockito::Server::new();

        let mock = server
            .mock("GET", "/p.jpg")
            .with_body("jpeg-bytes")
            .expect(1)
            .create();

        let store = store_with_media(
            &dir,
            &[attachment("3_p", "photo", &format!("{}/p.jpg", server.url()))],
        );

        let media_dir = dir.path().join("media");
        sync_media(&store, &media_dir).unwrap();
        sync_media(&store, &media_dir).unwrap();

        // One request total across both passes.
        mock.assert();
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let dir = tempdir().unwrap();
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/a.bin").expect(0).create();

        let store = store_with_media(
            &dir,
            &[attachment("9_x", "audio", &format!("{}/a.bin", server.url()))],
        );

        let media_dir = dir.path().join("media");
        sync_media(&store, &media_dir).unwrap();

        mock.assert();
        assert_eq!(fs::read_dir(&media_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_download_aborts_run() {
        let dir = tempdir().unwrap();
        let mut server = mockito::Server::new();
        server.mock("GET", "/p.jpg").with_status(404).create();

        let store = store_with_media(
            &dir,
            &[attachment("3_p", "photo", &format!("{}/p.jpg", server.url()))],
        );

        let media_dir = dir.path().join("media");
        let err = sync_media(&store, &media_dir).unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(!media_dir.join("3_p.jpg").exists());
    }

    #[test]
    fn test_creates_media_directory() {
        let dir = tempdir().unwrap();
        let store = store_with_media(&dir, &[]);
        let media_dir = dir.path().join("nested").join("media");

        sync_media(&store, &media_dir).unwrap();
        assert!(media_dir.is_dir());
    }
}
