use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::api::{ApiClient, ApiMedia, ApiPost};
use crate::store::{NewMediaAttachment, NewPost, SaveOutcome, Store};

/// Pages through the account timeline from the watermark and persists
/// every new post together with its attachments, one transaction per post.
///
/// Pagination stops at the first page with no data; the remote returns
/// posts newest-first, so everything above `since_id` is covered by the
/// time that page arrives.
pub fn fetch_new(
    client: &ApiClient,
    store: &mut Store,
    account_id: &str,
    since_id: Option<i64>,
) -> Result<()> {
    match since_id {
        Some(id) => info!("Fetching posts newer than id {}", id),
        None => info!("Archive is empty; fetching the entire history"),
    }

    let mut pagination_token: Option<String> = None;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    loop {
        let page = client.fetch_page(account_id, since_id, pagination_token.as_deref())?;

        let posts = match page.data {
            Some(posts) if !posts.is_empty() => posts,
            _ => {
                debug!("Empty page; caught up");
                break;
            }
        };

        let media_by_key = index_page_media(page.includes.map(|i| i.media).unwrap_or_default());
        info!("Saving {} post(s)", posts.len());

        for post in &posts {
            match save_post(store, post, &media_by_key)? {
                SaveOutcome::Inserted => inserted += 1,
                SaveOutcome::Duplicate => {
                    warn!("Post {} is already archived, skipping", post.id);
                    skipped += 1;
                }
            }
        }

        pagination_token = page.meta.and_then(|m| m.next_token);
        if pagination_token.is_none() {
            debug!("No continuation token; caught up");
            break;
        }
    }

    if skipped > 0 {
        info!(
            "Fetch complete: {} new post(s) archived, {} duplicate(s) skipped",
            inserted, skipped
        );
    } else {
        info!("Fetch complete: {} new post(s) archived", inserted);
    }
    Ok(())
}

/// Media objects are resolved per page: each page's posts only reference
/// media included with that same page.
fn index_page_media(media: Vec<ApiMedia>) -> HashMap<String, ApiMedia> {
    if media.is_empty() {
        debug!("No media included with this page");
    }
    media.into_iter().map(|m| (m.media_key.clone(), m)).collect()
}

fn save_post(
    store: &mut Store,
    post: &ApiPost,
    media_by_key: &HashMap<String, ApiMedia>,
) -> Result<SaveOutcome> {
    let id: i64 = post
        .id
        .parse()
        .with_context(|| format!("Post id '{}' is not a valid integer", post.id))?;

    let attachments = resolve_attachments(id, post, media_by_key)?;
    let new_post = NewPost {
        id,
        text: post.text.clone(),
    };
    store.insert_post_with_media(&new_post, &attachments)
}

/// A declared media key that the page's includes cannot resolve is a
/// data-consistency error, never a silent skip.
fn resolve_attachments(
    post_id: i64,
    post: &ApiPost,
    media_by_key: &HashMap<String, ApiMedia>,
) -> Result<Vec<NewMediaAttachment>> {
    let Some(attachments) = &post.attachments else {
        return Ok(Vec::new());
    };

    let mut resolved = Vec::with_capacity(attachments.media_keys.len());
    for media_key in &attachments.media_keys {
        let media = media_by_key.get(media_key).ok_or_else(|| {
            anyhow::anyhow!(
                "Post {} references media key '{}' that is not included with its page",
                post_id,
                media_key
            )
        })?;
        resolved.push(attachment_from_media(post_id, media)?);
    }
    Ok(resolved)
}

fn attachment_from_media(post_id: i64, media: &ApiMedia) -> Result<NewMediaAttachment> {
    // Videos carry their URL in the variants list, last variant being the
    // highest quality; everything else carries a direct url field.
    let source_url = if media.kind == "video" {
        media
            .variants
            .as_ref()
            .and_then(|variants| variants.last())
            .map(|variant| variant.url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Video {} on post {} has no variants",
                    media.media_key,
                    post_id
                )
            })?
    } else {
        media.url.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "Media {} on post {} has no source URL",
                media.media_key,
                post_id
            )
        })?
    };

    Ok(NewMediaAttachment {
        media_identifier: media.media_key.clone(),
        source_url,
        kind: media.kind.clone(),
    })
}
