use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::store::{MediaKind, Store};
use crate::template;

pub const PAGE_TEMPLATE_FILE: &str = "template.html";
pub const POST_TEMPLATE_FILE: &str = "post_template.html";

/// The externally supplied page and per-post templates. Both are plain
/// placeholder documents; see the `template` module for the substitution
/// rules.
#[derive(Debug)]
pub struct Templates {
    pub page: String,
    pub post: String,
}

impl Templates {
    /// Reads both template files from `dir`. A missing template is fatal,
    /// reported before any output is written.
    pub fn load(dir: &Path) -> Result<Self> {
        let page = read_template(&dir.join(PAGE_TEMPLATE_FILE))?;
        let post = read_template(&dir.join(POST_TEMPLATE_FILE))?;
        Ok(Templates { page, post })
    }
}

fn read_template(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Template file not found at '{}'",
            path.display()
        ));
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read template {}", path.display()))
}

/// Renders the whole archive, most recent post first, into one static
/// HTML file, fully overwriting any previous render.
pub fn render_html(
    store: &Store,
    templates: &Templates,
    media_dir: &Path,
    output_path: &Path,
) -> Result<()> {
    let posts = store.posts_newest_first()?;

    let mut rendered_posts = String::new();
    for post in &posts {
        let media_html = media_fragment(store, post.id, media_dir)?;
        let text = html_escape::encode_text(&post.text);

        let vars: HashMap<&str, &str> = HashMap::from([
            ("TEMPLATE_POST_TEXT", text.as_ref()),
            ("TEMPLATE_POST_MEDIA", media_html.as_str()),
        ]);
        let fragment = template::substitute(&templates.post, &vars)
            .with_context(|| format!("Failed to render post {}", post.id))?;
        rendered_posts.push_str(&fragment);
    }

    let vars: HashMap<&str, &str> = HashMap::from([("TEMPLATE_POSTS", rendered_posts.as_str())]);
    let html = template::substitute(&templates.page, &vars).context("Failed to render page")?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, &html)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!(
        "Rendered {} post(s) to {}",
        posts.len(),
        output_path.display()
    );
    Ok(())
}

/// One image or video tag per attachment, in insertion order. Post text
/// and media paths are escaped before they reach the markup; the templates
/// themselves are trusted as given.
fn media_fragment(store: &Store, post_id: i64, media_dir: &Path) -> Result<String> {
    let mut fragment = String::new();
    for media in store.media_for_post(post_id)? {
        let Some(kind) = media.media_kind() else {
            debug!(
                "Not rendering media {} with unknown kind '{}'",
                media.media_identifier, media.kind
            );
            continue;
        };

        let path = local_media_path(media_dir, &media.media_identifier, kind);
        let src = html_escape::encode_double_quoted_attribute(&path);
        match kind {
            MediaKind::Photo => {
                fragment.push_str(&format!("<img src=\"{}\" alt=\"image\"><br>", src));
            }
            MediaKind::Video => {
                fragment.push_str(&format!(
                    "<video src=\"{}\" alt=\"video\" controls></video><br>",
                    src
                ));
            }
            MediaKind::AnimatedGif => {
                fragment.push_str(&format!("<img src=\"{}\" alt=\"gif\"><br>", src));
            }
        }
    }
    Ok(fragment)
}

fn local_media_path(media_dir: &Path, identifier: &str, kind: MediaKind) -> String {
    format!("{}/{}.{}", media_dir.display(), identifier, kind.extension())
}

/// The markdown listing: each post's text, one image/video reference per
/// attachment, then a separator line. Same descending-id order as the HTML
/// render. This is a printable report; it is never written to a file.
pub fn markdown_lines(store: &Store, media_dir: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for post in store.posts_newest_first()? {
        lines.push(post.text.clone());
        for media in store.media_for_post(post.id)? {
            let Some(kind) = media.media_kind() else {
                continue;
            };
            lines.push(format!(
                "![]({})",
                local_media_path(media_dir, &media.media_identifier, kind)
            ));
        }
        lines.push("  ".to_string());
    }
    Ok(lines)
}
