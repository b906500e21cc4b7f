use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, Row};
use std::path::Path;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY,
    text TEXT
);

CREATE TABLE IF NOT EXISTS media (
    surrogate_id INTEGER PRIMARY KEY AUTOINCREMENT,
    media_identifier TEXT,
    post_id INTEGER,
    source_url TEXT,
    kind TEXT,
    FOREIGN KEY(post_id) REFERENCES posts(id)
);

CREATE INDEX IF NOT EXISTS idx_media_post_id ON media(post_id);
"#;

/// The attachment media types this archiver knows how to name and render.
/// Anything else coming back from the API is stored verbatim but skipped
/// by the downloader and the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

impl MediaKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "animated_gif" => Some(MediaKind::AnimatedGif),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::AnimatedGif => "gif",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MediaRecord {
    pub surrogate_id: i64,
    pub media_identifier: String,
    pub post_id: i64,
    pub source_url: String,
    pub kind: String,
}

impl MediaRecord {
    pub fn media_kind(&self) -> Option<MediaKind> {
        MediaKind::parse(&self.kind)
    }
}

/// A post as fetched from the remote API, ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewMediaAttachment {
    pub media_identifier: String,
    pub source_url: String,
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// The post id was already archived; nothing was written.
    Duplicate,
}

/// Repository over the archive database. All access goes through this
/// object; there is no ambient global connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let existed = db_path.exists();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign key enforcement")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;

        if !existed {
            info!("Created new archive database at {}", db_path.display());
        } else {
            debug!("Opened archive database at {}", db_path.display());
        }

        Ok(Store { conn })
    }

    /// The highest post id stored so far, used as the since-id watermark
    /// for the next fetch. `None` means the archive is empty and the whole
    /// account history should be fetched.
    pub fn max_post_id(&self) -> Result<Option<i64>> {
        let max = self
            .conn
            .query_row("SELECT MAX(id) FROM posts", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .context("Failed to query watermark")?;
        Ok(max)
    }

    /// Inserts a post and all of its attachments as one transaction.
    ///
    /// The post insert runs first; a primary-key collision rolls the
    /// transaction back and reports `Duplicate` without touching the media
    /// table. Any other failure (including a foreign-key violation, which
    /// cannot happen once the post insert succeeded) propagates.
    pub fn insert_post_with_media(
        &mut self,
        post: &NewPost,
        media: &[NewMediaAttachment],
    ) -> Result<SaveOutcome> {
        let tx = self.conn.transaction()?;

        match tx.execute(
            "INSERT INTO posts (id, text) VALUES (?1, ?2)",
            params![post.id, post.text],
        ) {
            Ok(_) => {}
            Err(e) if is_primary_key_violation(&e) => {
                debug!("Post {} already archived", post.id);
                return Ok(SaveOutcome::Duplicate);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to insert post {}", post.id))
            }
        }

        for attachment in media {
            tx.execute(
                "INSERT INTO media (media_identifier, post_id, source_url, kind)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    attachment.media_identifier,
                    post.id,
                    attachment.source_url,
                    attachment.kind,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert media {} for post {}",
                    attachment.media_identifier, post.id
                )
            })?;
        }

        tx.commit()
            .with_context(|| format!("Failed to commit post {}", post.id))?;
        Ok(SaveOutcome::Inserted)
    }

    /// All posts, most recent first. Post ids are assigned by the remote
    /// service in increasing order, so descending id is reverse
    /// chronological.
    pub fn posts_newest_first(&self) -> Result<Vec<PostRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text FROM posts ORDER BY id DESC")?;
        let posts = stmt
            .query_map([], post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read posts")?;
        Ok(posts)
    }

    /// Attachments for one post, in insertion order.
    pub fn media_for_post(&self, post_id: i64) -> Result<Vec<MediaRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT surrogate_id, media_identifier, post_id, source_url, kind
             FROM media WHERE post_id = ?1 ORDER BY surrogate_id",
        )?;
        let media = stmt
            .query_map(params![post_id], media_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read media for post {}", post_id))?;
        Ok(media)
    }

    /// Every attachment row in the archive; the downloader's work list.
    pub fn all_media(&self) -> Result<Vec<MediaRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT surrogate_id, media_identifier, post_id, source_url, kind
             FROM media ORDER BY surrogate_id",
        )?;
        let media = stmt
            .query_map([], media_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read media rows")?;
        Ok(media)
    }
}

fn post_from_row(row: &Row) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        text: row.get(1)?,
    })
}

fn media_from_row(row: &Row) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        surrogate_id: row.get(0)?,
        media_identifier: row.get(1)?,
        post_id: row.get(2)?,
        source_url: row.get(3)?,
        kind: row.get(4)?,
    })
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
