//! Diffing of stored video state against freshly fetched metadata
//!
//! Pure: no I/O happens here. The result carries the updated record, the
//! field history to append, the counter snapshots to append, and whether the
//! video's assets should be fetched again.

use chrono::{DateTime, Utc};

use crate::db::{
    CounterKind, CreateCounterSnapshot, CreateVideoHistory, PrivacyStatus, VideoRecord,
};
use crate::refresh::store::RefreshWrite;
use crate::services::VideoMetadata;

/// A tracked field whose value changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// History tag: `title`, `desc`, `tags`, `length`, `rating` or `privacy`
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// A counter that moved to a new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterChange {
    pub kind: CounterKind,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// Stored record with the fetched values applied
    pub updated: VideoRecord,
    /// Empty for a video that had never been fetched
    pub fields: Vec<FieldChange>,
    pub counters: Vec<CounterChange>,
    pub redownload: bool,
    pub at: DateTime<Utc>,
}

impl ChangeSet {
    /// Turn the change set into the rows persisted for one video
    pub fn into_write(self) -> RefreshWrite {
        let video_id = &self.updated.id;

        let history = self
            .fields
            .iter()
            .map(|change| CreateVideoHistory {
                video_id: video_id.clone(),
                field: change.field.to_string(),
                old: change.old.clone(),
                new: change.new.clone(),
                updated_at: self.at,
            })
            .collect();

        let counters = self
            .counters
            .iter()
            .map(|change| CreateCounterSnapshot {
                kind: change.kind,
                video_id: video_id.clone(),
                value: change.value,
                recorded_at: self.at,
            })
            .collect();

        RefreshWrite {
            video: self.updated,
            history,
            counters,
        }
    }
}

struct Diff {
    track: bool,
    fields: Vec<FieldChange>,
}

impl Diff {
    fn check(&mut self, field: &'static str, old: &str, new: &str) {
        if self.track && old != new {
            self.fields.push(FieldChange {
                field,
                old: old.to_string(),
                new: new.to_string(),
            });
        }
    }
}

fn apply_counter(
    counters: &mut Vec<CounterChange>,
    kind: CounterKind,
    stored: &mut i64,
    fetched: Option<i64>,
) {
    if let Some(value) = fetched
        && value != *stored
    {
        *stored = value;
        counters.push(CounterChange { kind, value });
    }
}

/// Compare a stored video with what the source reported.
///
/// `fetched` is `None` when the source no longer has a record for a video
/// that was fetched before; such a video is treated as turned private.
/// Field history is only produced once the video has been fetched, the
/// first refresh seeds the record silently and always asks for a download.
pub fn detect_changes(
    stored: &VideoRecord,
    fetched: Option<&VideoMetadata>,
    at: DateTime<Utc>,
) -> ChangeSet {
    let mut updated = stored.clone();
    let mut diff = Diff {
        track: stored.fetched,
        fields: Vec::new(),
    };
    let mut counters = Vec::new();
    let mut redownload = false;
    let mut privacy = stored.privacy_status;

    match fetched {
        Some(meta) => {
            if meta.published_at.is_some() {
                updated.published_at = meta.published_at;
            }
            if let Some(status) = meta.privacy_status() {
                privacy = status;
            }
            if !meta.channel_id.is_empty() {
                updated.channel_id = meta.channel_id.clone();
            }

            diff.check("title", &stored.title, &meta.title);
            updated.title = meta.title.clone();

            diff.check("desc", &stored.description, &meta.description);
            updated.description = meta.description.clone();

            let tags = meta.joined_tags();
            diff.check("tags", &stored.tags, &tags);
            updated.tags = tags;

            if let Some(duration) = &meta.duration {
                diff.check("length", &stored.video_length, duration);
                if *duration != stored.video_length {
                    redownload = true;
                }
                updated.video_length = duration.clone();
            }

            let rating = meta.rating();
            diff.check(
                "rating",
                &stored.rating.code().to_string(),
                &rating.code().to_string(),
            );
            updated.rating = rating;

            apply_counter(
                &mut counters,
                CounterKind::Views,
                &mut updated.view_count,
                meta.view_count,
            );
            apply_counter(
                &mut counters,
                CounterKind::Likes,
                &mut updated.like_count,
                meta.like_count,
            );
            apply_counter(
                &mut counters,
                CounterKind::Comments,
                &mut updated.comment_count,
                meta.comment_count,
            );
        }
        None if stored.fetched => privacy = PrivacyStatus::Private,
        None => {}
    }

    if privacy != stored.privacy_status {
        diff.check(
            "privacy",
            &stored.privacy_status.code().to_string(),
            &privacy.code().to_string(),
        );
        updated.privacy_status = privacy;
    }

    if !stored.fetched {
        redownload = true;
    }

    updated.fetched = true;
    updated.last_updated = Some(at);
    // Stays set until every blobber holds a fetch ticket
    updated.pending_download = stored.pending_download || redownload;

    ChangeSet {
        updated,
        fields: diff.fields,
        counters,
        redownload,
        at,
    }
}
