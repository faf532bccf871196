//! Mood service over the `moods` store

use chrono::NaiveDate;
use mylove_store::{Database, IndexSchema, RecordId, RecordStore, StoreError, StoreSchema};
use mylove_util::{
    NetworkStatus, OFFLINE_ERROR_MESSAGE, OperationOutcome, format_iso_date, now,
    safe_offline_operation, today, with_offline_check,
};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::{MAX_NOTE_LENGTH, MoodEntry, MoodError, MoodResult, MoodType};

pub const MOODS_STORE: &str = "moods";
pub const BY_DATE_INDEX: &str = "by-date";

/// Fields rewritten when a mood entry is edited
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoodEdit<'a> {
    mood: MoodType,
    moods: &'a [MoodType],
    note: &'a str,
    timestamp: chrono::DateTime<chrono::Local>,
    synced: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncedMark<'a> {
    synced: bool,
    supabase_id: &'a str,
}

/// Result of one [`MoodService::sync_pending_moods`] round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MoodService {
    store: RecordStore<MoodEntry>,
}

impl MoodService {
    /// Schema hosts must declare for the service to work
    pub fn schema() -> StoreSchema {
        StoreSchema::new(MOODS_STORE).index(IndexSchema::unique(BY_DATE_INDEX, "date"))
    }

    pub fn new(db: &Database) -> MoodResult<Self> {
        let store = db.store::<MoodEntry>(MOODS_STORE)?;
        if store.schema().get_index(BY_DATE_INDEX).is_none() {
            return Err(StoreError::UnknownIndex {
                store: MOODS_STORE.to_string(),
                index: BY_DATE_INDEX.to_string(),
            }
            .into());
        }
        Ok(Self { store })
    }

    /// The underlying store, for operations the service does not wrap
    pub fn store(&self) -> &RecordStore<MoodEntry> {
        &self.store
    }

    /// Log today's mood. The first of `moods` becomes the primary mood.
    ///
    /// Fails if a mood was already logged today.
    pub async fn create(
        &self,
        user_id: &str,
        moods: Vec<MoodType>,
        note: Option<&str>,
    ) -> MoodResult<MoodEntry> {
        let note = note.unwrap_or_default();
        let mood = validate(&moods, note)?;
        let date = today();

        let entry = MoodEntry {
            id: None,
            user_id: user_id.to_string(),
            mood,
            moods,
            note: note.to_string(),
            date,
            timestamp: now(),
            synced: false,
            supabase_id: None,
        };

        let created = self.store.add(entry).await?;
        info!(date = %format_iso_date(date), mood = %mood, "Mood logged");
        Ok(created)
    }

    /// Replace the moods and note of an entry and mark it unsynced
    pub async fn update_mood(
        &self,
        id: RecordId,
        moods: Vec<MoodType>,
        note: Option<&str>,
    ) -> MoodResult<MoodEntry> {
        let note = note.unwrap_or_default();
        let mood = validate(&moods, note)?;

        let edit = MoodEdit {
            mood,
            moods: &moods,
            note,
            timestamp: now(),
            synced: false,
        };
        let updated = self.store.update(id, &edit).await?;

        debug!(id = %id, mood = %mood, "Mood updated");
        Ok(updated)
    }

    pub async fn get_mood_for_date(&self, date: NaiveDate) -> MoodResult<Option<MoodEntry>> {
        let key = format_iso_date(date);
        let entry = self.store.get_from_index(BY_DATE_INDEX, &key).await?;
        debug!(date = %key, found = entry.is_some(), "Mood lookup");
        Ok(entry)
    }

    /// Entries from `start` through `end` inclusive, oldest first
    pub async fn get_moods_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MoodResult<Vec<MoodEntry>> {
        let entries = self
            .store
            .get_range_from_index(BY_DATE_INDEX, &format_iso_date(start), &format_iso_date(end))
            .await?;
        debug!(%start, %end, count = entries.len(), "Moods in range");
        Ok(entries)
    }

    pub async fn get_unsynced_moods(&self) -> MoodResult<Vec<MoodEntry>> {
        let unsynced: Vec<MoodEntry> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|entry| !entry.synced)
            .collect();
        debug!(count = unsynced.len(), "Unsynced moods");
        Ok(unsynced)
    }

    /// Record that an entry now exists remotely under `supabase_id`
    pub async fn mark_as_synced(&self, id: RecordId, supabase_id: &str) -> MoodResult<MoodEntry> {
        let mark = SyncedMark {
            synced: true,
            supabase_id,
        };
        let entry = self.store.update(id, &mark).await?;
        debug!(id = %id, supabase_id, "Mood marked as synced");
        Ok(entry)
    }

    /// Upload every unsynced entry with `upload`, which returns the remote
    /// id, and mark the uploaded ones as synced.
    ///
    /// Fails with [`MoodError::Offline`] without touching anything when the
    /// device is offline. Upload failures are counted, not returned; if the
    /// connection drops mid-round the remaining entries stay pending.
    pub async fn sync_pending_moods<F, Fut, E>(
        &self,
        status: &dyn NetworkStatus,
        mut upload: F,
    ) -> MoodResult<SyncSummary>
    where
        F: FnMut(MoodEntry) -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        with_offline_check(status, "sync-moods", async {
            let pending = self.get_unsynced_moods().await?;
            let mut summary = SyncSummary::default();

            for entry in pending {
                let Some(id) = entry.id else { continue };
                match safe_offline_operation(status, "sync-mood", upload(entry)).await {
                    OperationOutcome::Success(remote_id) => {
                        self.mark_as_synced(id, &remote_id).await?;
                        summary.synced += 1;
                    }
                    OperationOutcome::Failed { message } => {
                        warn!(id = %id, error = %message, "Mood upload failed");
                        summary.failed += 1;
                        summary.errors.push(format!("mood {}: {}", id, message));
                    }
                    OperationOutcome::Offline { .. } => {
                        summary.errors.push(OFFLINE_ERROR_MESSAGE.to_string());
                        break;
                    }
                }
            }

            info!(
                synced = summary.synced,
                failed = summary.failed,
                "Mood sync complete"
            );
            Ok(summary)
        })
        .await
    }

    /// Offset/limit page of entries in the order they were logged
    pub async fn get_page(&self, offset: usize, limit: usize) -> MoodResult<Vec<MoodEntry>> {
        Ok(self.store.get_page(offset, limit).await?)
    }
}

/// Check moods and note, returning the primary mood
fn validate(moods: &[MoodType], note: &str) -> MoodResult<MoodType> {
    let Some(&primary) = moods.first() else {
        return Err(MoodError::Validation(
            "At least one mood must be selected".into(),
        ));
    };
    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(MoodError::Validation(format!(
            "Note cannot exceed {} characters",
            MAX_NOTE_LENGTH
        )));
    }
    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use mylove_store::Location;

    fn service() -> MoodService {
        let db = Database::builder(Location::InMemory)
            .store(MoodService::schema())
            .build()
            .unwrap();
        MoodService::new(&db).unwrap()
    }

    fn entry_on(date: NaiveDate, mood: MoodType) -> MoodEntry {
        MoodEntry {
            id: None,
            user_id: "me".into(),
            mood,
            moods: vec![mood],
            note: String::new(),
            date,
            timestamp: Local::now(),
            synced: false,
            supabase_id: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            validate(&[MoodType::Grateful, MoodType::Tired], "").unwrap(),
            MoodType::Grateful
        );
        assert!(matches!(validate(&[], ""), Err(MoodError::Validation(_))));

        let long = "é".repeat(MAX_NOTE_LENGTH);
        assert!(validate(&[MoodType::Happy], &long).is_ok());
        let too_long = "a".repeat(MAX_NOTE_LENGTH + 1);
        assert!(matches!(
            validate(&[MoodType::Happy], &too_long),
            Err(MoodError::Validation(_))
        ));
    }

    #[test]
    fn test_requires_by_date_index() {
        let db = Database::builder(Location::InMemory)
            .store(StoreSchema::new(MOODS_STORE))
            .build()
            .unwrap();
        assert!(MoodService::new(&db).is_err());
    }

    #[tokio::test]
    async fn test_create_uses_today_and_first_mood() {
        let service = service();

        let created = service
            .create("me", vec![MoodType::Loved, MoodType::Excited], Some("best day"))
            .await
            .unwrap();

        assert!(created.id.is_some());
        assert_eq!(created.mood, MoodType::Loved);
        assert_eq!(created.moods, vec![MoodType::Loved, MoodType::Excited]);
        assert_eq!(created.note, "best day");
        assert_eq!(created.date, today());
        assert!(!created.synced);
        assert!(created.supabase_id.is_none());
    }

    #[tokio::test]
    async fn test_one_entry_per_day() {
        let service = service();
        service.create("me", vec![MoodType::Happy], None).await.unwrap();

        let err = service
            .create("me", vec![MoodType::Sad], None)
            .await
            .unwrap_err();
        assert!(err.is_duplicate_day(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_lookup_by_date_and_range() {
        let service = service();
        for (d, mood) in [(10, MoodType::Happy), (12, MoodType::Sad), (14, MoodType::Loved)] {
            service.store().add(entry_on(day(d), mood)).await.unwrap();
        }

        let valentine = service.get_mood_for_date(day(14)).await.unwrap().unwrap();
        assert_eq!(valentine.mood, MoodType::Loved);
        assert!(service.get_mood_for_date(day(13)).await.unwrap().is_none());

        let range = service.get_moods_in_range(day(11), day(14)).await.unwrap();
        let dates: Vec<NaiveDate> = range.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(12), day(14)]);
    }

    #[tokio::test]
    async fn test_update_and_sync() {
        let service = service();
        let created = service.create("me", vec![MoodType::Tired], None).await.unwrap();
        let id = created.id.unwrap();

        let synced = service.mark_as_synced(id, "remote-1").await.unwrap();
        assert!(synced.synced);
        assert_eq!(synced.supabase_id.as_deref(), Some("remote-1"));
        assert!(service.get_unsynced_moods().await.unwrap().is_empty());

        let updated = service
            .update_mood(id, vec![MoodType::Content], Some("better now"))
            .await
            .unwrap();
        assert_eq!(updated.mood, MoodType::Content);
        assert_eq!(updated.note, "better now");
        assert_eq!(updated.date, created.date);
        assert!(!updated.synced);
        // the remote id survives the edit
        assert_eq!(updated.supabase_id.as_deref(), Some("remote-1"));
        assert_eq!(service.get_unsynced_moods().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_pending_moods() {
        use mylove_util::ConnectivityFlag;

        let service = service();
        for (d, mood) in [(1, MoodType::Happy), (2, MoodType::Sad), (3, MoodType::Loved)] {
            service.store().add(entry_on(day(d), mood)).await.unwrap();
        }

        let offline = ConnectivityFlag::new(false);
        let err = service
            .sync_pending_moods(&offline, |_| async { Ok::<_, String>("x".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, MoodError::Offline(_)));
        assert_eq!(service.get_unsynced_moods().await.unwrap().len(), 3);

        let online = ConnectivityFlag::new(true);
        let summary = service
            .sync_pending_moods(&online, |entry| async move {
                if entry.mood == MoodType::Sad {
                    Err("server said no".to_string())
                } else {
                    Ok(format!("remote-{}", entry.date))
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.synced, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);

        let pending = service.get_unsynced_moods().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mood, MoodType::Sad);

        let loved = service.get_mood_for_date(day(3)).await.unwrap().unwrap();
        assert_eq!(loved.supabase_id.as_deref(), Some("remote-2025-02-03"));
    }

    #[tokio::test]
    async fn test_sync_stops_when_connection_drops() {
        use mylove_util::ConnectivityFlag;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let service = service();
        for (d, mood) in [(1, MoodType::Happy), (2, MoodType::Sad), (3, MoodType::Loved)] {
            service.store().add(entry_on(day(d), mood)).await.unwrap();
        }

        let status = ConnectivityFlag::new(true);
        let uploads = Arc::new(AtomicUsize::new(0));
        let summary = service
            .sync_pending_moods(&status, |entry| {
                let status = status.clone();
                let uploads = uploads.clone();
                async move {
                    uploads.fetch_add(1, Ordering::SeqCst);
                    // connection lost right after the first upload lands
                    status.set_online(false);
                    Ok::<_, String>(format!("remote-{}", entry.date))
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.synced, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.errors, vec![OFFLINE_ERROR_MESSAGE.to_string()]);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);

        let pending = service.get_unsynced_moods().await.unwrap();
        let dates: Vec<NaiveDate> = pending.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(2), day(3)]);

        let first = service.get_mood_for_date(day(1)).await.unwrap().unwrap();
        assert!(first.synced);
        assert_eq!(first.supabase_id.as_deref(), Some("remote-2025-02-01"));
    }

    #[tokio::test]
    async fn test_update_missing_entry() {
        let service = service();
        let err = service
            .update_mood(RecordId::new(9), vec![MoodType::Happy], None)
            .await
            .unwrap_err();
        assert!(matches!(err, MoodError::Store(ref e) if e.is_not_found()));

        let err = service
            .update_mood(RecordId::new(9), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, MoodError::Validation(_)));
    }
}
