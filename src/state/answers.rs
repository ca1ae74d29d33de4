//! In-memory answer sheet with per-record dirty tracking.

use dashmap::DashMap;
use uuid::Uuid;

use crate::gateway::{AnswerUpsert, SavedAnswer};

/// Mutable state of one question's answer, owned by the [`AnswerStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Question this record belongs to.
    pub question_id: Uuid,
    /// Currently selected choice, if any.
    pub selected_choice: Option<Uuid>,
    /// Whether the student flagged the question for review.
    pub marked: bool,
    /// True since the last confirmed persist of this record.
    pub dirty: bool,
    /// Monotonic change counter; a persist confirmation only clears the
    /// dirty flag when it still matches the revision that was written.
    pub revision: u64,
}

/// Answer sheet holding exactly one record per question for the lifetime of
/// the session. Mutated by student commands, read by the persistence paths.
#[derive(Debug)]
pub struct AnswerStore {
    records: DashMap<Uuid, AnswerRecord>,
}

impl AnswerStore {
    /// Build a store with one clean, empty record per question.
    pub fn new(question_ids: impl IntoIterator<Item = Uuid>) -> Self {
        let records = question_ids
            .into_iter()
            .map(|question_id| {
                (
                    question_id,
                    AnswerRecord {
                        question_id,
                        selected_choice: None,
                        marked: false,
                        dirty: false,
                        revision: 0,
                    },
                )
            })
            .collect();
        Self { records }
    }

    /// Hydrate previously persisted answers for the resume case. Restored
    /// records start clean: the server already holds these values.
    pub fn seed(&self, saved: &[SavedAnswer]) -> usize {
        let mut restored = 0;
        for answer in saved {
            if let Some(mut record) = self.records.get_mut(&answer.question_id) {
                record.selected_choice = answer.selected_choice;
                record.marked = answer.marked;
                record.dirty = false;
                restored += 1;
            }
        }
        restored
    }

    /// Set the selected choice and mark the record dirty. Returns the new
    /// revision, or `None` when the question is unknown.
    pub fn select(&self, question_id: Uuid, choice: Uuid) -> Option<u64> {
        self.records.get_mut(&question_id).map(|mut record| {
            record.selected_choice = Some(choice);
            record.dirty = true;
            record.revision += 1;
            record.revision
        })
    }

    /// Flip the review flag and mark the record dirty. Returns the new
    /// (flag, revision) pair, or `None` when the question is unknown.
    pub fn toggle_mark(&self, question_id: Uuid) -> Option<(bool, u64)> {
        self.records.get_mut(&question_id).map(|mut record| {
            record.marked = !record.marked;
            record.dirty = true;
            record.revision += 1;
            (record.marked, record.revision)
        })
    }

    /// Read-only snapshot of every record that is currently dirty. The flag
    /// is left untouched; it only clears once a persist is confirmed.
    pub fn snapshot_dirty(&self) -> Vec<AnswerRecord> {
        self.records
            .iter()
            .filter(|entry| entry.dirty)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Freshest persistable value of a dirty record, with the revision the
    /// persist must later confirm. `None` when the record is clean.
    pub fn dirty_payload(&self, question_id: Uuid) -> Option<(AnswerUpsert, u64)> {
        let record = self.records.get(&question_id)?;
        if !record.dirty {
            return None;
        }
        Some((
            AnswerUpsert {
                question_id: record.question_id,
                selected_choice: record.selected_choice,
                marked: record.marked,
            },
            record.revision,
        ))
    }

    /// Clear the dirty flag after a confirmed persist of `revision`. A record
    /// edited again since that persist stays dirty; returns whether the flag
    /// was cleared.
    pub fn confirm_saved(&self, question_id: Uuid, revision: u64) -> bool {
        match self.records.get_mut(&question_id) {
            Some(mut record) if record.revision == revision => {
                record.dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of a single record.
    pub fn get(&self, question_id: Uuid) -> Option<AnswerRecord> {
        self.records.get(&question_id).map(|entry| entry.clone())
    }

    /// Snapshot of every record, in no particular order. Callers that need
    /// presentation order re-sort against the exam definition.
    pub fn all(&self) -> Vec<AnswerRecord> {
        self.records.iter().map(|entry| entry.clone()).collect()
    }

    /// Number of records that are currently dirty.
    pub fn dirty_count(&self) -> usize {
        self.records.iter().filter(|entry| entry.dirty).count()
    }
}
