//! In-memory backend over DashMap.
//!
//! Same surface as the SQLite backend, no disk. Used by the test suite
//! and by embedded single-process deployments that accept losing the
//! archive on restart.

use dashmap::DashMap;

use super::{
    CaveStore, HashKind, HashRecord, MetaRecord, StoreResult, Submission, SubmissionStatus,
};

/// DashMap-backed [`CaveStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    submissions: DashMap<u32, Submission>,
    hashes: DashMap<(u32, HashKind, String), HashRecord>,
    metas: DashMap<u32, MetaRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaveStore for MemoryStore {
    fn get_submission(&self, id: u32) -> StoreResult<Option<Submission>> {
        Ok(self.submissions.get(&id).map(|s| s.clone()))
    }

    fn submissions_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>> {
        let mut out: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.clone())
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    fn upsert_submission(&self, submission: &Submission) -> StoreResult<()> {
        self.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    fn remove_submission(&self, id: u32) -> StoreResult<()> {
        self.submissions.remove(&id);
        Ok(())
    }

    fn hashes(&self, kind: Option<HashKind>) -> StoreResult<Vec<HashRecord>> {
        let mut out: Vec<HashRecord> = self
            .hashes
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .map(|r| r.clone())
            .collect();
        out.sort_by(|a, b| (a.cave_id, &a.hash).cmp(&(b.cave_id, &b.hash)));
        Ok(out)
    }

    fn upsert_hashes(&self, records: &[HashRecord]) -> StoreResult<()> {
        for rec in records {
            self.hashes
                .insert((rec.cave_id, rec.kind, rec.hash.clone()), rec.clone());
        }
        Ok(())
    }

    fn remove_hashes(&self, cave_id: u32) -> StoreResult<()> {
        self.hashes.retain(|k, _| k.0 != cave_id);
        Ok(())
    }

    fn get_meta(&self, cave_id: u32) -> StoreResult<Option<MetaRecord>> {
        Ok(self.metas.get(&cave_id).map(|m| m.clone()))
    }

    fn metas_by_kind(&self, kind: &str) -> StoreResult<Vec<MetaRecord>> {
        let mut out: Vec<MetaRecord> = self
            .metas
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.clone())
            .collect();
        out.sort_by_key(|m| m.cave_id);
        Ok(out)
    }

    fn all_metas(&self) -> StoreResult<Vec<MetaRecord>> {
        let mut out: Vec<MetaRecord> = self.metas.iter().map(|m| m.clone()).collect();
        out.sort_by_key(|m| m.cave_id);
        Ok(out)
    }

    fn upsert_meta(&self, meta: &MetaRecord) -> StoreResult<()> {
        self.metas.insert(meta.cave_id, meta.clone());
        Ok(())
    }

    fn remove_meta(&self, cave_id: u32) -> StoreResult<()> {
        self.metas.remove(&cave_id);
        Ok(())
    }
}
