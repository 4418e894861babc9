use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::info;

use super::record::CaptureRecord;

/// Bounded FIFO of capture records. Ordinals are a presentation concept,
/// not a stored identity: the record at the head of the buffer is always
/// ordinal 1, regardless of how many records have been evicted before it.
/// Eviction drops the oldest record once the configured maximum is exceeded.
pub struct CaptureBuffer {
    records: Mutex<VecDeque<CaptureRecord>>,
    max_len: usize,
}

impl CaptureBuffer {
    pub fn new(max_len: usize) -> Self {
        CaptureBuffer {
            records: Mutex::new(VecDeque::with_capacity(max_len.min(1024))),
            max_len: max_len.max(1),
        }
    }

    /// Appends at the tail, evicting the head if the buffer is now over
    /// capacity. Returns the record's dense ordinal at insertion time.
    pub fn append(&self, record: CaptureRecord) -> u64 {
        let mut records = self.records.lock();
        records.push_back(record);
        if records.len() > self.max_len {
            records.pop_front();
            info!(max = self.max_len, "capture buffer evicted oldest record");
        }
        records.len() as u64
    }

    /// Looks up by dense, 1-based position: ordinal 1 is always the
    /// oldest record currently held, regardless of past evictions.
    pub fn get(&self, ordinal: u64) -> Option<CaptureRecord> {
        let index = ordinal.checked_sub(1)?;
        let records = self.records.lock();
        let mut record = records.get(usize::try_from(index).ok()?)?.clone();
        record.ordinal = ordinal;
        Some(record)
    }

    /// Returns every currently-held record with ordinals renumbered
    /// densely from 1, for console listing and bulk export.
    pub fn list(&self) -> Vec<CaptureRecord> {
        self.records
            .lock()
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut r = r.clone();
                r.ordinal = i as u64 + 1;
                r
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::record::{CapturedRequest, CapturedResponse};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn dummy_record() -> CaptureRecord {
        CaptureRecord {
            ordinal: 0,
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
            request: CapturedRequest {
                url: "http://upstream.test/data".into(),
                method: "GET".into(),
                headers: BTreeMap::new(),
                body: Value::Null,
            },
            response: CapturedResponse {
                status_code: 200,
                headers: BTreeMap::new(),
                body: serde_json::json!({"x": 1}),
            },
        }
    }

    #[test]
    fn ordinals_start_at_one_and_grow_with_the_buffer() {
        let buf = CaptureBuffer::new(100);
        let a = buf.append(dummy_record());
        let b = buf.append(dummy_record());
        let c = buf.append(dummy_record());
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn buffer_never_exceeds_max_len() {
        let buf = CaptureBuffer::new(100);
        for _ in 0..150 {
            buf.append(dummy_record());
        }
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn ordinals_stay_dense_after_eviction() {
        let buf = CaptureBuffer::new(100);
        for _ in 0..150 {
            buf.append(dummy_record());
        }
        let remaining: Vec<u64> = buf.list().iter().map(|r| r.ordinal).collect();
        assert_eq!(remaining, (1..=100).collect::<Vec<u64>>());
    }

    #[test]
    fn get_tracks_list_after_eviction() {
        let buf = CaptureBuffer::new(100);
        for _ in 0..150 {
            buf.append(dummy_record());
        }
        assert!(buf.get(1).is_some());
        assert!(buf.get(100).is_some());
        assert!(buf.get(101).is_none());
    }

    #[test]
    fn clear_empties_buffer() {
        let buf = CaptureBuffer::new(10);
        buf.append(dummy_record());
        buf.clear();
        assert!(buf.is_empty());
    }

    #[test]
    fn get_returns_none_out_of_range() {
        let buf = CaptureBuffer::new(10);
        buf.append(dummy_record());
        assert!(buf.get(999).is_none());
        assert!(buf.get(0).is_none());
    }
}
