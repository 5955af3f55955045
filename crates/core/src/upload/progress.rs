//! Percent-complete reporting for a single upload.

use super::types::ProgressCallback;

/// Converts byte counts into a non-decreasing percentage stream.
///
/// Retries restart the byte count from zero; the reported value holds at its
/// high-water mark until the new attempt passes it. Values stay at or below
/// 99 until [`finish`](Self::finish) reports 100.
pub(crate) struct ProgressReporter {
    size_hint: u64,
    high_water: Option<u8>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub(crate) fn new(size_hint: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            size_hint,
            high_water: None,
            callback,
        }
    }

    fn percent(&self, bytes: u64) -> u8 {
        if self.size_hint == 0 {
            return 0;
        }
        let pct = (bytes as u128 * 100 / self.size_hint as u128).min(99);
        pct as u8
    }

    fn emit(&mut self, pct: u8) {
        if self.high_water.is_some_and(|high| pct <= high) {
            return;
        }
        self.high_water = Some(pct);
        if let Some(ref callback) = self.callback {
            callback(pct);
        }
    }

    pub(crate) fn report_bytes(&mut self, bytes: u64) {
        let pct = self.percent(bytes);
        self.emit(pct);
    }

    pub(crate) fn finish(&mut self) {
        self.emit(100);
    }
}
