//! Progress reports from a backend and their percentage derivation

/// One progress tick reported by a backend during a transfer
///
/// Every field except `downloaded_bytes` is optional because media backends
/// frequently cannot tell the total size up front (live manifests, fragmented
/// HLS/DASH streams).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Exact total size, if known
    pub total_bytes: Option<u64>,
    /// Estimated total size, used only when the exact total is absent
    pub total_bytes_estimate: Option<u64>,
    /// Index of the fragment currently being fetched
    pub fragment_index: Option<u64>,
    /// Number of fragments in the stream
    pub fragment_count: Option<u64>,
    /// Percentage as printed by the backend itself, last resort
    pub percent_hint: Option<f32>,
}

impl ProgressUpdate {
    /// Byte-based update
    pub fn bytes(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            ..Default::default()
        }
    }

    /// Fragment-based update
    pub fn fragments(fragment_index: u64, fragment_count: u64) -> Self {
        Self {
            fragment_index: Some(fragment_index),
            fragment_count: Some(fragment_count),
            ..Default::default()
        }
    }

    /// Derive a percentage in `[0, 100]`
    ///
    /// Preference order: bytes over a positive total (exact, then estimate),
    /// then fragment index over a positive fragment count, then the backend's own
    /// percentage. Returns `None` when nothing usable was reported; callers keep
    /// their last known value in that case.
    pub fn percent(&self) -> Option<f32> {
        let total = self
            .total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0));

        let raw = if let Some(total) = total {
            Some(self.downloaded_bytes as f64 / total as f64 * 100.0)
        } else if let (Some(index), Some(count)) = (self.fragment_index, self.fragment_count)
            && count > 0
        {
            Some(index as f64 / count as f64 * 100.0)
        } else {
            self.percent_hint.map(f64::from)
        };

        raw.filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) as f32)
    }
}
