//! Structure-of-arrays index over the MS2 scans of a DIA run.
//!
//! All peaks of all scans live in two flat buffers (`all_mz`,
//! `all_intensity`). Scans are ordered by (window id, retention time) so
//! the scans of a window form one contiguous, RT-sorted block, and peaks
//! inside each scan are sorted by m/z.

use crate::errors::DataProcessingError;
use crate::traits::ScanWindowIndex;
use crate::utils::TupleRange;
use nohash_hasher::IntMap;
use serde::{
    Deserialize,
    Serialize,
};
use std::ops::Range;
use tracing::{
    debug,
    info,
};

/// A single decoded MS2 scan, as handed to the index builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScan {
    pub retention_time_minutes: f32,
    pub isolation_lower_mz: f64,
    pub isolation_upper_mz: f64,
    pub mz: Vec<f32>,
    pub intensity: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct DiaScanIndex {
    all_mz: Vec<f32>,
    all_intensity: Vec<f32>,
    scan_offsets: Vec<usize>,
    scan_lengths: Vec<u32>,
    scan_rts: Vec<f32>,
    scan_window_ids: Vec<u32>,
    windows: Vec<TupleRange<f64>>,
    window_scan_ranges: IntMap<u32, (usize, usize)>,
    global_rt: Option<(f32, f32)>,
}

impl DiaScanIndex {
    pub fn from_scans(scans: Vec<RawScan>) -> Result<Self, DataProcessingError> {
        let mut builder = DiaScanIndexBuilder::with_capacity(scans.len());
        for scan in scans {
            builder.add_scan(scan)?;
        }
        Ok(builder.build())
    }

    pub fn num_scans(&self) -> usize {
        self.scan_rts.len()
    }

    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn num_peaks(&self) -> usize {
        self.all_mz.len()
    }

    pub fn window_bounds(&self, window_id: u32) -> Option<TupleRange<f64>> {
        self.windows.get(window_id as usize).copied()
    }

    /// Scan indices of a window, in ascending RT order.
    pub fn window_scans(&self, window_id: u32) -> Range<usize> {
        match self.window_scan_ranges.get(&window_id) {
            Some(&(start, count)) => start..(start + count),
            None => 0..0,
        }
    }

    /// Scans of `window_id` whose RT falls inside `[rt_min, rt_max]`.
    pub fn window_scans_in_rt_range(&self, window_id: u32, rt_min: f32, rt_max: f32) -> Range<usize> {
        let range = self.window_scans(window_id);
        let rts = &self.scan_rts[range.clone()];
        let start = rts.partition_point(|&x| x < rt_min);
        let end = rts.partition_point(|&x| x <= rt_max);
        if end <= start {
            return range.start..range.start;
        }
        (range.start + start)..(range.start + end)
    }

    pub fn scan_rt(&self, scan_index: usize) -> f32 {
        self.scan_rts[scan_index]
    }

    pub fn scan_window_id(&self, scan_index: usize) -> u32 {
        self.scan_window_ids[scan_index]
    }

    pub fn scan_peaks(&self, scan_index: usize) -> (&[f32], &[f32]) {
        let start = self.scan_offsets[scan_index];
        let end = start + self.scan_lengths[scan_index] as usize;
        (&self.all_mz[start..end], &self.all_intensity[start..end])
    }
}

impl ScanWindowIndex for DiaScanIndex {
    fn find_window_for_precursor_mz(&self, precursor_mz: f64) -> Option<u32> {
        if !precursor_mz.is_finite() {
            return None;
        }
        self.windows
            .iter()
            .position(|w| w.contains(precursor_mz))
            .map(|x| x as u32)
    }

    fn global_rt_min(&self) -> f32 {
        self.global_rt.map(|x| x.0).unwrap_or(0.0)
    }

    fn global_rt_max(&self) -> f32 {
        self.global_rt.map(|x| x.1).unwrap_or(0.0)
    }
}

#[derive(Debug, Default)]
pub struct DiaScanIndexBuilder {
    scans: Vec<RawScan>,
}

impl DiaScanIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(num_scans: usize) -> Self {
        Self {
            scans: Vec::with_capacity(num_scans),
        }
    }

    pub fn add_scan(&mut self, scan: RawScan) -> Result<&mut Self, DataProcessingError> {
        if scan.mz.len() != scan.intensity.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: scan.mz.len(),
                other: scan.intensity.len(),
                context: format!("scan at RT {} (mz vs intensity)", scan.retention_time_minutes),
            });
        }
        if TupleRange::try_new(scan.isolation_lower_mz, scan.isolation_upper_mz).is_err() {
            return Err(DataProcessingError::ExpectedOrderedRange {
                start: scan.isolation_lower_mz,
                end: scan.isolation_upper_mz,
                context: "isolation window".into(),
            });
        }
        if !scan.retention_time_minutes.is_finite() {
            return Err(DataProcessingError::ExpectedFiniteNonNanData {
                context: "scan retention time".into(),
            });
        }
        self.scans.push(scan);
        Ok(self)
    }

    pub fn build(self) -> DiaScanIndex {
        let mut scans = self.scans;

        // Distinct isolation windows, ordered by their bounds.
        let mut window_keys: Vec<(f64, f64)> = scans
            .iter()
            .map(|s| (s.isolation_lower_mz, s.isolation_upper_mz))
            .collect();
        window_keys.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        window_keys.dedup();

        let window_of = |scan: &RawScan| -> u32 {
            let key = (scan.isolation_lower_mz, scan.isolation_upper_mz);
            window_keys
                .binary_search_by(|probe| probe.0.total_cmp(&key.0).then(probe.1.total_cmp(&key.1)))
                .unwrap_or_default() as u32
        };

        let mut keyed: Vec<(u32, RawScan)> = scans.drain(..).map(|s| (window_of(&s), s)).collect();
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.retention_time_minutes.total_cmp(&b.1.retention_time_minutes))
        });

        let num_peaks: usize = keyed.iter().map(|(_, s)| s.mz.len()).sum();
        let mut all_mz = Vec::with_capacity(num_peaks);
        let mut all_intensity = Vec::with_capacity(num_peaks);
        let mut scan_offsets = Vec::with_capacity(keyed.len());
        let mut scan_lengths = Vec::with_capacity(keyed.len());
        let mut scan_rts = Vec::with_capacity(keyed.len());
        let mut scan_window_ids = Vec::with_capacity(keyed.len());
        let mut window_scan_ranges: IntMap<u32, (usize, usize)> = IntMap::default();
        let mut global_rt: Option<(f32, f32)> = None;

        let mut peak_order: Vec<usize> = Vec::new();
        for (scan_idx, (window_id, scan)) in keyed.into_iter().enumerate() {
            peak_order.clear();
            peak_order.extend(0..scan.mz.len());
            peak_order.sort_by(|&a, &b| scan.mz[a].total_cmp(&scan.mz[b]));

            scan_offsets.push(all_mz.len());
            scan_lengths.push(scan.mz.len() as u32);
            all_mz.extend(peak_order.iter().map(|&i| scan.mz[i]));
            all_intensity.extend(peak_order.iter().map(|&i| scan.intensity[i]));
            scan_rts.push(scan.retention_time_minutes);
            scan_window_ids.push(window_id);

            let entry = window_scan_ranges.entry(window_id).or_insert((scan_idx, 0));
            entry.1 += 1;

            let rt = scan.retention_time_minutes;
            global_rt = Some(match global_rt {
                Some((lo, hi)) => (lo.min(rt), hi.max(rt)),
                None => (rt, rt),
            });
        }

        let windows: Vec<TupleRange<f64>> = window_keys
            .into_iter()
            .filter_map(|(lo, hi)| TupleRange::try_new(lo, hi).ok())
            .collect();

        info!(
            "Built scan index with {} scans, {} windows and {} peaks",
            scan_rts.len(),
            windows.len(),
            all_mz.len()
        );
        debug!("Global RT range: {:?}", global_rt);

        DiaScanIndex {
            all_mz,
            all_intensity,
            scan_offsets,
            scan_lengths,
            scan_rts,
            scan_window_ids,
            windows,
            window_scan_ranges,
            global_rt,
        }
    }
}
