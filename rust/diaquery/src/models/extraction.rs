use serde::Serialize;

/// Per-query summary pointing into the shared RT and intensity buffers of
/// an [`ExtractionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FragmentResult {
    pub query_id: usize,
    pub data_point_count: usize,
    pub total_intensity: f32,
    pub rt_buffer_offset: usize,
    pub intensity_buffer_offset: usize,
}

/// Output of a windowed extraction.
///
/// `results[i]` corresponds to the i-th query passed to the extractor,
/// and its points live at
/// `rt_buffer[rt_buffer_offset..rt_buffer_offset + data_point_count]`
/// (same for intensities). Points of a trace are in ascending RT order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    pub results: Vec<FragmentResult>,
    pub rt_buffer: Vec<f32>,
    pub intensity_buffer: Vec<f32>,
    pub total_data_points: usize,
}

impl ExtractionResult {
    pub fn with_capacity(num_queries: usize, num_points: usize) -> Self {
        Self {
            results: Vec::with_capacity(num_queries),
            rt_buffer: Vec::with_capacity(num_points),
            intensity_buffer: Vec::with_capacity(num_points),
            total_data_points: 0,
        }
    }

    /// Appends one trace, recording its offsets and summary.
    pub fn push_trace(&mut self, query_id: usize, rts: &[f32], intensities: &[f32]) {
        debug_assert_eq!(rts.len(), intensities.len());
        let offset = self.rt_buffer.len();
        self.rt_buffer.extend_from_slice(rts);
        self.intensity_buffer.extend_from_slice(intensities);
        self.results.push(FragmentResult {
            query_id,
            data_point_count: rts.len(),
            total_intensity: intensities.iter().sum(),
            rt_buffer_offset: offset,
            intensity_buffer_offset: offset,
        });
        self.total_data_points += rts.len();
    }

    /// RT and intensity slices of a single trace.
    pub fn xic(&self, result: &FragmentResult) -> (&[f32], &[f32]) {
        xic_slices(result, &self.rt_buffer, &self.intensity_buffer)
    }
}

/// Same as [`ExtractionResult::xic`] but over loose buffers.
///
/// Out of range offsets yield empty slices instead of panicking.
pub fn xic_slices<'a>(
    result: &FragmentResult,
    rt_buffer: &'a [f32],
    intensity_buffer: &'a [f32],
) -> (&'a [f32], &'a [f32]) {
    let rt_end = result.rt_buffer_offset + result.data_point_count;
    let int_end = result.intensity_buffer_offset + result.data_point_count;
    let rts = rt_buffer
        .get(result.rt_buffer_offset..rt_end)
        .unwrap_or(&[]);
    let ints = intensity_buffer
        .get(result.intensity_buffer_offset..int_end)
        .unwrap_or(&[]);
    (rts, ints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_trace_offsets() {
        let mut res = ExtractionResult::with_capacity(2, 4);
        res.push_trace(0, &[1.0, 2.0], &[10.0, 20.0]);
        res.push_trace(1, &[], &[]);
        res.push_trace(2, &[3.0], &[5.0]);

        assert_eq!(res.total_data_points, 3);
        assert_eq!(res.results[2].rt_buffer_offset, 2);
        assert_eq!(res.results[0].total_intensity, 30.0);
        assert_eq!(res.results[1].data_point_count, 0);
        let (rts, ints) = res.xic(&res.results[2]);
        assert_eq!(rts, &[3.0]);
        assert_eq!(ints, &[5.0]);
    }
}
