//! Peak extraction
//!
//! Reduces a [`SampleBuffer`] to one `(min, max)` pair per pixel column.
//! Column `i` of a `width`-column layout over frames `[start, end)` covers
//! `[start + i*n/width, start + (i+1)*n/width)` with `n = end - start`
//! (integer division). Columns never overlap and together cover the range
//! exactly; when a column's range is empty (`n < width`) it takes the single
//! frame at its start. Min and max are taken across all channels.

use crate::audio::types::SampleBuffer;

/// Signal envelope of one pixel column
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

impl Peak {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Largest absolute excursion in the column
    pub fn amplitude(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// Peaks for a run of pixel columns, left to right
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakSet {
    peaks: Vec<Peak>,
}

impl PeakSet {
    /// `width` flat columns
    pub fn zeros(width: usize) -> Self {
        Self {
            peaks: vec![Peak::default(); width],
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<Peak> {
        self.peaks.get(column).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn as_slice(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn into_vec(self) -> Vec<Peak> {
        self.peaks
    }

    /// Largest absolute value over all columns
    pub fn max_amplitude(&self) -> f32 {
        self.peaks.iter().map(Peak::amplitude).fold(0.0, f32::max)
    }

    /// Append another run of columns
    pub fn extend(&mut self, other: PeakSet) {
        self.peaks.extend(other.peaks);
    }
}

impl FromIterator<Peak> for PeakSet {
    fn from_iter<I: IntoIterator<Item = Peak>>(iter: I) -> Self {
        Self {
            peaks: iter.into_iter().collect(),
        }
    }
}

/// Compute `width` peaks over frames `[start, end)` of `buffer`.
///
/// Bounds are clamped to the buffer. An empty range or buffer yields `width`
/// zero peaks.
pub fn compute_peaks(buffer: &SampleBuffer, width: usize, start: usize, end: usize) -> PeakSet {
    let end = end.min(buffer.len());
    let start = start.min(end);
    let n = end - start;
    if n == 0 {
        return PeakSet::zeros(width);
    }
    (0..width)
        .map(|column| column_peak(buffer, start, n, width, column))
        .collect()
}

/// Compute columns `[first, last)` of the `total_width`-column layout of the
/// whole buffer.
///
/// Concatenating consecutive windows reproduces
/// `compute_peaks(buffer, total_width, 0, buffer.len())`.
pub fn compute_peak_window(
    buffer: &SampleBuffer,
    total_width: usize,
    first: usize,
    last: usize,
) -> PeakSet {
    let last = last.min(total_width);
    let first = first.min(last);
    let n = buffer.len();
    if n == 0 {
        return PeakSet::zeros(last - first);
    }
    (first..last)
        .map(|column| column_peak(buffer, 0, n, total_width, column))
        .collect()
}

fn column_peak(buffer: &SampleBuffer, start: usize, n: usize, width: usize, column: usize) -> Peak {
    let lo = start + scaled(column, n, width);
    let hi = (start + scaled(column + 1, n, width)).max(lo + 1);

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for channel in buffer.channels() {
        for &sample in &channel[lo..hi] {
            min = min.min(sample);
            max = max.max(sample);
        }
    }
    Peak::new(min, max)
}

#[inline]
fn scaled(column: usize, n: usize, width: usize) -> usize {
    (column as u128 * n as u128 / width as u128) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<f32>) -> SampleBuffer {
        SampleBuffer::new(100, vec![samples]).unwrap()
    }

    // --- compute_peaks ---

    #[test]
    fn length_matches_width() {
        let buf = mono((0..1000).map(|i| (i as f32 * 0.01).sin()).collect());
        for width in [1, 7, 100, 999, 1000, 2500] {
            assert_eq!(compute_peaks(&buf, width, 0, 1000).len(), width);
        }
    }

    #[test]
    fn two_columns_split_evenly() {
        let buf = mono(vec![0.1, -0.4, 0.3, 0.9, -0.2, 0.5]);
        let peaks = compute_peaks(&buf, 2, 0, 6);
        assert_eq!(peaks.get(0), Some(Peak::new(-0.4, 0.3)));
        assert_eq!(peaks.get(1), Some(Peak::new(-0.2, 0.9)));
    }

    #[test]
    fn uneven_split_has_no_gaps() {
        // n = 5, width = 3: columns [0,1) [1,3) [3,5)
        let buf = mono(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let peaks = compute_peaks(&buf, 3, 0, 5);
        assert_eq!(peaks.get(0), Some(Peak::new(1.0, 1.0)));
        assert_eq!(peaks.get(1), Some(Peak::new(2.0, 3.0)));
        assert_eq!(peaks.get(2), Some(Peak::new(4.0, 5.0)));
    }

    #[test]
    fn upsampling_repeats_samples() {
        let buf = mono(vec![0.25, -0.75]);
        let peaks = compute_peaks(&buf, 4, 0, 2);
        let got: Vec<Peak> = peaks.into_vec();
        assert_eq!(
            got,
            vec![
                Peak::new(0.25, 0.25),
                Peak::new(0.25, 0.25),
                Peak::new(-0.75, -0.75),
                Peak::new(-0.75, -0.75),
            ]
        );
    }

    #[test]
    fn subrange_only_sees_its_frames() {
        let buf = mono(vec![9.0, 0.1, 0.2, 0.3, 9.0]);
        let peaks = compute_peaks(&buf, 1, 1, 4);
        assert_eq!(peaks.get(0), Some(Peak::new(0.1, 0.3)));
    }

    #[test]
    fn stereo_peaks_combine_channels() {
        let buf = SampleBuffer::new(100, vec![vec![0.5, 0.2], vec![-0.8, 0.1]]).unwrap();
        let peaks = compute_peaks(&buf, 1, 0, 2);
        assert_eq!(peaks.get(0), Some(Peak::new(-0.8, 0.5)));
    }

    #[test]
    fn empty_range_yields_zeros() {
        let buf = mono(vec![0.5; 10]);
        assert_eq!(compute_peaks(&buf, 4, 5, 5), PeakSet::zeros(4));
        assert_eq!(compute_peaks(&buf, 4, 8, 3), PeakSet::zeros(4));

        let empty = mono(Vec::new());
        assert_eq!(compute_peaks(&empty, 3, 0, 10), PeakSet::zeros(3));
    }

    #[test]
    fn zero_width_is_empty() {
        let buf = mono(vec![0.5; 10]);
        assert!(compute_peaks(&buf, 0, 0, 10).is_empty());
    }

    #[test]
    fn end_is_clamped_to_buffer() {
        let buf = mono(vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(compute_peaks(&buf, 2, 0, 400), compute_peaks(&buf, 2, 0, 4));
    }

    #[test]
    fn peaks_bound_every_sample() {
        let samples: Vec<f32> = (0..997).map(|i| ((i * 31) % 200) as f32 / 100.0 - 1.0).collect();
        let buf = mono(samples.clone());
        let width = 13;
        let peaks = compute_peaks(&buf, width, 0, samples.len());
        for (column, peak) in peaks.iter().enumerate() {
            let lo = column * samples.len() / width;
            let hi = (column + 1) * samples.len() / width;
            for &s in &samples[lo..hi] {
                assert!(peak.min <= s && s <= peak.max);
            }
        }
    }

    // --- compute_peak_window ---

    #[test]
    fn windows_concatenate_to_full_layout() {
        let buf = SampleBuffer::new(
            100,
            vec![
                (0..1234).map(|i| (i as f32 * 0.07).sin()).collect(),
                (0..1234).map(|i| (i as f32 * 0.05).cos() * 0.5).collect(),
            ],
        )
        .unwrap();
        let full = compute_peaks(&buf, 300, 0, buf.len());

        let mut stitched = compute_peak_window(&buf, 300, 0, 120);
        stitched.extend(compute_peak_window(&buf, 300, 120, 121));
        stitched.extend(compute_peak_window(&buf, 300, 121, 300));
        assert_eq!(stitched, full);
    }

    #[test]
    fn window_is_clamped_to_total_width() {
        let buf = mono(vec![0.5; 100]);
        assert_eq!(compute_peak_window(&buf, 10, 5, 50).len(), 5);
        assert!(compute_peak_window(&buf, 10, 20, 30).is_empty());
    }

    #[test]
    fn window_of_empty_buffer_is_zeros() {
        let empty = mono(Vec::new());
        assert_eq!(compute_peak_window(&empty, 10, 2, 6), PeakSet::zeros(4));
    }

    // --- PeakSet ---

    #[test]
    fn max_amplitude() {
        let set: PeakSet = vec![Peak::new(-0.9, 0.2), Peak::new(-0.1, 0.4)].into_iter().collect();
        assert!((set.max_amplitude() - 0.9).abs() < 1e-6);
        assert_eq!(PeakSet::zeros(3).max_amplitude(), 0.0);
    }
}
