//! Process-wide reuse of filter banks across extraction calls.

use std::collections::HashMap;
use std::sync::Arc;

use ms_core::config::{FilterShape, FreqScale};
use ms_core::error::Result;
use parking_lot::RwLock;

use crate::filterbank::{DenseFilterMatrix, FilterBank, FilterBankParams};

/// Hashable identity of a [`FilterBankParams`]; frequencies are compared
/// bit-for-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterBankKey {
    num_bins: usize,
    sample_rate: u32,
    num_filters: usize,
    min_freq_bits: u64,
    max_freq_bits: u64,
    scale: FreqScale,
    shape: FilterShape,
    normalize: bool,
    preserve_energy: bool,
}

impl From<&FilterBankParams> for FilterBankKey {
    fn from(p: &FilterBankParams) -> Self {
        Self {
            num_bins: p.num_bins,
            sample_rate: p.sample_rate,
            num_filters: p.num_filters,
            min_freq_bits: p.min_freq.to_bits(),
            max_freq_bits: p.max_freq.to_bits(),
            scale: p.scale,
            shape: p.shape,
            normalize: p.normalize,
            preserve_energy: p.preserve_energy,
        }
    }
}

/// Shared, thread-safe store of built filter banks and their dense forms.
///
/// Banks are immutable once built, so handing out `Arc`s is enough. Two
/// threads missing the same key concurrently may both build it; the first
/// insert wins.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use ms_audio::cache::FilterBankCache;
/// use ms_audio::filterbank::FilterBankParams;
///
/// let cache = FilterBankCache::new();
/// let a = cache.get_or_build(FilterBankParams::new(513, 22050, 40)).unwrap();
/// let b = cache.get_or_build(FilterBankParams::new(513, 22050, 40)).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(cache.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct FilterBankCache {
    banks: Store<FilterBank>,
    matrices: Store<DenseFilterMatrix>,
}

type Store<T> = RwLock<HashMap<FilterBankKey, Arc<T>>>;

fn lookup<T>(map: &Store<T>, key: &FilterBankKey) -> Option<Arc<T>> {
    map.read().get(key).map(Arc::clone)
}

fn insert<T>(map: &Store<T>, key: FilterBankKey, value: Arc<T>) -> Arc<T> {
    let mut entries = map.write();
    let value = Arc::clone(entries.entry(key).or_insert(value));
    log::debug!("Cache de bancs de filtres : {} entrée(s)", entries.len());
    value
}

impl FilterBankCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached bank for `params`, built on first use.
    ///
    /// # Errors
    /// Propagates construction errors; nothing is cached in that case.
    pub fn get_or_build(&self, params: FilterBankParams) -> Result<Arc<FilterBank>> {
        let key = FilterBankKey::from(&params);
        if let Some(bank) = lookup(&self.banks, &key) {
            return Ok(bank);
        }
        let built = Arc::new(FilterBank::build(params)?);
        Ok(insert(&self.banks, key, built))
    }

    /// Cached dense matrix for `params`, materialised from the cached bank on
    /// first use.
    ///
    /// # Errors
    /// Same as [`FilterBankCache::get_or_build`].
    pub fn get_or_build_dense(&self, params: FilterBankParams) -> Result<Arc<DenseFilterMatrix>> {
        let key = FilterBankKey::from(&params);
        if let Some(matrix) = lookup(&self.matrices, &key) {
            return Ok(matrix);
        }
        let matrix = Arc::new(self.get_or_build(params)?.to_matrix());
        Ok(insert(&self.matrices, key, matrix))
    }

    /// Number of cached banks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.read().len()
    }

    /// Number of cached dense matrices.
    #[must_use]
    pub fn matrix_count(&self) -> usize {
        self.matrices.read().len()
    }

    /// `true` if nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached bank and matrix.
    pub fn clear(&self) {
        self.banks.write().clear();
        self.matrices.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filterbank::BandProjection;

    #[test]
    fn distinct_params_get_distinct_entries() {
        let cache = FilterBankCache::new();
        let base = FilterBankParams::new(257, 16000, 20);
        let a = cache.get_or_build(base.clone()).unwrap();
        let b = cache
            .get_or_build(FilterBankParams {
                max_freq: 6000.0,
                ..base.clone()
            })
            .unwrap();
        let c = cache
            .get_or_build(FilterBankParams {
                preserve_energy: true,
                ..base
            })
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cached_bank_matches_fresh_build() {
        let cache = FilterBankCache::new();
        let params = FilterBankParams::new(1025, 44100, 60);
        let cached = cache.get_or_build(params.clone()).unwrap();
        let fresh = FilterBank::build(params).unwrap();
        assert_eq!(*cached, fresh);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let cache = FilterBankCache::new();
        let params = FilterBankParams {
            min_freq: 9000.0,
            max_freq: 100.0,
            ..FilterBankParams::new(257, 16000, 20)
        };
        assert!(cache.get_or_build(params).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn shared_across_threads() {
        let cache = Arc::new(FilterBankCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .get_or_build(FilterBankParams::new(513, 22050, 40))
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn dense_form_is_cached_with_its_bank() {
        let cache = FilterBankCache::new();
        let params = FilterBankParams::new(513, 22050, 40);
        let a = cache.get_or_build_dense(params.clone()).unwrap();
        let b = cache.get_or_build_dense(params.clone()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.matrix_count(), 1);

        let bank = cache.get_or_build(params).unwrap();
        let spectrum: Vec<f64> = (0..513).map(|k| 1.0 / (1.0 + k as f64)).collect();
        let compact = bank.apply(&spectrum).unwrap();
        let mut dense = vec![0.0; bank.num_bands()];
        a.project(&spectrum, &mut dense);
        for (x, y) in compact.iter().zip(&dense) {
            assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
        }

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.matrix_count(), 0);
        let rebuilt = cache
            .get_or_build_dense(FilterBankParams::new(513, 22050, 40))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &rebuilt));
    }

    #[test]
    fn repeated_lookups_return_the_inserted_bank() {
        let cache = FilterBankCache::new();
        let params = FilterBankParams::new(257, 16000, 24);
        let first = cache.get_or_build(params.clone()).unwrap();
        for _ in 0..3 {
            assert!(Arc::ptr_eq(&first, &cache.get_or_build(params.clone()).unwrap()));
        }
        assert_eq!(cache.len(), 1);
    }
}
