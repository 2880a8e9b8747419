//! Index provenance across filtering stages
//!
//! Every stage that drops points records which input indices it kept, so a
//! point several stages downstream can still be traced back to its pixel in
//! the organized input grid.

use crate::error::*;
use serde::{Deserialize, Serialize};

/// Mapping from "kept output index" to "input index" for one filtering stage.
///
/// Source indices are strictly increasing because every stage that produces
/// an `IndexFilter` preserves the relative order of the points it keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFilter {
    source_len: usize,
    kept: Vec<usize>,
}

impl IndexFilter {
    /// The filter that keeps every one of `len` points.
    pub fn identity(len: usize) -> Self {
        Self {
            source_len: len,
            kept: (0..len).collect(),
        }
    }

    /// Build a filter from the kept source indices of a `source_len` input.
    pub fn from_kept(source_len: usize, kept: Vec<usize>) -> Result<Self> {
        if let Some(window) = kept.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidData(format!(
                "kept indices must be strictly increasing, found {} before {}",
                window[0], window[1]
            )));
        }
        if let Some(&last) = kept.last() {
            if last >= source_len {
                return Err(Error::InvalidData(format!(
                    "kept index {} out of range for source of {} points",
                    last, source_len
                )));
            }
        }

        Ok(Self { source_len, kept })
    }

    /// Build a filter from a per-point keep mask over the stage input.
    pub fn from_mask<I>(mask: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut source_len = 0;
        let mut kept = Vec::new();
        for (index, keep) in mask.into_iter().enumerate() {
            if keep {
                kept.push(index);
            }
            source_len = index + 1;
        }
        Self { source_len, kept }
    }

    /// Number of kept points, i.e. the length of the stage output
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Length of the stage input
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// Input index of output point `index`
    pub fn resolve(&self, index: usize) -> Option<usize> {
        self.kept.get(index).copied()
    }

    /// Collapse `self` followed by `next` into a single filter from the
    /// input of `self` to the output of `next`.
    pub fn compose(&self, next: &IndexFilter) -> Result<IndexFilter> {
        if next.source_len != self.len() {
            return Err(Error::InvalidData(format!(
                "cannot chain a filter over {} points after a stage producing {}",
                next.source_len,
                self.len()
            )));
        }

        Ok(IndexFilter {
            source_len: self.source_len,
            kept: next.kept.iter().map(|&i| self.kept[i]).collect(),
        })
    }
}

/// An ordered chain of [`IndexFilter`] stages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexChain {
    stages: Vec<IndexFilter>,
}

impl IndexChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Its input must be the output of the current last stage.
    pub fn push(&mut self, filter: IndexFilter) -> Result<()> {
        if let Some(last) = self.stages.last() {
            if filter.source_len != last.len() {
                return Err(Error::InvalidData(format!(
                    "stage over {} points does not follow a stage producing {}",
                    filter.source_len,
                    last.len()
                )));
            }
        }
        self.stages.push(filter);
        Ok(())
    }

    pub fn stages(&self) -> &[IndexFilter] {
        &self.stages
    }

    /// Walk `index` (an index into the output of the last stage) back through
    /// every stage to the index it had in the original input.
    pub fn resolve_to_original(&self, index: usize) -> Option<usize> {
        self.stages
            .iter()
            .rev()
            .try_fold(index, |current, stage| stage.resolve(current))
    }

    /// The whole chain as a single filter
    pub fn flatten(&self) -> Result<Option<IndexFilter>> {
        let mut stages = self.stages.iter();
        let Some(first) = stages.next() else {
            return Ok(None);
        };
        stages
            .try_fold(first.clone(), |acc, stage| acc.compose(stage))
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kept_rejects_unordered_indices() {
        assert!(IndexFilter::from_kept(5, vec![0, 2, 2]).is_err());
        assert!(IndexFilter::from_kept(5, vec![3, 1]).is_err());
        assert!(IndexFilter::from_kept(5, vec![1, 5]).is_err());
        assert!(IndexFilter::from_kept(5, vec![]).is_ok());
    }

    #[test]
    fn test_from_mask() {
        let filter = IndexFilter::from_mask([true, false, false, true, true, false]);
        assert_eq!(filter.kept(), &[0, 3, 4]);
        assert_eq!(filter.source_len(), 6);
        assert_eq!(IndexFilter::from_mask(Vec::new()), IndexFilter::identity(0));
    }

    #[test]
    fn test_compose_matches_chained_lookup() {
        let first = IndexFilter::from_kept(10, vec![1, 3, 4, 7, 9]).unwrap();
        let second = IndexFilter::from_kept(5, vec![0, 2, 4]).unwrap();

        let composed = first.compose(&second).unwrap();
        assert_eq!(composed.kept(), &[1, 4, 9]);
        assert_eq!(composed.source_len(), 10);

        let mut chain = IndexChain::new();
        chain.push(first).unwrap();
        chain.push(second).unwrap();
        for i in 0..composed.len() {
            assert_eq!(chain.resolve_to_original(i), composed.resolve(i));
        }
        assert_eq!(chain.resolve_to_original(3), None);
        assert_eq!(chain.flatten().unwrap(), Some(composed));
    }

    #[test]
    fn test_chain_rejects_mismatched_stage() {
        let mut chain = IndexChain::new();
        chain.push(IndexFilter::from_kept(4, vec![0, 1]).unwrap()).unwrap();
        assert!(chain.push(IndexFilter::identity(3)).is_err());
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = IndexChain::new();
        assert_eq!(chain.resolve_to_original(42), Some(42));
        assert_eq!(chain.flatten().unwrap(), None);
    }
}
