/// series.rs - Date-indexed series shared by every pipeline stage
///
/// A `TimeSeries<T>` is an index of strictly increasing dates plus one value
/// per date.  Construction validates the index, so every series reaching the
/// signal engine or the return attributor is already well ordered.  Series
/// are immutable once built: transforms return new series with the same index.
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PairsError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries<T> {
    index:  Vec<NaiveDate>,
    values: Vec<T>,
}

impl<T> TimeSeries<T> {
    /// Build a series, rejecting unequal lengths and non-increasing dates.
    pub fn new(index: Vec<NaiveDate>, values: Vec<T>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(PairsError::IndexMismatch {
                left:   "index",
                right:  "values",
                detail: format!("{} dates vs {} values", index.len(), values.len()),
            });
        }
        if let Some(i) = index.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PairsError::InvalidParameter {
                name:   "index",
                reason: format!(
                    "dates must be strictly increasing, {} follows {} at position {}",
                    index[i + 1], index[i], i + 1
                ),
            });
        }
        Ok(Self { index, values })
    }

    pub fn empty() -> Self {
        Self { index: Vec::new(), values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.index.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.index.last().copied()
    }

    pub fn date_at(&self, i: usize) -> Option<NaiveDate> {
        self.index.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &T)> + '_ {
        self.index.iter().copied().zip(self.values.iter())
    }

    pub fn into_parts(self) -> (Vec<NaiveDate>, Vec<T>) {
        (self.index, self.values)
    }

    /// New series on the same index.  `values` must have the same length.
    pub fn with_values<U>(&self, values: Vec<U>) -> Result<TimeSeries<U>> {
        if values.len() != self.index.len() {
            return Err(PairsError::IndexMismatch {
                left:   "index",
                right:  "values",
                detail: format!("{} dates vs {} values", self.index.len(), values.len()),
            });
        }
        Ok(TimeSeries { index: self.index.clone(), values })
    }

    /// Element-wise map keeping the index.
    pub fn map<U, F>(&self, f: F) -> TimeSeries<U>
    where
        F: FnMut(&T) -> U,
    {
        TimeSeries {
            index:  self.index.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Error unless `other` has exactly the same dates.
    pub fn ensure_aligned<U>(
        &self,
        other: &TimeSeries<U>,
        left:  &'static str,
        right: &'static str,
    ) -> Result<()> {
        if self.len() != other.len() {
            return Err(PairsError::IndexMismatch {
                left,
                right,
                detail: format!("lengths differ ({} vs {})", self.len(), other.len()),
            });
        }
        if let Some(i) = self.index.iter().zip(other.index.iter()).position(|(a, b)| a != b) {
            return Err(PairsError::IndexMismatch {
                left,
                right,
                detail: format!(
                    "dates differ at index {i} ({} vs {})",
                    self.index[i], other.index[i]
                ),
            });
        }
        Ok(())
    }
}

impl<T: Clone> TimeSeries<T> {
    /// Split at `at`: `[0, at)` and `[at, len)`.
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.len());
        (
            Self { index: self.index[..at].to_vec(), values: self.values[..at].to_vec() },
            Self { index: self.index[at..].to_vec(), values: self.values[at..].to_vec() },
        )
    }

    /// Append `tail` after `self`; the join must keep dates strictly increasing.
    pub fn concat(&self, tail: &Self) -> Result<Self> {
        let mut index = self.index.clone();
        index.extend_from_slice(&tail.index);
        let mut values = self.values.clone();
        values.extend_from_slice(&tail.values);
        Self::new(index, values)
    }
}

/// Keep only the dates present in both series.  Both inputs are sorted, so
/// this is a single merge pass.
pub fn inner_join<A: Clone, B: Clone>(
    a: &TimeSeries<A>,
    b: &TimeSeries<B>,
) -> (TimeSeries<A>, TimeSeries<B>) {
    let (mut i, mut j) = (0, 0);
    let mut index = Vec::with_capacity(a.len().min(b.len()));
    let mut va = Vec::with_capacity(index.capacity());
    let mut vb = Vec::with_capacity(index.capacity());

    while i < a.len() && j < b.len() {
        match a.index[i].cmp(&b.index[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                index.push(a.index[i]);
                va.push(a.values[i].clone());
                vb.push(b.values[j].clone());
                i += 1;
                j += 1;
            }
        }
    }
    (
        TimeSeries { index: index.clone(), values: va },
        TimeSeries { index, values: vb },
    )
}

impl TimeSeries<f64> {
    /// Index of the first NaN/inf value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }

    /// Fail with `UndefinedValue` on the first non-finite value.
    pub fn ensure_finite(&self, what: &'static str) -> Result<()> {
        match self.first_non_finite() {
            Some(i) => Err(PairsError::undefined(what, i, self.date_at(i))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
}

#[cfg(test)]
pub(crate) fn series(values: &[f64]) -> TimeSeries<f64> {
    TimeSeries::new(dates(values.len()), values.to_vec()).unwrap()
}
