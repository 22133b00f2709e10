//! Observations with optional group labels and subject identifiers.
//!
//! A [`Sample`] is an immutable snapshot: every analysis borrows it and
//! returns freshly allocated results.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{ensure_finite, InferenceError, Result};

/// Ordered numeric observations, optionally tagged per observation with a
/// categorical group label and/or a subject identifier for paired designs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    values: Vec<f64>,
    groups: Option<Vec<String>>,
    subjects: Option<Vec<String>>,
}

/// One level of a grouped sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub label: String,
    pub values: Vec<f64>,
}

impl Sample {
    /// Ungrouped sample.
    ///
    /// # Errors
    /// [`InferenceError::InvalidInput`] if any value is non-finite.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        ensure_finite(&values, "sample")?;
        Ok(Self {
            values,
            groups: None,
            subjects: None,
        })
    }

    /// Sample with one group label per observation.
    ///
    /// # Errors
    /// [`InferenceError::DimensionMismatch`] if the label count differs from
    /// the value count.
    pub fn with_groups<I, S>(values: Vec<f64>, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() != values.len() {
            return Err(InferenceError::mismatch(
                values.len(),
                labels.len(),
                "group labels",
            ));
        }
        let mut sample = Self::new(values)?;
        sample.groups = Some(labels);
        Ok(sample)
    }

    /// Attaches one subject identifier per observation (for paired designs).
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subjects: Vec<String> = subjects.into_iter().map(Into::into).collect();
        if subjects.len() != self.values.len() {
            return Err(InferenceError::mismatch(
                self.values.len(),
                subjects.len(),
                "subject identifiers",
            ));
        }
        self.subjects = Some(subjects);
        Ok(self)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.groups.as_deref()
    }

    pub fn subjects(&self) -> Option<&[String]> {
        self.subjects.as_deref()
    }

    /// Partitions the sample by label, levels in first-appearance order.
    ///
    /// # Errors
    /// [`InferenceError::InvalidInput`] if the sample is unlabelled or has
    /// fewer than two distinct levels.
    pub fn groups(&self) -> Result<Vec<Group>> {
        let labels = self
            .groups
            .as_ref()
            .ok_or_else(|| InferenceError::invalid("sample has no group labels"))?;

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        for (label, &value) in labels.iter().zip(&self.values) {
            let slot = *index.entry(label.as_str()).or_insert_with(|| {
                groups.push(Group {
                    label: label.clone(),
                    values: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].values.push(value);
        }

        if groups.len() < 2 {
            return Err(InferenceError::invalid(format!(
                "grouping needs at least 2 non-empty levels, found {}",
                groups.len()
            )));
        }
        Ok(groups)
    }

    /// Aligns the two groups of a paired design by subject identifier.
    ///
    /// Returns `(first, second)` value vectors ordered by the subjects of the
    /// first group, so `first[i]` and `second[i]` belong to one subject.
    ///
    /// # Errors
    /// - [`InferenceError::InvalidInput`] if labels or subjects are missing,
    ///   there are not exactly two groups, or a subject repeats within a
    ///   group or is missing from the other group.
    /// - [`InferenceError::DimensionMismatch`] if the groups differ in size.
    pub fn paired_groups(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let subjects = self
            .subjects
            .as_ref()
            .ok_or_else(|| InferenceError::invalid("paired design needs subject identifiers"))?;
        let labels = self
            .groups
            .as_ref()
            .ok_or_else(|| InferenceError::invalid("paired design needs group labels"))?;
        let groups = self.groups()?;
        if groups.len() != 2 {
            return Err(InferenceError::invalid(format!(
                "paired design needs exactly 2 groups, found {}",
                groups.len()
            )));
        }
        let (first_label, second_label) = (&groups[0].label, &groups[1].label);
        if groups[0].values.len() != groups[1].values.len() {
            return Err(InferenceError::mismatch(
                groups[0].values.len(),
                groups[1].values.len(),
                "paired group sizes",
            ));
        }

        let mut first: Vec<(&str, f64)> = Vec::new();
        let mut second: HashMap<&str, f64> = HashMap::new();
        for ((label, subject), &value) in labels.iter().zip(subjects).zip(&self.values) {
            if label == first_label {
                if first.iter().any(|(s, _)| *s == subject.as_str()) {
                    return Err(InferenceError::invalid(format!(
                        "subject {subject} appears twice in group {label}"
                    )));
                }
                first.push((subject.as_str(), value));
            } else if label == second_label
                && second.insert(subject.as_str(), value).is_some()
            {
                return Err(InferenceError::invalid(format!(
                    "subject {subject} appears twice in group {label}"
                )));
            }
        }

        let mut a = Vec::with_capacity(first.len());
        let mut b = Vec::with_capacity(first.len());
        for (subject, value) in first {
            let partner = second.get(subject).ok_or_else(|| {
                InferenceError::invalid(format!(
                    "subject {subject} has no observation in group {second_label}"
                ))
            })?;
            a.push(value);
            b.push(*partner);
        }
        Ok((a, b))
    }
}

impl AsRef<[f64]> for Sample {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}
