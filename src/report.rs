//! Plain-text and JSON rendering of analysis results.
//!
//! A [`Report`] is a list of [`Section`]s, each holding either a result
//! body or the error that stopped that analysis. A failed section is
//! rendered as an error line; the remaining sections are unaffected.

use std::fmt::{self, Display, Formatter};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::diagnostics::{
    qq_correlation, BreuschPaganVariant, Heteroscedasticity, QqPoint, ResidualQuantiles,
};
use crate::error::Result;
use crate::regression::LinearFit;
use crate::stats::Summary;
use crate::ttest::{Alternative, GroupComparison, TestMethod};
use crate::variogram::EmpiricalVariogram;
use crate::vgm_fit::VariogramFit;

/// Smallest p-value printed as a number.
const P_FLOOR: f64 = 2.2e-16;

/// `p-value < 2.2e-16`, scientific below 1e-4, fixed otherwise.
pub fn format_p(p: f64) -> String {
    if p < P_FLOOR {
        format!("< {P_FLOOR:e}")
    } else if p < 1e-4 {
        format!("{p:.3e}")
    } else {
        format!("{p:.4}")
    }
}

/// Result carried by a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Body {
    /// Labelled descriptive summaries.
    Summaries { rows: Vec<(String, Summary)> },
    /// Named scalar values such as critical values.
    Values { rows: Vec<(String, f64)> },
    Comparison(GroupComparison),
    Regression {
        fit: LinearFit,
        residuals: ResidualQuantiles,
        heteroscedasticity: Heteroscedasticity,
        /// Normal Q-Q series of the residuals.
        qq: Vec<QqPoint>,
    },
    Variogram {
        empirical: EmpiricalVariogram,
        model: VariogramFit,
        /// Per-group empirical variograms; empty for ungrouped data.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        by_group: Vec<(String, EmpiricalVariogram)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub outcome: Result<Body>,
}

impl Section {
    /// Runs `analysis`, keeping its error inside the section.
    pub fn run(heading: impl Into<String>, analysis: impl FnOnce() -> Result<Body>) -> Self {
        let heading = heading.into();
        let outcome = analysis();
        if let Err(e) = &outcome {
            warn!(section = %heading, error = %e, "analysis failed");
        }
        Self { heading, outcome }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Section", 2)?;
        s.serialize_field("heading", &self.heading)?;
        match &self.outcome {
            Ok(body) => s.serialize_field("result", body)?,
            Err(e) => s.serialize_field("error", &e.to_string())?,
        }
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    pub seed: u64,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn new(title: impl Into<String>, seed: u64) -> Self {
        Self {
            title: title.into(),
            seed,
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn failures(&self) -> usize {
        self.sections.iter().filter(|s| !s.is_ok()).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// Text rendering
// ============================================================================

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(f, "seed: {}", self.seed)?;
        for section in &self.sections {
            writeln!(f)?;
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "## {}", self.heading)?;
        match &self.outcome {
            Ok(body) => write!(f, "{body}"),
            Err(e) => writeln!(f, "error: {e}"),
        }
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summaries { rows } => {
                for (label, summary) in rows {
                    writeln!(f, "[{label}]")?;
                    write!(f, "{summary}")?;
                }
                Ok(())
            }
            Self::Values { rows } => {
                let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
                for (name, value) in rows {
                    writeln!(f, "{name:<width$}  {value:.6}")?;
                }
                Ok(())
            }
            Self::Comparison(c) => write!(f, "{c}"),
            Self::Regression {
                fit,
                residuals,
                heteroscedasticity,
                qq,
            } => {
                writeln!(f, "Residuals:")?;
                write!(f, "{residuals}")?;
                write!(f, "{fit}")?;
                write!(f, "{heteroscedasticity}")?;
                match qq_correlation(qq) {
                    Some(r) => writeln!(f, "normal Q-Q correlation: {r:.4} ({} points)", qq.len()),
                    None => Ok(()),
                }
            }
            Self::Variogram {
                empirical,
                model,
                by_group,
            } => {
                write!(f, "{empirical}")?;
                write!(f, "{model}")?;
                for (label, variogram) in by_group {
                    writeln!(f, "group {label}:")?;
                    write!(f, "{variogram}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "n = {}, mean = {:.4}, variance = {:.4}, sd = {:.4}, se = {:.4}",
            self.n, self.mean, self.variance, self.standard_deviation, self.standard_error
        )?;
        writeln!(
            f,
            "min {:.4}  Q1 {:.4}  median {:.4}  Q3 {:.4}  max {:.4}",
            self.min, self.q1, self.median, self.q3, self.max
        )
    }
}

impl Display for GroupComparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(
            f,
            "t = {:.4}, df = {:.4}, p-value = {}",
            self.statistic,
            self.degrees_of_freedom,
            format_p(self.p_value)
        )?;
        let subject = match self.method {
            TestMethod::OneSample => "mean",
            TestMethod::Paired => "mean difference",
            TestMethod::Welch | TestMethod::Pooled => "difference in means",
        };
        let relation = match self.alternative {
            Alternative::TwoSided => "not equal to",
            Alternative::Less => "less than",
            Alternative::Greater => "greater than",
        };
        let null = match self.method {
            TestMethod::OneSample => {
                self.estimates.first().copied().unwrap_or(0.0) - self.difference_in_means
            }
            _ => 0.0,
        };
        writeln!(f, "alternative hypothesis: true {subject} is {relation} {null}")?;
        writeln!(
            f,
            "{} percent confidence interval: {:.4} {:.4}",
            self.confidence * 100.0,
            self.confidence_interval.0,
            self.confidence_interval.1
        )?;
        let estimates: Vec<String> = self.estimates.iter().map(|e| format!("{e:.4}")).collect();
        writeln!(f, "sample estimates: {}", estimates.join(" "))
    }
}

impl Display for ResidualQuantiles {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10} {:>10} {:>10} {:>10} {:>10}", "Min", "1Q", "Median", "3Q", "Max")?;
        writeln!(
            f,
            "{:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            self.min, self.q1, self.median, self.q3, self.max
        )
    }
}

impl Display for LinearFit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let width = self.coefficients.iter().map(|c| c.term.len()).max().unwrap_or(0).max(4);
        writeln!(f, "Coefficients:")?;
        writeln!(
            f,
            "{:<width$} {:>12} {:>12} {:>9} {:>12}",
            "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
        )?;
        for c in &self.coefficients {
            writeln!(
                f,
                "{:<width$} {:>12.5} {:>12.5} {:>9.3} {:>12}",
                c.term,
                c.estimate,
                c.standard_error,
                c.t_value,
                format_p(c.p_value)
            )?;
        }
        writeln!(
            f,
            "Residual standard error: {:.4} on {} degrees of freedom",
            self.residual_standard_error, self.residual_df
        )?;
        writeln!(
            f,
            "Multiple R-squared: {:.4}, Adjusted R-squared: {:.4}",
            self.r_squared, self.r_squared_adjusted
        )?;
        if let (Some(stat), Some(p)) = (self.f_statistic, self.f_p_value) {
            let model_df = self.coefficients.len() - 1;
            writeln!(
                f,
                "F-statistic: {:.3} on {} and {} DF, p-value: {}",
                stat,
                model_df,
                self.residual_df,
                format_p(p)
            )?;
        }
        Ok(())
    }
}

impl Display for Heteroscedasticity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self.variant {
            BreuschPaganVariant::Studentized => "studentized Breusch-Pagan test",
            BreuschPaganVariant::Original => "Breusch-Pagan test",
        };
        writeln!(
            f,
            "{name}: BP = {:.4}, df = {}, p-value = {}",
            self.statistic,
            self.degrees_of_freedom,
            format_p(self.p_value)
        )
    }
}

impl Display for EmpiricalVariogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10} {:>6} {:>12}", "dist", "np", "gamma")?;
        for bin in &self.bins {
            match bin.gamma() {
                Ok(g) => writeln!(
                    f,
                    "{:>10.3} {:>6} {:>12.5}",
                    bin.lag_distance, bin.pair_count, g
                )?,
                Err(_) => writeln!(f, "{:>10.3} {:>6} {:>12}", bin.lag_distance, 0, "undefined")?,
            }
        }
        Ok(())
    }
}

impl Display for VariogramFit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} model: nugget = {:.5}, partial sill = {:.5}, range = {:.4}",
            self.family, self.nugget, self.sill, self.range
        )?;
        if self.converged {
            writeln!(
                f,
                "converged after {} iterations (weighted SSE {:.4e})",
                self.iterations, self.weighted_sse
            )
        } else {
            writeln!(
                f,
                "warning: fit did not converge after {} iterations; parameters are unreliable",
                self.iterations
            )
        }
    }
}
