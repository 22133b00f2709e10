//! The standard set of analyses, run end to end from one configuration.
//!
//! Simulations draw from the single generator in a fixed order, so a
//! configuration and seed determine the whole report.

use tracing::info;

use crate::config::StudyConfig;
use crate::datasets;
use crate::diagnostics::{diagnose_residuals, normal_qq_points, residual_quantiles};
use crate::distributions::{ChiSquared, DistributionError, FisherF, Normal, StudentT};
use crate::error::{InferenceError, Result};
use crate::random::{self, StudyRng};
use crate::regression::{fit_linear_model, Factor, Predictor};
use crate::report::{Body, Report, Section};
use crate::stats::{summarize, summarize_groups};
use crate::ttest::{compare_sample_groups, one_sample, CompareOptions};
use crate::variogram::{Column, LagBins, SpatialDataset, Table};
use crate::vgm_fit::{fit_theoretical_model, InitialGuess};

/// Runs every analysis and collects the sections into a report.
pub fn run_study(config: &StudyConfig, rng: &mut StudyRng) -> Report {
    let mut report = Report::new("Classical inference walkthrough", config.seed);
    info!(seed = config.seed, "running study");

    // population drawn up front; the sample is a subset of it
    let population = random::normal_sample(
        rng,
        config.population.size,
        config.population.mean,
        config.population.sd,
    );
    let sample = population
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|p| random::sample_without_replacement(rng, p, config.population.sample_size));

    report.push(Section::run("Population and sample", || {
        let population = population.as_ref().map_err(Clone::clone)?;
        let sample = sample.as_ref().map_err(Clone::clone)?;
        Ok(Body::Summaries {
            rows: vec![
                ("population".into(), summarize(population)?),
                ("sample".into(), summarize(sample)?),
            ],
        })
    }));

    report.push(Section::run("Reference distributions", || {
        critical_values(config.confidence, config.population.sample_size)
    }));

    report.push(Section::run("Sample mean against the population mean", || {
        let sample = sample.as_ref().map_err(Clone::clone)?;
        Ok(Body::Comparison(one_sample(
            sample,
            config.population.mean,
            config.alternative,
            config.confidence,
        )?))
    }));

    let options = CompareOptions {
        alternative: config.alternative,
        confidence: config.confidence,
        ..CompareOptions::default()
    };
    report.push(Section::run("Sleep data by drug", || {
        Ok(Body::Summaries {
            rows: summarize_groups(&datasets::sleep())?,
        })
    }));
    report.push(Section::run("Sleep data, drugs as independent groups", || {
        Ok(Body::Comparison(compare_sample_groups(&datasets::sleep(), &options)?))
    }));
    let paired = CompareOptions {
        paired: true,
        ..options
    };
    report.push(Section::run("Sleep data, paired by patient", || {
        Ok(Body::Comparison(compare_sample_groups(&datasets::sleep(), &paired)?))
    }));

    let p = &config.paired;
    let effect = random::paired_effect(rng, p.n, p.mean, p.between_sd, p.effect, p.within_sd);
    report.push(Section::run("Simulated before/after effect", || {
        Ok(Body::Comparison(compare_sample_groups(&effect?, &paired)?))
    }));

    let lines = random::two_noisy_lines(rng, &config.regression.data);
    report.push(Section::run("Two-group linear model", || {
        let lines = lines?;
        let factor = Factor::new("group", lines.group, config.regression.group_effect);
        let fit = fit_linear_model(&[Predictor::new("x", lines.x)], &lines.y, Some(&factor))?;
        let residuals = residual_quantiles(&fit.residuals)?;
        let heteroscedasticity = diagnose_residuals(&fit.residuals, &fit.fitted)?;
        let qq = normal_qq_points(&fit.residuals)?;
        Ok(Body::Regression {
            fit,
            residuals,
            heteroscedasticity,
            qq,
        })
    }));

    let field = random::spatial_field(rng, &config.variogram.field);
    report.push(Section::run("Spatial dependence", || spatial_section(config, field?)));

    info!(sections = report.sections.len(), failures = report.failures(), "study finished");
    report
}

/// Two-sided z and t quantiles for the confidence level, and the upper
/// chi-squared and F quantiles used by one-parameter tests at the same level.
fn critical_values(confidence: f64, n: usize) -> Result<Body> {
    let upper = 0.5 + confidence / 2.0;
    let df = n.saturating_sub(1).max(1) as f64;
    let bad = |e: DistributionError| InferenceError::invalid(e.to_string());
    let t = StudentT::new(df).map_err(bad)?;
    let chi2 = ChiSquared::new(1.0).map_err(bad)?;
    let f = FisherF::new(1.0, df).map_err(bad)?;
    let missing = |p: f64| move || InferenceError::invalid(format!("no quantile at {p}"));
    Ok(Body::Values {
        rows: vec![
            (
                format!("z({upper})"),
                Normal::standard().quantile(upper).ok_or_else(missing(upper))?,
            ),
            (
                format!("t({upper}, df = {df})"),
                t.quantile(upper).ok_or_else(missing(upper))?,
            ),
            (
                format!("chisq({confidence}, df = 1)"),
                chi2.quantile(confidence).ok_or_else(missing(confidence))?,
            ),
            (
                format!("F({confidence}, 1, {df})"),
                f.quantile(confidence).ok_or_else(missing(confidence))?,
            ),
        ],
    })
}

fn spatial_section(config: &StudyConfig, field: SpatialDataset) -> Result<Body> {
    let vc = &config.variogram;
    let roles = &vc.columns;

    // round-trip through a table so the column roles are exercised
    let xs = field.points.iter().map(|p| p.x).collect();
    let ys = field.points.iter().map(|p| p.y).collect();
    let mut table = Table::new()
        .with_column(roles.x.clone(), Column::Numeric(xs))?
        .with_column(roles.y.clone(), Column::Numeric(ys))?
        .with_column(roles.value.clone(), Column::Numeric(field.values))?;
    if let (Some(name), Some(zones)) = (&roles.group, field.groups) {
        table = table.with_column(name.clone(), Column::Categorical(zones))?;
    }
    let dataset = SpatialDataset::from_table(&table, roles)?;

    let bins = match (vc.width, vc.cutoff) {
        (Some(width), Some(cutoff)) => LagBins::uniform(width, cutoff)?,
        _ => LagBins::default_for(&dataset.points)?,
    };
    let empirical = dataset.empirical_variogram(&bins)?;
    let points = empirical.points();
    let guess = match vc.initial_guess {
        Some(g) => g,
        None => InitialGuess::from_points(&points)
            .ok_or_else(|| InferenceError::insufficient(1, 0, "non-empty variogram bins"))?,
    };
    let model = fit_theoretical_model(&points, vc.family, guess, &vc.fit)?;

    let by_group = if dataset.groups.is_some() {
        dataset
            .by_group()
            .into_iter()
            .map(|(label, group)| Ok((label, group.empirical_variogram(&bins)?)))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(Body::Variogram {
        empirical,
        model,
        by_group,
    })
}
