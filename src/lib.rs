//! # u-inference
//!
//! Classical inferential statistics for teaching walkthroughs: descriptive
//! summaries, Student's t-tests, least squares with a categorical factor,
//! residual diagnostics and spatial semivariograms.
//!
//! ## Modules
//!
//! - [`stats`]: descriptive statistics with numerical stability guarantees
//! - [`special`], [`distributions`]: gamma/beta functions and the normal,
//!   t, chi-squared and F distributions
//! - [`sample`]: labelled observations for grouped and paired designs
//! - [`ttest`]: one-sample, paired, Welch and pooled t-tests
//! - [`regression`], [`diagnostics`]: OLS fits and Breusch–Pagan checks
//! - [`variogram`], [`vgm_fit`]: empirical semivariograms and model fits
//! - [`optimize`], [`linalg`]: Levenberg–Marquardt and small dense solvers
//! - [`random`], [`datasets`]: seeded simulation and built-in data
//! - [`report`], [`study`], [`config`]: the end-to-end walkthrough
//!
//! ## Design Philosophy
//!
//! - **Numerical stability first**: Welford's algorithm for variance,
//!   Kahan summation for accumulation, upper tails computed directly
//! - **Pure functions**: every analysis borrows immutable input; randomness
//!   comes only from an explicitly passed, seeded generator
//! - **Failures are values**: errors are typed, and optimizer
//!   non-convergence is a result field
//! - **Property-based testing**: mathematical invariants verified via proptest

pub mod config;
pub mod datasets;
pub mod diagnostics;
pub mod distributions;
pub mod error;
pub mod linalg;
pub mod optimize;
pub mod random;
pub mod regression;
pub mod report;
pub mod sample;
pub mod special;
pub mod stats;
pub mod study;
pub mod ttest;
pub mod variogram;
pub mod vgm_fit;

pub use error::{InferenceError, Result};
pub use sample::Sample;
