//! Numerical helpers for Hubble Space Telescope data analysis.
//!
//! - [`reduce`]: COS spectral downsampling, resolution-element binning and
//!   Poisson SNR estimation
//! - [`compare`]: symmetric percent-difference comparison of two results
//! - [`contrast`]: STIS coronagraphic contrast-sensitivity model
//! - [`psf`]: ePSF interpolation, cutout extraction and stacking
//! - [`timeseries`]: temporal and spatial cosmic-ray rejection and light curves
//! - [`data`]: spectral tables, reference PSF profiles and their loaders
//!
//! Everything operates on in-memory data; [`data::loader`] is the only file
//! boundary.

pub mod compare;
pub mod config;
pub mod contrast;
pub mod data;
pub mod error;
pub mod psf;
pub mod reduce;
pub mod timeseries;

pub use compare::{Comparison, within_percent};
pub use config::AnalysisConfig;
pub use contrast::{ContrastCurve, ContrastParams, contrast_curve};
pub use data::filter::WavelengthRange;
pub use data::model::{PsfProfile, Segment, SpectralTable};
pub use error::{AnalysisError, Result};
pub use psf::{PsfConfig, StackMethod};
pub use reduce::resel::{BinningConfig, bin_by_resel};
pub use reduce::snr::{SnrConfig, SnrEstimate, SnrQuality, estimate_snr};
pub use timeseries::TimeSeriesConfig;
