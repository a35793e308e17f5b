//! Write synthetic COS-like spectral data and a reference PSF profile for
//! exercising the loaders and reduction routines.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use hst_analysis::data::loader::{EXPTIME_COLUMN, LIST_COLUMNS, load_psf_profile, load_spectral_table};
use hst_analysis::{ContrastParams, SnrConfig, WavelengthRange, contrast_curve, estimate_snr};

/// Ångström per pixel of the G130M dispersion.
const DISPERSION: f64 = 0.00997;
const PIXELS: usize = 16384;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Per-pixel columns of one segment, in `LIST_COLUMNS` order.
fn generate_segment(start: f64, exptime: f64, rng: &mut SimpleRng) -> [Vec<f64>; 6] {
    // Absorption lines: (center Å, width Å, depth)
    let lines = [(1206.5, 0.15, 0.8), (1334.5, 0.1, 0.6), (1393.8, 0.12, 0.7), (1402.8, 0.12, 0.5)];
    // Counts per unit flux per second.
    let sensitivity = 2.0e14;

    let mut columns: [Vec<f64>; 6] = Default::default();
    for px in 0..PIXELS {
        let wvln = start + px as f64 * DISPERSION;
        let absorption: f64 = lines
            .iter()
            .map(|&(mu, sigma, depth)| gaussian(wvln, mu, sigma, depth))
            .sum();
        let flux_true = 2.0e-14 * (1.0 - absorption.min(1.0));
        // Detector edges are masked out (zero counts, zero rate).
        let live = px > 200 && px < PIXELS - 200;

        let expected = flux_true * sensitivity * exptime;
        let gcounts = if live {
            rng.gauss(expected, expected.sqrt()).round().max(0.0)
        } else {
            0.0
        };
        let gross = if live { gcounts / exptime } else { 0.0 };
        let flux = gross / sensitivity;
        let error = gcounts.max(1.0).sqrt() / exptime / sensitivity;

        columns[0].push(wvln);
        columns[1].push(flux);
        columns[2].push(error);
        columns[3].push(error);
        columns[4].push(gross);
        columns[5].push(gcounts);
    }
    columns
}

fn list_array(rows: &[&Vec<f64>]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row.iter() {
            values.append_value(v);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn write_spectral_table(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    // FUVB then FUVA, as in a G130M/1291 x1d file.
    let exptimes = vec![1200.0, 1200.0];
    let segments = [
        generate_segment(1132.0, exptimes[0], rng),
        generate_segment(1291.0, exptimes[1], rng),
    ];

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let mut fields = vec![Field::new(EXPTIME_COLUMN, DataType::Float64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(exptimes))];
    for (k, name) in LIST_COLUMNS.iter().enumerate() {
        fields.push(Field::new(*name, DataType::List(item.clone()), false));
        let rows: Vec<&Vec<f64>> = segments.iter().map(|s| &s[k]).collect();
        arrays.push(list_array(&rows));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet output")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_psf_profile(path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating PSF profile CSV")?;
    writer.write_record(["separation", "intensity"])?;
    for i in 1..=60 {
        let r = 0.05 * i as f64;
        // Airy-like core falling into r^-3 wings.
        let intensity = 1.0 / (1.0 + (r / 0.1).powi(3));
        writer.write_record([format!("{r:.3}"), format!("{intensity:.6e}")])?;
    }
    writer.flush().context("flushing PSF profile CSV")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let table_path = Path::new("sample_x1d.parquet");
    write_spectral_table(table_path, &mut rng)?;
    let profile_path = Path::new("sample_psf_profile.csv");
    write_psf_profile(profile_path)?;

    // Read both back so a broken writer shows up immediately.
    let table = load_spectral_table(table_path)?;
    let config = SnrConfig {
        range: WavelengthRange::bounded(1300.0, 1320.0)?,
        bin_first: Some(6),
        weighted: true,
    };
    let snr = estimate_snr(&table, &config)?;
    let profile = load_psf_profile(profile_path)?;
    let curve = contrast_curve(&ContrastParams::default(), &profile)?;
    let at_one_arcsec = curve
        .separation
        .iter()
        .position(|&r| r >= 1.0)
        .map_or(f64::NAN, |i| curve.five_sigma[i]);

    println!(
        "Wrote {} segments ({PIXELS} pixels each) to {}; SNR over 1300-1320 Å ≈ {:.1}",
        table.len(),
        table_path.display(),
        snr.best
    );
    println!(
        "Wrote {} PSF profile samples to {}; 5σ contrast at 1\" ≈ {:.2e}",
        profile.len(),
        profile_path.display(),
        at_one_arcsec
    );
    Ok(())
}
