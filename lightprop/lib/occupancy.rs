//! Momentum-space occupancy around a fixed set of probe points.

use std::{
    fs,
    io::{ self, BufWriter, Write },
    path::Path,
};
use rayon::prelude::*;
use tracing::warn;
use crate::{
    config::{ CResult, Params },
    field::Field,
    grid::{ self, MAX_DIM },
    utils::density,
};

/// Component whose momentum distribution is analyzed.
pub const PROBED_COMPONENT: usize = 0;

/// Momentum-space probe points sharing a single capture radius.
#[derive(Clone, Debug, PartialEq)]
pub struct Probes {
    dim: usize,
    points: Vec<[f64; MAX_DIM]>,
    threshold: f64,
}

impl Probes {
    pub fn new(dim: usize, points: Vec<[f64; MAX_DIM]>, threshold: f64) -> Self {
        Self { dim, points, threshold }
    }

    /// Read the probe list and the `rabi_threshold` constant. The threshold
    /// is only required if there is at least one probe.
    pub fn from_params(params: &Params) -> CResult<Self> {
        let points = params.probe_points();
        let threshold
            = if points.is_empty() {
                params.constant_or("rabi_threshold", 0.0)?
            } else {
                params.constant("rabi_threshold")?
            };
        Ok(Self::new(params.grid.dim, points, threshold))
    }

    pub fn len(&self) -> usize { self.points.len() }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    pub fn points(&self) -> &[[f64; MAX_DIM]] { &self.points }

    /// Capture radius around every probe.
    pub fn threshold(&self) -> f64 { self.threshold }

    /// Column label for probe `i`.
    ///
    /// *Panics if `i` is out of range*.
    pub fn label(&self, i: usize) -> String {
        let comps: Vec<String>
            = self.points[i][..self.dim].iter()
            .map(|k| k.to_string())
            .collect();
        format!("({})", comps.join(","))
    }

    /// Tab-separated labels of all probes.
    pub fn header(&self) -> String {
        (0..self.len())
            .map(|i| self.label(i))
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn captures(&self, probe: &[f64; MAX_DIM], k: &[f64; MAX_DIM]) -> bool {
        let d = [probe[0] - k[0], probe[1] - k[1], probe[2] - k[2]];
        grid::norm2(&d).sqrt() < self.threshold
    }
}

/// Compute the population within the capture radius of every probe.
///
/// [`PROBED_COMPONENT`] is transformed to momentum space, summed into one
/// bucket per probe, and transformed back. A mode within range of several
/// probes counts toward each of them. Returns `None` and leaves the field
/// untouched if there are no probes.
pub fn populations(field: &mut Field, probes: &Probes) -> Option<Vec<f64>> {
    if probes.is_empty() {
        warn!("probe list is empty; skipping momentum populations");
        return None;
    }
    let m = probes.len();
    field.fft(PROBED_COMPONENT);
    let header = *field.header();
    let psi_k = field.component(PROBED_COMPONENT);
    let sums: Vec<f64>
        = (0..field.n_points()).into_par_iter()
        .fold(
            || vec![0.0; m],
            |mut acc, l| {
                let k = header.wavevector(l);
                let rho = density(psi_k[l]);
                probes.points().iter().zip(acc.iter_mut())
                    .filter(|(p, _)| probes.captures(p, &k))
                    .for_each(|(_, a)| { *a += rho; });
                acc
            },
        )
        .reduce(
            || vec![0.0; m],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(ak, bk)| { *ak += bk; });
                a
            },
        );
    field.ifft(PROBED_COMPONENT);
    let dv_k = header.dv_k();
    Some(sums.into_iter().map(|s| s * dv_k).collect())
}

/// Population samples, one row per sampling event and one column per probe.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RabiSeries {
    rows: Vec<Vec<f64>>,
}

impl RabiSeries {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, row: Vec<f64>) { self.rows.push(row); }

    pub fn clear(&mut self) { self.rows.clear(); }

    pub fn rows(&self) -> &[Vec<f64>] { &self.rows }

    pub fn last(&self) -> Option<&Vec<f64>> { self.rows.last() }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Sample `field` and append the result, returning the new row.
    pub fn sample(&mut self, field: &mut Field, probes: &Probes)
        -> Option<&Vec<f64>>
    {
        let row = populations(field, probes)?;
        self.rows.push(row);
        self.rows.last()
    }

    /// Write the series as a tab-separated table. Row `i` is stamped with
    /// time `i * interval`.
    pub fn write<P>(&self, path: P, probes: &Probes, interval: f64)
        -> io::Result<()>
    where P: AsRef<Path>
    {
        let mut out = BufWriter::new(fs::File::create(path)?);
        writeln!(out, "# time\t{}", probes.header())?;
        for (i, row) in self.rows.iter().enumerate() {
            write!(out, "{}", i as f64 * interval)?;
            for v in row.iter() { write!(out, "\t{}", v)?; }
            writeln!(out)?;
        }
        out.flush()
    }
}

/// File name of the Rabi table of trial `trial` in segment `segment`.
pub fn rabi_name(segment: usize, trial: usize) -> String {
    format!("Rabi_{}_{}.txt", segment, trial)
}
