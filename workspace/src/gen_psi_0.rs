use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rayon::prelude::*;
use tracing::info;
use lightprop::{
    config::Params,
    field::Field,
    formula::Formula,
    logging,
    snapshot,
};

/// Write an initial wavefunction snapshot from real and imaginary formulas.
///
/// Reads `FILENAME`, `PSI_REAL_<d>D`, and `PSI_IMAG_<d>D` from the
/// `[simulation]` table and the particle number `N` from `[constants]`.
#[derive(Parser, Debug)]
#[command(name = "gen_psi_0")]
struct Cli {
    /// TOML parameter file.
    params: PathBuf,
    /// Output directory; `FILENAME` is resolved relative to it.
    #[arg(long, default_value = ".")]
    outdir: PathBuf,
}

const VARS: [&str; 3] = ["x", "y", "z"];

fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let params = Params::load(&cli.params)?;
    let header = params.header()?;
    let dim = header.dim();
    info!("DIM = {}", dim);

    let filename = params.simulation("FILENAME")?;
    let consts = params.formula_constants();
    let real = Formula::compile(
        params.simulation(&format!("PSI_REAL_{dim}D"))?, &VARS[..dim], &consts)?;
    let imag = Formula::compile(
        params.simulation(&format!("PSI_IMAG_{dim}D"))?, &VARS[..dim], &consts)?;
    let n_particles = params.constant_or("N", 1.0)?;

    let mut psi: nd::Array1<C64>
        = (0..header.n_points()).into_par_iter()
        .map(|l| {
            let x = header.coord(l);
            C64::new(real.eval(&x[..dim]), imag.eval(&x[..dim]))
        })
        .collect::<Vec<C64>>()
        .into();
    let norm: f64
        = psi.iter().map(|z| z.norm_sqr()).sum::<f64>() * header.dv();
    if norm > 0.0 {
        let f = (n_particles / norm).sqrt();
        psi.par_mapv_inplace(|z| z * f);
    }

    let field = Field::from_components(header, &[psi])?;
    let path = cli.outdir.join(filename);
    snapshot::save(&path, &field, 0)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {} ({} particles)", path.display(), field.particle_number(0));
    Ok(())
}
