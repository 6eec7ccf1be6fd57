use std::{ path::PathBuf, process::ExitCode };
use clap::Parser;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::info;
use lightprop::{
    config::Params,
    field::Field,
    logging,
    sequence::Controller,
    snapshot,
};

/// Propagate initial wavefunctions through the sequence of a parameter file.
#[derive(Parser, Debug)]
#[command(name = "run_sequence")]
struct Cli {
    /// TOML parameter file.
    params: PathBuf,
    /// Initial snapshot of each internal state, in order.
    #[arg(required = true)]
    psi: Vec<PathBuf>,
    /// Output directory for snapshots and diagnostic tables.
    #[arg(long, default_value = ".")]
    outdir: PathBuf,
}

fn load_field(params: &Params, files: &[PathBuf]) -> anyhow::Result<Field> {
    let grid = params.header()?;
    let mut t0 = 0.0;
    let mut comps: Vec<nd::Array1<C64>> = Vec::with_capacity(files.len());
    for (k, path) in files.iter().enumerate() {
        let (header, data) = snapshot::read(path)?;
        if header.n_points() != grid.n_points() {
            anyhow::bail!(
                "{} holds {} points; the parameter grid has {}",
                path.display(),
                header.n_points(),
                grid.n_points(),
            );
        }
        if k == 0 { t0 = header.t; }
        comps.push(data);
    }
    let mut field = Field::from_components(grid, &comps)?;
    field.set_t(t0);
    Ok(field)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let params = Params::load(&cli.params)?;
    let field = load_field(&params, &cli.psi)?;
    info!("loaded {} components at t = {}", field.n_states(), field.t());
    let mut ctrl = Controller::new(params, field, &cli.outdir)?;
    ctrl.run()?;
    info!("finished at t = {}", ctrl.field().t());
    Ok(())
}

fn main() -> ExitCode {
    logging::init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Critical error: {err:#}");
            ExitCode::FAILURE
        },
    }
}
