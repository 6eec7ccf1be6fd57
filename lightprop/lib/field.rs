//! Multi-component wavefunction over a uniform grid.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    Arr1,
    error::ConfigError,
    grid::{ self, Header, MAX_DIM },
    utils::{ density, FftDir, FftPlans },
};

/// One complex amplitude array per internal state, stored in a single arena.
///
/// The arena has shape `(n_states, n_points)`, so each component is one
/// contiguous row in flat, row-major grid order. The shape is fixed at
/// construction; only the amplitudes and the time fields of the header change
/// afterward.
#[derive(Clone, Debug)]
pub struct Field {
    header: Header,
    psi: nd::Array2<C64>,
    plans: FftPlans,
}

impl Field {
    /// Create a new field of `n_states` zero-valued components.
    pub fn zeros(header: Header, n_states: usize) -> Self {
        let psi = nd::Array2::zeros((n_states, header.n_points()));
        let plans = FftPlans::new(&header);
        Self { header, psi, plans }
    }

    /// Create a new field from one amplitude array per state.
    ///
    /// Fails if any component does not hold exactly one value per grid point.
    pub fn from_components(header: Header, components: &[nd::Array1<C64>])
        -> Result<Self, ConfigError>
    {
        let mut field = Self::zeros(header, components.len());
        for (s, comp) in components.iter().enumerate() {
            if comp.len() != header.n_points() {
                return Err(ConfigError::bad_value(
                    "field",
                    format!(
                        "component {s} has {} points; grid has {}",
                        comp.len(),
                        header.n_points(),
                    ),
                ));
            }
            field.psi.row_mut(s).assign(comp);
        }
        Ok(field)
    }

    pub fn header(&self) -> &Header { &self.header }

    pub fn n_states(&self) -> usize { self.psi.nrows() }

    pub fn n_points(&self) -> usize { self.psi.ncols() }

    /// Current simulation time.
    pub fn t(&self) -> f64 { self.header.t }

    pub fn set_t(&mut self, t: f64) { self.header.t = t; }

    /// Advance the simulation time by `dt`.
    pub fn advance(&mut self, dt: f64) { self.header.t += dt; }

    /// Current time step.
    pub fn dt(&self) -> f64 { self.header.dt }

    pub fn set_dt(&mut self, dt: f64) { self.header.dt = dt; }

    /// Full amplitude arena, indexed by `(state, point)`.
    pub fn psi(&self) -> &nd::Array2<C64> { &self.psi }

    pub fn psi_mut(&mut self) -> &mut nd::Array2<C64> { &mut self.psi }

    /// Borrow the header and the arena at the same time.
    pub fn split_mut(&mut self) -> (&Header, &mut nd::Array2<C64>) {
        (&self.header, &mut self.psi)
    }

    /// View a single component.
    ///
    /// *Panics if `s` is out of range*.
    pub fn component(&self, s: usize) -> nd::ArrayView1<C64> { self.psi.row(s) }

    /// Mutably view a single component.
    ///
    /// *Panics if `s` is out of range*.
    pub fn component_mut(&mut self, s: usize) -> nd::ArrayViewMut1<C64> {
        self.psi.row_mut(s)
    }

    /// Position of the grid point with flat index `l`.
    pub fn coord(&self, l: usize) -> [f64; MAX_DIM] { self.header.coord(l) }

    /// Wavevector of the FFT mode with flat index `l`.
    pub fn wavevector(&self, l: usize) -> [f64; MAX_DIM] {
        self.header.wavevector(l)
    }

    fn transform(&mut self, s: usize, dir: FftDir) {
        let mut row = self.psi.row_mut(s);
        let buf = row.as_slice_mut()
            .expect("Field::transform: component rows are contiguous");
        self.plans.process(buf, dir);
    }

    /// Transform component `s` to momentum space in place.
    ///
    /// *Panics if `s` is out of range*.
    pub fn fft(&mut self, s: usize) { self.transform(s, FftDir::Forward); }

    /// Transform component `s` back to position space in place.
    ///
    /// *Panics if `s` is out of range*.
    pub fn ifft(&mut self, s: usize) { self.transform(s, FftDir::Inverse); }

    /// Number of particles in component `s`, i.e. `Σ |ψ|² δV` over the grid.
    ///
    /// *Panics if `s` is out of range*.
    pub fn particle_number(&self, s: usize) -> f64 {
        self.psi.row(s).iter().map(|z| density(*z)).sum::<f64>()
            * self.header.dv()
    }

    /// Impart momentum `p` on component `s` by multiplying it with the plane
    /// wave `exp(i p·x)`.
    ///
    /// *Panics if `s` is out of range*.
    pub fn set_momentum(&mut self, p: [f64; MAX_DIM], s: usize) {
        let header = self.header;
        self.psi.row_mut(s).indexed_iter_mut()
            .for_each(|(l, z)| {
                *z *= C64::cis(grid::dot(&p, &header.coord(l)));
            });
    }

    /// Overwrite component `s` with `data`.
    ///
    /// *Panics if `s` is out of range or `data` has the wrong length*.
    pub fn assign_component<S>(&mut self, s: usize, data: &Arr1<S>)
    where S: nd::Data<Elem = C64>
    {
        self.psi.row_mut(s).assign(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(header: Header) -> nd::Array1<C64> {
        (0..header.n_points())
            .map(|l| {
                let x = header.coord(l);
                C64::from((-grid::norm2(&x) / 2.0).exp())
            })
            .collect()
    }

    #[test]
    fn particle_number_is_scaled_by_volume() {
        let h = Header::new(1, &[8], &[0.0], &[4.0], 0.01).unwrap();
        let comps = vec![nd::Array1::from_elem(8, C64::new(1.0, 1.0))];
        let field = Field::from_components(h, &comps).unwrap();
        assert!((field.particle_number(0) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn fft_round_trip_restores_component() {
        let h = Header::new(2, &[8, 6], &[-4.0, -3.0], &[4.0, 3.0], 0.01)
            .unwrap();
        let g = gaussian(h);
        let mut field = Field::from_components(h, &[g.clone(), g.clone()])
            .unwrap();
        field.fft(1);
        field.ifft(1);
        let diff = field.component(1).iter().zip(&g)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        assert!(diff < 1e-12);
        assert_eq!(field.component(0), g.view());
    }

    #[test]
    fn momentum_space_norm_matches() {
        let h = Header::new(1, &[32], &[-8.0], &[8.0], 0.01).unwrap();
        let mut field = Field::from_components(h, &[gaussian(h)]).unwrap();
        let n_x = field.particle_number(0);
        field.fft(0);
        let n_k: f64 = field.component(0).iter().map(|z| z.norm_sqr()).sum::<f64>()
            * h.dv_k();
        assert!((n_x - n_k).abs() < 1e-10);
    }

    #[test]
    fn momentum_kick_preserves_density() {
        let h = Header::new(1, &[16], &[-4.0], &[4.0], 0.01).unwrap();
        let g = gaussian(h);
        let mut field = Field::from_components(h, &[g.clone()]).unwrap();
        field.set_momentum([2.0, 0.0, 0.0], 0);
        for (a, b) in field.component(0).iter().zip(&g) {
            assert!((a.norm() - b.norm()).abs() < 1e-14);
        }
        let x = h.coord(3)[0];
        assert!((field.component(0)[3] - g[3] * C64::cis(2.0 * x)).norm() < 1e-14);
    }

    #[test]
    fn rejects_wrong_component_length() {
        let h = Header::new(1, &[8], &[0.0], &[1.0], 0.01).unwrap();
        let bad = vec![nd::Array1::zeros(7)];
        assert!(Field::from_components(h, &bad).is_err());
    }
}
