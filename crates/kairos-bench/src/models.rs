//! Reference differential systems used by the benchmark scenarios.
//!
//! | model              | equation                                   | exact |
//! |--------------------|--------------------------------------------|-------|
//! | `ExponentialDecay` | u' = -λu                                   | yes   |
//! | `Logistic`         | u' = r u (1 - u/K)                         | yes   |
//! | `VanDerPol`        | x' = y, y' = μ(1 - x²) y - x               | no    |
//! | `HeatRod`          | u_t = κ u_xx on (0, L), u = 0 at both ends | yes (semi-discrete) |

use std::f64::consts::PI;

use kairos_math::{CsrMatrix, VariableLayout};
use kairos_solver::DifferentialSystem;
use kairos_types::{KairosError, KairosResult};

/// u' = -λu, one variable with `n` independent dofs.
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    pub lambda: f64,
    layout: VariableLayout,
}

impl ExponentialDecay {
    pub fn new(lambda: f64, n_dofs: usize) -> Self {
        Self {
            lambda,
            layout: VariableLayout::uniform(n_dofs),
        }
    }

    /// u(t) = u₀ e^{-λt}.
    pub fn exact(&self, initial: &[f64], time: f64) -> Vec<f64> {
        let factor = (-self.lambda * time).exp();
        initial.iter().map(|u| u * factor).collect()
    }
}

impl DifferentialSystem for ExponentialDecay {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn rate(&self, _time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        for (f, u) in out.iter_mut().zip(values) {
            *f = -self.lambda * u;
        }
        Ok(())
    }

    fn jacobian(&self, _time: f64, values: &[f64]) -> KairosResult<CsrMatrix> {
        let n = values.len();
        diagonal(n, |_| -self.lambda)
    }

    fn name(&self) -> &str {
        "exponential_decay"
    }
}

/// Logistic growth toward carrying capacity `K`.
#[derive(Debug, Clone)]
pub struct Logistic {
    pub rate: f64,
    pub capacity: f64,
    layout: VariableLayout,
}

impl Logistic {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            layout: VariableLayout::uniform(1),
        }
    }

    /// u(t) = K u₀ e^{rt} / (K + u₀ (e^{rt} - 1)).
    pub fn exact(&self, initial: &[f64], time: f64) -> Vec<f64> {
        let growth = (self.rate * time).exp();
        let k = self.capacity;
        initial
            .iter()
            .map(|u0| k * u0 * growth / (k + u0 * (growth - 1.0)))
            .collect()
    }
}

impl DifferentialSystem for Logistic {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn rate(&self, _time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        for (f, u) in out.iter_mut().zip(values) {
            *f = self.rate * u * (1.0 - u / self.capacity);
        }
        Ok(())
    }

    fn jacobian(&self, _time: f64, values: &[f64]) -> KairosResult<CsrMatrix> {
        diagonal(values.len(), |i| {
            self.rate * (1.0 - 2.0 * values[i] / self.capacity)
        })
    }

    fn name(&self) -> &str {
        "logistic"
    }
}

/// Van der Pol oscillator; position and velocity are separate variables.
#[derive(Debug, Clone)]
pub struct VanDerPol {
    pub mu: f64,
    layout: VariableLayout,
}

impl VanDerPol {
    pub fn new(mu: f64) -> Self {
        Self {
            mu,
            layout: VariableLayout::from_sizes(vec![1, 1]),
        }
    }
}

impl DifferentialSystem for VanDerPol {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn rate(&self, _time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        let (x, y) = (values[0], values[1]);
        out[0] = y;
        out[1] = self.mu * (1.0 - x * x) * y - x;
        Ok(())
    }

    fn jacobian(&self, _time: f64, values: &[f64]) -> KairosResult<CsrMatrix> {
        let (x, y) = (values[0], values[1]);
        CsrMatrix::from_triplets(
            2,
            2,
            &[
                (0, 1, 1.0),
                (1, 0, -2.0 * self.mu * x * y - 1.0),
                (1, 1, self.mu * (1.0 - x * x)),
            ],
        )
        .map_err(KairosError::Model)
    }

    fn name(&self) -> &str {
        "van_der_pol"
    }
}

/// Second-order finite differences of the 1-D heat equation on `n`
/// interior nodes with homogeneous Dirichlet ends.
#[derive(Debug, Clone)]
pub struct HeatRod {
    pub diffusivity: f64,
    pub length: f64,
    layout: VariableLayout,
    /// Constant tridiagonal operator κ/h² · [1 -2 1].
    operator: CsrMatrix,
}

impl HeatRod {
    pub fn new(n_nodes: usize, diffusivity: f64, length: f64) -> KairosResult<Self> {
        if n_nodes == 0 {
            return Err(KairosError::InvalidConfig(
                "heat rod needs at least one interior node".into(),
            ));
        }
        let h = length / (n_nodes + 1) as f64;
        let scale = diffusivity / (h * h);
        let mut triplets = Vec::with_capacity(3 * n_nodes);
        for i in 0..n_nodes {
            triplets.push((i, i, -2.0 * scale));
            if i > 0 {
                triplets.push((i, i - 1, scale));
            }
            if i + 1 < n_nodes {
                triplets.push((i, i + 1, scale));
            }
        }
        let operator =
            CsrMatrix::from_triplets(n_nodes, n_nodes, &triplets).map_err(KairosError::Model)?;
        Ok(Self {
            diffusivity,
            length,
            layout: VariableLayout::uniform(n_nodes),
            operator,
        })
    }

    /// Grid spacing.
    pub fn spacing(&self) -> f64 {
        self.length / (self.layout.n_dofs() + 1) as f64
    }

    /// The first sine mode sampled on the interior nodes.
    pub fn fundamental_mode(&self) -> Vec<f64> {
        let h = self.spacing();
        (1..=self.layout.n_dofs())
            .map(|i| (PI * i as f64 * h / self.length).sin())
            .collect()
    }

    /// Decay rate of the fundamental mode under the discrete operator.
    pub fn fundamental_rate(&self) -> f64 {
        let h = self.spacing();
        let s = (PI * h / (2.0 * self.length)).sin();
        4.0 * self.diffusivity * s * s / (h * h)
    }

    /// Exact semi-discrete solution when `initial` is a multiple of the
    /// fundamental mode.
    pub fn exact(&self, initial: &[f64], time: f64) -> Vec<f64> {
        let factor = (-self.fundamental_rate() * time).exp();
        initial.iter().map(|u| u * factor).collect()
    }
}

impl DifferentialSystem for HeatRod {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn rate(&self, _time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        self.operator.mul_vec(values, out).map_err(KairosError::Model)
    }

    fn jacobian(&self, _time: f64, _values: &[f64]) -> KairosResult<CsrMatrix> {
        Ok(self.operator.clone())
    }

    fn name(&self) -> &str {
        "heat_rod"
    }
}

/// Any of the reference models, dispatched statically.
#[derive(Debug, Clone)]
pub enum ReferenceModel {
    Decay(ExponentialDecay),
    Logistic(Logistic),
    VanDerPol(VanDerPol),
    HeatRod(HeatRod),
}

impl ReferenceModel {
    fn inner(&self) -> &dyn DifferentialSystem {
        match self {
            Self::Decay(m) => m,
            Self::Logistic(m) => m,
            Self::VanDerPol(m) => m,
            Self::HeatRod(m) => m,
        }
    }

    /// Exact solution at `time` from `initial`, when one is known.
    pub fn exact(&self, initial: &[f64], time: f64) -> Option<Vec<f64>> {
        match self {
            Self::Decay(m) => Some(m.exact(initial, time)),
            Self::Logistic(m) => Some(m.exact(initial, time)),
            Self::VanDerPol(_) => None,
            Self::HeatRod(m) => Some(m.exact(initial, time)),
        }
    }
}

impl DifferentialSystem for ReferenceModel {
    fn layout(&self) -> &VariableLayout {
        self.inner().layout()
    }

    fn rate(&self, time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        self.inner().rate(time, values, out)
    }

    fn jacobian(&self, time: f64, values: &[f64]) -> KairosResult<CsrMatrix> {
        self.inner().jacobian(time, values)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

fn diagonal(n: usize, entry: impl Fn(usize) -> f64) -> KairosResult<CsrMatrix> {
    let triplets: Vec<_> = (0..n).map(|i| (i, i, entry(i))).collect();
    CsrMatrix::from_triplets(n, n, &triplets).map_err(KairosError::Model)
}
