use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum NormalError {
    #[error("Sigma must be positive and finite, got {0}")]
    InvalidSigma(f64),
    #[error("Mu must be finite, got {0}")]
    InvalidMu(f64),
}

/// A Normal (Gaussian) distribution.
///
/// Used to weight the states the solver picked for an `uncertain(mu, sigma)`
/// variable: the weight of a state is the density of the prior at the
/// solver's value, so downstream consumers can see both the assignment and
/// how plausible it was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    /// Construct a validated distribution.
    ///
    /// # Parameters
    /// - `mu`: Mean.
    /// - `sigma`: Standard deviation, strictly positive.
    ///
    /// # Returns
    /// The distribution, or [`NormalError`] for non-finite or non-positive
    /// parameters.
    pub fn new(mu: f64, sigma: f64) -> Result<Self, NormalError> {
        if !mu.is_finite() {
            return Err(NormalError::InvalidMu(mu));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(NormalError::InvalidSigma(sigma));
        }
        Ok(Self { mu, sigma })
    }

    pub fn mean(&self) -> f64 {
        self.mu
    }

    pub fn std_dev(&self) -> f64 {
        self.sigma
    }

    /// Probability density at `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        (-0.5 * z * z).exp() / (self.sigma * (2.0 * std::f64::consts::PI).sqrt())
    }
}
