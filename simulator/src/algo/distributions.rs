//! One-dimensional sampling laws addressed by family name
//!
//! Emission timing, launch position and launch speed are each governed by a
//! one-dimensional law chosen in the run configuration by family name plus a
//! flat parameter map, using the location/scale convention:
//!
//! ```text
//! X = loc + scale · Z        Z ~ standard member of the family
//! ```
//!
//! | family        | shape parameters | standard member            |
//! |---------------|------------------|----------------------------|
//! | `constant`    | `value`          | point mass (no loc/scale)  |
//! | `uniform`     |                  | U(0, 1)                    |
//! | `norm`        |                  | N(0, 1)                    |
//! | `expon`       |                  | Exp(1)                     |
//! | `truncnorm`   | `a`, `b`         | N(0, 1) restricted to [a, b] |
//! | `lognorm`     | `s`              | exp(N(0, s²))              |
//! | `gamma`       | `a`              | Gamma(a, 1)                |
//! | `weibull_min` | `c`              | Weibull(c, 1)              |
//!
//! `loc` defaults to 0 and `scale` to 1. All parameter problems are reported
//! when the sampler is built, never when it is drawn from.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rand::RngCore;
use rand_distr::Distribution;
use statrs::distribution::{ContinuousCDF, Exp, Gamma, LogNormal, Normal, Uniform, Weibull};

use crate::error::ConfigError;

/// Flat parameter map as found in configuration files.
pub type DistParams = BTreeMap<String, f64>;

/// Capability shared by every sampling law.
pub trait Sampler: fmt::Debug + Send + Sync {
    /// Draw one value.
    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    /// Cumulative distribution function at `x`.
    fn cdf(&self, x: f64) -> f64;

    /// Family name this sampler was built from.
    fn family(&self) -> &str;
}

/// Builds a sampler from its flat parameter map.
pub type SamplerConstructor = fn(&DistParams) -> Result<Box<dyn Sampler>, ConfigError>;

/// Degenerate law always returning the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub value: f64,
}

impl Sampler for Constant {
    fn sample(&self, _rng: &mut dyn RngCore) -> f64 {
        self.value
    }

    fn cdf(&self, x: f64) -> f64 {
        if x >= self.value {
            1.0
        } else {
            0.0
        }
    }

    fn family(&self) -> &str {
        "constant"
    }
}

/// Location/scale adapter around a standard `statrs` distribution.
#[derive(Debug, Clone)]
pub struct LocScale<D> {
    family: &'static str,
    base: D,
    loc: f64,
    scale: f64,
}

impl<D> LocScale<D> {
    pub fn new(family: &'static str, base: D, loc: f64, scale: f64) -> Result<Self, ConfigError> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(ConfigError::InvalidParameter {
                family: family.to_string(),
                reason: format!("scale must be positive and finite, got {scale}"),
            });
        }
        Ok(Self {
            family,
            base,
            loc,
            scale,
        })
    }
}

impl<D> Sampler for LocScale<D>
where
    D: Distribution<f64> + ContinuousCDF<f64, f64> + fmt::Debug + Send + Sync,
{
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.loc + self.scale * self.base.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        self.base.cdf((x - self.loc) / self.scale)
    }

    fn family(&self) -> &str {
        self.family
    }
}

/// Normal law restricted to `[lower, upper]`, sampled by CDF inversion.
#[derive(Debug, Clone)]
pub struct TruncatedNormal {
    standard: Normal,
    loc: f64,
    scale: f64,
    /// Bounds in standard units
    a: f64,
    b: f64,
    cdf_a: f64,
    mass: f64,
}

impl TruncatedNormal {
    /// Build from bounds expressed in standard units, `(bound - loc) / scale`.
    pub fn new(a: f64, b: f64, loc: f64, scale: f64) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidParameter {
            family: "truncnorm".to_string(),
            reason,
        };
        if !(scale > 0.0) || !scale.is_finite() || !loc.is_finite() {
            return Err(invalid(format!(
                "loc must be finite and scale positive, got loc={loc} scale={scale}"
            )));
        }
        if !(a < b) {
            return Err(invalid(format!("lower bound {a} must be below upper bound {b}")));
        }
        let standard = Normal::new(0.0, 1.0).map_err(|e| invalid(e.to_string()))?;
        let cdf_a = standard.cdf(a);
        let mass = standard.cdf(b) - cdf_a;
        if !(mass > 0.0) {
            return Err(invalid(format!("interval [{a}, {b}] carries no probability")));
        }
        Ok(Self {
            standard,
            loc,
            scale,
            a,
            b,
            cdf_a,
            mass,
        })
    }

    /// Build from bounds expressed in the same units as the samples.
    pub fn between(lower: f64, upper: f64, loc: f64, scale: f64) -> Result<Self, ConfigError> {
        Self::new((lower - loc) / scale, (upper - loc) / scale, loc, scale)
    }
}

impl Sampler for TruncatedNormal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        let u: f64 = rand_distr::Standard.sample(rng);
        let p = (self.cdf_a + u * self.mass).clamp(0.0, 1.0);
        let z = self.standard.inverse_cdf(p).clamp(self.a, self.b);
        self.loc + self.scale * z
    }

    fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        if z <= self.a {
            0.0
        } else if z >= self.b {
            1.0
        } else {
            (self.standard.cdf(z) - self.cdf_a) / self.mass
        }
    }

    fn family(&self) -> &str {
        "truncnorm"
    }
}

/// Reads parameters for one family, tracking which keys were used.
struct ParamReader<'a> {
    family: &'static str,
    params: &'a DistParams,
    consumed: Vec<&'static str>,
}

impl<'a> ParamReader<'a> {
    fn new(family: &'static str, params: &'a DistParams) -> Self {
        Self {
            family,
            params,
            consumed: Vec::new(),
        }
    }

    fn checked(&self, name: &'static str, value: f64) -> Result<f64, ConfigError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(format!("parameter '{name}' must be finite, got {value}")))
        }
    }

    fn required(&mut self, name: &'static str) -> Result<f64, ConfigError> {
        self.consumed.push(name);
        match self.params.get(name) {
            Some(&value) => self.checked(name, value),
            None => Err(ConfigError::MissingParameter {
                family: self.family.to_string(),
                parameter: name,
            }),
        }
    }

    fn optional(&mut self, name: &'static str, default: f64) -> Result<f64, ConfigError> {
        self.consumed.push(name);
        match self.params.get(name) {
            Some(&value) => self.checked(name, value),
            None => Ok(default),
        }
    }

    fn loc_scale(&mut self) -> Result<(f64, f64), ConfigError> {
        Ok((self.optional("loc", 0.0)?, self.optional("scale", 1.0)?))
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidParameter {
            family: self.family.to_string(),
            reason: reason.into(),
        }
    }

    /// Reject any key that no accessor asked for.
    fn finish(self) -> Result<(), ConfigError> {
        match self
            .params
            .keys()
            .find(|key| !self.consumed.iter().any(|used| *used == key.as_str()))
        {
            Some(key) => Err(ConfigError::UnknownParameter {
                family: self.family.to_string(),
                parameter: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn build_constant(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("constant", params);
    let value = p.required("value")?;
    p.finish()?;
    Ok(Box::new(Constant { value }))
}

fn build_uniform(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("uniform", params);
    let (loc, scale) = p.loc_scale()?;
    let base = Uniform::new(0.0, 1.0).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("uniform", base, loc, scale)?))
}

fn build_norm(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("norm", params);
    let (loc, scale) = p.loc_scale()?;
    let base = Normal::new(0.0, 1.0).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("norm", base, loc, scale)?))
}

fn build_expon(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("expon", params);
    let (loc, scale) = p.loc_scale()?;
    let base = Exp::new(1.0).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("expon", base, loc, scale)?))
}

fn build_truncnorm(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("truncnorm", params);
    let a = p.required("a")?;
    let b = p.required("b")?;
    let (loc, scale) = p.loc_scale()?;
    p.finish()?;
    Ok(Box::new(TruncatedNormal::new(a, b, loc, scale)?))
}

fn build_lognorm(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("lognorm", params);
    let s = p.required("s")?;
    let (loc, scale) = p.loc_scale()?;
    let base = LogNormal::new(0.0, s).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("lognorm", base, loc, scale)?))
}

fn build_gamma(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("gamma", params);
    let a = p.required("a")?;
    let (loc, scale) = p.loc_scale()?;
    let base = Gamma::new(a, 1.0).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("gamma", base, loc, scale)?))
}

fn build_weibull_min(params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
    let mut p = ParamReader::new("weibull_min", params);
    let c = p.required("c")?;
    let (loc, scale) = p.loc_scale()?;
    let base = Weibull::new(c, 1.0).map_err(|e| p.invalid(e.to_string()))?;
    p.finish()?;
    Ok(Box::new(LocScale::new("weibull_min", base, loc, scale)?))
}

/// Maps family names to sampler constructors.
#[derive(Clone)]
pub struct DistributionRegistry {
    constructors: HashMap<String, SamplerConstructor>,
}

impl fmt::Debug for DistributionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.families()).finish()
    }
}

impl Default for DistributionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DistributionRegistry {
    /// Registry without any family.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry holding every built-in family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("constant", build_constant);
        registry.register("uniform", build_uniform);
        registry.register("norm", build_norm);
        registry.register("expon", build_expon);
        registry.register("truncnorm", build_truncnorm);
        registry.register("lognorm", build_lognorm);
        registry.register("gamma", build_gamma);
        registry.register("weibull_min", build_weibull_min);
        registry
    }

    /// Add or replace a family.
    pub fn register(&mut self, family: impl Into<String>, constructor: SamplerConstructor) {
        self.constructors.insert(family.into(), constructor);
    }

    /// Build a sampler for `family` from `params`.
    ///
    /// # Returns
    /// * `Err(ConfigError::UnknownDistribution)` - If the family is not registered
    /// * `Err(ConfigError)` - If the constructor rejects `params`
    pub fn build(&self, family: &str, params: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
        let constructor = self
            .constructors
            .get(family)
            .ok_or_else(|| ConfigError::UnknownDistribution(family.to_string()))?;
        constructor(params)
    }

    /// Registered family names, sorted.
    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
