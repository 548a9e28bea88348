use crate::util::Interval;
use crate::{Error, NodeId, Result};

/// The tunable parameters of a simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// The length of one clock tick in s.
    pub tick: f64,
    /// The speed limit given to segments that lack one, in km/h.
    pub default_speed_limit: f64,
    /// The fraction of extra travel time added per occupying vehicle.
    pub congestion_coefficient: f64,
    /// Segments with a density above this are considered congested.
    pub congestion_threshold: usize,
    /// The speed multiplier applied to a vehicle which must yield on a shared segment.
    pub yield_factor: f64,
    /// Traffic signal parameters.
    pub signals: SignalConfig,
}

/// The parameters of the intersection signal controller.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SignalConfig {
    /// The range phase durations are drawn from, in s.
    pub phase_duration: Interval<f64>,
    /// The seed of the random number generator used to draw phase durations.
    pub seed: u64,
    /// Which nodes receive a signal.
    pub selection: SignalSelection,
}

/// Selects the nodes which are controlled by a signal.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SignalSelection {
    /// Every intersection node is signalised.
    AllIntersections,
    /// Only the listed nodes are signalised; each must be an intersection.
    Nodes(Vec<NodeId>),
    /// No signals at all.
    None,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick: 1.0,
            default_speed_limit: 50.0,
            congestion_coefficient: 0.01,
            congestion_threshold: 5,
            yield_factor: 0.8,
            signals: SignalConfig::default(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            phase_duration: Interval::new(35.0, 60.0),
            seed: 0,
            selection: SignalSelection::AllIntersections,
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from JSON. Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every parameter is within its permitted range.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));

        if !(self.tick.is_finite() && self.tick > 0.0) {
            return invalid(format!("tick must be positive, got {}", self.tick));
        }
        if !(self.default_speed_limit.is_finite() && self.default_speed_limit > 0.0) {
            return invalid(format!(
                "default speed limit must be positive, got {}",
                self.default_speed_limit
            ));
        }
        if !(self.congestion_coefficient.is_finite() && self.congestion_coefficient >= 0.0) {
            return invalid(format!(
                "congestion coefficient must be non-negative, got {}",
                self.congestion_coefficient
            ));
        }
        if !(self.yield_factor > 0.0 && self.yield_factor <= 1.0) {
            return invalid(format!(
                "yield factor must be in (0, 1], got {}",
                self.yield_factor
            ));
        }
        self.signals.validate()
    }
}

impl SignalConfig {
    /// Checks that the phase duration range can be sampled.
    pub(crate) fn validate(&self) -> Result<()> {
        let range = self.phase_duration;
        if !(range.min.is_finite() && range.max.is_finite() && range.min > 0.0 && range.is_ordered())
        {
            return Err(Error::InvalidConfiguration(format!(
                "phase duration range must be positive and ordered, got {:?}",
                range
            )));
        }
        Ok(())
    }
}
