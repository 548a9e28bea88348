use crate::config::{SignalConfig, SignalSelection};
use crate::{Error, NodeId, Result, RoadNetwork};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use std::collections::BTreeMap;

/// The signals at every signalised intersection, each on its own timer.
#[derive(Clone, Debug)]
pub struct SignalController {
    /// The signals, keyed by the node they control.
    signals: BTreeMap<NodeId, Signal>,
    /// The distribution phase durations are drawn from.
    durations: Uniform<f64>,
    rng: StdRng,
}

/// A two-phase traffic signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Signal {
    /// The current phase.
    phase: Phase,
    /// The duration of the current phase in s.
    duration: f64,
    /// The time the current phase was entered, in s.
    since: f64,
}

/// The phase of a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    Green,
    Red,
}

impl Phase {
    /// The phase which follows this one.
    pub fn next(self) -> Self {
        match self {
            Phase::Green => Phase::Red,
            Phase::Red => Phase::Green,
        }
    }
}

impl Signal {
    /// Gets the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Gets the duration of the current phase in s.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Gets the time the current phase was entered, in s.
    pub fn since(&self) -> f64 {
        self.since
    }

    /// The time in s until the current phase is due to end.
    pub fn remaining(&self, now: f64) -> f64 {
        f64::max(self.duration - (now - self.since), 0.0)
    }
}

impl SignalController {
    /// Creates signals at the nodes selected by `config`. Each signal starts green,
    /// with a phase duration drawn from the configured range.
    pub fn new(network: &RoadNetwork, config: &SignalConfig, now: f64) -> Result<Self> {
        config.validate()?;
        let range = config.phase_duration;

        let nodes: Vec<NodeId> = match &config.selection {
            SignalSelection::AllIntersections => network
                .nodes()
                .filter(|node| node.is_intersection())
                .map(|node| node.id())
                .collect(),
            SignalSelection::Nodes(ids) => {
                for id in ids {
                    if !network.node(*id)?.is_intersection() {
                        return Err(Error::InvalidConfiguration(format!(
                            "node {} is not an intersection and cannot carry a signal",
                            id
                        )));
                    }
                }
                ids.clone()
            }
            SignalSelection::None => vec![],
        };

        let mut controller = Self {
            signals: BTreeMap::new(),
            durations: Uniform::new_inclusive(range.min, range.max),
            rng: StdRng::seed_from_u64(config.seed),
        };
        for node in nodes {
            let duration = controller.draw_duration();
            controller.signals.insert(
                node,
                Signal {
                    phase: Phase::Green,
                    duration,
                    since: now,
                },
            );
        }
        Ok(controller)
    }

    /// Advances every signal to time `now`, returning those which changed phase.
    pub fn step(&mut self, now: f64) -> Vec<(NodeId, Phase)> {
        let mut changed = vec![];
        for (node, signal) in self.signals.iter_mut() {
            if now - signal.since >= signal.duration {
                signal.phase = signal.phase.next();
                signal.duration = self.durations.sample(&mut self.rng);
                signal.since = now;
                debug!(
                    "Signal at node {} turned {:?} for {:.1} s",
                    node, signal.phase, signal.duration
                );
                changed.push((*node, signal.phase));
            }
        }
        changed
    }

    /// Gets the signal at the given node, if it has one.
    pub fn signal(&self, node: NodeId) -> Option<&Signal> {
        self.signals.get(&node)
    }

    /// Gets the phase of the signal at the given node, if it has one.
    pub fn phase(&self, node: NodeId) -> Option<Phase> {
        self.signal(node).map(Signal::phase)
    }

    /// The time in s a vehicle arriving at `node` at time `now` must wait for green.
    /// Zero if the node is unsignalised or green.
    pub fn remaining_red(&self, node: NodeId, now: f64) -> f64 {
        match self.signal(node) {
            Some(signal) if signal.phase == Phase::Red => signal.remaining(now),
            _ => 0.0,
        }
    }

    /// Returns an iterator over all the signals, in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Signal)> {
        self.signals.iter().map(|(node, signal)| (*node, signal))
    }

    fn draw_duration(&mut self) -> f64 {
        self.durations.sample(&mut self.rng)
    }
}
