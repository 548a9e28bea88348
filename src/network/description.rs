use crate::NodeId;
#[cfg(feature = "serde")]
use crate::{Error, Result};

/// A road network as supplied by the network loading collaborator.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkDescription {
    pub nodes: Vec<NodeDescription>,
    pub segments: Vec<SegmentDescription>,
}

/// The kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum NodeKind {
    Intersection,
    NonIntersection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeDescription {
    pub id: NodeId,
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentDescription {
    pub from: NodeId,
    pub to: NodeId,
    /// The index among segments sharing the same end nodes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub key: u32,
    /// The length in m.
    pub length: f64,
    /// The speed limit in km/h, if known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub speed_limit: Option<f64>,
}

impl NetworkDescription {
    /// Adds a node.
    pub fn node(mut self, id: u64, kind: NodeKind, x: f64, y: f64) -> Self {
        self.nodes.push(NodeDescription {
            id: NodeId(id),
            kind,
            x,
            y,
        });
        self
    }

    /// Adds a segment with parallel index 0.
    pub fn segment(mut self, from: u64, to: u64, length: f64, speed_limit: Option<f64>) -> Self {
        self.segments.push(SegmentDescription {
            from: NodeId(from),
            to: NodeId(to),
            key: 0,
            length,
            speed_limit,
        });
        self
    }

    /// Parses a network description from JSON.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }
}
