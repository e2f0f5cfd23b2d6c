use crate::error::{McnfError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub type VertexId = usize;

/// A directed arc carrying flow from `head` to `tail`.
///
/// `cost` is the per-unit linear coefficient; `cap` bounds the aggregate flow
/// over all commodities.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub head: VertexId,
    pub tail: VertexId,
    pub cost: f64,
    pub cap: f64,
}

impl Arc {
    pub fn new(head: VertexId, tail: VertexId, cost: f64, cap: f64) -> Self {
        Self {
            head,
            tail,
            cost,
            cap,
        }
    }
}

/// A demand to route `demand` units from `origin` to `destination`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Commodity {
    pub origin: VertexId,
    pub destination: VertexId,
    pub demand: f64,
}

impl Commodity {
    pub fn new(origin: VertexId, destination: VertexId, demand: f64) -> Self {
        Self {
            origin,
            destination,
            demand,
        }
    }
}

/// An immutable multi-commodity network: `vertices` vertices, arcs indexed
/// `0..A`, commodities indexed `0..K`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Network {
    vertices: usize,
    arcs: Vec<Arc>,
    commodities: Vec<Commodity>,
}

impl Network {
    pub fn new(vertices: usize, arcs: Vec<Arc>, commodities: Vec<Commodity>) -> Result<Self> {
        for (i, arc) in arcs.iter().enumerate() {
            if arc.head >= vertices || arc.tail >= vertices {
                return Err(McnfError::InvalidNetwork(format!(
                    "arc {i} endpoints ({}, {}) exceed vertex count {vertices}",
                    arc.head, arc.tail
                )));
            }
            if !(arc.cost >= 0.0) {
                return Err(McnfError::InvalidNetwork(format!(
                    "arc {i} has negative cost {}",
                    arc.cost
                )));
            }
            if !(arc.cap > 0.0) {
                return Err(McnfError::InvalidNetwork(format!(
                    "arc {i} has non-positive capacity {}",
                    arc.cap
                )));
            }
        }
        for (k, commodity) in commodities.iter().enumerate() {
            if commodity.origin >= vertices || commodity.destination >= vertices {
                return Err(McnfError::InvalidNetwork(format!(
                    "commodity {k} endpoints ({}, {}) exceed vertex count {vertices}",
                    commodity.origin, commodity.destination
                )));
            }
            if !(commodity.demand >= 0.0) {
                return Err(McnfError::InvalidNetwork(format!(
                    "commodity {k} has negative demand {}",
                    commodity.demand
                )));
            }
        }
        Ok(Self {
            vertices,
            arcs,
            commodities,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn num_commodities(&self) -> usize {
        self.commodities.len()
    }

    /// Length of the flattened flow vector, `|A| * |K|`.
    pub fn flow_len(&self) -> usize {
        self.arcs.len() * self.commodities.len()
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn commodities(&self) -> &[Commodity] {
        &self.commodities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_network() {
        let net = Network::new(
            3,
            vec![Arc::new(0, 1, 1.0, 10.0), Arc::new(1, 2, 1.0, 10.0)],
            vec![Commodity::new(0, 2, 4.0)],
        )
        .unwrap();
        assert_eq!(net.num_vertices(), 3);
        assert_eq!(net.num_arcs(), 2);
        assert_eq!(net.num_commodities(), 1);
        assert_eq!(net.flow_len(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_endpoint() {
        let err = Network::new(2, vec![Arc::new(0, 5, 1.0, 1.0)], vec![]).unwrap_err();
        assert!(matches!(err, McnfError::InvalidNetwork(_)));
    }

    #[test]
    fn test_rejects_negative_demand() {
        let err = Network::new(
            2,
            vec![Arc::new(0, 1, 1.0, 1.0)],
            vec![Commodity::new(0, 1, -1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, McnfError::InvalidNetwork(_)));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = Network::new(2, vec![Arc::new(0, 1, 1.0, 0.0)], vec![]).unwrap_err();
        assert!(matches!(err, McnfError::InvalidNetwork(_)));
    }
}
