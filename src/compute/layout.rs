//! Force-directed graph layout behind the `ComputeLayout` action.
//!
//! Fruchterman-Reingold over neighbour lists: every pair of nodes repels
//! with `k² / d`, every linked pair attracts with `d² / k`, and the
//! step size cools linearly from a tenth of the initial extent. The final
//! positions are centred on the origin and scaled so the largest absolute
//! coordinate is 1.
//!
//! Initial positions are random, so two runs over the same graph give
//! different coordinates unless a seed is set.

use std::collections::HashMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ActionHandler;
use crate::error::HandlerError;

/// Smallest pairwise distance used in force computations.
const MIN_DISTANCE: f64 = 0.01;

/// A 2D coordinate.
pub type Point = [f64; 2];

/// Node identifier as sent by clients: an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    /// Numeric id.
    Int(i64),
    /// String id.
    Text(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => write!(f, "{id:?}"),
        }
    }
}

/// Request content for `ComputeLayout`.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRequest {
    /// Declared nodes. Duplicates collapse to the first occurrence.
    pub nodes: Vec<NodeId>,
    /// Undirected edges between declared nodes.
    #[serde(default)]
    pub links: Vec<(NodeId, NodeId)>,
}

/// Spring layout parameters.
#[derive(Debug, Clone)]
pub struct SpringLayout {
    iterations: usize,
    threshold: f64,
    seed: Option<u64>,
}

impl Default for SpringLayout {
    fn default() -> Self {
        Self {
            iterations: 50,
            threshold: 1e-4,
            seed: None,
        }
    }
}

impl SpringLayout {
    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Pins the random initial positions to `seed`.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Computes positions for `request`, one per distinct node in
    /// first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidGraph`] if a link references a node
    /// that is not in `nodes`.
    pub fn compute(&self, request: &LayoutRequest) -> Result<Vec<Point>, HandlerError> {
        let graph = Graph::build(request)?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let positions = match graph.len() {
            0 => Vec::new(),
            1 => vec![[0.0, 0.0]],
            _ => {
                let initial = (0..graph.len())
                    .map(|_| [rng.random::<f64>(), rng.random::<f64>()])
                    .collect();
                rescale(self.relax(&graph, initial))
            }
        };
        Ok(positions)
    }

    fn relax(&self, graph: &Graph, mut positions: Vec<Point>) -> Vec<Point> {
        let n = graph.len() as f64;
        let k = (1.0 / n).sqrt();
        let mut temperature = 0.1 * extent(&positions);
        let cooling = temperature / (self.iterations as f64 + 1.0);

        for _ in 0..self.iterations {
            let displacement: Vec<Point> = positions
                .iter()
                .zip(&graph.neighbours)
                .map(|(&[xi, yi], linked)| {
                    let repulsion =
                        positions.iter().fold([0.0, 0.0], |[dx_sum, dy_sum], &[xj, yj]| {
                            let (dx, dy) = (xi - xj, yi - yj);
                            let distance = dx.hypot(dy).max(MIN_DISTANCE);
                            let force = k * k / (distance * distance);
                            [dx_sum + dx * force, dy_sum + dy * force]
                        });
                    linked
                        .iter()
                        .filter_map(|&j| positions.get(j))
                        .fold(repulsion, |[dx_sum, dy_sum], &[xj, yj]| {
                            let (dx, dy) = (xi - xj, yi - yj);
                            let force = dx.hypot(dy).max(MIN_DISTANCE) / k;
                            [dx_sum - dx * force, dy_sum - dy * force]
                        })
                })
                .collect();

            let mut moved = 0.0;
            for (position, [dx, dy]) in positions.iter_mut().zip(displacement) {
                let length = dx.hypot(dy);
                let length = if length < MIN_DISTANCE { 0.1 } else { length };
                let step = [dx * temperature / length, dy * temperature / length];
                position[0] += step[0];
                position[1] += step[1];
                moved += step[0] * step[0] + step[1] * step[1];
            }

            temperature -= cooling;
            if moved.sqrt() / n < self.threshold {
                break;
            }
        }
        positions
    }
}

impl ActionHandler for SpringLayout {
    fn handle(&self, content: Value) -> Result<Value, HandlerError> {
        let request: LayoutRequest = serde_json::from_value(content)
            .map_err(|err| HandlerError::InvalidPayload(err.to_string()))?;
        let positions = self.compute(&request)?;
        tracing::debug!(
            nodes = positions.len(),
            links = request.links.len(),
            "computed spring layout"
        );
        serde_json::to_value(positions).map_err(|err| HandlerError::Format(err.to_string()))
    }
}

/// Undirected graph over node indices, stored as sorted neighbour lists.
#[derive(Debug)]
struct Graph {
    neighbours: Vec<Vec<usize>>,
}

impl Graph {
    fn build(request: &LayoutRequest) -> Result<Self, HandlerError> {
        let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(request.nodes.len());
        for node in &request.nodes {
            let next = index.len();
            index.entry(node).or_insert(next);
        }

        let lookup = |node: &NodeId| {
            index.get(node).copied().ok_or_else(|| {
                HandlerError::InvalidGraph(format!("link references undeclared node {node}"))
            })
        };

        let mut neighbours = vec![Vec::new(); index.len()];
        for (source, target) in &request.links {
            let (a, b) = (lookup(source)?, lookup(target)?);
            if a == b {
                continue;
            }
            add_neighbour(&mut neighbours, a, b);
            add_neighbour(&mut neighbours, b, a);
        }
        for list in &mut neighbours {
            list.sort_unstable();
            list.dedup();
        }
        Ok(Self { neighbours })
    }

    fn len(&self) -> usize {
        self.neighbours.len()
    }
}

fn add_neighbour(neighbours: &mut [Vec<usize>], from: usize, to: usize) {
    if let Some(list) = neighbours.get_mut(from) {
        list.push(to);
    }
}

/// Largest side of the bounding box.
fn extent(positions: &[Point]) -> f64 {
    let span = |axis: usize| {
        let values = positions.iter().filter_map(|p| p.get(axis).copied());
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if max >= min { max - min } else { 0.0 }
    };
    span(0).max(span(1))
}

/// Centres positions on the origin and scales the largest absolute
/// coordinate to 1.
fn rescale(mut positions: Vec<Point>) -> Vec<Point> {
    let n = positions.len() as f64;
    let [sum_x, sum_y] = positions
        .iter()
        .fold([0.0, 0.0], |[sx, sy], &[x, y]| [sx + x, sy + y]);
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let mut limit: f64 = 0.0;
    for position in &mut positions {
        position[0] -= mean_x;
        position[1] -= mean_y;
        limit = limit.max(position[0].abs()).max(position[1].abs());
    }
    if limit > 0.0 {
        for position in &mut positions {
            position[0] /= limit;
            position[1] /= limit;
        }
    }
    positions
}
