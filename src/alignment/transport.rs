// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transportation solvers used by the mover's-distance aligners.
//!
//! `exact` solves the (possibly unbalanced) transportation problem with
//! successive shortest paths; `assignment` is the Hungarian method.

const EPS: f64 = 1e-12;

/// Optimal flow between `rows` sources and `cols` sinks
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub cost: f64,
    pub moved: f64,
    /// Row-major `rows x cols`
    pub flow: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Edge {
    to: usize,
    rev: usize,
    cap: f64,
    cost: f64,
}

struct Graph {
    adj: Vec<Vec<Edge>>,
}

impl Graph {
    fn new(nodes: usize) -> Self {
        Self {
            adj: vec![Vec::new(); nodes],
        }
    }

    /// Returns the index of the forward edge in `adj[from]`
    fn add_edge(&mut self, from: usize, to: usize, cap: f64, cost: f64) -> usize {
        let forward = self.adj[from].len();
        let backward = self.adj[to].len();
        self.adj[from].push(Edge {
            to,
            rev: backward,
            cap,
            cost,
        });
        self.adj[to].push(Edge {
            to: from,
            rev: forward,
            cap: 0.0,
            cost: -cost,
        });
        forward
    }

    /// Bellman-Ford over residual edges; returns predecessor (node, edge) per node
    fn shortest_path(&self, source: usize, sink: usize) -> Option<Vec<Option<(usize, usize)>>> {
        let n = self.adj.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev = vec![None; n];
        dist[source] = 0.0;
        for _ in 0..n {
            let mut changed = false;
            for u in 0..n {
                if !dist[u].is_finite() {
                    continue;
                }
                for (e, edge) in self.adj[u].iter().enumerate() {
                    if edge.cap > EPS && dist[u] + edge.cost < dist[edge.to] - EPS {
                        dist[edge.to] = dist[u] + edge.cost;
                        prev[edge.to] = Some((u, e));
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        dist[sink].is_finite().then_some(prev)
    }
}

/// Minimum-cost plan moving `min(sum supply, sum demand)` units.
///
/// `cost` is row-major `supply.len() x demand.len()`.
pub(crate) fn exact(supply: &[f64], demand: &[f64], cost: &[f64]) -> Plan {
    let (rows, cols) = (supply.len(), demand.len());
    let source = rows + cols;
    let sink = source + 1;
    let mut graph = Graph::new(rows + cols + 2);

    for (i, &s) in supply.iter().enumerate() {
        graph.add_edge(source, i, s.max(0.0), 0.0);
    }
    for (j, &d) in demand.iter().enumerate() {
        graph.add_edge(rows + j, sink, d.max(0.0), 0.0);
    }
    let mut handles = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            let cap = supply[i].max(0.0);
            handles.push(graph.add_edge(i, rows + j, cap, cost[i * cols + j]));
        }
    }

    let target = supply.iter().sum::<f64>().min(demand.iter().sum::<f64>());
    let mut moved = 0.0;
    let max_rounds = 4 * (rows + cols + 2) * (rows * cols + 1);

    for _ in 0..max_rounds {
        if moved >= target - EPS {
            break;
        }
        let Some(prev) = graph.shortest_path(source, sink) else {
            break;
        };

        let mut bottleneck = target - moved;
        let mut node = sink;
        while let Some((u, e)) = prev[node] {
            bottleneck = bottleneck.min(graph.adj[u][e].cap);
            node = u;
        }
        if bottleneck <= EPS {
            break;
        }

        let mut node = sink;
        while let Some((u, e)) = prev[node] {
            let rev = graph.adj[u][e].rev;
            graph.adj[u][e].cap -= bottleneck;
            graph.adj[node][rev].cap += bottleneck;
            node = u;
        }
        moved += bottleneck;
    }

    let mut flow = vec![0.0; rows * cols];
    let mut total_cost = 0.0;
    for i in 0..rows {
        for j in 0..cols {
            let edge = &graph.adj[i][handles[i * cols + j]];
            let sent = graph.adj[edge.to][edge.rev].cap;
            flow[i * cols + j] = sent;
            total_cost += sent * cost[i * cols + j];
        }
    }

    Plan {
        cost: total_cost,
        moved,
        flow,
    }
}

/// Minimum-cost one-to-one assignment of rows to columns.
///
/// Every row gets a column when `rows <= cols`; otherwise every column gets
/// a row and the surplus rows map to `None`.
pub(crate) fn assignment(cost: &[f64], rows: usize, cols: usize) -> Vec<Option<usize>> {
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }
    if rows > cols {
        let transposed: Vec<f64> = (0..cols)
            .flat_map(|j| (0..rows).map(move |i| (i, j)))
            .map(|(i, j)| cost[i * cols + j])
            .collect();
        let mut result = vec![None; rows];
        for (j, row) in assignment(&transposed, cols, rows).into_iter().enumerate() {
            if let Some(i) = row {
                result[i] = Some(j);
            }
        }
        return result;
    }

    let (n, m) = (rows, cols);
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost[(i0 - 1) * m + j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![None; n];
    for j in 1..=m {
        if p[j] != 0 {
            result[p[j] - 1] = Some(j - 1);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prefers_cheap_routes() {
        let supply = [0.5, 0.5];
        let demand = [0.5, 0.5];
        let cost = [0.0, 1.0, 1.0, 0.0];
        let plan = exact(&supply, &demand, &cost);
        assert!(plan.cost.abs() < 1e-9);
        assert!((plan.moved - 1.0).abs() < 1e-9);
        assert!((plan.flow[0] - 0.5).abs() < 1e-9);
        assert!(plan.flow[1].abs() < 1e-9);
    }

    #[test]
    fn exact_splits_mass_when_needed() {
        let supply = [1.0];
        let demand = [0.25, 0.75];
        let cost = [0.2, 0.4];
        let plan = exact(&supply, &demand, &cost);
        assert!((plan.cost - (0.25 * 0.2 + 0.75 * 0.4)).abs() < 1e-9);
    }

    #[test]
    fn exact_rebalances_greedy_choice() {
        // greedy row-by-row would send row 0 to col 0 and force row 1 onto col 1
        let supply = [0.5, 0.5];
        let demand = [0.5, 0.5];
        let cost = [0.1, 0.2, 0.1, 0.9];
        let plan = exact(&supply, &demand, &cost);
        assert!((plan.cost - (0.5 * 0.2 + 0.5 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn unbalanced_moves_smaller_total() {
        let plan = exact(&[1.0], &[0.4], &[0.5]);
        assert!((plan.moved - 0.4).abs() < 1e-9);
        assert!((plan.cost - 0.2).abs() < 1e-9);
    }

    #[test]
    fn hungarian_finds_optimum() {
        let cost = [4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0];
        let result = assignment(&cost, 3, 3);
        assert_eq!(result, vec![Some(1), Some(0), Some(2)]);
    }

    #[test]
    fn hungarian_handles_rectangles() {
        let wide = assignment(&[0.9, 0.1, 0.5], 1, 3);
        assert_eq!(wide, vec![Some(1)]);
        let tall = assignment(&[0.9, 0.1, 0.5], 3, 1);
        assert_eq!(tall, vec![None, Some(0), None]);
        assert_eq!(assignment(&[], 2, 0), vec![None, None]);
    }
}
