//! hMetis / Metis file readers and the partition writer.
//!
//! The hMetis format has a `m n [fmt]` header (fmt 1 = edge weights,
//! 10 = node weights, 11 = both), one line of 1-indexed pins per
//! hyperedge, then optionally one node weight per line. A Metis graph
//! file is read as adjacency lists and converted to 2-pin hyperedges.
//! `%`-lines are comments.

use std::io::Write;
use std::path::{Path, PathBuf};

use super::{EdgeWeight, NodeId, NodeWeight, StaticHypergraph};
use crate::error::HypercutError;
use crate::hypergraph::factory::{HypergraphFactory, RemovedNets};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Hmetis,
    Metis,
}

/// The raw CSR buffers of a parsed file, before single-pin removal and
/// parallel-net merging.
#[derive(Debug, Clone)]
pub struct RawHypergraph {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub edge_offsets: Vec<usize>,
    pub edge_pins: Vec<NodeId>,
    pub edge_weights: Vec<EdgeWeight>,
    pub node_weights: Vec<NodeWeight>,
}

impl RawHypergraph {
    pub fn into_hypergraph(self) -> Result<(StaticHypergraph, RemovedNets), HypercutError> {
        HypergraphFactory::construct_from_arrays(
            self.num_nodes,
            self.num_edges,
            &self.edge_offsets,
            &self.edge_pins,
            &self.edge_weights,
            &self.node_weights,
        )
    }
}

pub fn read_hypergraph_from_file(
    path: &Path,
    format: FileFormat,
) -> Result<RawHypergraph, HypercutError> {
    let text = std::fs::read_to_string(path).map_err(|e| HypercutError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    match format {
        FileFormat::Hmetis => parse_hmetis(path, &text),
        FileFormat::Metis => parse_metis(path, &text),
    }
}

fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> HypercutError {
    HypercutError::MalformedInput {
        path: path.display().to_string(),
        line,
        reason: reason.into(),
    }
}

/// Content lines with their 1-based line numbers, comments stripped.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('%'))
}

fn parse_numbers(
    path: &Path,
    line_no: usize,
    line: &str,
) -> Result<Vec<i64>, HypercutError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<i64>()
                .map_err(|_| malformed(path, line_no, format!("not a number: `{tok}`")))
        })
        .collect()
}

fn parse_hmetis(path: &Path, text: &str) -> Result<RawHypergraph, HypercutError> {
    let mut lines = content_lines(text);
    let (header_no, header) = lines
        .next()
        .ok_or_else(|| malformed(path, 1, "empty file"))?;
    let header = parse_numbers(path, header_no, header)?;
    if header.len() < 2 || header.len() > 3 {
        return Err(malformed(path, header_no, "header must be `m n [fmt]`"));
    }
    let num_edges = header[0] as usize;
    let num_nodes = header[1] as usize;
    let fmt = if header.len() == 3 { header[2] } else { 0 };
    let has_edge_weights = fmt == 1 || fmt == 11;
    let has_node_weights = fmt == 10 || fmt == 11;
    if !matches!(fmt, 0 | 1 | 10 | 11) {
        return Err(malformed(path, header_no, format!("unknown format flag {fmt}")));
    }

    let mut edge_offsets = vec![0usize];
    let mut edge_pins: Vec<NodeId> = Vec::new();
    let mut edge_weights: Vec<EdgeWeight> = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        let (line_no, line) = lines
            .next()
            .ok_or_else(|| malformed(path, header_no, "fewer hyperedge lines than announced"))?;
        let mut numbers = parse_numbers(path, line_no, line)?.into_iter();
        let weight = if has_edge_weights {
            numbers
                .next()
                .ok_or_else(|| malformed(path, line_no, "missing hyperedge weight"))?
        } else {
            1
        };
        edge_weights.push(weight);
        let mut pins = 0usize;
        for pin in numbers {
            if pin < 1 || pin as usize > num_nodes {
                return Err(malformed(path, line_no, format!("pin {pin} out of range")));
            }
            edge_pins.push((pin - 1) as NodeId);
            pins += 1;
        }
        if pins == 0 {
            return Err(malformed(path, line_no, "hyperedge without pins"));
        }
        edge_offsets.push(edge_pins.len());
    }

    let node_weights = if has_node_weights {
        let mut weights = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            let (line_no, line) = lines
                .next()
                .ok_or_else(|| malformed(path, header_no, "fewer node weight lines than nodes"))?;
            let numbers = parse_numbers(path, line_no, line)?;
            if numbers.len() != 1 {
                return Err(malformed(path, line_no, "expected exactly one node weight"));
            }
            weights.push(numbers[0]);
        }
        weights
    } else {
        vec![1; num_nodes]
    };

    Ok(RawHypergraph {
        num_nodes,
        num_edges,
        edge_offsets,
        edge_pins,
        edge_weights,
        node_weights,
    })
}

fn parse_metis(path: &Path, text: &str) -> Result<RawHypergraph, HypercutError> {
    let mut lines = content_lines(text);
    let (header_no, header) = lines
        .next()
        .ok_or_else(|| malformed(path, 1, "empty file"))?;
    let header = parse_numbers(path, header_no, header)?;
    if header.len() < 2 {
        return Err(malformed(path, header_no, "header must be `n m [fmt]`"));
    }
    let num_nodes = header[0] as usize;
    let fmt = if header.len() >= 3 { header[2] } else { 0 };
    let has_edge_weights = fmt % 10 == 1;
    let has_node_weights = fmt / 10 == 1;

    let mut node_weights = vec![1 as NodeWeight; num_nodes];
    let mut edge_offsets = vec![0usize];
    let mut edge_pins: Vec<NodeId> = Vec::new();
    let mut edge_weights: Vec<EdgeWeight> = Vec::new();

    for u in 0..num_nodes {
        let (line_no, line) = lines
            .next()
            .ok_or_else(|| malformed(path, header_no, "fewer adjacency lines than nodes"))?;
        let numbers = parse_numbers(path, line_no, line)?;
        let mut iter = numbers.into_iter();
        if has_node_weights {
            node_weights[u] = iter
                .next()
                .ok_or_else(|| malformed(path, line_no, "missing node weight"))?;
        }
        loop {
            let Some(v) = iter.next() else { break };
            if v < 1 || v as usize > num_nodes {
                return Err(malformed(path, line_no, format!("neighbor {v} out of range")));
            }
            let weight = if has_edge_weights {
                iter.next()
                    .ok_or_else(|| malformed(path, line_no, "missing edge weight"))?
            } else {
                1
            };
            let v = (v - 1) as usize;
            // Each undirected edge appears twice; keep the u < v copy.
            if u < v {
                edge_pins.push(u as NodeId);
                edge_pins.push(v as NodeId);
                edge_offsets.push(edge_pins.len());
                edge_weights.push(weight);
            }
        }
    }

    Ok(RawHypergraph {
        num_nodes,
        num_edges: edge_weights.len(),
        edge_offsets,
        edge_pins,
        edge_weights,
        node_weights,
    })
}

/// Write one block id per line in vertex order to
/// `<input>.part<k>.epsilon<ε>`, returning the written path.
pub fn write_partition_file(
    input_path: &Path,
    partition: &[crate::hypergraph::BlockId],
    k: u32,
    epsilon: f64,
) -> Result<PathBuf, HypercutError> {
    let out = PathBuf::from(format!(
        "{}.part{}.epsilon{}",
        input_path.display(),
        k,
        epsilon
    ));
    let mut file = std::fs::File::create(&out).map_err(|e| HypercutError::FileWrite {
        path: out.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut buffer = String::with_capacity(partition.len() * 2);
    for &p in partition {
        buffer.push_str(&p.to_string());
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())
        .map_err(|e| HypercutError::FileWrite {
            path: out.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hypercut-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_unweighted_hmetis() {
        let path = write_temp(
            "plain.hgr",
            "% seven-node fixture\n4 7\n1 3\n1 2 4 5\n4 5 7\n3 6 7\n",
        );
        let raw = read_hypergraph_from_file(&path, FileFormat::Hmetis).unwrap();
        assert_eq!(raw.num_nodes, 7);
        assert_eq!(raw.num_edges, 4);
        assert_eq!(raw.edge_offsets, vec![0, 2, 6, 9, 12]);
        assert_eq!(&raw.edge_pins[2..6], &[0, 1, 3, 4]);
        assert_eq!(raw.edge_weights, vec![1; 4]);
        assert_eq!(raw.node_weights, vec![1; 7]);
        let (hg, removed) = raw.into_hypergraph().unwrap();
        assert_eq!(hg.num_pins(), 12);
        assert_eq!(removed, RemovedNets::default());
    }

    #[test]
    fn reads_fully_weighted_hmetis() {
        let path = write_temp(
            "weighted.hgr",
            "3 4 11\n5 1 2\n2 2 3\n9 3 4\n10\n20\n30\n40\n",
        );
        let raw = read_hypergraph_from_file(&path, FileFormat::Hmetis).unwrap();
        assert_eq!(raw.edge_weights, vec![5, 2, 9]);
        assert_eq!(raw.node_weights, vec![10, 20, 30, 40]);
    }

    #[test]
    fn reads_metis_graph_as_two_pin_edges() {
        // Triangle 1-2-3 plus pendant 4.
        let path = write_temp("graph.metis", "4 4 1\n2 7 3 2\n1 7 3 3\n1 2 2 3 4 9\n3 9\n");
        let raw = read_hypergraph_from_file(&path, FileFormat::Metis).unwrap();
        assert_eq!(raw.num_nodes, 4);
        assert_eq!(raw.num_edges, 4);
        // Edge (1,2) weight 7, (1,3) weight 2, (2,3) weight 3, (3,4) weight 9.
        assert_eq!(raw.edge_weights, vec![7, 2, 3, 9]);
        for e in 0..raw.num_edges {
            assert_eq!(raw.edge_offsets[e + 1] - raw.edge_offsets[e], 2);
        }
    }

    #[test]
    fn rejects_out_of_range_pins() {
        let path = write_temp("bad.hgr", "1 3\n1 9\n");
        let err = read_hypergraph_from_file(&path, FileFormat::Hmetis).unwrap_err();
        assert!(matches!(err, HypercutError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn rejects_truncated_files() {
        let path = write_temp("short.hgr", "3 4\n1 2\n");
        let err = read_hypergraph_from_file(&path, FileFormat::Hmetis).unwrap_err();
        assert!(matches!(err, HypercutError::MalformedInput { .. }));
    }

    #[test]
    fn partition_file_round_trip() {
        let input = write_temp("out.hgr", "1 2\n1 2\n");
        let written = write_partition_file(&input, &[0, 1, 1, 0], 2, 0.03).unwrap();
        assert!(written.to_string_lossy().ends_with(".part2.epsilon0.03"));
        let content = std::fs::read_to_string(&written).unwrap();
        assert_eq!(content, "0\n1\n1\n0\n");
    }
}
