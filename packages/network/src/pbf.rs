//! OpenStreetMap PBF road network reader.
//!
//! Two passes over the payload with `osmpbf`'s parallel reader: the first
//! collects ways carrying a `highway` tag, the second resolves the
//! coordinates of the nodes those ways reference. Ways that leave the
//! extract are split at the missing nodes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;

use osmpbf::{Element, ElementReader};
use saferoute_network_models::RawWay;

use crate::NetworkError;

struct PbfWay {
    id: i64,
    refs: Vec<i64>,
    tags: BTreeMap<String, String>,
}

/// Parses an OSM PBF payload into raw ways.
///
/// # Errors
///
/// Returns [`NetworkError::Pbf`] if the payload cannot be decoded.
pub fn parse_pbf(bytes: &[u8]) -> Result<Vec<RawWay>, NetworkError> {
    let ways = ElementReader::new(Cursor::new(bytes))
        .par_map_reduce(
            |element| match element {
                Element::Way(way) if way.tags().any(|(k, _)| k == "highway") => vec![PbfWay {
                    id: way.id(),
                    refs: way.refs().collect(),
                    tags: way
                        .tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }],
                _ => Vec::new(),
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(pbf_error)?;

    let wanted: HashSet<i64> = ways.iter().flat_map(|w| w.refs.iter().copied()).collect();
    log::info!(
        "PBF: {} highway way(s) referencing {} node(s)",
        ways.len(),
        wanted.len()
    );

    let coords: HashMap<i64, (f64, f64)> = ElementReader::new(Cursor::new(bytes))
        .par_map_reduce(
            |element| match element {
                Element::Node(node) if wanted.contains(&node.id()) => {
                    vec![(node.id(), (node.lat(), node.lon()))]
                }
                Element::DenseNode(node) if wanted.contains(&node.id()) => {
                    vec![(node.id(), (node.lat(), node.lon()))]
                }
                _ => Vec::new(),
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(pbf_error)?
        .into_iter()
        .collect();

    let mut raw = Vec::with_capacity(ways.len());
    let mut split = 0_usize;
    for way in ways {
        let runs = resolve_runs(&way.refs, &coords);
        if runs.len() > 1 {
            split += 1;
        }
        raw.extend(runs.into_iter().map(|coords| RawWay {
            id: way.id,
            tags: way.tags.clone(),
            coords,
        }));
    }
    if split > 0 {
        log::debug!("PBF: split {split} way(s) at nodes missing from the extract");
    }

    Ok(raw)
}

/// Consecutive runs of resolvable references.
fn resolve_runs(refs: &[i64], coords: &HashMap<i64, (f64, f64)>) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for id in refs {
        if let Some(&coord) = coords.get(id) {
            current.push(coord);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[allow(clippy::needless_pass_by_value)]
fn pbf_error(e: osmpbf::Error) -> NetworkError {
    NetworkError::Pbf {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_runs_at_missing_nodes() {
        let coords: HashMap<i64, (f64, f64)> = [
            (1, (40.0, -86.0)),
            (2, (40.1, -86.0)),
            (4, (40.3, -86.0)),
            (5, (40.4, -86.0)),
        ]
        .into_iter()
        .collect();

        let runs = resolve_runs(&[1, 2, 3, 4, 5, 6], &coords);
        assert_eq!(
            runs,
            vec![
                vec![(40.0, -86.0), (40.1, -86.0)],
                vec![(40.3, -86.0), (40.4, -86.0)],
            ]
        );
        assert!(resolve_runs(&[7, 8], &coords).is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_pbf(b"definitely not a pbf"),
            Err(NetworkError::Pbf { .. })
        ));
    }
}
