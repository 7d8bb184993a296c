//! TopoJSON decoding: rebuilds polygon features from shared arcs and extracts
//! the interior-border mesh (arcs shared by two different geometries).

use anyhow::{Context, Result, anyhow};
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::GeoFeature;

#[derive(Debug, Deserialize)]
struct Topology {
    arcs: Vec<Vec<Vec<f64>>>,
    transform: Option<Transform>,
    objects: HashMap<String, TopoGeometry>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum TopoGeometry {
    GeometryCollection {
        geometries: Vec<TopoGeometry>,
    },
    Polygon {
        id: Option<serde_json::Value>,
        arcs: Vec<Vec<i64>>,
    },
    MultiPolygon {
        id: Option<serde_json::Value>,
        arcs: Vec<Vec<Vec<i64>>>,
    },
    #[serde(other)]
    Other,
}

/// Output of decoding one named object of a topology.
#[derive(Debug, Clone)]
pub struct DecodedTopology {
    pub features: Vec<GeoFeature>,
    pub borders: MultiLineString<f64>,
}

/// Returns true when the document looks like a TopoJSON topology.
pub fn is_topology(doc: &serde_json::Value) -> bool {
    doc.get("type").and_then(|t| t.as_str()) == Some("Topology")
}

pub fn decode(doc: serde_json::Value, object: &str) -> Result<DecodedTopology> {
    let mut topology: Topology = serde_json::from_value(doc)
        .context("Failed to parse TopoJSON topology")?;

    let arcs = decode_arcs(&topology.arcs, topology.transform);

    let root = topology.objects.remove(object)
        .ok_or_else(|| anyhow!("Topology has no object named '{}'", object))?;

    let geometries = match root {
        TopoGeometry::GeometryCollection { geometries } => geometries,
        other => vec![other],
    };

    let mut features = Vec::new();
    // arc index -> first geometry that referenced it, and whether a second one did
    let mut arc_owners: HashMap<usize, (usize, bool)> = HashMap::new();

    for (geometry_index, geometry) in geometries.into_iter().enumerate() {
        let (id, polygons) = match geometry {
            TopoGeometry::Polygon { id, arcs: rings } => (id, vec![rings]),
            TopoGeometry::MultiPolygon { id, arcs: polygons } => (id, polygons),
            _ => continue, // Only areal geometries become features
        };

        let mut out = Vec::with_capacity(polygons.len());
        for rings in &polygons {
            for arc_ref in rings.iter().flatten() {
                let index = arc_index(*arc_ref);
                arc_owners
                    .entry(index)
                    .and_modify(|(owner, shared)| *shared |= *owner != geometry_index)
                    .or_insert((geometry_index, false));
            }
            out.push(build_polygon(&arcs, rings)?);
        }

        features.push(GeoFeature::new(id.and_then(id_to_string), MultiPolygon::new(out)));
    }

    let mut shared: Vec<usize> = arc_owners.into_iter()
        .filter(|(_, (_, shared))| *shared)
        .map(|(index, _)| index)
        .collect();
    shared.sort_unstable();

    let borders = MultiLineString::new(
        shared.into_iter()
            .map(|index| LineString::new(arcs[index].clone()))
            .collect(),
    );

    Ok(DecodedTopology { features, borders })
}

/// Coerces a feature id the way a string template would: numbers use their
/// canonical decimal form, strings are kept verbatim.
pub fn id_to_string(id: serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_arcs(raw: &[Vec<Vec<f64>>], transform: Option<Transform>) -> Vec<Vec<Coord<f64>>> {
    raw.iter().map(|arc| {
        match transform {
            // Quantized arcs are delta-encoded
            Some(t) => {
                let (mut x, mut y) = (0.0, 0.0);
                arc.iter().filter(|p| p.len() >= 2).map(|p| {
                    x += p[0];
                    y += p[1];
                    Coord {
                        x: x * t.scale[0] + t.translate[0],
                        y: y * t.scale[1] + t.translate[1],
                    }
                }).collect()
            }
            None => arc.iter()
                .filter(|p| p.len() >= 2)
                .map(|p| Coord { x: p[0], y: p[1] })
                .collect(),
        }
    }).collect()
}

fn arc_index(arc_ref: i64) -> usize {
    // Negative references are the one's complement of a reversed arc
    if arc_ref < 0 { (!arc_ref) as usize } else { arc_ref as usize }
}

fn build_ring(arcs: &[Vec<Coord<f64>>], refs: &[i64]) -> Result<LineString<f64>> {
    let mut points: Vec<Coord<f64>> = Vec::new();
    for &arc_ref in refs {
        let index = arc_index(arc_ref);
        let arc = arcs.get(index)
            .ok_or_else(|| anyhow!("Arc reference {} out of range ({} arcs)", arc_ref, arcs.len()))?;
        // Consecutive arcs share their joining point
        points.pop();
        if arc_ref < 0 {
            points.extend(arc.iter().rev().copied());
        } else {
            points.extend(arc.iter().copied());
        }
    }
    Ok(LineString::new(points))
}

fn build_polygon(arcs: &[Vec<Coord<f64>>], rings: &[Vec<i64>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter();
    let exterior = match rings.next() {
        Some(refs) => build_ring(arcs, refs)?,
        None => LineString::new(Vec::new()),
    };
    let interiors = rings.map(|refs| build_ring(arcs, refs)).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Two unit squares side by side sharing the edge x = 1.
    /// Arc 0 is the shared edge, arcs 1 and 2 are the outer boundaries.
    pub(crate) fn two_squares() -> serde_json::Value {
        json!({
            "type": "Topology",
            "arcs": [
                [[1.0, 0.0], [1.0, 1.0]],
                [[1.0, 1.0], [0.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
                [[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0]]
            ],
            "objects": {
                "states": {
                    "type": "GeometryCollection",
                    "geometries": [
                        { "type": "Polygon", "id": 6, "arcs": [[0, 1]] },
                        { "type": "Polygon", "id": "06", "arcs": [[2, -1]] },
                        { "type": "Polygon", "arcs": [[1]] }
                    ]
                }
            }
        })
    }

    #[test]
    fn numeric_and_string_ids_coerce_to_strings() {
        let decoded = decode(two_squares(), "states").unwrap();
        let ids: Vec<Option<&str>> = decoded.features.iter().map(|f| f.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("6"), Some("06"), None]);
    }

    #[test]
    fn rings_are_stitched_without_duplicate_joins() {
        let decoded = decode(two_squares(), "states").unwrap();
        let exterior = decoded.features[0].geometry.0[0].exterior();
        let coords: Vec<(f64, f64)> = exterior.coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(
            coords,
            vec![(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0), (1.0, 0.0)]
        );
    }

    #[test]
    fn reversed_arc_references_walk_backwards() {
        let decoded = decode(two_squares(), "states").unwrap();
        let exterior = decoded.features[1].geometry.0[0].exterior();
        let coords: Vec<(f64, f64)> = exterior.coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(
            coords,
            vec![(1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (1.0, 0.0)]
        );
    }

    #[test]
    fn mesh_keeps_only_arcs_shared_between_geometries() {
        let decoded = decode(two_squares(), "states").unwrap();
        // Arc 0 is shared by geometries 0 and 1, arc 1 by 0 and 2, arc 2 by nobody
        let lines: Vec<usize> = decoded.borders.0.iter().map(|l| l.0.len()).collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn quantized_arcs_are_delta_decoded() {
        let doc = json!({
            "type": "Topology",
            "transform": { "scale": [0.5, 2.0], "translate": [10.0, 20.0] },
            "arcs": [[[0, 0], [2, 0], [0, 1], [-2, 0], [0, -1]]],
            "objects": {
                "states": { "type": "Polygon", "id": 1, "arcs": [[0]] }
            }
        });
        let decoded = decode(doc, "states").unwrap();
        let coords: Vec<(f64, f64)> = decoded.features[0].geometry.0[0]
            .exterior().coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(
            coords,
            vec![(10.0, 20.0), (11.0, 20.0), (11.0, 22.0), (10.0, 22.0), (10.0, 20.0)]
        );
        assert!(decoded.borders.0.is_empty());
    }

    #[test]
    fn missing_object_is_an_error() {
        assert!(decode(two_squares(), "counties").is_err());
    }

    #[test]
    fn out_of_range_arc_is_an_error() {
        let doc = json!({
            "type": "Topology",
            "arcs": [],
            "objects": { "states": { "type": "Polygon", "arcs": [[3]] } }
        });
        assert!(decode(doc, "states").is_err());
    }
}
