//! Assigning atlas fibers to clusters and tracts, and grouping their end points by tract.

use serde::Serialize;

use std::collections::{btree_map, BTreeMap, HashMap};
use std::fmt;

use crate::error::{Result, TractmapError};
use crate::mrml::TractMap;
use crate::streamline::Streamline;

/// The start and end points of all streamlines of one tract, in streamline order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TractEnds {
    pub starts: Vec<[f64; 3]>,
    pub ends: Vec<[f64; 3]>,
}

/// End points grouped by tract name. Serializes as `{"<tract>": {"starts": [..], "ends": [..]}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TractEndpoints {
    pub tracts: BTreeMap<String, TractEnds>,
}


impl TractEndpoints {

    pub fn get(&self, tract: &str) -> Option<&TractEnds> {
        self.tracts.get(tract)
    }

    pub fn insert(&mut self, tract: String, ends: TractEnds) -> Option<TractEnds> {
        self.tracts.insert(tract, ends)
    }

    /// The ends of the given tract, created empty if needed.
    pub fn entry(&mut self, tract: String) -> &mut TractEnds {
        self.tracts.entry(tract).or_default()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, TractEnds> {
        self.tracts.iter()
    }

    /// The number of tracts.
    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    /// The total number of streamlines over all tracts.
    pub fn num_streamlines(&self) -> usize {
        self.tracts.values().map(|e| e.starts.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}


impl fmt::Display for TractEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "End points of {} streamlines in {} tracts.", self.num_streamlines(), self.tracts.len())
    }
}


/// Find, for each fiber, the name of the cluster holding an identical streamline.
///
/// Clusters are searched in name order, so a fiber present in several clusters is assigned to the first one.
/// A fiber without an identical cluster streamline is an error.
pub fn match_fibers_to_clusters(
    fibers: &[Streamline],
    clusters: &BTreeMap<String, Vec<Streamline>>,
) -> Result<Vec<String>> {
    tracing::info!("Matching streams to clusters");

    let mut lookup: HashMap<Vec<[u32; 3]>, &str> = HashMap::new();
    let mut num_cluster_streams = 0;
    for (cluster, streams) in clusters.iter() {
        for stream in streams.iter() {
            lookup.entry(stream.exact_key()).or_insert(cluster.as_str());
            num_cluster_streams += 1;
        }
    }
    tracing::info!("{} streams in {} clusters.", num_cluster_streams, clusters.len());

    fibers
        .iter()
        .enumerate()
        .map(|(idx, fiber)| {
            tracing::trace!("Searching for fiber: {}", idx);
            lookup
                .get(&fiber.exact_key())
                .map(|cluster| cluster.to_string())
                .ok_or(TractmapError::UnmatchedStreamline(idx))
        })
        .collect()
}


/// Replace each cluster name by the name of the tract the cluster belongs to.
pub fn map_clusters_to_tracts(cluster_labels: &[String], tract_map: &TractMap) -> Result<Vec<String>> {
    let by_cluster = tract_map.cluster_to_tract();
    cluster_labels
        .iter()
        .map(|cluster| {
            by_cluster
                .get(cluster)
                .cloned()
                .ok_or_else(|| TractmapError::UnknownCluster(cluster.clone()))
        })
        .collect()
}


/// Group the first and last point of every streamline by its tract label.
///
/// `labels[i]` is the tract of `streamlines[i]`, so both must have the same length. Empty streamlines have no
/// end points and are an error.
pub fn stream_ends(streamlines: &[Streamline], labels: &[String]) -> Result<TractEndpoints> {
    if streamlines.len() != labels.len() {
        return Err(TractmapError::CountMismatch(streamlines.len(), labels.len()));
    }

    let count = streamlines.len();
    let mut endpoints = TractEndpoints::default();
    for (idx, (stream, label)) in streamlines.iter().zip(labels.iter()).enumerate() {
        tracing::debug!("Extracting ends for stream {} / {}", idx, count);
        let (start, end) = match (stream.start(), stream.end()) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(TractmapError::EmptyStreamline(idx)),
        };
        let ends = endpoints.entry(label.clone());
        ends.starts.push(widen(start));
        ends.ends.push(widen(end));
    }
    Ok(endpoints)
}


fn widen(p: [f32; 3]) -> [f64; 3] {
    [p[0] as f64, p[1] as f64, p[2] as f64]
}
