//! Functions for reading tract membership from Slicer MRML scene files.
//!
//! An MRML file is an XML scene. Fiber clusters are assigned to tracts by hand in Slicer, which
//! stores each tract as a `ModelHierarchy` node. A hierarchy node whose `parentNodeRef` is the
//! tract's id points, through `associatedNodeRef`, to a `FiberBundle` node. The bundle's `name` is
//! the cluster name, and its `storageNodeRef` points to the `FiberBundleStorage` node that holds
//! the cluster's `fileName`.

use roxmltree::{Document, Node};
use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Result, TractmapError};

const HIERARCHY_TAG: &str = "ModelHierarchy";
const BUNDLE_TAG: &str = "FiberBundle";
const STORAGE_TAG: &str = "FiberBundleStorage";

/// A fiber cluster assigned to a tract, with the file Slicer stored it in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ClusterRef {
    pub name: String,
    pub file_name: String,
}

/// Models the assignment of fiber clusters to named tracts.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TractMap {
    pub tracts: BTreeMap<String, Vec<ClusterRef>>,
}


impl TractMap {

    /// Read a tract map from an MRML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<TractMap> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| TractmapError::ReadFile(path.to_path_buf(), e))?;
        TractMap::parse(&text)
    }


    /// Parse a tract map from MRML text.
    pub fn parse(text: &str) -> Result<TractMap> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();

        let tract_ids = find_tract_names(root)?;
        tracing::info!(
            "Found {} tracts:{}",
            tract_ids.len(),
            tract_ids.keys().cloned().collect::<Vec<String>>().join(" : ")
        );

        let by_id = index_by_id(root);

        let mut tracts = BTreeMap::new();
        for (tract_name, tract_id) in tract_ids.iter() {
            let clusters = find_clusters(root, tract_id, &by_id)?;
            tracing::debug!("Tract {} has {} clusters", tract_name, clusters.len());
            tracts.insert(tract_name.clone(), clusters);
        }

        Ok(TractMap { tracts })
    }


    /// Invert the map, so that it can be indexed by cluster name.
    ///
    /// If a cluster is assigned to several tracts, the tract that sorts last wins.
    pub fn cluster_to_tract(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (tract, clusters) in self.tracts.iter() {
            for cluster in clusters.iter() {
                map.insert(cluster.name.clone(), tract.clone());
            }
        }
        map
    }


    /// Get the tract names, in order.
    pub fn tract_names(&self) -> Vec<String> {
        self.tracts.keys().cloned().collect()
    }


    pub fn num_tracts(&self) -> usize {
        self.tracts.len()
    }


    /// Serialize the tract map as JSON, `{"<tract>": [{"name": .., "file_name": ..}, ..]}`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}


impl fmt::Display for TractMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let num_clusters: usize = self.tracts.values().map(Vec::len).sum();
        write!(f, "Tract map assigning {} clusters to {} tracts.", num_clusters, self.tracts.len())
    }
}


/// Read a tract map from an MRML file.
///
/// # Examples
///
/// ```no_run
/// let map = tractmap::read_mrml("/path/to/clustered_tracts_display_100_percent_aem.mrml").unwrap();
/// println!("{}", map);
/// ```
pub fn read_mrml<P: AsRef<Path>>(path: P) -> Result<TractMap> {
    TractMap::from_file(path)
}


/// Tract names map to hierarchy node ids. Only top-level hierarchy nodes are tracts, and Slicer's
/// own default nodes (named `ModelHierarchy...`) are skipped.
fn find_tract_names(root: Node) -> Result<BTreeMap<String, String>> {
    let mut tracts = BTreeMap::new();
    for node in root.children().filter(|n| n.has_tag_name(HIERARCHY_TAG)) {
        let name = required_attribute(node, "name")?;
        if name.starts_with(HIERARCHY_TAG) {
            continue;
        }
        let id = required_attribute(node, "id")?;
        tracts.insert(name.to_string(), id.to_string());
    }
    Ok(tracts)
}


fn index_by_id<'a, 'input>(root: Node<'a, 'input>) -> HashMap<(&'a str, &'a str), Node<'a, 'input>> {
    let mut by_id = HashMap::new();
    for node in root.descendants().filter(|n| n.is_element()) {
        if let Some(id) = node.attribute("id") {
            by_id.entry((node.tag_name().name(), id)).or_insert(node);
        }
    }
    by_id
}


fn find_clusters<'a, 'input>(
    root: Node<'a, 'input>,
    tract_id: &str,
    by_id: &HashMap<(&'a str, &'a str), Node<'a, 'input>>,
) -> Result<Vec<ClusterRef>> {
    let bundle_ids: BTreeSet<&str> = root
        .descendants()
        .filter(|n| n.attribute("parentNodeRef") == Some(tract_id))
        .filter_map(|n| n.attribute("associatedNodeRef"))
        .collect();

    let mut clusters = Vec::with_capacity(bundle_ids.len());
    for bundle_id in bundle_ids {
        let bundle = by_id
            .get(&(BUNDLE_TAG, bundle_id))
            .ok_or_else(|| TractmapError::Mrml(format!("no {} with id '{}'", BUNDLE_TAG, bundle_id)))?;
        let storage_id = required_attribute(*bundle, "storageNodeRef")?;
        let storage = by_id
            .get(&(STORAGE_TAG, storage_id))
            .ok_or_else(|| TractmapError::Mrml(format!("no {} with id '{}'", STORAGE_TAG, storage_id)))?;

        clusters.push(ClusterRef {
            name: required_attribute(*bundle, "name")?.to_string(),
            file_name: required_attribute(*storage, "fileName")?.to_string(),
        });
    }
    clusters.sort();
    Ok(clusters)
}


fn required_attribute<'a>(node: Node<'a, '_>, attribute: &str) -> Result<&'a str> {
    node.attribute(attribute).ok_or_else(|| {
        TractmapError::Mrml(format!(
            "<{}> node {} lacks attribute '{}'",
            node.tag_name().name(),
            node.attribute("id").unwrap_or("without id"),
            attribute
        ))
    })
}


#[cfg(test)]
mod test {
    use super::*;

    const SCENE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MRML version="Slicer4.4.0">
  <ModelHierarchy id="vtkMRMLModelHierarchyNode1" name="ModelHierarchy" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode2" name="CST_left" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode3" name="AF_right" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode4" name="ModelHierarchy_4" parentNodeRef="vtkMRMLModelHierarchyNode2" associatedNodeRef="vtkMRMLFiberBundleNode1" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode5" name="ModelHierarchy_5" parentNodeRef="vtkMRMLModelHierarchyNode2" associatedNodeRef="vtkMRMLFiberBundleNode2" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode6" name="ModelHierarchy_6" parentNodeRef="vtkMRMLModelHierarchyNode2" associatedNodeRef="vtkMRMLFiberBundleNode2" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode7" name="ModelHierarchy_7" parentNodeRef="vtkMRMLModelHierarchyNode3" associatedNodeRef="vtkMRMLFiberBundleNode3" />
  <FiberBundle id="vtkMRMLFiberBundleNode1" name="cluster_00001" storageNodeRef="vtkMRMLFiberBundleStorageNode1" />
  <FiberBundle id="vtkMRMLFiberBundleNode2" name="cluster_00002" storageNodeRef="vtkMRMLFiberBundleStorageNode2" />
  <FiberBundle id="vtkMRMLFiberBundleNode3" name="cluster_00003" storageNodeRef="vtkMRMLFiberBundleStorageNode3" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode1" fileName="clusters/cluster_00001.vtp" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode2" fileName="clusters/cluster_00002.vtp" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode3" fileName="clusters/cluster_00003.vtp" />
</MRML>"#;

    #[test]
    fn tracts_and_their_clusters_are_found() {
        let map = TractMap::parse(SCENE).unwrap();

        assert_eq!(vec!["AF_right", "CST_left"], map.tract_names());
        assert_eq!(2, map.num_tracts());

        let cst = &map.tracts["CST_left"];
        assert_eq!(2, cst.len());
        assert_eq!("cluster_00001", cst[0].name);
        assert_eq!("clusters/cluster_00001.vtp", cst[0].file_name);
        assert_eq!("cluster_00002", cst[1].name);

        assert_eq!(vec![ClusterRef {
            name: String::from("cluster_00003"),
            file_name: String::from("clusters/cluster_00003.vtp"),
        }], map.tracts["AF_right"]);
    }

    #[test]
    fn the_map_can_be_indexed_by_cluster() {
        let map = TractMap::parse(SCENE).unwrap();
        let by_cluster = map.cluster_to_tract();

        assert_eq!(3, by_cluster.len());
        assert_eq!("CST_left", by_cluster["cluster_00002"]);
        assert_eq!("AF_right", by_cluster["cluster_00003"]);
    }

    #[test]
    fn the_map_serializes_to_json_by_tract() {
        let map = TractMap::parse(SCENE).unwrap();
        let json: serde_json::Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        assert_eq!("cluster_00003", json["AF_right"][0]["name"]);
        assert_eq!(2, json["CST_left"].as_array().unwrap().len());
        assert_eq!("Tract map assigning 3 clusters to 2 tracts.", format!("{}", map));
    }

    #[test]
    fn dangling_bundle_references_are_errors() {
        let scene = SCENE.replace(r#"<FiberBundle id="vtkMRMLFiberBundleNode3""#, r#"<FiberBundle id="vtkMRMLFiberBundleNode9""#);
        match TractMap::parse(&scene) {
            Err(TractmapError::Mrml(msg)) => assert!(msg.contains("vtkMRMLFiberBundleNode3")),
            other => panic!("expected Mrml error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_names_are_errors() {
        let scene = SCENE.replace(r#"fileName="clusters/cluster_00001.vtp" "#, "");
        assert!(matches!(TractMap::parse(&scene), Err(TractmapError::Mrml(_))));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(TractMap::parse("<MRML><ModelHierarchy></MRML>"), Err(TractmapError::Xml(_))));
    }

    #[test]
    fn unreadable_files_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.mrml");
        match read_mrml(&path) {
            Err(e @ TractmapError::ReadFile(..)) => assert!(format!("{}", e).contains("atlas.mrml")),
            other => panic!("expected ReadFile, got {:?}", other),
        }
    }

    #[test]
    fn a_scene_without_tracts_gives_an_empty_map() {
        let map = TractMap::parse(r#"<MRML><ModelHierarchy id="a" name="ModelHierarchy_1"/></MRML>"#).unwrap();
        assert_eq!(0, map.num_tracts());
    }
}
