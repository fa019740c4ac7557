/// Nested-set numbering of the taxonomy given by parent_plant_name_id
use crate::bio::entity::EntityId;
use crate::storage::traits::{TaxonomyStore, TreeNode};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub nodes: u64,
    pub roots: u64,
    pub max_depth: u32,
    /// Taxa made roots because their parent chain loops back on itself
    pub cycles_broken: u64,
}

/// Number a forest in preorder. Children are visited in ascending id order.
///
/// A taxon becomes a root when it has no parent, names itself, points at a
/// taxon that is not in the input, or sits on a parent cycle.
pub fn nested_set(parents: &[(EntityId, Option<EntityId>)]) -> (Vec<TreeNode>, TreeSummary) {
    let known: HashSet<EntityId> = parents.iter().map(|(id, _)| *id).collect();
    let mut children: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
    let mut roots: Vec<EntityId> = Vec::new();

    let mut ordered: Vec<(EntityId, Option<EntityId>)> = parents.to_vec();
    ordered.sort_unstable();
    for (id, parent) in &ordered {
        match parent {
            Some(parent) if *parent != *id && known.contains(parent) => {
                children.entry(*parent).or_default().push(*id)
            }
            _ => roots.push(*id),
        }
    }

    let mut summary = TreeSummary::default();
    let mut nodes: Vec<TreeNode> = Vec::with_capacity(ordered.len());
    let mut position: HashMap<EntityId, usize> = HashMap::with_capacity(ordered.len());
    let mut counter = 0i64;

    // Unvisited taxa after the proper roots are on cycles
    let explicit_roots = roots.len();
    let fallback = ordered.iter().map(|(id, _)| *id);
    for (i, root) in roots.iter().copied().chain(fallback).enumerate() {
        if position.contains_key(&root) {
            continue;
        }
        if i >= explicit_roots {
            summary.cycles_broken += 1;
            warn!(taxon_id = root, "Parent cycle broken at taxon");
        }
        summary.roots += 1;
        counter += 1;
        position.insert(root, nodes.len());
        nodes.push(TreeNode {
            taxon_id: root,
            parent_id: None,
            lft: counter,
            rgt: 0,
            depth: 0,
        });

        let mut stack: Vec<(EntityId, usize)> = vec![(root, 0)];
        while let Some(top) = stack.last_mut() {
            let id = top.0;
            let next = children.get(&id).and_then(|kids| kids.get(top.1)).copied();
            top.1 += 1;
            match next {
                Some(child) if !position.contains_key(&child) => {
                    let depth = stack.len() as u32;
                    counter += 1;
                    position.insert(child, nodes.len());
                    nodes.push(TreeNode {
                        taxon_id: child,
                        parent_id: Some(id),
                        lft: counter,
                        rgt: 0,
                        depth,
                    });
                    summary.max_depth = summary.max_depth.max(depth);
                    stack.push((child, 0));
                }
                Some(_) => {}
                None => {
                    counter += 1;
                    if let Some(&at) = position.get(&id) {
                        nodes[at].rgt = counter;
                    }
                    stack.pop();
                }
            }
        }
    }

    summary.nodes = nodes.len() as u64;
    (nodes, summary)
}

/// Recompute the stored tree from the current taxa
pub fn rebuild_taxon_tree(store: &dyn TaxonomyStore) -> Result<TreeSummary> {
    let parents = store.taxon_parents()?;
    let (nodes, summary) = nested_set(&parents);
    store.replace_taxon_tree(&nodes)?;
    info!(
        nodes = summary.nodes,
        roots = summary.roots,
        max_depth = summary.max_depth,
        "Taxonomy tree rebuilt"
    );
    Ok(summary)
}
