//! Build order of pack items.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{PackError, PackResult};
use crate::models::PackItem;

/// Order items so that every item follows the items its `::id` rules refer to.
///
/// Items without a dependency relation keep their request order. References to
/// unknown ids are ignored with a warning; a cycle is an error.
pub fn order_pack_items(items: Vec<PackItem>) -> PackResult<Vec<PackItem>> {
    let deps = dependency_indices(&items)?;

    let mut emitted = vec![false; items.len()];
    let mut order = Vec::with_capacity(items.len());
    while order.len() < items.len() {
        let ready = (0..items.len())
            .find(|&index| !emitted[index] && deps[index].iter().all(|&dep| emitted[dep]));
        match ready {
            Some(index) => {
                emitted[index] = true;
                order.push(index);
            }
            None => return Err(PackError::DependencyCycle(find_cycle(&items, &deps, &emitted))),
        }
    }

    let mut slots: Vec<Option<PackItem>> = items.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

fn dependency_indices(items: &[PackItem]) -> PackResult<Vec<Vec<usize>>> {
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        index_of.insert(&item.id, index);
        for alias in &item.aliases {
            index_of.entry(alias).or_insert(index);
        }
    }

    let mut deps = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut resolved = Vec::new();
        for dep_id in &item.patterns.dep_pack_ids {
            match index_of.get(dep_id.as_str()) {
                Some(&dep) if dep == index => {
                    return Err(PackError::DependencyCycle(vec![item.id.clone(), item.id.clone()]));
                }
                Some(&dep) => {
                    if !resolved.contains(&dep) {
                        resolved.push(dep);
                    }
                }
                None => warn!("pack {} refers to unknown pack id {dep_id}", item.id),
            }
        }
        deps.push(resolved);
    }
    Ok(deps)
}

fn find_cycle(items: &[PackItem], deps: &[Vec<usize>], emitted: &[bool]) -> Vec<String> {
    let Some(start) = (0..items.len()).find(|&index| !emitted[index]) else {
        return Vec::new();
    };

    // Every pending item has a pending dependency, so walking them must revisit a node.
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|&&dep| !emitted[dep]) else {
            break;
        };
        if let Some(position) = path.iter().position(|&seen| seen == next) {
            let mut cycle: Vec<String> = path[position..]
                .iter()
                .map(|&index| items[index].id.clone())
                .collect();
            cycle.push(items[next].id.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }
    path.into_iter().map(|index| items[index].id.clone()).collect()
}
