use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A tier of the hierarchy, e.g. region(1) / factory(2) / section(3)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OrgLevel {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Factory")]
    pub name: String,
    #[schema(example = 2)]
    pub depth: u32,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OrgUnit {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "Dhaka Knitting")]
    pub name: String,
    #[schema(example = "DHK-KNT")]
    pub code: String,
    #[schema(example = 2)]
    pub level_id: u64,
    #[schema(example = 3, nullable = true)]
    pub parent_id: Option<u64>,
    #[schema(nullable = true)]
    pub manager_employee_id: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Flat unit row joined with its level and headcount
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgUnitRow {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub level_id: u64,
    pub level_name: String,
    pub depth: u32,
    pub parent_id: Option<u64>,
    pub employee_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrgNode {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub level_id: u64,
    pub level_name: String,
    pub depth: u32,
    pub employee_count: i64,
    pub children: Vec<OrgNode>,
}

impl OrgNode {
    fn from_row(row: OrgUnitRow, children: Vec<OrgNode>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            level_id: row.level_id,
            level_name: row.level_name,
            depth: row.depth,
            employee_count: row.employee_count,
            children,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrgTree {
    pub roots: Vec<OrgNode>,
    /// Units attached at the root because their parent was missing or cyclic
    pub promoted: Vec<u64>,
}

type ChildMap = HashMap<Option<u64>, Vec<OrgUnitRow>>;

fn by_name(a: &OrgUnitRow, b: &OrgUnitRow) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then(a.id.cmp(&b.id))
}

fn attach(parent: Option<u64>, map: &mut ChildMap) -> Vec<OrgNode> {
    let rows = map.remove(&parent).unwrap_or_default();
    rows.into_iter()
        .map(|row| {
            let children = attach(Some(row.id), map);
            OrgNode::from_row(row, children)
        })
        .collect()
}

/// Assemble the nested hierarchy from flat rows.
///
/// Every row appears exactly once. Rows pointing at a parent that does not
/// exist, and rows caught in a parent cycle, become roots and are listed in
/// `promoted`. Siblings are ordered by name, then id.
pub fn build_tree(rows: Vec<OrgUnitRow>) -> OrgTree {
    let ids: HashSet<u64> = rows.iter().map(|r| r.id).collect();
    let mut promoted = Vec::new();
    let mut map: ChildMap = HashMap::new();

    for row in rows {
        let key = match row.parent_id {
            Some(parent) if parent != row.id && ids.contains(&parent) => Some(parent),
            Some(_) => {
                promoted.push(row.id);
                None
            }
            None => None,
        };
        map.entry(key).or_default().push(row);
    }

    for siblings in map.values_mut() {
        siblings.sort_by(by_name);
    }

    let mut roots = attach(None, &mut map);

    // Whatever is left hangs off a cycle: break it at the lowest id.
    loop {
        let next = map
            .iter()
            .flat_map(|(parent, rows)| rows.iter().map(move |r| (r.id, *parent)))
            .min_by_key(|(id, _)| *id);

        let Some((id, parent)) = next else { break };
        let Some(siblings) = map.get_mut(&parent) else { break };
        let Some(pos) = siblings.iter().position(|r| r.id == id) else { break };

        let row = siblings.remove(pos);
        if siblings.is_empty() {
            map.remove(&parent);
        }
        promoted.push(id);
        let children = attach(Some(id), &mut map);
        roots.push(OrgNode::from_row(row, children));
    }

    roots.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    promoted.sort_unstable();

    OrgTree { roots, promoted }
}

/// Would making `new_parent` the parent of `unit_id` close a loop?
///
/// `parents` maps every unit id to its current parent.
pub fn would_create_cycle(
    parents: &HashMap<u64, Option<u64>>,
    unit_id: u64,
    new_parent: Option<u64>,
) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = new_parent;

    while let Some(id) = cursor {
        if id == unit_id {
            return true;
        }
        if !seen.insert(id) {
            // existing data already loops; refuse to extend it
            return true;
        }
        cursor = parents.get(&id).copied().flatten();
    }

    false
}

/// Depth rules: roots sit on the shallowest level, children strictly below
/// their parent.
pub fn validate_placement(
    child_depth: u32,
    parent_depth: Option<u32>,
    min_depth: u32,
) -> Result<(), String> {
    match parent_depth {
        None if child_depth != min_depth => Err(format!(
            "A unit without parent must be on the top level (depth {})",
            min_depth
        )),
        Some(parent) if parent >= child_depth => Err(format!(
            "Parent level depth {} must be above child level depth {}",
            parent, child_depth
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, name: &str, parent_id: Option<u64>, depth: u32) -> OrgUnitRow {
        OrgUnitRow {
            id,
            name: name.to_string(),
            code: format!("U{}", id),
            level_id: depth as u64,
            level_name: format!("L{}", depth),
            depth,
            parent_id,
            employee_count: id as i64,
        }
    }

    fn subtree_size(node: &OrgNode) -> usize {
        1 + node.children.iter().map(subtree_size).sum::<usize>()
    }

    #[test]
    fn nests_and_orders_siblings_by_name() {
        let tree = build_tree(vec![
            row(4, "Sewing", Some(2), 3),
            row(1, "North", None, 1),
            row(2, "Factory B", Some(1), 2),
            row(3, "Factory A", Some(1), 2),
            row(5, "Cutting", Some(2), 3),
        ]);

        assert!(tree.promoted.is_empty());
        assert_eq!(tree.roots.len(), 1);

        let north = &tree.roots[0];
        assert_eq!(subtree_size(north), 5);
        let names: Vec<_> = north.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Factory A", "Factory B"]);

        let factory_b = &north.children[1];
        let names: Vec<_> = factory_b.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Cutting", "Sewing"]);
    }

    #[test]
    fn missing_parent_is_promoted_to_root() {
        let tree = build_tree(vec![row(1, "North", None, 1), row(7, "Lost", Some(99), 2)]);

        assert_eq!(tree.promoted, vec![7]);
        let ids: Vec<_> = tree.roots.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7, 1]);
    }

    #[test]
    fn cycles_are_broken_without_losing_units() {
        let tree = build_tree(vec![
            row(1, "A", Some(2), 1),
            row(2, "B", Some(1), 2),
            row(3, "C", Some(3), 1),
        ]);

        let total: usize = tree.roots.iter().map(subtree_size).sum();
        assert_eq!(total, 3);
        assert_eq!(tree.promoted, vec![1, 3]);
        assert_eq!(tree.roots[0].id, 1);
        assert_eq!(tree.roots[0].children[0].id, 2);
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        let tree = build_tree(Vec::new());
        assert!(tree.roots.is_empty());
        assert!(tree.promoted.is_empty());
    }

    #[test]
    fn moving_under_a_descendant_is_a_cycle() {
        let parents: HashMap<u64, Option<u64>> =
            [(1, None), (2, Some(1)), (3, Some(2)), (4, None)].into_iter().collect();

        assert!(would_create_cycle(&parents, 1, Some(3)));
        assert!(would_create_cycle(&parents, 2, Some(2)));
        assert!(!would_create_cycle(&parents, 3, Some(4)));
        assert!(!would_create_cycle(&parents, 3, None));
    }

    #[test]
    fn placement_follows_depth() {
        assert!(validate_placement(1, None, 1).is_ok());
        assert!(validate_placement(2, None, 1).is_err());
        assert!(validate_placement(3, Some(2), 1).is_ok());
        assert!(validate_placement(2, Some(2), 1).is_err());
        assert!(validate_placement(2, Some(3), 1).is_err());
    }
}
