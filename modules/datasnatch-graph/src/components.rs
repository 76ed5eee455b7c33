use std::collections::BTreeMap;

use datasnatch_common::{ProfileId, RelationshipEdge};

/// Group profiles that are transitively linked by any edge kind.
///
/// Each group is sorted, groups are ordered by their first member, and
/// profiles with no edges are not reported.
pub fn connected_groups(edges: &[RelationshipEdge]) -> Vec<Vec<ProfileId>> {
    let mut index: BTreeMap<&ProfileId, usize> = BTreeMap::new();
    for edge in edges {
        let next = index.len();
        index.entry(&edge.a).or_insert(next);
        let next = index.len();
        index.entry(&edge.b).or_insert(next);
    }

    let mut parent: Vec<usize> = (0..index.len()).collect();
    for edge in edges {
        union(&mut parent, index[&edge.a], index[&edge.b]);
    }

    let mut groups: BTreeMap<usize, Vec<ProfileId>> = BTreeMap::new();
    for (id, &i) in &index {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push((*id).clone());
    }

    let mut groups: Vec<Vec<ProfileId>> = groups.into_values().collect();
    for g in &mut groups {
        g.sort();
    }
    groups.sort();
    groups
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasnatch_common::RelationKind;

    fn edge(a: &str, b: &str) -> RelationshipEdge {
        RelationshipEdge::new(
            ProfileId(a.to_string()),
            ProfileId(b.to_string()),
            RelationKind::PhoneMatch,
            1.0,
        )
    }

    fn ids(group: &[ProfileId]) -> Vec<&str> {
        group.iter().map(ProfileId::as_str).collect()
    }

    #[test]
    fn transitive_links_merge() {
        let groups = connected_groups(&[edge("a", "b"), edge("c", "b"), edge("x", "y")]);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["a", "b", "c"]);
        assert_eq!(ids(&groups[1]), vec!["x", "y"]);
    }

    #[test]
    fn no_edges_no_groups() {
        assert!(connected_groups(&[]).is_empty());
    }
}
