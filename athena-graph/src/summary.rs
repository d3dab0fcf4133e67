//! Textual community summaries.

use std::collections::BTreeMap;

use athena_core::types::{Community, Edge, Entity};

/// Render a one-paragraph summary: size, dominant types, notable members,
/// and the strongest internal relations.
pub fn render(community: &Community, members: &[Entity], edges: &[Edge]) -> String {
    if members.is_empty() {
        return format!("Community {} is empty.", community.id);
    }

    let mut type_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in members {
        *type_counts.entry(member.entity_type.as_str()).or_default() += 1;
    }
    let mut types: Vec<(&str, usize)> = type_counts.into_iter().collect();
    types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let dominant: Vec<String> = types
        .iter()
        .take(3)
        .map(|(t, c)| format!("{t} ({c})"))
        .collect();

    let mut names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    names.sort_unstable();
    let notable = names
        .iter()
        .take(5)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");

    let mut internal: Vec<&Edge> = edges
        .iter()
        .filter(|e| {
            community.members.contains(&e.source_id) && community.members.contains(&e.target_id)
        })
        .collect();
    internal.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    let relations = if internal.is_empty() {
        "no internal relations".to_string()
    } else {
        internal
            .iter()
            .take(3)
            .map(|e| format!("{} {} {}", e.source_id, e.edge_type.as_str(), e.target_id))
            .collect::<Vec<_>>()
            .join("; ")
    };

    format!(
        "Community of {} entities, mostly {}. Members include {}. Strongest relations: {}.",
        members.len(),
        dominant.join(", "),
        notable,
        relations
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::types::EdgeType;

    #[test]
    fn summary_names_members_and_relations() {
        let a = Entity::new("service", "api");
        let b = Entity::new("service", "worker");
        let community = Community {
            id: "community:x".into(),
            members: [a.id.clone(), b.id.clone()].into_iter().collect(),
            level: 0,
        };
        let edges = vec![Edge {
            source_id: a.id.clone(),
            target_id: b.id.clone(),
            edge_type: EdgeType::Uses,
            strength: 0.9,
            context: None,
        }];
        let text = render(&community, &[a, b], &edges);
        assert!(text.contains("2 entities"));
        assert!(text.contains("service (2)"));
        assert!(text.contains("uses"));
    }
}
