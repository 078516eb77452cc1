use std::collections::HashSet;

use uuid::Uuid;

use crate::clause::Clause;

/// One top-level entry in the rendered clause hierarchy: a section header
/// with its direct children, or a standalone leaf with none.
#[derive(Debug)]
pub struct ClauseNode<'a> {
    pub clause: &'a Clause,
    pub children: Vec<&'a Clause>,
}

impl ClauseNode<'_> {
    pub fn is_section(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Build the two-level hierarchy from the full ordered clause list. Each
/// top-level clause (parent_id = None) keeps its direct children in input
/// order; no other ordering is imposed.
pub fn build_tree(clauses: &[Clause]) -> Vec<ClauseNode<'_>> {
    clauses
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|top| ClauseNode {
            clause: top,
            children: clauses
                .iter()
                .filter(|c| c.parent_id == Some(top.id))
                .collect(),
        })
        .collect()
}

/// Tracks which sections are expanded. Sections default to collapsed; on
/// first load every section with at least one child is expanded once, and
/// later data refreshes must not re-trigger that (the one-shot flag, not
/// render timing, is the guard).
#[derive(Debug, Default)]
pub struct SectionExpansion {
    expanded: HashSet<Uuid>,
    auto_expanded: bool,
}

impl SectionExpansion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand all non-empty sections exactly once. Returns whether this
    /// call did the expansion.
    pub fn auto_expand_once(&mut self, tree: &[ClauseNode<'_>]) -> bool {
        if self.auto_expanded {
            return false;
        }
        self.auto_expanded = true;
        for node in tree.iter().filter(|n| n.is_section()) {
            self.expanded.insert(node.clause.id);
        }
        true
    }

    pub fn toggle(&mut self, section_id: Uuid) {
        if !self.expanded.remove(&section_id) {
            self.expanded.insert(section_id);
        }
    }

    pub fn is_expanded(&self, section_id: Uuid) -> bool {
        self.expanded.contains(&section_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clause::ProcessingStatus;

    fn clause(name: &str, order: i32, parent_id: Option<Uuid>) -> Clause {
        Clause {
            id: Uuid::now_v7(),
            contract_id: Uuid::nil(),
            name: name.to_string(),
            category: "general".to_string(),
            display_order: order,
            parent_id,
            clause_level: if parent_id.is_some() { 2 } else { 1 },
            is_header: false,
            processing_status: ProcessingStatus::Pending,
            original_text: None,
            draft_text: None,
            draft_modified: false,
            certification: None,
            extracted_value: None,
            created_at: Utc::now(),
        }
    }

    fn sample() -> Vec<Clause> {
        let mut section = clause("7 Termination", 0, None);
        section.is_header = true;
        let child_a = clause("7.1 For cause", 1, Some(section.id));
        let child_b = clause("7.2 For convenience", 2, Some(section.id));
        let standalone = clause("8 Governing law", 3, None);
        vec![section, child_a, child_b, standalone]
    }

    #[test]
    fn groups_children_under_their_parent_in_input_order() {
        let clauses = sample();
        let tree = build_tree(&clauses);

        assert_eq!(tree.len(), 2);
        assert!(tree[0].is_section());
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].name, "7.1 For cause");
        assert_eq!(tree[0].children[1].name, "7.2 For convenience");
        assert!(!tree[1].is_section());
    }

    #[test]
    fn auto_expand_runs_exactly_once() {
        let clauses = sample();
        let tree = build_tree(&clauses);
        let section_id = tree[0].clause.id;
        let leaf_id = tree[1].clause.id;

        let mut expansion = SectionExpansion::new();
        assert!(expansion.auto_expand_once(&tree));
        assert!(expansion.is_expanded(section_id));
        assert!(!expansion.is_expanded(leaf_id));

        // A later refresh must not undo a manual collapse.
        expansion.toggle(section_id);
        assert!(!expansion.auto_expand_once(&tree));
        assert!(!expansion.is_expanded(section_id));
    }
}
