use std::cmp::Ordering;

use files_core::{Node, NodeKind, NodeSort, User};

/// Composite ordering used by every sorted list view.
///
/// Size sorts compare sizes only, with folders counted as empty. Every other
/// criterion ranks folders before files (files first for `TypeDesc`) and only
/// then applies the requested field. Names compare case-insensitively.
pub fn compare_nodes(a: &Node, b: &Node, sort: NodeSort) -> Ordering {
    if sort.is_size() {
        return compare_fields(a, b, sort);
    }
    compare_kinds(a.kind, b.kind, sort).then_with(|| compare_fields(a, b, sort))
}

/// Index at which `node` must be inserted into the already sorted `nodes`,
/// i.e. the first element `node` must precede. An entry with the same id
/// as `node` is skipped, so the index is relative to the list without it.
///
/// Placement is one-sided on kind: a file never goes ahead of a folder, but
/// a folder meeting files is placed among them by the sort field alone, so a
/// folder `b` inserted into files `a.txt`, `c.txt` lands between them.
///
/// `None` means no cached element follows `node`: its global position is
/// unknown and callers append it to the unordered tail.
pub fn add_node_in_sorted_list<'a, I>(nodes: I, node: &Node, sort: NodeSort) -> Option<usize>
where
    I: IntoIterator<Item = &'a Node>,
{
    nodes
        .into_iter()
        .filter(|existing| existing.id != node.id)
        .position(|existing| precedes(node, existing, sort))
}

fn precedes(candidate: &Node, existing: &Node, sort: NodeSort) -> bool {
    if sort.is_size() || candidate.kind == existing.kind {
        return compare_nodes(candidate, existing, sort) == Ordering::Less;
    }
    if compare_kinds(candidate.kind, existing.kind, sort) == Ordering::Greater {
        return false;
    }
    compare_fields(candidate, existing, sort) == Ordering::Less
}

fn compare_kinds(a: NodeKind, b: NodeKind, sort: NodeSort) -> Ordering {
    let ord = kind_rank(a).cmp(&kind_rank(b));
    if sort == NodeSort::TypeDesc {
        ord.reverse()
    } else {
        ord
    }
}

fn compare_fields(a: &Node, b: &Node, sort: NodeSort) -> Ordering {
    let ord = match sort {
        NodeSort::NameAsc | NodeSort::NameDesc => compare_names(&a.name, &b.name),
        NodeSort::UpdatedAtAsc | NodeSort::UpdatedAtDesc => a.updated_at.cmp(&b.updated_at),
        NodeSort::SizeAsc | NodeSort::SizeDesc => a.effective_size().cmp(&b.effective_size()),
        NodeSort::OwnerAsc | NodeSort::OwnerDesc => {
            compare_users(a.owner.as_ref(), b.owner.as_ref())
        }
        NodeSort::LastEditorAsc | NodeSort::LastEditorDesc => {
            compare_users(a.last_editor.as_ref(), b.last_editor.as_ref())
        }
        // Type sorts fall back to ascending names.
        NodeSort::TypeAsc | NodeSort::TypeDesc => return compare_names(&a.name, &b.name),
    };
    if sort.is_descending() { ord.reverse() } else { ord }
}

fn kind_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Folder => 0,
        NodeKind::File => 1,
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn compare_users(a: Option<&User>, b: Option<&User>) -> Ordering {
    let name = |user: Option<&User>| user.map(|u| u.full_name.to_lowercase()).unwrap_or_default();
    name(a).cmp(&name(b))
}
