use explorer_hub_core::view::{NodeState, ViewTree};
use std::fmt::Write;

fn marker(state: NodeState) -> char {
    match state {
        NodeState::Open => '-',
        NodeState::Closed => '+',
        NodeState::Leaf => ' ',
    }
}

/// One line per emitted node, indented by depth.
pub fn render_tree(view: &ViewTree) -> String {
    let mut out = String::new();
    for row in view.rows() {
        let _ = writeln!(
            out,
            "{}{} {} [{}]",
            "  ".repeat(row.depth),
            marker(row.state),
            row.name,
            row.key
        );
    }
    out
}
