//! SystemVerilog emission for the trained ensemble
//!
//! The module shape is fixed: one 16-bit input per named feature, a
//! 2-bit `final_action` output, one combinational block per tree and a
//! shared voter/override block. Tree thresholds are truncated to
//! integers on emission — a documented fidelity loss that is harmless
//! here because every feature is a small integer count, but worth
//! flagging if the trainer ever produces thresholds far from integral.

use crate::{CodegenError, CodegenResult};
use memtriage_ml::forest::argmax_class;
use memtriage_ml::label::{
    REFRESH_COLS_MIN, REFRESH_RATE_MIN_SCALED, SCRUB_DENSITY_FACTOR, SCRUB_ROW_HITS_MIN,
};
use memtriage_ml::{DecisionTree, RandomForest, TreeNode, NUM_FEATURES};
use std::path::Path;
use tracing::info;

/// Module name used when the caller does not pick one
pub const DEFAULT_MODULE_NAME: &str = "ML_engine_RF";

// Positions of the features the hard rule reads, in FEATURE_NAMES order.
const IDX_TOTAL_ERRORS: usize = 0;
const IDX_UNIQUE_ROWS: usize = 4;
const IDX_UNIQUE_COLS: usize = 5;
const IDX_MAX_ROW_HITS: usize = 6;
const IDX_ERROR_RATE: usize = 8;

/// Width in bits of a counter that can hold up to `num_trees` votes,
/// i.e. `ceil(log2(num_trees + 1))`
pub fn vote_counter_width(num_trees: usize) -> u32 {
    usize::BITS - num_trees.leading_zeros()
}

/// Generate the SystemVerilog module text for a trained ensemble
pub fn generate_forest_module(
    forest: &RandomForest,
    feature_names: &[&str],
    module_name: &str,
) -> CodegenResult<String> {
    if forest.trees.is_empty() {
        return Err(CodegenError::EmptyForest);
    }
    if feature_names.len() != NUM_FEATURES {
        return Err(CodegenError::FeatureNames {
            expected: NUM_FEATURES,
            got: feature_names.len(),
        });
    }
    for (tree_id, tree) in forest.trees.iter().enumerate() {
        validate_tree(tree, tree_id, feature_names.len())?;
    }

    let num_trees = forest.trees.len();
    let width = vote_counter_width(num_trees);
    let mut sv = String::new();

    // Module header and ports.
    sv.push_str(&format!("module {} (\n", module_name));
    for name in feature_names {
        sv.push_str(&format!("    input  logic [15:0] {},\n", name));
    }
    sv.push_str("    output logic [1:0]  final_action\n");
    sv.push_str(");\n\n");

    // Per-tree vote signals.
    for tree_id in 0..num_trees {
        sv.push_str(&format!("logic [1:0] vote_{};\n", tree_id));
    }
    sv.push('\n');

    // One combinational block per tree.
    for (tree_id, tree) in forest.trees.iter().enumerate() {
        emit_tree(tree, tree_id, feature_names, &mut sv);
    }

    // Voter, override and final multiplexer.
    sv.push_str("// Majority Voter Logic\n");
    sv.push_str(&format!(
        "logic [{}:0] count_0, count_1, count_2;\n",
        width - 1
    ));
    sv.push_str("logic [1:0] hard_rule_action;\n");
    sv.push_str("logic [1:0] ml_vote;\n");
    sv.push_str("always_comb begin\n");
    sv.push_str(&format!(
        "  count_0 = {w}'d0; count_1 = {w}'d0; count_2 = {w}'d0;\n",
        w = width
    ));
    for tree_id in 0..num_trees {
        for class in 0..3 {
            sv.push_str(&format!(
                "  if (vote_{t} == 2'd{c}) count_{c} = count_{c} + {w}'d1;\n",
                t = tree_id,
                c = class,
                w = width
            ));
        }
    }

    sv.push_str("\n  // --- PARALLEL EXPERT RULES (SAFETY LAYER) ---\n");
    sv.push_str("  // Integer form of unique_rows/total_errors < 0.2, no division needed\n");
    sv.push_str(&format!(
        "  if ({row_hits} >= {hits_min} || ({rows} * {factor} < {total})) begin\n",
        row_hits = feature_names[IDX_MAX_ROW_HITS],
        hits_min = SCRUB_ROW_HITS_MIN,
        rows = feature_names[IDX_UNIQUE_ROWS],
        factor = SCRUB_DENSITY_FACTOR,
        total = feature_names[IDX_TOTAL_ERRORS],
    ));
    sv.push_str("    hard_rule_action = 2'd1; // SCRUB\n");
    sv.push_str(&format!(
        "  end else if ({rate} >= {rate_min} && {cols} >= {cols_min}) begin\n",
        rate = feature_names[IDX_ERROR_RATE],
        rate_min = REFRESH_RATE_MIN_SCALED,
        cols = feature_names[IDX_UNIQUE_COLS],
        cols_min = REFRESH_COLS_MIN,
    ));
    sv.push_str("    hard_rule_action = 2'd2; // REFRESH\n");
    sv.push_str("  end else begin\n");
    sv.push_str("    hard_rule_action = 2'd0; // NO_ACTION\n");
    sv.push_str("  end\n\n");

    sv.push_str("  // --- FINAL DECISION MULTIPLEXER ---\n");
    sv.push_str("  if (count_1 >= count_0 && count_1 >= count_2)\n");
    sv.push_str("    ml_vote = 2'd1; // SCRUB\n");
    sv.push_str("  else if (count_2 >= count_0 && count_2 >= count_1)\n");
    sv.push_str("    ml_vote = 2'd2; // REFRESH\n");
    sv.push_str("  else\n");
    sv.push_str("    ml_vote = 2'd0; // NO_ACTION\n\n");

    sv.push_str("  // Hard rules override ML if triggered, guaranteeing reliability\n");
    sv.push_str("  final_action = (hard_rule_action != 2'd0) ? hard_rule_action : ml_vote;\n");
    sv.push_str("end\n\n");
    sv.push_str("endmodule\n");

    Ok(sv)
}

/// Generate the module and persist it to `path`
///
/// Generation happens fully in memory; the output file is written in
/// one operation, so the handle is flushed and closed on every exit
/// path including generation failure.
pub fn write_forest_module(
    forest: &RandomForest,
    feature_names: &[&str],
    module_name: &str,
    path: &Path,
) -> CodegenResult<()> {
    let sv = generate_forest_module(forest, feature_names, module_name)?;
    std::fs::write(path, sv).map_err(|source| CodegenError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "wrote hardware module '{}' ({} trees) to {}",
        module_name,
        forest.trees.len(),
        path.display()
    );
    Ok(())
}

/// Check arena indices, feature indices and thresholds before emission.
/// A revisited node means the arena has a cycle, which the recursive
/// emitter would never escape.
fn validate_tree(tree: &DecisionTree, tree_id: usize, num_features: usize) -> CodegenResult<()> {
    let malformed = |node| CodegenError::MalformedTree {
        tree: tree_id,
        node,
    };

    if tree.nodes.is_empty() || tree.root >= tree.nodes.len() {
        return Err(malformed(tree.root));
    }

    let mut visited = vec![false; tree.nodes.len()];
    let mut stack = vec![tree.root];
    while let Some(idx) = stack.pop() {
        if visited[idx] {
            return Err(malformed(idx));
        }
        visited[idx] = true;

        match &tree.nodes[idx] {
            TreeNode::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= num_features
                    || !threshold.is_finite()
                    || *left >= tree.nodes.len()
                    || *right >= tree.nodes.len()
                {
                    return Err(malformed(idx));
                }
                stack.push(*left);
                stack.push(*right);
            }
            TreeNode::Leaf { .. } => {}
        }
    }
    Ok(())
}

/// Emit one tree as an always_comb block of nested conditionals
fn emit_tree(tree: &DecisionTree, tree_id: usize, feature_names: &[&str], sv: &mut String) {
    sv.push_str(&format!("// Tree {}\n", tree_id));
    sv.push_str("always_comb begin\n");
    emit_node(tree, tree.root, 0, tree_id, feature_names, sv);
    sv.push_str("end\n\n");
}

fn emit_node(
    tree: &DecisionTree,
    node: usize,
    depth: usize,
    tree_id: usize,
    feature_names: &[&str],
    sv: &mut String,
) {
    let indent = "  ".repeat(depth + 1);
    match &tree.nodes[node] {
        TreeNode::Internal {
            feature,
            threshold,
            left,
            right,
        } => {
            // Deliberate truncation: features are small integer counts.
            let threshold = threshold.trunc() as i64;
            sv.push_str(&format!(
                "{}if ({} <= {}) begin\n",
                indent, feature_names[*feature], threshold
            ));
            emit_node(tree, *left, depth + 1, tree_id, feature_names, sv);
            sv.push_str(&format!("{}end else begin\n", indent));
            emit_node(tree, *right, depth + 1, tree_id, feature_names, sv);
            sv.push_str(&format!("{}end\n", indent));
        }
        TreeNode::Leaf { class_counts } => {
            sv.push_str(&format!(
                "{}vote_{} = 2'd{};\n",
                indent,
                tree_id,
                argmax_class(class_counts)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtriage_ml::FEATURE_NAMES;

    fn leaf(class: usize) -> TreeNode {
        let mut class_counts = [0.0; 3];
        class_counts[class] = 1.0;
        TreeNode::Leaf { class_counts }
    }

    fn stump() -> DecisionTree {
        // max_row_hits <= 63 ? NO_ACTION : SCRUB
        DecisionTree {
            nodes: vec![
                TreeNode::Internal {
                    feature: 6,
                    threshold: 63.5,
                    left: 1,
                    right: 2,
                },
                leaf(0),
                leaf(1),
            ],
            root: 0,
        }
    }

    fn forest(trees: Vec<DecisionTree>) -> RandomForest {
        RandomForest { trees }
    }

    #[test]
    fn test_counter_width_derivation() {
        assert_eq!(vote_counter_width(1), 1);
        assert_eq!(vote_counter_width(2), 2);
        assert_eq!(vote_counter_width(3), 2);
        assert_eq!(vote_counter_width(5), 3);
        assert_eq!(vote_counter_width(15), 4);
        // The fixed 4-bit reference would overflow here.
        assert_eq!(vote_counter_width(16), 5);
    }

    #[test]
    fn test_module_shape() {
        let sv =
            generate_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "ML_engine_RF").unwrap();

        assert!(sv.starts_with("module ML_engine_RF (\n"));
        assert!(sv.contains("    input  logic [15:0] total_errors,\n"));
        assert!(sv.contains("    input  logic [15:0] error_rate_int,\n"));
        assert!(sv.contains("    output logic [1:0]  final_action\n"));
        assert!(sv.ends_with("endmodule\n"));
    }

    #[test]
    fn test_tree_block_and_threshold_truncation() {
        let sv =
            generate_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "ML_engine_RF").unwrap();

        // 63.5 truncates to 63.
        assert!(sv.contains("  if (max_row_hits <= 63) begin\n"));
        assert!(sv.contains("    vote_0 = 2'd0;\n"));
        assert!(sv.contains("    vote_0 = 2'd1;\n"));
    }

    #[test]
    fn test_leaf_vote_is_argmax() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Leaf {
                class_counts: [1.0, 5.0, 2.0],
            }],
            root: 0,
        };
        let sv = generate_forest_module(&forest(vec![tree]), &FEATURE_NAMES, "m").unwrap();
        assert!(sv.contains("  vote_0 = 2'd1;\n"));
    }

    #[test]
    fn test_voter_counter_width_in_text() {
        let trees: Vec<DecisionTree> = (0..5).map(|_| stump()).collect();
        let sv = generate_forest_module(&forest(trees), &FEATURE_NAMES, "m").unwrap();

        assert!(sv.contains("logic [2:0] count_0, count_1, count_2;\n"));
        assert!(sv.contains("  count_0 = 3'd0; count_1 = 3'd0; count_2 = 3'd0;\n"));
        assert!(sv.contains("  if (vote_4 == 2'd2) count_2 = count_2 + 3'd1;\n"));
    }

    #[test]
    fn test_hard_rule_uses_shared_constants() {
        let sv = generate_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "m").unwrap();

        assert!(sv.contains(
            "  if (max_row_hits >= 64 || (unique_rows * 5 < total_errors)) begin\n"
        ));
        assert!(sv.contains("  end else if (error_rate_int >= 50 && unique_cols >= 8) begin\n"));
    }

    #[test]
    fn test_final_mux_gives_override_precedence() {
        let sv = generate_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "m").unwrap();
        assert!(sv.contains(
            "  final_action = (hard_rule_action != 2'd0) ? hard_rule_action : ml_vote;\n"
        ));
        // The voter checks SCRUB first, then REFRESH.
        let scrub_pos = sv.find("count_1 >= count_0 && count_1 >= count_2").unwrap();
        let refresh_pos = sv.find("count_2 >= count_0 && count_2 >= count_1").unwrap();
        assert!(scrub_pos < refresh_pos);
    }

    #[test]
    fn test_empty_forest_rejected() {
        assert!(matches!(
            generate_forest_module(&forest(vec![]), &FEATURE_NAMES, "m"),
            Err(CodegenError::EmptyForest)
        ));
    }

    #[test]
    fn test_feature_name_count_checked() {
        let names = ["a", "b"];
        assert!(matches!(
            generate_forest_module(&forest(vec![stump()]), &names, "m"),
            Err(CodegenError::FeatureNames { expected: 9, got: 2 })
        ));
    }

    #[test]
    fn test_malformed_child_index() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Internal {
                feature: 0,
                threshold: 1.0,
                left: 7,
                right: 8,
            }],
            root: 0,
        };
        match generate_forest_module(&forest(vec![tree]), &FEATURE_NAMES, "m") {
            Err(CodegenError::MalformedTree { tree: 0, node: 0 }) => {}
            other => panic!("expected MalformedTree, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_cycle() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Internal {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 1,
                },
                leaf(0),
            ],
            root: 0,
        };
        assert!(matches!(
            generate_forest_module(&forest(vec![tree]), &FEATURE_NAMES, "m"),
            Err(CodegenError::MalformedTree { tree: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Internal {
                    feature: 0,
                    threshold: f64::NAN,
                    left: 1,
                    right: 2,
                },
                leaf(0),
                leaf(1),
            ],
            root: 0,
        };
        assert!(matches!(
            generate_forest_module(&forest(vec![tree]), &FEATURE_NAMES, "m"),
            Err(CodegenError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ML_engine_RF.sv");

        write_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "ML_engine_RF", &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("endmodule"));
    }

    #[test]
    fn test_write_error_carries_path() {
        let path = Path::new("/nonexistent-dir/out.sv");
        match write_forest_module(&forest(vec![stump()]), &FEATURE_NAMES, "m", path) {
            Err(CodegenError::Write { path: p, .. }) => {
                assert_eq!(p, Path::new("/nonexistent-dir/out.sv"))
            }
            other => panic!("expected Write error, got {other:?}"),
        }
    }
}
