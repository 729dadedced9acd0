//! 选择收集：按当前展示顺序深度优先遍历，产出有序的选中叶子清单
//!
//! 遍历顺序就是输出字段顺序的唯一权威。每个条目同时携带展示地址
//! （决定输出形状）与来源地址（决定从原始文档哪里取值）。

use crate::model::mutate::{self, MoveRecord};
use crate::model::tree::TreeNode;

/// 一次收集产出的选中条目，随每次选择或变更事件整体重算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    /// 变更后树中的当前地址
    pub display_address: String,
    /// 原始文档中的取值地址
    pub source_address: String,
    /// 输出对象里使用的键名
    pub field_name: String,
    /// 深度优先先序遍历中的访问名次
    pub order: usize,
    /// 展示地址与来源地址不一致即视为被重新挂靠
    pub is_relocated: bool,
}

/// 收集当前树的全部选中叶子，顺序即深度优先先序
pub fn collect_selected(root: &TreeNode, records: &[MoveRecord]) -> Vec<SelectionEntry> {
    let mut out = Vec::new();
    walk(root, records, &mut out);
    out
}

fn walk(node: &TreeNode, records: &[MoveRecord], out: &mut Vec<SelectionEntry>) {
    if node.is_leaf() && node.selected {
        let source = mutate::resolve_source(&node.address, records);
        out.push(SelectionEntry {
            display_address: node.address.clone(),
            is_relocated: source != node.address,
            source_address: source,
            field_name: node.key.clone(),
            order: out.len(),
        });
    }
    for child in &node.children {
        walk(child, records, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mutate::{move_into, reorder};
    use crate::model::tree::build_tree;
    use serde_json::json;

    fn select(tree: &mut TreeNode, addr: &str) {
        tree.find_mut(addr).expect("节点应该存在").selected = true;
    }

    #[test]
    fn test_collect_follows_display_order() {
        let json = json!({"a": 1, "b": {"c": 2}, "d": 3});
        let mut tree = build_tree(&json);
        select(&mut tree, "$.a");
        select(&mut tree, "$.b.c");
        select(&mut tree, "$.d");

        let entries = collect_selected(&tree, &[]);
        let addrs: Vec<&str> = entries.iter().map(|e| e.display_address.as_str()).collect();
        assert_eq!(addrs, vec!["$.a", "$.b.c", "$.d"], "先序遍历决定顺序");
        assert_eq!(entries[0].order, 0);
        assert_eq!(entries[2].order, 2);
        assert!(entries.iter().all(|e| !e.is_relocated));
        assert!(entries.iter().all(|e| e.source_address == e.display_address));
    }

    #[test]
    fn test_reorder_changes_collection_order() {
        let json = json!({"a": 1, "b": 2});
        let mut tree = build_tree(&json);
        select(&mut tree, "$.a");
        select(&mut tree, "$.b");

        assert!(reorder(&mut tree, "$.b", "$.a", false));
        let entries = collect_selected(&tree, &[]);
        let names: Vec<&str> = entries.iter().map(|e| e.field_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"], "重排后收集顺序应该跟着变");
    }

    #[test]
    fn test_moved_leaf_resolves_source() {
        let json = json!({"meta": {"owner": "甲"}, "items": [{"x": 1}]});
        let mut tree = build_tree(&json);
        let mut records = Vec::new();

        assert!(move_into(&mut tree, &mut records, "$.meta.owner", "$.items"));
        select(&mut tree, "$.items[].owner");

        let entries = collect_selected(&tree, &records);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_address, "$.items[].owner");
        assert_eq!(entries[0].source_address, "$.meta.owner");
        assert!(entries[0].is_relocated);
    }

    #[test]
    fn test_moved_subtree_resolves_deep_leaves() {
        let json = json!({"a": {"b": {"c": 1, "d": 2}}, "dst": {"k": 0}});
        let mut tree = build_tree(&json);
        let mut records = Vec::new();

        assert!(move_into(&mut tree, &mut records, "$.a", "$.dst"));
        select(&mut tree, "$.dst.a.b.c");
        select(&mut tree, "$.dst.a.b.d");

        let entries = collect_selected(&tree, &records);
        assert_eq!(entries[0].source_address, "$.a.b.c", "任意深度都应解析回移动前地址");
        assert_eq!(entries[1].source_address, "$.a.b.d");
        assert!(entries.iter().all(|e| e.is_relocated));
    }

    #[test]
    fn test_only_selected_leaves_collected() {
        let json = json!({"a": {"b": 1}, "c": 2});
        let mut tree = build_tree(&json);
        select(&mut tree, "$.c");

        let entries = collect_selected(&tree, &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name, "c");

        let empty = collect_selected(&build_tree(&json), &[]);
        assert!(empty.is_empty(), "未选择时清单应该为空");
    }
}
