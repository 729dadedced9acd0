//! 变更引擎：对文档树施加同级重排与跨容器移动，并维护移动溯源记录
//!
//! 两类操作都遵循"前置条件不满足即静默无操作"的约定，调用方通过返回的
//! bool 判断是否生效。地址编码的是键链而非下标，因此重排不改任何地址，
//! 只改遍历顺序；移动则对整棵被移子树做前缀替换式的地址重写。

use crate::model::path::{self, NodePath};
use crate::model::tree::{NodeKind, TreeNode};

/// 移动溯源记录。`original_address` 在节点第一次被移动时固定，
/// 之后再移动只更新挂靠信息，保证来源解析始终一跳可达。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    /// 任何移动发生前的原始地址，建后不再变
    pub original_address: String,
    /// 当前挂靠的容器地址
    pub new_parent_address: String,
    /// 当前在容器中的键名
    pub key: String,
}

impl MoveRecord {
    /// 该记录对应节点当前可能的展示地址（对象挂靠与数组挂靠两种拼法）
    fn display_candidates(&self) -> [String; 2] {
        [
            path::object_child(&self.new_parent_address, &self.key),
            path::array_child(&self.new_parent_address, &self.key),
        ]
    }
}

/// 同级重排：把 from 节点移到 to 节点之前或之后。
/// 两者必须是同一父节点的子节点，否则不做任何事。
pub fn reorder(root: &mut TreeNode, from: &str, to: &str, insert_after: bool) -> bool {
    if from == to {
        return false;
    }
    let Some(parent) = parent_of_mut(root, from) else {
        return false;
    };
    let from_idx = match parent.children.iter().position(|c| c.address == from) {
        Some(i) => i,
        None => return false,
    };
    let to_idx = match parent.children.iter().position(|c| c.address == to) {
        Some(i) => i,
        None => return false,
    };

    let node = parent.children.remove(from_idx);
    let base = if to_idx > from_idx { to_idx - 1 } else { to_idx };
    let insert_at = if insert_after { base + 1 } else { base };
    parent.children.insert(insert_at, node);
    tracing::debug!("重排节点 {} 到 {} {}", from, to, if insert_after { "之后" } else { "之前" });
    true
}

/// 跨容器移动：把 from 子树摘下挂到 target 容器内。
/// 拒绝的情形：目标即自身、目标在被移子树内、根节点、地址不存在、目标是叶子。
pub fn move_into(root: &mut TreeNode, records: &mut Vec<MoveRecord>, from: &str, target: &str) -> bool {
    if from == target || from == "$" {
        return false;
    }
    if path::is_strict_descendant(target, from) {
        return false;
    }
    let from_key = match root.find(from) {
        Some(n) => n.key.clone(),
        None => return false,
    };
    let new_addr = match root.find(target) {
        Some(t) => match t.kind {
            NodeKind::Object => path::object_child(target, &from_key),
            NodeKind::Array => path::array_child(target, &from_key),
            NodeKind::Leaf => return false,
        },
        None => return false,
    };

    // 先解析出真正的原始地址，upsert 时记录一跳内可达的来源
    let original = resolve_source(from, records);

    let Some(mut node) = root.detach(from) else {
        return false;
    };
    rewrite_addresses(&mut node, from, &new_addr);

    // 前置检查已确认目标存在且不在被移子树内，挂接必然成功
    if let Some(t) = root.find_mut(target) {
        t.children.push(node);
        t.expanded = true;
    }

    rebase_records(records, from, &new_addr);
    upsert_record(records, from, target, &from_key, original);
    tracing::debug!("移动节点 {} 到容器 {}，新地址 {}", from, target, new_addr);
    true
}

/// 把展示地址解析回原始文档地址：在记录中找展示前缀的最长匹配，
/// 命中则用原始地址替换该前缀；无匹配时展示地址即来源地址。
pub fn resolve_source(display: &str, records: &[MoveRecord]) -> String {
    let Ok(disp) = NodePath::parse(display) else {
        return display.to_string();
    };

    let mut best_len = 0usize;
    let mut best: Option<String> = None;
    for rec in records {
        for cand in rec.display_candidates() {
            let Ok(cand_path) = NodePath::parse(&cand) else {
                continue;
            };
            let Some(suffix) = disp.strip_prefix(&cand_path) else {
                continue;
            };
            let Ok(orig) = NodePath::parse(&rec.original_address) else {
                continue;
            };
            if best.is_none() || cand_path.segs().len() > best_len {
                best_len = cand_path.segs().len();
                best = Some(orig.join(&suffix).to_string());
            }
        }
    }
    best.unwrap_or_else(|| display.to_string())
}

/// 找到直接持有 addr 子节点的父节点
fn parent_of_mut<'a>(node: &'a mut TreeNode, addr: &str) -> Option<&'a mut TreeNode> {
    if node.children.iter().any(|c| c.address == addr) {
        return Some(node);
    }
    node.children.iter_mut().find_map(|c| parent_of_mut(c, addr))
}

/// 对整棵子树做地址前缀替换
fn rewrite_addresses(node: &mut TreeNode, old_base: &str, new_base: &str) {
    if let Some(rebased) = path::rebase(&node.address, old_base, new_base) {
        node.address = rebased;
    }
    for child in &mut node.children {
        rewrite_addresses(child, old_base, new_base);
    }
}

/// 被移子树内部若藏着此前移动产生的记录，其挂靠地址要跟着子树一起改写；
/// 原始地址永不改动
fn rebase_records(records: &mut [MoveRecord], old_base: &str, new_base: &str) {
    for rec in records.iter_mut() {
        let under_moved = rec
            .display_candidates()
            .iter()
            .any(|cand| path::is_strict_descendant(cand, old_base));
        if under_moved {
            if let Some(parent) = path::rebase(&rec.new_parent_address, old_base, new_base) {
                rec.new_parent_address = parent;
            }
        }
    }
}

/// 以被移节点当前展示地址为键做 upsert：已有记录只改挂靠，原始地址保留
fn upsert_record(records: &mut Vec<MoveRecord>, from: &str, target: &str, key: &str, original: String) {
    let existing = records
        .iter_mut()
        .find(|r| r.display_candidates().iter().any(|cand| cand == from));
    match existing {
        Some(rec) => {
            rec.new_parent_address = target.to_string();
            rec.key = key.to_string();
        }
        None => records.push(MoveRecord {
            original_address: original,
            new_parent_address: target.to_string(),
            key: key.to_string(),
        }),
    }
}
