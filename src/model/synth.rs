//! 表达式合成：把有序的选中清单编译成一条 jq 过滤表达式
//!
//! 处理三件事：展示地址段构成的前缀树折叠成对象构造（可选路径压缩，
//! 单链层级折成一个带点复合键）；数组作用域条目按首个 `[]` 前的基址
//! 分组，生成列表构造加逐元素对象构造，组内再递归同样的逻辑；被重新
//! 挂靠的字段通过根绑定变量从原始文档取值。任何可达的选择状态都能
//! 合成出一条合法表达式，空选择即恒等表达式。

use crate::model::path::{self, NodePath, PathSeg};
use crate::model::select::SelectionEntry;

/// 前缀树：叶子存放已渲染完的取值/列表表达式，分支按插入序排列
enum Trie {
    Leaf(String),
    Branch(Vec<(String, Trie)>),
}

/// 组内待处理成员：剩余地址段 + 其选中条目
struct Member<'a> {
    suffix: Vec<PathSeg>,
    entry: &'a SelectionEntry,
}

/// 同一层级内按首现顺序排列的成员：普通字段或嵌套数组组
enum LevelItem<'a> {
    Plain { path: Vec<String>, expr: String },
    Group { base: Vec<PathSeg>, members: Vec<Member<'a>> },
}

/// 把选中清单合成为 jq 表达式
pub fn synthesize(entries: &[SelectionEntry], compress: bool) -> String {
    if entries.is_empty() {
        return ".".to_string();
    }

    let mut sorted: Vec<&SelectionEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.order);

    // 顶层划分：不含 [] 的进前缀树，含 [] 的按基址归组
    let mut plain_children: Vec<(String, Trie)> = Vec::new();
    let mut groups: Vec<(Vec<PathSeg>, Vec<Member>)> = Vec::new();
    for entry in &sorted {
        let Ok(disp) = NodePath::parse(&entry.display_address) else {
            continue;
        };
        match split_at_first_each(disp.segs()) {
            None => {
                let trie_path = field_names(disp.segs());
                if trie_path.is_empty() {
                    // 整个文档被当作叶子选中，直接取全量
                    return ".".to_string();
                }
                let expr = read_expr(entry, disp.segs());
                trie_insert(&mut plain_children, &trie_path, expr);
            }
            Some((base, rest)) => {
                let existing = groups.iter_mut().find_map(|(b, members)| {
                    if *b == base {
                        Some(members)
                    } else {
                        None
                    }
                });
                let member = Member { suffix: rest, entry };
                match existing {
                    Some(members) => members.push(member),
                    None => groups.push((base, vec![member])),
                }
            }
        }
    }

    let mut fragments = Vec::new();
    if !plain_children.is_empty() {
        fragments.push(render_object(&plain_children, compress));
    }
    for (base, members) in groups {
        let list = render_list(&base, members, compress);
        let wrapper = field_names(&base[..base.len() - 1]);
        fragments.push(wrap_fields(&wrapper, list, compress));
    }
    if fragments.is_empty() {
        return ".".to_string();
    }

    let body = fragments.join(" + ");
    if entries.iter().any(|e| e.is_relocated) {
        format!(". as $root | {}", body)
    } else {
        body
    }
}

/// 在首个 [] 标记处切开：返回（含标记的基址段，其后的剩余段）
fn split_at_first_each(segs: &[PathSeg]) -> Option<(Vec<PathSeg>, Vec<PathSeg>)> {
    let idx = segs.iter().position(|s| matches!(s, PathSeg::Each))?;
    Some((segs[..=idx].to_vec(), segs[idx + 1..].to_vec()))
}

fn field_names(segs: &[PathSeg]) -> Vec<String> {
    segs.iter()
        .filter_map(|s| match s {
            PathSeg::Field(k) => Some(k.clone()),
            PathSeg::Each => None,
        })
        .collect()
}

/// 叶子取值表达式：被重挂靠的走根绑定读原始地址，其余相对当前位置读
fn read_expr(entry: &SelectionEntry, rel_suffix: &[PathSeg]) -> String {
    if entry.is_relocated {
        if let Ok(src) = NodePath::parse(&entry.source_address) {
            return path::jq_chain(src.segs(), Some("$root"));
        }
    }
    path::jq_chain(rel_suffix, None)
}

/// 列表构造：迭代基址并对每个元素应用组内对象构造
fn render_list(base: &[PathSeg], members: Vec<Member>, compress: bool) -> String {
    format!("[{} | {}]", path::jq_chain(base, None), render_members(members, compress))
}

/// 组内对象构造：普通后缀与嵌套组共用同一棵前缀树，保持首现顺序
fn render_members(members: Vec<Member>, compress: bool) -> String {
    let mut items: Vec<LevelItem> = Vec::new();
    for m in members {
        match split_at_first_each(&m.suffix) {
            None => {
                let expr = read_expr(m.entry, &m.suffix);
                items.push(LevelItem::Plain {
                    path: field_names(&m.suffix),
                    expr,
                });
            }
            Some((base, rest)) => {
                let nested = Member { suffix: rest, entry: m.entry };
                let existing = items.iter_mut().find_map(|it| match it {
                    LevelItem::Group { base: b, members } if *b == base => Some(members),
                    _ => None,
                });
                match existing {
                    Some(members) => members.push(nested),
                    None => items.push(LevelItem::Group {
                        base,
                        members: vec![nested],
                    }),
                }
            }
        }
    }

    let mut children: Vec<(String, Trie)> = Vec::new();
    for item in items {
        match item {
            LevelItem::Plain { path, expr } => trie_insert(&mut children, &path, expr),
            LevelItem::Group { base, members } => {
                let list = render_list(&base, members, compress);
                let wrapper = field_names(&base[..base.len() - 1]);
                trie_insert(&mut children, &wrapper, list);
            }
        }
    }
    render_object(&children, compress)
}

fn trie_insert(children: &mut Vec<(String, Trie)>, trie_path: &[String], expr: String) {
    let Some((head, rest)) = trie_path.split_first() else {
        return;
    };
    if rest.is_empty() {
        // 地址唯一，同键重复插入只保留先到者
        if !children.iter().any(|(k, _)| k == head) {
            children.push((head.clone(), Trie::Leaf(expr)));
        }
        return;
    }
    let idx = match children.iter().position(|(k, _)| k == head) {
        Some(i) => i,
        None => {
            children.push((head.clone(), Trie::Branch(Vec::new())));
            children.len() - 1
        }
    };
    if let Trie::Branch(sub) = &mut children[idx].1 {
        trie_insert(sub, rest, expr);
    }
}

/// 前缀树折叠成对象构造文本。压缩开启时沿单子链收集键名，
/// 在首个分叉（≥2 子）或叶子处停下，把链拼成一个带点复合键。
fn render_object(children: &[(String, Trie)], compress: bool) -> String {
    let fields: Vec<String> = children
        .iter()
        .map(|(key, node)| {
            if compress {
                let mut keys = vec![key.as_str()];
                let mut cur = node;
                while let Trie::Branch(sub) = cur {
                    if sub.len() != 1 {
                        break;
                    }
                    keys.push(sub[0].0.as_str());
                    cur = &sub[0].1;
                }
                let spelled = object_key(&keys.join("."));
                match cur {
                    Trie::Leaf(expr) => format!("{}: {}", spelled, expr),
                    Trie::Branch(sub) => format!("{}: {}", spelled, render_object(sub, compress)),
                }
            } else {
                match node {
                    Trie::Leaf(expr) => format!("{}: {}", object_key(key), expr),
                    Trie::Branch(sub) => {
                        format!("{}: {}", object_key(key), render_object(sub, compress))
                    }
                }
            }
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// 用外层对象构造包回基址的父级层次
fn wrap_fields(fields: &[String], inner: String, compress: bool) -> String {
    if fields.is_empty() {
        return inner;
    }
    if compress {
        format!("{{{}: {}}}", object_key(&fields.join(".")), inner)
    } else {
        fields
            .iter()
            .rev()
            .fold(inner, |acc, f| format!("{{{}: {}}}", object_key(f), acc))
    }
}

/// 对象键拼写：合法标识符裸写，其余加引号
fn object_key(key: &str) -> String {
    if path::is_jq_ident(key) {
        key.to_string()
    } else {
        path::quote_jq_string(key)
    }
}
