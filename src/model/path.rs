//! 路径模型：以 `$` 为根的规范节点地址
//!
//! 地址语法：根节点为 `$`；对象子节点 `父.键`；数组模板子节点 `父[].键`。
//! `[]` 是数组作用域标记（"对数组的每个元素"），用于区分模板地址与具体下标。
//! 键名含特殊字符时使用 bracket-notation（`$['键 名']`），与影子树一致。

use std::fmt;

use thiserror::Error;

/// 地址片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    /// 字段访问
    Field(String),
    /// 数组逐元素标记 `[]`
    Each,
}

/// 解析后的节点地址（不含根标记 `$` 本身）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePath {
    segs: Vec<PathSeg>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("地址必须以 $ 开头: {0}")]
    MissingRoot(String),
    #[error("地址在第 {0} 字符处无法解析")]
    Malformed(usize),
    #[error("bracket-notation 未闭合")]
    UnclosedBracket,
}

/// 键名是否可以用点号直接拼接（与影子树的判定一致，空键必须走 bracket-notation）
fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 单个字段片段的地址拼写
fn render_field(key: &str) -> String {
    if is_plain_key(key) {
        format!(".{}", key)
    } else {
        format!("['{}']", key.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

impl NodePath {
    /// 解析规范地址字符串
    pub fn parse(addr: &str) -> Result<Self, PathError> {
        let rest = addr
            .strip_prefix('$')
            .ok_or_else(|| PathError::MissingRoot(addr.to_string()))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segs = Vec::new();
        let mut i = 0usize;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    // 点号后跟普通键名
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    if end == start {
                        return Err(PathError::Malformed(i));
                    }
                    segs.push(PathSeg::Field(chars[start..end].iter().collect()));
                    i = end;
                }
                '[' => {
                    if i + 1 < chars.len() && chars[i + 1] == ']' {
                        segs.push(PathSeg::Each);
                        i += 2;
                        continue;
                    }
                    // bracket-notation: ['键名']，键名内 \' 与 \\ 为转义
                    if i + 1 >= chars.len() || chars[i + 1] != '\'' {
                        return Err(PathError::Malformed(i));
                    }
                    let mut j = i + 2;
                    let mut key = String::new();
                    loop {
                        if j >= chars.len() {
                            return Err(PathError::UnclosedBracket);
                        }
                        match chars[j] {
                            '\\' if j + 1 < chars.len() => {
                                key.push(chars[j + 1]);
                                j += 2;
                            }
                            '\'' => break,
                            c => {
                                key.push(c);
                                j += 1;
                            }
                        }
                    }
                    if j + 1 >= chars.len() || chars[j + 1] != ']' {
                        return Err(PathError::UnclosedBracket);
                    }
                    segs.push(PathSeg::Field(key));
                    i = j + 2;
                }
                _ => return Err(PathError::Malformed(i)),
            }
        }
        Ok(Self { segs })
    }

    pub fn from_segs(segs: Vec<PathSeg>) -> Self {
        Self { segs }
    }

    pub fn segs(&self) -> &[PathSeg] {
        &self.segs
    }

    pub fn is_root(&self) -> bool {
        self.segs.is_empty()
    }

    /// 末段字段名（Each 标记不算字段）
    pub fn last_field(&self) -> Option<&str> {
        match self.segs.last() {
            Some(PathSeg::Field(k)) => Some(k),
            _ => None,
        }
    }

    /// self 是否为 other 的前缀（含相等）；按片段比较，`$.a` 不是 `$.ab` 的前缀
    pub fn is_prefix_of(&self, other: &NodePath) -> bool {
        other.segs.len() >= self.segs.len() && other.segs[..self.segs.len()] == self.segs[..]
    }

    /// 去掉前缀后剩余的片段；前缀不匹配时返回 None
    pub fn strip_prefix(&self, prefix: &NodePath) -> Option<Vec<PathSeg>> {
        if prefix.is_prefix_of(self) {
            Some(self.segs[prefix.segs.len()..].to_vec())
        } else {
            None
        }
    }

    /// 在末尾追加片段，返回新地址
    pub fn join(&self, suffix: &[PathSeg]) -> NodePath {
        let mut segs = self.segs.clone();
        segs.extend_from_slice(suffix);
        NodePath { segs }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.segs {
            match seg {
                PathSeg::Field(k) => write!(f, "{}", render_field(k))?,
                PathSeg::Each => write!(f, "[]")?,
            }
        }
        Ok(())
    }
}

/// 对象子节点的规范地址
pub fn object_child(parent: &str, key: &str) -> String {
    format!("{}{}", parent, render_field(key))
}

/// 数组模板子节点的规范地址
pub fn array_child(parent: &str, key: &str) -> String {
    format!("{}[]{}", parent, render_field(key))
}

/// ancestor 是否为 addr 的真祖先（不含相等）
pub fn is_strict_descendant(addr: &str, ancestor: &str) -> bool {
    match (NodePath::parse(addr), NodePath::parse(ancestor)) {
        (Ok(a), Ok(b)) => b.is_prefix_of(&a) && a.segs().len() > b.segs().len(),
        _ => false,
    }
}

/// 把 addr 从 old_base 前缀改挂到 new_base 下；前缀不匹配时返回 None
pub fn rebase(addr: &str, old_base: &str, new_base: &str) -> Option<String> {
    let addr = NodePath::parse(addr).ok()?;
    let old_base = NodePath::parse(old_base).ok()?;
    let new_base = NodePath::parse(new_base).ok()?;
    let suffix = addr.strip_prefix(&old_base)?;
    Some(new_base.join(&suffix).to_string())
}

// === jq 拼写辅助 ===

/// 是否可作为 jq 的裸标识符（对象键/字段访问不加引号）
pub fn is_jq_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// jq 字符串字面量（带引号与转义）
pub fn quote_jq_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 把片段序列渲染成 jq 字段访问链。
///
/// base 为 None 时从当前输入 `.` 出发（空链即恒等 `.`）；
/// base 为变量名（如 `$root`）时从该变量出发读取原始文档。
pub fn jq_chain(segs: &[PathSeg], base: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(var) = base {
        out.push_str(var);
    }
    for seg in segs {
        match seg {
            PathSeg::Field(k) => {
                if is_jq_ident(k) {
                    out.push('.');
                    out.push_str(k);
                } else {
                    if out.is_empty() {
                        out.push('.');
                    }
                    out.push('[');
                    out.push_str(&quote_jq_string(k));
                    out.push(']');
                }
            }
            PathSeg::Each => {
                if out.is_empty() {
                    out.push('.');
                }
                out.push_str("[]");
            }
        }
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}
