//! 核心数据模型：树、地址、编辑与表达式合成

pub mod data_core;
pub mod mutate;
pub mod path;
pub mod select;
pub mod synth;
pub mod tree;
