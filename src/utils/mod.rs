//! 通用工具：文件IO与浏览器调起

pub mod browser;
pub mod fs;
