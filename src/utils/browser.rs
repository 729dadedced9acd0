//! 浏览器调起：按平台选择命令打开本地地址

use std::io;
use std::process::Command;

/// 调起系统默认浏览器打开指定地址
pub fn open_browser(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let spawned = Command::new("open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let spawned = Command::new("rundll32")
        .args(["url.dll,FileProtocolHandler", url])
        .spawn();
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let spawned = Command::new("xdg-open").arg(url).spawn();

    spawned.map(|_| ())
}
