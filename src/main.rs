//! 程序入口：解析命令行、装载文档、启动HTTP服务并调起浏览器

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use is_terminal::IsTerminal;
use tokio::sync::Mutex;
use tracing_subscriber::fmt::SubscriberBuilder;

use jq_shaixuan::utils::browser::open_browser;
use jq_shaixuan::utils::fs::list_json_files;
use jq_shaixuan::web;
use jq_shaixuan::AppState;

/// 可视化jq筛选器：树上点选字段，实时合成并执行jq表达式
#[derive(Parser, Debug)]
#[command(name = "jq_shaixuan", version, about)]
struct Cli {
    /// JSON文件或目录；省略时从标准输入读取
    path: Option<PathBuf>,

    /// HTTP服务监听端口
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// 启动后不打开浏览器
    #[arg(long)]
    no_browser: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志输出
    let _ = SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let cli = Cli::parse();
    let mut state = AppState::default();

    match cli.path {
        Some(path) if path.is_dir() => {
            // 目录模式：默认装载名字排前的JSON文件，其余由页面切换
            let files = list_json_files(&path)?;
            let first = files
                .first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("目录中没有JSON文件: {}", path.display()))?;
            state.load_file(&path.join(&first))?;
            state.current_file = Some(first);
            state.dir_path = Some(path);
        }
        Some(path) => {
            state.load_file(&path)?;
        }
        None => {
            if std::io::stdin().is_terminal() {
                anyhow::bail!("未提供输入。用法: jq_shaixuan <文件或目录>，或从管道读入JSON");
            }
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            let dom: serde_json::Value = serde_json::from_str(&buf)?;
            state.load_value(dom);
        }
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let url = format!("http://{}", addr);
    println!("jq筛选器已启动: {}", url);

    if !cli.no_browser {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("打开浏览器失败: {}", e);
        }
    }

    web::serve(addr, Arc::new(Mutex::new(state))).await?;
    Ok(())
}
