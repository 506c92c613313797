//! Memo Notifier CLI
//!
//! 诊断 webhook 配置：分类、点菜摘要预览、测试投递、按配置文件分发

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use memo_notifier::notification::{
    summarize_order, summarize_order_detailed, InMemoryWebhookStore, JsonFileWebhookStore,
};
use memo_notifier::{classify, ActivityType, DispatchConfig, Memo, NotificationBuilder, WebhookConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "memo-notify")]
#[command(about = "Memo Notifier - memo 事件 webhook 分发工具")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/memo-notifier/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 判断 webhook 地址的协议类型
    Classify {
        /// webhook 地址
        locator: String,
    },
    /// 预览点菜摘要（从文件或 stdin 读取 memo 正文）
    Summarize {
        /// memo 正文文件，省略则读 stdin
        file: Option<PathBuf>,
        /// 输出包含点菜人、时间的详细版本
        #[arg(long)]
        detailed: bool,
    },
    /// 向单个 webhook 发送测试通知
    Test {
        /// webhook 地址
        locator: String,
        /// 测试正文
        #[arg(long, short, default_value = "")]
        content: String,
    },
    /// 按 webhook 配置文件分发一条 memo 事件
    Dispatch {
        /// webhook 配置文件 `{"<user_id>": [{"id","url"}]}`
        #[arg(long)]
        store: PathBuf,
        /// memo 创建者
        #[arg(long, default_value = "users/1")]
        creator: String,
        /// 活动类型
        #[arg(long, default_value = "memos.memo.created")]
        activity: String,
        /// memo 正文
        #[arg(long)]
        content: String,
        /// memo 摘要
        #[arg(long, default_value = "")]
        snippet: String,
        /// 退出前等待后台投递的秒数
        #[arg(long, default_value = "35")]
        wait: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<DispatchConfig> {
    match path {
        Some(p) => {
            let mut config = DispatchConfig::from_file(p)?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Ok(DispatchConfig::auto_load()),
    }
}

fn read_content(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(p) => Ok(std::fs::read_to_string(p)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("memo_notifier=info,memo_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { locator } => {
            let dest = classify(&locator);
            println!("type:     {}", dest.kind);
            println!("target:   {}", dest.target);
            println!("host key: {}", dest.host_key());
        }
        Commands::Summarize { file, detailed } => {
            let content = read_content(file.as_ref())?;
            let summary = if detailed {
                summarize_order_detailed(&content)
            } else {
                summarize_order(&content)
            };
            match summary {
                Some(text) => println!("{}", text),
                None => return Err(anyhow!("no order summary (missing #order tag or no items)")),
            }
        }
        Commands::Test { locator, content } => {
            let config = load_config(cli.config.as_ref())?;
            let service = NotificationBuilder::new(Arc::new(InMemoryWebhookStore::new()))
                .config(config)
                .build()?;
            let webhook = WebhookConfig::new("cli", locator);
            let report = service.test_dispatch_report(&webhook, &content).await?;
            for attempt in &report.attempts {
                println!(
                    "attempt {} ({} ms): {:?}",
                    attempt.index,
                    attempt.elapsed.as_millis(),
                    attempt.outcome
                );
            }
            match report.into_result() {
                Ok(()) => println!("✅ delivered"),
                Err(e) => return Err(anyhow!("delivery failed: {}", e)),
            }
        }
        Commands::Dispatch { store, creator, activity, content, snippet, wait } => {
            let config = load_config(cli.config.as_ref())?;
            let service = NotificationBuilder::new(Arc::new(JsonFileWebhookStore::new(store)))
                .config(config)
                .build()?;
            let memo = Memo::new(creator, content).with_snippet(snippet);
            let scheduled = service.dispatch(memo, ActivityType::parse(&activity)).await?;
            println!("scheduled {} webhook(s)", scheduled);
            if scheduled > 0 && wait > 0 {
                // 投递在后台任务中进行，进程退出会中断未完成的投递
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
        }
    }

    Ok(())
}
