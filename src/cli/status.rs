//! Status 命令 - 一次性拉取并打印 Tilt 资源状态表

use crate::config::MonitorConfig;
use crate::health::classify;
use crate::status::{ResourceStatus, StatusClient};
use anyhow::Result;
use clap::Args;
use std::time::Duration;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

const SEPARATOR: &str = "---+-----------+----------------------+-----------------+---------------";

/// Status 命令参数
#[derive(Args)]
pub struct StatusArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 status 命令
pub async fn handle_status(args: StatusArgs) -> Result<()> {
    let config = MonitorConfig::load()?;
    let client = StatusClient::new(&config)?;
    let resources = client.fetch_status(Some(Duration::from_secs(2))).await?;
    let snapshot = classify(&resources);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "health": snapshot.health,
                "counts": snapshot.counts,
                "resources": resources,
            }))?
        );
        return Ok(());
    }

    print_status_table(&resources);
    let summary = snapshot.counts.summary();
    if summary.is_empty() {
        println!("no resources  [{}]", snapshot.health);
    } else {
        println!("{}  [{}]", summary, snapshot.health);
    }
    Ok(())
}

/// 按标签分组打印资源表，组间加分隔线
fn print_status_table(resources: &[ResourceStatus]) {
    println!("\nTilt Status\n");
    println!("   | Label     | Name                 | Update Status   | Runtime Status");
    println!("{}", SEPARATOR);

    let mut prev_label = resources.first().map(|r| r.label.clone());
    for (i, resource) in resources.iter().enumerate() {
        if prev_label.as_ref() != Some(&resource.label) {
            println!("{}", SEPARATOR);
        }
        println!(
            "{:<2} | {:<9} | {:<20} | {} | {}",
            i + 1,
            resource.label.to_string(),
            resource.name,
            paint(&resource.update_status.to_string()),
            paint(&resource.runtime_status.to_string()),
        );
        prev_label = Some(resource.label.clone());
    }
    println!();
}

/// 状态单元格：定宽大写，按状态着色
fn paint(value: &str) -> String {
    let color = match value {
        "ok" => Some(GREEN),
        "pending" | "in_progress" => Some(YELLOW),
        "error" => Some(RED),
        "n/a" => Some(GRAY),
        _ => None,
    };
    let cell = format!("{:<15}", value.to_uppercase());
    match color {
        Some(color) => format!("{}{}{}", color, cell, RESET),
        None => cell,
    }
}
