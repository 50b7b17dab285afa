// ==========================================
// 服务排程编排系统 - 命令行入口
// ==========================================
// 用法:
//   service-visit-aps [--config <file.json>] [--json-logs] \
//       <data_dir> <contract> <installation> <service_type> <start> <end>
// 结果（正式排程 + 全部运行 + 表现对比）以 JSON 输出到 stdout
// ==========================================

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use service_visit_aps::api::parse_date;
use service_visit_aps::app::AppState;
use service_visit_aps::config::SchedulerConfig;
use service_visit_aps::domain::ScheduleRequest;
use service_visit_aps::logging;

#[derive(Parser, Debug)]
#[command(name = "service-visit-aps")]
#[command(about = "服务排程编排系统 - 多策略合作方选择与访问日历生成")]
#[command(version)]
struct Cli {
    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 以 JSON 格式输出日志
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// CSV 数据目录（partners/installations/contracts[/history].csv）
    data_dir: PathBuf,
    contract: String,
    installation: String,
    service_type: String,
    /// 开始日期 YYYY-MM-DD
    start: String,
    /// 结束日期 YYYY-MM-DD
    end: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("服务排程编排系统 版本 {}", service_visit_aps::VERSION);

    let config = SchedulerConfig::load(cli.config.as_deref()).context("加载配置失败")?;

    let request = ScheduleRequest::new(
        cli.contract.as_str(),
        cli.installation.as_str(),
        cli.service_type.as_str(),
        parse_date("start_date", &cli.start)?,
        parse_date("end_date", &cli.end)?,
    );

    let state = AppState::from_data_dir(&cli.data_dir, config)
        .await
        .context("初始化应用状态失败")?;
    tracing::info!(db_path = %state.db_path, "使用数据库");

    let outcome = state.schedule_api.generate_schedule(&request).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags_and_positionals() {
        let cli = Cli::try_parse_from([
            "service-visit-aps",
            "--config",
            "aps.json",
            "--json-logs",
            "./data",
            "CT-1",
            "INST-1",
            "medical_surveillance",
            "2026-03-01",
            "2026-03-31",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("aps.json")));
        assert!(cli.json_logs);
        assert_eq!(cli.data_dir, PathBuf::from("./data"));
        assert_eq!(cli.service_type, "medical_surveillance");
        assert_eq!(cli.end, "2026-03-31");
    }

    #[test]
    fn test_cli_rejects_missing_positionals() {
        assert!(Cli::try_parse_from(["service-visit-aps", "./data", "CT-1"]).is_err());
    }
}
