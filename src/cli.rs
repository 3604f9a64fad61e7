//! 命令行入口
//!
//! 不带子命令时等同于 `run`，启动常驻服务。其余子命令一次性执行后退出，
//! 结果以 JSON 打印到标准输出。

use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::cache::{purge_all, sweep_expired, EvictionReport};
use crate::error::AppError;
use crate::settings::{default_settings_path, SettingsStore};
use crate::storage::cache_dir_info;

#[derive(Parser, Debug)]
#[command(name = "picpaste")]
#[command(version, about = "Saves clipboard images as files so terminals can paste them")]
pub struct Cli {
    /// 设置文件路径（默认为数据目录下的 PicPaste/settings.json）
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    #[command(about = "Start watching the clipboard (default)")]
    Run,
    #[command(about = "Print cache directory path, file count and total size")]
    Info,
    #[command(about = "Delete cached files older than the retention period")]
    Sweep,
    #[command(about = "Delete every cached file")]
    Purge,
    #[command(about = "Print the effective settings")]
    Settings,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// 生效的设置文件路径
    pub fn settings_path(&self) -> Result<PathBuf, AppError> {
        match &self.settings {
            Some(path) => Ok(path.clone()),
            None => default_settings_path(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportOutput {
    removed: usize,
    failed: Vec<String>,
}

impl From<EvictionReport> for ReportOutput {
    fn from(report: EvictionReport) -> Self {
        Self {
            removed: report.removed.len(),
            failed: report
                .failed
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }
}

/// 执行一次性子命令，返回要打印的 JSON
pub fn execute_oneshot(command: Command, store: &SettingsStore) -> Result<String, AppError> {
    let settings = store.current();
    let output = match command {
        Command::Info => serde_json::to_string_pretty(&cache_dir_info(&settings.save_path))?,
        Command::Sweep => {
            let report = sweep_expired(&settings.cache_config(), Local::now());
            serde_json::to_string_pretty(&ReportOutput::from(report))?
        }
        Command::Purge => {
            let report = purge_all(&settings.save_path);
            serde_json::to_string_pretty(&ReportOutput::from(report))?
        }
        Command::Settings => serde_json::to_string_pretty(settings)?,
        Command::Run => return Err(AppError::Unsupported("run 不是一次性命令")),
    };
    Ok(output)
}
