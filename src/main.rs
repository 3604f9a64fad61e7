// 防止在 Windows 发布版本中显示额外的控制台窗口，不要删除！
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! # PicPaste 应用入口
//!
//! 本文件仅负责命令行解析、日志初始化与致命错误上报。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::fs::{self, OpenOptions};
use std::path::Path;

use clap::Parser;
use env_logger::{Builder, Env, Target};

use picpaste::app;
use picpaste::cli::{execute_oneshot, Cli, Command};
use picpaste::error::AppError;
use picpaste::settings::{AppSettings, SettingsStore};

const LOG_FILE_NAME: &str = "log.txt";

/// 在完整加载设置之前只读取日志开关，缺失或损坏时视为开启
fn logging_enabled(settings_path: &Path) -> bool {
    fs::read_to_string(settings_path)
        .ok()
        .and_then(|content| serde_json::from_str::<AppSettings>(&content).ok())
        .map(|settings| settings.enable_logging)
        .unwrap_or(true)
}

fn init_logging(settings_path: &Path, to_file: bool) {
    if !to_file {
        Builder::from_env(Env::default().default_filter_or("warn")).init();
        return;
    }

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    let log_path = settings_path
        .parent()
        .map(|dir| dir.join(LOG_FILE_NAME))
        .unwrap_or_else(|| LOG_FILE_NAME.into());
    if let Some(dir) = log_path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            builder.target(Target::Pipe(Box::new(file)));
        }
        Err(err) => eprintln!("无法打开日志文件 {}: {}", log_path.display(), err),
    }
    builder.init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    let settings_path = cli.settings_path()?;
    let command = cli.command();
    init_logging(
        &settings_path,
        command == Command::Run && logging_enabled(&settings_path),
    );

    let store = SettingsStore::open(settings_path)?;
    if command != Command::Run {
        println!("{}", execute_oneshot(command, &store)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(app::run_service(store))
}

#[cfg(target_os = "windows")]
fn report_fatal(err: &AppError) {
    use windows::core::PCWSTR;
    use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};

    let text: Vec<u16> = format!("PicPaste 启动失败：{}", err)
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let caption: Vec<u16> = "PicPaste".encode_utf16().chain(std::iter::once(0)).collect();
    unsafe {
        let _ = MessageBoxW(
            None,
            PCWSTR(text.as_ptr()),
            PCWSTR(caption.as_ptr()),
            MB_OK | MB_ICONERROR,
        );
    }
}

#[cfg(not(target_os = "windows"))]
fn report_fatal(err: &AppError) {
    eprintln!("PicPaste 启动失败：{}", err);
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("❌ 致命错误: {}", err);
        report_fatal(&err);
        std::process::exit(1);
    }
}
