//! ISARA 桥接程序
//!
//! 连接机器人控制器的两条链路，把状态发布到通道表，并从标准输入读取通道写入。

mod config;
mod console;

use anyhow::{Context, Result};
use clap::Parser;
use config::BridgeConfig;
use console::ConsoleCommand;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use isara_client::IsaraClient;
use isara_driver::channels::names;
use isara_driver::{ChannelBoard, IsaraBuilder};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// ISARA 样品更换机器人桥接
#[derive(Parser, Debug)]
#[command(name = "isara-bridge")]
#[command(about = "Bridge an ISARA sample changer to named control channels", long_about = None)]
struct Args {
    /// 设备名（日志标识）
    device: String,

    /// 控制器地址（覆盖配置文件）
    address: Option<String>,

    /// 命令端口
    #[arg(long)]
    command_port: Option<u16>,

    /// 状态端口
    #[arg(long)]
    status_port: Option<u16>,

    /// 位置文件基础名
    #[arg(long)]
    positions: Option<String>,

    /// 位置文件目录
    #[arg(long)]
    positions_dir: Option<PathBuf>,

    /// 配置文件
    ///
    /// 默认: `<config_dir>/isara-bridge/config.toml`（可以不存在）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 提高日志级别（-v: debug, -vv: trace）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(address) = &self.address {
            config.link.host = address.clone();
        }
        if let Some(port) = self.command_port {
            config.link.command_port = port;
        }
        if let Some(port) = self.status_port {
            config.link.status_port = port;
        }
        if let Some(base) = &self.positions {
            config.positions.base = base.clone();
        }
        if let Some(dir) = &self.positions_dir {
            config.positions.directory = dir.clone();
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for krate in ["isara_bridge", "isara_client", "isara_driver", "isara_link"] {
        filter = filter.add_directive(format!("{krate}={level}").parse()?);
    }
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

    // log crate 的记录转发给 tracing
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut config = BridgeConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    let driver_config = config.driver_config()?;

    info!(
        "{}: controller {} (command {}, status {}), positions {}/{}",
        args.device,
        driver_config.host,
        driver_config.command_port,
        driver_config.status_port,
        driver_config.positions_dir.display(),
        driver_config.positions_base
    );

    let board = Arc::new(ChannelBoard::new());
    let client = IsaraClient::connect(IsaraBuilder::new("").config(driver_config), board.clone())
        .context("Failed to start bridge")?;

    let tolerance = config.positions.tolerance;
    client.dispatcher().update_params(|p| p.pos_tolerance = tolerance);
    board.define(names::PAR_POS_TOLERANCE, tolerance);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
    }

    // 标准输入读取在独立线程上，主线程可以同时响应 Ctrl+C
    let (lines_tx, lines_rx) = unbounded::<String>();
    thread::Builder::new()
        .name("isara-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn console thread")?;

    info!("{} started. Press Ctrl+C to stop.", args.device);
    while !shutdown.load(Ordering::SeqCst) {
        let line = match lines_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            // stdin 关闭后继续运行，直到 Ctrl+C
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(Duration::from_millis(200));
                continue;
            },
        };

        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Put(name, value) => {
                if board.get(&name).is_none() {
                    warn!("Unknown channel: {}", name);
                    continue;
                }
                board.put(&name, value);
            },
            ConsoleCommand::Get(name) => match board.get(&name) {
                Some(value) => println!("{name} = {value}"),
                None => println!("{name}: unknown channel"),
            },
            ConsoleCommand::List => {
                for name in board.names() {
                    println!("{name}");
                }
            },
            ConsoleCommand::Status => {
                let robot = client.snapshot();
                println!(
                    "status={:?} health={:?} position={} tool={:?} mounted={:?} on_tool={:?}",
                    robot.status,
                    robot.health,
                    robot.position,
                    robot.tool,
                    robot.mounted,
                    robot.on_tool
                );
                println!("{:?}", client.driver().metrics_snapshot());
            },
            ConsoleCommand::Quit => break,
            ConsoleCommand::Empty => {},
        }
    }

    info!("Shutting down {}", args.device);
    drop(client);
    Ok(())
}
