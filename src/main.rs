//! Major Tom - 聊天驱动的 GitOps 部署机器人
//!
//! Usage:
//! - Normal mode: `major-tom`
//! - With custom port: `major-tom --port 19999`
//! - With custom config: `major-tom --config /etc/major-tom/major-tom.yaml`

use std::path::PathBuf;

use major_tom::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                config.config_path_override = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Major Tom - chat driven GitOps deploy bot");
    println!();
    println!("USAGE:");
    println!("    major-tom [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>      Override the listening port");
    println!("    --config <PATH>    Override the deploy config file");
    println!("    -h, --help         Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    MAJOR_TOM_API_KEY            API key for POST /command");
    println!("    MAJOR_TOM_CONFIG             Deploy config file (default configs/major-tom.yaml)");
    println!("    PORT                         Listening port (default 9876)");
    println!("    DEPLOY_QUEUE_CAPACITY        Pending deploy requests (default 64)");
    println!("    DEPLOY_REPLY_TIMEOUT_SECS    Seconds a caller waits for a reply (default 300)");
    println!("    RUST_LOG                     Log filter (default info)");
}

fn main() {
    let config = parse_args();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(major_tom::init_and_run_agent_with_config(config)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
