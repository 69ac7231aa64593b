use clap::{Arg, ArgMatches, Command};
use std::error::Error;

use imaging_hub::comm::config::ConfigManager;
use imaging_hub::comm::tracing::init_tracing;
use imaging_hub::conf::AppSettings;
use imaging_hub::AppBootstrap;

/// 构建命令行应用
fn build_app() -> Command {
    let config_arg = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("额外的配置文件，优先于 config/ 目录 / Extra config file over config/");

    Command::new("imaging-hub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("影像归档访问路由与通知推送服务 / Imaging access router and notification fan-out")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("server")
                .about("启动 HTTP 与实时通道服务 / Start the HTTP and realtime servers")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("覆盖 server.host"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("覆盖 server.port"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("加载并校验配置后退出 / Load and validate configuration, then exit")
                .arg(config_arg),
        )
        .subcommand(Command::new("version").about("显示版本信息 / Show version"))
}

fn load_settings(matches: &ArgMatches) -> Result<(ConfigManager, AppSettings), Box<dyn Error>> {
    let manager = ConfigManager::load(matches.get_one::<String>("config").map(String::as_str))?;
    let settings = AppSettings::from_manager(&manager)?;
    Ok((manager, settings))
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            let (manager, mut settings) = load_settings(sub_matches)?;
            if let Some(host) = sub_matches.get_one::<String>("host") {
                settings.server.host = host.clone();
            }
            if let Some(port) = sub_matches.get_one::<u16>("port") {
                settings.server.port = *port;
            }
            init_tracing(&settings.logging);
            manager.log_sources_info();
            AppBootstrap::new(settings).run().await?;
        }
        Some(("check-config", sub_matches)) => match load_settings(sub_matches) {
            Ok((manager, settings)) => {
                let (total, loaded, skipped) = manager.sources_stats();
                println!("✅ 配置有效 / configuration is valid");
                println!("   sources: {} total, {} loaded, {} skipped", total, loaded, skipped);
                println!(
                    "   http={}:{} realtime={}:{} backend={}",
                    settings.server.host,
                    settings.server.port,
                    settings.realtime.host,
                    settings.realtime.port,
                    if settings.database.url.is_some() { "postgres" } else { "memory" }
                );
            }
            Err(e) => {
                eprintln!("❌ 配置无效 / invalid configuration: {}", e);
                std::process::exit(1);
            }
        },
        Some(("version", _)) => {
            println!("imaging-hub {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            // subcommand_required(true) 保证不会到达 / unreachable with subcommand_required
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }

    Ok(())
}
