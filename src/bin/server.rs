//! redis-shard 서버.
//!
//! 이 파일은 이 라이브러리에 구현된 서버의 진입점이다. 커맨드라인과 설정 파일을
//! 읽어 'redis_shard::server'에 전달한다.
//!
//! 아규먼트 파싱에는 'structopt' crate를 사용한다.

use redis_shard::{server, Config, Database};

use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tokio::net::TcpListener;
use tokio::signal;

/// '--config'가 없을 때 현재 디렉터리에서 찾는 설정 파일.
const DEFAULT_CONFIG_FILE: &str = "redis.conf";

#[tokio::main]
pub async fn main() -> redis_shard::Result<()> {
    // 로깅을 활성화한다.
    tracing_subscriber::fmt::try_init()?;

    let cli = Cli::from_args();

    let mut config = match cli.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    // 커맨드라인 아규먼트가 설정 파일보다 우선한다.
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let listener = TcpListener::bind(&config.addr()).await?;
    let database = Database::open(&config).await?;

    server::run(listener, database, config.max_clients, signal::ctrl_c()).await
}

#[derive(StructOpt)]
#[structopt(name = "redis-shard-server", version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"), about = "A sharded Redis server")]
struct Cli {
    /// redis.conf 형식의 설정 파일
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(long)]
    bind: Option<String>,

    #[structopt(long)]
    port: Option<u16>,
}
