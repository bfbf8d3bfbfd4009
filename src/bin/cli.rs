use redis_shard::{client, Frame, DEFAULT_PORT};

use bytes::Bytes;
use std::str;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "redis-shard-cli", version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"), about = "Issue redis-shard commands")]
struct Cli {
    #[structopt(subcommand)]
    command: Command,

    #[structopt(name = "hostname", long = "host", default_value = "127.0.0.1")]
    host: String,

    #[structopt(long, default_value = DEFAULT_PORT)]
    port: String,

    /// 커맨드를 보내기 전에 선택할 데이터베이스
    #[structopt(long)]
    db: Option<usize>,
}

#[derive(StructOpt)]
enum Command {
    /// 서버가 응답하는지 확인한다.
    Ping,
    /// 키의 값을 가져온다.
    Get {
        /// 가져올 값의 키
        key: String,
    },
    /// 키와 값을 묶어 저장한다.
    Set {
        /// 저장할 키 이름
        key: String,

        /// 저장할 값
        #[structopt(parse(from_str = bytes_from_str))]
        value: Bytes,
    },
    /// 키들을 삭제한다.
    Del {
        #[structopt(required = true)]
        keys: Vec<String>,
    },
    /// 존재하는 키의 수를 센다.
    Exists {
        #[structopt(required = true)]
        keys: Vec<String>,
    },
    /// 패턴에 맞는 키를 나열한다.
    Keys {
        /// glob 패턴 (`*`, `?`, `[...]`)
        pattern: String,
    },
}

/// CLI 툴의 진입점.
///
/// 커맨드 하나를 보내고 응답을 출력한다. 백그라운드 쓰레드가 필요 없으므로
/// 'current_thread' 런타임을 사용한다.
#[tokio::main(flavor = "current_thread")]
async fn main() -> redis_shard::Result<()> {
    // 로깅을 활성화한다.
    tracing_subscriber::fmt::try_init()?;

    let cli = Cli::from_args();

    let addr = format!("{}:{}", cli.host, cli.port);
    let mut client = client::connect(&addr).await?;

    if let Some(db) = cli.db {
        client.select(db).await?;
    }

    let line = match cli.command {
        Command::Ping => vec![Bytes::from_static(b"PING")],
        Command::Get { key } => vec![Bytes::from_static(b"GET"), Bytes::from(key)],
        Command::Set { key, value } => vec![Bytes::from_static(b"SET"), Bytes::from(key), value],
        Command::Del { keys } => with_keys("DEL", keys),
        Command::Exists { keys } => with_keys("EXISTS", keys),
        Command::Keys { pattern } => vec![Bytes::from_static(b"KEYS"), Bytes::from(pattern)],
    };

    let reply = client.send(&line).await?;
    print_reply(&reply, "");

    Ok(())
}

fn with_keys(name: &'static str, keys: Vec<String>) -> Vec<Bytes> {
    let mut line = vec![Bytes::from_static(name.as_bytes())];
    line.extend(keys.into_iter().map(Bytes::from));
    line
}

/// redis-cli와 비슷한 형태로 응답을 출력한다.
fn print_reply(reply: &Frame, indent: &str) {
    match reply {
        Frame::Simple(status) => println!("{}{}", indent, status),
        Frame::Error(msg) => println!("{}(error) {}", indent, msg),
        Frame::Integer(n) => println!("{}(integer) {}", indent, n),
        Frame::Null => println!("{}(nil)", indent),
        Frame::Bulk(value) => match str::from_utf8(value) {
            Ok(string) => println!("{}\"{}\"", indent, string),
            Err(_) => println!("{}{:?}", indent, value),
        },
        Frame::Array(parts) if parts.is_empty() => println!("{}(empty array)", indent),
        Frame::Array(parts) => {
            for (i, part) in parts.iter().enumerate() {
                print_reply(part, &format!("{}{}) ", indent, i + 1));
            }
        }
    }
}

fn bytes_from_str(src: &str) -> Bytes {
    Bytes::from(src.to_string())
}
