//! 서버 설정.
//!
//! redis.conf 형식의 파일을 읽는다. 한 줄에 `key value` 하나이며, `#`으로 시작하는
//! 줄과 빈 줄은 무시한다.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub append_only: bool,
    pub append_filename: PathBuf,
    /// 논리 데이터베이스의 수. 0이면 기본값(16)을 사용한다.
    pub databases: usize,
    pub max_clients: usize,
    /// 클러스터에서 이 노드의 주소.
    pub self_addr: Option<String>,
    pub peers: Vec<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            append_only: false,
            append_filename: PathBuf::from("appendonly.aof"),
            databases: 16,
            max_clients: 250,
            self_addr: None,
            peers: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Config> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
        Config::parse(&src)
    }

    /**
     * 설정 파일의 내용을 파싱한다. 파일에 없는 키는 기본값을 유지한다.
     *
     * 알 수 없는 키는 경고만 남기고 무시한다. 값의 형식이 잘못되었다면 에러다.
     */
    pub fn parse(src: &str) -> crate::Result<Config> {
        let mut config = Config::default();

        for line in src.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.find(char::is_whitespace) {
                Some(idx) => (&line[..idx], unquote(line[idx..].trim())),
                None => (line, ""),
            };

            match key.to_lowercase().as_str() {
                "bind" => config.bind = value.to_string(),
                "port" => config.port = parse_value(key, value)?,
                "appendonly" => config.append_only = parse_bool(key, value)?,
                "appendfilename" => config.append_filename = PathBuf::from(value),
                "databases" => config.databases = parse_value(key, value)?,
                "maxclients" => config.max_clients = parse_value(key, value)?,
                "self" => {
                    config.self_addr = if value.is_empty() {
                        None
                    } else {
                        Some(value.to_string())
                    }
                }
                "peers" => {
                    config.peers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|peer| !peer.is_empty())
                        .map(String::from)
                        .collect()
                }
                _ => warn!(key, "unknown config key"),
            }
        }

        Ok(config)
    }

    /// 리스너가 바인드할 주소.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// `self`와 `peers`가 모두 설정되었을 때만 클러스터 모드로 동작한다.
    pub fn cluster_enabled(&self) -> bool {
        self.self_addr.is_some() && !self.peers.is_empty()
    }
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| format!("invalid value for '{}': {:?}", key, value).into())
}

fn parse_bool(key: &str, value: &str) -> crate::Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(format!("invalid value for '{}': {:?}", key, value).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr(), "127.0.0.1:6379");
        assert!(!config.cluster_enabled());
    }

    #[test]
    fn parses_every_key() {
        let src = "\
# comment
bind 0.0.0.0
port 7000
appendonly yes
appendfilename \"data.aof\"
databases 4
maxclients 10
self 127.0.0.1:7000
peers 127.0.0.1:7001, 127.0.0.1:7002
";
        let config = Config::parse(src).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:7000");
        assert!(config.append_only);
        assert_eq!(config.append_filename, PathBuf::from("data.aof"));
        assert_eq!(config.databases, 4);
        assert_eq!(config.max_clients, 10);
        assert_eq!(config.self_addr.as_deref(), Some("127.0.0.1:7000"));
        assert_eq!(config.peers, vec!["127.0.0.1:7001", "127.0.0.1:7002"]);
        assert!(config.cluster_enabled());
    }

    #[test]
    fn cluster_needs_self_and_peers() {
        let config = Config::parse("peers a:1,b:2").unwrap();
        assert!(!config.cluster_enabled());

        let config = Config::parse("self a:1\npeers ,").unwrap();
        assert!(config.peers.is_empty());
        assert!(!config.cluster_enabled());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::parse("save 900 1\nport 6380").unwrap();
        assert_eq!(config.port, 6380);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(Config::parse("port http").is_err());
        assert!(Config::parse("appendonly maybe").is_err());
        assert!(Config::parse("databases -1").is_err());
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"port 6390\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 6390);
        assert!(Config::from_file(file.path().with_extension("missing")).is_err());
    }
}
