//! 여러 논리 데이터베이스, AOF 기반 영속화, consistent hashing 기반 클러스터링을
//! 지원하는 Redis 호환 인메모리 키/값 서버.
//!
//! # Layout
//!
//! 주 요소는:
//!
//! * `server`: TCP 리스너. 커넥션마다 태스크 하나를 가동하고, 수신한 커맨드를
//!   최상위 `Database`에 위임한다.
//!
//! * `parse`: 바이트 스트림을 프레임 시퀀스로 바꾸는 스트리밍 프로토콜 파서.
//!   소켓 읽기와 AOF 재생에 모두 사용된다.
//!
//! * `database`, `db`, `cmd`: 커맨드 테이블, 단일 논리 데이터베이스의 실행기,
//!   `SELECT`를 처리하는 멀티 데이터베이스 디스패처.
//!
//! * `aof`: append-only 파일. 시작 시 재생하고, 변경 커맨드를 단일 writer 태스크가
//!   순서대로 기록한다.
//!
//! * `cluster`: 해시 링, 피어 커넥션 풀, 커맨드 라우터.
//!
//! * `client`: 비동기 클라이언트. 피어 릴레이와 CLI가 함께 사용한다.

pub mod aof;

pub mod client;

pub mod cluster;

pub mod cmd;
pub use cmd::CommandTable;

pub mod config;
pub use config::Config;

mod connection;
pub use connection::Connection;

pub mod database;
pub use database::{Database, Session, StandaloneDatabase};

pub mod db;
pub use db::{Db, Entity};

pub mod dict;
pub use dict::Dict;

pub mod frame;
pub use frame::Frame;

pub mod glob;

pub mod parse;
pub use parse::{parse_stream, ParseError, Parser, Payload};

pub mod server;

mod shutdown;
use shutdown::Shutdown;

/// 레디스 서버가 수신할 기본 포트.
///
/// 포트가 지정되지 않을 경우 사용된다.
pub const DEFAULT_PORT: &str = "6379";

/// 대부분의 함수에서 반환하는 에러.
///
/// 프로토콜 파싱처럼 호출자가 에러 종류를 구분해야 하는 곳에서는 `ParseError`
/// 같은 별도의 `enum`을 사용하고, 나머지는 박싱된 `std::error::Error`로 충분하다.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// redis-shard 연산에 특화된 `Result`
pub type Result<T> = std::result::Result<T, Error>;

/// 커맨드 한 줄. 첫 번째 원소가 커맨드 이름이다.
pub type CmdLine = Vec<bytes::Bytes>;

/// 문자열 조각들로 커맨드 라인을 만든다.
///
/// ```
/// let line = redis_shard::to_cmd_line(&["SELECT", "3"]);
/// assert_eq!(&line[1][..], b"3");
/// ```
pub fn to_cmd_line(parts: &[&str]) -> CmdLine {
    parts
        .iter()
        .map(|part| bytes::Bytes::copy_from_slice(part.as_bytes()))
        .collect()
}
