use redis_shard::{client, server, Database, StandaloneDatabase};

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// 각 커맨드의 응답을 원시 바이트 수준에서 확인한다.
#[tokio::test]
async fn key_value_get_set() {
    let addr = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n")
        .await
        .unwrap();
    assert_reply(&mut stream, b"$-1\r\n").await;

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n")
        .await
        .unwrap();
    assert_reply(&mut stream, b"+OK\r\n").await;

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n")
        .await
        .unwrap();
    assert_reply(&mut stream, b"$5\r\nworld\r\n").await;

    stream
        .write_all(b"*2\r\n$6\r\nSTRLEN\r\n$5\r\nhello\r\n")
        .await
        .unwrap();
    assert_reply(&mut stream, b":5\r\n").await;
}

/// 잘못된 형식의 프레임에 에러로 응답한 뒤에도 커넥션은 계속 사용할 수 있다.
#[tokio::test]
async fn recovers_after_malformed_frame() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"*x\r\n").await.unwrap();
    assert_reply(&mut stream, b"-ERR protocol error: *x\r\n").await;

    stream.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
    assert_reply(&mut stream, b"+PONG\r\n").await;
}

#[tokio::test]
async fn command_errors() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"*1\r\n$4\r\nNOPE\r\n").await.unwrap();
    assert_reply(&mut stream, b"-ERR unknown command 'nope'\r\n").await;

    stream.write_all(b"*1\r\n$3\r\nGET\r\n").await.unwrap();
    assert_reply(
        &mut stream,
        b"-ERR wrong number of arguments for 'get' command\r\n",
    )
    .await;

    stream.write_all(b"+PING\r\n").await.unwrap();
    assert_reply(&mut stream, b"-ERR protocol error: expected a command array\r\n").await;
}

/// 여러 커맨드를 한 번에 보내도 응답은 요청 순서대로 온다.
#[tokio::test]
async fn pipelined_commands_reply_in_order() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(
            b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\na\r\n\
              *2\r\n$3\r\nDEL\r\n$1\r\na\r\n",
        )
        .await
        .unwrap();
    assert_reply(&mut stream, b"+OK\r\n$1\r\n1\r\n:1\r\n").await;
}

#[tokio::test]
async fn client_round_trip() {
    let addr = start_server().await;
    let mut client = client::connect(addr).await.unwrap();

    client.ping().await.unwrap();
    assert_eq!(client.get("foo").await.unwrap(), None);

    client.set("foo", "bar".into()).await.unwrap();
    assert_eq!(client.get("foo").await.unwrap().unwrap(), "bar");

    assert_eq!(client.del(&["foo", "missing"]).await.unwrap(), 1);
    assert_eq!(client.get("foo").await.unwrap(), None);
}

/// 데이터베이스 선택은 커넥션마다 독립적이다.
#[tokio::test]
async fn select_is_per_connection() {
    let addr = start_server().await;
    let mut first = client::connect(addr).await.unwrap();
    let mut second = client::connect(addr).await.unwrap();

    first.select(1).await.unwrap();
    first.set("k", "one".into()).await.unwrap();

    assert_eq!(second.get("k").await.unwrap(), None);
    assert_eq!(first.get("k").await.unwrap().unwrap(), "one");

    second.select(1).await.unwrap();
    assert_eq!(second.get("k").await.unwrap().unwrap(), "one");

    assert!(first.select(16).await.is_err());
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle: JoinHandle<redis_shard::Result<()>> = tokio::spawn(async move {
        let database = Database::Standalone(StandaloneDatabase::new(16));
        server::run(listener, database, 250, rx).await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
    assert_reply(&mut stream, b"+PONG\r\n").await;

    tx.send(()).unwrap();

    let res = time::timeout(Duration::from_secs(5), handle).await.unwrap();
    assert!(res.unwrap().is_ok());

    let mut buf = [0u8; 1];
    assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
}

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let database = Database::Standalone(StandaloneDatabase::new(16));
        server::run(listener, database, 250, std::future::pending::<()>()).await
    });

    addr
}

async fn assert_reply(stream: &mut TcpStream, expected: &[u8]) {
    let mut response = vec![0; expected.len()];
    stream.read_exact(&mut response).await.unwrap();
    assert_eq!(
        String::from_utf8_lossy(&response),
        String::from_utf8_lossy(expected)
    );
}
