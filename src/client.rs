//! 비동기 클라이언트.
//!
//! 클러스터 노드가 다른 노드에 커맨드를 릴레이할 때와 CLI가 서버에 요청을 보낼 때
//! 함께 사용한다.

use crate::{to_cmd_line, CmdLine, Connection, Frame};

use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/**
 * Redis 서버와의 커넥션 하나.
 *
 * 'TcpStream' 하나를 기반으로 요청을 보내고 응답을 받는다. 커넥션은
 * ['connect'](fn@connect) 함수로 수립한다. 요청 하나를 보낸 뒤에는 그 응답을 받을
 * 때까지 다음 요청을 보내지 않는다.
 */
pub struct Client {
    connection: Connection,
}

/**
 * 'addr'에 위치한 Redis 서버와의 연결을 수립한다.
 *
 * 'addr'은 Tokio의 'ToSocketAddrs'를 구현하는 어떠한 타입이든 될 수 있다.
 *
 * # Example
 *
 * ```no_run
 * use redis_shard::client;
 *
 * #[tokio::main]
 * async fn main() {
 *     let mut client = match client::connect("localhost:6379").await {
 *         Ok(client) => client,
 *         Err(_) => panic!("failed to establish connection"),
 *     };
 *
 *     client.set("foo", "bar".into()).await.unwrap();
 * }
 * ```
 */
pub async fn connect<T: ToSocketAddrs>(addr: T) -> crate::Result<Client> {
    let socket = TcpStream::connect(addr).await?;
    let connection = Connection::new(socket);

    Ok(Client { connection })
}

impl Client {
    /**
     * 커맨드 라인 하나를 보내고 응답 프레임을 그대로 반환한다.
     *
     * 서버가 보낸 에러 응답도 'Ok(Frame::Error(..))'다. 'Err'는 소켓 I/O나 디코딩이
     * 실패했다는 뜻이며, 이 경우 커넥션을 더 사용하면 안 된다.
     */
    pub async fn send(&mut self, line: &[Bytes]) -> crate::Result<Frame> {
        let frame = Frame::from_cmd_line(line);
        debug!(request = %frame);

        self.connection.write_frame(&frame).await?;
        self.read_response().await
    }

    /// 이 커넥션이 다른 클러스터 노드의 피어 커넥션임을 알린다.
    pub async fn announce_peer(&mut self) -> crate::Result<()> {
        match self.send(&to_cmd_line(&["PEER"])).await? {
            Frame::Simple(ref status) if status == "OK" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    pub async fn ping(&mut self) -> crate::Result<()> {
        match self.send(&to_cmd_line(&["PING"])).await? {
            Frame::Simple(ref status) if status == "PONG" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    /// 키에 해당하는 값을 얻는다. 존재하지 않는 키라면 'None'을 반환한다.
    pub async fn get(&mut self, key: &str) -> crate::Result<Option<Bytes>> {
        match self.send(&to_cmd_line(&["GET", key])).await? {
            Frame::Simple(value) => Ok(Some(value.into())),
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::Null => Ok(None),
            frame => Err(frame.to_error()),
        }
    }

    pub async fn set(&mut self, key: &str, value: Bytes) -> crate::Result<()> {
        let line: CmdLine = vec![
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key.as_bytes()),
            value,
        ];

        match self.send(&line).await? {
            Frame::Simple(ref status) if status == "OK" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    /// 키들을 삭제하고 실제로 삭제된 키의 수를 반환한다.
    pub async fn del(&mut self, keys: &[&str]) -> crate::Result<i64> {
        let mut parts = vec!["DEL"];
        parts.extend_from_slice(keys);

        match self.send(&to_cmd_line(&parts)).await? {
            Frame::Integer(n) => Ok(n),
            frame => Err(frame.to_error()),
        }
    }

    /// 이 커넥션이 사용할 논리 데이터베이스를 바꾼다.
    pub async fn select(&mut self, index: usize) -> crate::Result<()> {
        let index = index.to_string();
        match self.send(&to_cmd_line(&["SELECT", &index])).await? {
            Frame::Simple(ref status) if status == "OK" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    async fn read_response(&mut self) -> crate::Result<Frame> {
        match self.connection.read_frame().await? {
            Some(frame) => {
                debug!(response = %frame);
                Ok(frame)
            }
            None => Err("connection reset by server".into()),
        }
    }
}
