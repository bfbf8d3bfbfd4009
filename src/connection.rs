use crate::{Frame, ParseError, Parser, Payload};

use std::io;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{self, Duration};
use tracing::debug;

/// 닫기 전에 남은 쓰기를 기다리는 최대 시간.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/**
 * 원격 피어로부터 'Frame' 값을 송신/수신한다.
 *
 * 소켓을 읽기 절반과 쓰기 절반으로 나눈다. 읽기 쪽은 스트리밍 'Parser'가 맡아 바이트를
 * 프레임 단위로 디코딩하고, 쓰기 쪽은 버퍼링된 writer에 프레임을 인코딩한 뒤 소켓으로
 * 내보낸다.
 *
 * 서버의 커넥션 핸들러와 클라이언트가 같은 타입을 사용한다.
 */
pub struct Connection {
    parser: Parser<OwnedReadHalf>,

    stream: BufWriter<OwnedWriteHalf>,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        let (reader, writer) = socket.into_split();
        Connection {
            parser: Parser::new(reader),
            stream: BufWriter::new(writer),
        }
    }

    /**
     * 다음 payload를 읽는다.
     *
     * 프로토콜 에러는 'Err'로 돌려주되, 이후에도 계속 읽을 수 있다. 상대가 소켓을 닫으면
     * 'Eof'를 한 번 돌려준 뒤 'None'을 반환한다.
     */
    pub async fn read_payload(&mut self) -> Option<Payload> {
        self.parser.next_payload().await
    }

    /**
     * 프레임 하나를 읽는다.
     *
     * 상대가 프레임 경계에서 소켓을 닫았다면 'None'을 반환한다. 그 밖의 디코딩 실패는
     * 모두 'Err'다.
     */
    pub async fn read_frame(&mut self) -> crate::Result<Option<Frame>> {
        match self.read_payload().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(ParseError::Eof)) | None => Ok(None),
            Some(Err(err)) => Err(err.into()),
        }
    }

    /// 프레임 하나를 쓰고 버퍼를 비운다.
    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.stream.write_all(&frame.to_bytes()).await?;
        self.stream.flush().await
    }

    /**
     * 남은 쓰기를 내보내고 쓰기 방향을 닫는다.
     *
     * 상대가 읽지 않아 쓰기가 멈춰 있다면 'CLOSE_TIMEOUT'까지만 기다린다.
     */
    pub async fn close(&mut self) {
        let stream = &mut self.stream;
        let res = time::timeout(CLOSE_TIMEOUT, async move {
            stream.flush().await?;
            stream.shutdown().await
        })
        .await;

        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(cause = %err, "failed to close connection"),
            Err(_) => debug!("timed out closing connection"),
        }
    }
}
