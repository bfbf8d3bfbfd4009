use crate::Frame;

use bytes::Bytes;
use std::convert::TryFrom;
use std::{fmt, io};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_stream::Stream;
use tracing::debug;

/// bulk 문자열 하나의 최대 길이. 이보다 긴 헤더는 프로토콜 에러로 처리한다.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// 배열 헤더가 선언한 원소 수와 무관하게 미리 할당할 최대 용량.
const MAX_PREALLOC_ARGS: usize = 1024;

/// bulk 헤더가 선언한 길이와 무관하게 미리 할당할 최대 바이트 수. 나머지는 실제로
/// 도착하는 만큼 늘려간다.
const MAX_PREALLOC_BULK: usize = 64 * 1024;

/**
 * 프레임 디코딩 과정에서 발생하는 에러.
 *
 * 'Protocol'은 해당 프레임 하나에 대한 에러이며, 파서는 상태를 초기화한 뒤 다음 프레임을
 * 계속 읽는다. 'Eof'와 'Io'는 스트림의 끝을 나타내며, 이후로는 아무것도 반환되지 않는다.
 */
#[derive(Debug)]
pub enum ParseError {
    /// 잘못된 형식의 프레임.
    Protocol(String),

    /// 스트림이 프레임 경계에서 깔끔하게 끝났다.
    Eof,

    /// 하위 스트림 읽기 실패. 프레임 중간에서 끊긴 경우도 포함된다.
    Io(io::Error),
}

impl ParseError {
    /// 이 에러 이후로 스트림이 끝나는지 여부.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParseError::Protocol(_))
    }

    fn protocol(line: &[u8]) -> ParseError {
        ParseError::Protocol(format!(
            "protocol error: {}",
            String::from_utf8_lossy(line).trim_end()
        ))
    }
}

/// 디코딩 결과 하나. 성공한 프레임이거나 에러다.
pub type Payload = Result<Frame, ParseError>;

/// 현재 읽고 있는 프레임의 상태. 프레임 하나가 끝나면 기본값으로 초기화된다.
#[derive(Default)]
struct ReadState {
    // 배열이나 bulk 문자열의 본문을 읽는 중인지 여부
    reading_multi_line: bool,
    expected_args: usize,
    // '*' 또는 '$'
    msg_type: u8,
    args: Vec<Bytes>,
    // 직전 헤더가 선언한, 다음에 그대로 읽어야 하는 바이트 수
    bulk_len: Option<usize>,
}

impl ReadState {
    fn finished(&self) -> bool {
        self.expected_args > 0 && self.args.len() == self.expected_args
    }
}

/// 소켓에서 읽은 한 줄. 'Body'는 bulk 길이만큼 그대로 읽은 데이터다.
enum Line {
    Text(Vec<u8>),
    Body(Bytes),
}

/**
 * 바이트 스트림을 'Payload' 시퀀스로 변환하는 상태 머신.
 *
 * 커넥션에서 커맨드를 읽을 때, 피어의 응답을 읽을 때, AOF 파일을 재생할 때 모두
 * 같은 파서를 사용한다. 한 번 끝난 파서는 다시 시작할 수 없다.
 */
pub struct Parser<R> {
    reader: BufReader<R>,
    state: ReadState,
    done: bool,
}

impl<R: AsyncRead + Unpin> Parser<R> {
    pub fn new(reader: R) -> Parser<R> {
        Parser {
            reader: BufReader::new(reader),
            state: ReadState::default(),
            done: false,
        }
    }

    /**
     * 다음 payload를 디코딩한다.
     *
     * 종료 에러('Eof', 'Io')를 정확히 한 번 반환한 뒤로는 항상 'None'을 반환한다.
     */
    pub async fn next_payload(&mut self) -> Option<Payload> {
        if self.done {
            return None;
        }

        loop {
            let step = match self.read_line().await {
                Ok(line) => self.step(line),
                Err(err) => Err(err),
            };

            match step {
                Ok(Some(frame)) => {
                    self.state = ReadState::default();
                    return Some(Ok(frame));
                }
                Ok(None) => continue,
                Err(err) => {
                    self.state = ReadState::default();
                    if err.is_terminal() {
                        self.done = true;
                    } else {
                        debug!(cause = %err, "malformed frame");
                    }
                    return Some(Err(err));
                }
            }
        }
    }

    async fn read_line(&mut self) -> Result<Line, ParseError> {
        if let Some(len) = self.state.bulk_len.take() {
            // 헤더가 길이를 선언했다면 내용과 무관하게 그 길이만큼 읽는다.
            let want = len + 2;
            let mut buf = Vec::with_capacity(want.min(MAX_PREALLOC_BULK));
            (&mut self.reader)
                .take(want as u64)
                .read_to_end(&mut buf)
                .await
                .map_err(ParseError::Io)?;

            if buf.len() < want {
                return Err(ParseError::Io(io::ErrorKind::UnexpectedEof.into()));
            }
            if !buf.ends_with(b"\r\n") {
                return Err(ParseError::protocol(&buf));
            }
            buf.truncate(len);
            return Ok(Line::Body(Bytes::from(buf)));
        }

        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(ParseError::Io)?;

        if n == 0 {
            return Err(ParseError::Eof);
        }
        if !buf.ends_with(b"\n") {
            return Err(ParseError::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        if !buf.ends_with(b"\r\n") {
            return Err(ParseError::protocol(&buf));
        }
        buf.truncate(buf.len() - 2);
        Ok(Line::Text(buf))
    }

    /// 한 줄을 상태에 반영한다. 프레임이 완성되면 'Some'을 반환한다.
    fn step(&mut self, line: Line) -> Result<Option<Frame>, ParseError> {
        let line = match line {
            Line::Body(data) => {
                self.state.args.push(data);
                return Ok(self.take_finished());
            }
            Line::Text(line) => line,
        };

        if self.state.reading_multi_line {
            self.read_body(&line)?;
            return Ok(self.take_finished());
        }

        let (&kind, rest) = match line.split_first() {
            Some(split) => split,
            None => return Err(ParseError::protocol(&line)),
        };

        match kind {
            b'*' => {
                let count = match parse_decimal(rest) {
                    Some(count) if count >= 0 => count as usize,
                    _ => return Err(ParseError::protocol(&line)),
                };
                if count == 0 {
                    return Ok(Some(Frame::array()));
                }
                self.state.msg_type = b'*';
                self.state.reading_multi_line = true;
                self.state.expected_args = count;
                self.state.args = Vec::with_capacity(count.min(MAX_PREALLOC_ARGS));
                Ok(None)
            }
            b'$' => match parse_decimal(rest) {
                Some(-1) => Ok(Some(Frame::Null)),
                Some(len) if len >= 0 && len as usize <= MAX_BULK_LEN => {
                    self.state.msg_type = b'$';
                    self.state.reading_multi_line = true;
                    self.state.expected_args = 1;
                    self.state.args = Vec::with_capacity(1);
                    self.state.bulk_len = Some(len as usize);
                    Ok(None)
                }
                _ => Err(ParseError::protocol(&line)),
            },
            b'+' => Ok(Some(Frame::Simple(
                String::from_utf8_lossy(rest).into_owned(),
            ))),
            b'-' => Ok(Some(Frame::Error(String::from_utf8_lossy(rest).into_owned()))),
            b':' => match parse_decimal(rest) {
                Some(val) => Ok(Some(Frame::Integer(val))),
                None => Err(ParseError::protocol(&line)),
            },
            _ => Err(ParseError::protocol(&line)),
        }
    }

    /// 배열 본문의 한 줄. '$' 헤더이거나 인라인 원소다.
    fn read_body(&mut self, line: &[u8]) -> Result<(), ParseError> {
        match line.split_first() {
            Some((b'$', rest)) => match parse_decimal(rest) {
                // null 원소는 빈 원소로 취급한다.
                Some(-1) => {
                    self.state.args.push(Bytes::new());
                    Ok(())
                }
                Some(len) if len >= 0 && len as usize <= MAX_BULK_LEN => {
                    self.state.bulk_len = Some(len as usize);
                    Ok(())
                }
                _ => Err(ParseError::protocol(line)),
            },
            Some(_) => {
                self.state.args.push(Bytes::copy_from_slice(line));
                Ok(())
            }
            None => Err(ParseError::protocol(line)),
        }
    }

    fn take_finished(&mut self) -> Option<Frame> {
        if !self.state.finished() {
            return None;
        }

        let args = std::mem::take(&mut self.state.args);
        if self.state.msg_type == b'$' {
            args.into_iter().next().map(Frame::Bulk)
        } else {
            Some(Frame::Array(args.into_iter().map(Frame::Bulk).collect()))
        }
    }
}

/**
 * 'reader'를 디코딩하는 'Stream'을 반환한다.
 *
 * 스트림은 종료 에러를 마지막 원소로 내보낸 뒤 끝난다.
 */
pub fn parse_stream<R>(reader: R) -> impl Stream<Item = Payload>
where
    R: AsyncRead + Unpin,
{
    let mut parser = Parser::new(reader);

    async_stream::stream! {
        while let Some(payload) = parser.next_payload().await {
            yield payload;
        }
    }
}

/// 부호가 있는 십진수를 엄격하게 파싱한다. 숫자 이외의 문자가 섞여 있으면 'None'.
fn parse_decimal(src: &[u8]) -> Option<i64> {
    use atoi::atoi;

    let (negative, digits) = match src.split_first() {
        Some((b'-', digits)) => (true, digits),
        _ => (false, src),
    };

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let val = atoi::<u64>(digits)?;
    if negative {
        0i64.checked_sub(i64::try_from(val).ok()?)
    } else {
        i64::try_from(val).ok()
    }
}

impl From<io::Error> for ParseError {
    fn from(src: io::Error) -> ParseError {
        ParseError::Io(src)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Protocol(msg) => msg.fmt(fmt),
            ParseError::Eof => "end of stream".fmt(fmt),
            ParseError::Io(err) => err.fmt(fmt),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    async fn decode_all(input: &[u8]) -> Vec<Payload> {
        parse_stream(input).collect().await
    }

    fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[tokio::test]
    async fn decodes_multi_bulk_command() {
        let mut parser = Parser::new(&b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"[..]);

        let frame = parser.next_payload().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Array(vec![bulk("SET"), bulk("key"), bulk("value")]));

        assert!(matches!(parser.next_payload().await, Some(Err(ParseError::Eof))));
        assert!(parser.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn bulk_body_is_read_verbatim() {
        let payloads = decode_all(b"*2\r\n$3\r\nSET\r\n$4\r\na\r\nb\r\n").await;

        let frame = payloads[0].as_ref().unwrap();
        assert_eq!(frame, &Frame::Array(vec![bulk("SET"), bulk("a\r\nb")]));
    }

    #[tokio::test]
    async fn bulk_body_starting_with_dollar_is_data() {
        let payloads = decode_all(b"*2\r\n$3\r\nGET\r\n$2\r\n$5\r\n").await;
        assert_eq!(
            payloads[0].as_ref().unwrap(),
            &Frame::Array(vec![bulk("GET"), bulk("$5")])
        );
    }

    #[tokio::test]
    async fn decodes_single_line_replies() {
        let payloads = decode_all(b"+OK\r\n-ERR bad\r\n:42\r\n:-7\r\n").await;

        assert_eq!(payloads[0].as_ref().unwrap(), &Frame::Simple("OK".into()));
        assert_eq!(payloads[1].as_ref().unwrap(), &Frame::Error("ERR bad".into()));
        assert_eq!(payloads[2].as_ref().unwrap(), &Frame::Integer(42));
        assert_eq!(payloads[3].as_ref().unwrap(), &Frame::Integer(-7));
        assert!(matches!(payloads[4], Err(ParseError::Eof)));
        assert_eq!(payloads.len(), 5);
    }

    #[tokio::test]
    async fn null_bulk_and_empty_array() {
        let payloads = decode_all(b"$-1\r\n*0\r\n").await;

        assert_eq!(payloads[0].as_ref().unwrap(), &Frame::Null);
        assert_eq!(payloads[1].as_ref().unwrap(), &Frame::Array(vec![]));
    }

    #[tokio::test]
    async fn empty_bulk_element() {
        let payloads = decode_all(b"*2\r\n$3\r\nSET\r\n$0\r\n\r\n$0\r\n\r\n").await;

        assert_eq!(
            payloads[0].as_ref().unwrap(),
            &Frame::Array(vec![bulk("SET"), bulk("")])
        );
        assert_eq!(payloads[1].as_ref().unwrap(), &bulk(""));
    }

    #[tokio::test]
    async fn bare_bulk_string() {
        let payloads = decode_all(b"$4\r\nPING\r\n").await;
        assert_eq!(payloads[0].as_ref().unwrap(), &bulk("PING"));
    }

    #[tokio::test]
    async fn recovers_after_malformed_frame() {
        let payloads = decode_all(b"*x\r\n*1\r\n$4\r\nPING\r\n").await;

        match &payloads[0] {
            Err(ParseError::Protocol(msg)) => assert_eq!(msg, "protocol error: *x"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(payloads[1].as_ref().unwrap(), &Frame::Array(vec![bulk("PING")]));
    }

    #[tokio::test]
    async fn missing_carriage_return_is_protocol_error() {
        let payloads = decode_all(b"+OK\n:1\r\n").await;

        assert!(matches!(payloads[0], Err(ParseError::Protocol(_))));
        assert_eq!(payloads[1].as_ref().unwrap(), &Frame::Integer(1));
    }

    #[tokio::test]
    async fn unknown_leading_byte_is_protocol_error() {
        let payloads = decode_all(b"PING\r\n").await;
        assert!(matches!(payloads[0], Err(ParseError::Protocol(_))));
        assert!(matches!(payloads[1], Err(ParseError::Eof)));
    }

    #[tokio::test]
    async fn truncated_body_ends_stream() {
        let payloads = decode_all(b"*1\r\n$10\r\nabc").await;

        assert_eq!(payloads.len(), 1);
        match &payloads[0] {
            Err(ParseError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }

    /// 선언만 큰 bulk 헤더 뒤에 내용이 끊기면 스트림이 끝난다.
    #[tokio::test]
    async fn huge_declared_body_without_data_ends_stream() {
        let mut parser = Parser::new(&b"*2\r\n$3\r\nGET\r\n$536870912\r\nabc"[..]);

        match parser.next_payload().await {
            Some(Err(ParseError::Io(err))) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parser.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn body_larger_than_prealloc_is_read_whole() {
        let body = vec![b'x'; MAX_PREALLOC_BULK * 3 + 7];
        let mut input = format!("*1\r\n${}\r\n", body.len()).into_bytes();
        input.extend_from_slice(&body);
        input.extend_from_slice(b"\r\n");

        let payloads = decode_all(&input).await;
        assert_eq!(
            payloads[0].as_ref().unwrap(),
            &Frame::Array(vec![Frame::Bulk(Bytes::from(body))])
        );
    }

    #[tokio::test]
    async fn partial_line_ends_stream() {
        let payloads = decode_all(b"+OK").await;
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].as_ref().unwrap_err().is_terminal());
    }

    #[tokio::test]
    async fn decode_then_encode_is_identity() {
        let inputs: [&[u8]; 6] = [
            b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n",
            b"$5\r\nhello\r\n",
            b"$-1\r\n",
            b"+PONG\r\n",
            b"-ERR no such key\r\n",
            b":12\r\n",
        ];

        for input in inputs.iter() {
            let payloads = decode_all(input).await;
            let frame = payloads[0].as_ref().unwrap();
            assert_eq!(&frame.to_bytes()[..], *input);
        }
    }

    #[test]
    fn decimal_parsing_is_strict() {
        assert_eq!(parse_decimal(b"12"), Some(12));
        assert_eq!(parse_decimal(b"-1"), Some(-1));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"-"), None);
        assert_eq!(parse_decimal(b"3x"), None);
    }
}
