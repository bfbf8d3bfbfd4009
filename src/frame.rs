//! Redis 프로토콜 프레임과 그 바이트 표현.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::str;

/// Redis 프로토콜의 프레임 하나.
///
/// 클라이언트가 보내는 커맨드와 서버가 돌려주는 응답 모두 같은 타입으로 표현된다.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// 비어있는 배열 프레임을 반환한다.
    pub(crate) fn array() -> Frame {
        Frame::Array(vec![])
    }

    /// "OK" 상태 프레임.
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    /// `ERR` 접두어가 붙은 에러 프레임.
    pub fn err(msg: impl fmt::Display) -> Frame {
        Frame::Error(format!("ERR {}", msg))
    }

    /// 배열 프레임에 bulk 프레임 하나를 추가한다.
    ///
    /// # Panics
    ///
    /// `self`가 배열 프레임이 아닌 경우 panic이 발생한다.
    pub(crate) fn push_bulk(&mut self, bytes: Bytes) {
        match self {
            Frame::Array(vec) => {
                vec.push(Frame::Bulk(bytes));
            }
            _ => panic!("not an array frame"),
        }
    }

    /// 커맨드 라인을 bulk 문자열 배열 프레임으로 변환한다.
    pub fn from_cmd_line(line: &[Bytes]) -> Frame {
        let mut frame = Frame::array();
        for arg in line {
            frame.push_bulk(arg.clone());
        }
        frame
    }

    /// 배열 프레임을 커맨드 라인으로 변환한다.
    ///
    /// 원소 중 bulk 이외의 것이 있다면 `None`을 반환한다. 단순 문자열 원소는
    /// 그대로 바이트로 취급한다.
    pub fn into_cmd_line(self) -> Option<crate::CmdLine> {
        match self {
            Frame::Array(parts) => parts
                .into_iter()
                .map(|part| match part {
                    Frame::Bulk(data) => Some(data),
                    Frame::Simple(s) => Some(Bytes::from(s)),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// 프레임을 `dst`에 직렬화한다.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(val) => {
                dst.put_u8(b'+');
                dst.put_slice(val.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(val) => {
                dst.put_u8(b'-');
                dst.put_slice(val.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(val) => {
                dst.put_u8(b':');
                write_decimal(dst, *val);
            }
            Frame::Null => {
                dst.put_slice(b"$-1\r\n");
            }
            Frame::Bulk(val) => {
                dst.put_u8(b'$');
                write_decimal(dst, val.len() as i64);
                dst.put_slice(val);
                dst.put_slice(b"\r\n");
            }
            Frame::Array(parts) => {
                dst.put_u8(b'*');
                write_decimal(dst, parts.len() as i64);
                for part in parts {
                    part.encode(dst);
                }
            }
        }
    }

    /// 프레임의 바이트 표현을 반환한다.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// 예상하지 못한 응답 프레임을 에러로 변환한다.
    pub(crate) fn to_error(&self) -> crate::Error {
        match self {
            Frame::Error(msg) => msg.clone().into(),
            frame => format!("unexpected frame: {}", frame).into(),
        }
    }
}

fn write_decimal(dst: &mut BytesMut, val: i64) {
    dst.put_slice(val.to_string().as_bytes());
    dst.put_slice(b"\r\n");
}

impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Frame::Simple(s) => s.eq(other),
            Frame::Bulk(s) => s.eq(other),
            _ => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Frame::Simple(response) => response.fmt(fmt),
            Frame::Error(msg) => write!(fmt, "error: {}", msg),
            Frame::Integer(num) => num.fmt(fmt),
            Frame::Bulk(msg) => match str::from_utf8(msg) {
                Ok(string) => string.fmt(fmt),
                Err(_) => write!(fmt, "{:?}", msg),
            },
            Frame::Null => "(nil)".fmt(fmt),
            Frame::Array(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, " ")?;
                    }
                    part.fmt(fmt)?;
                }

                Ok(())
            }
        }
    }
}
