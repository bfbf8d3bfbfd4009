//! `KEYS` 커맨드가 사용하는 glob 패턴 매처.
//!
//! 지원하는 문법: `*`, `?`, `[abc]`, `[a-z]`, `[^abc]`, `\x`

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(u8),
    // '?'
    Any,
    // '*'
    Star,
    Class { negate: bool, ranges: Vec<(u8, u8)> },
}

impl Token {
    fn matches(&self, byte: u8) -> bool {
        match self {
            Token::Literal(c) => *c == byte,
            Token::Any => true,
            Token::Star => false,
            Token::Class { negate, ranges } => {
                let hit = ranges.iter().any(|&(lo, hi)| lo <= byte && byte <= hi);
                hit != *negate
            }
        }
    }
}

/// 컴파일된 glob 패턴.
#[derive(Debug, Clone)]
pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    /// 패턴을 컴파일한다. 닫히지 않은 '['는 문자 그대로 취급한다.
    ///
    /// 패턴과 키는 바이트 단위로 비교하므로 '?'는 정확히 한 바이트에 맞는다.
    pub fn compile(src: &[u8]) -> Pattern {
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < src.len() {
            match src[i] {
                b'*' => {
                    // 연속된 '*'는 하나와 같다.
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                    i += 1;
                }
                b'?' => {
                    tokens.push(Token::Any);
                    i += 1;
                }
                b'\\' if i + 1 < src.len() => {
                    tokens.push(Token::Literal(src[i + 1]));
                    i += 2;
                }
                b'[' => match compile_class(&src[i + 1..]) {
                    Some((token, used)) => {
                        tokens.push(token);
                        i += used + 1;
                    }
                    None => {
                        tokens.push(Token::Literal(b'['));
                        i += 1;
                    }
                },
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }

        Pattern { tokens }
    }

    pub fn is_match(&self, text: &[u8]) -> bool {
        let tokens = &self.tokens;

        let (mut p, mut t) = (0, 0);
        // 마지막으로 지나친 '*'의 위치와, 그 '*'가 삼키기 시작한 텍스트 위치
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < tokens.len() {
                if tokens[p] == Token::Star {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                if tokens[p].matches(text[t]) {
                    p += 1;
                    t += 1;
                    continue;
                }
            }

            match backtrack {
                Some((star, start)) => {
                    p = star + 1;
                    t = start + 1;
                    backtrack = Some((star, start + 1));
                }
                None => return false,
            }
        }

        tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

/// '[' 다음부터 ']'까지를 읽는다. 소비한 바이트 수(']' 포함)를 함께 반환한다.
fn compile_class(src: &[u8]) -> Option<(Token, usize)> {
    let mut i = 0;
    let negate = src.first() == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut ranges = Vec::new();
    while i < src.len() {
        match src[i] {
            b']' => return Some((Token::Class { negate, ranges }, i + 1)),
            b'\\' if i + 1 < src.len() => {
                ranges.push((src[i + 1], src[i + 1]));
                i += 2;
            }
            lo if i + 2 < src.len() && src[i + 1] == b'-' && src[i + 2] != b']' => {
                let hi = src[i + 2];
                ranges.push((lo.min(hi), lo.max(hi)));
                i += 3;
            }
            c => {
                ranges.push((c, c));
                i += 1;
            }
        }
    }

    None
}
