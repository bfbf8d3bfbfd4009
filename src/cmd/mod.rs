mod keys;

mod ping;

mod string;

use crate::{Db, Frame};

use bytes::Bytes;
use std::collections::HashMap;

/// 커맨드 실행기. 인자에는 커맨드 이름이 포함되지 않는다.
pub type ExecFn = fn(&Db, &[Bytes]) -> crate::Result<Outcome>;

/**
 * 커맨드 실행 결과.
 *
 * 응답 프레임과 함께, 이 커맨드가 상태를 변경했는지를 담는다. 상태를 변경한 커맨드만
 * AOF에 기록된다.
 */
#[derive(Debug)]
pub struct Outcome {
    reply: Frame,
    write: bool,
}

impl Outcome {
    /// 상태를 변경하지 않은 실행.
    pub fn read(reply: Frame) -> Outcome {
        Outcome {
            reply,
            write: false,
        }
    }

    /// 상태를 변경한 실행.
    pub fn write(reply: Frame) -> Outcome {
        Outcome { reply, write: true }
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub fn into_reply(self) -> Frame {
        self.reply
    }
}

/**
 * 커맨드 테이블의 항목 하나.
 *
 * 'arity'가 양수이면 커맨드 이름을 포함한 정확한 인자 수이고, 음수이면 최소 인자 수를
 * 부호를 바꿔 나타낸 것이다. 예를 들어 `EXISTS k1 k2 ...`는 -2다.
 */
pub struct Command {
    executor: ExecFn,
    arity: i32,
}

impl Command {
    /// 커맨드 이름을 포함한 인자 수 'argc'가 arity를 만족하는지 확인한다.
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        let arity = self.arity as i64;
        if arity >= 0 {
            argc == arity
        } else {
            argc >= -arity
        }
    }

    pub fn execute(&self, db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
        (self.executor)(db, args)
    }
}

/**
 * 이름으로 커맨드를 찾는 테이블.
 *
 * 프로세스 초기화 시점에 한 번 만들어지고, 이후로는 읽기 전용으로 모든 'Db'가 공유한다.
 */
pub struct CommandTable {
    commands: HashMap<String, Command>,
}

impl CommandTable {
    /// 비어있는 테이블.
    pub fn new() -> CommandTable {
        CommandTable {
            commands: HashMap::new(),
        }
    }

    /// 지원하는 모든 커맨드가 등록된 테이블.
    pub fn standard() -> CommandTable {
        let mut table = CommandTable::new();
        ping::register(&mut table);
        string::register(&mut table);
        keys::register(&mut table);
        table
    }

    /// 커맨드를 등록한다. 이름은 소문자로 저장된다.
    pub fn register(&mut self, name: &str, executor: ExecFn, arity: i32) {
        self.commands
            .insert(name.to_lowercase(), Command { executor, arity });
    }

    /// 소문자 이름으로 커맨드를 찾는다.
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> CommandTable {
        CommandTable::standard()
    }
}
