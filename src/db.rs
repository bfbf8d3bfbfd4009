use crate::aof::AofSender;
use crate::cmd::CommandTable;
use crate::{Dict, Frame};

use bytes::Bytes;
use std::sync::Arc;

/// 사전에 저장되는 값. 갱신할 때는 통째로 교체되며, 제자리에서 수정되지 않는다.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Bytes(Bytes),
}

impl Entity {
    /// `TYPE` 커맨드가 보고하는 타입 이름.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::Bytes(_) => "string",
        }
    }
}

/**
 * 논리 데이터베이스 하나.
 *
 * 인덱스, 키/값 사전, 그리고 변경 커맨드를 AOF에 넘기는 훅으로 구성된다. 훅은 AOF가
 * 켜져 있을 때만 붙으며, 그렇지 않으면 아무 일도 하지 않는다.
 *
 * 커맨드 테이블은 모든 'Db'가 'Arc'로 공유하며, 생성 이후 수정되지 않는다.
 */
pub struct Db {
    index: usize,
    data: Dict<Entity>,
    table: Arc<CommandTable>,
    aof: Option<AofSender>,
}

impl Db {
    pub fn new(index: usize, table: Arc<CommandTable>) -> Db {
        Db {
            index,
            data: Dict::new(),
            table,
            aof: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 이후 실행되는 변경 커맨드를 'aof'로 보낸다.
    pub(crate) fn attach_aof(&mut self, aof: AofSender) {
        self.aof = Some(aof);
    }

    /**
     * 커맨드 라인 하나를 실행한다.
     *
     * 알 수 없는 커맨드나 인자 수가 맞지 않는 커맨드는 에러 응답으로 끝난다. 상태를
     * 변경한 커맨드는 변경이 반영된 뒤에 실행된 커맨드 라인 그대로 AOF에 넘긴다.
     *
     * 'Err'는 실행기 내부의 예상하지 못한 실패를 나타내며, 응답으로의 변환은 호출자의
     * 몫이다.
     */
    pub async fn exec(&self, line: &[Bytes]) -> crate::Result<Frame> {
        let name = match line.first() {
            Some(name) => String::from_utf8_lossy(name).to_lowercase(),
            None => return Ok(Frame::err("empty command")),
        };

        let cmd = match self.table.lookup(&name) {
            Some(cmd) => cmd,
            None => return Ok(Frame::err(format!("unknown command '{}'", name))),
        };

        if !cmd.accepts(line.len()) {
            return Ok(arity_error(&name));
        }

        let outcome = cmd.execute(self, &line[1..])?;

        if outcome.is_write() {
            if let Some(aof) = &self.aof {
                aof.append(self.index, line.to_vec()).await;
            }
        }

        Ok(outcome.into_reply())
    }

    pub fn get_entity(&self, key: &[u8]) -> Option<Entity> {
        self.data.get(key)
    }

    pub fn put_entity(&self, key: Bytes, entity: Entity) -> i64 {
        self.data.put(key, entity)
    }

    pub fn put_if_absent(&self, key: Bytes, entity: Entity) -> i64 {
        self.data.put_if_absent(key, entity)
    }

    pub fn remove(&self, key: &[u8]) -> Option<Entity> {
        self.data.remove(key)
    }

    /// 키들을 삭제하고, 실제로 존재했던 키의 수를 반환한다.
    pub fn removes<'a>(&self, keys: impl IntoIterator<Item = &'a Bytes>) -> i64 {
        keys.into_iter()
            .filter(|key| self.data.remove(key).is_some())
            .count() as i64
    }

    pub fn flush(&self) {
        self.data.clear();
    }

    pub fn data(&self) -> &Dict<Entity> {
        &self.data
    }
}

/// 인자 수가 맞지 않을 때의 응답.
pub(crate) fn arity_error(name: &str) -> Frame {
    Frame::err(format!("wrong number of arguments for '{}' command", name))
}
