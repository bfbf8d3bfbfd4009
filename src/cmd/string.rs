//! 문자열 값을 다루는 커맨드.

use crate::cmd::{CommandTable, Outcome};
use crate::{Db, Entity, Frame};

use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("get", get, 2);
    table.register("set", set, 3);
    table.register("setnx", setnx, 3);
    table.register("getset", getset, 3);
    table.register("strlen", strlen, 2);
}

/// `GET key`
///
/// 키가 없으면 null bulk로 응답한다.
fn get(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let reply = match db.get_entity(&args[0]) {
        Some(Entity::Bytes(value)) => Frame::Bulk(value),
        None => Frame::Null,
    };
    Ok(Outcome::read(reply))
}

/// `SET key value`
fn set(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    db.put_entity(args[0].clone(), Entity::Bytes(args[1].clone()));
    Ok(Outcome::write(Frame::ok()))
}

/// `SETNX key value`
///
/// 키가 없을 때만 저장하고 1로, 이미 있으면 아무것도 하지 않고 0으로 응답한다.
fn setnx(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let result = db.put_if_absent(args[0].clone(), Entity::Bytes(args[1].clone()));
    if result == 1 {
        Ok(Outcome::write(Frame::Integer(1)))
    } else {
        Ok(Outcome::read(Frame::Integer(0)))
    }
}

/// `GETSET key value`
///
/// 새 값을 저장하고 이전 값으로 응답한다.
fn getset(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let old = db.get_entity(&args[0]);
    db.put_entity(args[0].clone(), Entity::Bytes(args[1].clone()));

    let reply = match old {
        Some(Entity::Bytes(value)) => Frame::Bulk(value),
        None => Frame::Null,
    };
    Ok(Outcome::write(reply))
}

/// `STRLEN key`
fn strlen(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let reply = match db.get_entity(&args[0]) {
        Some(Entity::Bytes(value)) => Frame::Integer(value.len() as i64),
        None => Frame::Null,
    };
    Ok(Outcome::read(reply))
}

#[cfg(test)]
mod tests {
    use crate::cmd::CommandTable;
    use crate::{to_cmd_line, Db, Frame};
    use std::sync::Arc;

    async fn run(db: &Db, parts: &[&str]) -> Frame {
        db.exec(&to_cmd_line(parts)).await.unwrap()
    }

    fn db() -> Db {
        Db::new(0, Arc::new(CommandTable::standard()))
    }

    #[tokio::test]
    async fn set_then_get() {
        let db = db();
        assert_eq!(run(&db, &["GET", "k"]).await, Frame::Null);
        assert_eq!(run(&db, &["SET", "k", "v"]).await, Frame::ok());
        assert_eq!(run(&db, &["GET", "k"]).await, "v");
        assert_eq!(run(&db, &["SET", "k", "w"]).await, Frame::ok());
        assert_eq!(run(&db, &["GET", "k"]).await, "w");
    }

    #[tokio::test]
    async fn setnx_only_sets_absent_keys() {
        let db = db();
        assert_eq!(run(&db, &["SETNX", "k", "1"]).await, Frame::Integer(1));
        assert_eq!(run(&db, &["SETNX", "k", "2"]).await, Frame::Integer(0));
        assert_eq!(run(&db, &["GET", "k"]).await, "1");
    }

    #[tokio::test]
    async fn getset_returns_previous_value() {
        let db = db();
        assert_eq!(run(&db, &["GETSET", "k", "1"]).await, Frame::Null);
        assert_eq!(run(&db, &["GETSET", "k", "2"]).await, "1");
        assert_eq!(run(&db, &["GET", "k"]).await, "2");
    }

    #[tokio::test]
    async fn strlen_of_value() {
        let db = db();
        assert_eq!(run(&db, &["STRLEN", "k"]).await, Frame::Null);
        run(&db, &["SET", "k", "hello"]).await;
        assert_eq!(run(&db, &["STRLEN", "k"]).await, Frame::Integer(5));
    }
}
