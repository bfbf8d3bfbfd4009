//! 키 공간을 다루는 커맨드.

use crate::cmd::{CommandTable, Outcome};
use crate::glob::Pattern;
use crate::{Db, Frame};

use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("del", del, -2);
    table.register("exists", exists, -2);
    // FLUSHDB 뒤의 인자는 무시한다.
    table.register("flushdb", flushdb, -1);
    table.register("type", type_of, 2);
    table.register("rename", rename, 3);
    table.register("renamenx", renamenx, 3);
    table.register("keys", keys, 2);
}

/// `DEL key [key ...]`
///
/// 호출 직전에 존재했던 키의 수로 응답한다. 없는 키는 조용히 건너뛴다.
fn del(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let deleted = db.removes(args);

    let reply = Frame::Integer(deleted);
    if deleted > 0 {
        Ok(Outcome::write(reply))
    } else {
        Ok(Outcome::read(reply))
    }
}

/// `EXISTS key [key ...]`
fn exists(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let count = args
        .iter()
        .filter(|arg| db.data().contains_key(arg))
        .count();
    Ok(Outcome::read(Frame::Integer(count as i64)))
}

/// `FLUSHDB`
fn flushdb(db: &Db, _args: &[Bytes]) -> crate::Result<Outcome> {
    db.flush();
    Ok(Outcome::write(Frame::ok()))
}

/// `TYPE key`
fn type_of(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let name = match db.get_entity(&args[0]) {
        Some(entity) => entity.type_name(),
        None => "none",
    };
    Ok(Outcome::read(Frame::Simple(name.to_string())))
}

/// `RENAME src dest`
///
/// 'src'와 'dest'가 같으면 키가 존재하는지만 확인하고 아무것도 바꾸지 않는다.
fn rename(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let (src, dest) = (&args[0], &args[1]);

    let entity = match db.get_entity(src) {
        Some(entity) => entity,
        None => return Ok(Outcome::read(Frame::err("no such key"))),
    };

    if src == dest {
        return Ok(Outcome::read(Frame::ok()));
    }

    db.put_entity(dest.clone(), entity);
    db.remove(src);
    Ok(Outcome::write(Frame::ok()))
}

/// `RENAMENX src dest`
///
/// 'dest'가 이미 존재하면 아무것도 하지 않고 0으로 응답한다. 'src'와 'dest'가 같을
/// 때도 마찬가지다.
fn renamenx(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let (src, dest) = (&args[0], &args[1]);

    if db.data().contains_key(dest) {
        return Ok(Outcome::read(Frame::Integer(0)));
    }

    let entity = match db.get_entity(src) {
        Some(entity) => entity,
        None => return Ok(Outcome::read(Frame::err("no such key"))),
    };

    db.put_entity(dest.clone(), entity);
    db.remove(src);
    Ok(Outcome::write(Frame::Integer(1)))
}

/// `KEYS pattern`
fn keys(db: &Db, args: &[Bytes]) -> crate::Result<Outcome> {
    let pattern = Pattern::compile(&args[0]);

    let mut reply = Frame::array();
    db.data().for_each(|key, _| {
        if pattern.is_match(key) {
            reply.push_bulk(key.clone());
        }
        true
    });
    Ok(Outcome::read(reply))
}
