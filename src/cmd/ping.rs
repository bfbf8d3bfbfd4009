use crate::cmd::{CommandTable, Outcome};
use crate::{Db, Frame};

use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("ping", ping, 1);
}

/// `PING`. 커넥션이 살아있는지 확인한다.
fn ping(_db: &Db, _args: &[Bytes]) -> crate::Result<Outcome> {
    Ok(Outcome::read(Frame::Simple("PONG".to_string())))
}
