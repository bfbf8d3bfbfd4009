use crate::aof::{self, AofHandler};
use crate::cluster::ClusterDatabase;
use crate::cmd::CommandTable;
use crate::db::arity_error;
use crate::{Config, Db, Frame};

use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};

/// 논리 데이터베이스의 기본 개수.
pub const DEFAULT_DATABASES: usize = 16;

/**
 * 커넥션 하나의 상태.
 *
 * 선택된 데이터베이스 인덱스와, 이 커넥션이 다른 클러스터 노드가 연 피어 커넥션인지를
 * 담는다. 커넥션이 수락될 때 만들어지고 커넥션이 끊기면 버려진다.
 */
#[derive(Debug, Default, Clone)]
pub struct Session {
    selected_db: usize,
    peer: bool,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    pub fn selected_db(&self) -> usize {
        self.selected_db
    }

    pub(crate) fn select(&mut self, index: usize) {
        self.selected_db = index;
    }

    pub fn is_peer(&self) -> bool {
        self.peer
    }

    pub(crate) fn mark_peer(&mut self) {
        self.peer = true;
    }
}

/**
 * 서버가 커맨드를 넘기는 최상위 데이터베이스.
 *
 * 설정에 `self`와 `peers`가 모두 있으면 클러스터 모드로, 그렇지 않으면 단독 모드로
 * 동작한다. 두 경우 모두 같은 실행 계약을 따른다. 커맨드 하나에 응답 프레임 하나를
 * 반환하며, 실패도 에러 프레임으로 반환된다.
 */
pub enum Database {
    Standalone(StandaloneDatabase),
    Cluster(ClusterDatabase),
}

impl Database {
    pub async fn open(config: &Config) -> crate::Result<Database> {
        if config.cluster_enabled() {
            Ok(Database::Cluster(ClusterDatabase::open(config).await?))
        } else {
            Ok(Database::Standalone(StandaloneDatabase::open(config).await?))
        }
    }

    pub async fn exec(&self, session: &mut Session, line: &[Bytes]) -> Frame {
        match self {
            Database::Standalone(db) => db.exec(session, line).await,
            Database::Cluster(db) => db.exec(session, line).await,
        }
    }

    pub async fn close(&self) {
        match self {
            Database::Standalone(db) => db.close().await,
            Database::Cluster(db) => db.close().await,
        }
    }
}

/**
 * N개의 논리 데이터베이스와 선택적인 AOF로 구성된 단독 모드 데이터베이스.
 *
 * 각 'Db'는 이 인스턴스가 독점적으로 소유하며, 프로세스가 끝날 때까지 제거되지 않는다.
 */
pub struct StandaloneDatabase {
    dbs: Vec<Db>,
    aof: Option<AofHandler>,
}

impl StandaloneDatabase {
    /// AOF 없이 'databases'개의 논리 데이터베이스를 만든다. 0이면 기본값을 사용한다.
    pub fn new(databases: usize) -> StandaloneDatabase {
        StandaloneDatabase::with_table(databases, Arc::new(CommandTable::standard()))
    }

    pub fn with_table(databases: usize, table: Arc<CommandTable>) -> StandaloneDatabase {
        let databases = if databases == 0 {
            DEFAULT_DATABASES
        } else {
            databases
        };

        let dbs = (0..databases)
            .map(|index| Db::new(index, table.clone()))
            .collect();

        StandaloneDatabase { dbs, aof: None }
    }

    /**
     * 설정에 따라 데이터베이스를 연다.
     *
     * AOF가 켜져 있다면 기존 파일을 먼저 재생한 뒤에 writer를 가동하고 각 'Db'에 훅을
     * 붙인다. 재생 중에 실행된 커맨드가 다시 기록되지 않도록 하기 위함이다.
     */
    pub async fn open(config: &Config) -> crate::Result<StandaloneDatabase> {
        let mut database = StandaloneDatabase::new(config.databases);

        if config.append_only {
            let replay = aof::load(&config.append_filename, &database).await;

            let handler = AofHandler::start(&config.append_filename, replay.selected_db).await?;
            for db in database.dbs.iter_mut() {
                db.attach_aof(handler.sender());
            }
            info!(path = %handler.path().display(), "append only file enabled");
            database.aof = Some(handler);
        }

        Ok(database)
    }

    pub fn len(&self) -> usize {
        self.dbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty()
    }

    pub fn db(&self, index: usize) -> Option<&Db> {
        self.dbs.get(index)
    }

    /**
     * 커맨드 하나를 'session'이 선택한 데이터베이스에서 실행한다.
     *
     * `SELECT`는 여기서 직접 처리한다. 실행기 내부의 실패는 로그를 남기고 기본 에러
     * 응답으로 바꾼다.
     */
    pub async fn exec(&self, session: &mut Session, line: &[Bytes]) -> Frame {
        let name = match line.first() {
            Some(name) => String::from_utf8_lossy(name).to_lowercase(),
            None => return Frame::err("empty command"),
        };

        if name == "select" {
            if line.len() != 2 {
                return arity_error("select");
            }
            return self.select(session, &line[1]);
        }

        let db = match self.dbs.get(session.selected_db()) {
            Some(db) => db,
            None => return Frame::err("DB index is out of range"),
        };

        match db.exec(line).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(cause = %err, command = %name, "command failed");
                Frame::err("unknown")
            }
        }
    }

    fn select(&self, session: &mut Session, arg: &Bytes) -> Frame {
        let index = match std::str::from_utf8(arg).ok().and_then(|s| s.parse::<usize>().ok()) {
            Some(index) => index,
            None => return Frame::err("invalid DB index"),
        };

        if index >= self.dbs.len() {
            return Frame::err("DB index is out of range");
        }

        session.select(index);
        Frame::ok()
    }

    /// AOF writer를 정지한다. 큐에 남은 기록은 모두 파일에 쓰인다.
    pub async fn close(&self) {
        if let Some(aof) = &self.aof {
            aof.close().await;
        }
    }
}
