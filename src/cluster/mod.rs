//! 클러스터 모드.
//!
//! 키 공간을 consistent hashing 링으로 여러 노드에 나누어 담는다. 각 노드는 자신이
//! 소유한 키만 로컬 샤드에 저장하고, 나머지는 소유 노드에 릴레이한다. 노드들은 서로를
//! 일반 클라이언트로 대하며, 릴레이는 `SELECT <db>` 뒤에 원래 커맨드를 보내는 것이다.

pub mod pool;
pub use pool::{PeerPool, PooledClient};

pub mod ring;
pub use ring::HashRing;

use crate::db::arity_error;
use crate::{to_cmd_line, Config, Frame, Session, StandaloneDatabase};

use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 커맨드를 어디서 실행할지.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    /// 항상 로컬 샤드에서 실행한다.
    Local,
    /// 첫 번째 키의 소유 노드에 릴레이한다.
    Relay,
    /// 두 키가 같은 노드에 있을 때만 그 노드에 릴레이한다.
    SameNode,
    /// 모든 노드에 보내고 응답을 합친다.
    Broadcast,
}

fn router() -> HashMap<&'static str, Route> {
    let mut router = HashMap::new();

    for name in &["ping", "select"] {
        router.insert(*name, Route::Local);
    }
    for name in &["get", "set", "setnx", "getset", "strlen", "type"] {
        router.insert(*name, Route::Relay);
    }
    for name in &["rename", "renamenx"] {
        router.insert(*name, Route::SameNode);
    }
    for name in &["del", "exists", "flushdb", "keys"] {
        router.insert(*name, Route::Broadcast);
    }

    router
}

/**
 * 클러스터 노드 하나의 데이터베이스.
 *
 * 로컬 샤드는 단독 모드 데이터베이스이며, AOF도 로컬 샤드에만 적용된다. 다른 노드가
 * 연 피어 커넥션(`PEER`로 자신을 알린 커넥션)에서 온 커맨드는 라우팅하지 않고 로컬
 * 샤드에서 실행한다.
 */
pub struct ClusterDatabase {
    self_addr: String,

    // 자기 자신을 포함한 모든 노드. 브로드캐스트 순서이기도 하다.
    nodes: Vec<String>,

    ring: HashRing,

    pools: HashMap<String, PeerPool>,

    local: StandaloneDatabase,

    router: HashMap<&'static str, Route>,
}

impl ClusterDatabase {
    pub async fn open(config: &Config) -> crate::Result<ClusterDatabase> {
        let self_addr = match &config.self_addr {
            Some(addr) => addr.clone(),
            None => return Err("cluster mode requires `self`".into()),
        };

        let local = StandaloneDatabase::open(config).await?;
        let cluster = ClusterDatabase::new(self_addr, config.peers.clone(), local);

        info!(node = %cluster.self_addr, nodes = ?cluster.nodes, "cluster mode enabled");
        Ok(cluster)
    }

    pub fn new<S: Into<String>>(
        self_addr: impl Into<String>,
        peers: impl IntoIterator<Item = S>,
        local: StandaloneDatabase,
    ) -> ClusterDatabase {
        let self_addr = self_addr.into();

        let mut nodes = vec![self_addr.clone()];
        for peer in peers {
            let peer = peer.into();
            if !peer.is_empty() && !nodes.contains(&peer) {
                nodes.push(peer);
            }
        }

        let mut ring = HashRing::new(None);
        ring.add_nodes(&nodes);

        let pools = nodes
            .iter()
            .filter(|node| **node != self_addr)
            .map(|node| (node.clone(), PeerPool::new(node.as_str())))
            .collect();

        ClusterDatabase {
            self_addr,
            nodes,
            ring,
            pools,
            local,
            router: router(),
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn local(&self) -> &StandaloneDatabase {
        &self.local
    }

    /// 'key'를 소유한 노드의 주소.
    pub fn owner_of(&self, key: &[u8]) -> &str {
        self.ring.pick_node(key).unwrap_or(self.self_addr.as_str())
    }

    /**
     * 커맨드 하나를 라우팅해 실행한다.
     *
     * 라우터에 없는 커맨드는 지원하지 않는다는 에러로 응답한다. 피어와의 통신이
     * 실패하면 그 원인을 에러 응답으로 돌려준다.
     */
    pub async fn exec(&self, session: &mut Session, line: &[Bytes]) -> Frame {
        let name = match line.first() {
            Some(name) => String::from_utf8_lossy(name).to_lowercase(),
            None => return Frame::err("empty command"),
        };

        if name == "peer" {
            session.mark_peer();
            return Frame::ok();
        }

        if session.is_peer() {
            return self.local.exec(session, line).await;
        }

        let route = match self.router.get(name.as_str()) {
            Some(route) => *route,
            None => return Frame::err(format!("not supported command '{}'", name)),
        };

        let res = match route {
            Route::Local => Ok(self.local.exec(session, line).await),
            Route::Relay => self.relay_by_key(session, &name, line).await,
            Route::SameNode => self.relay_same_node(session, &name, line).await,
            Route::Broadcast => self.broadcast(session, &name, line).await,
        };

        match res {
            Ok(reply) => reply,
            Err(err) => {
                warn!(cause = %err, command = %name, "cluster routing failed");
                Frame::err(err)
            }
        }
    }

    async fn relay_by_key(
        &self,
        session: &mut Session,
        name: &str,
        line: &[Bytes],
    ) -> crate::Result<Frame> {
        if line.len() < 2 {
            return Ok(arity_error(name));
        }

        let node = self.owner_of(&line[1]);
        self.relay(session, node, line).await
    }

    async fn relay_same_node(
        &self,
        session: &mut Session,
        name: &str,
        line: &[Bytes],
    ) -> crate::Result<Frame> {
        if line.len() != 3 {
            return Ok(arity_error(name));
        }

        let src = self.owner_of(&line[1]);
        let dest = self.owner_of(&line[2]);
        if src != dest {
            return Ok(Frame::err("rename must be within one peer"));
        }

        self.relay(session, src, line).await
    }

    /**
     * 'node'에서 커맨드를 실행한다.
     *
     * 'node'가 자기 자신이면 로컬 샤드에서 실행한다. 그렇지 않으면 풀에서 클라이언트를
     * 빌려 세션의 데이터베이스를 선택한 뒤 커맨드를 보낸다.
     */
    async fn relay(&self, session: &mut Session, node: &str, line: &[Bytes]) -> crate::Result<Frame> {
        if node == self.self_addr {
            return Ok(self.local.exec(session, line).await);
        }

        let pool = match self.pools.get(node) {
            Some(pool) => pool,
            None => return Err(format!("unknown peer '{}'", node).into()),
        };

        let mut client = pool.get().await?;

        let index = session.selected_db().to_string();
        let reply = client.send(&to_cmd_line(&["SELECT", &index])).await?;
        if reply.is_error() {
            return Ok(reply);
        }

        debug!(peer = node, "relaying command");
        client.send(line).await
    }

    /// 모든 노드에서 실행하고 응답을 커맨드에 맞게 합친다.
    async fn broadcast(
        &self,
        session: &mut Session,
        name: &str,
        line: &[Bytes],
    ) -> crate::Result<Frame> {
        let mut replies = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            replies.push(self.relay(session, node, line).await?);
        }

        if let Some(err) = replies.iter().find(|reply| reply.is_error()) {
            return Ok(err.clone());
        }

        match name {
            "flushdb" => Ok(Frame::ok()),
            "keys" => {
                let mut keys = Vec::new();
                for reply in replies {
                    match reply {
                        Frame::Array(parts) => keys.extend(parts),
                        frame => return Err(frame.to_error()),
                    }
                }
                Ok(Frame::Array(keys))
            }
            // del, exists
            _ => {
                let mut sum = 0;
                for reply in replies {
                    match reply {
                        Frame::Integer(n) => sum += n,
                        frame => return Err(frame.to_error()),
                    }
                }
                Ok(Frame::Integer(sum))
            }
        }
    }

    /// 로컬 샤드만 닫는다. 피어는 각자 자신의 샤드를 닫는다.
    pub async fn close(&self) {
        self.local.close().await;
    }
}
