use crate::client::{self, Client};
use crate::Frame;

use bytes::Bytes;
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{self, Duration};
use tracing::debug;

/// 피어 하나에 대해 동시에 유지하는 최대 클라이언트 수.
pub const MAX_PEER_CLIENTS: usize = 8;

/// 클라이언트를 빌리기 위해 기다리는 최대 시간.
pub const BORROW_TIMEOUT: Duration = Duration::from_secs(5);

/**
 * 피어 노드 하나로의 클라이언트 풀.
 *
 * 빌려간 클라이언트와 유휴 클라이언트를 합한 수는 'max_clients'를 넘지 않는다. 풀이
 * 고갈되면 빌리는 쪽은 'timeout'까지 기다린다. 유휴 클라이언트가 없으면 새로
 * 연결하며, 새 클라이언트는 먼저 자신이 피어 커넥션임을 알린다.
 */
pub struct PeerPool {
    addr: String,

    idle: Mutex<Vec<Client>>,

    // 유휴 + 대여 중인 클라이언트 수를 제한한다.
    permits: Semaphore,

    timeout: Duration,
}

impl PeerPool {
    pub fn new(addr: impl Into<String>) -> PeerPool {
        PeerPool::with_limits(addr, MAX_PEER_CLIENTS, BORROW_TIMEOUT)
    }

    pub fn with_limits(addr: impl Into<String>, max_clients: usize, timeout: Duration) -> PeerPool {
        PeerPool {
            addr: addr.into(),
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(max_clients),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /**
     * 클라이언트 하나를 빌린다.
     *
     * 'timeout' 안에 자리가 나지 않으면 에러를 반환한다. 연결에 실패해도 에러다.
     */
    pub async fn get(&self) -> crate::Result<PooledClient<'_>> {
        let permit = match time::timeout(self.timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            _ => return Err("peer pool exhausted".into()),
        };

        let idle = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let client = match idle {
            Some(client) => client,
            None => self.connect().await?,
        };

        Ok(PooledClient {
            pool: self,
            client: Some(client),
            broken: false,
            _permit: permit,
        })
    }

    async fn connect(&self) -> crate::Result<Client> {
        debug!(peer = %self.addr, "connecting to peer");
        let mut client = client::connect(self.addr.as_str()).await?;
        client.announce_peer().await?;
        Ok(client)
    }

    fn put_back(&self, client: Client) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }
}

/**
 * 풀에서 빌린 클라이언트.
 *
 * drop되면 클라이언트를 풀에 돌려준다. 요청 도중 I/O 에러가 난 클라이언트는 버려진다.
 */
pub struct PooledClient<'a> {
    pool: &'a PeerPool,
    client: Option<Client>,
    broken: bool,
    _permit: SemaphorePermit<'a>,
}

impl PooledClient<'_> {
    pub async fn send(&mut self, line: &[Bytes]) -> crate::Result<Frame> {
        let client = match self.client.as_mut() {
            Some(client) => client,
            None => return Err("pooled client is gone".into()),
        };

        let res = client.send(line).await;
        if res.is_err() {
            self.broken = true;
        }
        res
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if !self.broken {
                self.pool.put_back(client);
            }
        }
    }
}
