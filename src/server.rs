//! redis-shard 서버 구현.
//!
//! 인바운드 커넥션을 수신하는 비동기 'run' 함수를 제공한다. 커넥션마다 태스크를
//! 하나씩 가동하고, 수신한 커맨드를 'Database'에 위임한다.

use crate::{Connection, Database, Frame, ParseError, Session, Shutdown};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, instrument};

/**
 * 서버 리스너 상태. 'run' 호출 안에서 생성된다. TCP 리스닝을 수행하고 커넥션마다의
 * 상태를 초기화한다.
 */
struct Listener {
    /**
     * 공유 데이터베이스 핸들.
     *
     * 'Arc'로 감싸 각 커넥션의 'Handler'에 clone을 넘긴다.
     */
    database: Arc<Database>,

    listener: TcpListener,

    /**
     * 최대 커넥션 수를 제한한다.
     *
     * 새로운 커넥션을 수락하기 전에 permit을 획득해야 한다. 획득하지 못하면 리스너는
     * 대기한다. 핸들러가 커넥션 처리를 마치면 permit을 세마포어에 반환한다.
     */
    limit_connections: Arc<Semaphore>,

    /**
     * 셧다운 시그널을 모든 유효한 커넥션에게 브로드캐스팅한다.
     *
     * 커넥션 태스크는 수신자를 하나씩 가진다. graceful 셧다운이 시작되면 각 커넥션은
     * 처리 중인 응답을 마치고 태스크를 종료한다.
     */
    notify_shutdown: broadcast::Sender<()>,

    /**
     * graceful 셧다운 중 커넥션들의 처리 완료를 기다리는 데 사용된다.
     *
     * 각 핸들러는 'shutdown_complete_tx'의 clone을 가진다. 모든 clone이 drop되면
     * 'shutdown_complete_rx.recv()'가 'None'으로 완료된다.
     */
    shutdown_complete_rx: mpsc::Receiver<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

/**
 * 각 커넥션의 핸들러. 'connection'으로부터 요청을 읽어 그 커맨드를 'database'에
 * 수행한다.
 */
struct Handler {
    database: Arc<Database>,

    connection: Connection,

    // 선택된 데이터베이스와 피어 여부. 커넥션이 끊기면 함께 버려진다.
    session: Session,

    /**
     * 최대 커넥션 세마포어.
     *
     * 핸들러 drop 시 이 세마포어에 permit을 반환한다.
     */
    limit_connections: Arc<Semaphore>,

    /**
     * 셧다운 알림을 받는다.
     *
     * 커넥션 핸들러는 상대가 연결을 끊거나 셧다운 알림을 받을 때까지 요청을 처리한다.
     * 후자의 경우, 처리 중인 커맨드의 응답은 끝까지 쓴다.
     */
    shutdown: Shutdown,

    // 직접 사용하지 않는다. 'Handler'가 drop되면 리스너가 이를 감지한다.
    _shutdown_complete: mpsc::Sender<()>,
}

/**
 * redis-shard 서버를 가동한다.
 *
 * 리스너로부터 커넥션을 수락하고, 커넥션마다 핸들링 태스크를 하나씩 가동한다. 서버는
 * 'shutdown' future가 완료될 때까지 가동한다. 셧다운이 시작되면 새 커넥션은 더 이상
 * 수락하지 않고, 기존 커넥션이 모두 끝나기를 기다린 뒤 'database'를 닫는다.
 *
 * 'tokio::signal::ctrl_c()'를 'shutdown' 아규먼트로 사용할 수 있다.
 */
pub async fn run(
    listener: TcpListener,
    database: Database,
    max_clients: usize,
    shutdown: impl Future,
) -> crate::Result<()> {
    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

    let mut server = Listener {
        listener,
        database: Arc::new(database),
        limit_connections: Arc::new(Semaphore::new(max_clients)),
        notify_shutdown,
        shutdown_complete_tx,
        shutdown_complete_rx,
    };

    // 수락 루프는 이 'select!'가 끝나는 순간 drop되므로, 셧다운 이후의 커넥션은
    // 수락되지 않는다.
    tokio::select! {
        res = server.run() => {
            /*
             * 여기서 에러를 수신하면 TCP 리스너로부터의 커넥션 수락이 여러번 실패했다는
             * 의미이며, 서버는 실행을 그만두고 셧다운한다.
             */
            if let Err(err) = res {
                error!(cause = %err, "failed to accept");
            }
        }
        _ = shutdown => {
            info!("shutting down");
        }
    }

    let Listener {
        database,
        mut shutdown_complete_rx,
        shutdown_complete_tx,
        notify_shutdown,
        ..
    } = server;

    // 구독 중인 모든 커넥션 태스크가 셧다운 시그널을 수신한다.
    drop(notify_shutdown);
    // 아래의 'Receiver'를 완료하기 위해 마지막 'Sender'를 drop한다.
    drop(shutdown_complete_tx);

    let _ = shutdown_complete_rx.recv().await;

    database.close().await;
    info!("server stopped");

    Ok(())
}

impl Listener {
    /**
     * 인바운드 커넥션을 수신한다. 각 인바운드 커넥션마다 그 커넥션을 핸들링할 태스크를
     * 시작한다.
     *
     * # Errors
     *
     * 백오프를 거친 뒤에도 커넥션 수락에 실패하면 'Err'를 반환한다.
     */
    async fn run(&mut self) -> crate::Result<()> {
        info!("accepting inbound connections");

        loop {
            /*
             * 가용 permit을 기다린다. permit은 핸들러 태스크가 끝날 때 반환해야 하므로
             * 여기서는 'forget'하고, 'Handler'의 'Drop'에서 직접 추가한다.
             */
            self.limit_connections.acquire().await?.forget();

            let (socket, peer) = self.accept().await?;

            let mut handler = Handler {
                database: self.database.clone(),
                connection: Connection::new(socket),
                session: Session::new(),
                limit_connections: self.limit_connections.clone(),
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(async move {
                if let Err(err) = handler.run(peer).await {
                    error!(cause = ?err, "connection error");
                }
            });
        }
    }

    /**
     * 인바운드 커넥션을 수락한다.
     *
     * 에러는 지수 백오프 & 재시도로 핸들링한다. 첫 실패 후 1초, 이후 실패마다 대기
     * 시간을 2배씩 늘리며, 64초 대기 후에도 실패하면 에러를 반환한다.
     */
    async fn accept(&mut self) -> crate::Result<(TcpStream, SocketAddr)> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(err.into());
                    }
                    debug!(cause = %err, backoff, "accept failed; retrying");
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;

            backoff *= 2;
        }
    }
}

impl Handler {
    /**
     * 단일 커넥션을 핸들링한다.
     *
     * 소켓으로부터 커맨드를 읽어 하나씩 실행하고, 응답을 요청 순서대로 다시 소켓에
     * 쓴다. 잘못된 형식의 프레임에는 에러로 응답하고 다음 프레임을 계속 읽는다.
     *
     * 셧다운 시그널을 수신하면 처리 중인 커맨드의 응답까지만 쓰고 종료한다.
     */
    #[instrument(skip(self))]
    async fn run(&mut self, peer: SocketAddr) -> crate::Result<()> {
        while !self.shutdown.is_shutdown() {
            let payload = tokio::select! {
                payload = self.connection.read_payload() => payload,
                _ = self.shutdown.recv() => break,
            };

            let frame = match payload {
                Some(Ok(frame)) => frame,
                // 상대가 소켓을 닫았다.
                Some(Err(ParseError::Eof)) | None => break,
                Some(Err(err)) if err.is_terminal() => return Err(err.into()),
                Some(Err(err)) => {
                    self.connection.write_frame(&Frame::err(err)).await?;
                    continue;
                }
            };

            let reply = match frame.into_cmd_line() {
                Some(line) if !line.is_empty() => {
                    debug!(cmd = %String::from_utf8_lossy(&line[0]), args = line.len() - 1);
                    self.database.exec(&mut self.session, &line).await
                }
                _ => Frame::err("protocol error: expected a command array"),
            };

            self.connection.write_frame(&reply).await?;
        }

        self.connection.close().await;
        Ok(())
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        /*
         * 세마포어에 permit 하나를 반환한다. 커넥션 태스크가 panic으로 끝나더라도
         * permit이 반환된다.
         */
        self.limit_connections.add_permits(1);
    }
}
