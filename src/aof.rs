//! Append-only 파일.
//!
//! 변경 커맨드를 실행 순서대로 기록하고, 시작 시 기록된 커맨드를 다시 실행하여
//! 데이터를 복구한다. 파일 형식은 와이어 프로토콜의 배열 프레임을 이어 붙인 것이며,
//! 대상 데이터베이스가 바뀔 때마다 `SELECT <index>` 프레임이 끼어든다.

use crate::database::{Session, StandaloneDatabase};
use crate::{parse_stream, to_cmd_line, CmdLine, Frame, ParseError, Shutdown};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;

/**
 * AOF 큐의 용량.
 *
 * 큐가 가득 차면 커맨드를 실행한 커넥션 태스크는 writer 태스크가 자리를 비울 때까지
 * 대기한다.
 */
pub const AOF_QUEUE_CAPACITY: usize = 1 << 16;

/// 기록 대기 중인 커맨드 하나. writer 태스크가 정확히 한 번 소비한다.
#[derive(Debug)]
struct AofPayload {
    db_index: usize,
    line: CmdLine,
}

/**
 * AOF 큐에 커맨드를 넣는 핸들.
 *
 * 각 논리 데이터베이스가 clone을 하나씩 가진다. clone은 채널 sender의 clone일 뿐이다.
 */
#[derive(Clone, Debug)]
pub struct AofSender {
    tx: mpsc::Sender<AofPayload>,
}

impl AofSender {
    /// 커맨드를 큐에 넣는다. 큐가 가득 찼다면 대기한다.
    pub(crate) async fn append(&self, db_index: usize, line: CmdLine) {
        if self.tx.send(AofPayload { db_index, line }).await.is_err() {
            warn!(db_index, "aof writer has stopped; dropping record");
        }
    }
}

/**
 * AOF writer 태스크를 소유한다.
 *
 * 파일에 쓰는 것은 오직 writer 태스크 하나뿐이다. 여러 커넥션에서 동시에 들어온
 * 커맨드는 큐에 들어간 순서대로 하나씩 기록되며, 기록끼리 섞이지 않는다.
 */
pub struct AofHandler {
    path: PathBuf,

    sender: AofSender,

    // writer 태스크에 종료를 알린다.
    notify_shutdown: broadcast::Sender<()>,

    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AofHandler {
    /**
     * 파일을 append 모드로 열고 writer 태스크를 가동한다.
     *
     * 'current_db'는 기존 파일의 끝에서 선택되어 있는 데이터베이스다. 재생 결과의
     * 'Replay::selected_db'를 넘겨야 이어서 쓰는 기록이 올바른 데이터베이스로 재생된다.
     */
    pub async fn start(path: impl AsRef<Path>, current_db: usize) -> crate::Result<AofHandler> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(AOF_QUEUE_CAPACITY);
        let (notify_shutdown, _) = broadcast::channel(1);

        let writer = Writer {
            dst: file,
            rx,
            current_db,
            shutdown: Shutdown::new(notify_shutdown.subscribe()),
        };

        let span = info_span!("aof", path = %path.display());
        let handle = tokio::spawn(
            async move {
                writer.run().await;
            }
            .instrument(span),
        );

        Ok(AofHandler {
            path,
            sender: AofSender { tx },
            notify_shutdown,
            writer: Mutex::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sender(&self) -> AofSender {
        self.sender.clone()
    }

    /**
     * writer 태스크를 정지한다.
     *
     * 이미 큐에 들어간 커맨드는 모두 기록된 뒤에 반환한다. 두 번째 호출부터는 아무
     * 일도 하지 않는다.
     */
    pub async fn close(&self) {
        let _ = self.notify_shutdown.send(());

        let handle = match self.writer.lock() {
            Ok(mut writer) => writer.take(),
            Err(_) => None,
        };

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(cause = %err, "aof writer task failed");
            }
        }
    }
}

/// 큐를 비우며 파일에 쓰는 태스크의 상태.
struct Writer<W> {
    dst: W,

    rx: mpsc::Receiver<AofPayload>,

    // 파일 끝에서 선택되어 있는 데이터베이스 인덱스
    current_db: usize,

    shutdown: Shutdown,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    /// 종료 신호를 받거나 모든 sender가 drop될 때까지 큐를 비운다.
    async fn run(mut self) -> W {
        while !self.shutdown.is_shutdown() {
            let payload = tokio::select! {
                payload = self.rx.recv() => payload,
                _ = self.shutdown.recv() => break,
            };

            match payload {
                Some(payload) => self.write(payload).await,
                None => break,
            }
        }

        // 종료 신호 이전에 큐에 들어간 것은 모두 기록한다.
        while let Ok(payload) = self.rx.try_recv() {
            self.write(payload).await;
        }

        if let Err(err) = self.dst.flush().await {
            warn!(cause = %err, "failed to flush aof file");
        }
        debug!("aof writer stopped");
        self.dst
    }

    /// 기록 하나. 실패하면 로그를 남기고 그 기록만 버린다.
    async fn write(&mut self, payload: AofPayload) {
        if payload.db_index != self.current_db {
            let index = payload.db_index.to_string();
            let select = Frame::from_cmd_line(&to_cmd_line(&["SELECT", &index]));

            if let Err(err) = self.write_frame(&select).await {
                warn!(cause = %err, db_index = payload.db_index, "failed to write select; dropping record");
                return;
            }
            self.current_db = payload.db_index;
        }

        if let Err(err) = self.write_frame(&Frame::from_cmd_line(&payload.line)).await {
            warn!(cause = %err, "failed to write aof record; dropping it");
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.dst.write_all(&frame.to_bytes()).await?;
        self.dst.flush().await
    }
}

/// 'load'의 결과.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Replay {
    /// 재생한 커맨드의 수
    pub commands: usize,

    /// 파일 끝에서 선택되어 있는 데이터베이스. writer는 여기서부터 이어서 쓴다.
    pub selected_db: usize,
}

/**
 * AOF 파일을 'database'에 재생한다.
 *
 * 커넥션 하나를 흉내 낸 세션으로 실행하므로 `SELECT` 프레임이 대상 데이터베이스를
 * 바꾼다. 디코딩이나 실행에 실패한 기록은 로그를 남기고 건너뛴다. 파일이 없으면
 * 재생할 것이 없는 것으로 간주한다.
 *
 * 재생한 커맨드의 수와, 재생을 마친 시점에 선택되어 있는 데이터베이스를 반환한다.
 */
pub async fn load(path: impl AsRef<Path>, database: &StandaloneDatabase) -> Replay {
    let path = path.as_ref();

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            info!(cause = %err, path = %path.display(), "no aof file to replay");
            return Replay::default();
        }
    };

    let mut session = Session::new();
    let mut replayed = 0;

    let stream = parse_stream(file);
    tokio::pin!(stream);

    while let Some(payload) = stream.next().await {
        let frame = match payload {
            Ok(frame) => frame,
            Err(ParseError::Eof) => break,
            Err(err) => {
                error!(cause = %err, "failed to decode aof record");
                continue;
            }
        };

        let line = match frame.into_cmd_line() {
            Some(line) if !line.is_empty() => line,
            _ => {
                error!("aof record is not a multi bulk command");
                continue;
            }
        };

        let reply = database.exec(&mut session, &line).await;
        if let Frame::Error(msg) = &reply {
            error!(%msg, "aof record failed");
        }
        replayed += 1;
    }

    let selected_db = session.selected_db();
    info!(replayed, selected_db, path = %path.display(), "aof loaded");
    Replay {
        commands: replayed,
        selected_db,
    }
}
