use tokio::sync::broadcast;

/**
 * 종료 알림을 기다리는 쪽의 핸들.
 *
 * 알림은 'broadcast' 채널로 전달되며, 값이 전송되거나 sender가 모두 drop되면 종료로
 * 간주한다. 커넥션 핸들러와 AOF writer가 각자 하나씩 가진다.
 */
#[derive(Debug)]
pub(crate) struct Shutdown {
    // 알림을 이미 받았는지
    shutdown: bool,

    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// 종료 알림을 받을 때까지 기다린다. 이미 받았다면 즉시 반환한다.
    pub(crate) async fn recv(&mut self) {
        if self.shutdown {
            return;
        }

        // 값은 최대 하나만 전송되므로 lag 에러는 생기지 않는다.
        let _ = self.notify.recv().await;

        self.shutdown = true;
    }
}
