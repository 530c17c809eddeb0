use tokio::sync::mpsc;
use tracing::debug;

use super::codec::SsoResponse;

/// Receiving end of the push channel. Yields server-initiated frames.
pub type PushReceiver = mpsc::UnboundedReceiver<SsoResponse>;

/// Delivers frames nobody was waiting for.
#[derive(Debug, Clone)]
pub struct PushSink {
    tx: mpsc::UnboundedSender<SsoResponse>,
}

/// Create a connected sink/receiver pair. The channel is unbounded: the
/// protocol has no flow control for pushes.
pub fn push_channel() -> (PushSink, PushReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PushSink { tx }, rx)
}

impl PushSink {
    pub fn deliver(&self, resp: SsoResponse) {
        let (seq, command) = (resp.sequence, resp.command.clone());
        if self.tx.send(resp).is_err() {
            debug!("[seq={seq}] push {command} dropped: no consumer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(seq: i32) -> SsoResponse {
        SsoResponse {
            return_code: 0,
            command: "trpc.msg.olpush.OlPushService.MsgPush".to_string(),
            payload: vec![],
            sequence: seq,
            extra: None,
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_closed_receiver() {
        let (sink, mut rx) = push_channel();
        sink.deliver(push(1));
        sink.clone().deliver(push(2));
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
        drop(rx);
        sink.deliver(push(3));
    }
}
