use std::{
    panic::{self, AssertUnwindSafe},
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use futures_util::StreamExt;
use tokio::{
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

pub type RawPayload = Vec<u8>;

pub trait PayloadHandler: Send + 'static {
    fn source(&self) -> &'static str;
    fn handle_payload(&mut self, raw: &[u8]);
}

pub fn raw_message_queue() -> (Sender<RawPayload>, Receiver<RawPayload>) {
    crossbeam_channel::unbounded()
}

pub fn spawn_processing_thread<H: PayloadHandler>(
    handler: H,
    rx: Receiver<RawPayload>,
) -> Result<thread::JoinHandle<()>> {
    let name = format!("{}-processing", handler.source());
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_processing_loop(handler, rx))
        .with_context(|| format!("failed to spawn {name} thread"))
}

/// A panic inside one payload is logged and the loop moves on to the next.
pub fn run_processing_loop<H: PayloadHandler>(mut handler: H, rx: Receiver<RawPayload>) {
    let source = handler.source();
    info!(source, "processing started");
    for raw in rx.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle_payload(&raw)));
        if outcome.is_err() {
            error!(source, len = raw.len(), "internal error while processing payload");
        }
    }
    info!(source, "raw message queue closed; processing stopped");
}

#[derive(Debug, PartialEq)]
enum Frame {
    Payload(RawPayload),
    Close,
    Skip,
}

fn classify_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Payload(text.as_str().as_bytes().to_vec()),
        Message::Binary(bytes) => Frame::Payload(bytes.to_vec()),
        Message::Close(_) => Frame::Close,
        _ => Frame::Skip,
    }
}

pub fn spawn_majsoul_bridge(
    url: String,
    backoff: Duration,
    tx: Sender<RawPayload>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_majsoul_bridge(url, backoff, tx).await;
    })
}

async fn run_majsoul_bridge(url: String, backoff: Duration, tx: Sender<RawPayload>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut stream, _response)) => {
                info!(url = %url, "connected to majsoul source");
                while let Some(next) = stream.next().await {
                    match next.map(classify_frame) {
                        Ok(Frame::Payload(raw)) => {
                            if tx.send(raw).is_err() {
                                error!("majsoul processing dropped; shutting down bridge");
                                return;
                            }
                        }
                        Ok(Frame::Close) => break,
                        Ok(Frame::Skip) => {}
                        Err(err) => {
                            warn!(?err, "majsoul bridge read error");
                            break;
                        }
                    }
                }
                warn!(
                    retry_secs = backoff.as_secs(),
                    "majsoul bridge disconnected, retrying"
                );
            }
            Err(err) => {
                warn!(?err, retry_secs = backoff.as_secs(), "failed to connect to majsoul source");
            }
        }

        sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio_tungstenite::tungstenite::Message;

    use super::{
        classify_frame, raw_message_queue, run_processing_loop, spawn_processing_thread, Frame,
        PayloadHandler,
    };

    #[derive(Clone, Default)]
    struct Collector {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl PayloadHandler for Collector {
        fn source(&self) -> &'static str {
            "test"
        }

        fn handle_payload(&mut self, raw: &[u8]) {
            let text = String::from_utf8_lossy(raw).into_owned();
            if text == "boom" {
                panic!("handler failure");
            }
            self.seen.lock().expect("seen lock").push(text);
        }
    }

    #[test]
    fn processing_survives_a_panicking_payload() {
        let collector = Collector::default();
        let (tx, rx) = raw_message_queue();
        for payload in ["one", "boom", "two"] {
            tx.send(payload.as_bytes().to_vec()).expect("queue open");
        }
        drop(tx);

        run_processing_loop(collector.clone(), rx);
        assert_eq!(
            *collector.seen.lock().expect("seen lock"),
            vec!["one".to_owned(), "two".to_owned()]
        );
    }

    #[test]
    fn processing_thread_preserves_arrival_order() {
        let collector = Collector::default();
        let (tx, rx) = raw_message_queue();
        let handle = spawn_processing_thread(collector.clone(), rx).expect("spawn thread");
        for n in 0..50 {
            tx.send(format!("p{n}").into_bytes()).expect("queue open");
        }
        drop(tx);
        handle.join().expect("processing thread");

        let seen = collector.seen.lock().expect("seen lock");
        let expected: Vec<String> = (0..50).map(|n| format!("p{n}")).collect();
        assert_eq!(*seen, expected);
    }

    #[test]
    fn bridge_forwards_text_and_binary_frames() {
        assert_eq!(
            classify_frame(Message::Text("{\"a\":1}".into())),
            Frame::Payload(b"{\"a\":1}".to_vec())
        );
        assert_eq!(
            classify_frame(Message::Binary(vec![1, 2, 3].into())),
            Frame::Payload(vec![1, 2, 3])
        );
        assert_eq!(classify_frame(Message::Close(None)), Frame::Close);
        assert_eq!(classify_frame(Message::Ping(Vec::new().into())), Frame::Skip);
    }
}
