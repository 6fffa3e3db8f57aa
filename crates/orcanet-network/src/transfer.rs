//! Direct peer-to-peer transfer over `/senddata/p2p`.
//!
//! Requests (`Exist`, `Name`, `Request`) carry a random request id and are
//! answered with a `Reply` or `Error` frame on a fresh stream opened back to
//! the requester. The requester parks a oneshot sender in [`PendingReplies`]
//! under that id before sending, and waits on it with a timeout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::{AsyncWriteExt, StreamExt};
use libp2p::{PeerId, Stream};
use libp2p_stream::{Control, IncomingStreams};
use orcanet_core::{FileRecord, MetadataStore};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;
use crate::events::{DataReceived, NetworkEvent};
use crate::protocol::{read_frame, write_frame, Frame, FrameKind, TRANSFER_PROTOCOL};

/// Default time to wait for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// What a responder sent back: the reply payload, or the reason it refused.
pub type ReplyOutcome = Result<Bytes, String>;

#[derive(Debug)]
struct ReplySlot {
    peer: PeerId,
    tx: oneshot::Sender<ReplyOutcome>,
}

/// Reply slots keyed by request id. Each slot only accepts an answer from the
/// peer the request went to.
#[derive(Debug, Default)]
pub struct PendingReplies {
    slots: DashMap<u64, ReplySlot>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request id for a request to `peer`.
    pub fn register(&self, peer: PeerId) -> (u64, oneshot::Receiver<ReplyOutcome>) {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = oneshot::channel();
        loop {
            let id = rand::random::<u64>();
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.slots.entry(id) {
                slot.insert(ReplySlot { peer, tx });
                return (id, rx);
            }
        }
    }

    /// Deliver an answer from `from`. Returns false when no one is waiting on
    /// `id` or the slot belongs to another peer.
    pub fn resolve(&self, id: u64, from: &PeerId, outcome: ReplyOutcome) -> bool {
        match self.slots.remove_if(&id, |_, slot| slot.peer == *from) {
            Some((_, slot)) => slot.tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, id: u64) {
        self.slots.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Client and responder for the transfer protocol.
#[derive(Clone)]
pub struct TransferService {
    control: Control,
    pending: Arc<PendingReplies>,
    store: Arc<dyn MetadataStore>,
    files_dir: PathBuf,
    reply_timeout: Duration,
    events: broadcast::Sender<NetworkEvent>,
}

impl TransferService {
    pub fn new(
        control: Control,
        store: Arc<dyn MetadataStore>,
        files_dir: PathBuf,
        reply_timeout: Duration,
        events: broadcast::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            control,
            pending: Arc::new(PendingReplies::new()),
            store,
            files_dir,
            reply_timeout,
            events,
        }
    }

    pub fn pending(&self) -> &PendingReplies {
        &self.pending
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Open a stream to `peer`, write one frame and close.
    async fn send_frame(&self, peer: PeerId, frame: Frame) -> Result<(), NetworkError> {
        let mut control = self.control.clone();
        let mut stream = control.open_stream(peer, TRANSFER_PROTOCOL).await?;
        write_frame(&mut stream, &frame).await?;
        stream.close().await?;
        Ok(())
    }

    /// Push raw bytes to a peer.
    pub async fn send_data_to_peer(&self, peer: PeerId, data: Vec<u8>) -> Result<(), NetworkError> {
        let len = data.len();
        self.send_frame(peer, Frame::new(FrameKind::Data, 0, data)).await?;
        tracing::debug!(%peer, bytes = len, "data sent");
        Ok(())
    }

    /// Push the contents of a local file to a peer.
    pub async fn send_file(&self, peer: PeerId, path: &Path) -> Result<(), NetworkError> {
        let data = tokio::fs::read(path).await?;
        tracing::info!(%peer, path = %path.display(), bytes = data.len(), "sending file");
        self.send_data_to_peer(peer, data).await
    }

    async fn request(&self, peer: PeerId, kind: FrameKind, hash: &str) -> Result<Bytes, NetworkError> {
        let (id, rx) = self.pending.register(peer);
        let frame = Frame::new(kind, id, hash.trim().as_bytes().to_vec());
        if let Err(e) = self.send_frame(peer, frame).await {
            self.pending.cancel(id);
            return Err(e);
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(Ok(payload))) => Ok(payload),
            Ok(Ok(Err(reason))) => Err(NetworkError::NotFound(format!(
                "{} could not serve {}: {}",
                peer,
                hash.trim(),
                reason
            ))),
            Ok(Err(_)) => Err(NetworkError::Stream(format!("reply slot {} dropped", id))),
            Err(_) => {
                self.pending.cancel(id);
                Err(NetworkError::Timeout(format!(
                    "no {:?} reply from {} within {}s",
                    kind,
                    peer,
                    self.reply_timeout.as_secs()
                )))
            }
        }
    }

    /// Ask whether `peer` still hosts the file.
    pub async fn check_exists(&self, peer: PeerId, hash: &str) -> Result<bool, NetworkError> {
        let reply = self.request(peer, FrameKind::Exist, hash).await?;
        Ok(reply.as_ref() == b"true")
    }

    /// Ask `peer` for the filename it stores under `hash`.
    pub async fn fetch_name(&self, peer: PeerId, hash: &str) -> Result<Option<String>, NetworkError> {
        let reply = self.request(peer, FrameKind::Name, hash).await?;
        if reply.is_empty() {
            return Ok(None);
        }
        String::from_utf8(reply.to_vec())
            .map(Some)
            .map_err(|_| NetworkError::Codec("filename is not valid UTF-8".into()))
    }

    /// Download the file stored under `hash` from `peer`.
    pub async fn fetch_file(&self, peer: PeerId, hash: &str) -> Result<Bytes, NetworkError> {
        let data = self.request(peer, FrameKind::Request, hash).await?;
        tracing::info!(%peer, hash = %hash, bytes = data.len(), "file received");
        Ok(data)
    }

    /// Serve inbound transfer streams until cancelled.
    pub async fn run_listener(self, mut incoming: IncomingStreams, cancel: CancellationToken) {
        let mut streams = JoinSet::new();
        tracing::info!("transfer listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = incoming.next() => match next {
                    Some((peer, stream)) => {
                        let service = self.clone();
                        streams.spawn(async move { service.serve_stream(peer, stream).await });
                    }
                    None => break,
                },
                Some(_) = streams.join_next(), if !streams.is_empty() => {}
            }
        }
        streams.abort_all();
        tracing::info!("transfer listener stopped");
    }

    async fn serve_stream(&self, peer: PeerId, mut stream: Stream) {
        loop {
            match read_frame(&mut stream).await {
                Ok(Some(frame)) => self.handle_frame(peer, frame).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "bad transfer stream");
                    break;
                }
            }
        }
    }

    async fn handle_frame(&self, peer: PeerId, frame: Frame) {
        let id = frame.request_id;
        match frame.kind {
            FrameKind::Exist => {
                let hash = payload_str(&frame.payload);
                let exists = self.locate(&hash).await.is_ok();
                tracing::debug!(%peer, hash = %hash, exists, "exist request");
                let answer: &[u8] = if exists { b"true" } else { b"false" };
                self.reply(peer, id, answer.to_vec()).await;
            }
            FrameKind::Name => {
                let hash = payload_str(&frame.payload);
                let name = self.lookup(&hash).map(|r| r.filename).unwrap_or_default();
                tracing::debug!(%peer, hash = %hash, filename = %name, "name request");
                self.reply(peer, id, name.into_bytes()).await;
            }
            FrameKind::Request => {
                let hash = payload_str(&frame.payload);
                match self.read_hosted_file(&hash).await {
                    Ok(data) => {
                        tracing::info!(%peer, hash = %hash, bytes = data.len(), "serving file");
                        self.reply(peer, id, data).await;
                    }
                    Err(e) => {
                        tracing::warn!(%peer, hash = %hash, error = %e, "cannot serve file");
                        self.refuse(peer, id, &e.to_string()).await;
                    }
                }
            }
            FrameKind::Reply => {
                if !self.pending.resolve(id, &peer, Ok(frame.payload)) {
                    tracing::warn!(%peer, request_id = id, "reply for unknown request dropped");
                }
            }
            FrameKind::Error => {
                let reason = payload_str(&frame.payload);
                if !self.pending.resolve(id, &peer, Err(reason)) {
                    tracing::warn!(%peer, request_id = id, "error for unknown request dropped");
                }
            }
            FrameKind::Data => {
                tracing::info!(%peer, bytes = frame.payload.len(), "data received");
                let _ = self.events.send(NetworkEvent::DataReceived(DataReceived {
                    peer_id: peer,
                    data: frame.payload.to_vec(),
                }));
            }
        }
    }

    async fn reply(&self, peer: PeerId, id: u64, payload: Vec<u8>) {
        if let Err(e) = self.send_frame(peer, Frame::new(FrameKind::Reply, id, payload)).await {
            tracing::warn!(%peer, request_id = id, error = %e, "failed to send reply");
        }
    }

    async fn refuse(&self, peer: PeerId, id: u64, reason: &str) {
        let frame = Frame::new(FrameKind::Error, id, reason.as_bytes().to_vec());
        if let Err(e) = self.send_frame(peer, frame).await {
            tracing::warn!(%peer, request_id = id, error = %e, "failed to send error reply");
        }
    }

    fn lookup(&self, hash: &str) -> Option<FileRecord> {
        match self.store.get_file_record(hash) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(hash = %hash, error = %e, "metadata lookup failed");
                None
            }
        }
    }

    /// Path of the hosted file for `hash`. Needs both the metadata record and
    /// a regular file on disk.
    async fn locate(&self, hash: &str) -> Result<PathBuf, NetworkError> {
        let record = self
            .lookup(hash)
            .ok_or_else(|| NetworkError::NotFound(format!("no file with hash {}", hash)))?;
        let path = hosted_path(&self.files_dir, &record.filename)
            .ok_or_else(|| NetworkError::NotFound(record.filename.clone()))?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(NetworkError::NotFound(format!("{} is missing", record.filename))),
        }
    }

    async fn read_hosted_file(&self, hash: &str) -> Result<Vec<u8>, NetworkError> {
        let path = self.locate(hash).await?;
        Ok(tokio::fs::read(path).await?)
    }
}

/// Resolve a stored filename inside the files directory, ignoring any
/// directory components it carries.
pub fn hosted_path(files_dir: &Path, filename: &str) -> Option<PathBuf> {
    Path::new(filename)
        .file_name()
        .map(|name| files_dir.join(name))
}

fn payload_str(payload: &Bytes) -> String {
    String::from_utf8_lossy(payload).trim().to_string()
}
