//! HTTP API server for the OrcaNet node.
//!
//! The routes the front end uses (`/upload`, `/getproviders`, `/purchase`,
//! proxy and wallet mapping) plus a few operator endpoints for status, peers,
//! raw DHT records and manual sends.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use libp2p::PeerId;
use orcanet_core::keys::parse_price;
use orcanet_core::{CoreError, FileRecord, ProviderListing, ProxyInfo};
use orcanet_crypto::sha256_hex;
use orcanet_network::transfer::hosted_path;
use orcanet_network::{NetworkError, ProxyRegistration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::NodeState;

/// Largest accepted upload.
pub const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

// --- Errors ---

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<NetworkError> for ApiError {
    fn from(e: NetworkError) -> Self {
        let status = match &e {
            NetworkError::NotFound(_) => StatusCode::NOT_FOUND,
            NetworkError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            NetworkError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            NetworkError::Core(CoreError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::DuplicateRecord(_) | CoreError::InvalidPrice(_) | CoreError::InvalidKey(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- Request / response types ---

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub peer_id: String,
    pub peer_count: usize,
    pub uptime_secs: u64,
    pub listening_addrs: Vec<String>,
    pub relay: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub connected: bool,
}

#[derive(Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct HashRequest {
    #[serde(default)]
    pub hash: String,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub hash: String,
    pub filename: String,
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub id: String,
    pub hash: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub address: String,
}

#[derive(Deserialize)]
pub struct RegisterProxyRequest {
    pub action: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "initialFee")]
    pub initial_fee: String,
    #[serde(default)]
    pub price: String,
}

#[derive(Serialize, Deserialize)]
pub struct IsProxyResponse {
    #[serde(rename = "isProxy")]
    pub is_proxy: bool,
}

#[derive(Deserialize)]
pub struct MapWalletRequest {
    #[serde(default, rename = "walletAddress")]
    pub wallet_address: String,
}

#[derive(Serialize, Deserialize)]
pub struct MapWalletResponse {
    pub message: String,
    #[serde(rename = "peerID")]
    pub peer_id: String,
    pub wallet: String,
}

#[derive(Deserialize)]
pub struct WalletLookupRequest {
    #[serde(default, rename = "peerID")]
    pub peer_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct WalletLookupResponse {
    #[serde(rename = "peerID")]
    pub peer_id: String,
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,
}

#[derive(Deserialize)]
pub struct RecordGetRequest {
    pub key: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecordResponse {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct RecordPutRequest {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct SendRequest {
    #[serde(rename = "peerId")]
    pub peer_id: String,
    pub message: String,
}

fn parse_peer(raw: &str) -> ApiResult<PeerId> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid peer ID: {}", raw)))
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    let listening_addrs = match state.network.listen_addrs().await {
        Ok(addrs) => addrs.iter().map(ToString::to_string).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "could not read listen addresses");
            Vec::new()
        }
    };
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        peer_id: state.peer_id.to_string(),
        peer_count: state.peer_count(),
        uptime_secs: state.uptime_secs(),
        listening_addrs,
        relay: state.network.relay().map(|r| r.addr.to_string()),
    })
}

async fn handle_peers(State(state): State<Arc<NodeState>>) -> ApiResult<Json<PeersResponse>> {
    let active = state.network.active_peers().await?;
    let peers: Vec<PeerInfo> = state
        .known_peers()
        .into_iter()
        .map(|p| PeerInfo {
            peer_id: p.to_string(),
            connected: active.contains(&p),
        })
        .collect();
    let count = peers.len();
    Ok(Json(PeersResponse { peers, count }))
}

async fn handle_get_providers(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<HashRequest>,
) -> ApiResult<Json<Vec<ProviderListing>>> {
    let hash = req.hash.trim();
    if hash.is_empty() {
        return Err(ApiError::bad_request("Hash is required"));
    }
    Ok(Json(state.coordinator.list_file_providers(hash).await?))
}

async fn handle_upload(
    State(state): State<Arc<NodeState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut price: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to parse form: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to retrieve file: {}", e)))?;
                file = Some((filename, data));
            }
            Some("price") => {
                price = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid price field: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::bad_request("Failed to retrieve file"))?;
    let price = price.ok_or_else(|| ApiError::bad_request("Missing price"))?;
    let cost = parse_price(&price).map_err(|_| ApiError::bad_request("Invalid price value"))?;
    let path = hosted_path(state.files_dir(), &filename)
        .ok_or_else(|| ApiError::bad_request("Invalid filename"))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(filename);

    let hash = sha256_hex(&data);
    if state.store.get_file_record(&hash)?.is_some() {
        tracing::info!(%hash, "duplicate file rejected");
        return Err(ApiError::bad_request(format!("File exists: {}", filename)));
    }

    tokio::fs::create_dir_all(state.files_dir())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create directory: {}", e)))?;
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save file: {}", e)))?;

    if let Err(e) = state
        .store
        .store_file_record(FileRecord::new(hash.clone(), filename.clone(), cost))
    {
        tokio::fs::remove_file(&path).await.ok();
        return Err(e.into());
    }

    state.coordinator.publish_file(&hash, cost).await.map_err(|e| {
        tracing::warn!(%hash, error = %e, "failed to publish upload");
        ApiError::from(e)
    })?;

    tracing::info!(%hash, %filename, cost, "file uploaded");
    Ok(Json(UploadResponse {
        message: "File uploaded successfully".into(),
        hash,
        filename,
    }))
}

async fn handle_fetch_files(State(state): State<Arc<NodeState>>) -> ApiResult<Json<Vec<FileRecord>>> {
    Ok(Json(state.store.fetch_all_file_records()?))
}

async fn handle_delete(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<HashRequest>,
) -> ApiResult<StatusCode> {
    let hash = req.hash.trim();
    if hash.is_empty() {
        return Err(ApiError::bad_request("Hash is required"));
    }
    let record = state
        .store
        .get_file_record(hash)?
        .ok_or_else(|| ApiError::not_found("File record not found"))?;

    // The tombstone must land before any local state is removed.
    state.coordinator.unpublish_file(hash).await?;

    if let Some(path) = hosted_path(state.files_dir(), &record.filename) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "file not on disk, skipping deletion");
            }
            Err(e) => return Err(ApiError::internal(format!("Failed to delete file: {}", e))),
        }
    }
    state.store.delete_file_record(hash)?;
    tracing::info!(%hash, "file deleted");
    Ok(StatusCode::OK)
}

async fn handle_purchase(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Response> {
    let peer = parse_peer(&req.id)?;
    let hash = req.hash.trim();

    if !state.network.check_exists(peer, hash).await? {
        return Err(ApiError::not_found("File is no longer provided"));
    }
    let filename = state
        .network
        .fetch_name(peer, hash)
        .await?
        .unwrap_or_else(|| hash.to_string());
    let data = state.network.fetch_file(peer, hash).await?;
    tracing::info!(%peer, %hash, bytes = data.len(), "file received");

    state
        .payments
        .pay(&req.address, req.cost)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "'"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                "Content-Disposition".to_string(),
            ),
        ],
        data,
    )
        .into_response())
}

async fn handle_register_proxy(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<RegisterProxyRequest>,
) -> ApiResult<Json<MessageResponse>> {
    match req.action.as_str() {
        "register" => {
            let proxy = &state.config.proxy;
            state
                .coordinator
                .register_proxy(ProxyRegistration {
                    name: req.name,
                    location: proxy.location.clone(),
                    ip_address: proxy.ip_address.clone(),
                    initial_fee: req.initial_fee,
                    price: req.price,
                    port: proxy.port,
                })
                .await?;
            Ok(message("Registered as a proxy"))
        }
        "deregister" => {
            state.coordinator.deregister_proxy().await?;
            Ok(message("Deregistered as a proxy"))
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

async fn handle_is_proxy(State(state): State<Arc<NodeState>>) -> ApiResult<Json<IsProxyResponse>> {
    Ok(Json(IsProxyResponse {
        is_proxy: state.coordinator.is_proxy().await?,
    }))
}

async fn handle_map_wallet(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<MapWalletRequest>,
) -> ApiResult<Json<MapWalletResponse>> {
    let wallet = req.wallet_address.trim();
    if wallet.is_empty() {
        return Err(ApiError::bad_request("Wallet address is required"));
    }
    state.coordinator.map_wallet_address(wallet).await?;
    Ok(Json(MapWalletResponse {
        message: "Wallet address mapped successfully".into(),
        peer_id: state.peer_id.to_string(),
        wallet: wallet.to_string(),
    }))
}

async fn handle_get_wallet(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<WalletLookupRequest>,
) -> ApiResult<Json<WalletLookupResponse>> {
    let peer_id = req.peer_id.trim();
    if peer_id.is_empty() {
        return Err(ApiError::bad_request("PeerID is required"));
    }
    let wallet_address = state
        .coordinator
        .get_wallet_address(peer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No wallet address found for the provided PeerID"))?;
    Ok(Json(WalletLookupResponse {
        peer_id: peer_id.to_string(),
        wallet_address,
    }))
}

async fn handle_fetch_proxy_list(State(state): State<Arc<NodeState>>) -> Json<Vec<ProxyInfo>> {
    Json(state.coordinator.list_proxies().await)
}

async fn handle_record_get(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<RecordGetRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let value = state.coordinator.get_record(&req.key).await?;
    Ok(Json(RecordResponse {
        key: req.key,
        value: String::from_utf8_lossy(&value).into_owned(),
    }))
}

async fn handle_record_put(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<RecordPutRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .coordinator
        .put_record(&req.key, req.value.into_bytes())
        .await?;
    Ok(message("Record stored"))
}

async fn handle_send(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<SendRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let peer = parse_peer(&req.peer_id)?;
    state
        .network
        .send_data_to_peer(peer, req.message.into_bytes())
        .await?;
    Ok(message("Sent"))
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/peers", get(handle_peers))
        .route("/getproviders", post(handle_get_providers))
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/files", get(handle_fetch_files))
        .route("/delete", delete(handle_delete))
        .route("/purchase", post(handle_purchase))
        .route("/registerProxy", post(handle_register_proxy))
        .route("/isProxy", get(handle_is_proxy))
        .route("/mapPeerIDtoWallet", post(handle_map_wallet))
        .route("/getWalletAddress", post(handle_get_wallet))
        .route("/fetchProxyList", get(handle_fetch_proxy_list))
        .route("/record/get", post(handle_record_get))
        .route("/record/put", post(handle_record_put))
        .route("/send", post(handle_send))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on an already bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<NodeState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(state);
    tracing::info!(addr = %listener.local_addr()?, "HTTP API server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    tracing::info!("HTTP API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrcaConfig;
    use crate::payment::PaymentClient;
    use libp2p::identity::Keypair;
    use orcanet_core::{DhtKey, MemoryMetadataStore, MetadataStore};
    use orcanet_network::{
        Coordinator, MemoryDht, NamespacedValidator, NetworkHandle, NodeConfig, OrcaNode,
    };
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tokio::task::JoinSet;

    struct TestApi {
        base: String,
        client: reqwest::Client,
        dht: MemoryDht,
        network: NetworkHandle,
        peer_id: PeerId,
        files_dir: PathBuf,
        cancel: CancellationToken,
        tasks: JoinSet<()>,
    }

    impl TestApi {
        async fn start() -> Self {
            let files_dir =
                std::env::temp_dir().join(format!("orcanet-api-test-{}", rand::random::<u64>()));
            let mut config = OrcaConfig::default();
            config.transfer.files_dir = files_dir.clone();
            config.proxy.location = "NY, US".into();
            config.proxy.ip_address = "10.0.0.2".into();

            let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
            let node_config = NodeConfig {
                listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".into()],
                files_dir: files_dir.clone(),
                ..NodeConfig::default()
            };
            let mut node = OrcaNode::new(
                Keypair::generate_ed25519(),
                node_config,
                store.clone(),
                Arc::new(NamespacedValidator::orcanet()),
            )
            .unwrap();
            node.start().await.unwrap();

            let cancel = CancellationToken::new();
            let mut tasks = JoinSet::new();
            let handle = node.spawn(&mut tasks, cancel.clone()).unwrap();
            let peer_id = handle.local_peer_id();

            let dht = MemoryDht::new(peer_id);
            let coordinator = Coordinator::new(
                Arc::new(dht.clone()),
                Arc::new(NamespacedValidator::orcanet()),
            );
            let payments = PaymentClient::new("http://127.0.0.1:1/wallet/send").unwrap();
            let network = handle.clone();
            let state = Arc::new(NodeState::new(config, handle, coordinator, store, payments));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            tasks.spawn({
                let cancel = cancel.clone();
                async move {
                    serve(listener, state, cancel).await.unwrap();
                }
            });

            Self {
                base,
                client: reqwest::Client::new(),
                dht,
                network,
                peer_id,
                files_dir,
                cancel,
                tasks,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn post(&self, path: &str, body: Value) -> reqwest::Response {
            self.client
                .post(self.url(path))
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        async fn get(&self, path: &str) -> reqwest::Response {
            self.client.get(self.url(path)).send().await.unwrap()
        }

        async fn upload(&self, name: &str, data: &[u8], price: Option<&str>) -> reqwest::Response {
            let mut form = reqwest::multipart::Form::new().part(
                "file",
                reqwest::multipart::Part::bytes(data.to_vec()).file_name(name.to_string()),
            );
            if let Some(price) = price {
                form = form.text("price", price.to_string());
            }
            self.client
                .post(self.url("/upload"))
                .multipart(form)
                .send()
                .await
                .unwrap()
        }

        async fn delete(&self, hash: &str) -> reqwest::Response {
            self.client
                .delete(self.url("/delete"))
                .json(&json!({ "hash": hash }))
                .send()
                .await
                .unwrap()
        }

        async fn stop(mut self) {
            self.cancel.cancel();
            while self.tasks.join_next().await.is_some() {}
            std::fs::remove_dir_all(&self.files_dir).ok();
        }
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let api = TestApi::start().await;

        let health: Value = api.get("/health").await.json().await.unwrap();
        assert_eq!(health["status"], "ok");

        let status: StatusResponse = api.get("/status").await.json().await.unwrap();
        assert_eq!(status.peer_id, api.peer_id.to_string());
        assert!(!status.listening_addrs.is_empty());
        assert!(status.relay.is_none());

        let peers: PeersResponse = api.get("/peers").await.json().await.unwrap();
        assert_eq!(peers.count, 0);

        api.stop().await;
    }

    #[tokio::test]
    async fn test_upload_list_and_providers() {
        let api = TestApi::start().await;
        let data = b"hello orcanet";

        let resp = api.upload("hello.txt", data, Some("1.5")).await;
        assert_eq!(resp.status(), 200);
        let uploaded: UploadResponse = resp.json().await.unwrap();
        assert_eq!(uploaded.hash, sha256_hex(data));
        assert_eq!(uploaded.filename, "hello.txt");
        assert_eq!(
            std::fs::read(api.files_dir.join("hello.txt")).unwrap(),
            data.to_vec()
        );

        let files: Vec<FileRecord> = api.get("/files").await.json().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].cost, 1.5);

        let providers: Vec<ProviderListing> = api
            .post("/getproviders", json!({ "hash": uploaded.hash }))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(
            providers,
            vec![ProviderListing {
                id: "Me".into(),
                cost: "1.5".into()
            }]
        );

        let dup = api.upload("copy.txt", data, Some("2")).await;
        assert_eq!(dup.status(), 400);

        api.stop().await;
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_price() {
        let api = TestApi::start().await;
        assert_eq!(api.upload("a.txt", b"a", None).await.status(), 400);
        assert_eq!(api.upload("a.txt", b"a", Some("cheap")).await.status(), 400);
        let files: Vec<FileRecord> = api.get("/files").await.json().await.unwrap();
        assert!(files.is_empty());
        api.stop().await;
    }

    #[tokio::test]
    async fn test_delete_tombstones_record() {
        let api = TestApi::start().await;

        let resp = api
            .client
            .delete(api.url("/delete"))
            .json(&json!({ "hash": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = api
            .client
            .delete(api.url("/delete"))
            .json(&json!({ "hash": "deadbeef" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let uploaded: UploadResponse = api
            .upload("gone.txt", b"bye", Some("3"))
            .await
            .json()
            .await
            .unwrap();
        let resp = api
            .client
            .delete(api.url("/delete"))
            .json(&json!({ "hash": uploaded.hash }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        assert!(!api.files_dir.join("gone.txt").exists());
        let key = DhtKey::file(api.peer_id, &uploaded.hash).to_string();
        assert_eq!(api.dht.raw_record(&key).unwrap(), b"null");
        let providers: Vec<ProviderListing> = api
            .post("/getproviders", json!({ "hash": uploaded.hash }))
            .await
            .json()
            .await
            .unwrap();
        assert!(providers.is_empty());

        api.stop().await;
    }

    #[tokio::test]
    async fn test_proxy_registration() {
        let api = TestApi::start().await;

        let resp = api.post("/registerProxy", json!({ "action": "promote" })).await;
        assert_eq!(resp.status(), 400);

        let is_proxy: IsProxyResponse = api.get("/isProxy").await.json().await.unwrap();
        assert!(!is_proxy.is_proxy);

        let resp: MessageResponse = api
            .post(
                "/registerProxy",
                json!({ "action": "register", "name": "edge", "initialFee": "1", "price": "0.5" }),
            )
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(resp.message, "Registered as a proxy");

        let stored = api
            .dht
            .raw_record(&DhtKey::proxy(api.peer_id).to_string())
            .unwrap();
        let info = ProxyInfo::from_record_value(&stored).unwrap().unwrap();
        assert_eq!(info.location, "NY, US");
        assert_eq!(info.initial_fee, "1");

        let is_proxy: IsProxyResponse = api.get("/isProxy").await.json().await.unwrap();
        assert!(is_proxy.is_proxy);

        api.post("/registerProxy", json!({ "action": "deregister" }))
            .await
            .error_for_status()
            .unwrap();
        let is_proxy: IsProxyResponse = api.get("/isProxy").await.json().await.unwrap();
        assert!(!is_proxy.is_proxy);

        let proxies: Vec<ProxyInfo> = api.get("/fetchProxyList").await.json().await.unwrap();
        assert!(proxies.is_empty());

        api.stop().await;
    }

    #[tokio::test]
    async fn test_wallet_mapping() {
        let api = TestApi::start().await;

        let resp = api.post("/mapPeerIDtoWallet", json!({ "walletAddress": "" })).await;
        assert_eq!(resp.status(), 400);

        let mapped: MapWalletResponse = api
            .post("/mapPeerIDtoWallet", json!({ "walletAddress": "wallet-1" }))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(mapped.peer_id, api.peer_id.to_string());

        let found: WalletLookupResponse = api
            .post("/getWalletAddress", json!({ "peerID": api.peer_id.to_string() }))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(found.wallet_address, "wallet-1");

        let missing = api
            .post("/getWalletAddress", json!({ "peerID": PeerId::random().to_string() }))
            .await;
        assert_eq!(missing.status(), 404);

        api.stop().await;
    }

    #[tokio::test]
    async fn test_raw_records() {
        let api = TestApi::start().await;

        let missing = api.post("/record/get", json!({ "key": "/orcanet/files/x/y" })).await;
        assert_eq!(missing.status(), 404);

        let foreign = api
            .post("/record/put", json!({ "key": "/ipns/x", "value": "v" }))
            .await;
        assert_eq!(foreign.status(), 400);

        api.post("/record/put", json!({ "key": "/orcanet/files/x/y", "value": "4" }))
            .await
            .error_for_status()
            .unwrap();
        let record: RecordResponse = api
            .post("/record/get", json!({ "key": "/orcanet/files/x/y" }))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(record.value, "4");

        api.stop().await;
    }

    #[tokio::test]
    async fn test_purchase_rejects_bad_peer_id() {
        let api = TestApi::start().await;
        let resp = api
            .post(
                "/purchase",
                json!({ "id": "not-a-peer", "hash": "abc", "cost": 1, "address": "w" }),
            )
            .await;
        assert_eq!(resp.status(), 400);
        api.stop().await;
    }

    #[tokio::test]
    async fn test_delete_keeps_file_when_tombstone_fails() {
        let api = TestApi::start().await;
        let uploaded: UploadResponse = api
            .upload("keep.txt", b"still here", Some("2"))
            .await
            .json()
            .await
            .unwrap();

        api.dht.reject_puts(true);
        let resp = api.delete(&uploaded.hash).await;
        assert_eq!(resp.status(), 500);

        assert!(api.files_dir.join("keep.txt").exists());
        let files: Vec<FileRecord> = api.get("/files").await.json().await.unwrap();
        assert_eq!(files.len(), 1);
        let key = DhtKey::file(api.peer_id, &uploaded.hash).to_string();
        assert_eq!(api.dht.raw_record(&key).unwrap(), b"2");

        api.dht.reject_puts(false);
        assert_eq!(api.delete(&uploaded.hash).await.status(), 200);
        assert!(!api.files_dir.join("keep.txt").exists());
        assert_eq!(api.dht.raw_record(&key).unwrap(), b"null");

        api.stop().await;
    }

    #[tokio::test]
    async fn test_purchase_of_missing_file_is_not_paid() {
        let api = TestApi::start().await;

        // A provider that still lists a file it no longer has on disk.
        let provider_dir =
            std::env::temp_dir().join(format!("orcanet-api-provider-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&provider_dir).unwrap();
        let provider_store = Arc::new(MemoryMetadataStore::new());
        provider_store
            .store_file_record(FileRecord::new("abcd", "vanished.bin", 3.0))
            .unwrap();
        let mut provider = OrcaNode::new(
            Keypair::generate_ed25519(),
            NodeConfig {
                listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".into()],
                files_dir: provider_dir.clone(),
                ..NodeConfig::default()
            },
            provider_store,
            Arc::new(NamespacedValidator::orcanet()),
        )
        .unwrap();
        let addr = provider.start().await.unwrap().remove(0);
        let provider_cancel = CancellationToken::new();
        let mut provider_tasks = JoinSet::new();
        let provider = provider
            .spawn(&mut provider_tasks, provider_cancel.clone())
            .unwrap();
        api.network
            .add_address(provider.local_peer_id(), addr)
            .await
            .unwrap();

        // The wallet URL is unreachable, so reaching payment would answer 500.
        let resp = api
            .post(
                "/purchase",
                json!({
                    "id": provider.local_peer_id().to_string(),
                    "hash": "abcd",
                    "cost": 3,
                    "address": "w",
                }),
            )
            .await;
        assert_eq!(resp.status(), 404);

        provider_cancel.cancel();
        while provider_tasks.join_next().await.is_some() {}
        std::fs::remove_dir_all(&provider_dir).ok();
        api.stop().await;
    }
}
