//! File commands: providers, upload, delete, files, purchase.

use anyhow::Context;
use clap::Args;
use orcanet_core::{FileRecord, ProviderListing};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

use super::NodeApi;

#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// SHA-256 hash of the file.
    pub hash: String,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File to upload.
    pub path: PathBuf,

    /// Asking price.
    #[arg(short, long)]
    pub price: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// SHA-256 hash of the file.
    pub hash: String,
}

#[derive(Args, Debug)]
pub struct PurchaseArgs {
    /// Peer ID of the provider.
    #[arg(long)]
    pub peer: String,

    /// SHA-256 hash of the file.
    #[arg(long)]
    pub hash: String,

    /// Price to pay.
    #[arg(long, default_value_t = 0.0)]
    pub cost: f64,

    /// Wallet address of the provider.
    #[arg(long, default_value = "")]
    pub address: String,

    /// Directory to save the file in.
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Deserialize)]
struct UploadResponse {
    message: String,
    hash: String,
    filename: String,
}

pub async fn providers(api: &NodeApi, args: &ProvidersArgs) -> anyhow::Result<()> {
    let providers: Vec<ProviderListing> = api
        .post("/getproviders", &json!({ "hash": args.hash }))
        .await?;
    if providers.is_empty() {
        println!("No providers found for {}", args.hash);
    }
    for p in &providers {
        println!("  {}  cost {}", p.id, p.cost);
    }
    Ok(())
}

pub async fn upload(api: &NodeApi, args: &UploadArgs) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let name = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("upload path has no file name")?;

    let form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(data).file_name(name))
        .text("price", args.price.clone());
    let resp = api
        .send(api.client().post(api.url("/upload")).multipart(form))
        .await?;
    let uploaded: UploadResponse = resp.json().await?;
    println!("{}", uploaded.message);
    println!("  File:  {}", uploaded.filename);
    println!("  Hash:  {}", uploaded.hash);
    Ok(())
}

pub async fn delete(api: &NodeApi, args: &DeleteArgs) -> anyhow::Result<()> {
    api.send(
        api.client()
            .delete(api.url("/delete"))
            .json(&json!({ "hash": args.hash })),
    )
    .await?;
    println!("Deleted {}", args.hash);
    Ok(())
}

pub async fn list(api: &NodeApi) -> anyhow::Result<()> {
    let files: Vec<FileRecord> = api.get("/files").await?;
    println!("Provided files ({}):", files.len());
    for f in &files {
        println!("  {}  {}  cost {}  since {}", f.hash, f.filename, f.cost, f.timestamp);
    }
    Ok(())
}

pub async fn purchase(api: &NodeApi, args: &PurchaseArgs) -> anyhow::Result<()> {
    let body = json!({
        "id": args.peer,
        "hash": args.hash,
        "cost": args.cost,
        "address": args.address,
    });
    let resp = api
        .send(api.client().post(api.url("/purchase")).json(&body))
        .await?;

    let filename = resp
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .unwrap_or_else(|| args.hash.clone());
    let data = resp.bytes().await?;

    let path = save_path(&args.out_dir, &filename);
    tokio::fs::create_dir_all(&args.out_dir).await?;
    tokio::fs::write(&path, &data).await?;
    println!("Purchased {} ({} bytes) -> {}", args.hash, data.len(), path.display());
    Ok(())
}

/// Filename from `attachment; filename="..."`.
fn disposition_filename(header: &str) -> Option<String> {
    let start = header.find("filename=")? + "filename=".len();
    let name = header[start..].trim().trim_matches('"');
    let name = name.split('"').next().unwrap_or(name).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Keep the saved file inside `dir` whatever name the provider sent.
fn save_path(dir: &Path, filename: &str) -> PathBuf {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    dir.join(name)
}
