use anyhow::Result;
use object_store::{
    ObjectStore, aws::AmazonS3Builder, azure::MicrosoftAzureBuilder, local::LocalFileSystem,
    memory::InMemory,
};
use std::sync::Arc;
use url::Url;

use crate::config::StorageConfig;

/// Create an object store from storage configuration
pub fn create_object_store(storage_config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    create_object_store_from_dsn(&storage_config.dsn)
}

/// Create an object store from a DSN string
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url =
        Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "File DSN must specify a path: file:///path/to/storage"
                ));
            }
            std::fs::create_dir_all(path)
                .map_err(|e| anyhow::anyhow!("Failed to create storage directory {path}: {e}"))?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = create_s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        "az" | "azure" => {
            let builder = create_azure_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: file, memory, s3, az",
            scheme
        )),
    }
}

/// Create an Azure Blob Storage builder from a DSN
/// DSN format: az://account/container
///
/// Access keys, SAS tokens and service principals are picked up from the
/// standard `AZURE_*` environment variables.
pub fn create_azure_builder_from_dsn(dsn: &Url) -> Result<MicrosoftAzureBuilder> {
    let account = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing storage account in Azure DSN"))?;
    let container = dsn.path().trim_start_matches('/');

    if container.is_empty() {
        return Err(anyhow::anyhow!(
            "Azure DSN must specify a container: az://account/container"
        ));
    }

    Ok(MicrosoftAzureBuilder::from_env()
        .with_account(account)
        .with_container_name(container))
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        return Err(anyhow::anyhow!(
            "S3 DSN must specify a bucket: s3://host/bucket"
        ));
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    let secret_key = dsn.password().unwrap_or("");

    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }

    // S3-compatible services (MinIO etc.) need an explicit path-style endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    if let Ok(env_region) = std::env::var("AWS_DEFAULT_REGION") {
        builder = builder.with_region(env_region);
    }

    Ok(builder)
}
