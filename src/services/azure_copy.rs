//! src/services/azure_copy.rs
//!
//! Server-side copies through the Blob service's Copy Blob operation.
//! `object_store` only copies inside the container a store was opened for;
//! Copy Blob accepts any source URL in the account, so moves between two
//! containers never pull the payload through this process.

use crate::{
    config::ConnectionString,
    errors::{ConfigError, StoreError, StoreResult},
    models::blob::BlobHandle,
};
use async_trait::async_trait;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::{blob::CopyStatus, prelude::*};
use std::{fmt, time::Duration};
use tracing::debug;
use url::Url;

const COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait ServerSideCopy: fmt::Debug + Send + Sync + 'static {
    /// Copy the blob at `source_url` onto `destination` and wait until the
    /// service reports the copy finished. The payload is never read here.
    async fn copy_blob(&self, destination: &BlobHandle, source_url: &Url) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct AzureCopy {
    service: BlobServiceClient,
}

impl AzureCopy {
    /// Build a client for the account; no request is sent.
    pub fn new(account: &ConnectionString) -> Result<Self, ConfigError> {
        let builder = if account.use_development_storage {
            ClientBuilder::emulator()
        } else {
            let (Some(name), Some(key)) = (&account.account_name, &account.account_key) else {
                return Err(ConfigError::InvalidConnectionString(
                    "AccountName and AccountKey are required".into(),
                ));
            };
            let credentials = StorageCredentials::access_key(name.clone(), key.clone());
            match account.custom_endpoint() {
                Some(uri) => ClientBuilder::with_location(
                    CloudLocation::Custom {
                        account: name.clone(),
                        uri: uri.trim_end_matches('/').to_string(),
                    },
                    credentials,
                ),
                None => ClientBuilder::new(name.clone(), credentials),
            }
        };
        Ok(Self {
            service: builder.blob_service_client(),
        })
    }
}

impl fmt::Debug for AzureCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCopy").finish_non_exhaustive()
    }
}

#[async_trait]
impl ServerSideCopy for AzureCopy {
    async fn copy_blob(&self, destination: &BlobHandle, source_url: &Url) -> StoreResult<()> {
        let blob = self
            .service
            .container_client(destination.container.as_str())
            .blob_client(destination.name.as_str());

        let mut status = blob.copy(source_url.clone()).await?.copy_status;
        // Same-account copies usually finish at once; larger ones are pending
        // until the service has written the last block.
        while matches!(status, CopyStatus::Pending) {
            debug!(destination = %destination.url, "waiting for pending copy");
            tokio::time::sleep(COPY_POLL_INTERVAL).await;
            status = blob
                .get_properties()
                .await?
                .blob
                .properties
                .copy_status
                .unwrap_or(CopyStatus::Success);
        }

        match status {
            CopyStatus::Success => Ok(()),
            other => Err(StoreError::CopyNotCompleted {
                name: destination.name.clone(),
                status: format!("{other:?}"),
            }),
        }
    }
}
