//! Solution NFT minting.
//!
//! Minting is delegated to a backend function. Callers treat it as
//! fire-and-forget: a failed mint never touches a recorded solution.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use hashflow_core::LevelId;

use crate::postgrest::{check_status, transport_error, SupabaseEndpoint};
use crate::traits::{LedgerError, PlayerId, Result};

/// Payload handed to the mint function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub player_id: PlayerId,
    pub level_id: LevelId,
    pub pipeline_hash: String,
    pub pipeline_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// Mints solution NFTs.
#[async_trait]
pub trait NftMinter: Send + Sync {
    /// Request a mint for a registered solution.
    async fn mint(&self, request: &MintRequest) -> Result<()>;
}

/// Minter calling a Supabase edge function.
pub struct EdgeFunctionMinter {
    client: Client,
    endpoint: SupabaseEndpoint,
    function: String,
}

impl EdgeFunctionMinter {
    /// Create a minter for `function` on an endpoint.
    pub fn new(endpoint: SupabaseEndpoint, function: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: endpoint.build_client()?,
            endpoint,
            function: function.into(),
        })
    }

    fn function_url(&self) -> String {
        format!("{}/functions/v1/{}", self.endpoint.base_url, self.function)
    }
}

#[async_trait]
impl NftMinter for EdgeFunctionMinter {
    async fn mint(&self, request: &MintRequest) -> Result<()> {
        let response = self
            .endpoint
            .authorize(self.client.post(self.function_url()))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        info!(level_id = request.level_id, hash = %request.pipeline_hash, "Mint requested");
        Ok(())
    }
}

/// Mock minter for testing.
pub struct MockMinter {
    available: AtomicBool,
    call_count: AtomicU32,
}

impl MockMinter {
    /// Create a working mock minter.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set availability. An unavailable minter fails every call.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times mint was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockMinter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NftMinter for MockMinter {
    async fn mint(&self, _request: &MintRequest) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("Mock minter disabled".to_string()))
        }
    }
}
