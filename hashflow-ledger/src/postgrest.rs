//! PostgREST (Supabase) ledger backend.
//!
//! Talks to the REST gateway directly: RPCs are `POST /rest/v1/rpc/<name>`
//! and table reads are `GET /rest/v1/<table>` with PostgREST filters.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hashflow_core::LevelId;

use super::traits::*;

/// Connection settings for a Supabase project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseEndpoint {
    /// Project URL, e.g. `https://<ref>.supabase.co`
    pub base_url: String,
    /// Public anon key (sent as `apikey`)
    pub anon_key: String,
    /// User JWT; the anon key is used as bearer when absent
    pub access_token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl SupabaseEndpoint {
    /// Create endpoint settings with a 15 s timeout.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: None,
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Authenticate as a signed-in user.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn build_client(&self) -> Result<Client> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Client::builder()
            .default_headers(headers)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("Failed to create HTTP client: {}", e)))
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
    }
}

pub(crate) fn transport_error(error: reqwest::Error) -> LedgerError {
    if error.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Network(error.to_string())
    }
}

/// Turn a non-success response into the matching error kind.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED => LedgerError::NotAuthenticated,
        StatusCode::TOO_MANY_REQUESTS => LedgerError::RateLimited { retry_after_ms },
        _ => LedgerError::Rejected {
            status: status.as_u16(),
            body,
        },
    })
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| LedgerError::MalformedResponse(e.to_string()))
}

/// RPCs returning a composite type may answer with an object or a one-row array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.into_iter().next(),
        }
    }
}

#[derive(Serialize)]
struct RunCostParams<'a> {
    p_player_id: PlayerId,
    p_level_id: LevelId,
    p_nodes_count: usize,
    p_pipeline_hash: &'a str,
    p_last_pipeline_hash: Option<&'a str>,
    p_level_tier: &'a str,
}

#[derive(Serialize)]
struct ConsumeParams {
    p_player_id: PlayerId,
    p_cost: i64,
}

#[derive(Serialize)]
struct RecordSolutionParams<'a> {
    p_player_id: PlayerId,
    p_level_id: LevelId,
    p_pipeline_hash: &'a str,
    p_pipeline_raw: &'a str,
    p_pipeline_length: usize,
}

#[derive(Serialize)]
struct SetProgressParams<'a> {
    p_player_id: PlayerId,
    p_completed_levels: &'a [LevelId],
    p_highest_unlocked_level_id: LevelId,
}

#[derive(Serialize)]
struct PlayerParams {
    p_player_id: PlayerId,
}

#[derive(Deserialize)]
struct LevelCountRow {
    level_id: LevelId,
    unique_solutions: i64,
}

#[derive(Deserialize)]
struct LeaderboardRow {
    player_id: PlayerId,
    unique_solutions: i64,
    #[serde(default)]
    unique_levels_completed: Option<i64>,
    #[serde(default)]
    total_pipeline_length: Option<i64>,
    respect: i64,
    updated_at: Option<DateTime<Utc>>,
    profiles: ProfileRow,
}

#[derive(Deserialize)]
struct ProfileRow {
    username: String,
}

#[derive(Deserialize)]
struct PlayerLevelStatRow {
    level_id: LevelId,
    my_unique_solutions: i64,
    all_unique_solutions: i64,
    player_share_percent: Option<f64>,
    avg_pipeline_length: Option<f64>,
}

/// Supabase ledger over PostgREST.
pub struct PostgrestLedger {
    client: Client,
    endpoint: SupabaseEndpoint,
}

impl PostgrestLedger {
    /// Create a ledger for an endpoint.
    pub fn new(endpoint: SupabaseEndpoint) -> Result<Self> {
        let client = endpoint.build_client()?;
        Ok(Self { client, endpoint })
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.endpoint.base_url, function)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.endpoint.base_url, table)
    }

    async fn post_rpc<P: Serialize + Sync>(&self, function: &str, params: &P) -> Result<Response> {
        debug!(function, "Calling ledger RPC");
        let request = self.endpoint.authorize(self.client.post(self.rpc_url(function)));
        let response = request.json(params).send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn rpc<P, R>(&self, function: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self.post_rpc(function, params).await?;
        decode(response).await
    }

    async fn select<R: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<R>> {
        debug!(table, "Reading ledger table");
        let request = self
            .endpoint
            .authorize(self.client.get(self.table_url(table)))
            .query(query);
        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        decode(response).await
    }
}

#[async_trait]
impl RemoteLedger for PostgrestLedger {
    fn id(&self) -> &str {
        &self.endpoint.base_url
    }

    async fn calculate_run_cost(&self, player_id: PlayerId, request: &RunCostRequest) -> Result<i64> {
        let params = RunCostParams {
            p_player_id: player_id,
            p_level_id: request.level_id,
            p_nodes_count: request.nodes_count,
            p_pipeline_hash: &request.pipeline_hash,
            p_last_pipeline_hash: request.last_pipeline_hash.as_deref(),
            p_level_tier: &request.level_tier,
        };
        self.rpc("calculate_run_cost_v1", &params).await
    }

    async fn consume_run_resources(&self, player_id: PlayerId, cost: i64) -> Result<ResourceConsumption> {
        let params = ConsumeParams {
            p_player_id: player_id,
            p_cost: cost,
        };
        let reply: OneOrMany<ResourceConsumption> = self.rpc("consume_run_resources_v1", &params).await?;
        reply
            .into_first()
            .ok_or_else(|| LedgerError::MalformedResponse("Empty consume_run_resources_v1 result".to_string()))
    }

    async fn record_unique_solution(&self, record: &UniqueSolutionRecord) -> Result<bool> {
        let params = RecordSolutionParams {
            p_player_id: record.player_id,
            p_level_id: record.level_id,
            p_pipeline_hash: &record.pipeline_hash,
            p_pipeline_raw: &record.pipeline_raw,
            p_pipeline_length: record.pipeline_length,
        };
        let inserted: bool = self.rpc("record_unique_solution_v1", &params).await?;
        if inserted {
            info!(level_id = record.level_id, hash = %record.pipeline_hash, "Unique solution recorded");
        } else {
            info!(level_id = record.level_id, hash = %record.pipeline_hash, "Solution already recorded");
        }
        Ok(inserted)
    }

    async fn fetch_player_progress(&self, player_id: PlayerId) -> Result<Option<ProgressSnapshot>> {
        let rows: Vec<ProgressSnapshot> = self
            .select(
                "player_progress",
                &[
                    (
                        "select",
                        "player_id,completed_levels,highest_unlocked_level_id,updated_at".to_string(),
                    ),
                    ("player_id", format!("eq.{}", player_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_player_progress(
        &self,
        player_id: PlayerId,
        completed_level_ids: &[LevelId],
        highest_unlocked_level_id: LevelId,
    ) -> Result<()> {
        let params = SetProgressParams {
            p_player_id: player_id,
            p_completed_levels: completed_level_ids,
            p_highest_unlocked_level_id: highest_unlocked_level_id,
        };
        self.post_rpc("set_player_progress", &params).await?;
        Ok(())
    }

    async fn fetch_level_unique_solution_counts(&self) -> Result<HashMap<LevelId, i64>> {
        let rows: Vec<LevelCountRow> = self
            .select(
                "level_unique_solution_counts",
                &[("select", "level_id,unique_solutions".to_string())],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.level_id, row.unique_solutions))
            .collect())
    }

    async fn fetch_player_level_stats(&self, player_id: PlayerId) -> Result<Vec<PlayerLevelStat>> {
        let rows: Vec<PlayerLevelStatRow> = self
            .rpc("get_player_level_stats", &PlayerParams { p_player_id: player_id })
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PlayerLevelStat {
                level_id: row.level_id,
                my_unique_solutions: row.my_unique_solutions,
                all_unique_solutions: row.all_unique_solutions,
                player_share_percent: row.player_share_percent.unwrap_or_default(),
                avg_pipeline_length: row.avg_pipeline_length.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let rows: Vec<LeaderboardRow> = self
            .select(
                "player_reputation",
                &[
                    (
                        "select",
                        "player_id,unique_solutions,unique_levels_completed,total_pipeline_length,respect,updated_at,profiles!inner(username)"
                            .to_string(),
                    ),
                    ("order", "unique_solutions.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                player_id: row.player_id,
                username: row.profiles.username,
                unique_solutions: row.unique_solutions,
                unique_levels_completed: row.unique_levels_completed.unwrap_or(0),
                total_pipeline_length: row.total_pipeline_length.unwrap_or(0),
                respect: row.respect,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn fetch_player_economy(&self, player_id: PlayerId) -> Result<EconomySnapshot> {
        let rows: Vec<EconomySnapshot> = self
            .select(
                "player_economy",
                &[
                    ("select", "daily_moves_left,credit_balance".to_string()),
                    ("player_id", format!("eq.{}", player_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(row),
            None => {
                warn!(%player_id, "No economy row, using defaults");
                Ok(EconomySnapshot::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn ledger_for(server: &MockServer) -> PostgrestLedger {
        let endpoint = SupabaseEndpoint::new(server.uri(), "anon-key").with_access_token("user-jwt");
        PostgrestLedger::new(endpoint).unwrap()
    }

    #[tokio::test]
    async fn test_record_unique_solution() {
        let server = MockServer::start().await;
        let player = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/record_unique_solution_v1"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-jwt"))
            .and(body_partial_json(json!({ "p_level_id": 1, "p_pipeline_length": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let record = UniqueSolutionRecord {
            player_id: player,
            level_id: 1,
            pipeline_hash: "abc".to_string(),
            pipeline_raw: "{}".to_string(),
            pipeline_length: 2,
        };
        assert!(ledger.record_unique_solution(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_accepts_row_array() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/consume_run_resources_v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "success": false, "remaining_moves": 0, "remaining_credits": 0 }
            ])))
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let consumption = ledger.consume_run_resources(Uuid::new_v4(), 3).await.unwrap();
        assert!(!consumption.success);
        assert_eq!(consumption.remaining_moves, 0);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/calculate_run_cost_v1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_player_level_stats"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/set_player_progress"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let player = Uuid::new_v4();
        let request = RunCostRequest {
            level_id: 1,
            nodes_count: 2,
            pipeline_hash: "abc".to_string(),
            last_pipeline_hash: None,
            level_tier: "medium".to_string(),
        };

        assert_eq!(
            ledger.calculate_run_cost(player, &request).await,
            Err(LedgerError::NotAuthenticated)
        );
        assert_eq!(
            ledger.fetch_player_level_stats(player).await,
            Err(LedgerError::RateLimited { retry_after_ms: Some(2000) })
        );
        assert_eq!(
            ledger.upsert_player_progress(player, &[1], 2).await,
            Err(LedgerError::Rejected { status: 500, body: "boom".to_string() })
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/calculate_run_cost_v1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let request = RunCostRequest {
            level_id: 1,
            nodes_count: 1,
            pipeline_hash: "abc".to_string(),
            last_pipeline_hash: Some("def".to_string()),
            level_tier: "medium".to_string(),
        };
        let err = ledger.calculate_run_cost(Uuid::new_v4(), &request).await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_progress_and_economy_reads() {
        let server = MockServer::start().await;
        let player = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/player_progress"))
            .and(query_param("player_id", format!("eq.{}", player)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "player_id": player,
                "completed_levels": [1, 2, 3],
                "highest_unlocked_level_id": 4,
                "updated_at": "2024-03-01T10:00:00.123456+00:00"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/player_economy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let snapshot = ledger.fetch_player_progress(player).await.unwrap().unwrap();
        assert_eq!(snapshot.completed_level_ids, vec![1, 2, 3]);
        assert_eq!(snapshot.highest_unlocked_level_id, 4);

        let economy = ledger.fetch_player_economy(player).await.unwrap();
        assert_eq!(economy, EconomySnapshot::default());
    }

    #[tokio::test]
    async fn test_leaderboard_flattens_profile() {
        let server = MockServer::start().await;
        let player = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/player_reputation"))
            .and(query_param("order", "unique_solutions.desc"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "player_id": player,
                "unique_solutions": 12,
                "respect": 60,
                "updated_at": null,
                "profiles": { "username": "neo" }
            }])))
            .mount(&server)
            .await;

        let ledger = ledger_for(&server).await;
        let board = ledger.fetch_leaderboard(5).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].username, "neo");
        assert_eq!(board[0].unique_levels_completed, 0);
    }
}
