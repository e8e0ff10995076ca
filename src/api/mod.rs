//! HTTP control plane for cross-shard operations.
//!
//! Every response is a `{status, message, result}` envelope. The POST
//! endpoints take a fixed set of typed operations and require both an
//! allow-listed caller address and the shared token.

pub mod error;

use crate::Data;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
pub use error::ApiError;
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    pub result: Value,
}

impl Envelope {
    pub fn ok(result: Value) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: "OK".to_string(),
            result,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            result: Value::Null,
        }
    }
}

/// Operations run on every shard, answered with one entry per shard.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShardOp {
    Ping,
    GuildCount,
    Latency,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub op: ShardOp,
}

/// Operations run once by the shard manager. Snowflakes travel as strings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ManagerOp {
    ShardStatus,
    RefreshSettings { guild_id: String },
    PremiumUsage { user_id: String },
    PremiumDisable { guild_id: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct ApiState {
    pub ctx: serenity::Context,
    pub shard_manager: Arc<serenity::ShardManager>,
    pub data: Data,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/broadcast", post(broadcast))
        .route("/shardmanEval", post(manager_eval))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve(state: ApiState) -> anyhow::Result<()> {
    let bind = state.data.config.api_bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API: listening on {}", bind);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Caller must be allow-listed and present the configured token. No token configured means no access.
pub fn authorize(
    expected_token: Option<&str>,
    allowed: &[IpAddr],
    caller: IpAddr,
    token: Option<&str>,
) -> Result<(), ApiError> {
    if !allowed.contains(&caller) {
        return Err(ApiError::Forbidden);
    }
    match (expected_token, token) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn check_access(state: &ApiState, caller: SocketAddr, query: &TokenQuery) -> Result<(), ApiError> {
    let config = &state.data.config;
    authorize(
        config.api_token.as_deref(),
        &config.api_allowed_ips,
        caller.ip(),
        query.token.as_deref(),
    )
    .inspect_err(|e| warn!("API: rejected {} ({})", caller, e))
}

/// Shard a guild is routed to: `(guild_id >> 22) % shard_count`.
pub fn shard_for(guild_id: u64, shard_count: u32) -> u32 {
    ((guild_id >> 22) % u64::from(shard_count.max(1))) as u32
}

fn parse_snowflake(raw: &str) -> Result<u64, ApiError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid snowflake '{}'", raw)))
}

async fn health(State(state): State<ApiState>) -> Json<Envelope> {
    Json(Envelope::ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "shards": state.ctx.cache.shard_count(),
        "time": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

struct ShardSnapshot {
    id: u32,
    latency: Option<std::time::Duration>,
    stage: String,
}

async fn shard_snapshot(manager: &serenity::ShardManager) -> Vec<ShardSnapshot> {
    let runners = manager.runners.lock().await;
    let mut shards: Vec<ShardSnapshot> = runners
        .iter()
        .map(|(id, info)| ShardSnapshot {
            id: id.0,
            latency: info.latency,
            stage: format!("{:?}", info.stage),
        })
        .collect();
    shards.sort_by_key(|s| s.id);
    shards
}

async fn broadcast(
    State(state): State<ApiState>,
    ConnectInfo(caller): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
    payload: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    check_access(&state, caller, &query)?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!("API: broadcast {:?}", request.op);

    let shard_count = state.ctx.cache.shard_count();
    let guilds = state.ctx.cache.guilds();
    let results: Vec<Value> = shard_snapshot(&state.shard_manager)
        .await
        .into_iter()
        .map(|shard| match request.op {
            ShardOp::Ping => json!({ "shard": shard.id, "result": "pong" }),
            ShardOp::GuildCount => {
                let count = guilds
                    .iter()
                    .filter(|g| shard_for(g.get(), shard_count) == shard.id)
                    .count();
                json!({ "shard": shard.id, "result": count })
            }
            ShardOp::Latency => json!({
                "shard": shard.id,
                "result": shard.latency.map(|l| l.as_millis() as u64),
            }),
        })
        .collect();
    Ok(Json(Envelope::ok(Value::Array(results))))
}

async fn manager_eval(
    State(state): State<ApiState>,
    ConnectInfo(caller): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
    payload: Result<Json<ManagerOp>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    check_access(&state, caller, &query)?;
    let Json(op) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!("API: manager op {:?}", op);

    let result = match op {
        ManagerOp::ShardStatus => {
            let shards: Vec<Value> = shard_snapshot(&state.shard_manager)
                .await
                .into_iter()
                .map(|s| {
                    json!({
                        "shard": s.id,
                        "stage": s.stage,
                        "latency_ms": s.latency.map(|l| l.as_millis() as u64),
                    })
                })
                .collect();
            Value::Array(shards)
        }
        ManagerOp::RefreshSettings { guild_id } => {
            let guild = serenity::GuildId::new(parse_snowflake(&guild_id)?);
            let settings = state.data.settings.get(Some(guild), true).await?;
            json!({ "guild_id": guild_id, "prefix": settings.prefix, "premium": settings.is_premium() })
        }
        ManagerOp::PremiumUsage { user_id } => {
            let user = parse_snowflake(&user_id)?;
            let roles = crate::services::premium::management_roles(
                &state.ctx.http,
                state.data.config.premium_guild_id,
                serenity::UserId::new(user),
            )
            .await;
            let usage = state.data.premium.usage(user, &roles).await?;
            json!({
                "user_id": user_id,
                "max": usage.max,
                "guilds": usage.guilds.iter().map(|g| g.to_string()).collect::<Vec<_>>(),
            })
        }
        ManagerOp::PremiumDisable { guild_id } => {
            let guild = serenity::GuildId::new(parse_snowflake(&guild_id)?);
            match state.data.premium.disable(0, guild, true).await {
                Ok(()) => json!({ "guild_id": guild_id, "disabled": true }),
                Err(crate::services::premium::PremiumError::NotPremium) => {
                    json!({ "guild_id": guild_id, "disabled": false })
                }
                Err(e) => return Err(ApiError::Internal(anyhow::Error::new(e))),
            }
        }
    };
    Ok(Json(Envelope::ok(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[test]
    fn test_authorize() {
        let allowed = vec![localhost()];
        assert!(authorize(Some("s3cret"), &allowed, localhost(), Some("s3cret")).is_ok());
        assert!(matches!(
            authorize(Some("s3cret"), &allowed, localhost(), Some("nope")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some("s3cret"), &allowed, localhost(), None),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some("s3cret"), &allowed, IpAddr::from([10, 0, 0, 9]), Some("s3cret")),
            Err(ApiError::Forbidden)
        ));
        // Without a configured token nothing gets in
        assert!(matches!(
            authorize(None, &allowed, localhost(), Some("")),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_ops_are_a_closed_set() {
        let op: BroadcastRequest = serde_json::from_str(r#"{"op":"guild_count"}"#).unwrap();
        assert_eq!(op.op, ShardOp::GuildCount);
        assert!(serde_json::from_str::<BroadcastRequest>(r#"{"op":"this.client.destroy()"}"#).is_err());

        let op: ManagerOp =
            serde_json::from_str(r#"{"op":"premium_disable","guild_id":"123"}"#).unwrap();
        assert_eq!(op, ManagerOp::PremiumDisable { guild_id: "123".to_string() });
        let op: ManagerOp = serde_json::from_str(r#"{"op":"shard_status"}"#).unwrap();
        assert_eq!(op, ManagerOp::ShardStatus);
        assert!(serde_json::from_str::<ManagerOp>(r#"{"op":"eval","code":"1+1"}"#).is_err());
    }

    #[test]
    fn test_shard_for() {
        assert_eq!(shard_for(0, 4), 0);
        assert_eq!(shard_for(3 << 22, 4), 3);
        assert_eq!(shard_for(5 << 22, 4), 1);
        assert_eq!(shard_for(5 << 22, 0), 0);
    }

    #[test]
    fn test_snowflake_parsing() {
        assert_eq!(parse_snowflake(" 42 ").unwrap(), 42);
        assert!(matches!(parse_snowflake("0"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_snowflake("abc"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_error_envelope() {
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        let envelope = Envelope::error(StatusCode::NOT_FOUND, "Not found");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({ "status": 404, "message": "Not found", "result": null }));
    }
}
