//! Read-only listing of configured resources in the canonical wire shape.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use agentguide_x402::{DiscoveryItem, DiscoveryResponse, X402_VERSION};

use crate::registry::ResourcePolicy;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    #[serde(rename = "type")]
    resource_type: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

/// `GET /discover/resources?type=&limit=&offset=`
pub async fn discover(
    query: web::Query<DiscoverQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    state.registry.reload_if_stale();

    let limit = clamp_limit(query.limit.as_deref());
    let offset = clamp_offset(query.offset.as_deref());

    let items = build_items(
        &state.registry.snapshot(),
        query.resource_type.as_deref(),
        state.config.facilitator.x402_version,
    );
    let items = items.into_iter().skip(offset).take(limit).collect();

    HttpResponse::Ok().json(DiscoveryResponse {
        x402_version: X402_VERSION,
        items,
    })
}

/// Limit outside [1, 100] or non-numeric falls back to the default.
fn clamp_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|limit| (1..=100).contains(limit))
        .map(|limit| limit as usize)
        .unwrap_or(DEFAULT_LIMIT)
}

/// Negative or non-numeric offset falls back to 0.
fn clamp_offset(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|offset| *offset >= 0)
        .map(|offset| offset as usize)
        .unwrap_or(0)
}

fn build_items(
    policies: &[Arc<ResourcePolicy>],
    type_filter: Option<&str>,
    x402_version: u32,
) -> Vec<DiscoveryItem> {
    policies
        .iter()
        .filter(|policy| type_filter.is_none_or(|t| policy.resource_type == t))
        .map(|policy| DiscoveryItem {
            resource: policy.path.clone(),
            resource_type: policy.resource_type.clone(),
            x402_version: if policy.payment_requirements.is_some() {
                x402_version
            } else {
                0
            },
            accepts: policy.payment_requirements.clone().into_iter().collect(),
        })
        .collect()
}
