//! # Health Responder
//!
//! HTTP endpoint for load balancer checks. Every request runs one fresh
//! check against the target node; the responder keeps no state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::check::{check_node, DownReason, HealthVerdict};
use crate::gateway::{Credentials, NodeGateway};
use crate::topology::NodeAddress;

/// What the responder checks
pub struct HealthState {
    pub gateway: Arc<dyn NodeGateway>,
    pub credentials: Credentials,
    pub target: NodeAddress,
    /// Highest acceptable delay in seconds
    pub max_delay: u64,
}

/// Create the health routes
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    // Gateways are blocking; keep them off the async workers.
    let check = Arc::clone(&state);
    let verdict = tokio::task::spawn_blocking(move || {
        check_node(
            check.gateway.as_ref(),
            &check.credentials,
            &check.target,
            check.max_delay,
        )
    })
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "health check task failed");
        HealthVerdict::Down(DownReason::NoConnection)
    });

    let status =
        StatusCode::from_u16(verdict.status_code()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, verdict.message())
}

/// HTTP server answering health checks for one node
pub struct HealthServer {
    listen: SocketAddr,
    state: Arc<HealthState>,
}

impl HealthServer {
    pub fn new(listen: SocketAddr, state: HealthState) -> Self {
        Self {
            listen,
            state: Arc::new(state),
        }
    }

    /// Get the router (for testing)
    pub fn router(&self) -> Router {
        health_routes(Arc::clone(&self.state))
    }

    /// Serve until the process exits.
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.listen).await?;
        info!(
            listen = %self.listen,
            target = %self.state.target,
            max_delay = self.state.max_delay,
            "health responder listening"
        );
        axum::serve(listener, self.router()).await
    }

    /// Serve on a runtime owned by this call.
    pub fn run_blocking(self) -> Result<(), std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::gateway::memory::{MemoryGateway, SimNode};

    fn server(gateway: &MemoryGateway, target: &NodeAddress) -> HealthServer {
        HealthServer::new(
            "127.0.0.1:0".parse().unwrap(),
            HealthState {
                gateway: Arc::new(gateway.clone()),
                credentials: Credentials::default(),
                target: target.clone(),
                max_delay: 5,
            },
        )
    }

    async fn get_root(router: Router) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthy_replica() {
        let gateway = MemoryGateway::new();
        let primary = NodeAddress::new("db1", 3306);
        let replica = NodeAddress::new("db2", 3306);
        gateway.add_node(&replica, SimNode::replica_of(&primary, 3).with_delay(Some(1)));

        let (status, body) = get_root(server(&gateway, &replica).router()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "200 Health OK");
    }

    #[tokio::test]
    async fn test_delayed_replica() {
        let gateway = MemoryGateway::new();
        let primary = NodeAddress::new("db1", 3306);
        let replica = NodeAddress::new("db2", 3306);
        gateway.add_node(&replica, SimNode::replica_of(&primary, 3).with_delay(Some(12)));

        let (status, body) = get_root(server(&gateway, &replica).router()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "503 Delayed Replication (12)");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let gateway = MemoryGateway::new();
        let (status, body) =
            get_root(server(&gateway, &NodeAddress::new("gone", 3306)).router()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "503 No connection");
    }
}
