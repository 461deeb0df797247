//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Report bind failures (port in use, permission denied) as fatal errors

use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::error::GatewayError;

/// Bind the gateway's listening socket. Failure is never retried.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| GatewayError::Bind { addr, source })?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}
