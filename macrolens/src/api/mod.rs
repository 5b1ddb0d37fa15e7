//! API layer for HTTP request handling and data models.
//!
//! This module contains the HTTP surface, organized into:
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures for API communication
//!
//! The service exposes a single analysis route plus operational endpoints:
//!
//! - **Analysis** (`POST /analyze`): multipart image upload → nutrition estimate
//! - **Health** (`GET /healthz`): liveness check
//! - **Docs** (`GET /docs`, `GET /openapi.json`): OpenAPI documentation via `utoipa`

pub mod handlers;
pub mod models;
