//! The Regulus gateway: conversation orchestration over a streaming LLM,
//! tool dispatch with per-tenant context injection, and the
//! personal-document upload surface.

pub mod api;
pub mod auth;
pub mod pdf;
pub mod runtime;
pub mod state;
pub mod uploader;
