//! Agentline - a session-isolated streaming ReAct agent server.
//!
//! One HTTP request drives one agent run: model text is streamed to the
//! client token by token, embedded `<tool name="...">...</tool>` markers
//! suspend generation to run a tool, and the observation is fed back to the
//! model before generation resumes.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod background;
pub mod build_info;
pub mod config;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod api;
pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod context;
pub mod llm;
pub mod session;
pub mod tools;
