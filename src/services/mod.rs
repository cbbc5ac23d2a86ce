/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Timed loop driving a started session.
pub mod orchestrator;
/// Markdown quiz parsing and validation.
pub mod quiz_parser;
/// Session lifecycle operations exposed over HTTP.
pub mod quiz_service;
/// Background expiry of old sessions.
pub mod session_sweeper;
/// WebSocket connection handling.
pub mod websocket_service;
