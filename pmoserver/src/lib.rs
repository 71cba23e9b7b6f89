//! # pmoserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le serveur HTTP de PMOTube et son système de logs.
//! Les autres crates de la workspace (cache audio, playlist) y greffent leurs
//! routes au travers de traits d'extension implémentés pour [`Server`].
//!
//! ## Fonctionnalités
//!
//! - 🚀 **API de haut niveau** : création d'un serveur Axum en quelques lignes
//! - 📡 **Server-Sent Events (SSE)** : logs en temps réel via `/log-sse`
//! - 📚 **Documentation OpenAPI** : Swagger UI par API enregistrée
//! - ⚡ **Arrêt gracieux** : gestion propre de l'arrêt sur Ctrl+C
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use pmoserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new("MyServer", "localhost", 8080).build();
//!     server.init_logging(LoggingOptions::default()).await;
//!
//!     server.add_route("/api/status", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
