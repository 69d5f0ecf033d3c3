//! Local-first retrieval over a folder of markdown notes.
//!
//! Cairn splits markdown files into heading-aware, token-bounded chunks,
//! embeds them, and keeps three views of every chunk in one SQLite file: the
//! primary table, an FTS5 index and a [sqlite-vec](https://github.com/asg017/sqlite-vec)
//! vector table. Queries run vector and BM25 lookups concurrently and merge
//! the min-max normalized scores with configurable weights. A debounced file
//! watcher keeps the index in step with the notes on disk.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 for keyword search and sqlite-vec for
//!   vector search, written through a single transactional boundary
//! - **Embeddings**: Ollama, OpenAI-compatible servers or Gemini over HTTP
//! - **Search**: weighted hybrid of cosine similarity and BM25, degrading to
//!   keyword-only when no vectors are available
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`chunker`]: Markdown chunking and token estimation
//! - [`store`]: The multi-view index store
//! - [`embedding`]: Embedding providers
//! - [`search`]: Hybrid search
//! - [`sync`]: Indexer, debounce coordinator and file watcher
//! - [`workspace`]: The notes directory
//! - [`capture`]: Rule-based capture of memorable statements
//! - [`recall`]: Nearest notes formatted as prompt context
//! - [`engine`]: Everything above assembled behind one type

pub mod capture;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod recall;
pub mod search;
pub mod server;
pub mod store;
pub mod sync;
pub mod tools;
pub mod workspace;
