//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::{AppConfig, Backend};
use bridi_core::{EntityId, GraphError, LiveQuery, LiveState, QueryDef, Row, UserId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{RwLock, watch};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a query definition file (1 MB).
const MAX_QUERY_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum size of a document file to merge (100 MB).
const MAX_DOCUMENT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GraphError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        GraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, GraphError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and parse a query definition file.
pub fn read_query_file(path: &Path) -> Result<QueryDef, GraphError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_QUERY_FILE_SIZE)?;
    let data = std::fs::read(&path)
        .map_err(|e| GraphError::IoError(format!("Read query file: {}", e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| GraphError::InvalidQuery(format!("{}: {}", path.display(), e)))
}

fn print_json(value: &impl serde::Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_rows(rows: &[Row], json_mode: bool) {
    if json_mode {
        print_json(&rows);
        return;
    }
    println!("{} row(s)", rows.len());
    for row in rows {
        print_json(row);
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig) -> Result<(), GraphError> {
    let graph = config.open_graph()?;

    println!("Bridi Semantic Graph Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", config.storage.backend);
    println!("  Database: {:?}", config.storage.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /health                 - Health check");
    println!("  GET  /status                 - Graph status");
    println!("  GET  /entities/{{id}}          - Fetch an entity");
    println!("  POST /entities               - Create an entity");
    println!("  POST /relations              - Create a relation instance");
    println!("  PUT  /entities/{{id}}/payload  - Replace a payload");
    println!("  POST /query                  - Evaluate a query");
    println!("  GET  /documents/{{id}}         - Export a document");
    println!("  POST /documents/{{id}}/merge   - Merge a document");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.addr(), graph).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new seeded database.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), GraphError> {
    if config.storage.backend == Backend::Memory {
        println!("The memory backend keeps nothing on disk; nothing to initialize.");
        return Ok(());
    }

    let db_path = &config.storage.database;
    if db_path.exists() {
        if !force {
            return Err(GraphError::SerializationError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| GraphError::IoError(format!("Remove existing database: {}", e)))?;
    }

    let graph = config.open_graph()?;
    println!(
        "Initialized new redb database at {:?} ({} entities)",
        db_path,
        graph.stats().entities
    );
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show graph status.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), GraphError> {
    let graph = config.open_graph()?;
    let stats = graph.stats();

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "backend": config.storage.backend,
            "entities": stats.entities,
            "concepts": stats.concepts,
            "relation_types": stats.relation_types,
            "relations": stats.relations,
            "revision": stats.revision,
        }));
        return Ok(());
    }

    println!("Bridi Graph Status");
    println!("==================");
    println!("Database: {:?}", config.storage.database);
    println!("Backend:  {}", config.storage.backend);
    println!();
    println!("Entities:       {}", stats.entities);
    println!("Concepts:       {}", stats.concepts);
    println!("Relation types: {}", stats.relation_types);
    println!("Relations:      {}", stats.relations);
    println!("Revision:       {}", stats.revision);

    Ok(())
}

// =============================================================================
// GET COMMAND
// =============================================================================

/// Print one readable entity.
pub fn cmd_get(config: &AppConfig, user: Option<&UserId>, id: &EntityId) -> Result<(), GraphError> {
    let graph = config.open_graph()?;
    let entity = graph
        .get_readable(id, user)
        .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;
    print_json(&entity.snapshot());
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Evaluate a query file once.
pub fn cmd_query(
    config: &AppConfig,
    user: Option<&UserId>,
    file: &Path,
    json_mode: bool,
) -> Result<(), GraphError> {
    let def = read_query_file(file)?;
    let graph = config.open_graph()?;
    let rows = graph.query(&def, user)?;
    print_rows(&rows, json_mode);
    Ok(())
}

// =============================================================================
// WATCH COMMAND
// =============================================================================

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn print_live_state(state: &LiveState, json_mode: bool) {
    match state {
        LiveState::Loading => {
            if !json_mode {
                println!("loading...");
            }
        }
        LiveState::Ready(rows) => print_rows(rows, json_mode),
        LiveState::Failed(message) => {
            if json_mode {
                print_json(&serde_json::json!({ "error": message }));
            } else {
                println!("query failed: {}", message);
            }
        }
    }
}

/// Keep a query file's results live until Ctrl+C.
///
/// The file is polled for modification; each new definition replaces the
/// running one and results are printed on every state change. The process
/// holds the database for its whole lifetime, so nothing else can write the
/// store meanwhile: the driver gets a closed store feed and re-evaluates on
/// definition changes only. Use the HTTP server for store-driven updates.
pub async fn cmd_watch(
    config: &AppConfig,
    user: Option<UserId>,
    file: &Path,
    once: bool,
    poll_ms: u64,
    json_mode: bool,
) -> Result<(), GraphError> {
    let def = read_query_file(file)?;
    let graph = config.open_graph()?;
    let revision = graph.revision();
    let live = LiveQuery::new(Arc::new(RwLock::new(graph))).with_debounce(config.debounce());

    if once {
        let state = live.run_once(Some(&def), user.as_ref()).await;
        print_live_state(&state, json_mode);
        return match state {
            LiveState::Failed(message) => Err(GraphError::InvalidQuery(message)),
            _ => Ok(()),
        };
    }

    let (definitions, definitions_rx) = watch::channel(Some(def));
    let (_, changes_rx) = watch::channel(revision);
    let (_session, session_rx) = watch::channel(user);
    let (out_tx, mut out) = watch::channel(LiveState::Loading);
    let driver = tokio::spawn(live.run(definitions_rx, changes_rx, session_rx, out_tx));

    let mut poll = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
    let mut last_modified = modified_time(file);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = out.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = out.borrow_and_update().clone();
                print_live_state(&state, json_mode);
            }
            _ = poll.tick() => {
                let modified = modified_time(file);
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;
                match read_query_file(file) {
                    Ok(def) => {
                        tracing::info!(file = %file.display(), "query file reloaded");
                        definitions.send_replace(Some(def));
                    }
                    Err(e) => tracing::warn!(error = %e, "query file not reloaded"),
                }
            }
        }
    }

    drop(definitions);
    driver
        .await
        .map_err(|e| GraphError::IoError(format!("Live query task failed: {}", e)))
}

// =============================================================================
// EXPORT / MERGE COMMANDS
// =============================================================================

/// Write an entity's replicated document to a file.
pub fn cmd_export(config: &AppConfig, id: &EntityId, output: &Path) -> Result<(), GraphError> {
    let output = validate_output_path(output)?;
    let mut graph = config.open_graph()?;
    let bytes = graph
        .export_document(id)
        .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;

    std::fs::write(&output, &bytes)
        .map_err(|e| GraphError::IoError(format!("Write document: {}", e)))?;
    println!("Exported {} ({} bytes) to {:?}", id, bytes.len(), output);
    Ok(())
}

/// Merge a replicated document from a file, acting as `user` or, without
/// one, as the configured genesis owner.
pub fn cmd_merge(
    config: &AppConfig,
    user: Option<&UserId>,
    id: &EntityId,
    input: &Path,
) -> Result<(), GraphError> {
    let input = validate_file_path(input)?;
    validate_file_size(&input, MAX_DOCUMENT_FILE_SIZE)?;
    let bytes = std::fs::read(&input)
        .map_err(|e| GraphError::IoError(format!("Read document: {}", e)))?;

    if config.storage.backend == Backend::Memory {
        tracing::warn!("memory backend: the merge is discarded on exit");
    }

    let acting = user.cloned().unwrap_or_else(|| config.genesis_owner());
    let mut graph = config.open_graph()?;
    let revision = graph.merge_document(id, &bytes, Some(&acting))?;
    println!("Merged {} at revision {}", id, revision);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use tempfile::tempdir;

    fn redb_config(dir: &Path) -> AppConfig {
        AppConfig::default().with_overrides(&Overrides {
            database: Some(dir.join("bridi.db")),
            backend: Some(Backend::Redb),
            ..Overrides::default()
        })
    }

    #[test]
    fn test_read_query_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.json");
        std::fs::write(&path, r#"{"from":{"ids":["@task1"]},"map":{"id":{"field":"doc.id"}}}"#)
            .unwrap();
        let def = read_query_file(&path).unwrap();
        assert_eq!(def.from.ids, Some(vec![EntityId::from("@task1")]));

        std::fs::write(&path, r#"{"from":{"ids":["@task1"]},"select":{}}"#).unwrap();
        assert!(matches!(read_query_file(&path), Err(GraphError::InvalidQuery(_))));
    }

    #[test]
    fn test_missing_query_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_query_file(&dir.path().join("absent.json")),
            Err(GraphError::IoError(_))
        ));
    }

    #[test]
    fn test_output_path_requires_directory() {
        let dir = tempdir().unwrap();
        assert!(validate_output_path(&dir.path().join("out.bin")).is_ok());
        assert!(validate_output_path(&dir.path().join("missing").join("out.bin")).is_err());
    }

    #[test]
    fn test_init_refuses_existing_database() {
        let dir = tempdir().unwrap();
        let config = redb_config(dir.path());
        cmd_init(&config, false).unwrap();
        assert!(cmd_init(&config, false).is_err());
        cmd_init(&config, true).unwrap();
    }

    #[test]
    fn test_export_then_merge_into_other_database() {
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        let file = source.path().join("person1.doc");
        let id = EntityId::from("@person1");

        cmd_export(&redb_config(source.path()), &id, &file).unwrap();
        cmd_merge(&redb_config(target.path()), None, &id, &file).unwrap();

        let graph = redb_config(target.path()).open_graph().unwrap();
        assert!(graph.get(&id).is_some());
    }

    #[test]
    fn test_merge_as_other_user_is_refused() {
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        let file = source.path().join("task1.doc");
        let id = EntityId::from("@task1_name");

        cmd_export(&redb_config(source.path()), &id, &file).unwrap();
        let result = cmd_merge(
            &redb_config(target.path()),
            Some(&UserId::new("mallory")),
            &id,
            &file,
        );
        assert!(matches!(result, Err(GraphError::Forbidden(_))));
    }
}
