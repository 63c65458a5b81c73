//! HTTP surface over a directory of datasets:
//!
//! - `GET  /api/list` — enumerate datasets under the served directory
//! - `POST /api/seed/{path}` — seed the database from one dataset
//! - `GET  /api/assert/{path}` — assert the database against one dataset
//!
//! Responses are JSON when the request accepts `application/json`, plain
//! text otherwise. Assert responds 400 on mismatch; driver and preparation
//! failures respond 500.

mod api;

use std::{path::Path, time::Duration};

use seedql::CancelToken;

pub use api::{
    list_datasets, parse_query, run_assert, run_seed, AssertRequest, AssertResponse,
    AssertTableEntry, SeedRequest, SeedResponse, SeedTableResult,
};

/// Server error types.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No dataset files below the served directory.
    #[error("no data set found in '{dir}'; data sets are YAML files")]
    NoDatasets { dir: String },

    /// Requested dataset path is missing or escapes the served directory.
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: String },

    /// Request options could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Failed to bind or serve the listening socket.
    #[error("server socket error: {0}")]
    Socket(String),

    /// Core engine failure (parse, driver, seed).
    #[error(transparent)]
    Core(#[from] seedql::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(250);

/// Serves the dataset directory until the token is signalled. Validates that
/// the directory holds at least one dataset and that the database answers
/// before binding the port.
pub fn serve(token: &CancelToken, dir: &Path, conn: &str, port: u16) -> Result<(), ServerError> {
    if list_datasets(dir).is_empty() {
        return Err(ServerError::NoDatasets {
            dir: dir.display().to_string(),
        });
    }
    probe_connection(token, conn)?;

    let server = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|source| ServerError::Socket(source.to_string()))?;
    log::info!("seedql API server listening on :{port}");
    println!("seedql API server");
    println!();
    println!("  GET  http://localhost:{port}/api/list                  : list data set files");
    println!("  POST http://localhost:{port}/api/seed/{{data set path}}  : seed database content");
    println!("  GET  http://localhost:{port}/api/assert/{{data set path}}: assert database content");
    println!();
    println!("start receiving at :{port}");

    loop {
        match server.recv_timeout(RECEIVE_TIMEOUT) {
            Ok(Some(request)) => api::handle_request(token, dir, conn, request),
            Ok(None) => {
                if token.is_cancelled() {
                    return Ok(());
                }
            }
            Err(source) => return Err(ServerError::Socket(source.to_string())),
        }
    }
}

fn probe_connection(token: &CancelToken, conn: &str) -> Result<(), ServerError> {
    let driver = seedql::open_driver(token, conn)?;
    driver.table_names(None)?;
    Ok(())
}
