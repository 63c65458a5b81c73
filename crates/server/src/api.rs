use std::{
    collections::BTreeMap,
    fs::File,
    io::Read,
    path::{Component, Path, PathBuf},
    time::Instant,
};

use serde::{Deserialize, Serialize};
use seedql::{
    assert_dataset, open_driver, parse_dataset, seed, AssertOptions, CancelToken, Operation,
    RowDiff, SeedOptions, TableAssertion,
};
use tiny_http::{Header, Request, Response};
use walkdir::WalkDir;

use crate::ServerError;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Options accepted by `POST /api/seed/{path}` as a JSON body, a form body,
/// or the query string.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SeedRequest {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub batch_size: usize,
    pub truncates: Vec<String>,
    pub targets: Vec<String>,
}

/// Options accepted by `GET /api/assert/{path}` via the query string.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AssertRequest {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub targets: Vec<String>,
}

impl SeedRequest {
    /// Builds the options from decoded key/value pairs, accepting both the
    /// short and the long parameter names.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ServerError> {
        let mut request = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "i" | "include_tag" | "include-tag" => request.include_tags.push(value.clone()),
                "e" | "exclude_tag" | "exclude-tag" => request.exclude_tags.push(value.clone()),
                "t" | "target" => request.targets.push(value.clone()),
                "truncate" => request.truncates.push(value.clone()),
                "b" | "batch_size" | "batch-size" => {
                    request.batch_size = value.parse().map_err(|_| {
                        ServerError::BadRequest(format!("invalid batch size: '{value}'"))
                    })?;
                }
                _ => {}
            }
        }
        request.include_tags.sort();
        request.exclude_tags.sort();
        request.truncates.sort();
        request.targets.sort();
        Ok(request)
    }
}

impl AssertRequest {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut request = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "i" | "include_tag" | "include-tag" => request.include_tags.push(value.clone()),
                "e" | "exclude_tag" | "exclude-tag" => request.exclude_tags.push(value.clone()),
                "t" | "target" => request.targets.push(value.clone()),
                _ => {}
            }
        }
        request.include_tags.sort();
        request.exclude_tags.sort();
        request.targets.sort();
        request
    }
}

#[derive(Debug, Serialize)]
pub struct SeedTableResult {
    pub task: String,
    pub table: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SeedResponse {
    pub tables: Vec<SeedTableResult>,
}

#[derive(Debug, Serialize)]
pub struct AssertTableEntry {
    pub table: String,
    pub primary_keys: Vec<String>,
    #[serde(rename = "match")]
    pub matched: bool,
    pub diff: Vec<RowDiff>,
}

#[derive(Debug, Default, Serialize)]
pub struct AssertResponse {
    pub tables: Vec<AssertTableEntry>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    datasets: Vec<String>,
}

/// All `.yaml`/`.yml` files below `dir`, as sorted relative slash paths.
pub fn list_datasets(dir: &Path) -> Vec<String> {
    let mut datasets: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml")
            )
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|path| path.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    datasets.sort();
    datasets
}

/// Splits a query or form-encoded string into decoded key/value pairs.
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                if let (Some(high), Some(low)) = (
                    bytes.get(index + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(index + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    decoded.push((high * 16 + low) as u8);
                    index += 3;
                } else {
                    decoded.push(b'%');
                    index += 1;
                }
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Runs the seed for one dataset below `dir`, collecting per-table task
/// results through the progress callback.
pub fn run_seed(
    token: &CancelToken,
    dir: &Path,
    conn: &str,
    dataset: &str,
    request: &SeedRequest,
) -> Result<SeedResponse, ServerError> {
    let path = resolve_dataset_path(dir, dataset)?;
    let file = File::open(&path)?;
    let data = parse_dataset(file)?;

    let mut overrides = BTreeMap::new();
    for table in &request.truncates {
        overrides.insert(table.clone(), Operation::Truncate);
    }

    let mut driver = open_driver(token, conn)?;
    let mut tables: Vec<SeedTableResult> = Vec::new();
    let mut started = Instant::now();

    seed(
        token,
        driver.as_mut(),
        &data,
        SeedOptions {
            batch_size: request.batch_size,
            operations: overrides,
            include_tags: request.include_tags.clone(),
            exclude_tags: request.exclude_tags.clone(),
            target_tables: request.targets.clone(),
            progress: Some(Box::new(|table, task, start, error| {
                if start {
                    started = Instant::now();
                } else {
                    tables.push(SeedTableResult {
                        task: task.to_string(),
                        table: table.to_string(),
                        success: error.is_none(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: error.map(ToString::to_string),
                    });
                }
            })),
        },
    )?;

    Ok(SeedResponse { tables })
}

/// Runs the assertion for one dataset below `dir`.
pub fn run_assert(
    token: &CancelToken,
    dir: &Path,
    conn: &str,
    dataset: &str,
    request: &AssertRequest,
) -> Result<(bool, Vec<TableAssertion>), ServerError> {
    let path = resolve_dataset_path(dir, dataset)?;
    let file = File::open(&path)?;
    let data = parse_dataset(file)?;

    let driver = open_driver(token, conn)?;
    let (ok, results) = assert_dataset(
        token,
        driver.as_ref(),
        &data,
        AssertOptions {
            include_tags: request.include_tags.clone(),
            exclude_tags: request.exclude_tags.clone(),
            target_tables: request.targets.clone(),
            ..AssertOptions::default()
        },
    )?;

    Ok((ok, results))
}

pub(crate) fn handle_request(token: &CancelToken, dir: &Path, conn: &str, mut request: Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (url.clone(), String::new()),
    };
    let wants_json = accepts_json(&request);
    log::debug!("{method} {path}");

    if method == "GET" && path == "/api/list" {
        let datasets = list_datasets(dir);
        let body = if wants_json {
            render_json(&ListResponse { datasets })
        } else {
            render_dataset_list(&datasets)
        };
        respond(request, 200, content_type(wants_json), body);
        return;
    }

    if method == "POST" {
        if let Some(rest) = path.strip_prefix("/api/seed/") {
            let dataset = percent_decode(rest);
            let seed_request = match read_seed_request(&mut request, &query) {
                Ok(seed_request) => seed_request,
                Err(error) => {
                    respond(
                        request,
                        400,
                        TEXT_CONTENT_TYPE,
                        format!("error parsing request: {error}\n"),
                    );
                    return;
                }
            };
            match run_seed(token, dir, conn, &dataset, &seed_request) {
                Ok(response) => {
                    let body = if wants_json {
                        render_json(&response)
                    } else {
                        render_seed_text(&response)
                    };
                    respond(request, 200, content_type(wants_json), body);
                }
                Err(error) => {
                    respond(
                        request,
                        500,
                        TEXT_CONTENT_TYPE,
                        format!("preparation error: {error}\n"),
                    );
                }
            }
            return;
        }
    }

    if method == "GET" {
        if let Some(rest) = path.strip_prefix("/api/assert/") {
            let dataset = percent_decode(rest);
            let assert_request = AssertRequest::from_pairs(&parse_query(&query));
            match run_assert(token, dir, conn, &dataset, &assert_request) {
                Ok((ok, results)) => {
                    let body = if wants_json {
                        render_json(&assert_response(&results))
                    } else {
                        render_assert_text(&results)
                    };
                    let status = if ok { 200 } else { 400 };
                    respond(request, status, content_type(wants_json), body);
                }
                Err(error) => {
                    respond(
                        request,
                        500,
                        TEXT_CONTENT_TYPE,
                        format!("assert error: {error}\n"),
                    );
                }
            }
            return;
        }
    }

    respond(request, 404, TEXT_CONTENT_TYPE, "Not Found\n".to_string());
}

/// Builds the JSON body for an assert run.
pub fn assert_response(results: &[TableAssertion]) -> AssertResponse {
    AssertResponse {
        tables: results
            .iter()
            .map(|result| AssertTableEntry {
                table: result.name.clone(),
                primary_keys: result.primary_keys.clone(),
                matched: result.is_match(),
                diff: result.rows.clone(),
            })
            .collect(),
    }
}

fn read_seed_request(request: &mut Request, query: &str) -> Result<SeedRequest, ServerError> {
    let body_type = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Content-Type"))
        .map(|header| header.value.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    if body_type.starts_with(JSON_CONTENT_TYPE) {
        let mut body = String::new();
        request.as_reader().read_to_string(&mut body)?;
        if body.trim().is_empty() {
            return Ok(SeedRequest::default());
        }
        return serde_json::from_str(&body)
            .map_err(|source| ServerError::BadRequest(source.to_string()));
    }
    if body_type.starts_with("application/x-www-form-urlencoded") {
        let mut body = String::new();
        request.as_reader().read_to_string(&mut body)?;
        return SeedRequest::from_pairs(&parse_query(&body));
    }

    SeedRequest::from_pairs(&parse_query(query))
}

fn resolve_dataset_path(dir: &Path, dataset: &str) -> Result<PathBuf, ServerError> {
    let not_found = || ServerError::DatasetNotFound {
        path: dataset.to_string(),
    };

    if dataset.is_empty() {
        return Err(not_found());
    }
    let relative = Path::new(dataset);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(not_found());
    }

    let path = dir.join(relative);
    if path.is_file() {
        Ok(path)
    } else {
        Err(not_found())
    }
}

fn accepts_json(request: &Request) -> bool {
    request.headers().iter().any(|header| {
        header.field.equiv("Accept") && header.value.as_str().contains(JSON_CONTENT_TYPE)
    })
}

fn content_type(wants_json: bool) -> &'static str {
    if wants_json {
        JSON_CONTENT_TYPE
    } else {
        TEXT_CONTENT_TYPE
    }
}

fn render_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
}

fn render_dataset_list(datasets: &[String]) -> String {
    let mut body = String::new();
    for dataset in datasets {
        body.push_str(&format!("* {dataset}\n"));
        body.push_str(&format!("    * Seed:   POST /api/seed/{dataset}\n"));
        body.push_str(&format!("    * Assert: GET  /api/assert/{dataset}\n"));
    }
    body
}

fn render_seed_text(response: &SeedResponse) -> String {
    let mut body = String::new();
    for table in &response.tables {
        body.push_str(&format!("{} '{}' table -> ", table.task, table.table));
        if table.success {
            body.push_str(&format!("ok ({}ms)\n", table.duration_ms));
        } else {
            body.push_str(&format!(
                "error\n    {}\n",
                table.error.as_deref().unwrap_or("unknown")
            ));
        }
    }
    body
}

fn render_assert_text(results: &[TableAssertion]) -> String {
    results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn respond(request: Request, status: u16, content_type: &str, body: String) {
    let header = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .expect("static header name and value");
    let response = Response::from_string(body)
        .with_status_code(status)
        .with_header(header);
    if let Err(error) = request.respond(response) {
        log::warn!("failed to send response: {error}");
    }
}
