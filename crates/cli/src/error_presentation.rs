use std::{io, path::PathBuf};

use anyhow::Context;
use miette::Report;

const RUN_CONTEXT: &str = "while running seedql";
const FILE_READ_CONTEXT: &str = "while reading dataset file";
const SERVER_CONTEXT: &str = "while serving datasets";

pub(crate) type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug)]
pub(crate) enum CliError {
    MissingConnection,
    ReadFile { path: PathBuf, source: io::Error },
    Core(seedql::Error),
    Server(seedql_server::ServerError),
}

impl From<seedql::Error> for CliError {
    fn from(value: seedql::Error) -> Self {
        Self::Core(value)
    }
}

impl From<seedql_server::ServerError> for CliError {
    fn from(value: seedql_server::ServerError) -> Self {
        Self::Server(value)
    }
}

pub(crate) fn render_runtime_error(error: CliError) -> String {
    match error {
        CliError::MissingConnection => format!("[usage] {}", missing_connection_message()),
        CliError::ReadFile { path, source } => {
            let context = format!("{FILE_READ_CONTEXT} `{}`", path.display());
            let report = report_with_context(source, context);
            format!("[io] {report}")
        }
        CliError::Core(source) => {
            let category = core_category(&source);
            let report = report_with_context(source, RUN_CONTEXT);
            format!("[{category}] {report}")
        }
        CliError::Server(source) => {
            let report = report_with_context(source, SERVER_CONTEXT);
            format!("[server] {report}")
        }
    }
}

fn report_with_context<E, C>(source: E, context: C) -> Report
where
    E: std::error::Error + Send + Sync + 'static,
    C: Into<String>,
{
    let context = context.into();
    let anyhow_error = std::result::Result::<(), E>::Err(source)
        .context(context)
        .expect_err("context wrapping must produce an error");
    miette::miette!("{anyhow_error:#}")
}

fn core_category(error: &seedql::Error) -> &'static str {
    match error {
        seedql::Error::Parse(_) => "parse",
        seedql::Error::Dataset(_) => "dataset",
        seedql::Error::Driver(_) => "driver",
        seedql::Error::Cancelled => "cancelled",
        seedql::Error::Multiple(_) => "multiple",
    }
}

fn missing_connection_message() -> &'static str {
    "--db=<conn> or SEEDQL_CONN envvar is required to specify database location"
}
