//! L8 public API surface: the thin, ergonomic layer applications actually
//! call. Wraps the L4 algorithms and the L6 [`crate::engine::sync_runner::SyncRunner`]
//! the way `conn::connection::Connection` wrapped `PacketChannel` and the
//! old blocking read/write calls — one struct, one method per operation,
//! errors bubbling straight up via `?`.

use common::err::decode_error::{Diagnostics, ReError};
use common::err::CResult;
use protocol::column::Metadata;
use protocol::value::Field;

use crate::algorithm::close_statement::CloseStatement;
use crate::algorithm::execute::{Execute, ExecuteOutcome};
use crate::algorithm::ping::Ping;
use crate::algorithm::prepare::Prepare;
use crate::algorithm::query::{Query, QueryOutcome};
use crate::algorithm::reset::ResetConnection;
use crate::algorithm::set_charset::SetCharset;
use crate::config::ConnectConfig;
use crate::engine::sync_runner::SyncRunner;
use crate::results::{Results, RowEncoding};

/// A prepared statement handle. Only meaningful against the
/// [`AnyConnection`] that created it — per §3, statement ids are not
/// transferable between connections.
#[derive(Debug)]
pub struct Statement {
    statement_id: u32,
    param_defs: Vec<Metadata>,
    column_defs: Vec<Metadata>,
}

impl Statement {
    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    pub fn param_count(&self) -> usize {
        self.param_defs.len()
    }

    pub fn columns(&self) -> &[Metadata] {
        &self.column_defs
    }
}

/// What a query or an execute produced, with the raw result set already
/// resolved into [`Field`] rows via [`Results`].
pub enum QueryResult {
    Ok { affected_rows: u64, last_insert_id: u64, warnings: u16 },
    Rows(Results),
}

impl QueryResult {
    fn from_query_outcome(outcome: QueryOutcome, meta_mode: protocol::column::MetaMode) -> CResult<Self> {
        match outcome {
            QueryOutcome::Ok { affected_rows, last_insert_id, warnings } => {
                Ok(QueryResult::Ok { affected_rows, last_insert_id, warnings })
            }
            QueryOutcome::ResultSet { column_packets, row_packets } => {
                let mut results = Results::from_column_packets(&column_packets, meta_mode, RowEncoding::Text)?;
                results.push_batch(row_packets);
                Ok(QueryResult::Rows(results))
            }
        }
    }

    fn from_execute_outcome(outcome: ExecuteOutcome, meta_mode: protocol::column::MetaMode) -> CResult<Self> {
        match outcome {
            ExecuteOutcome::Ok { affected_rows, last_insert_id, warnings } => {
                Ok(QueryResult::Ok { affected_rows, last_insert_id, warnings })
            }
            ExecuteOutcome::ResultSet { column_packets, row_packets } => {
                let mut results = Results::from_column_packets(&column_packets, meta_mode, RowEncoding::Binary)?;
                results.push_batch(row_packets);
                Ok(QueryResult::Rows(results))
            }
        }
    }
}

/// A connected, authenticated client abstracting over the TCP/TLS transport
/// split `SyncRunner` already performs internally — "any" in the sense that
/// callers don't need to know or care which transport backs it.
pub struct AnyConnection {
    runner: SyncRunner,
}

impl AnyConnection {
    pub fn connect(config: ConnectConfig) -> CResult<Self> {
        Ok(AnyConnection { runner: SyncRunner::connect(config)? })
    }

    fn meta_mode(&self) -> protocol::column::MetaMode {
        self.runner.conn_state().meta_mode
    }

    pub fn query(&mut self, sql: impl Into<String>) -> CResult<QueryResult> {
        let mut query = Query::new(sql);
        self.runner.drive(&mut query)?;
        QueryResult::from_query_outcome(
            query.into_outcome().expect("Done(Ok) always yields an outcome"),
            self.meta_mode(),
        )
    }

    /// Same as [`Self::query`], but on failure also fills `diagnostics` with
    /// whatever server-provided detail the error carried, instead of
    /// requiring the caller to pattern-match `ReError::Server` themselves.
    pub fn query_with_diagnostics(
        &mut self,
        sql: impl Into<String>,
        diagnostics: &mut Option<Diagnostics>,
    ) -> CResult<QueryResult> {
        with_diagnostics(self.query(sql), diagnostics)
    }

    pub fn prepare(&mut self, sql: impl Into<String>) -> CResult<Statement> {
        let mut prepare = Prepare::new(sql);
        self.runner.drive(&mut prepare)?;
        let stmt = prepare.into_statement().expect("Done(Ok) always yields a statement");
        let mode = self.meta_mode();
        Ok(Statement {
            statement_id: stmt.statement_id,
            param_defs: stmt.param_defs.iter().map(|p| Metadata::parse(p, mode)).collect::<CResult<_>>()?,
            column_defs: stmt.column_defs.iter().map(|c| Metadata::parse(c, mode)).collect::<CResult<_>>()?,
        })
    }

    pub fn prepare_with_diagnostics(
        &mut self,
        sql: impl Into<String>,
        diagnostics: &mut Option<Diagnostics>,
    ) -> CResult<Statement> {
        with_diagnostics(self.prepare(sql), diagnostics)
    }

    pub fn execute(&mut self, statement: &Statement, params: Vec<Field>) -> CResult<QueryResult> {
        if params.len() != statement.param_count() {
            return Err(ReError::Precondition(format!(
                "statement expects {} parameters, got {}",
                statement.param_count(),
                params.len()
            )));
        }
        let mut execute = Execute::new(statement.statement_id, params);
        self.runner.drive(&mut execute)?;
        QueryResult::from_execute_outcome(
            execute.into_outcome().expect("Done(Ok) always yields an outcome"),
            self.meta_mode(),
        )
    }

    pub fn execute_with_diagnostics(
        &mut self,
        statement: &Statement,
        params: Vec<Field>,
        diagnostics: &mut Option<Diagnostics>,
    ) -> CResult<QueryResult> {
        with_diagnostics(self.execute(statement, params), diagnostics)
    }

    pub fn close_statement(&mut self, statement: Statement) -> CResult<()> {
        let mut close = CloseStatement::new(statement.statement_id);
        self.runner.drive(&mut close)
    }

    pub fn ping(&mut self) -> CResult<()> {
        let mut ping = Ping::new();
        self.runner.drive(&mut ping)
    }

    pub fn reset(&mut self) -> CResult<()> {
        let mut reset = ResetConnection::new();
        self.runner.drive(&mut reset)
    }

    pub fn set_charset(&mut self, charset_name: impl Into<String>) -> CResult<()> {
        let mut set_charset = SetCharset::new(charset_name);
        self.runner.drive(&mut set_charset)
    }

    pub fn close(self) -> CResult<()> {
        self.runner.close()
    }
}

/// Runs a fallible operation and, on failure, populates `diagnostics` from
/// whatever two-channel detail the error carries — `None` if the error
/// wasn't a server error (e.g. a transport failure has no server text to
/// surface). The error itself is still returned via the normal `Result`.
pub fn with_diagnostics<T>(result: CResult<T>, diagnostics: &mut Option<Diagnostics>) -> CResult<T> {
    if let Err(err) = &result {
        *diagnostics = err.diagnostics();
    }
    result
}

/// Formats an error together with its diagnostics, if any, so untrusted
/// server text is visibly separated from the library's own message instead
/// of silently vanishing into a bare `Display` of the client-side error.
pub fn error_with_diagnostics(err: &ReError) -> String {
    match err.diagnostics() {
        Some(Diagnostics { client_message, server_message: Some(server_message) }) => {
            format!("{client_message}: {server_message}")
        }
        Some(Diagnostics { client_message, server_message: None }) => client_message,
        None => err.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn with_diagnostics_fills_on_server_error() {
        let err: CResult<()> = Err(ReError::Server { code: 1045, sqlstate: Some("28000".into()), message: "Access denied".into() });
        let mut diagnostics = None;
        let result = with_diagnostics(err, &mut diagnostics);
        assert!(result.is_err());
        let d = diagnostics.unwrap();
        assert_eq!(d.server_message.as_deref(), Some("Access denied"));
    }

    #[test]
    fn with_diagnostics_leaves_none_on_non_server_error() {
        let err: CResult<()> = Err(ReError::Framing("bad header".into()));
        let mut diagnostics = None;
        let _ = with_diagnostics(err, &mut diagnostics);
        assert!(diagnostics.is_none());
    }

    #[test]
    fn error_with_diagnostics_separates_client_and_server_text() {
        let err = ReError::Server { code: 1045, sqlstate: Some("28000".into()), message: "Access denied".into() };
        let formatted = error_with_diagnostics(&err);
        assert!(formatted.contains("Access denied"));
        assert!(formatted.contains("1045"));
    }
}
