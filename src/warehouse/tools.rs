// ABOUTME: Bounded SQL toolset wrapping a live warehouse session for agent use
// ABOUTME: Exposes list/describe/query/query-check tools bound to a connection and model handle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{WarehouseError, WarehouseSession};
use crate::agent::{AgentHandle, ChatMessage, ChatRequest, ToolCall, ToolOutput, ToolSpec};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Maximum number of result rows returned to the agent per query
const MAX_RESULT_ROWS: usize = 100;

/// Bounded set of callable SQL tools over one warehouse session.
///
/// The toolset is bound to the session it was provisioned with and to the
/// caller-supplied agent handle (used by the query checker).
pub struct WarehouseToolset {
    session: Arc<dyn WarehouseSession>,
    agent: AgentHandle,
    schema: String,
}

impl WarehouseToolset {
    /// Wrap a session and agent handle as a toolset
    #[must_use]
    pub fn new(session: Arc<dyn WarehouseSession>, agent: AgentHandle, schema: String) -> Self {
        Self {
            session,
            agent,
            schema,
        }
    }

    /// Tool descriptors handed to the agent
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "warehouse_list_tables".to_owned(),
                description: "List the tables available in the connected warehouse schema"
                    .to_owned(),
                parameters: Some(json!({"type": "object", "properties": {}})),
            },
            ToolSpec {
                name: "warehouse_describe_table".to_owned(),
                description: "Describe the columns and types of a warehouse table".to_owned(),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {"table": {"type": "string"}},
                    "required": ["table"]
                })),
            },
            ToolSpec {
                name: "warehouse_query".to_owned(),
                description: "Execute a read-only SQL query against the warehouse".to_owned(),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                })),
            },
            ToolSpec {
                name: "warehouse_query_check".to_owned(),
                description: "Double-check a SQL query for common mistakes before running it"
                    .to_owned(),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                })),
            },
        ]
    }

    /// Execute a tool call requested by the agent.
    ///
    /// Failures are folded into the returned payload so the agent sees an
    /// error message instead of the turn aborting.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        debug!("Executing warehouse tool: {}", call.name);

        let result = match call.name.as_str() {
            "warehouse_list_tables" => self.list_tables().await,
            "warehouse_describe_table" => match string_arg(&call.args, "table") {
                Some(table) => self.describe_table(&table).await,
                None => Err(WarehouseError::Query("missing 'table' argument".to_owned())),
            },
            "warehouse_query" => match string_arg(&call.args, "query") {
                Some(query) => self.run_query(&query).await,
                None => Err(WarehouseError::Query("missing 'query' argument".to_owned())),
            },
            "warehouse_query_check" => match string_arg(&call.args, "query") {
                Some(query) => self.check_query(&query).await,
                None => Err(WarehouseError::Query("missing 'query' argument".to_owned())),
            },
            other => Err(WarehouseError::Query(format!("unknown tool: {other}"))),
        };

        let response = match result {
            Ok(value) => value,
            Err(e) => json!({"error": e.to_string()}),
        };

        ToolOutput {
            name: call.name.clone(),
            response,
        }
    }

    async fn list_tables(&self) -> Result<Value, WarehouseError> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = '{}' ORDER BY table_name",
            escape_literal(&self.schema)
        );
        let result = self.session.execute(&sql).await?;
        let tables: Vec<Value> = result.rows.into_iter().flatten().collect();
        Ok(json!({"tables": tables}))
    }

    async fn describe_table(&self, table: &str) -> Result<Value, WarehouseError> {
        let sql = format!(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
            escape_literal(&self.schema),
            escape_literal(table)
        );
        let result = self.session.execute(&sql).await?;
        let columns: Vec<Value> = result
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut iter = row.into_iter();
                let name = iter.next()?;
                let data_type = iter.next()?;
                Some(json!({"name": name, "type": data_type}))
            })
            .collect();
        Ok(json!({"table": table, "columns": columns}))
    }

    async fn run_query(&self, query: &str) -> Result<Value, WarehouseError> {
        let result = self.session.execute(query).await?;
        let truncated = result.rows.len() > MAX_RESULT_ROWS;
        let rows: Vec<Vec<Value>> = result.rows.into_iter().take(MAX_RESULT_ROWS).collect();
        Ok(json!({
            "columns": result.columns,
            "rows": rows,
            "truncated": truncated,
        }))
    }

    /// Ask the bound model handle to review a query before execution
    async fn check_query(&self, query: &str) -> Result<Value, WarehouseError> {
        let prompt = format!(
            "Double check this SQL query for common mistakes (quoting, joins, \
             NULL handling, function arguments). If there are any mistakes, \
             rewrite the query. If there are no mistakes, reproduce the \
             original query exactly. Output only the final SQL.\n\n{query}"
        );

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_model(self.agent.model.clone())
            .with_temperature(self.agent.temperature);

        let response = self
            .agent
            .provider
            .complete(&request)
            .await
            .map_err(|e| WarehouseError::Query(format!("query check failed: {e}")))?;

        Ok(json!({"checked_query": response.content.trim()}))
    }
}

/// Extract a string argument from a tool-call args object
fn string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Escape single quotes for embedding in a SQL string literal
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}
