/// Batch Tool Invoker
///
/// Lists tools and fans a batch of calls out to a `ToolProvider`
/// concurrently. Results come back in request order, each tagged with its
/// request id and the tool name as dispatched.
///
/// Argument policy: every request is validated before anything is sent. A
/// string argument that does not decode to a JSON object, or an empty tool
/// name, fails the whole batch and nothing is dispatched. Once dispatched, a
/// failing call only affects its own entry: the error is returned as
/// `{"error": "..."}` in that entry's `result`.
///
/// Each batch or listing opens the provider and closes it again. If the
/// caller drops an `invoke` future part way (a timeout around it, say), the
/// provider is left open; the next operation closes that stale bracket before
/// opening a new one, and `release` closes it on demand.

use std::time::Instant;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use crate::client::error::InvokeError;
use crate::client::types::{CallRequest, CallResult, ToolDescriptor};
use crate::client::ToolProvider;
use crate::core::utils::error_payload;

/// A request that passed validation and is ready to send.
#[derive(Debug, Clone, PartialEq)]
struct PreparedCall {
    tool_id: Value,
    name: String,
    arguments: Map<String, Value>,
}

pub struct Invoker<P> {
    provider: P,
    /// Set between `open` and `close`; still set after a cancelled batch.
    bracket_open: bool,
}

impl<P: ToolProvider> Invoker<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            bracket_open: false,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_inner(self) -> P {
        self.provider
    }

    /// Close a provider left open by a cancelled batch or listing. No-op
    /// otherwise.
    pub async fn release(&mut self) {
        if self.bracket_open {
            tracing::debug!("closing provider left open by a cancelled operation");
            self.end().await;
        }
    }

    async fn begin(&mut self) -> Result<(), InvokeError> {
        self.release().await;
        self.bracket_open = true;
        let opened = self.provider.open().await;
        if opened.is_err() {
            self.bracket_open = false;
        }
        opened
    }

    async fn end(&mut self) {
        self.provider.close().await;
        self.bracket_open = false;
    }

    /// List the provider's tools, keeping only names that start with the
    /// lowercased `namespace_filter` when one is given.
    pub async fn list_tools(&mut self, namespace_filter: Option<&str>) -> Result<Vec<ToolDescriptor>, InvokeError> {
        let started = Instant::now();
        self.begin().await?;
        let listed = self.provider.list_tools().await;
        self.end().await;

        let tools = filter_tools(listed?, namespace_filter);
        tracing::info!(
            tools = tools.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool listing finished"
        );
        Ok(tools)
    }

    /// Dispatch every request concurrently and collect the results in
    /// request order.
    ///
    /// With a `namespace`, each call goes to `"<namespace lowercased>_<name>"`.
    /// Errors are returned only for batch-level problems: invalid requests
    /// (nothing is sent) or a provider that cannot be opened.
    pub async fn invoke(
        &mut self,
        requests: &[CallRequest],
        namespace: Option<&str>,
    ) -> Result<Vec<CallResult>, InvokeError> {
        let batch = prepare_batch(requests, namespace)?;

        let started = Instant::now();
        self.begin().await?;
        let (results, failed) = gather(&self.provider, batch).await;
        self.end().await;

        tracing::info!(
            calls = results.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "invocation finished"
        );
        Ok(results)
    }
}

/// Launch every call, then wait for all of them. Also returns how many calls
/// failed, as opposed to tools that answered with an error-shaped payload.
async fn gather<P: ToolProvider>(provider: &P, batch: Vec<PreparedCall>) -> (Vec<CallResult>, usize) {
    let calls = batch.into_iter().map(|call| async move {
        let PreparedCall { tool_id, name, arguments } = call;
        let (result, failed) = match provider.call_tool(&name, arguments).await {
            Ok(data) => (data, false),
            Err(e) => {
                tracing::warn!(tool = %name, id = %tool_id, error = %e, "tool call failed");
                (error_payload(e.to_string()), true)
            }
        };
        (CallResult { tool_id, name, result }, failed)
    });
    // join_all yields outputs in input order
    let outcomes = join_all(calls).await;
    let failed = outcomes.iter().filter(|(_, failed)| *failed).count();
    (outcomes.into_iter().map(|(result, _)| result).collect(), failed)
}

fn prepare_batch(requests: &[CallRequest], namespace: Option<&str>) -> Result<Vec<PreparedCall>, InvokeError> {
    requests
        .iter()
        .map(|request| {
            if request.function.name.is_empty() {
                return Err(InvokeError::InvalidRequest { id: request.id.clone() });
            }
            let arguments = request
                .function
                .arguments
                .decode()
                .map_err(|source| InvokeError::MalformedArguments {
                    id: request.id.clone(),
                    source,
                })?;
            Ok(PreparedCall {
                tool_id: request.id.clone(),
                name: resolve_tool_name(&request.function.name, namespace),
                arguments,
            })
        })
        .collect()
}

/// Prefix a tool name with `"<namespace lowercased>_"`. An empty namespace
/// counts as none.
pub fn resolve_tool_name(tool_name: &str, namespace: Option<&str>) -> String {
    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{}_{}", ns.to_lowercase(), tool_name),
        None => tool_name.to_string(),
    }
}

/// Keep descriptors whose name starts with the lowercased filter. An empty
/// or absent filter keeps everything.
pub fn filter_tools(tools: Vec<ToolDescriptor>, namespace_filter: Option<&str>) -> Vec<ToolDescriptor> {
    match namespace_filter.filter(|f| !f.is_empty()) {
        Some(filter) => {
            let prefix = filter.to_lowercase();
            tools.into_iter().filter(|tool| tool.name.starts_with(&prefix)).collect()
        }
        None => tools,
    }
}
