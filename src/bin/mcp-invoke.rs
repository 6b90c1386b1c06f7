/// MCP Invoke Client
///
/// Command-line front end for the batch invoker.
///
/// Usage:
/// - `mcp-invoke list [namespace]` prints the available tools as JSON,
///   keeping only those whose name starts with the lowercased namespace.
/// - `mcp-invoke call [namespace]` reads a JSON array of call requests on
///   stdin and prints the results as JSON, e.g.
///   `[{"id": 1, "function": {"name": "get_weather", "arguments": {"location": "Delhi, India"}}}]`
///
/// The endpoint comes from `--endpoint` or `MCP_ENDPOINT`
/// (default: "http://127.0.0.1:8000/mcp"). RUST_LOG / LOG_FORMAT control logging.

use std::io::Read;

use clap::{Parser, Subcommand};

use mcp_tool_gateway::client::{CallRequest, Invoker, McpSession, DEFAULT_ENDPOINT};
use mcp_tool_gateway::core::logging;

#[derive(Parser, Debug)]
#[command(name = "mcp-invoke")]
#[command(about = "List MCP tools or run a batch of tool calls concurrently", version)]
struct Cli {
    /// MCP endpoint to talk to
    #[arg(long, env = "MCP_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print the available tools as JSON
    List {
        /// Keep only tools whose name starts with this prefix (lowercased)
        namespace: Option<String>,
    },
    /// Read a JSON array of call requests on stdin and print the results
    Call {
        /// Dispatch each call to "<namespace>_<name>"
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let session = McpSession::new(cli.endpoint).map_err(std::io::Error::other)?;
    tracing::debug!(endpoint = session.endpoint(), "using MCP endpoint");
    let mut invoker = Invoker::new(session);

    let output = match cli.command {
        Command::List { namespace } => {
            let tools = invoker
                .list_tools(namespace.as_deref())
                .await
                .map_err(std::io::Error::other)?;
            serde_json::to_string_pretty(&tools)?
        }
        Command::Call { namespace } => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let requests: Vec<CallRequest> = serde_json::from_str(&input)?;
            let results = invoker
                .invoke(&requests, namespace.as_deref())
                .await
                .map_err(std::io::Error::other)?;
            serde_json::to_string_pretty(&results)?
        }
    };

    println!("{}", output);
    Ok(())
}
