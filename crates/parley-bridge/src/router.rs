//! Free-text intent routing.
//!
//! Classification is an ordered list of matcher functions over the trimmed
//! input; the first to match wins. Precedence, highest first:
//!
//! 1. `help` / `/help`
//! 2. `tools` / `/tools`
//! 3. `greeting://<name>` resource reads
//! 4. addition — `add <A> and <B>` or `<A> + <B>`
//! 5. subtraction — `subtract <A> from <B>` or `<A> - <B>`
//!
//! Matching is case-insensitive and whole-input: operands must span the rest
//! of the line. Operands are standard signed decimal floats; a capture that
//! fails to parse is a non-match and falls through to the default reply.
//! Both subtraction phrasings bind positionally: the first captured operand
//! becomes `a`, the second `b`.

use serde_json::{json, Map};

use parley_core::model::McpOperation;

use crate::backend::BackendSession;

/// What one line of user input asks for.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Help,
    ListTools,
    ReadResource { uri: String },
    CallTool { tool: &'static str, a: f64, b: f64 },
    ResourceUsageHint,
    Fallback,
}

/// A routed reply: the chat text plus the backend operation behind it, if
/// any.
#[derive(Clone, Debug, PartialEq)]
pub struct RouterReply {
    pub message: String,
    pub operation: Option<McpOperation>,
}

impl RouterReply {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            operation: None,
        }
    }
}

type Matcher = fn(&str) -> Option<Intent>;

/// Ordered matcher list; edit order here to change precedence.
const MATCHERS: &[Matcher] = &[
    match_help,
    match_tools,
    match_greeting,
    match_add,
    match_subtract,
];

pub fn classify(input: &str) -> Intent {
    let trimmed = input.trim();
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(trimmed))
        .unwrap_or(Intent::Fallback)
}

/// Classify `input` and execute the matched action against the backend.
///
/// Backend call failures are converted to plain-text replies here — one bad
/// input never aborts the session.
pub async fn route(input: &str, backend: &mut dyn BackendSession) -> RouterReply {
    match classify(input) {
        Intent::Help => RouterReply::text(HELP_MESSAGE),
        Intent::ListTools => list_tools_reply(backend),
        Intent::ReadResource { uri } => read_resource_reply(&uri, backend).await,
        Intent::CallTool { tool, a, b } => call_tool_reply(tool, a, b, backend).await,
        Intent::ResourceUsageHint => {
            RouterReply::text("Please use the format: greeting://YourName")
        }
        Intent::Fallback => RouterReply::text(fallback_message(input.trim())),
    }
}

// ── Matchers ──

fn match_help(input: &str) -> Option<Intent> {
    let lowered = input.to_lowercase();
    (lowered == "help" || lowered == "/help").then_some(Intent::Help)
}

fn match_tools(input: &str) -> Option<Intent> {
    let lowered = input.to_lowercase();
    (lowered == "tools" || lowered == "/tools").then_some(Intent::ListTools)
}

fn match_greeting(input: &str) -> Option<Intent> {
    let lowered = input.to_lowercase();
    if !lowered.starts_with("greeting:") {
        return None;
    }

    // Prefix matching is case-insensitive, but the name is taken verbatim.
    if lowered.starts_with("greeting://") {
        let name = &input["greeting://".len()..];
        if !name.is_empty() {
            return Some(Intent::ReadResource {
                uri: format!("greeting://{name}"),
            });
        }
    }
    Some(Intent::ResourceUsageHint)
}

fn match_add(input: &str) -> Option<Intent> {
    phrase_operands(input, "add", "and")
        .or_else(|| infix_operands(input, '+'))
        .map(|(a, b)| Intent::CallTool { tool: "add", a, b })
}

fn match_subtract(input: &str) -> Option<Intent> {
    phrase_operands(input, "subtract", "from")
        .or_else(|| infix_operands(input, '-'))
        .map(|(a, b)| Intent::CallTool {
            tool: "subtract",
            a,
            b,
        })
}

/// Match `<verb> <A> <link> <B>`, e.g. `add 5 and 3`.
fn phrase_operands(input: &str, verb: &str, link: &str) -> Option<(f64, f64)> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    match tokens.as_slice() {
        [first, a, middle, b]
            if first.eq_ignore_ascii_case(verb) && middle.eq_ignore_ascii_case(link) =>
        {
            Some((a.parse().ok()?, b.parse().ok()?))
        }
        _ => None,
    }
}

/// Match `<A> <op> <B>`, e.g. `10 - 2` or `5+3`. The scan for the operator
/// starts past a leading sign so `-5 - 3` parses as (-5, 3).
fn infix_operands(input: &str, op: char) -> Option<(f64, f64)> {
    let start = usize::from(input.starts_with(['+', '-']));
    let idx = input[start..].find(op)? + start;
    let a = input[..idx].trim().parse().ok()?;
    let b = input[idx + op.len_utf8()..].trim().parse().ok()?;
    Some((a, b))
}

// ── Reply builders ──

fn list_tools_reply(backend: &mut dyn BackendSession) -> RouterReply {
    let tools = match backend.tools() {
        Ok(tools) => tools,
        Err(e) => return RouterReply::text(format!("Error listing tools: {e}")),
    };

    if tools.is_empty() {
        return RouterReply::text("No tools are currently available.");
    }

    let listing = tools
        .iter()
        .map(|tool| {
            format!(
                "• **{}**: {}",
                tool.name,
                tool.description.as_deref().unwrap_or("No description available")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    RouterReply::text(format!("🔧 **Available MCP Tools:**\n\n{listing}"))
}

async fn read_resource_reply(uri: &str, backend: &mut dyn BackendSession) -> RouterReply {
    match backend.read_resource(uri).await {
        Ok(result) => RouterReply {
            message: format!("👋 {result}"),
            operation: Some(McpOperation::Resource {
                uri: uri.to_string(),
                result,
            }),
        },
        Err(e) => RouterReply::text(format!("Error getting greeting: {e}")),
    }
}

async fn call_tool_reply(
    tool: &'static str,
    a: f64,
    b: f64,
    backend: &mut dyn BackendSession,
) -> RouterReply {
    let mut arguments = Map::new();
    arguments.insert("a".to_string(), json!(a));
    arguments.insert("b".to_string(), json!(b));

    match backend.call_tool(tool, arguments.clone()).await {
        Ok(result) => {
            let symbol = if tool == "add" { '+' } else { '-' };
            RouterReply {
                message: format!("🧮 {a} {symbol} {b} = {result}"),
                operation: Some(McpOperation::Tool {
                    name: tool.to_string(),
                    arguments,
                    result,
                }),
            }
        }
        Err(e) => RouterReply::text(format!("Error performing math operation: {e}")),
    }
}

const HELP_MESSAGE: &str = "🤖 **MCP Chatbot Help**

Available commands:
• **Math Operations**:
  - \"add 5 and 3\" or \"5 + 3\"
  - \"subtract 2 from 10\" or \"10 - 2\"

• **Greetings**:
  - \"greeting://YourName\" (e.g., \"greeting://Alice\")

• **Information**:
  - \"tools\" - List available MCP tools
  - \"help\" - Show this help message

Try asking me to perform calculations or get a personalized greeting!";

fn fallback_message(input: &str) -> String {
    format!(
        "🤔 I'm not sure how to help with \"{input}\".

Try one of these:
• Math: \"add 5 and 3\" or \"10 - 2\"
• Greeting: \"greeting://YourName\"
• Type \"help\" for more options

What would you like me to help you with?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MockBackend;

    // ── Classification ──

    #[test]
    fn help_matches_case_insensitively() {
        assert_eq!(classify("help"), Intent::Help);
        assert_eq!(classify("/HELP"), Intent::Help);
        assert_eq!(classify("  Help  "), Intent::Help);
    }

    #[test]
    fn tools_matches_before_arithmetic() {
        assert_eq!(classify("tools"), Intent::ListTools);
        assert_eq!(classify("/tools"), Intent::ListTools);
    }

    #[test]
    fn greeting_keeps_name_verbatim() {
        assert_eq!(
            classify("GREETING://Ada"),
            Intent::ReadResource {
                uri: "greeting://Ada".into()
            }
        );
    }

    #[test]
    fn greeting_without_name_gets_usage_hint() {
        assert_eq!(classify("greeting://"), Intent::ResourceUsageHint);
        assert_eq!(classify("greeting:Ada"), Intent::ResourceUsageHint);
    }

    #[test]
    fn add_phrase_binds_operands() {
        assert_eq!(
            classify("add 5 and 3"),
            Intent::CallTool {
                tool: "add",
                a: 5.0,
                b: 3.0
            }
        );
    }

    #[test]
    fn add_infix_allows_decimals_and_no_spaces() {
        assert_eq!(
            classify("5.5+2.25"),
            Intent::CallTool {
                tool: "add",
                a: 5.5,
                b: 2.25
            }
        );
    }

    #[test]
    fn subtract_phrase_binds_positionally() {
        // First captured operand is `a`, second is `b`.
        assert_eq!(
            classify("subtract 2 from 10"),
            Intent::CallTool {
                tool: "subtract",
                a: 2.0,
                b: 10.0
            }
        );
    }

    #[test]
    fn subtract_infix_binds_positionally() {
        assert_eq!(
            classify("10 - 2"),
            Intent::CallTool {
                tool: "subtract",
                a: 10.0,
                b: 2.0
            }
        );
    }

    #[test]
    fn negative_left_operand_parses() {
        assert_eq!(
            classify("-5 - 3"),
            Intent::CallTool {
                tool: "subtract",
                a: -5.0,
                b: 3.0
            }
        );
    }

    #[test]
    fn malformed_operands_fall_through() {
        assert_eq!(classify("add five and six"), Intent::Fallback);
        assert_eq!(classify("what is 5 + 3?"), Intent::Fallback);
        assert_eq!(classify("10 - 2 - 3"), Intent::Fallback);
        assert_eq!(classify("hello there"), Intent::Fallback);
    }

    // ── Routing ──

    #[tokio::test]
    async fn add_routes_to_tool_call() {
        let mut backend = MockBackend::connected();
        let reply = route("add 5 and 3", &mut backend).await;

        assert_eq!(reply.message, "🧮 5 + 3 = 8");
        let (name, args) = &backend.tool_calls[0];
        assert_eq!(name, "add");
        assert_eq!(args["a"], 5.0);
        assert_eq!(args["b"], 3.0);
        assert!(matches!(
            reply.operation,
            Some(McpOperation::Tool { ref name, .. }) if name == "add"
        ));
    }

    #[tokio::test]
    async fn infix_subtract_routes_to_tool_call() {
        let mut backend = MockBackend::connected();
        let reply = route("10 - 2", &mut backend).await;

        assert_eq!(reply.message, "🧮 10 - 2 = 8");
        let (name, args) = &backend.tool_calls[0];
        assert_eq!(name, "subtract");
        assert_eq!(args["a"], 10.0);
        assert_eq!(args["b"], 2.0);
    }

    #[tokio::test]
    async fn greeting_routes_to_resource_read() {
        let mut backend = MockBackend::connected();
        let reply = route("greeting://Ada", &mut backend).await;

        assert_eq!(backend.resource_reads, vec!["greeting://Ada"]);
        assert!(reply.message.starts_with("👋 "));
        assert_eq!(
            reply.operation,
            Some(McpOperation::Resource {
                uri: "greeting://Ada".into(),
                result: backend.resource_text.clone(),
            })
        );
    }

    #[tokio::test]
    async fn tool_failure_becomes_reply_text() {
        let mut backend = MockBackend::connected();
        backend.fail_calls = true;
        let reply = route("add 1 and 2", &mut backend).await;

        assert!(reply.message.starts_with("Error performing math operation:"));
        assert!(reply.operation.is_none());
    }

    #[tokio::test]
    async fn resource_failure_becomes_reply_text() {
        let mut backend = MockBackend::connected();
        backend.fail_calls = true;
        let reply = route("greeting://Ada", &mut backend).await;

        assert!(reply.message.starts_with("Error getting greeting:"));
        assert!(reply.operation.is_none());
    }

    #[tokio::test]
    async fn tools_listing_formats_descriptors() {
        let mut backend = MockBackend::connected();
        let reply = route("tools", &mut backend).await;

        assert!(reply.message.contains("Available MCP Tools"));
        assert!(reply.message.contains("• **add**: Add two numbers"));
        assert!(reply.operation.is_none());
    }

    #[tokio::test]
    async fn empty_tool_cache_gets_no_tools_text() {
        let mut backend = MockBackend::connected();
        backend.tools.clear();
        let reply = route("tools", &mut backend).await;

        assert_eq!(reply.message, "No tools are currently available.");
    }

    #[tokio::test]
    async fn fallback_echoes_input() {
        let mut backend = MockBackend::connected();
        let reply = route("make me a sandwich", &mut backend).await;

        assert!(reply.message.contains("\"make me a sandwich\""));
        assert!(reply.operation.is_none());
        assert!(backend.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn help_does_not_touch_backend() {
        let mut backend = MockBackend::connected();
        let reply = route("help", &mut backend).await;

        assert!(reply.message.contains("MCP Chatbot Help"));
        assert!(backend.tool_calls.is_empty());
        assert!(backend.resource_reads.is_empty());
    }
}
