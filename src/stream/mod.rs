//! Claude CLI `stream-json` events and their aggregation into one call result.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One line of `--output-format stream-json` output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        model: Option<String>,
    },

    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(rename = "user")]
    User {},

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: Option<u32>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// Aggregated view of a finished stream.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StreamSummary {
    /// Text of the `result` event, if one arrived
    pub result: Option<String>,
    pub is_error: bool,
    /// Last assistant text block; used when no `result` event arrives
    pub last_text: Option<String>,
    pub tool_uses: usize,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
    pub duration_ms: Option<u64>,
    pub unparsed_lines: usize,
}

impl StreamSummary {
    /// Fold one stdout line into the summary and log it.
    pub fn observe(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let event = match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                self.unparsed_lines += 1;
                debug!(error = %e, line = %preview(line, 120), "unrecognized stream line");
                return;
            }
        };

        match event {
            StreamEvent::System { subtype, model } => {
                debug!(subtype = %subtype, model = ?model, "claude session event");
            }
            StreamEvent::Assistant { message } => {
                for block in message.content {
                    match block {
                        ContentBlock::ToolUse { name, input } => {
                            self.tool_uses += 1;
                            info!(tool = %name, "{}", describe_tool_use(&name, &input));
                        }
                        ContentBlock::Text { text } => {
                            debug!(text = %preview(&text, 160), "claude says");
                            self.last_text = Some(text);
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            StreamEvent::User {} => {}
            StreamEvent::Result {
                subtype,
                result,
                is_error,
                total_cost_usd,
                num_turns,
                duration_ms,
            } => {
                if is_error {
                    warn!(subtype = %subtype, "claude reported an error result");
                }
                info!(
                    cost_usd = ?total_cost_usd,
                    turns = ?num_turns,
                    duration_ms = ?duration_ms,
                    tool_uses = self.tool_uses,
                    "claude call finished"
                );
                self.result = result;
                self.is_error = is_error;
                self.cost_usd = total_cost_usd;
                self.num_turns = num_turns;
                self.duration_ms = duration_ms;
            }
        }
    }

    /// Final text of the call: the `result` event, else the last assistant text.
    pub fn into_text(self) -> String {
        self.result.or(self.last_text).unwrap_or_default()
    }
}

/// Human-readable description of a tool use.
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    match name {
        "Read" => format!("Reading: {}", field("file_path").map(shorten_path).unwrap_or_default()),
        "Write" => format!("Creating: {}", field("file_path").map(shorten_path).unwrap_or_default()),
        "Edit" | "MultiEdit" => {
            format!("Editing: {}", field("file_path").map(shorten_path).unwrap_or_default())
        }
        "Bash" => format!("Running: {}", preview(field("command").unwrap_or("command"), 60)),
        "Glob" | "Grep" => format!("Searching: {}", preview(field("pattern").unwrap_or("*"), 40)),
        _ => name.to_string(),
    }
}

fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// First line of `text`, cut to `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
