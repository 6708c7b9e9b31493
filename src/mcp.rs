use serde_json::Value;

// MCP tools/call result:
// - content: a single text block carrying the serialized structured value.
// - structuredContent: the tool's own JSON.
// - isError: present only when true.
pub fn mcp_wrap(structured: Value, is_error: bool) -> Value {
    let text = serde_json::to_string(&structured).unwrap_or_else(|_| "{}".to_string());
    let mut obj = serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
    });
    if is_error {
        if let Some(map) = obj.as_object_mut() {
            map.insert("isError".to_string(), Value::Bool(true));
        }
    }
    obj
}
