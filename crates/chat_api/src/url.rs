/// Default base URL for chat requests.
pub const DEFAULT_CHAT_BASE_URL: &str = "http://127.0.0.1:54321";
/// Default path of the streaming chat function below the base URL.
pub const DEFAULT_CHAT_PATH: &str = "/functions/v1/chat";

/// Normalize a base URL to the streaming chat endpoint.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_CHAT_BASE_URL`]
/// 2) keep the URL unchanged when it already ends with `chat_path`
/// 3) append `chat_path` otherwise
pub fn normalize_chat_url(input: &str, chat_path: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_CHAT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    let path = chat_path.trim().trim_end_matches('/');
    if path.is_empty() {
        return trimmed.to_string();
    }

    let path = path.strip_prefix('/').unwrap_or(path);
    if trimmed.ends_with(&format!("/{path}")) {
        return trimmed.to_string();
    }
    format!("{trimmed}/{path}")
}
