use chat_api::url::{DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_PATH};
use chat_api::normalize_chat_url;

#[test]
fn url_normalization_keeps_existing_chat_endpoint() {
    assert_eq!(
        normalize_chat_url("https://project.example.co/functions/v1/chat/", DEFAULT_CHAT_PATH),
        "https://project.example.co/functions/v1/chat"
    );
}

#[test]
fn url_normalization_appends_chat_path_to_base() {
    assert_eq!(
        normalize_chat_url("https://project.example.co", DEFAULT_CHAT_PATH),
        "https://project.example.co/functions/v1/chat"
    );
    assert_eq!(
        normalize_chat_url("http://localhost:8080/api/", "v1/chat/completions"),
        "http://localhost:8080/api/v1/chat/completions"
    );
}

#[test]
fn url_normalization_falls_back_to_default_base() {
    assert_eq!(
        normalize_chat_url("   ", DEFAULT_CHAT_PATH),
        format!("{DEFAULT_CHAT_BASE_URL}{DEFAULT_CHAT_PATH}")
    );
}

#[test]
fn url_normalization_with_empty_path_keeps_base() {
    assert_eq!(
        normalize_chat_url("https://llm.internal/stream/", ""),
        "https://llm.internal/stream"
    );
}
