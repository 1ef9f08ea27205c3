//! Default values for configuration

/// Default API base URL for local development
pub fn default_api_base_url() -> String {
    std::env::var("KBCTL_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/api".to_string())
}

/// Default media base URL (uploaded files and extracted page assets)
pub fn default_media_base_url() -> String {
    std::env::var("KBCTL_MEDIA_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
}

/// Default documents per listing page (matches the backend paginator)
pub fn default_page_size() -> u32 {
    5
}

/// Default content preview width in listings (grapheme clusters)
pub fn default_list_preview_chars() -> usize {
    50
}

/// Default snippet preview width for retrieved passages (grapheme clusters)
pub fn default_snippet_preview_chars() -> usize {
    150
}

/// Default department choices offered at upload
pub fn default_departments() -> Vec<String> {
    vec![
        "IT 部門".to_string(),
        "人資部門".to_string(),
        "財務部門".to_string(),
        "行銷部門".to_string(),
    ]
}

/// Default author id attached to uploads
pub fn default_author() -> i64 {
    1
}

/// Default polling interval in seconds (status checks and watch refresh)
pub fn default_poll_interval_secs() -> u64 {
    5
}

/// Default model backing query answers
pub fn default_query_model() -> String {
    "cloud".to_string()
}

/// Default: retrieval enabled for queries
pub fn default_use_retrieval() -> bool {
    true
}

/// Default voice transcriber command (empty = voice input unavailable)
pub fn default_voice_command() -> String {
    std::env::var("KBCTL_VOICE_COMMAND").unwrap_or_default()
}
