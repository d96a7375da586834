/// `--operator` wins, then `RELGATE_OPERATOR`, then `USER`.
pub fn resolve_operator(flag: Option<String>) -> String {
    flag.filter(|s| !s.trim().is_empty())
        .or_else(|| env_nonempty("RELGATE_OPERATOR"))
        .or_else(|| env_nonempty("USER"))
        .unwrap_or_else(|| "unknown".to_string())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}
