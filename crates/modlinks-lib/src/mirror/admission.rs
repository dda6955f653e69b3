/// True when the source URL contains any configured skip substring. Such
/// artifacts are never fetched and keep their upstream link.
pub fn is_skip_listed(url: &str, skip_urls: &[String]) -> bool {
    skip_urls.iter().any(|part| url.contains(part.as_str()))
}

/// Size ceiling check, applied to the final written archive rather than the
/// raw download.
pub fn within_size_ceiling(size: u64, max_allowed_size: u64) -> bool {
    size <= max_allowed_size
}
