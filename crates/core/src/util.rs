/// Shorten a commit SHA for display. Returns the input unchanged when shorter than `len`.
pub fn short_sha(sha: &str, len: usize) -> &str { sha.get(..len).unwrap_or(sha) }
