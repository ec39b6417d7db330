//! Filename sanitization
//!
//! Reduces a client-supplied filename to a single safe path segment. This
//! is the sole path-traversal defense: callers must never join a raw client
//! name onto the storage root.

/// Characters treated as path separators regardless of platform
const SEPARATORS: [char; 2] = ['/', '\\'];

/// Character substituted for any separator that survives segment splitting
const SUBSTITUTE: char = '_';

/// Strips directory components from `raw`, keeping only the final path
/// segment with any leftover separators replaced by underscores.
///
/// Never fails. An input that yields no usable segment (empty, all
/// separators, or a bare `.`/`..`) sanitizes to the empty string, which
/// callers must treat as "no usable filename".
pub fn sanitize(raw: &str) -> String {
    // Trailing separators carry no segment of their own ("dir/" names "dir").
    let trimmed = raw.trim_end_matches(SEPARATORS);

    let segment = trimmed
        .rsplit(SEPARATORS)
        .next()
        .unwrap_or_default();

    // A dot segment joined onto the storage root would resolve outside it.
    if segment == "." || segment == ".." {
        return String::new();
    }

    segment.replace(SEPARATORS, &SUBSTITUTE.to_string())
}
