//! Identifier validation for registry entries.
//!
//! Names are snake_case, capability ids are dotted `domain.verb` pairs, and
//! versions are semver. These checks run during registry value validation,
//! so they report rather than panic.

/// Returns true for snake_case identifiers: `[a-z][a-z0-9_]*`.
pub fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Returns true for capability ids: `domain.verb`, both snake_case.
pub fn is_capability_id(id: &str) -> bool {
    let mut parts = id.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(domain), Some(verb), None) => is_snake_case(domain) && is_snake_case(verb),
        _ => false,
    }
}

/// Returns true for semver versions: `MAJOR.MINOR.PATCH` with optional
/// `-prerelease` and `+build` suffixes.
pub fn is_semver(version: &str) -> bool {
    let (core, rest) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 || !parts.iter().all(|p| is_semver_numeric(p)) {
        return false;
    }

    if rest.is_empty() {
        return true;
    }
    let (pre, build) = match rest.strip_prefix('-') {
        Some(tail) => match tail.split_once('+') {
            Some((pre, build)) => (Some(pre), Some(build)),
            None => (Some(tail), None),
        },
        None => match rest.strip_prefix('+') {
            Some(build) => (None, Some(build)),
            None => return false,
        },
    };
    pre.map_or(true, is_semver_suffix) && build.map_or(true, is_semver_suffix)
}

fn is_semver_numeric(part: &str) -> bool {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // No leading zeros in the numeric core.
    part == "0" || !part.starts_with('0')
}

fn is_semver_suffix(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert!(is_snake_case("send_email"));
        assert!(is_snake_case("a"));
        assert!(is_snake_case("step_2"));
        assert!(!is_snake_case("SendEmail"));
        assert!(!is_snake_case("2step"));
        assert!(!is_snake_case("_leading"));
        assert!(!is_snake_case(""));
        assert!(!is_snake_case("dash-case"));
    }

    #[test]
    fn test_capability_id() {
        assert!(is_capability_id("email.send"));
        assert!(is_capability_id("fs.read_file"));
        assert!(!is_capability_id("email"));
        assert!(!is_capability_id("email.send.now"));
        assert!(!is_capability_id("Email.Send"));
        assert!(!is_capability_id(".send"));
    }

    #[test]
    fn test_semver() {
        assert!(is_semver("1.0.0"));
        assert!(is_semver("0.1.2"));
        assert!(is_semver("1.0.0-alpha.1"));
        assert!(is_semver("1.0.0+build.5"));
        assert!(is_semver("1.0.0-rc.1+build.5"));
        assert!(!is_semver("1.0"));
        assert!(!is_semver("01.0.0"));
        assert!(!is_semver("1.0.0.0"));
        assert!(!is_semver("v1.0.0"));
        assert!(!is_semver("1.0.0-"));
    }
}
