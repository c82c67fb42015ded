use subtle::ConstantTimeEq;

/// Compare secrets without leaking the position of the first mismatch.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whether a request carrying `provided` may use an endpoint guarded by `expected`.
///
/// No configured token leaves the endpoint open.
pub fn access_allowed(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected {
        Some(expected) => provided.is_some_and(|p| constant_time_compare(p, expected)),
        None => true,
    }
}
