/// Extract the token from an `Authorization: <scheme> <token>` header value.
///
/// Returns `None` unless the value splits into exactly two fields.
pub fn extract_token(header: &str) -> Option<&str> {
    let mut fields = header.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(_scheme), Some(token), None) => Some(token),
        _ => None,
    }
}
