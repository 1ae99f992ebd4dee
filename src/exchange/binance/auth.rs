use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of the query string, hex encoded.
///
/// Signed spot endpoints take `timestamp`, optionally `recvWindow`, and this
/// signature appended last.
pub fn generate_signature(secret_key: &str, query_string: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Current wall-clock time in milliseconds
pub fn get_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Append `recvWindow`, `timestamp` and `signature` to the given params
pub fn build_signed_query(params: &[(&str, String)], secret_key: &str, recv_window_ms: u64) -> String {
    sign_at(params, secret_key, recv_window_ms, get_timestamp())
}

fn sign_at(params: &[(&str, String)], secret_key: &str, recv_window_ms: u64, timestamp: i64) -> String {
    let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    if recv_window_ms > 0 {
        query.push(format!("recvWindow={}", recv_window_ms));
    }
    query.push(format!("timestamp={}", timestamp));

    let query_string = query.join("&");
    let signature = generate_signature(secret_key, &query_string);
    format!("{}&signature={}", query_string, signature)
}
