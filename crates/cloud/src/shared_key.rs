use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

use crate::error::{CloudError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Builds the `Authorization` header value for a body-less request.
///
/// `ms_headers` are the `x-ms-*` headers sent with the request.
pub(crate) fn authorization(
    account_name: &str,
    account_key: &str,
    method: &str,
    url: &Url,
    ms_headers: &[(&str, &str)],
) -> Result<String> {
    let string_to_sign = string_to_sign(account_name, method, url, ms_headers);

    let key = STANDARD
        .decode(account_key)
        .map_err(|e| CloudError::Credentials(format!("account key is not valid base64: {e}")))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| CloudError::Credentials(format!("invalid account key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!("SharedKey {account_name}:{signature}"))
}

fn string_to_sign(
    account_name: &str,
    method: &str,
    url: &Url,
    ms_headers: &[(&str, &str)],
) -> String {
    // Content-Encoding through Range are all empty for the requests we sign.
    let mut out = format!("{method}\n{}", "\n".repeat(11));

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort();
    for (name, value) in headers {
        out.push_str(&format!("{name}:{value}\n"));
    }

    out.push_str(&format!("/{account_name}{}", url.path()));
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push_str(&format!("\n{name}:{}", values.join(",")));
    }
    out
}
