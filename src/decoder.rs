//! Proxy config URI decoding.
//!
//! Recovers the `(host, port)` a proxy link points at. Two link families are
//! recognised:
//!
//! * `vmess://` and `vless://` carry a standard Base64 encoded JSON document,
//!   with the host in `add` and the port in `port`.
//! * every other scheme (`trojan`, `ss`, `ssr`, `warp`, ...) names the
//!   endpoint directly in the URI authority, `[userinfo@]host:port`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::util::split_host_port;

const SCHEME_DELIMITER: &str = "://";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid config URL format.")]
    MalformedURI,

    #[error("Invalid config format (Base64 decode failed).")]
    InvalidPayloadEncoding,

    #[error("Invalid config format (payload is not valid JSON).")]
    InvalidPayloadFormat,

    #[error("Could not extract host or port from config.")]
    MissingHostOrPort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
    Warp,
    Other(String),
}

impl Scheme {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "vmess" => Scheme::Vmess,
            "vless" => Scheme::Vless,
            "trojan" => Scheme::Trojan,
            "ss" => Scheme::Shadowsocks,
            "ssr" => Scheme::ShadowsocksR,
            "warp" => Scheme::Warp,
            other => Scheme::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Vmess => "vmess",
            Scheme::Vless => "vless",
            Scheme::Trojan => "trojan",
            Scheme::Shadowsocks => "ss",
            Scheme::ShadowsocksR => "ssr",
            Scheme::Warp => "warp",
            Scheme::Other(name) => name,
        }
    }

    /// Bounded label for metrics; unrecognised schemes share one series.
    pub fn metrics_label(&self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess",
            Scheme::Vless => "vless",
            Scheme::Trojan => "trojan",
            Scheme::Shadowsocks => "ss",
            Scheme::ShadowsocksR => "ssr",
            Scheme::Warp => "warp",
            Scheme::Other(_) => "other",
        }
    }

    /// Whether the link body is a Base64 JSON document rather than an authority.
    pub fn carries_encoded_payload(&self) -> bool {
        matches!(self, Scheme::Vmess | Scheme::Vless)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A decoded link: the scheme it declared and the endpoint it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedConfig {
    pub scheme: Scheme,
    pub endpoint: Endpoint,
}

pub fn decode(config_text: &str) -> Result<Endpoint, DecodeError> {
    decode_config(config_text).map(|decoded| decoded.endpoint)
}

/// The scheme a link declares, without validating the rest of it.
pub fn declared_scheme(config_text: &str) -> Option<Scheme> {
    config_text
        .trim()
        .split_once(SCHEME_DELIMITER)
        .map(|(name, _)| Scheme::from_name(name))
}

pub fn decode_config(config_text: &str) -> Result<DecodedConfig, DecodeError> {
    let config_text = config_text.trim();
    let url = Url::parse(config_text).map_err(|e| {
        debug!("config is not a URI: {}", e);
        DecodeError::MalformedURI
    })?;

    // Scheme and body both come from the first delimiter, wherever it is.
    let (name, body) = config_text
        .split_once(SCHEME_DELIMITER)
        .ok_or(DecodeError::MalformedURI)?;
    if !name.eq_ignore_ascii_case(url.scheme()) {
        return Err(DecodeError::MalformedURI);
    }

    let scheme = Scheme::from_name(name);
    let (host, port) = if scheme.carries_encoded_payload() {
        endpoint_from_payload(body.trim())?
    } else {
        endpoint_from_authority(body)?
    };

    Ok(DecodedConfig {
        scheme,
        endpoint: validate(host, port)?,
    })
}

fn endpoint_from_payload(payload: &str) -> Result<(String, String), DecodeError> {
    let bytes = STANDARD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| {
            debug!("payload is not base64: {}", e);
            DecodeError::InvalidPayloadEncoding
        })?;

    let doc: Value = serde_json::from_slice(&bytes).map_err(|e| {
        debug!("payload is not JSON: {}", e);
        DecodeError::InvalidPayloadFormat
    })?;
    let fields = doc.as_object().ok_or(DecodeError::InvalidPayloadFormat)?;

    let host = match fields.get("add") {
        Some(Value::String(add)) => add.clone(),
        _ => return Err(DecodeError::MissingHostOrPort),
    };
    // Port shows up both as a number and as a numeric string
    let port = match fields.get("port") {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(port) => port.to_string(),
            // 443.0 is still port 443
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(&f) => {
                    (f as u64).to_string()
                }
                _ => return Err(DecodeError::MissingHostOrPort),
            },
        },
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Err(DecodeError::MissingHostOrPort),
    };

    Ok((host, port))
}

fn endpoint_from_authority(body: &str) -> Result<(String, String), DecodeError> {
    let authority = body
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = match authority.rfind('@') {
        Some(at) => &authority[at + 1..],
        None => authority,
    };

    let (host, port) = split_host_port(host_port).ok_or(DecodeError::MissingHostOrPort)?;
    Ok((host.to_string(), port.to_string()))
}

fn validate(host: String, port: String) -> Result<Endpoint, DecodeError> {
    if host.is_empty() {
        return Err(DecodeError::MissingHostOrPort);
    }
    match port.parse::<u16>() {
        Ok(port) if port != 0 => Ok(Endpoint { host, port }),
        _ => Err(DecodeError::MissingHostOrPort),
    }
}
