//! http.request - single HTTP call through reqwest

use std::time::Duration;

use async_trait::async_trait;
use eyre::{WrapErr, eyre};
use serde_json::{Map, Value};

use crate::domain::{Arguments, Observation, Payload};
use crate::tools::capability::{ArgumentsExt, AsyncCapability, CapabilityInfo, Guard};
use crate::tools::context::CallContext;

const DEFAULT_TIMEOUT_SEC: u64 = 30;

pub struct HttpRequest;

impl CapabilityInfo for HttpRequest {
    fn name(&self) -> &'static str {
        "http.request"
    }

    fn description(&self) -> &'static str {
        "Send an HTTP request. Args: url, method (default GET), headers, params, json, body, timeout_sec"
    }

    fn guard(&self) -> Guard {
        Guard::Network { url_arg: "url" }
    }
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

// Loopback targets never go through a proxy
fn is_loopback(url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost") || host.parse::<std::net::IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[async_trait]
impl AsyncCapability for HttpRequest {
    async fn call(&self, args: &Arguments, ctx: &CallContext) -> eyre::Result<Observation> {
        let url = args.require_str("url")?;
        let method = args.str_arg("method").unwrap_or("GET").to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes()).map_err(|_| eyre!("invalid method {}", method))?;
        let timeout = Duration::from_secs(args.u64_arg("timeout_sec").unwrap_or(DEFAULT_TIMEOUT_SEC));

        let mut builder = reqwest::Client::builder().timeout(timeout);
        if is_loopback(url) {
            builder = builder.no_proxy();
        }
        let client = builder.build().wrap_err("failed to build http client")?;

        let mut request = client.request(method.clone(), url);
        for (name, value) in string_pairs(args.get("headers")) {
            request = request.header(name, value);
        }
        let params = string_pairs(args.get("params"));
        if !params.is_empty() {
            request = request.query(&params);
        }
        if let Some(body) = args.get("json") {
            request = request.json(body);
        } else if let Some(body) = args.str_arg("body") {
            request = request.body(body.to_string());
        }

        log::debug!("http.request {} {}", method, url);
        let response = request.send().await.wrap_err_with(|| format!("request to {} failed", url))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or_default().to_string())))
            .collect();
        let text = response.text().await.wrap_err("failed to read response body")?;
        let (text, truncated) = ctx.truncate(text);

        let mut payload = Payload::new();
        payload.insert("status".into(), Value::from(status.as_u16()));
        payload.insert("url".into(), Value::String(final_url));
        payload.insert("headers".into(), Value::Object(headers));
        payload.insert("text".into(), Value::String(text));
        if truncated {
            payload.insert("truncated".into(), Value::Bool(true));
        }

        if status.is_success() {
            Ok(Observation::success(payload))
        } else {
            Ok(Observation::failure_with(format!("http_status:{}", status.as_u16()), payload))
        }
    }
}
