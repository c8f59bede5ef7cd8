use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound proxy settings stored on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceProxy {
    pub proxy_host: String,
    pub proxy_port: String,
    pub proxy_protocol: String,
    pub proxy_username: String,
    pub proxy_password: String,
}

impl InstanceProxy {
    /// Renders the proxy as a URL, or `None` when no host is configured.
    pub fn to_url(&self) -> Option<String> {
        let host = self.proxy_host.trim();
        if host.is_empty() {
            return None;
        }

        let protocol = match self.proxy_protocol.trim() {
            "" => "http",
            p => p,
        };

        let mut url = format!("{protocol}://");
        if !self.proxy_username.is_empty() {
            url.push_str(&urlencoding::encode(&self.proxy_username));
            if !self.proxy_password.is_empty() {
                url.push(':');
                url.push_str(&urlencoding::encode(&self.proxy_password));
            }
            url.push('@');
        }
        url.push_str(host);
        if !self.proxy_port.trim().is_empty() {
            url.push(':');
            url.push_str(self.proxy_port.trim());
        }
        Some(url)
    }
}

/// A tenant record as kept by the instance repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    /// Account JID assigned once pairing succeeds; empty until then.
    #[serde(default, rename = "remoteJid")]
    pub remote_jid: String,
    #[serde(default, rename = "instanceProxy")]
    pub proxy: InstanceProxy,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote_jid: String::new(),
            proxy: InstanceProxy::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_remote_jid(mut self, remote_jid: impl Into<String>) -> Self {
        self.remote_jid = remote_jid.into();
        self
    }

    pub fn with_proxy(mut self, proxy: InstanceProxy) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct InstanceUpdate {
    pub remote_jid: Option<String>,
    pub proxy: Option<InstanceProxy>,
}

impl InstanceUpdate {
    pub fn remote_jid(remote_jid: impl Into<String>) -> Self {
        Self {
            remote_jid: Some(remote_jid.into()),
            ..Default::default()
        }
    }

    pub fn apply_to(self, instance: &mut Instance) {
        if let Some(remote_jid) = self.remote_jid {
            instance.remote_jid = remote_jid;
        }
        if let Some(proxy) = self.proxy {
            instance.proxy = proxy;
        }
    }
}
