use super::Gateway;
use crate::types::jid::{AddressKind, HIDDEN_USER_SERVER, Jid};
use log::warn;

impl Gateway {
    /// Resolves `jid` to a `(jid, lid)` pair for instance `id`.
    ///
    /// The second element is filled in whenever the canonical form is itself a LID.
    pub async fn resolve_jid_lid(&self, id: &str, jid: &Jid) -> (String, String) {
        let (jid, mut lid) = self.extract_jid_lid(id, jid).await;
        if jid.ends_with(&format!("@{HIDDEN_USER_SERVER}")) {
            lid = jid.clone();
        }
        (jid, lid)
    }

    /// Looks up the other half of a PN/LID pair in the instance's local
    /// identity store. Without a registered client the input is returned as is.
    pub async fn extract_jid_lid(&self, id: &str, jid: &Jid) -> (String, String) {
        let Some(client) = self.client(id) else {
            return (jid.to_non_ad().to_string(), String::new());
        };

        match jid.kind() {
            AddressKind::PhoneNumber => {
                let lid = match client.get_lid_for_pn(jid).await {
                    Ok(lid) => lid,
                    Err(e) => {
                        warn!(target: "Gateway/Identity", "Failed to get lid from store for {id}: {e}");
                        None
                    }
                };
                (
                    jid.to_non_ad().to_string(),
                    lid.map(|l| l.to_non_ad().to_string()).unwrap_or_default(),
                )
            }
            AddressKind::Hidden => {
                let lid = jid.to_non_ad().to_string();
                match client.get_pn_for_lid(jid).await {
                    Ok(Some(pn)) if !pn.is_empty() => (pn.to_non_ad().to_string(), lid),
                    Ok(_) => (lid.clone(), lid),
                    Err(e) => {
                        warn!(target: "Gateway/Identity", "Failed to get pn for lid {jid}: {e}");
                        (lid.clone(), lid)
                    }
                }
            }
            AddressKind::Other => (jid.to_non_ad().to_string(), String::new()),
        }
    }
}
