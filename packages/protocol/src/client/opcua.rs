//! Upstream OPC UA client: connects to a remote OPC UA server and reads or
//! writes a single variable node, for `client_role` bindings. Built on the
//! same `opcua` crate as the server-side address space adapter, using its
//! `client` feature instead of `server`.
//!
//! As with `opcua_adapter`, the exact `opcua::client` surface used here is
//! best-effort idiomatic usage of that crate family rather than code
//! checked against a concrete example in this pack.

use std::str::FromStr;

use anyhow::{Context, Result};
use opcua::client::prelude::*;
use opcua::types::{DataValue, NodeId, Variant};

use crate::opcua_adapter::NumericOrBool;

/// One session against a remote OPC UA endpoint, scoped to reading and
/// writing nodes by their fully qualified node id string (e.g.
/// `"ns=2;s=Tank1.Level"`).
pub struct OpcUaClient {
    session: std::sync::Arc<opcua::sync::RwLock<Session>>,
}

impl OpcUaClient {
    /// Connect to `endpoint_url` with no security (spec.md's simulator is
    /// not in the business of being a hardened OPC UA client; TLS/identity
    /// negotiation is left to the endpoint's own policy defaults).
    pub async fn connect(endpoint_url: &str) -> Result<Self> {
        let mut client = ClientBuilder::new()
            .application_name("sdplc")
            .application_uri("urn:sdplc:client")
            .create_sample_keypair(false)
            .trust_server_certs(true)
            .session_retry_limit(3)
            .client()
            .context("building OPC UA client")?;

        let session = client
            .connect_to_endpoint(
                (endpoint_url, SecurityPolicy::None.to_str(), MessageSecurityMode::None, UserTokenPolicy::anonymous()),
                IdentityToken::Anonymous,
            )
            .context("connecting to OPC UA endpoint")?;

        Ok(Self { session })
    }

    pub fn disconnect(&self) {
        let mut session = self.session.write();
        session.disconnect();
    }

    pub fn read(&self, node_id: &str) -> Result<NumericOrBool> {
        let id = NodeId::from_str(node_id).map_err(|_| anyhow::anyhow!("invalid node id {node_id}"))?;
        let session = self.session.read();
        let results = session
            .read(
                &[ReadValueId::from(id)],
                TimestampsToReturn::Neither,
                0.0,
            )
            .context("reading OPC UA node")?;
        let value = results
            .first()
            .and_then(|dv: &DataValue| dv.value.clone())
            .context("OPC UA read returned no value")?;
        NumericOrBool::from_variant(value).context("unsupported OPC UA variant type")
    }

    pub fn write(&self, node_id: &str, value: NumericOrBool) -> Result<()> {
        let id = NodeId::from_str(node_id).map_err(|_| anyhow::anyhow!("invalid node id {node_id}"))?;
        let variant: Variant = value.into_variant();
        let session = self.session.read();
        let write_value = WriteValue {
            node_id: id,
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: DataValue::new_now(variant),
        };
        let results = session
            .write(&[write_value])
            .context("writing OPC UA node")?;
        results
            .first()
            .copied()
            .filter(|status| status.is_good())
            .context("OPC UA server rejected the write")?;
        Ok(())
    }
}
