use crate::{
    core::{
        domain::{
            error::{ConflictError, ValidationError, VmmResult},
            model::{network::NewNetwork, network::SwitchRef, network_object::NetworkObject},
            value_object::MacAddress,
        },
        infrastructure::store::{InventoryStore, StoreError},
    },
    vm::application::service::validation_service::NetworkRequest,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A resolved network attachment, ready to be persisted with the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: NewNetwork,
    pub switch: SwitchRef,
    /// The MAC address the interface will use.
    pub mac: String,
    /// The identity object created for this attachment, if one was.
    pub created_mac: Option<NetworkObject>,
}

pub struct NetworkAttachmentService {
    inventory: Arc<dyn InventoryStore>,
}

impl NetworkAttachmentService {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self { inventory }
    }

    /// Resolves the switch and MAC identity for a VM's network request.
    ///
    /// When no identity is supplied a new one named `{vm}-{switch}` is
    /// created, suffixed `-1`, `-2`, ... if the name is taken. The caller
    /// owns the created identity and must delete it if provisioning fails.
    #[instrument(skip(self, request), fields(switch = %request.switch_name))]
    pub async fn resolve(
        &self,
        vm_name: &str,
        request: &NetworkRequest,
    ) -> VmmResult<NetworkAttachment> {
        let switch = self.find_switch(&request.switch_name).await?;

        let (mac_id, mac, created_mac) = match request.mac_id {
            Some(id) => {
                let object = self
                    .inventory
                    .network_object(id)
                    .await?
                    .ok_or(ValidationError::MacObjectNotFound(id))?;
                let mac = object
                    .first_entry()
                    .ok_or(ValidationError::MacObjectHasNoEntries(id))?
                    .to_string();
                (id, mac, None)
            }
            None => {
                let object = self.create_identity(vm_name, &switch.name).await?;
                let Some(mac) = object.first_entry().map(str::to_string) else {
                    self.inventory.delete_network_objects(&[object.id]).await?;
                    return Err(ValidationError::MacObjectHasNoEntries(object.id).into());
                };
                (object.id, mac, Some(object))
            }
        };

        Ok(NetworkAttachment {
            network: NewNetwork {
                mac_id: Some(mac_id),
                switch_id: switch.id,
                switch_kind: switch.kind,
                emulation: request.emulation.clone(),
            },
            switch,
            mac,
            created_mac,
        })
    }

    async fn find_switch(&self, name: &str) -> VmmResult<SwitchRef> {
        let mut found = self.inventory.find_switches(name).await?;
        if found.len() != 1 {
            debug!(name, matches = found.len(), "switch did not resolve uniquely");
            return Err(ValidationError::SwitchNotFound(name.to_string()).into());
        }
        Ok(found.remove(0))
    }

    async fn create_identity(&self, vm_name: &str, switch_name: &str) -> VmmResult<NetworkObject> {
        let base = format!("{vm_name}-{switch_name}");
        let mac = MacAddress::random().to_string();
        let mut suffix = 0u32;

        loop {
            let name = match suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            suffix += 1;

            if self.inventory.network_object_name_exists(&name).await? {
                continue;
            }

            match self.inventory.create_mac_object(&name, &mac).await {
                Ok(object) => {
                    info!(object_id = object.id, name = %object.name, %mac, "created MAC identity");
                    return Ok(object);
                }
                // lost a race for the name, try the next suffix
                Err(StoreError::Conflict(ConflictError::NetworkObjectNameTaken(_))) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
